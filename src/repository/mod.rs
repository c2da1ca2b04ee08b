// ==========================================
// 车间机台产量跟踪系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod baseline_repo;
pub mod daily_production_repo;
pub mod error;
pub mod hourly_production_repo;
pub mod machine_config_repo;
pub mod machine_event_repo;
pub mod non_scheduled_repo;
pub mod production_order_repo;
pub mod scrap_repo;

// 重导出核心仓储
pub use baseline_repo::BaselineRepository;
pub use daily_production_repo::{DailyProductionRepository, DailyProductionRow};
pub use error::{RepositoryError, RepositoryResult};
pub use hourly_production_repo::{HourlyProductionRepository, HourlySlot};
pub use machine_config_repo::MachineConfigRepository;
pub use machine_event_repo::MachineEventRepository;
pub use non_scheduled_repo::NonScheduledRepository;
pub use production_order_repo::{OrderContext, ProductionOrderRepository};
pub use scrap_repo::ScrapRepository;
