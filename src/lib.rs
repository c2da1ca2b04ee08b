// ==========================================
// 车间机台产量跟踪系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 设备上报驱动的班次产量跟踪与历史对账
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "pt-BR");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// API 层 - 业务接口
pub mod api;

// 应用层 - 装配与启动
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    join_scoped_machine_id, split_scoped_machine_id, ProductionUnit, UiStatus,
};

// 领域实体
pub use domain::{MachineConfig, MachineRecord, ShiftWindow};

// 引擎
pub use engine::{
    DayDetail, DaySummary, HistoryDay, HistoryEngine, MachineRegistry, TrackingEngine,
};

// API
pub use api::{ApiError, ApiResult, HistoryApi, TrackingApi};

// 应用状态
pub use app::{get_default_db_path, AppState};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "车间机台产量跟踪系统";

// 数据库版本
pub const DB_VERSION: &str = "v0.1";
