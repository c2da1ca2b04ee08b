// ==========================================
// 车间机台产量跟踪系统 - 应用层
// ==========================================
// 职责: 组装仓储/引擎/API,提供启动入口
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
