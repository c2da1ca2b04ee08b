// ==========================================
// 车间机台产量跟踪系统 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供应用入口调用
// ==========================================

pub mod error;
pub mod history_api;
pub mod tracking_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use history_api::{HistoryApi, ProductionHistoryResponse};
pub use tracking_api::{
    ConfigureMachineRequest, ConfigureMachineResponse, MachineStatusResponse, ManualResetResponse,
    SaveScrapRequest, SaveScrapResponse, TrackingApi, UpdateMachineRequest, UpdateMachineResponse,
};
