// ==========================================
// 车间机台产量跟踪系统 - 引擎层
// ==========================================
// 职责: 业务规则引擎 (班次时钟 / 日切 / 小时桶 / 非计划 / 历史对账)
// 红线: 引擎不拼 SQL,持久化一律走仓储层
// ==========================================

pub mod daily_reset;
pub mod history;
pub mod hourly;
pub mod intervals;
pub mod non_scheduled;
pub mod registry;
pub mod shift_clock;
pub mod tracking;

// 重导出核心引擎
pub use daily_reset::DailyResetEngine;
pub use history::{DayDetail, DayDetailHour, DaySummary, HistoryDay, HistoryEngine};
pub use hourly::HourlyTracker;
pub use intervals::{Segment, SegmentState, DEFAULT_STOP_SEC};
pub use non_scheduled::NonScheduledEngine;
pub use registry::MachineRegistry;
pub use shift_clock::{
    allocate_hourly_targets, compute_hour_buckets, current_hour_index, operational_day_ref,
};
pub use tracking::{DerivedMl, TrackingEngine};
