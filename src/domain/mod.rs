// ==========================================
// 车间机台产量跟踪系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、值类型、班次时间规则
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod machine;
pub mod shift;
pub mod types;

// 重导出核心类型
pub use machine::{BaselineMemo, MachineConfig, MachineRecord, NonScheduledState};
pub use shift::{ShiftRangeError, ShiftWindow};
pub use types::{
    apply_units, join_scoped_machine_id, parse_flag, run_signal, split_scoped_machine_id,
    ProductionUnit, UiStatus,
};
