// ==========================================
// 车间机台产量跟踪系统 - 机台注册表
// ==========================================
// 职责: 按作用域机台ID懒初始化运行时记录,首次访问时从
//       machine_config 水合配置
// 红线: 注册表只管生命周期,业务推进由引擎在闭包内完成
// ==========================================

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;

use crate::domain::machine::MachineRecord;
use crate::engine::shift_clock::operational_day_ref;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::machine_config_repo::MachineConfigRepository;

// ==========================================
// MachineRegistry - 运行时记录注册表
// ==========================================

/// 机台运行时注册表
///
/// 记录键是作用域机台ID ("cliente::machine" 或裸ID)。
/// 访问统一走 [`MachineRegistry::with_record`],持锁执行闭包,
/// 避免取出副本造成的丢失更新
pub struct MachineRegistry {
    records: Mutex<HashMap<String, MachineRecord>>,
    config_repo: Arc<MachineConfigRepository>,
}

impl MachineRegistry {
    pub fn new(config_repo: Arc<MachineConfigRepository>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            config_repo,
        }
    }

    /// 在注册表记录上执行闭包,缺失时懒初始化并水合配置
    pub fn with_record<T>(
        &self,
        machine_id: &str,
        now: NaiveDateTime,
        f: impl FnOnce(&mut MachineRecord) -> RepositoryResult<T>,
    ) -> RepositoryResult<T> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;

        let rec = match records.entry(machine_id.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let mut rec = MachineRecord::for_machine(machine_id, operational_day_ref(now));
                if let Some(cfg) = self.config_repo.find_by_machine(machine_id)? {
                    rec.apply_config(&cfg);
                }
                entry.insert(rec)
            }
        };

        f(rec)
    }

    /// 当前记录的只读副本,未初始化 → None
    pub fn peek(&self, machine_id: &str) -> RepositoryResult<Option<MachineRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        Ok(records.get(machine_id).cloned())
    }
}
