// ==========================================
// 车间机台产量跟踪系统 - 非计划生产引擎
// ==========================================
// 职责: 班次窗口外的产量/停留分钟累计,并镜像落库
// 红线: 不判定班次窗口,dentro_turno 由编排层给出
// ==========================================

use std::sync::Arc;

use chrono::{NaiveDateTime, Timelike};

use crate::domain::machine::MachineRecord;
use crate::engine::shift_clock::operational_day_ref;
use crate::repository::error::RepositoryResult;
use crate::repository::non_scheduled_repo::NonScheduledRepository;

// ==========================================
// NonScheduledEngine - 非计划生产引擎
// ==========================================

/// 非计划(NP)累计引擎
///
/// 会话语义:
/// - 窗口内的 tick 只关闭会话并推进计数标记,不清累计
/// - 窗口外,分钟只在"上一笔活跃且存在时间戳"时累加
/// - 产量增量非负钳制,正增量同时镜像到小时槽位
pub struct NonScheduledEngine {
    np_repo: Arc<NonScheduledRepository>,
}

impl NonScheduledEngine {
    pub fn new(np_repo: Arc<NonScheduledRepository>) -> Self {
        Self { np_repo }
    }

    /// 运营日对齐,换日时从日累计表重载(无行 → 清零)
    ///
    /// 返回对齐后的运营日标签 "YYYY-MM-DD"
    fn sync_day(&self, rec: &mut MachineRecord, now: NaiveDateTime) -> RepositoryResult<String> {
        let dia_op = operational_day_ref(now);
        if rec.np.dia_ref != dia_op {
            rec.np.roll_to_day(dia_op);
            let data_ref = dia_op.format("%Y-%m-%d").to_string();
            if let Some((np_producao, np_minutos)) =
                self.np_repo.load_totais(&rec.machine_id, &data_ref)?
            {
                rec.np.np_producao = np_producao;
                rec.np.np_minutos = np_minutos;
            }
            return Ok(data_ref);
        }
        Ok(dia_op.format("%Y-%m-%d").to_string())
    }

    /// 处理一笔计数 tick
    ///
    /// dentro_turno = true 只维护标记并关闭会话;
    /// false 时按会话规则累计分钟与产量
    pub fn on_tick(
        &self,
        rec: &mut MachineRecord,
        dentro_turno: bool,
        now: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let data_ref = self.sync_day(rec, now)?;

        let esp = rec.esp_absoluto;
        let delta = match rec.np.contador_anterior {
            Some(anterior) => (esp - anterior).max(0),
            None => 0,
        };

        if dentro_turno {
            // 窗口内: 累计保留,仅收尾会话,等待下一次窗口外 tick
            rec.np.close_session();
            rec.np.ultimo_ts = Some(now);
            rec.np.contador_anterior = Some(esp);
            self.np_repo.upsert_totais(
                &rec.machine_id,
                &data_ref,
                rec.np.np_producao,
                rec.np.np_minutos,
            )?;
            return Ok(());
        }

        let ativo_agora = rec.run || delta > 0;

        // 分钟只覆盖"确认活跃"的区间: 上一笔活跃才把间隔记入
        if rec.np.ativo {
            if let Some(ultimo_ts) = rec.np.ultimo_ts {
                let minutos =
                    ((now - ultimo_ts).num_seconds() as f64 / 60.0).round() as i64;
                if minutos > 0 {
                    rec.np.np_minutos += minutos;
                }
            }
        }

        if delta > 0 {
            rec.np.np_producao += delta;
            // 小时镜像用墙钟小时,与班次桶无关
            self.np_repo
                .add_hora_delta(&rec.machine_id, &data_ref, now.hour() as i64, delta)?;
        }

        rec.np.ativo = ativo_agora;
        rec.np.ultimo_ts = Some(now);
        rec.np.contador_anterior = Some(esp);

        self.np_repo.upsert_totais(
            &rec.machine_id,
            &data_ref,
            rec.np.np_producao,
            rec.np.np_minutos,
        )?;
        Ok(())
    }
}
