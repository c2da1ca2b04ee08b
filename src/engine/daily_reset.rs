// ==========================================
// 车间机台产量跟踪系统 - 日切引擎
// ==========================================
// 职责: 23:59 懒触发日切 (快照 → 清零 → 重锚),护栏防重入
// 红线: 快照是普通 INSERT,防重只靠 reset_executado_hoje 护栏
// ==========================================

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::domain::machine::{BaselineMemo, MachineRecord};
use crate::engine::shift_clock::{operational_day_ref, reached_reset_cutoff};
use crate::repository::baseline_repo::BaselineRepository;
use crate::repository::daily_production_repo::DailyProductionRepository;
use crate::repository::error::RepositoryResult;

// ==========================================
// DailyResetEngine - 日切引擎
// ==========================================

/// 日切引擎
///
/// 没有后台定时器: 每笔 tick / 状态查询先走 check_rollover,
/// 到达阈值才执行真正的日切
pub struct DailyResetEngine {
    daily_repo: Arc<DailyProductionRepository>,
    baseline_repo: Arc<BaselineRepository>,
}

impl DailyResetEngine {
    pub fn new(
        daily_repo: Arc<DailyProductionRepository>,
        baseline_repo: Arc<BaselineRepository>,
    ) -> Self {
        Self {
            daily_repo,
            baseline_repo,
        }
    }

    /// 懒触发日切检查,执行了日切 → true
    ///
    /// 顺序固定: 先判阈值执行日切,再按日期变化解除护栏。
    /// 日切把 ultimo_dia 推进到当天,因此刚落下的护栏不会被
    /// 同一笔调用立即解除
    pub fn check_rollover(
        &self,
        rec: &mut MachineRecord,
        now: NaiveDateTime,
    ) -> RepositoryResult<bool> {
        let mut executado = false;

        if reached_reset_cutoff(now) && !rec.reset_executado_hoje {
            self.reset_contexto(rec, now)?;
            executado = true;
        }

        if now.date() != rec.ultimo_dia {
            rec.reset_executado_hoje = false;
        }

        Ok(executado)
    }

    /// 日切主体: 快照正在收尾的运营日,清零计数,重锚基线
    ///
    /// 手动重置走同一入口,任何时刻调用语义一致
    pub fn reset_contexto(
        &self,
        rec: &mut MachineRecord,
        now: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let data_fechada = rec.ultimo_dia.format("%Y-%m-%d").to_string();
        self.daily_repo.insert_snapshot(
            &rec.machine_id,
            &data_fechada,
            rec.producao_turno,
            Some(rec.meta_turno),
            Some(rec.percentual),
        )?;

        let esp = rec.esp_absoluto;
        rec.baseline_diario = esp;
        rec.baseline_hora = esp;
        rec.producao_turno = 0;
        rec.producao_anterior = 0;
        rec.producao_hora = 0;
        rec.percentual = 0;
        rec.percentual_hora = 0;
        rec.tempo_medio = None;
        rec.ultima_hora = None;
        rec.producao_por_hora.clear();
        rec.producao_por_hora_ref = None;

        // NP 全清,标记重建避免跨日 delta
        let dia_op = operational_day_ref(now);
        rec.np.roll_to_day(dia_op);
        rec.np.ultimo_ts = Some(now);
        rec.np.contador_anterior = Some(esp);

        rec.ultimo_dia = now.date();
        rec.reset_executado_hoje = true;

        let dia_ref = dia_op.format("%Y-%m-%d").to_string();
        self.baseline_repo.persist(&rec.machine_id, &dia_ref, esp)?;
        rec.baseline_memo = Some(BaselineMemo {
            dia_ref: dia_op,
            esp_last: esp,
        });

        tracing::info!(
            machine_id = %rec.machine_id,
            dia_fechado = %data_fechada,
            novo_dia = %dia_ref,
            baseline = esp,
            "日切完成"
        );
        Ok(())
    }
}
