// ==========================================
// 车间机台产量跟踪系统 - 小时产量跟踪引擎
// ==========================================
// 职责: 按班次小时桶滚动累计产量并落库 producao_horaria
// 规则: 开小时写零行;跳小时把累计增量记入当前小时,中间补零
// ==========================================

use chrono::NaiveDateTime;
use std::sync::Arc;

use crate::domain::machine::MachineRecord;
use crate::engine::shift_clock::{
    current_hour_index, meta_por_idx, operational_day_ref, percentual,
};
use crate::repository::error::RepositoryResult;
use crate::repository::hourly_production_repo::{HourlyProductionRepository, HourlySlot};

pub struct HourlyTracker {
    hourly_repo: Arc<HourlyProductionRepository>,
}

impl HourlyTracker {
    pub fn new(hourly_repo: Arc<HourlyProductionRepository>) -> Self {
        Self { hourly_repo }
    }

    fn persistir(
        &self,
        machine_id: &str,
        data_ref: &str,
        hora_idx: usize,
        baseline_esp: i64,
        esp_last: i64,
        produzido: i64,
        meta: i64,
    ) -> RepositoryResult<()> {
        self.hourly_repo.upsert_hora(
            machine_id,
            &HourlySlot {
                data_ref: data_ref.to_string(),
                hora_idx: hora_idx as i64,
                baseline_esp,
                esp_last,
                produzido,
                meta,
                percentual: percentual(produzido, meta),
            },
        )
    }

    /// 收尾一个小时桶: 以小时基线结算产量并落库
    fn fechar_hora(
        &self,
        rec: &mut MachineRecord,
        data_ref: &str,
        hora_idx: usize,
    ) -> RepositoryResult<()> {
        let esp = rec.esp_absoluto;
        let base = rec.baseline_hora;
        let produzido = (esp - base).max(0);
        let meta = meta_por_idx(rec, hora_idx);

        if hora_idx < rec.producao_por_hora.len() {
            rec.producao_por_hora[hora_idx] = Some(produzido);
        }
        self.persistir(&rec.machine_id, data_ref, hora_idx, base, esp, produzido, meta)
    }

    /// 每个 tick 推进小时跟踪状态
    pub fn on_tick(&self, rec: &mut MachineRecord, now: NaiveDateTime) -> RepositoryResult<()> {
        let dia = operational_day_ref(now);
        let data_ref = dia.format("%Y-%m-%d").to_string();
        let esp = rec.esp_absoluto;
        let prev = rec.ultima_hora;

        let Some(idx) = current_hour_index(rec, now) else {
            // 离开班次窗口: 收尾并持久化最后一个开着的小时
            if let Some(prev_idx) = prev {
                self.fechar_hora(rec, &data_ref, prev_idx)?;
            }
            rec.ultima_hora = None;
            rec.producao_hora = 0;
            rec.percentual_hora = 0;
            return Ok(());
        };

        // 运营日或桶数变化 → 重载小时向量
        let horas_len = rec.horas_turno.len();
        let contexto = (dia, horas_len);
        if rec.producao_por_hora_ref != Some(contexto) || rec.producao_por_hora.len() != horas_len
        {
            rec.producao_por_hora =
                self.hourly_repo
                    .load_producao_por_hora(&rec.machine_id, &data_ref, horas_len)?;
            rec.producao_por_hora_ref = Some(contexto);
        }

        // 掉线跨小时: 中间小时补零,整段增量记入当前小时
        if let Some(prev_idx) = prev {
            if prev_idx < idx && idx - prev_idx >= 2 {
                let base_prev = rec.baseline_hora;
                let delta_total = (esp - base_prev).max(0);

                for h in prev_idx..idx {
                    if h < rec.producao_por_hora.len() {
                        rec.producao_por_hora[h] = Some(0);
                    }
                    let meta_h = meta_por_idx(rec, h);
                    self.persistir(&rec.machine_id, &data_ref, h, base_prev, base_prev, 0, meta_h)?;
                }

                rec.ultima_hora = Some(idx);
                rec.baseline_hora = esp - delta_total;
                rec.producao_hora = delta_total;
                let meta_now = meta_por_idx(rec, idx);
                rec.percentual_hora = percentual(delta_total, meta_now);
                if idx < rec.producao_por_hora.len() {
                    rec.producao_por_hora[idx] = Some(delta_total);
                }
                return self.persistir(
                    &rec.machine_id,
                    &data_ref,
                    idx,
                    rec.baseline_hora,
                    esp,
                    delta_total,
                    meta_now,
                );
            }
        }

        // 小时推进: 收尾上一小时,开新小时并立即写零行
        if prev != Some(idx) {
            if let Some(prev_idx) = prev {
                self.fechar_hora(rec, &data_ref, prev_idx)?;
            }

            rec.ultima_hora = Some(idx);
            // 断电重启恢复: 优先取库里已有的小时基线
            let baseline = self
                .hourly_repo
                .get_baseline_for_hora(&rec.machine_id, &data_ref, idx as i64)?
                .unwrap_or(esp);
            rec.baseline_hora = baseline;
            rec.producao_hora = 0;
            rec.percentual_hora = 0;
            let meta_now = meta_por_idx(rec, idx);
            return self.persistir(&rec.machine_id, &data_ref, idx, baseline, esp, 0, meta_now);
        }

        // 同一小时: 按基线重算并落库 (0 也落)
        let produzido = (esp - rec.baseline_hora).max(0);
        rec.producao_hora = produzido;
        let meta_h = meta_por_idx(rec, idx);
        rec.percentual_hora = percentual(produzido, meta_h);
        if idx < rec.producao_por_hora.len() {
            rec.producao_por_hora[idx] = Some(produzido);
        }
        self.persistir(
            &rec.machine_id,
            &data_ref,
            idx,
            rec.baseline_hora,
            esp,
            produzido,
            meta_h,
        )
    }
}
