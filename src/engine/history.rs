// ==========================================
// 车间机台产量跟踪系统 - 历史查询引擎
// ==========================================
// 职责: 遗留/作用域双轨行的读侧对账,多日历史清单,
//       以及按脉冲事件重建单日 RUN/STOP/NP 片段
// 红线: 只读聚合,不写任何表
// ==========================================

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;

use crate::engine::intervals::{
    build_segments_for_hour, compute_run_intervals, Segment, DEFAULT_STOP_SEC,
};
use crate::engine::shift_clock::{hora_inicial_da_faixa, operational_day_ref};
use crate::repository::daily_production_repo::DailyProductionRepository;
use crate::repository::error::RepositoryResult;
use crate::repository::hourly_production_repo::HourlyProductionRepository;
use crate::repository::machine_config_repo::MachineConfigRepository;
use crate::repository::machine_event_repo::MachineEventRepository;
use crate::repository::non_scheduled_repo::NonScheduledRepository;
use crate::repository::production_order_repo::{OrderContext, ProductionOrderRepository};
use crate::repository::scrap_repo::ScrapRepository;

/// 历史清单的天数缺省与上限
pub const HISTORY_DAYS_DEFAULT: i64 = 10;
pub const HISTORY_DAYS_MAX: i64 = 60;

// ==========================================
// 查询结果 DTO
// ==========================================

/// 某机台某日对账后的汇总,machine_id 为胜出行的标识
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySummary {
    pub produzido: i64,
    pub meta: Option<i64>,
    pub percentual: Option<i64>,
    pub machine_id: String,
}

/// 历史清单里的一天
#[derive(Debug, Clone, Serialize)]
pub struct HistoryDay {
    pub data: String,             // YYYY-MM-DD
    pub produzido: i64,
    pub pecas_boas: i64,          // max(produzido - refugo, 0)
    pub refugo: i64,
    pub meta: Option<i64>,
    pub percentual: Option<i64>,
    pub ops: Vec<OrderContext>,
}

/// 日明细里的一个小时槽位
#[derive(Debug, Clone, Serialize)]
pub struct DayDetailHour {
    pub hour: u32,
    pub slot: String,             // "HH:00-HH:00"
    pub meta: i64,
    pub produzido: i64,
    pub refugo: i64,
    pub segments: Vec<Segment>,
}

/// 单日明细响应
#[derive(Debug, Clone, Serialize)]
pub struct DayDetail {
    pub machine_id: String,
    pub effective_machine_id: String,
    pub date: String,
    pub stop_sec: i64,
    pub hours: Vec<DayDetailHour>,
}

// ==========================================
// HistoryEngine - 历史读侧
// ==========================================

/// 历史查询引擎
///
/// 系统从全局机台ID演进到 cliente::maquina 作用域ID时没有做一次性
/// 迁移,两种形态在历史表里长期共存,所有查询先解析当日的有效ID
pub struct HistoryEngine {
    daily_repo: Arc<DailyProductionRepository>,
    hourly_repo: Arc<HourlyProductionRepository>,
    scrap_repo: Arc<ScrapRepository>,
    np_repo: Arc<NonScheduledRepository>,
    event_repo: Arc<MachineEventRepository>,
    order_repo: Arc<ProductionOrderRepository>,
    config_repo: Arc<MachineConfigRepository>,
}

impl HistoryEngine {
    pub fn new(
        daily_repo: Arc<DailyProductionRepository>,
        hourly_repo: Arc<HourlyProductionRepository>,
        scrap_repo: Arc<ScrapRepository>,
        np_repo: Arc<NonScheduledRepository>,
        event_repo: Arc<MachineEventRepository>,
        order_repo: Arc<ProductionOrderRepository>,
        config_repo: Arc<MachineConfigRepository>,
    ) -> Self {
        Self {
            daily_repo,
            hourly_repo,
            scrap_repo,
            np_repo,
            event_repo,
            order_repo,
            config_repo,
        }
    }

    /// 解析某日的有效机台ID
    ///
    /// 已带 '::' 的直接使用;遗留裸ID在 producao_diaria 找同日的
    /// 作用域候选 (产量最高者),找不到回退裸ID
    pub fn resolve_effective_id(
        &self,
        machine_id: &str,
        data_ref: &str,
    ) -> RepositoryResult<String> {
        let mid = machine_id.trim();
        if mid.is_empty() || mid.contains("::") {
            return Ok(mid.to_string());
        }
        Ok(self
            .daily_repo
            .find_scoped_candidate(data_ref, mid)?
            .unwrap_or_else(|| mid.to_string()))
    }

    /// 某机台某日的对账汇总
    ///
    /// 同日可能共存遗留行与作用域行 (双写缺陷未在写侧修复):
    /// 恰好两个互异产量且大者等于小者两倍 → 大者视为双计伪影,取小者;
    /// 其余情况取最大值。同值多行优先作用域行
    pub fn day_summary(&self, machine_id: &str, data_ref: &str) -> RepositoryResult<DaySummary> {
        let eff = self.resolve_effective_id(machine_id, data_ref)?;
        self.day_summary_resolved(machine_id, &eff, data_ref)
    }

    fn day_summary_resolved(
        &self,
        raw_id: &str,
        effective_id: &str,
        data_ref: &str,
    ) -> RepositoryResult<DaySummary> {
        let rows = self.daily_repo.rows_for_day(data_ref, effective_id, raw_id)?;
        if rows.is_empty() {
            return Ok(DaySummary {
                produzido: 0,
                meta: None,
                percentual: None,
                machine_id: effective_id.to_string(),
            });
        }

        let mut distintos: Vec<i64> = rows.iter().map(|r| r.produzido).collect();
        distintos.sort_unstable();
        distintos.dedup();

        let escolhido = if distintos.len() == 2 && distintos[1] == distintos[0] * 2 {
            distintos[0]
        } else {
            distintos.last().copied().unwrap_or(0)
        };

        let vencedora = rows
            .iter()
            .find(|r| r.produzido == escolhido && r.machine_id.contains("::"))
            .or_else(|| rows.iter().find(|r| r.produzido == escolhido))
            .unwrap_or(&rows[0]);

        let machine_id = if vencedora.machine_id.is_empty() {
            effective_id.to_string()
        } else {
            vencedora.machine_id.clone()
        };

        Ok(DaySummary {
            produzido: vencedora.produzido,
            meta: vencedora.meta,
            percentual: vencedora.percentual,
            machine_id,
        })
    }

    /// 截至运营日今天的逐日历史,days 钳制在 1..=60
    pub fn production_history(
        &self,
        machine_id: &str,
        days: i64,
        now: NaiveDateTime,
    ) -> RepositoryResult<Vec<HistoryDay>> {
        let days = days.clamp(1, HISTORY_DAYS_MAX);
        let fim = operational_day_ref(now);
        let inicio = fim - Duration::days(days - 1);

        let mut dados = Vec::with_capacity(days as usize);
        for i in 0..days {
            let dia = inicio + Duration::days(i);
            let data_ref = dia.format("%Y-%m-%d").to_string();

            let eff = self.resolve_effective_id(machine_id, &data_ref)?;
            let resumo = self.day_summary_resolved(machine_id, &eff, &data_ref)?;
            let refugo = self.scrap_repo.day_total(&data_ref, &eff, machine_id)?;

            dados.push(HistoryDay {
                data: data_ref,
                produzido: resumo.produzido,
                pecas_boas: (resumo.produzido - refugo).max(0),
                refugo,
                meta: resumo.meta,
                percentual: resumo.percentual,
                ops: self.orders_of_day(&eff, dia)?,
            });
        }
        Ok(dados)
    }

    /// 工单按开工时刻归属运营日,跨日不产生第二次出现;库内重复行去重
    fn orders_of_day(
        &self,
        effective_id: &str,
        dia: NaiveDate,
    ) -> RepositoryResult<Vec<OrderContext>> {
        let brutas = self.order_repo.orders_for_day(effective_id, dia)?;
        let mut vistos: HashSet<(String, String, String, String)> = HashSet::new();
        let mut ops = Vec::with_capacity(brutas.len());
        for ordem in brutas {
            let chave = (
                ordem.op.clone().unwrap_or_default(),
                ordem.lote.clone().unwrap_or_default(),
                ordem.operador.clone().unwrap_or_default(),
                ordem.inicio.clone().unwrap_or_default(),
            );
            if vistos.insert(chave) {
                ops.push(ordem);
            }
        }
        Ok(ops)
    }

    /// 重建某日 24 个小时槽位
    ///
    /// 脉冲事件展开为运行区间后与每个小时窗求交;小时表里落过的
    /// 槽位经班次标签把桶序号映射回墙钟小时,无目标的小时整段 NP,
    /// 其产量落在非计划小时表时补显
    pub fn day_detail(&self, machine_id: &str, date: NaiveDate) -> RepositoryResult<DayDetail> {
        let raw = machine_id.trim();
        let data_ref = date.format("%Y-%m-%d").to_string();
        let eff = self.resolve_effective_id(raw, &data_ref)?;

        // 配置先按请求ID找,找不到再按有效ID
        let mut config = self.config_repo.find_by_machine(raw)?;
        if config.is_none() && eff != raw {
            config = self.config_repo.find_by_machine(&eff)?;
        }
        let stop_sec = config
            .as_ref()
            .and_then(|c| c.alerta_sem_contagem_seg)
            .unwrap_or(DEFAULT_STOP_SEC);

        let dia_inicio = date.and_time(NaiveTime::MIN);
        let dia_fim = dia_inicio + Duration::days(1);
        let pulsos: Vec<NaiveDateTime> = self
            .event_repo
            .event_times_between(
                &eff,
                raw,
                dia_inicio.and_utc().timestamp_millis(),
                dia_fim.and_utc().timestamp_millis(),
            )?
            .into_iter()
            .filter_map(|ms| DateTime::<Utc>::from_timestamp_millis(ms).map(|t| t.naive_utc()))
            .collect();
        let run_intervals = compute_run_intervals(&pulsos, stop_sec);

        // 小时表: 桶序号 → 班次标签 → 墙钟小时
        let faixas = config.as_ref().map(|c| c.horas_turno()).unwrap_or_default();
        let mut metas = [0i64; 24];
        let mut producoes = [0i64; 24];
        for (idx, produzido, meta) in self.hourly_repo.load_slots_for_day(&eff, &data_ref)? {
            let Some(faixa) = usize::try_from(idx).ok().and_then(|i| faixas.get(i)) else {
                continue;
            };
            let Some(h) = hora_inicial_da_faixa(faixa) else {
                continue;
            };
            metas[h] = meta;
            producoes[h] = produzido;
        }

        let np24 = self.np_repo.load_np_por_hora_24(&eff, &data_ref)?;
        let refugo24 = self.scrap_repo.load_refugo_24(&eff, &data_ref)?;

        let mut hours = Vec::with_capacity(24);
        for h in 0..24usize {
            let hora_inicio = dia_inicio + Duration::hours(h as i64);
            let hora_fim = hora_inicio + Duration::hours(1);
            let meta = metas[h];
            let hora_np = meta <= 0;

            let mut produzido = producoes[h];
            if hora_np && produzido == 0 {
                produzido = np24.get(h).copied().unwrap_or(0);
            }

            hours.push(DayDetailHour {
                hour: h as u32,
                slot: format!("{:02}:00-{:02}:00", h, (h + 1) % 24),
                meta,
                produzido,
                refugo: refugo24.get(h).copied().unwrap_or(0),
                segments: build_segments_for_hour(hora_inicio, hora_fim, hora_np, &run_intervals),
            });
        }

        Ok(DayDetail {
            machine_id: raw.to_string(),
            effective_machine_id: eff,
            date: data_ref,
            stop_sec,
            hours,
        })
    }
}
