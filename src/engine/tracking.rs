// ==========================================
// 车间机台产量跟踪系统 - 跟踪主引擎
// ==========================================
// 职责: tick 流水线编排 (日切 → 基线 → 班次/小时/NP → 事件),
//       以及状态侧的派生指标计算
// 红线: 不做入参校验(API 层职责),不拼装响应 DTO
// ==========================================

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, NaiveTime};

use crate::domain::machine::{BaselineMemo, MachineRecord};
use crate::domain::shift::ShiftWindow;
use crate::domain::types::{split_scoped_machine_id, UiStatus};
use crate::engine::daily_reset::DailyResetEngine;
use crate::engine::hourly::HourlyTracker;
use crate::engine::non_scheduled::NonScheduledEngine;
use crate::engine::shift_clock::{
    current_hour_index, hora_inicial_da_faixa, operational_day_ref, percentual,
};
use crate::repository::baseline_repo::BaselineRepository;
use crate::repository::daily_production_repo::DailyProductionRepository;
use crate::repository::error::RepositoryResult;
use crate::repository::hourly_production_repo::HourlyProductionRepository;
use crate::repository::machine_event_repo::MachineEventRepository;
use crate::repository::non_scheduled_repo::NonScheduledRepository;

// ==========================================
// TrackingEngine - tick 流水线
// ==========================================

/// 跟踪主引擎
///
/// 每笔设备 tick 按固定顺序推进:
/// 1. 懒触发日切检查
/// 2. 原始状态/计数标记
/// 3. 停机锚点 (AUTO 清除,非 AUTO 首见落锚)
/// 4. 日基线落锚 + 班次产量
/// 5. 小时桶推进
/// 6. 非计划累计
/// 7. 正增量落 RUN 事件
pub struct TrackingEngine {
    baseline_repo: Arc<BaselineRepository>,
    event_repo: Arc<MachineEventRepository>,
    hourly: HourlyTracker,
    non_scheduled: NonScheduledEngine,
    daily_reset: DailyResetEngine,
}

impl TrackingEngine {
    pub fn new(
        baseline_repo: Arc<BaselineRepository>,
        hourly_repo: Arc<HourlyProductionRepository>,
        np_repo: Arc<NonScheduledRepository>,
        daily_repo: Arc<DailyProductionRepository>,
        event_repo: Arc<MachineEventRepository>,
    ) -> Self {
        Self {
            baseline_repo: Arc::clone(&baseline_repo),
            event_repo,
            hourly: HourlyTracker::new(hourly_repo),
            non_scheduled: NonScheduledEngine::new(np_repo),
            daily_reset: DailyResetEngine::new(daily_repo, baseline_repo),
        }
    }

    /// 处理一笔设备 tick,返回本次是否触发了日切
    pub fn process_tick(
        &self,
        rec: &mut MachineRecord,
        status: &str,
        esp_absoluto: i64,
        run: bool,
        now: NaiveDateTime,
    ) -> RepositoryResult<bool> {
        let reset_executado = self.daily_reset.check_rollover(rec, now)?;

        rec.status = status.trim().to_uppercase();

        // 正增量在标记更新前取,用于 RUN 事件
        let delta_contagem = match rec.last_count_val {
            Some(anterior) => (esp_absoluto - anterior).max(0),
            None => 0,
        };

        let visto_anterior = rec.last_count_val.unwrap_or(esp_absoluto);
        if esp_absoluto != visto_anterior {
            rec.last_count_ts = Some(now);
        } else if rec.last_count_ts.is_none() {
            rec.last_count_ts = Some(now);
        }
        rec.last_count_val = Some(esp_absoluto);
        rec.esp_absoluto = esp_absoluto;
        rec.run = run;

        // 停机锚点: AUTO 清除,非 AUTO 只在未锚定时落点
        if rec.status == "AUTO" {
            rec.machine_stop_since = None;
        } else if rec.machine_stop_since.is_none() {
            rec.machine_stop_since = Some(now);
        }

        self.sync_baseline(rec, now)?;
        rec.producao_turno = (rec.esp_absoluto - rec.baseline_diario).max(0);
        rec.percentual = percentual(rec.producao_turno, rec.meta_turno);

        self.hourly.on_tick(rec, now)?;

        let dentro_turno = match rec.shift_window() {
            Some(w) => w.contains(now),
            None => false,
        };
        self.non_scheduled.on_tick(rec, dentro_turno, now)?;

        if delta_contagem > 0 {
            let (_, raw_id) = split_scoped_machine_id(&rec.machine_id);
            let data_ref = operational_day_ref(now).format("%Y-%m-%d").to_string();
            self.event_repo.insert_event(
                &raw_id,
                &rec.machine_id,
                now.and_utc().timestamp_millis(),
                &now.format("%Y-%m-%dT%H:%M:%S").to_string(),
                &data_ref,
                current_hour_index(rec, now).map(|i| i as i64),
                "RUN",
            )?;
        }

        Ok(reset_executado)
    }

    /// 状态查询侧的刷新: 日切检查 + 基线重载 + 小时桶推进 + 平均节拍
    ///
    /// 不触碰 NP 会话(只有 tick 驱动 NP)
    pub fn refresh(&self, rec: &mut MachineRecord, now: NaiveDateTime) -> RepositoryResult<bool> {
        let reset_executado = self.daily_reset.check_rollover(rec, now)?;
        self.sync_baseline(rec, now)?;
        rec.producao_turno = (rec.esp_absoluto - rec.baseline_diario).max(0);
        rec.percentual = percentual(rec.producao_turno, rec.meta_turno);
        self.hourly.on_tick(rec, now)?;
        rec.tempo_medio = tempo_medio(rec, now);
        Ok(reset_executado)
    }

    /// 操作员手动重置: 任意时刻执行快照+清零序列
    pub fn manual_reset(&self, rec: &mut MachineRecord, now: NaiveDateTime) -> RepositoryResult<()> {
        self.daily_reset.reset_contexto(rec, now)
    }

    /// 日基线落锚,(运营日, esp) 与上次持久化相同时跳过写库
    fn sync_baseline(&self, rec: &mut MachineRecord, now: NaiveDateTime) -> RepositoryResult<()> {
        let dia_op = operational_day_ref(now);
        let memo = BaselineMemo {
            dia_ref: dia_op,
            esp_last: rec.esp_absoluto,
        };
        if rec.baseline_memo == Some(memo) {
            return Ok(());
        }
        let dia_ref = dia_op.format("%Y-%m-%d").to_string();
        rec.baseline_diario =
            self.baseline_repo
                .load_or_anchor(&rec.machine_id, &dia_ref, rec.esp_absoluto)?;
        rec.baseline_memo = Some(memo);
        Ok(())
    }
}

// ==========================================
// 状态侧派生计算 (纯函数)
// ==========================================

/// 平均节拍 (分/件): (班次分钟 + NP 分钟) / (班次产量 + NP 产量)
///
/// 没有产量 → None;分钟下限 1 避免起步瞬间的天文节拍
pub fn tempo_medio(rec: &MachineRecord, now: NaiveDateTime) -> Option<f64> {
    let produzido_total = rec.producao_turno + rec.np.np_producao;
    if produzido_total <= 0 {
        return None;
    }

    let mut minutos_prog: i64 = 0;
    if let Some(inicio) = rec.turno_inicio.as_deref() {
        if let Ok(t) = NaiveTime::parse_from_str(inicio.trim(), "%H:%M") {
            let mut ini_dt = now.date().and_time(t);
            if now < ini_dt {
                ini_dt -= Duration::days(1);
            }
            minutos_prog = ((now - ini_dt).num_seconds() / 60).max(0);
        }
    }

    let minutos_total = (minutos_prog + rec.np.np_minutos).max(1);
    Some(round2(minutos_total as f64 / produzido_total as f64))
}

/// 米制换算派生值
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedMl {
    pub conv_m_por_pcs: f64,
    pub meta_turno_ml: f64,
    pub producao_turno_ml: f64,
    pub meta_hora_pcs: i64,
    pub meta_hora_ml: f64,
    pub producao_hora_ml: f64,
}

/// 件 → 米换算,非正/非有限系数按 1.0 处理
pub fn derived_ml(rec: &MachineRecord) -> DerivedMl {
    let mut conv = rec.conv_m_por_pcs;
    if !conv.is_finite() || conv <= 0.0 {
        conv = 1.0;
    }

    let meta_hora_pcs = rec
        .ultima_hora
        .and_then(|idx| rec.meta_por_hora.get(idx))
        .copied()
        .unwrap_or(0);

    DerivedMl {
        conv_m_por_pcs: conv,
        meta_turno_ml: round2(rec.meta_turno as f64 * conv),
        producao_turno_ml: round2(rec.producao_turno as f64 * conv),
        meta_hora_pcs,
        meta_hora_ml: round2(meta_hora_pcs as f64 * conv),
        producao_hora_ml: round2(rec.producao_hora as f64 * conv),
    }
}

/// 24 槽位展示产量: 班次桶按起始墙钟小时摊平,NP 覆盖空槽
///
/// 槽位为 0 且当小时有 NP 产量时,用 NP 值覆盖
pub fn producao_exibicao_24(rec: &MachineRecord, np_por_hora: &[i64]) -> Vec<i64> {
    let mut exib = vec![0i64; 24];

    for (i, faixa) in rec.horas_turno.iter().enumerate() {
        if i >= rec.producao_por_hora.len() {
            break;
        }
        let Some(h_ini) = hora_inicial_da_faixa(faixa) else {
            continue;
        };
        if let Some(v) = rec.producao_por_hora[i] {
            exib[h_ini] = v;
        }
    }

    if np_por_hora.len() == 24 {
        for h in 0..24 {
            if exib[h] == 0 && np_por_hora[h] > 0 {
                exib[h] = np_por_hora[h];
            }
        }
    }

    exib
}

/// UI 状态 + 班次内停机分钟
///
/// 规则:
/// - AUTO 且 alerta>=5 且计数停滞超阈值 → PARADA,锚定在最后计数时刻
/// - AUTO 正常 → PRODUZINDO
/// - 非 AUTO → PARADA,未锚定时锚定在当前时刻
///
/// parado_min 只在配置了班次时按窗口求交;非 AUTO 无班次时退化为总分钟
pub fn ui_state(rec: &mut MachineRecord, now: NaiveDateTime) -> (UiStatus, Option<i64>) {
    let thr = rec.alerta_sem_contagem_seg.unwrap_or(0);
    let last_ts = *rec.last_count_ts.get_or_insert(now);
    let sem_contar = (now - last_ts).num_seconds();

    let tem_turno = rec
        .turno_inicio
        .as_deref()
        .map_or(false, |s| !s.trim().is_empty())
        && rec
            .turno_fim
            .as_deref()
            .map_or(false, |s| !s.trim().is_empty());

    if rec.status == "AUTO" && thr >= 5 && sem_contar >= thr {
        let desde = *rec.machine_stop_since.get_or_insert(last_ts);
        let parado = if tem_turno {
            Some(match rec.shift_window() {
                Some(w) => minutos_parados_no_turno(desde, now, &w),
                None => 0,
            })
        } else {
            None
        };
        return (UiStatus::Parada, parado);
    }

    if rec.status == "AUTO" {
        return (UiStatus::Produzindo, None);
    }

    let desde = *rec.machine_stop_since.get_or_insert(now);
    let parado = if tem_turno {
        Some(match rec.shift_window() {
            Some(w) => minutos_parados_no_turno(desde, now, &w),
            None => 0,
        })
    } else {
        Some((now - desde).num_seconds().max(0) / 60)
    };
    (UiStatus::Parada, parado)
}

/// [desde, ate] 与班次窗口求交的分钟数,逐日扫描覆盖跨天停机
pub fn minutos_parados_no_turno(
    desde: NaiveDateTime,
    ate: NaiveDateTime,
    window: &ShiftWindow,
) -> i64 {
    if ate <= desde {
        return 0;
    }

    let mut d = desde.date() - Duration::days(1);
    let d_fim = ate.date() + Duration::days(1);
    let mut total_segundos = 0i64;

    while d <= d_fim {
        let s = d.and_time(window.inicio);
        let mut e = d.and_time(window.fim);
        if e <= s {
            e += Duration::days(1);
        }
        let x0 = if desde > s { desde } else { s };
        let x1 = if ate < e { ate } else { e };
        if x1 > x0 {
            total_segundos += (x1 - x0).num_seconds();
        }
        d += Duration::days(1);
    }

    total_segundos / 60
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
