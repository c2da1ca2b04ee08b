// ==========================================
// 车间机台产量跟踪系统 - 班次时钟引擎
// ==========================================
// 职责: 小时桶生成 / 每小时目标分配 / 当前小时索引 / 运营日推导
// 红线: 纯计算,不访问数据库
// ==========================================

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};

use crate::domain::machine::MachineRecord;
use crate::domain::shift::{ShiftRangeError, ShiftWindow};

/// 生成一小时宽的班次桶标签,如 "06:00 - 07:00"
///
/// fim <= inicio 按跨午夜处理;inicio == fim 视为整 24 小时班次
pub fn compute_hour_buckets(inicio: &str, fim: &str) -> Result<Vec<String>, ShiftRangeError> {
    let window = ShiftWindow::parse(inicio, fim)?;

    // 锚定在任意一天即可,标签只含时分
    let d0 = NaiveDate::from_ymd_opt(2000, 1, 1)
        .unwrap_or_default()
        .and_time(window.inicio);
    let mut fim_dt = d0.date().and_time(window.fim);
    if fim_dt <= d0 {
        fim_dt += Duration::days(1);
    }

    let mut horas = Vec::new();
    let mut atual = d0;
    while atual < fim_dt {
        let proxima = atual + Duration::hours(1);
        horas.push(format!(
            "{} - {}",
            atual.format("%H:%M"),
            proxima.format("%H:%M")
        ));
        atual = proxima;
    }
    Ok(horas)
}

/// 把班次目标分配到各小时桶
///
/// 首小时按爬坡百分比取整,余量对剩余小时整除,零头 +1 给靠前的桶,
/// 总和恒等于 meta_turno
pub fn allocate_hourly_targets(meta_turno: i64, horas: &[String], rampa_percentual: i64) -> Vec<i64> {
    let qtd_horas = horas.len();
    if qtd_horas == 0 {
        return Vec::new();
    }

    let meta_base = meta_turno as f64 / qtd_horas as f64;
    let meta_primeira = (meta_base * (rampa_percentual as f64 / 100.0)).round() as i64;
    let restante = meta_turno - meta_primeira;
    let horas_restantes = (qtd_horas - 1) as i64;

    let mut metas = vec![meta_primeira];

    if horas_restantes > 0 {
        // div_euclid/rem_euclid: restante 为负时仍保持总和不变
        let base = restante.div_euclid(horas_restantes);
        let sobra = restante.rem_euclid(horas_restantes);
        for i in 0..horas_restantes {
            metas.push(base + if i < sobra { 1 } else { 0 });
        }
    }

    metas
}

/// 当前时刻落在班次的第几个小时桶 (0-based),窗口外 → None
pub fn current_hour_index(record: &MachineRecord, now: NaiveDateTime) -> Option<usize> {
    if record.horas_turno.is_empty() {
        return None;
    }
    let window = record.shift_window()?;

    let inicio_dt = window.start_anchor(now);
    let fim_dt = inicio_dt + Duration::hours(record.horas_turno.len() as i64);

    if now < inicio_dt || now >= fim_dt {
        return None;
    }

    let diff_h = (now - inicio_dt).num_seconds() / 3600;
    if diff_h < 0 || diff_h as usize >= record.horas_turno.len() {
        return None;
    }
    Some(diff_h as usize)
}

/// 运营日参考日期: 23:59 起算新的一天
///
/// 23:59 之前归前一个日历日,23:59 及之后归当日
pub fn operational_day_ref(now: NaiveDateTime) -> NaiveDate {
    if reached_reset_cutoff(now) {
        now.date()
    } else {
        now.date() - Duration::days(1)
    }
}

/// 是否已到达日切阈值 (23:59)
pub fn reached_reset_cutoff(now: NaiveDateTime) -> bool {
    now.hour() == 23 && now.minute() >= 59
}

/// 完成百分比,目标非正 → 0
pub fn percentual(producao: i64, meta: i64) -> i64 {
    if meta > 0 {
        ((producao as f64 / meta as f64) * 100.0).round() as i64
    } else {
        0
    }
}

/// 按索引取小时目标,越界 → 0
pub fn meta_por_idx(record: &MachineRecord, idx: usize) -> i64 {
    record.meta_por_hora.get(idx).copied().unwrap_or(0)
}

/// 解析桶标签的起始小时: "12:00 - 13:00" → 12
pub fn hora_inicial_da_faixa(faixa: &str) -> Option<usize> {
    let inicio = faixa.split('-').next()?.trim();
    let h: usize = inicio.split(':').next()?.trim().parse().ok()?;
    if h < 24 {
        Some(h)
    } else {
        None
    }
}
