// ==========================================
// 车间机台产量跟踪系统 - 班次时间窗
// ==========================================
// 职责: 解析 HH:MM 班次配置,推导跨午夜窗口的锚定区间
// 约束: fim <= inicio 视为跨天班次(+1 天),inicio == fim 为整 24 小时
// ==========================================

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ==========================================
// 错误类型
// ==========================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShiftRangeError {
    /// 时间串不符合 HH:MM 或范围无意义
    #[error("班次时间范围无效: {inicio} - {fim}")]
    InvalidRange { inicio: String, fim: String },
}

// ==========================================
// ShiftWindow - 班次时间窗
// ==========================================

/// 班次时间窗(只含时刻,不含日期)
///
/// 日期锚定在查询时根据 `now` 推导,见 [`ShiftWindow::anchored`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftWindow {
    pub inicio: NaiveTime, // 班次开始时刻
    pub fim: NaiveTime,    // 班次结束时刻
}

impl ShiftWindow {
    /// 从 "HH:MM" 字符串对解析
    ///
    /// 任一端不可解析 → InvalidRange,不退化为空窗口
    pub fn parse(inicio: &str, fim: &str) -> Result<Self, ShiftRangeError> {
        let err = || ShiftRangeError::InvalidRange {
            inicio: inicio.to_string(),
            fim: fim.to_string(),
        };
        let ini = NaiveTime::parse_from_str(inicio.trim(), "%H:%M").map_err(|_| err())?;
        let fim_t = NaiveTime::parse_from_str(fim.trim(), "%H:%M").map_err(|_| err())?;
        Ok(Self {
            inicio: ini,
            fim: fim_t,
        })
    }

    /// 班次时长(整小时数)
    ///
    /// fim <= inicio 跨天,inicio == fim 为 24 小时
    pub fn duration_hours(&self) -> i64 {
        let mut delta = self.fim.signed_duration_since(self.inicio);
        if delta <= Duration::zero() {
            delta = delta + Duration::days(1);
        }
        delta.num_hours()
    }

    /// 推导锚定区间 [inicio_dt, fim_dt)
    ///
    /// 规则:
    /// 1. 以 now 当天为基准组合 inicio/fim
    /// 2. fim <= inicio → fim +1 天(跨午夜)
    /// 3. now 在 inicio 之前且窗口跨日 → 整体回退 1 天
    ///    (凌晨时段归属前一天开始的夜班)
    pub fn anchored(&self, now: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
        let d0 = now.date();
        let mut ini_dt = d0.and_time(self.inicio);
        let mut fim_dt = d0.and_time(self.fim);
        if fim_dt <= ini_dt {
            fim_dt += Duration::days(1);
        }
        if now < ini_dt && fim_dt.date() > d0 {
            ini_dt -= Duration::days(1);
            fim_dt -= Duration::days(1);
        }
        (ini_dt, fim_dt)
    }

    /// 锚定班次开始时刻: now 之前最近的一次班次开始
    pub fn start_anchor(&self, now: NaiveDateTime) -> NaiveDateTime {
        let mut ini_dt = now.date().and_time(self.inicio);
        if now < ini_dt {
            ini_dt -= Duration::days(1);
        }
        ini_dt
    }

    /// now 是否落在班次窗口内 (闭开区间)
    pub fn contains(&self, now: NaiveDateTime) -> bool {
        let (ini, fim) = self.anchored(now);
        ini <= now && now < fim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, d)
            .expect("invalid date")
            .and_hms_opt(h, m, 0)
            .expect("invalid time")
    }

    #[test]
    fn test_parse_valid() {
        let w = ShiftWindow::parse("06:00", "14:00").expect("Failed to parse shift");
        assert_eq!(w.duration_hours(), 8);
    }

    #[test]
    fn test_parse_invalid_is_error() {
        let err = ShiftWindow::parse("6h", "14:00").expect_err("Should reject bad time");
        assert!(matches!(err, ShiftRangeError::InvalidRange { .. }));
    }

    #[test]
    fn test_overnight_duration() {
        let w = ShiftWindow::parse("22:00", "06:00").expect("Failed to parse shift");
        assert_eq!(w.duration_hours(), 8);
    }

    #[test]
    fn test_equal_bounds_full_day() {
        let w = ShiftWindow::parse("07:00", "07:00").expect("Failed to parse shift");
        assert_eq!(w.duration_hours(), 24);
    }

    #[test]
    fn test_anchored_day_shift() {
        let w = ShiftWindow::parse("06:00", "14:00").expect("Failed to parse shift");
        let (ini, fim) = w.anchored(dt(10, 9, 30));
        assert_eq!(ini, dt(10, 6, 0));
        assert_eq!(fim, dt(10, 14, 0));
        assert!(w.contains(dt(10, 9, 30)));
        assert!(!w.contains(dt(10, 14, 0)));
    }

    #[test]
    fn test_anchored_overnight_early_morning() {
        // 凌晨 02:00 属于昨天 22:00 开始的夜班
        let w = ShiftWindow::parse("22:00", "06:00").expect("Failed to parse shift");
        let (ini, fim) = w.anchored(dt(10, 2, 0));
        assert_eq!(ini, dt(9, 22, 0));
        assert_eq!(fim, dt(10, 6, 0));
        assert!(w.contains(dt(10, 2, 0)));
    }

    #[test]
    fn test_anchored_overnight_late_evening() {
        let w = ShiftWindow::parse("22:00", "06:00").expect("Failed to parse shift");
        let (ini, fim) = w.anchored(dt(10, 23, 0));
        assert_eq!(ini, dt(10, 22, 0));
        assert_eq!(fim, dt(11, 6, 0));
        assert!(w.contains(dt(10, 23, 0)));
        // 下午在窗口外
        assert!(!w.contains(dt(10, 15, 0)));
    }

    #[test]
    fn test_start_anchor() {
        let w = ShiftWindow::parse("06:00", "14:00").expect("Failed to parse shift");
        assert_eq!(w.start_anchor(dt(10, 9, 0)), dt(10, 6, 0));
        // 班次开始前 → 锚定到前一天
        assert_eq!(w.start_anchor(dt(10, 5, 0)), dt(9, 6, 0));
    }
}
