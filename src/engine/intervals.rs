// ==========================================
// 车间机台产量跟踪系统 - 运行区间引擎
// ==========================================
// 职责: 脉冲时刻 → 运行区间 → 按小时切分 RUN/STOP/NP 片段
// 红线: 纯计算,不访问数据库
// ==========================================

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

/// 无计数停机阈值缺省值(秒)
pub const DEFAULT_STOP_SEC: i64 = 120;

/// 日明细里一段连续状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub start: String,      // "HH:MM:SS"
    pub end: String,        // "HH:MM:SS"
    pub state: SegmentState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SegmentState {
    Run,
    Stop,
    Np,
}

/// 合并重叠/相接的区间,输入顺序任意
pub fn merge_intervals(
    mut intervals: Vec<(NaiveDateTime, NaiveDateTime)>,
) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    if intervals.is_empty() {
        return intervals;
    }
    intervals.sort_by_key(|&(inicio, _)| inicio);

    let mut merged: Vec<(NaiveDateTime, NaiveDateTime)> = Vec::with_capacity(intervals.len());
    for (inicio, fim) in intervals {
        match merged.last_mut() {
            Some((_, fim_atual)) if inicio <= *fim_atual => {
                if fim > *fim_atual {
                    *fim_atual = fim;
                }
            }
            _ => merged.push((inicio, fim)),
        }
    }
    merged
}

/// 每个脉冲时刻展开为 [t, t + stop_sec] 再合并
///
/// stop_sec 非正时退回缺省 120 秒
pub fn compute_run_intervals(
    event_times: &[NaiveDateTime],
    stop_sec: i64,
) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let stop = if stop_sec > 0 { stop_sec } else { DEFAULT_STOP_SEC };
    let intervals = event_times
        .iter()
        .map(|&t| (t, t + Duration::seconds(stop)))
        .collect();
    merge_intervals(intervals)
}

/// 两区间交集,空交集 → None
pub fn intersect(
    a_inicio: NaiveDateTime,
    a_fim: NaiveDateTime,
    b_inicio: NaiveDateTime,
    b_fim: NaiveDateTime,
) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let inicio = a_inicio.max(b_inicio);
    let fim = a_fim.min(b_fim);
    if fim <= inicio {
        None
    } else {
        Some((inicio, fim))
    }
}

/// 把一个小时窗切成连续片段
///
/// 非计划小时整段 NP;否则运行区间交出 RUN,空隙补 STOP
pub fn build_segments_for_hour(
    hour_start: NaiveDateTime,
    hour_end: NaiveDateTime,
    is_np: bool,
    run_intervals: &[(NaiveDateTime, NaiveDateTime)],
) -> Vec<Segment> {
    const FMT: &str = "%H:%M:%S";

    if is_np {
        return vec![Segment {
            start: hour_start.format(FMT).to_string(),
            end: hour_end.format(FMT).to_string(),
            state: SegmentState::Np,
        }];
    }

    let mut intersections: Vec<(NaiveDateTime, NaiveDateTime)> = Vec::new();
    for &(run_inicio, run_fim) in run_intervals {
        if let Some(inter) = intersect(hour_start, hour_end, run_inicio, run_fim) {
            intersections.push(inter);
        }
    }
    let intersections = merge_intervals(intersections);

    let mut segs = Vec::new();
    let mut cursor = hour_start;
    for (run_inicio, run_fim) in intersections {
        if run_inicio > cursor {
            segs.push(Segment {
                start: cursor.format(FMT).to_string(),
                end: run_inicio.format(FMT).to_string(),
                state: SegmentState::Stop,
            });
        }
        segs.push(Segment {
            start: run_inicio.format(FMT).to_string(),
            end: run_fim.format(FMT).to_string(),
            state: SegmentState::Run,
        });
        cursor = run_fim;
    }
    if cursor < hour_end {
        segs.push(Segment {
            start: cursor.format(FMT).to_string(),
            end: hour_end.format(FMT).to_string(),
            state: SegmentState::Stop,
        });
    }
    segs
}
