// ==========================================
// 车间机台产量跟踪系统 - 历史查询 API
// ==========================================
// 职责: 多日历史清单 / 单日明细回放
// 约定: 只读入口,日期入参宽容解析 (ISO 与巴西格式),
//       无法解析时回落到运营日今天
// ==========================================

use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::api::error::{ApiError, ApiResult};
use crate::engine::history::{
    DayDetail, HistoryDay, HistoryEngine, HISTORY_DAYS_DEFAULT, HISTORY_DAYS_MAX,
};
use crate::engine::shift_clock::operational_day_ref;
use crate::i18n::t;

// ==========================================
// DTO 定义
// ==========================================

/// 多日历史响应
#[derive(Debug, Clone, Serialize)]
pub struct ProductionHistoryResponse {
    pub machine_id: String,
    /// 实际生效的天数 (请求值钳制在 1..=60 后)
    pub dias: i64,
    pub historico: Vec<HistoryDay>,
}

// ==========================================
// HistoryApi
// ==========================================

/// 历史查询API
///
/// 职责:
/// 1. 多日产量历史 (对账汇总 + 废品 + 工单上下文)
/// 2. 单日 24 小时明细 (RUN/STOP/NP 片段回放)
pub struct HistoryApi {
    engine: Arc<HistoryEngine>,
}

impl HistoryApi {
    /// 创建新的HistoryApi实例
    pub fn new(engine: Arc<HistoryEngine>) -> Self {
        Self { engine }
    }

    // ==========================================
    // 多日历史
    // ==========================================

    /// 多日产量历史 (当前时刻)
    pub fn production_history(
        &self,
        machine_id: &str,
        days: Option<i64>,
    ) -> ApiResult<ProductionHistoryResponse> {
        self.production_history_at(machine_id, days, Local::now().naive_local())
    }

    /// 多日产量历史,截至运营日今天
    ///
    /// # 参数
    /// - `machine_id`: 机台ID (裸ID或 "cliente::machine",逐日解析有效ID)
    /// - `days`: 天数,缺省 10,钳制在 1..=60
    /// - `agora`: 查询时刻 (决定运营日终点)
    ///
    /// # 返回
    /// - `Ok(ProductionHistoryResponse)`: 逐日对账后的清单
    /// - `Err(ApiError)`: machine_id 缺失或查询失败
    pub fn production_history_at(
        &self,
        machine_id: &str,
        days: Option<i64>,
        agora: NaiveDateTime,
    ) -> ApiResult<ProductionHistoryResponse> {
        let mid = machine_id.trim();
        if mid.is_empty() {
            return Err(ApiError::InvalidInput(t("historico.maquina_obrigatoria")));
        }

        let dias = days.unwrap_or(HISTORY_DAYS_DEFAULT).clamp(1, HISTORY_DAYS_MAX);
        let historico = self.engine.production_history(mid, dias, agora)?;

        Ok(ProductionHistoryResponse {
            machine_id: mid.to_string(),
            dias,
            historico,
        })
    }

    // ==========================================
    // 单日明细
    // ==========================================

    /// 单日 24 小时明细 (当前时刻)
    pub fn day_detail(&self, machine_id: &str, data: Option<&str>) -> ApiResult<DayDetail> {
        self.day_detail_at(machine_id, data, Local::now().naive_local())
    }

    /// 单日 24 小时明细
    ///
    /// # 参数
    /// - `machine_id`: 机台ID (裸ID或 "cliente::machine")
    /// - `data`: 目标日期,"YYYY-MM-DD" 或 "DD/MM/YYYY",
    ///   缺省或无法解析时取运营日今天
    /// - `agora`: 查询时刻
    ///
    /// # 返回
    /// - `Ok(DayDetail)`: 24 个小时槽位 + RUN/STOP/NP 片段
    /// - `Err(ApiError)`: machine_id 缺失或查询失败
    pub fn day_detail_at(
        &self,
        machine_id: &str,
        data: Option<&str>,
        agora: NaiveDateTime,
    ) -> ApiResult<DayDetail> {
        let mid = machine_id.trim();
        if mid.is_empty() {
            return Err(ApiError::InvalidInput(t("historico.maquina_obrigatoria")));
        }

        let dia = data
            .and_then(parse_date_any)
            .unwrap_or_else(|| operational_day_ref(agora));
        Ok(self.engine.day_detail(mid, dia)?)
    }
}

/// 宽容解析日期: ISO 在前,巴西格式兜底
fn parse_date_any(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d/%m/%Y"))
        .ok()
}
