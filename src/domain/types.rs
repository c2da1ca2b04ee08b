// ==========================================
// 车间机台产量跟踪系统 - 领域类型定义
// ==========================================
// 职责: 计量单位、布尔信号解析、机台界面状态
// 红线: 布尔解析只认白名单字面量,不做猜测
// ==========================================

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ==========================================
// 计量单位 (Production Unit)
// ==========================================
// 封闭集合: pcs / m / m2,之外的标签一律视为无单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductionUnit {
    Pcs, // 件
    M,   // 米
    M2,  // 平方米
}

impl ProductionUnit {
    /// 归一化自由文本单位标签
    ///
    /// 规则: 去首尾空白 + 小写后,仅接受 pcs / m / m2,
    /// 其余输入(包括空串)→ None
    pub fn parse(raw: &str) -> Option<ProductionUnit> {
        match raw.trim().to_lowercase().as_str() {
            "pcs" => Some(ProductionUnit::Pcs),
            "m" => Some(ProductionUnit::M),
            "m2" => Some(ProductionUnit::M2),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductionUnit::Pcs => "pcs",
            ProductionUnit::M => "m",
            ProductionUnit::M2 => "m2",
        }
    }
}

impl fmt::Display for ProductionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 应用主/副单位对
///
/// 归一化后两者相同时副单位去重为 None
pub fn apply_units(
    primary: Option<&str>,
    secondary: Option<&str>,
) -> (Option<ProductionUnit>, Option<ProductionUnit>) {
    let u1 = primary.and_then(ProductionUnit::parse);
    let u2 = secondary.and_then(ProductionUnit::parse);
    let u2 = match (u1, u2) {
        (Some(a), Some(b)) if a == b => None,
        (_, other) => other,
    };
    (u1, u2)
}

// ==========================================
// 布尔信号解析 (Flag Parsing)
// ==========================================
// 设备上报的运行信号类型不稳定: true / 1 / "1" / "on" 混用
// 白名单之外的值一律返回 None,由调用方决定缺省
const TRUE_LITERALS: &[&str] = &["1", "true", "t", "yes", "y", "on"];
const FALSE_LITERALS: &[&str] = &["0", "false", "f"];

/// 解析布尔样载荷字段
///
/// 接受的字面量(大小写不敏感,自动去空白):
/// - 真: 1, "1", "true", "t", "yes", "y", "on"
/// - 假: 0, "0", "false", "f"
/// - 其余(包括 null、空串、未知词) → None
pub fn parse_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => {
            let s = s.trim().to_lowercase();
            if TRUE_LITERALS.contains(&s.as_str()) {
                Some(true)
            } else if FALSE_LITERALS.contains(&s.as_str()) {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// 综合运行信号: run / rodando / sinal_run 任一为真即真
pub fn run_signal(fields: &[Option<&Value>]) -> bool {
    fields
        .iter()
        .flatten()
        .any(|v| parse_flag(v).unwrap_or(false))
}

// ==========================================
// 机台界面状态 (UI Status)
// ==========================================
// 由原始状态 + 计数停滞规则推导,见 tracking 引擎
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UiStatus {
    Produzindo, // 生产中
    Parada,     // 停机
}

impl fmt::Display for UiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UiStatus::Produzindo => write!(f, "PRODUZINDO"),
            UiStatus::Parada => write!(f, "PARADA"),
        }
    }
}

// ==========================================
// 作用域机台ID (Scoped Machine Id)
// ==========================================

/// 拆分 `cliente_id::machine_id` 形式的作用域ID
///
/// 无 `::` 时返回 (None, 原始ID);两侧均做去空白 + 小写归一
pub fn split_scoped_machine_id(raw: &str) -> (Option<String>, String) {
    let normalized = raw.trim().to_lowercase();
    match normalized.split_once("::") {
        Some((cid, mid)) if !cid.is_empty() => (Some(cid.to_string()), mid.to_string()),
        Some((_, mid)) => (None, mid.to_string()),
        None => (None, normalized),
    }
}

/// 组装作用域ID,cliente 缺失时退回原始机台ID
pub fn join_scoped_machine_id(cliente_id: Option<&str>, machine_id: &str) -> String {
    let mid = machine_id.trim().to_lowercase();
    match cliente_id {
        Some(cid) if !cid.trim().is_empty() => {
            format!("{}::{}", cid.trim().to_lowercase(), mid)
        }
        _ => mid,
    }
}
