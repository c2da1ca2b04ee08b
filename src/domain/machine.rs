// ==========================================
// 车间机台产量跟踪系统 - 机台实体
// ==========================================
// 职责: 机台配置实体 + 注册表内存记录
// 红线: 不含数据访问逻辑,引擎通过公共字段读写
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::domain::shift::ShiftWindow;
use crate::domain::types::{apply_units, ProductionUnit};

// ==========================================
// MachineConfig - 机台配置实体 (machine_config 表)
// ==========================================

/// 机台配置(持久化形态,JSON 列保持字符串)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineConfig {
    pub machine_id: String,                  // 作用域机台ID
    pub meta_turno: i64,                     // 班次目标产量
    pub turno_inicio: Option<String>,        // 班次开始 "HH:MM"
    pub turno_fim: Option<String>,           // 班次结束 "HH:MM"
    pub rampa_percentual: i64,               // 首小时爬坡百分比
    pub horas_turno_json: Option<String>,    // 小时桶标签 JSON 数组
    pub meta_por_hora_json: Option<String>,  // 每小时目标 JSON 数组
    pub unidade_1: Option<String>,           // 主计量单位
    pub unidade_2: Option<String>,           // 副计量单位
    pub conv_m_por_pcs: f64,                 // 件 → 米换算系数
    pub alerta_sem_contagem_seg: Option<i64>, // 无计数停机告警阈值(秒)
    pub updated_at: String,                  // 更新时间
}

impl MachineConfig {
    /// 解析小时桶标签列,坏 JSON 安全退化为空
    pub fn horas_turno(&self) -> Vec<String> {
        self.horas_turno_json
            .as_deref()
            .and_then(|s| serde_json::from_str::<Vec<String>>(s).ok())
            .unwrap_or_default()
    }

    /// 解析每小时目标列,坏 JSON 安全退化为空
    pub fn meta_por_hora(&self) -> Vec<i64> {
        self.meta_por_hora_json
            .as_deref()
            .and_then(|s| serde_json::from_str::<Vec<i64>>(s).ok())
            .unwrap_or_default()
    }
}

// ==========================================
// NonScheduledState - 非计划生产会话状态
// ==========================================

/// 班次窗口外的生产累计(NP)
///
/// contador_anterior 为上一笔绝对计数,delta 在引擎侧做非负钳制
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonScheduledState {
    pub dia_ref: NaiveDate,                    // 所属运营日
    pub np_producao: i64,                      // NP 件数累计
    pub np_minutos: i64,                       // NP 分钟累计
    pub ultimo_ts: Option<NaiveDateTime>,      // 上一笔时间戳
    pub contador_anterior: Option<i64>,        // 上一笔绝对计数
    pub ativo: bool,                           // 上一笔是否活跃
}

impl NonScheduledState {
    pub fn new(dia_ref: NaiveDate) -> Self {
        Self {
            dia_ref,
            np_producao: 0,
            np_minutos: 0,
            ultimo_ts: None,
            contador_anterior: None,
            ativo: false,
        }
    }

    /// 清零会话跟踪字段,保留累计值
    pub fn close_session(&mut self) {
        self.ativo = false;
    }

    /// 日切: 换运营日并清空全部状态(累计由调用方从库重载)
    pub fn roll_to_day(&mut self, dia_ref: NaiveDate) {
        *self = NonScheduledState::new(dia_ref);
    }
}

// ==========================================
// BaselineMemo - 基线写入去重备忘
// ==========================================

/// 上一次落库的 (运营日, esp_last),相同则跳过重复 upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineMemo {
    pub dia_ref: NaiveDate,
    pub esp_last: i64,
}

// ==========================================
// MachineRecord - 注册表内存记录
// ==========================================

/// 机台运行时记录
///
/// 生命周期: 注册表懒初始化 → machine_config 水合 → tick 驱动更新
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineRecord {
    pub machine_id: String,                   // 作用域机台ID
    pub nome: String,                         // 展示名(默认ID大写)
    pub status: String,                       // 原始状态(大写)
    pub run: bool,                            // 设备运行信号
    pub meta_turno: i64,                      // 班次目标
    pub turno_inicio: Option<String>,         // 班次开始 "HH:MM"
    pub turno_fim: Option<String>,            // 班次结束 "HH:MM"
    pub rampa_percentual: i64,                // 首小时爬坡百分比
    pub unidade_1: Option<ProductionUnit>,    // 主单位
    pub unidade_2: Option<ProductionUnit>,    // 副单位
    pub conv_m_por_pcs: f64,                  // 件 → 米换算系数
    pub alerta_sem_contagem_seg: Option<i64>, // 无计数停机阈值(秒)
    pub esp_absoluto: i64,                    // 设备绝对计数
    pub baseline_diario: i64,                 // 当日基线
    pub baseline_hora: i64,                   // 当前小时基线
    pub producao_turno: i64,                  // 班次产量
    pub producao_anterior: i64,               // 上一小时收尾产量
    pub producao_hora: i64,                   // 当前小时产量
    pub percentual: i64,                      // 班次完成百分比
    pub percentual_hora: i64,                 // 小时完成百分比
    pub horas_turno: Vec<String>,             // 小时桶标签
    pub meta_por_hora: Vec<i64>,              // 每小时目标
    pub producao_por_hora: Vec<Option<i64>>,  // 各小时产量 (未收尾 → None)
    pub producao_por_hora_ref: Option<(NaiveDate, usize)>, // 小时向量已加载的 (运营日, 长度)
    pub ultima_hora: Option<usize>,           // 当前小时索引
    pub ultimo_dia: NaiveDate,                // 最近运营日
    pub reset_executado_hoje: bool,           // 日切防重入护栏
    pub tempo_medio: Option<f64>,             // 平均节拍(分/件)
    pub np: NonScheduledState,                // 非计划生产状态
    pub machine_stop_since: Option<NaiveDateTime>, // 官方停机起点
    pub last_count_ts: Option<NaiveDateTime>, // 最近一次计数变化时刻
    pub last_count_val: Option<i64>,          // 最近一次计数值
    pub baseline_memo: Option<BaselineMemo>,  // 基线写入去重
}

impl MachineRecord {
    /// 注册表懒初始化缺省记录
    pub fn for_machine(machine_id: &str, dia_operacional: NaiveDate) -> Self {
        Self {
            machine_id: machine_id.to_string(),
            nome: machine_id.to_uppercase(),
            status: "DESCONHECIDO".to_string(),
            run: false,
            meta_turno: 0,
            turno_inicio: None,
            turno_fim: None,
            rampa_percentual: 0,
            unidade_1: None,
            unidade_2: None,
            conv_m_por_pcs: 1.0,
            alerta_sem_contagem_seg: None,
            esp_absoluto: 0,
            baseline_diario: 0,
            baseline_hora: 0,
            producao_turno: 0,
            producao_anterior: 0,
            producao_hora: 0,
            percentual: 0,
            percentual_hora: 0,
            horas_turno: Vec::new(),
            meta_por_hora: Vec::new(),
            producao_por_hora: Vec::new(),
            producao_por_hora_ref: None,
            ultima_hora: None,
            ultimo_dia: dia_operacional,
            reset_executado_hoje: false,
            tempo_medio: None,
            np: NonScheduledState::new(dia_operacional),
            machine_stop_since: None,
            last_count_ts: None,
            last_count_val: None,
            baseline_memo: None,
        }
    }

    /// 从配置行水合(只覆盖配置派生字段,保留计数状态)
    pub fn apply_config(&mut self, cfg: &MachineConfig) {
        self.meta_turno = cfg.meta_turno;
        self.turno_inicio = cfg.turno_inicio.clone();
        self.turno_fim = cfg.turno_fim.clone();
        self.rampa_percentual = cfg.rampa_percentual;
        self.horas_turno = cfg.horas_turno();
        self.meta_por_hora = cfg.meta_por_hora();
        let (u1, u2) = apply_units(cfg.unidade_1.as_deref(), cfg.unidade_2.as_deref());
        self.unidade_1 = u1;
        self.unidade_2 = u2;
        if cfg.conv_m_por_pcs.is_finite() && cfg.conv_m_por_pcs > 0.0 {
            self.conv_m_por_pcs = cfg.conv_m_por_pcs;
        }
        self.alerta_sem_contagem_seg = cfg.alerta_sem_contagem_seg;
    }

    /// 应用单位对(保留已有值作为缺省)
    pub fn apply_units(&mut self, u1: Option<&str>, u2: Option<&str>) {
        let u1_novo = u1.and_then(ProductionUnit::parse).or(self.unidade_1);
        let u2_novo = u2.and_then(ProductionUnit::parse).or(self.unidade_2);
        self.unidade_1 = u1_novo;
        self.unidade_2 = match (u1_novo, u2_novo) {
            (Some(a), Some(b)) if a == b => None,
            (_, other) => other,
        };
    }

    /// 保存换算系数,仅接受有限正数,否则保持原值
    pub fn apply_conversion(&mut self, conv: Option<f64>) {
        if let Some(c) = conv {
            if c.is_finite() && c > 0.0 {
                self.conv_m_por_pcs = c;
            }
        }
    }

    /// 班次时间窗,配置缺失或不可解析 → None
    pub fn shift_window(&self) -> Option<ShiftWindow> {
        let ini = self.turno_inicio.as_deref()?;
        let fim = self.turno_fim.as_deref()?;
        ShiftWindow::parse(ini, fim).ok()
    }
}
