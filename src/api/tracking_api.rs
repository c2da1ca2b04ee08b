// ==========================================
// 车间机台产量跟踪系统 - 跟踪 API
// ==========================================
// 职责: 设备上报 / 机台状态 / 班次配置 / 废品登记 / 手动重置
// 约定: 入参校验在这一层完成,业务推进委托给引擎,
//       时间一律由 *_at 变体显式传入,便于确定性回放
// ==========================================

use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::machine::MachineConfig;
use crate::domain::types::{join_scoped_machine_id, run_signal, ProductionUnit, UiStatus};
use crate::engine::registry::MachineRegistry;
use crate::engine::shift_clock::{
    allocate_hourly_targets, compute_hour_buckets, current_hour_index, operational_day_ref,
};
use crate::engine::tracking::{derived_ml, producao_exibicao_24, ui_state, TrackingEngine};
use crate::i18n::{t, t_with_args};
use crate::repository::machine_config_repo::MachineConfigRepository;
use crate::repository::non_scheduled_repo::NonScheduledRepository;
use crate::repository::scrap_repo::ScrapRepository;

// ==========================================
// DTO 定义
// ==========================================

/// 设备上报请求
///
/// run / rodando / sinal_run 三个布尔样字段取或,类型不稳定
/// (1 / "on" / true 混用),保留原始 JSON 值交给解析器
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateMachineRequest {
    pub machine_id: Option<String>,
    pub cliente_id: Option<String>,
    pub status: Option<String>,
    /// 设备绝对计数 (单调递增,硬件重置除外)
    pub producao_turno: Option<i64>,
    pub run: Option<Value>,
    pub rodando: Option<Value>,
    pub sinal_run: Option<Value>,
}

/// 设备上报响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateMachineResponse {
    pub message: String,
    pub machine_id: String,
    pub producao_turno: i64,
    pub percentual_turno: i64,
    /// 本次上报是否触发了日切快照
    pub reset_executado: bool,
}

/// 机台状态响应 (仪表盘聚合视图)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineStatusResponse {
    pub machine_id: String,
    pub nome: String,
    pub status: String,
    pub status_ui: UiStatus,
    pub run: bool,
    pub dia_ref: String,
    pub meta_turno: i64,
    pub turno_inicio: Option<String>,
    pub turno_fim: Option<String>,
    pub rampa_percentual: i64,
    pub unidade_1: Option<ProductionUnit>,
    pub unidade_2: Option<ProductionUnit>,
    pub conv_m_por_pcs: f64,
    pub producao_turno: i64,
    pub percentual_turno: i64,
    pub meta_turno_ml: f64,
    pub producao_turno_ml: f64,
    pub producao_hora: i64,
    pub percentual_hora: i64,
    pub producao_hora_liquida: i64,
    pub meta_hora_pcs: i64,
    pub meta_hora_ml: f64,
    pub producao_hora_ml: f64,
    pub horas_turno: Vec<String>,
    pub meta_por_hora: Vec<i64>,
    pub producao_por_hora: Vec<Option<i64>>,
    pub producao_exibicao_24: Vec<i64>,
    pub refugo_por_hora: Vec<i64>,
    pub np_por_hora_24: Vec<i64>,
    pub np_producao: i64,
    pub np_minutos: i64,
    pub tempo_medio: Option<f64>,
    pub ultima_hora: Option<usize>,
    pub parado_min: Option<i64>,
    pub fora_turno: bool,
}

/// 班次配置请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigureMachineRequest {
    pub machine_id: String,
    pub cliente_id: Option<String>,
    pub meta_turno: i64,
    /// 班次开始 "HH:MM"
    pub inicio: String,
    /// 班次结束 "HH:MM",<= inicio 视为跨午夜
    pub fim: String,
    /// 首小时爬坡百分比 (0..=100)
    pub rampa: i64,
    /// 无计数停机告警阈值(秒),< 5 时忽略并保留旧值
    pub alerta_sem_contagem_seg: Option<i64>,
    pub unidade_1: Option<String>,
    pub unidade_2: Option<String>,
    pub conv_m_por_pcs: Option<f64>,
}

/// 班次配置响应 (生效后的视图)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigureMachineResponse {
    pub status: String,
    pub machine_id: String,
    pub horas_turno: Vec<String>,
    pub meta_por_hora: Vec<i64>,
    pub unidade_1: Option<ProductionUnit>,
    pub unidade_2: Option<ProductionUnit>,
    pub conv_m_por_pcs: f64,
}

/// 废品登记请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveScrapRequest {
    pub machine_id: String,
    pub cliente_id: Option<String>,
    /// 所属运营日 "YYYY-MM-DD",缺省为运营日今天
    pub dia_ref: Option<String>,
    pub hora_dia: i64,
    pub refugo: i64,
}

/// 废品登记响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveScrapResponse {
    pub machine_id: String,
    pub dia_ref: String,
    pub hora_dia: i64,
    pub refugo: i64,
}

/// 手动重置响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualResetResponse {
    pub status: String,
    pub machine_id: String,
}

// ==========================================
// TrackingApi
// ==========================================

/// 跟踪API
///
/// 职责:
/// 1. 设备上报入口 (tick 流水线)
/// 2. 仪表盘状态聚合
/// 3. 班次配置持久化 + 小时目标重算
/// 4. 废品登记校验
/// 5. 操作员手动重置
pub struct TrackingApi {
    registry: Arc<MachineRegistry>,
    engine: Arc<TrackingEngine>,
    config_repo: Arc<MachineConfigRepository>,
    scrap_repo: Arc<ScrapRepository>,
    np_repo: Arc<NonScheduledRepository>,
}

impl TrackingApi {
    /// 创建新的TrackingApi实例
    pub fn new(
        registry: Arc<MachineRegistry>,
        engine: Arc<TrackingEngine>,
        config_repo: Arc<MachineConfigRepository>,
        scrap_repo: Arc<ScrapRepository>,
        np_repo: Arc<NonScheduledRepository>,
    ) -> Self {
        Self {
            registry,
            engine,
            config_repo,
            scrap_repo,
            np_repo,
        }
    }

    // ==========================================
    // 设备上报
    // ==========================================

    /// 处理一笔设备上报 (当前时刻)
    pub fn update_machine(&self, req: &UpdateMachineRequest) -> ApiResult<UpdateMachineResponse> {
        self.update_machine_at(req, Local::now().naive_local())
    }

    /// 处理一笔设备上报
    ///
    /// # 参数
    /// - `req`: 上报载荷 (machine_id 必填,计数/状态/运行信号可缺省)
    /// - `agora`: 上报时刻
    ///
    /// # 返回
    /// - `Ok(UpdateMachineResponse)`: 推进后的班次产量视图
    /// - `Err(ApiError)`: machine_id 缺失或持久化失败
    pub fn update_machine_at(
        &self,
        req: &UpdateMachineRequest,
        agora: NaiveDateTime,
    ) -> ApiResult<UpdateMachineResponse> {
        let bruto = req.machine_id.as_deref().unwrap_or("").trim();
        if bruto.is_empty() {
            return Err(ApiError::InvalidInput(t("machine.id_required")));
        }
        let scoped = join_scoped_machine_id(req.cliente_id.as_deref(), bruto);

        let status = req.status.as_deref().unwrap_or("DESCONHECIDO");
        let esp_absoluto = req.producao_turno.unwrap_or(0);
        let run = run_signal(&[
            req.run.as_ref(),
            req.rodando.as_ref(),
            req.sinal_run.as_ref(),
        ]);

        let (reset_executado, producao_turno, percentual_turno) =
            self.registry.with_record(&scoped, agora, |rec| {
                let reset = self
                    .engine
                    .process_tick(rec, status, esp_absoluto, run, agora)?;
                Ok((reset, rec.producao_turno, rec.percentual))
            })?;

        Ok(UpdateMachineResponse {
            message: t("common.success"),
            machine_id: scoped,
            producao_turno,
            percentual_turno,
            reset_executado,
        })
    }

    // ==========================================
    // 机台状态
    // ==========================================

    /// 机台状态聚合 (当前时刻)
    pub fn machine_status(
        &self,
        machine_id: &str,
        cliente_id: Option<&str>,
    ) -> ApiResult<MachineStatusResponse> {
        self.machine_status_at(machine_id, cliente_id, Local::now().naive_local())
    }

    /// 机台状态聚合
    ///
    /// 查询侧同样执行懒触发日切与小时桶推进,设备断联时
    /// 仪表盘刷新也能保证日切不被跳过
    ///
    /// # 参数
    /// - `machine_id`: 机台ID (裸ID或 "cliente::machine")
    /// - `cliente_id`: 租户ID,提供时与裸ID拼作用域
    /// - `agora`: 查询时刻
    ///
    /// # 返回
    /// - `Ok(MachineStatusResponse)`: 仪表盘聚合视图
    /// - `Err(ApiError)`: machine_id 缺失或查询失败
    pub fn machine_status_at(
        &self,
        machine_id: &str,
        cliente_id: Option<&str>,
        agora: NaiveDateTime,
    ) -> ApiResult<MachineStatusResponse> {
        let bruto = machine_id.trim();
        if bruto.is_empty() {
            return Err(ApiError::InvalidInput(t("machine.id_required")));
        }
        let scoped = join_scoped_machine_id(cliente_id, bruto);
        let dia_ref = operational_day_ref(agora).format("%Y-%m-%d").to_string();

        let resp = self.registry.with_record(&scoped, agora, |rec| {
            self.engine.refresh(rec, agora)?;

            let refugo_por_hora = self.scrap_repo.load_refugo_24(&rec.machine_id, &dia_ref)?;
            let np_por_hora_24 = self.np_repo.load_np_por_hora_24(&rec.machine_id, &dia_ref)?;
            let producao_exibicao = producao_exibicao_24(rec, &np_por_hora_24);
            let (status_ui, parado_min) = ui_state(rec, agora);
            let ml = derived_ml(rec);

            // 班次外且有 NP 产量: "当前小时" 展示 NP 累计
            let fora_turno = rec.ultima_hora.is_none() && rec.np.np_producao > 0;
            let (producao_hora, percentual_hora, producao_hora_liquida) = if fora_turno {
                (rec.np.np_producao, 0, rec.np.np_producao)
            } else {
                let hora_atual = agora.hour() as usize;
                let liquida = (rec.producao_hora - refugo_por_hora[hora_atual]).max(0);
                (rec.producao_hora, rec.percentual_hora, liquida)
            };

            Ok(MachineStatusResponse {
                machine_id: rec.machine_id.clone(),
                nome: rec.nome.clone(),
                status: rec.status.clone(),
                status_ui,
                run: rec.run,
                dia_ref: dia_ref.clone(),
                meta_turno: rec.meta_turno,
                turno_inicio: rec.turno_inicio.clone(),
                turno_fim: rec.turno_fim.clone(),
                rampa_percentual: rec.rampa_percentual,
                unidade_1: rec.unidade_1,
                unidade_2: rec.unidade_2,
                conv_m_por_pcs: ml.conv_m_por_pcs,
                producao_turno: rec.producao_turno,
                percentual_turno: rec.percentual,
                meta_turno_ml: ml.meta_turno_ml,
                producao_turno_ml: ml.producao_turno_ml,
                producao_hora,
                percentual_hora,
                producao_hora_liquida,
                meta_hora_pcs: ml.meta_hora_pcs,
                meta_hora_ml: ml.meta_hora_ml,
                producao_hora_ml: ml.producao_hora_ml,
                horas_turno: rec.horas_turno.clone(),
                meta_por_hora: rec.meta_por_hora.clone(),
                producao_por_hora: rec.producao_por_hora.clone(),
                producao_exibicao_24: producao_exibicao,
                refugo_por_hora,
                np_por_hora_24,
                np_producao: rec.np.np_producao,
                np_minutos: rec.np.np_minutos,
                tempo_medio: rec.tempo_medio,
                ultima_hora: rec.ultima_hora,
                parado_min,
                fora_turno,
            })
        })?;

        Ok(resp)
    }

    // ==========================================
    // 班次配置
    // ==========================================

    /// 配置机台班次 (当前时刻)
    pub fn configure_machine(
        &self,
        req: &ConfigureMachineRequest,
    ) -> ApiResult<ConfigureMachineResponse> {
        self.configure_machine_at(req, Local::now().naive_local())
    }

    /// 配置机台班次
    ///
    /// 重新生成小时桶与每小时目标,当前小时基线重锚在当前计数,
    /// 配置行持久化到 machine_config
    ///
    /// # 参数
    /// - `req`: 配置载荷
    /// - `agora`: 配置时刻
    ///
    /// # 返回
    /// - `Ok(ConfigureMachineResponse)`: 生效后的配置视图
    /// - `Err(ApiError)`: 班次范围无效 / 入参越界 / 持久化失败
    pub fn configure_machine_at(
        &self,
        req: &ConfigureMachineRequest,
        agora: NaiveDateTime,
    ) -> ApiResult<ConfigureMachineResponse> {
        let bruto = req.machine_id.trim();
        if bruto.is_empty() {
            return Err(ApiError::InvalidInput(t("machine.id_required")));
        }
        if req.meta_turno < 0 {
            return Err(ApiError::InvalidInput(t("config.meta_invalida")));
        }
        if !(0..=100).contains(&req.rampa) {
            return Err(ApiError::InvalidInput(t("config.rampa_invalida")));
        }

        let horas = compute_hour_buckets(&req.inicio, &req.fim).map_err(|_| {
            ApiError::InvalidInput(t_with_args(
                "turno.faixa_invalida",
                &[("inicio", req.inicio.trim()), ("fim", req.fim.trim())],
            ))
        })?;
        let metas = allocate_hourly_targets(req.meta_turno, &horas, req.rampa);

        let scoped = join_scoped_machine_id(req.cliente_id.as_deref(), bruto);
        let resp = self.registry.with_record(&scoped, agora, |rec| {
            rec.meta_turno = req.meta_turno;
            rec.turno_inicio = Some(req.inicio.trim().to_string());
            rec.turno_fim = Some(req.fim.trim().to_string());
            rec.rampa_percentual = req.rampa;
            if let Some(alerta) = req.alerta_sem_contagem_seg {
                if alerta >= 5 {
                    rec.alerta_sem_contagem_seg = Some(alerta);
                }
            }
            rec.apply_units(req.unidade_1.as_deref(), req.unidade_2.as_deref());
            rec.apply_conversion(req.conv_m_por_pcs);
            rec.horas_turno = horas.clone();
            rec.meta_por_hora = metas.clone();

            // 当前小时重锚: 配置后小时产量从零起算
            rec.baseline_hora = rec.esp_absoluto;
            rec.ultima_hora = current_hour_index(rec, agora);
            rec.producao_hora = 0;
            rec.percentual_hora = 0;
            rec.producao_por_hora = vec![None; rec.horas_turno.len()];
            rec.producao_por_hora_ref = None;

            let cfg = MachineConfig {
                machine_id: rec.machine_id.clone(),
                meta_turno: rec.meta_turno,
                turno_inicio: rec.turno_inicio.clone(),
                turno_fim: rec.turno_fim.clone(),
                rampa_percentual: rec.rampa_percentual,
                horas_turno_json: serde_json::to_string(&rec.horas_turno).ok(),
                meta_por_hora_json: serde_json::to_string(&rec.meta_por_hora).ok(),
                unidade_1: rec.unidade_1.map(|u| u.as_str().to_string()),
                unidade_2: rec.unidade_2.map(|u| u.as_str().to_string()),
                conv_m_por_pcs: rec.conv_m_por_pcs,
                alerta_sem_contagem_seg: rec.alerta_sem_contagem_seg,
                updated_at: agora.format("%Y-%m-%d %H:%M:%S").to_string(),
            };
            self.config_repo.upsert(&cfg)?;

            Ok(ConfigureMachineResponse {
                status: "configurado".to_string(),
                machine_id: rec.machine_id.clone(),
                horas_turno: rec.horas_turno.clone(),
                meta_por_hora: rec.meta_por_hora.clone(),
                unidade_1: rec.unidade_1,
                unidade_2: rec.unidade_2,
                conv_m_por_pcs: rec.conv_m_por_pcs,
            })
        })?;

        Ok(resp)
    }

    // ==========================================
    // 废品登记
    // ==========================================

    /// 登记小时废品数 (当前时刻)
    pub fn save_scrap(&self, req: &SaveScrapRequest) -> ApiResult<SaveScrapResponse> {
        self.save_scrap_at(req, Local::now().naive_local())
    }

    /// 登记小时废品数
    ///
    /// 校验规则:
    /// - hora_dia 必须在 0..=23
    /// - 负 refugo 钳为 0
    /// - 运营日今天之后的 dia_ref 拒绝
    /// - dia_ref 为今天时只允许已结束的小时
    ///
    /// # 参数
    /// - `req`: 登记载荷,dia_ref 缺省为运营日今天
    /// - `agora`: 登记时刻
    ///
    /// # 返回
    /// - `Ok(SaveScrapResponse)`: 落库后的登记回显
    /// - `Err(ApiError)`: 校验失败或持久化失败
    pub fn save_scrap_at(
        &self,
        req: &SaveScrapRequest,
        agora: NaiveDateTime,
    ) -> ApiResult<SaveScrapResponse> {
        let bruto = req.machine_id.trim();
        if bruto.is_empty() {
            return Err(ApiError::InvalidInput(t("machine.id_required")));
        }
        if !(0..=23).contains(&req.hora_dia) {
            return Err(ApiError::InvalidInput(t("refugo.hora_invalida")));
        }

        let hoje = operational_day_ref(agora);
        let dia = match req.dia_ref.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|_| ApiError::InvalidInput(t("refugo.dia_invalido")))?,
            _ => hoje,
        };

        if dia > hoje {
            return Err(ApiError::ValidationError(t("refugo.dia_futuro")));
        }
        if dia == hoje && req.hora_dia >= i64::from(agora.hour()) {
            return Err(ApiError::ValidationError(t("refugo.hora_futura")));
        }

        let scoped = join_scoped_machine_id(req.cliente_id.as_deref(), bruto);
        let dia_ref = dia.format("%Y-%m-%d").to_string();
        let refugo = req.refugo.max(0);
        self.scrap_repo
            .upsert_refugo(&scoped, &dia_ref, req.hora_dia, refugo)?;

        Ok(SaveScrapResponse {
            machine_id: scoped,
            dia_ref,
            hora_dia: req.hora_dia,
            refugo,
        })
    }

    // ==========================================
    // 手动重置
    // ==========================================

    /// 操作员手动重置 (当前时刻)
    pub fn manual_reset(
        &self,
        machine_id: &str,
        cliente_id: Option<&str>,
    ) -> ApiResult<ManualResetResponse> {
        self.manual_reset_at(machine_id, cliente_id, Local::now().naive_local())
    }

    /// 操作员手动重置: 不等日切,立即执行快照+清零序列
    pub fn manual_reset_at(
        &self,
        machine_id: &str,
        cliente_id: Option<&str>,
        agora: NaiveDateTime,
    ) -> ApiResult<ManualResetResponse> {
        let bruto = machine_id.trim();
        if bruto.is_empty() {
            return Err(ApiError::InvalidInput(t("machine.id_required")));
        }
        let scoped = join_scoped_machine_id(cliente_id, bruto);

        self.registry
            .with_record(&scoped, agora, |rec| self.engine.manual_reset(rec, agora))?;

        Ok(ManualResetResponse {
            status: "resetado".to_string(),
            machine_id: scoped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::db::open_sqlite_connection;
    use crate::repository::baseline_repo::BaselineRepository;
    use crate::repository::daily_production_repo::DailyProductionRepository;
    use crate::repository::hourly_production_repo::HourlyProductionRepository;
    use crate::repository::machine_event_repo::MachineEventRepository;

    struct Harness {
        api: TrackingApi,
        daily_repo: Arc<DailyProductionRepository>,
        scrap_repo: Arc<ScrapRepository>,
        config_repo: Arc<MachineConfigRepository>,
    }

    fn harness() -> Harness {
        let conn = Arc::new(Mutex::new(
            open_sqlite_connection(":memory:").expect("Failed to open connection"),
        ));
        let baseline_repo = Arc::new(
            BaselineRepository::from_connection(Arc::clone(&conn))
                .expect("Failed to create baseline repo"),
        );
        let hourly_repo = Arc::new(
            HourlyProductionRepository::from_connection(Arc::clone(&conn))
                .expect("Failed to create hourly repo"),
        );
        let np_repo = Arc::new(
            NonScheduledRepository::from_connection(Arc::clone(&conn))
                .expect("Failed to create np repo"),
        );
        let daily_repo = Arc::new(
            DailyProductionRepository::from_connection(Arc::clone(&conn))
                .expect("Failed to create daily repo"),
        );
        let event_repo = Arc::new(
            MachineEventRepository::from_connection(Arc::clone(&conn))
                .expect("Failed to create event repo"),
        );
        let config_repo = Arc::new(
            MachineConfigRepository::from_connection(Arc::clone(&conn))
                .expect("Failed to create config repo"),
        );
        let scrap_repo = Arc::new(
            ScrapRepository::from_connection(Arc::clone(&conn))
                .expect("Failed to create scrap repo"),
        );

        let engine = Arc::new(TrackingEngine::new(
            baseline_repo,
            hourly_repo,
            Arc::clone(&np_repo),
            Arc::clone(&daily_repo),
            event_repo,
        ));
        let registry = Arc::new(MachineRegistry::new(Arc::clone(&config_repo)));
        let api = TrackingApi::new(
            registry,
            engine,
            Arc::clone(&config_repo),
            Arc::clone(&scrap_repo),
            Arc::clone(&np_repo),
        );

        Harness {
            api,
            daily_repo,
            scrap_repo,
            config_repo,
        }
    }

    fn dt(dia: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, dia)
            .expect("invalid date")
            .and_hms_opt(h, m, 0)
            .expect("invalid time")
    }

    fn config_basica(machine_id: &str) -> ConfigureMachineRequest {
        ConfigureMachineRequest {
            machine_id: machine_id.to_string(),
            meta_turno: 480,
            inicio: "06:00".to_string(),
            fim: "14:00".to_string(),
            rampa: 50,
            ..Default::default()
        }
    }

    #[test]
    fn test_update_machine_requires_id() {
        let h = harness();
        let result = h.api.update_machine_at(&UpdateMachineRequest::default(), dt(10, 8, 0));
        assert!(matches!(result, Err(ApiError::InvalidInput(_))));
    }

    #[test]
    fn test_update_machine_scopes_id_and_accumulates() {
        let h = harness();
        let req = UpdateMachineRequest {
            machine_id: Some("Torno-01".to_string()),
            cliente_id: Some("C1".to_string()),
            status: Some("AUTO".to_string()),
            producao_turno: Some(1000),
            run: Some(serde_json::json!(1)),
            ..Default::default()
        };

        let resp = h.api.update_machine_at(&req, dt(10, 8, 0)).expect("update failed");
        assert_eq!(resp.machine_id, "c1::torno-01");
        assert_eq!(resp.producao_turno, 0); // 首笔只落基线
        assert!(!resp.reset_executado);

        let req2 = UpdateMachineRequest {
            producao_turno: Some(1060),
            ..req
        };
        let resp = h.api.update_machine_at(&req2, dt(10, 8, 10)).expect("update failed");
        assert_eq!(resp.producao_turno, 60);
    }

    #[test]
    fn test_configure_machine_allocates_targets() {
        let h = harness();
        let mut req = config_basica("torno-01");
        req.alerta_sem_contagem_seg = Some(3); // < 5 → 忽略
        req.unidade_1 = Some("pcs".to_string());
        req.conv_m_por_pcs = Some(2.5);

        let resp = h
            .api
            .configure_machine_at(&req, dt(10, 8, 0))
            .expect("configure failed");
        assert_eq!(resp.status, "configurado");
        assert_eq!(resp.horas_turno.len(), 8);
        assert_eq!(resp.meta_por_hora.iter().sum::<i64>(), 480);
        assert_eq!(resp.meta_por_hora[0], 30); // 60 * 50%
        assert_eq!(resp.unidade_1, Some(ProductionUnit::Pcs));
        assert_eq!(resp.conv_m_por_pcs, 2.5);

        let cfg = h
            .config_repo
            .find_by_machine("torno-01")
            .expect("Failed to query config")
            .expect("config missing");
        assert_eq!(cfg.meta_turno, 480);
        assert_eq!(cfg.alerta_sem_contagem_seg, None);
        assert_eq!(cfg.horas_turno().len(), 8);
    }

    #[test]
    fn test_configure_machine_unknown_unit_yields_none() {
        let h = harness();
        let mut req = config_basica("torno-02");
        req.unidade_1 = Some("caixa".to_string());
        req.unidade_2 = Some("m²".to_string());

        let resp = h
            .api
            .configure_machine_at(&req, dt(10, 8, 0))
            .expect("configure failed");
        // 封闭集合之外的标签不产生单位
        assert_eq!(resp.unidade_1, None);
        assert_eq!(resp.unidade_2, None);

        let cfg = h
            .config_repo
            .find_by_machine("torno-02")
            .expect("Failed to query config")
            .expect("config missing");
        assert_eq!(cfg.unidade_1, None);
        assert_eq!(cfg.unidade_2, None);
    }

    #[test]
    fn test_configure_machine_rejects_bad_range() {
        let h = harness();
        let mut req = config_basica("torno-01");
        req.inicio = "6h".to_string();
        let result = h.api.configure_machine_at(&req, dt(10, 8, 0));
        assert!(matches!(result, Err(ApiError::InvalidInput(_))));

        let mut req = config_basica("torno-01");
        req.rampa = 150;
        let result = h.api.configure_machine_at(&req, dt(10, 8, 0));
        assert!(matches!(result, Err(ApiError::InvalidInput(_))));

        let mut req = config_basica("torno-01");
        req.meta_turno = -10;
        let result = h.api.configure_machine_at(&req, dt(10, 8, 0));
        assert!(matches!(result, Err(ApiError::InvalidInput(_))));
    }

    #[test]
    fn test_status_roundtrip_after_ticks() {
        let h = harness();
        h.api
            .configure_machine_at(&config_basica("torno-01"), dt(10, 7, 55))
            .expect("configure failed");

        let tick = |esp: i64| UpdateMachineRequest {
            machine_id: Some("torno-01".to_string()),
            status: Some("AUTO".to_string()),
            producao_turno: Some(esp),
            run: Some(serde_json::json!("1")),
            ..Default::default()
        };
        h.api
            .update_machine_at(&tick(1000), dt(10, 8, 0))
            .expect("tick failed");
        h.api
            .update_machine_at(&tick(1060), dt(10, 8, 10))
            .expect("tick failed");

        let status = h
            .api
            .machine_status_at("torno-01", None, dt(10, 8, 20))
            .expect("status failed");
        assert_eq!(status.producao_turno, 60);
        assert_eq!(status.percentual_turno, 13); // 60/480 → 12.5 → 13
        assert_eq!(status.status_ui, UiStatus::Produzindo);
        assert_eq!(status.dia_ref, "2026-03-09");
        assert_eq!(status.horas_turno.len(), 8);
        assert_eq!(status.refugo_por_hora.len(), 24);
        assert!(!status.fora_turno);
    }

    #[test]
    fn test_status_requires_id() {
        let h = harness();
        let result = h.api.machine_status_at("   ", None, dt(10, 8, 0));
        assert!(matches!(result, Err(ApiError::InvalidInput(_))));
    }

    #[test]
    fn test_status_outside_shift_shows_np_total() {
        let h = harness();
        // 无班次配置: 所有 tick 都是班次外
        let tick = |esp: i64| UpdateMachineRequest {
            machine_id: Some("fresa-02".to_string()),
            status: Some("AUTO".to_string()),
            producao_turno: Some(esp),
            ..Default::default()
        };
        h.api
            .update_machine_at(&tick(100), dt(10, 20, 0))
            .expect("tick failed");
        h.api
            .update_machine_at(&tick(105), dt(10, 20, 10))
            .expect("tick failed");

        let status = h
            .api
            .machine_status_at("fresa-02", None, dt(10, 20, 15))
            .expect("status failed");
        assert!(status.fora_turno);
        assert_eq!(status.np_producao, 5);
        assert_eq!(status.producao_hora, 5);
        assert_eq!(status.producao_hora_liquida, 5);
        assert_eq!(status.percentual_hora, 0);
        assert_eq!(status.np_por_hora_24[20], 5);
        assert_eq!(status.producao_exibicao_24[20], 5);
    }

    #[test]
    fn test_save_scrap_validations() {
        let h = harness();
        // agora = 2026-03-10 08:00 → 运营日今天 = 2026-03-09
        let agora = dt(10, 8, 0);

        let mut req = SaveScrapRequest {
            machine_id: "torno-01".to_string(),
            hora_dia: 24,
            refugo: 3,
            ..Default::default()
        };
        assert!(matches!(
            h.api.save_scrap_at(&req, agora),
            Err(ApiError::InvalidInput(_))
        ));

        req.hora_dia = 5;
        req.dia_ref = Some("2026-03-10".to_string()); // 运营日明天
        assert!(matches!(
            h.api.save_scrap_at(&req, agora),
            Err(ApiError::ValidationError(_))
        ));

        req.dia_ref = Some("2026-03-09".to_string());
        req.hora_dia = 8; // >= hora atual (08) → 未结束
        assert!(matches!(
            h.api.save_scrap_at(&req, agora),
            Err(ApiError::ValidationError(_))
        ));

        req.dia_ref = Some("10/03/2026".to_string());
        req.hora_dia = 5;
        assert!(matches!(
            h.api.save_scrap_at(&req, agora),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_save_scrap_clamps_and_persists() {
        let h = harness();
        let agora = dt(10, 8, 0);

        let resp = h
            .api
            .save_scrap_at(
                &SaveScrapRequest {
                    machine_id: "Torno-01".to_string(),
                    cliente_id: Some("c1".to_string()),
                    dia_ref: None, // 缺省运营日今天
                    hora_dia: 7,
                    refugo: -9,
                },
                agora,
            )
            .expect("save failed");
        assert_eq!(resp.machine_id, "c1::torno-01");
        assert_eq!(resp.dia_ref, "2026-03-09");
        assert_eq!(resp.refugo, 0);

        // 过去日期不受当前小时限制
        h.api
            .save_scrap_at(
                &SaveScrapRequest {
                    machine_id: "torno-01".to_string(),
                    cliente_id: Some("c1".to_string()),
                    dia_ref: Some("2026-03-08".to_string()),
                    hora_dia: 23,
                    refugo: 4,
                },
                agora,
            )
            .expect("save failed");

        let refugo24 = h
            .scrap_repo
            .load_refugo_24("c1::torno-01", "2026-03-08")
            .expect("Failed to load refugo");
        assert_eq!(refugo24[23], 4);
    }

    #[test]
    fn test_manual_reset_snapshots_once() {
        let h = harness();
        h.api
            .configure_machine_at(&config_basica("torno-01"), dt(10, 7, 55))
            .expect("configure failed");

        let tick = |esp: i64| UpdateMachineRequest {
            machine_id: Some("torno-01".to_string()),
            status: Some("AUTO".to_string()),
            producao_turno: Some(esp),
            ..Default::default()
        };
        h.api
            .update_machine_at(&tick(500), dt(10, 8, 0))
            .expect("tick failed");
        h.api
            .update_machine_at(&tick(560), dt(10, 8, 30))
            .expect("tick failed");

        let resp = h
            .api
            .manual_reset_at("torno-01", None, dt(10, 9, 0))
            .expect("reset failed");
        assert_eq!(resp.status, "resetado");

        let count = h
            .daily_repo
            .count_for_machine_day("torno-01", "2026-03-09")
            .expect("Failed to count rows");
        assert_eq!(count, 1);

        // 重置后班次产量归零
        let status = h
            .api
            .machine_status_at("torno-01", None, dt(10, 9, 5))
            .expect("status failed");
        assert_eq!(status.producao_turno, 0);
    }
}
