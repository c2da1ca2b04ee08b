// ==========================================
// 历史查询端到端测试
// ==========================================
// 测试范围:
// 1. 日切快照 + 废品登记 → 多日历史清单
// 2. 遗留/作用域双写伪影的读侧对账
// 3. 单日 24 小时明细的桶位映射与 NP 补显
// ==========================================

#[path = "helpers/tracking_test_env.rs"]
mod tracking_test_env;

use chrono::{NaiveDate, NaiveDateTime};
use shopfloor_tracking::api::{ConfigureMachineRequest, SaveScrapRequest, UpdateMachineRequest};
use shopfloor_tracking::engine::intervals::SegmentState;
use tracking_test_env::TrackingTestEnv;

fn dt(dia: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, dia)
        .expect("invalid date")
        .and_hms_opt(h, m, 0)
        .expect("invalid time")
}

fn config_diurna(machine_id: &str) -> ConfigureMachineRequest {
    ConfigureMachineRequest {
        machine_id: machine_id.to_string(),
        meta_turno: 480,
        inicio: "06:00".to_string(),
        fim: "14:00".to_string(),
        rampa: 100,
        ..Default::default()
    }
}

fn tick(machine_id: &str, cliente_id: Option<&str>, esp: i64) -> UpdateMachineRequest {
    UpdateMachineRequest {
        machine_id: Some(machine_id.to_string()),
        cliente_id: cliente_id.map(str::to_string),
        status: Some("AUTO".to_string()),
        producao_turno: Some(esp),
        run: Some(serde_json::json!(1)),
        ..Default::default()
    }
}

// ==========================================
// 测试1: 日切 + 废品 → 历史清单
// ==========================================
#[test]
fn test_historico_reflete_snapshot_e_refugo() {
    let env = TrackingTestEnv::new().expect("无法创建测试环境");
    env.tracking_api
        .configure_machine_at(&config_diurna("torno-07"), dt(10, 5, 0))
        .expect("配置失败");

    env.tracking_api
        .update_machine_at(&tick("torno-07", None, 500), dt(10, 8, 0))
        .expect("上报失败");
    env.tracking_api
        .update_machine_at(&tick("torno-07", None, 560), dt(10, 12, 0))
        .expect("上报失败");

    // 23:59 日切: 快照运营日 03-09
    let resp = env
        .tracking_api
        .update_machine_at(&tick("torno-07", None, 560), dt(10, 23, 59))
        .expect("上报失败");
    assert!(resp.reset_executado);

    // 次日补登 03-09 的废品
    env.tracking_api
        .save_scrap_at(
            &SaveScrapRequest {
                machine_id: "torno-07".to_string(),
                dia_ref: Some("2026-03-09".to_string()),
                hora_dia: 10,
                refugo: 15,
                ..Default::default()
            },
            dt(11, 8, 0),
        )
        .expect("登记失败");

    let hist = env
        .history_api
        .production_history_at("torno-07", Some(2), dt(11, 8, 0))
        .expect("历史查询失败");
    assert_eq!(hist.dias, 2);
    assert_eq!(hist.historico.len(), 2);

    let dia_fechado = &hist.historico[0];
    assert_eq!(dia_fechado.data, "2026-03-09");
    assert_eq!(dia_fechado.produzido, 60);
    assert_eq!(dia_fechado.refugo, 15);
    assert_eq!(dia_fechado.pecas_boas, 45);
    assert_eq!(dia_fechado.meta, Some(480));
    assert_eq!(dia_fechado.percentual, Some(13));

    // 新运营日还没快照
    assert_eq!(hist.historico[1].data, "2026-03-10");
    assert_eq!(hist.historico[1].produzido, 0);
}

// ==========================================
// 测试2: 双写伪影对账
// ==========================================
#[test]
fn test_dupla_escrita_legado_e_escopado_reconcilia() {
    let env = TrackingTestEnv::new().expect("无法创建测试环境");

    // 同一台物理机器以裸ID和作用域ID两条轨道上报
    env.tracking_api
        .update_machine_at(&tick("torno-08", None, 1000), dt(10, 9, 0))
        .expect("上报失败");
    env.tracking_api
        .update_machine_at(&tick("torno-08", None, 1030), dt(10, 9, 30))
        .expect("上报失败");
    env.tracking_api
        .update_machine_at(&tick("Torno-08", Some("C1"), 500), dt(10, 9, 0))
        .expect("上报失败");
    env.tracking_api
        .update_machine_at(&tick("Torno-08", Some("C1"), 560), dt(10, 9, 30))
        .expect("上报失败");

    // 两条轨道各落一份日快照: 30 与 60
    env.tracking_api
        .manual_reset_at("torno-08", None, dt(10, 10, 0))
        .expect("重置失败");
    env.tracking_api
        .manual_reset_at("torno-08", Some("c1"), dt(10, 10, 0))
        .expect("重置失败");

    // 60 = 2×30 → 双计伪影,对账取 30
    let hist = env
        .history_api
        .production_history_at("torno-08", Some(1), dt(10, 11, 0))
        .expect("历史查询失败");
    assert_eq!(hist.historico.len(), 1);
    assert_eq!(hist.historico[0].data, "2026-03-09");
    assert_eq!(hist.historico[0].produzido, 30);
}

// ==========================================
// 测试3: 单日明细桶位映射
// ==========================================
#[test]
fn test_day_detail_mapeia_buckets_e_np() {
    let env = TrackingTestEnv::new().expect("无法创建测试环境");
    env.tracking_api
        .configure_machine_at(&config_diurna("torno-09"), dt(10, 5, 0))
        .expect("配置失败");

    // 班次内 8 点小时产 60 件
    env.tracking_api
        .update_machine_at(&tick("torno-09", None, 0), dt(10, 8, 0))
        .expect("上报失败");
    env.tracking_api
        .update_machine_at(&tick("torno-09", None, 60), dt(10, 8, 20))
        .expect("上报失败");
    // 班次外 20 点产 5 件 (NP)
    env.tracking_api
        .update_machine_at(&tick("torno-09", None, 65), dt(10, 20, 0))
        .expect("上报失败");
    env.tracking_api
        .update_machine_at(&tick("torno-09", None, 70), dt(10, 20, 10))
        .expect("上报失败");
    // 已结束小时的废品
    env.tracking_api
        .save_scrap_at(
            &SaveScrapRequest {
                machine_id: "torno-09".to_string(),
                dia_ref: Some("2026-03-09".to_string()),
                hora_dia: 8,
                refugo: 4,
                ..Default::default()
            },
            dt(10, 21, 0),
        )
        .expect("登记失败");

    let detalhe = env
        .history_api
        .day_detail_at("torno-09", Some("2026-03-09"), dt(10, 21, 30))
        .expect("明细查询失败");
    assert_eq!(detalhe.date, "2026-03-09");
    assert_eq!(detalhe.stop_sec, 120);
    assert_eq!(detalhe.hours.len(), 24);

    // 桶 2 ("08:00 - 09:00") → 墙钟小时 8
    // 20:00 的 tick 关闭了还开着的 8 点小时,离班后的 5 件一并结算
    let h8 = &detalhe.hours[8];
    assert_eq!(h8.slot, "08:00-09:00");
    assert_eq!(h8.meta, 60);
    assert_eq!(h8.produzido, 65);
    assert_eq!(h8.refugo, 4);

    // 20 点没有班次目标 → 整段 NP,补显非计划产量 (65→70 共 10 件)
    let h20 = &detalhe.hours[20];
    assert_eq!(h20.meta, 0);
    assert_eq!(h20.produzido, 10);
    assert_eq!(h20.segments.len(), 1);
    assert_eq!(h20.segments[0].state, SegmentState::Np);

    // 凌晨没有任何活动的小时同样整段 NP,产量 0
    let h3 = &detalhe.hours[3];
    assert_eq!(h3.meta, 0);
    assert_eq!(h3.produzido, 0);
}
