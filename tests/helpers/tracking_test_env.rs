// ==========================================
// 跟踪系统集成测试环境
// ==========================================
// 职责: 用临时文件库装配完整的仓储/引擎/API 栈,
//       并暴露仓储句柄供测试直接造数
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tempfile::NamedTempFile;

use shopfloor_tracking::api::{HistoryApi, TrackingApi};
use shopfloor_tracking::db::open_sqlite_connection;
use shopfloor_tracking::engine::history::HistoryEngine;
use shopfloor_tracking::engine::registry::MachineRegistry;
use shopfloor_tracking::engine::tracking::TrackingEngine;
use shopfloor_tracking::repository::{
    BaselineRepository, DailyProductionRepository, HourlyProductionRepository,
    MachineConfigRepository, MachineEventRepository, NonScheduledRepository,
    ProductionOrderRepository, ScrapRepository,
};

/// 集成测试环境
///
/// 所有仓储共享同一个连接,与生产装配一致
pub struct TrackingTestEnv {
    pub db_path: String,
    pub tracking_api: Arc<TrackingApi>,
    pub history_api: Arc<HistoryApi>,

    // Repository层（用于测试数据准备与断言）
    pub config_repo: Arc<MachineConfigRepository>,
    pub baseline_repo: Arc<BaselineRepository>,
    pub daily_repo: Arc<DailyProductionRepository>,
    pub hourly_repo: Arc<HourlyProductionRepository>,
    pub scrap_repo: Arc<ScrapRepository>,
    pub np_repo: Arc<NonScheduledRepository>,
    pub event_repo: Arc<MachineEventRepository>,
    pub order_repo: Arc<ProductionOrderRepository>,
    pub conn: Arc<Mutex<Connection>>,

    // 临时文件（确保生命周期）
    _temp_file: NamedTempFile,
}

impl TrackingTestEnv {
    pub fn new() -> Result<Self, String> {
        let temp_file = NamedTempFile::new().map_err(|e| format!("无法创建临时文件: {}", e))?;
        let db_path = temp_file.path().to_string_lossy().to_string();

        let conn = Arc::new(Mutex::new(
            open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?,
        ));

        let config_repo = Arc::new(
            MachineConfigRepository::from_connection(conn.clone())
                .map_err(|e| format!("无法创建MachineConfigRepository: {}", e))?,
        );
        let baseline_repo = Arc::new(
            BaselineRepository::from_connection(conn.clone())
                .map_err(|e| format!("无法创建BaselineRepository: {}", e))?,
        );
        let daily_repo = Arc::new(
            DailyProductionRepository::from_connection(conn.clone())
                .map_err(|e| format!("无法创建DailyProductionRepository: {}", e))?,
        );
        let hourly_repo = Arc::new(
            HourlyProductionRepository::from_connection(conn.clone())
                .map_err(|e| format!("无法创建HourlyProductionRepository: {}", e))?,
        );
        let scrap_repo = Arc::new(
            ScrapRepository::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ScrapRepository: {}", e))?,
        );
        let np_repo = Arc::new(
            NonScheduledRepository::from_connection(conn.clone())
                .map_err(|e| format!("无法创建NonScheduledRepository: {}", e))?,
        );
        let event_repo = Arc::new(
            MachineEventRepository::from_connection(conn.clone())
                .map_err(|e| format!("无法创建MachineEventRepository: {}", e))?,
        );
        let order_repo = Arc::new(
            ProductionOrderRepository::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ProductionOrderRepository: {}", e))?,
        );

        let tracking_engine = Arc::new(TrackingEngine::new(
            baseline_repo.clone(),
            hourly_repo.clone(),
            np_repo.clone(),
            daily_repo.clone(),
            event_repo.clone(),
        ));
        let history_engine = Arc::new(HistoryEngine::new(
            daily_repo.clone(),
            hourly_repo.clone(),
            scrap_repo.clone(),
            np_repo.clone(),
            event_repo.clone(),
            order_repo.clone(),
            config_repo.clone(),
        ));
        let registry = Arc::new(MachineRegistry::new(config_repo.clone()));

        let tracking_api = Arc::new(TrackingApi::new(
            registry,
            tracking_engine,
            config_repo.clone(),
            scrap_repo.clone(),
            np_repo.clone(),
        ));
        let history_api = Arc::new(HistoryApi::new(history_engine));

        Ok(Self {
            db_path,
            tracking_api,
            history_api,
            config_repo,
            baseline_repo,
            daily_repo,
            hourly_repo,
            scrap_repo,
            np_repo,
            event_repo,
            order_repo,
            conn,
            _temp_file: temp_file,
        })
    }
}
