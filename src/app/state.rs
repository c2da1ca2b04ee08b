// ==========================================
// 车间机台产量跟踪系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{HistoryApi, TrackingApi};
use crate::db::open_sqlite_connection;
use crate::engine::history::HistoryEngine;
use crate::engine::registry::MachineRegistry;
use crate::engine::tracking::TrackingEngine;
use crate::repository::{
    BaselineRepository, DailyProductionRepository, HourlyProductionRepository,
    MachineConfigRepository, MachineEventRepository, NonScheduledRepository,
    ProductionOrderRepository, ScrapRepository,
};

/// 应用状态
///
/// 包含所有API实例和共享资源
/// 所有仓储共享同一个 SQLite 连接
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 跟踪API (上报/状态/配置/废品/重置)
    pub tracking_api: Arc<TrackingApi>,

    /// 历史查询API
    pub history_api: Arc<HistoryApi>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例
    /// - Err(String): 初始化错误
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开共享数据库连接并建表
    /// 2. 初始化所有Repository
    /// 3. 初始化Engine与API实例
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================

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

        // ==========================================
        // 初始化Engine层
        // ==========================================

        let tracking_engine = Arc::new(TrackingEngine::new(
            baseline_repo,
            hourly_repo.clone(),
            np_repo.clone(),
            daily_repo.clone(),
            event_repo.clone(),
        ));

        let history_engine = Arc::new(HistoryEngine::new(
            daily_repo,
            hourly_repo,
            scrap_repo.clone(),
            np_repo.clone(),
            event_repo,
            order_repo,
            config_repo.clone(),
        ));

        // 内存机台注册表 (懒水合配置)
        let registry = Arc::new(MachineRegistry::new(config_repo.clone()));

        // ==========================================
        // 初始化API层
        // ==========================================

        let tracking_api = Arc::new(TrackingApi::new(
            registry,
            tracking_engine,
            config_repo,
            scrap_repo,
            np_repo,
        ));
        let history_api = Arc::new(HistoryApi::new(history_engine));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            tracking_api,
            history_api,
        })
    }

    /// 获取数据库路径
    pub fn get_db_path(&self) -> &str {
        &self.db_path
    }
}

// ==========================================
// 默认数据库路径辅助函数
// ==========================================

/// 获取默认数据库路径
///
/// # 返回
/// - 开发环境: 用户数据目录/shopfloor-tracking-dev/shopfloor_tracking.db
/// - 生产环境: 用户数据目录/shopfloor-tracking/shopfloor_tracking.db
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    // 允许通过环境变量显式指定 DB 路径（便于调试/测试/CI）
    if let Ok(path) = std::env::var("SHOPFLOOR_TRACKING_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    // 拿不到 data_dir 时回退到工作目录
    let mut path = PathBuf::from("./shopfloor_tracking.db");

    if let Some(data_dir) = dirs::data_dir() {
        // 开发环境使用独立目录，避免污染生产数据
        #[cfg(debug_assertions)]
        {
            path = data_dir.join("shopfloor-tracking-dev");
        }

        #[cfg(not(debug_assertions))]
        {
            path = data_dir.join("shopfloor-tracking");
        }

        std::fs::create_dir_all(&path).ok();
        path = path.join("shopfloor_tracking.db");
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::UpdateMachineRequest;
    use chrono::NaiveDate;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
        assert!(path.ends_with(".db"));
    }

    #[test]
    fn test_app_state_boots_and_serves_apis() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_path = dir
            .path()
            .join("tracking_test.db")
            .to_string_lossy()
            .to_string();

        let state = AppState::new(db_path.clone()).expect("Failed to build AppState");
        assert_eq!(state.get_db_path(), db_path);

        let agora = NaiveDate::from_ymd_opt(2026, 3, 9)
            .expect("invalid date")
            .and_hms_opt(8, 0, 0)
            .expect("invalid time");

        let req = UpdateMachineRequest {
            machine_id: Some("torno-01".to_string()),
            producao_turno: Some(100),
            ..Default::default()
        };
        let resp = state
            .tracking_api
            .update_machine_at(&req, agora)
            .expect("Failed to process tick");
        assert_eq!(resp.machine_id, "torno-01");

        let hist = state
            .history_api
            .production_history_at("torno-01", Some(1), agora)
            .expect("Failed to query history");
        assert_eq!(hist.historico.len(), 1);
    }
}
