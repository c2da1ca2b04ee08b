// ==========================================
// 车间机台产量跟踪系统 - 主入口
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 设备上报驱动的班次产量跟踪
// ==========================================

use shopfloor_tracking::app::{get_default_db_path, AppState};
use shopfloor_tracking::logging;

fn main() {
    // 初始化日志系统
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", shopfloor_tracking::APP_NAME);
    tracing::info!("系统版本: {}", shopfloor_tracking::VERSION);
    tracing::info!("==================================================");

    // 获取数据库路径
    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    // 创建AppState (建表 + 装配 API)
    tracing::info!("正在初始化AppState...");
    let _app_state = match AppState::new(db_path) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("无法初始化AppState: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("AppState初始化成功");
    tracing::info!("库模式接入: shopfloor_tracking::AppState (tracking_api / history_api)");
}
