// ==========================================
// 车间机台产量跟踪系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为，避免“部分模块外键开启/部分不开启”
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 提供历史库结构探测(旧库列名不统一,查询前需要落点确认)
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 表是否存在
pub fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let found: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1 LIMIT 1",
            [table],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);
    Ok(found)
}

/// 列是否存在（PRAGMA table_info 探测）
pub fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// 解析历史表的日期列名
///
/// 旧库部分表用 `data`,新库统一 `data_ref`;两者都在时优先 `data_ref`
pub fn resolve_date_column(conn: &Connection, table: &str) -> rusqlite::Result<&'static str> {
    if has_column(conn, table, "data_ref")? {
        return Ok("data_ref");
    }
    if has_column(conn, table, "data")? {
        return Ok("data");
    }
    Ok("data_ref")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_and_column_probing() {
        let conn = open_sqlite_connection(":memory:").expect("Failed to open connection");
        conn.execute_batch("CREATE TABLE amostra (id INTEGER PRIMARY KEY, data TEXT, valor REAL);")
            .expect("Failed to create table");

        assert!(table_exists(&conn, "amostra").expect("probe failed"));
        assert!(!table_exists(&conn, "inexistente").expect("probe failed"));
        assert!(has_column(&conn, "amostra", "valor").expect("probe failed"));
        assert!(!has_column(&conn, "amostra", "data_ref").expect("probe failed"));
    }

    #[test]
    fn test_resolve_date_column_prefers_data_ref() {
        let conn = open_sqlite_connection(":memory:").expect("Failed to open connection");
        conn.execute_batch(
            r#"
            CREATE TABLE legado (id INTEGER, data TEXT);
            CREATE TABLE novo (id INTEGER, data TEXT, data_ref TEXT);
            "#,
        )
        .expect("Failed to create tables");

        assert_eq!(
            resolve_date_column(&conn, "legado").expect("probe failed"),
            "data"
        );
        assert_eq!(
            resolve_date_column(&conn, "novo").expect("probe failed"),
            "data_ref"
        );
        // 表不存在时按新库缺省
        assert_eq!(
            resolve_date_column(&conn, "fantasma").expect("probe failed"),
            "data_ref"
        );
    }
}
