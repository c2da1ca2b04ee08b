// ==========================================
// 车间机台产量跟踪系统 - 每日基线仓储
// ==========================================
// 职责: 管理 baseline_diario 表 (运营日维度的计数锚点)
// 规则: 无行 → 以当前绝对计数落锚;计数回退 → 重新落锚
// ==========================================

use crate::db::open_sqlite_connection;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

pub struct BaselineRepository {
    conn: Arc<Mutex<Connection>>,
}

impl BaselineRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        let repo = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        repo.ensure_table()?;
        Ok(repo)
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        let repo = Self { conn };
        repo.ensure_table()?;
        Ok(repo)
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 确保表存在（如果不存在则创建）
    fn ensure_table(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS baseline_diario (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              machine_id TEXT NOT NULL,
              dia_ref TEXT NOT NULL,
              baseline_esp INTEGER NOT NULL,
              esp_last INTEGER NOT NULL,
              updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS ux_baseline_diario
              ON baseline_diario(machine_id, dia_ref);
            "#,
        )?;
        Ok(())
    }

    /// 加载当日基线,缺失则落锚,计数回退则重锚
    ///
    /// 返回生效的基线值;esp_last 每次都会刷新
    pub fn load_or_anchor(
        &self,
        machine_id: &str,
        dia_ref: &str,
        esp_absoluto: i64,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let atual = conn
            .query_row(
                r#"
                SELECT baseline_esp FROM baseline_diario
                WHERE machine_id = ?1 AND dia_ref = ?2
                LIMIT 1
                "#,
                params![machine_id, dia_ref],
                |row| row.get::<_, i64>(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(RepositoryError::from(other)),
            })?;

        let mut baseline = atual.unwrap_or(esp_absoluto);
        // 设备计数回退(清零/换表) → 重锚
        if esp_absoluto < baseline {
            baseline = esp_absoluto;
        }

        conn.execute(
            r#"
            INSERT INTO baseline_diario (machine_id, dia_ref, baseline_esp, esp_last, updated_at)
            VALUES (?1, ?2, ?3, ?4, datetime('now', 'localtime'))
            ON CONFLICT(machine_id, dia_ref)
            DO UPDATE SET
                baseline_esp = excluded.baseline_esp,
                esp_last = excluded.esp_last,
                updated_at = excluded.updated_at
            "#,
            params![machine_id, dia_ref, baseline, esp_absoluto],
        )?;
        Ok(baseline)
    }

    /// 强制落锚 (日切 / 手动重置路径)
    pub fn persist(&self, machine_id: &str, dia_ref: &str, esp_absoluto: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO baseline_diario (machine_id, dia_ref, baseline_esp, esp_last, updated_at)
            VALUES (?1, ?2, ?3, ?3, datetime('now', 'localtime'))
            ON CONFLICT(machine_id, dia_ref)
            DO UPDATE SET
                baseline_esp = excluded.baseline_esp,
                esp_last = excluded.esp_last,
                updated_at = excluded.updated_at
            "#,
            params![machine_id, dia_ref, esp_absoluto],
        )?;
        Ok(())
    }
}
