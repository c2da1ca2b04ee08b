// ==========================================
// 车间机台产量跟踪系统 - 每日产量快照仓储
// ==========================================
// 职责: 管理 producao_diaria 表 (日切快照 + 历史对账查询)
// 说明: 旧库日期列叫 data,新库叫 data_ref,查询前探测落点
// 说明: 同一机台可能同时存在裸ID行与作用域ID行,对账在引擎侧完成
// ==========================================

use crate::db::{open_sqlite_connection, resolve_date_column};
use crate::domain::types::split_scoped_machine_id;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};

/// 每日产量快照行
#[derive(Debug, Clone)]
pub struct DailyProductionRow {
    pub machine_id: String,       // 落库时的机台ID(裸或作用域)
    pub data: String,             // 快照日期 (YYYY-MM-DD)
    pub produzido: i64,           // 产量
    pub meta: Option<i64>,        // 班次目标
    pub percentual: Option<i64>,  // 完成百分比
}

pub struct DailyProductionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DailyProductionRepository {
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
            CREATE TABLE IF NOT EXISTS producao_diaria (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              cliente_id TEXT,
              machine_id TEXT NOT NULL,
              data TEXT NOT NULL,
              produzido INTEGER NOT NULL DEFAULT 0,
              meta INTEGER,
              percentual INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_producao_diaria_machine_data
              ON producao_diaria(machine_id, data);
            CREATE INDEX IF NOT EXISTS idx_producao_diaria_data
              ON producao_diaria(data);
            "#,
        )?;
        Ok(())
    }

    /// 插入日切快照(纯 INSERT,快照是事件记录,不做覆盖)
    pub fn insert_snapshot(
        &self,
        machine_id: &str,
        data: &str,
        produzido: i64,
        meta: Option<i64>,
        percentual: Option<i64>,
    ) -> RepositoryResult<()> {
        let (cliente_id, _) = split_scoped_machine_id(machine_id);
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO producao_diaria (cliente_id, machine_id, data, produzido, meta, percentual)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![cliente_id, machine_id, data, produzido, meta, percentual],
        )?;
        Ok(())
    }

    /// 解析作用域候选ID
    ///
    /// 裸ID可能对应多条作用域行,取当天产量最高的那条作为有效ID
    pub fn find_scoped_candidate(
        &self,
        data: &str,
        raw_machine_id: &str,
    ) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let col = resolve_date_column(&conn, "producao_diaria")?;
        let sql = format!(
            r#"
            SELECT machine_id
            FROM producao_diaria
            WHERE {col} = ?1
              AND (machine_id LIKE ?2 OR machine_id LIKE ?3)
            ORDER BY produzido DESC
            LIMIT 1
            "#,
            col = col
        );
        let mut stmt = conn.prepare(&sql)?;
        let result = stmt.query_row(
            params![
                data,
                format!("%::{}", raw_machine_id),
                format!("{}::%", raw_machine_id),
            ],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 取某天与机台相关的全部行(OR 语义)
    ///
    /// 命中条件: machine_id 等于有效ID、等于裸ID,或匹配 `%::裸ID` / `裸ID::%`
    pub fn rows_for_day(
        &self,
        data: &str,
        effective_id: &str,
        raw_id: &str,
    ) -> RepositoryResult<Vec<DailyProductionRow>> {
        let conn = self.get_conn()?;
        let col = resolve_date_column(&conn, "producao_diaria")?;
        let sql = format!(
            r#"
            SELECT machine_id, {col}, produzido, meta, percentual
            FROM producao_diaria
            WHERE {col} = ?1
              AND (
                machine_id = ?2
                OR machine_id = ?3
                OR machine_id LIKE ?4
                OR machine_id LIKE ?5
              )
            "#,
            col = col
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![
                    data,
                    effective_id,
                    raw_id,
                    format!("%::{}", raw_id),
                    format!("{}::%", raw_id),
                ],
                |row| {
                    Ok(DailyProductionRow {
                        machine_id: row.get(0)?,
                        data: row.get(1)?,
                        produzido: row.get(2)?,
                        meta: row.get(3)?,
                        percentual: row.get(4)?,
                    })
                },
            )?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 某机台的快照条数(守护窗口防重入测试用)
    pub fn count_for_machine_day(&self, machine_id: &str, data: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let col = resolve_date_column(&conn, "producao_diaria")?;
        let sql = format!(
            "SELECT COUNT(*) FROM producao_diaria WHERE machine_id = ?1 AND {col} = ?2",
            col = col
        );
        let n: i64 = conn.query_row(&sql, params![machine_id, data], |row| row.get(0))?;
        Ok(n)
    }
}
