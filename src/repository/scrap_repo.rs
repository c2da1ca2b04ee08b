// ==========================================
// 车间机台产量跟踪系统 - 废品登记仓储
// ==========================================
// 职责: 管理 refugo_horaria 表 (按小时登记的废品数)
// 说明: 历史库存在三种数量列名(refugo/qtd/quantidade)与
//       两种日期列名,日汇总查询前先探测落点
// ==========================================

use crate::db::{has_column, open_sqlite_connection};
use crate::domain::types::split_scoped_machine_id;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

pub struct ScrapRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ScrapRepository {
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

    /// 确保表和索引存在
    ///
    /// 旧索引不分租户,切换前先去重(保留最大 id 的最新行)
    fn ensure_table(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS refugo_horaria (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              cliente_id TEXT,
              machine_id TEXT NOT NULL,
              dia_ref TEXT NOT NULL,
              hora_dia INTEGER NOT NULL,
              refugo INTEGER NOT NULL,
              updated_at TEXT NOT NULL
            );

            DELETE FROM refugo_horaria
            WHERE id NOT IN (
              SELECT MAX(id)
              FROM refugo_horaria
              GROUP BY COALESCE(cliente_id, '__NULL__'), machine_id, dia_ref, hora_dia
            );

            DROP INDEX IF EXISTS ux_refugo_horaria;

            CREATE UNIQUE INDEX IF NOT EXISTS ux_refugo_multi
              ON refugo_horaria(cliente_id, machine_id, dia_ref, hora_dia);

            CREATE UNIQUE INDEX IF NOT EXISTS ux_refugo_legacy
              ON refugo_horaria(machine_id, dia_ref, hora_dia)
              WHERE cliente_id IS NULL;
            "#,
        )?;
        Ok(())
    }

    /// 登记/覆盖小时废品数 (作用域ID在此拆分)
    pub fn upsert_refugo(
        &self,
        machine_id: &str,
        dia_ref: &str,
        hora_dia: i64,
        refugo: i64,
    ) -> RepositoryResult<()> {
        let (cid, mid) = split_scoped_machine_id(machine_id);
        if mid.is_empty() {
            return Err(RepositoryError::FieldValueError {
                field: "machine_id".to_string(),
                message: "机台ID不能为空".to_string(),
            });
        }
        let conn = self.get_conn()?;
        match cid {
            Some(cid) => {
                conn.execute(
                    r#"
                    INSERT INTO refugo_horaria (cliente_id, machine_id, dia_ref, hora_dia, refugo, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, datetime('now', 'localtime'))
                    ON CONFLICT(cliente_id, machine_id, dia_ref, hora_dia)
                    DO UPDATE SET
                        refugo = excluded.refugo,
                        updated_at = excluded.updated_at
                    "#,
                    params![cid, mid, dia_ref, hora_dia, refugo],
                )?;
            }
            None => {
                conn.execute(
                    r#"
                    INSERT INTO refugo_horaria (cliente_id, machine_id, dia_ref, hora_dia, refugo, updated_at)
                    VALUES (NULL, ?1, ?2, ?3, ?4, datetime('now', 'localtime'))
                    ON CONFLICT(machine_id, dia_ref, hora_dia) WHERE cliente_id IS NULL
                    DO UPDATE SET
                        refugo = excluded.refugo,
                        updated_at = excluded.updated_at
                    "#,
                    params![mid, dia_ref, hora_dia, refugo],
                )?;
            }
        }
        Ok(())
    }

    /// 读取某运营日的 24 槽位废品数 (负值钳为 0)
    pub fn load_refugo_24(&self, machine_id: &str, dia_ref: &str) -> RepositoryResult<Vec<i64>> {
        let mut out = vec![0i64; 24];
        let (cid, mid) = split_scoped_machine_id(machine_id);
        if mid.is_empty() {
            return Ok(out);
        }
        let conn = self.get_conn()?;
        let pares: Vec<(i64, i64)> = match cid {
            Some(cid) => {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT hora_dia, refugo FROM refugo_horaria
                    WHERE cliente_id = ?1 AND machine_id = ?2 AND dia_ref = ?3
                    "#,
                )?;
                let rows = stmt
                    .query_map(params![cid, mid, dia_ref], |row| {
                        Ok((row.get(0)?, row.get(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT hora_dia, refugo FROM refugo_horaria
                    WHERE cliente_id IS NULL AND machine_id = ?1 AND dia_ref = ?2
                    "#,
                )?;
                let rows = stmt
                    .query_map(params![mid, dia_ref], |row| {
                        Ok((row.get(0)?, row.get(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        for (h, v) in pares {
            if (0..24).contains(&h) {
                out[h as usize] = v.max(0);
            }
        }
        Ok(out)
    }

    /// 某天的废品总数,跨有效ID与裸ID汇总
    ///
    /// 表内 machine_id 存的是拆分后的裸ID,入参先做同样拆分
    ///
    /// 列名探测:
    /// - 日期列: dia_ref → data_ref → data
    /// - 数量列: refugo → qtd → quantidade (都缺失 → 0)
    pub fn day_total(
        &self,
        dia_ref: &str,
        effective_id: &str,
        raw_id: &str,
    ) -> RepositoryResult<i64> {
        let (_, mid_eff) = split_scoped_machine_id(effective_id);
        let (_, mid_raw) = split_scoped_machine_id(raw_id);
        let conn = self.get_conn()?;

        let date_col = if has_column(&conn, "refugo_horaria", "dia_ref")? {
            "dia_ref"
        } else if has_column(&conn, "refugo_horaria", "data_ref")? {
            "data_ref"
        } else {
            "data"
        };
        let qty_col = if has_column(&conn, "refugo_horaria", "refugo")? {
            "refugo"
        } else if has_column(&conn, "refugo_horaria", "qtd")? {
            "qtd"
        } else if has_column(&conn, "refugo_horaria", "quantidade")? {
            "quantidade"
        } else {
            return Ok(0);
        };

        let sql = format!(
            "SELECT COALESCE(SUM({qty}), 0) FROM refugo_horaria
             WHERE {date} = ?1 AND machine_id IN (?2, ?3)",
            qty = qty_col,
            date = date_col
        );
        let total: i64 =
            conn.query_row(&sql, params![dia_ref, mid_eff, mid_raw], |row| row.get(0))?;
        Ok(total.max(0))
    }
}
