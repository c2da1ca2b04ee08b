// ==========================================
// 车间机台产量跟踪系统 - 小时产量仓储
// ==========================================
// 职责: 管理 producao_horaria 表 (班次内每小时的基线与产量)
// 说明: 多租户行按 (cliente_id, machine_id) 拆分存储;
//       旧库遗留行 cliente_id IS NULL,用部分唯一索引守护
// ==========================================

use crate::db::{has_column, open_sqlite_connection};
use crate::domain::types::split_scoped_machine_id;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

/// 小时槽位写入载荷
#[derive(Debug, Clone)]
pub struct HourlySlot {
    pub data_ref: String,     // 运营日 (YYYY-MM-DD)
    pub hora_idx: i64,        // 班内小时索引 (0..n-1)
    pub baseline_esp: i64,    // 小时开始时的绝对计数
    pub esp_last: i64,        // 最近一次绝对计数
    pub produzido: i64,       // 小时产量
    pub meta: i64,            // 小时目标
    pub percentual: i64,      // 小时完成百分比
}

pub struct HourlyProductionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl HourlyProductionRepository {
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

    /// 确保表和索引存在,并为旧库补 cliente_id 列
    fn ensure_table(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS producao_horaria (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              cliente_id TEXT,
              machine_id TEXT NOT NULL,
              data_ref TEXT NOT NULL,
              hora_idx INTEGER NOT NULL,
              baseline_esp INTEGER NOT NULL,
              esp_last INTEGER NOT NULL,
              produzido INTEGER NOT NULL,
              meta INTEGER NOT NULL,
              percentual INTEGER NOT NULL,
              updated_at TEXT NOT NULL
            );
            "#,
        )?;

        if !has_column(&conn, "producao_horaria", "cliente_id")? {
            conn.execute_batch("ALTER TABLE producao_horaria ADD COLUMN cliente_id TEXT;")?;
        }

        // 旧的全局唯一索引会让不同 cliente 的同名机台互相覆盖
        conn.execute_batch(
            r#"
            DROP INDEX IF EXISTS ux_producao_horaria;

            CREATE UNIQUE INDEX IF NOT EXISTS ux_producao_horaria_cliente
              ON producao_horaria(cliente_id, machine_id, data_ref, hora_idx);

            CREATE UNIQUE INDEX IF NOT EXISTS ux_producao_horaria_legacy
              ON producao_horaria(machine_id, data_ref, hora_idx)
              WHERE cliente_id IS NULL;

            CREATE INDEX IF NOT EXISTS ix_producao_horaria_cliente_id
              ON producao_horaria(cliente_id);
            "#,
        )?;
        Ok(())
    }

    /// 小时槽位 upsert (作用域ID在此拆分)
    pub fn upsert_hora(&self, machine_id: &str, slot: &HourlySlot) -> RepositoryResult<()> {
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
                    INSERT INTO producao_horaria
                      (cliente_id, machine_id, data_ref, hora_idx, baseline_esp, esp_last,
                       produzido, meta, percentual, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, datetime('now', 'localtime'))
                    ON CONFLICT(cliente_id, machine_id, data_ref, hora_idx)
                    DO UPDATE SET
                        baseline_esp = excluded.baseline_esp,
                        esp_last = excluded.esp_last,
                        produzido = excluded.produzido,
                        meta = excluded.meta,
                        percentual = excluded.percentual,
                        updated_at = excluded.updated_at
                    "#,
                    params![
                        cid,
                        mid,
                        slot.data_ref,
                        slot.hora_idx,
                        slot.baseline_esp,
                        slot.esp_last,
                        slot.produzido,
                        slot.meta,
                        slot.percentual,
                    ],
                )?;
            }
            None => {
                conn.execute(
                    r#"
                    INSERT INTO producao_horaria
                      (cliente_id, machine_id, data_ref, hora_idx, baseline_esp, esp_last,
                       produzido, meta, percentual, updated_at)
                    VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now', 'localtime'))
                    ON CONFLICT(machine_id, data_ref, hora_idx) WHERE cliente_id IS NULL
                    DO UPDATE SET
                        baseline_esp = excluded.baseline_esp,
                        esp_last = excluded.esp_last,
                        produzido = excluded.produzido,
                        meta = excluded.meta,
                        percentual = excluded.percentual,
                        updated_at = excluded.updated_at
                    "#,
                    params![
                        mid,
                        slot.data_ref,
                        slot.hora_idx,
                        slot.baseline_esp,
                        slot.esp_last,
                        slot.produzido,
                        slot.meta,
                        slot.percentual,
                    ],
                )?;
            }
        }
        Ok(())
    }

    /// 读取某小时的基线 (小时断电重启后恢复锚点)
    pub fn get_baseline_for_hora(
        &self,
        machine_id: &str,
        data_ref: &str,
        hora_idx: i64,
    ) -> RepositoryResult<Option<i64>> {
        let (cid, mid) = split_scoped_machine_id(machine_id);
        if mid.is_empty() {
            return Ok(None);
        }
        let conn = self.get_conn()?;
        let result = match cid {
            Some(cid) => conn.query_row(
                r#"
                SELECT baseline_esp FROM producao_horaria
                WHERE cliente_id = ?1 AND machine_id = ?2 AND data_ref = ?3 AND hora_idx = ?4
                LIMIT 1
                "#,
                params![cid, mid, data_ref, hora_idx],
                |row| row.get::<_, i64>(0),
            ),
            None => conn.query_row(
                r#"
                SELECT baseline_esp FROM producao_horaria
                WHERE cliente_id IS NULL AND machine_id = ?1 AND data_ref = ?2 AND hora_idx = ?3
                LIMIT 1
                "#,
                params![mid, data_ref, hora_idx],
                |row| row.get::<_, i64>(0),
            ),
        };
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 读取某运营日的小时产量向量
    ///
    /// 返回长度 n_horas,未落库的小时为 None
    pub fn load_producao_por_hora(
        &self,
        machine_id: &str,
        data_ref: &str,
        n_horas: usize,
    ) -> RepositoryResult<Vec<Option<i64>>> {
        let mut out = vec![None; n_horas];
        let (cid, mid) = split_scoped_machine_id(machine_id);
        if mid.is_empty() {
            return Ok(out);
        }
        let conn = self.get_conn()?;
        let pares: Vec<(i64, i64)> = match cid {
            Some(cid) => {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT hora_idx, produzido FROM producao_horaria
                    WHERE cliente_id = ?1 AND machine_id = ?2 AND data_ref = ?3
                    "#,
                )?;
                let rows = stmt
                    .query_map(params![cid, mid, data_ref], |row| {
                        Ok((row.get(0)?, row.get(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT hora_idx, produzido FROM producao_horaria
                    WHERE cliente_id IS NULL AND machine_id = ?1 AND data_ref = ?2
                    "#,
                )?;
                let rows = stmt
                    .query_map(params![mid, data_ref], |row| {
                        Ok((row.get(0)?, row.get(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        for (idx, val) in pares {
            if idx >= 0 && (idx as usize) < out.len() {
                out[idx as usize] = Some(val);
            }
        }
        Ok(out)
    }

    /// 读取某运营日全部小时槽 (hora_idx, produzido, meta),日明细映射用
    pub fn load_slots_for_day(
        &self,
        machine_id: &str,
        data_ref: &str,
    ) -> RepositoryResult<Vec<(i64, i64, i64)>> {
        let (cid, mid) = split_scoped_machine_id(machine_id);
        if mid.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.get_conn()?;
        let linhas = match cid {
            Some(cid) => {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT hora_idx, produzido, meta FROM producao_horaria
                    WHERE cliente_id = ?1 AND machine_id = ?2 AND data_ref = ?3
                    ORDER BY hora_idx ASC
                    "#,
                )?;
                let rows = stmt
                    .query_map(params![cid, mid, data_ref], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT hora_idx, produzido, meta FROM producao_horaria
                    WHERE cliente_id IS NULL AND machine_id = ?1 AND data_ref = ?2
                    ORDER BY hora_idx ASC
                    "#,
                )?;
                let rows = stmt
                    .query_map(params![mid, data_ref], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(linhas)
    }
}
