// ==========================================
// 车间机台产量跟踪系统 - 非计划生产仓储
// ==========================================
// 职责: 管理 nao_programado_diario (日累计) 与
//       nao_programado_horaria (小时增量) 两张表
// 说明: 机台ID按作用域原样存储;小时增量是累加语义,不是覆盖
// ==========================================

use crate::db::open_sqlite_connection;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

pub struct NonScheduledRepository {
    conn: Arc<Mutex<Connection>>,
}

impl NonScheduledRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        let repo = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        repo.ensure_tables()?;
        Ok(repo)
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        let repo = Self { conn };
        repo.ensure_tables()?;
        Ok(repo)
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 确保两张表存在（如果不存在则创建）
    fn ensure_tables(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS nao_programado_diario (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              machine_id TEXT NOT NULL,
              data_ref TEXT NOT NULL,
              np_producao INTEGER NOT NULL DEFAULT 0,
              np_minutos INTEGER NOT NULL DEFAULT 0,
              updated_at TEXT,
              UNIQUE(machine_id, data_ref)
            );

            CREATE TABLE IF NOT EXISTS nao_programado_horaria (
              machine_id TEXT NOT NULL,
              data_ref TEXT NOT NULL,
              hora_dia INTEGER NOT NULL,
              produzido INTEGER NOT NULL DEFAULT 0,
              updated_at TEXT,
              PRIMARY KEY (machine_id, data_ref, hora_dia)
            );
            "#,
        )?;
        Ok(())
    }

    /// 覆盖式保存日累计
    pub fn upsert_totais(
        &self,
        machine_id: &str,
        data_ref: &str,
        np_producao: i64,
        np_minutos: i64,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO nao_programado_diario (machine_id, data_ref, np_producao, np_minutos, updated_at)
            VALUES (?1, ?2, ?3, ?4, datetime('now', 'localtime'))
            ON CONFLICT(machine_id, data_ref)
            DO UPDATE SET
                np_producao = excluded.np_producao,
                np_minutos = excluded.np_minutos,
                updated_at = excluded.updated_at
            "#,
            params![machine_id, data_ref, np_producao, np_minutos],
        )?;
        Ok(())
    }

    /// 读取日累计 (np_producao, np_minutos),无行 → None
    pub fn load_totais(
        &self,
        machine_id: &str,
        data_ref: &str,
    ) -> RepositoryResult<Option<(i64, i64)>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            r#"
            SELECT np_producao, np_minutos FROM nao_programado_diario
            WHERE machine_id = ?1 AND data_ref = ?2
            LIMIT 1
            "#,
            params![machine_id, data_ref],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        );
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 小时槽位累加增量
    ///
    /// 规则:
    /// - delta <= 0 → 跳过,返回 Ok(false)
    /// - hora_dia 必须在 0..=23
    /// - machine_id / data_ref 不能为空
    pub fn add_hora_delta(
        &self,
        machine_id: &str,
        data_ref: &str,
        hora_dia: i64,
        delta: i64,
    ) -> RepositoryResult<bool> {
        let mid = machine_id.trim();
        let dr = data_ref.trim();
        if mid.is_empty() || dr.is_empty() {
            return Err(RepositoryError::FieldValueError {
                field: "machine_id/data_ref".to_string(),
                message: "标识不能为空".to_string(),
            });
        }
        if !(0..=23).contains(&hora_dia) {
            return Err(RepositoryError::FieldValueError {
                field: "hora_dia".to_string(),
                message: format!("小时槽位越界: {}", hora_dia),
            });
        }
        if delta <= 0 {
            return Ok(false);
        }

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO nao_programado_horaria (machine_id, data_ref, hora_dia, produzido, updated_at)
            VALUES (?1, ?2, ?3, ?4, datetime('now', 'localtime'))
            ON CONFLICT(machine_id, data_ref, hora_dia)
            DO UPDATE SET
                produzido = produzido + excluded.produzido,
                updated_at = excluded.updated_at
            "#,
            params![mid, dr, hora_dia, delta],
        )?;
        Ok(true)
    }

    /// 读取某运营日的 24 槽位 NP 产量
    pub fn load_np_por_hora_24(
        &self,
        machine_id: &str,
        data_ref: &str,
    ) -> RepositoryResult<Vec<i64>> {
        let mut out = vec![0i64; 24];
        if machine_id.trim().is_empty() || data_ref.trim().is_empty() {
            return Ok(out);
        }
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT hora_dia, produzido FROM nao_programado_horaria
            WHERE machine_id = ?1 AND data_ref = ?2
            "#,
        )?;
        let pares = stmt
            .query_map(params![machine_id.trim(), data_ref.trim()], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (hora, produzido) in pares {
            if (0..24).contains(&hora) {
                out[hora as usize] = produzido;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totais_roundtrip() {
        let repo = NonScheduledRepository::new(":memory:").expect("Failed to create test repository");

        assert_eq!(
            repo.load_totais("c1::torno-01", "2026-03-09").expect("Failed to load"),
            None
        );

        repo.upsert_totais("c1::torno-01", "2026-03-09", 12, 30)
            .expect("Failed to upsert");
        repo.upsert_totais("c1::torno-01", "2026-03-09", 15, 42)
            .expect("Failed to upsert again");

        assert_eq!(
            repo.load_totais("c1::torno-01", "2026-03-09").expect("Failed to load"),
            Some((15, 42))
        );
    }

    #[test]
    fn test_hora_delta_is_additive() {
        let repo = NonScheduledRepository::new(":memory:").expect("Failed to create test repository");

        assert!(repo
            .add_hora_delta("torno-01", "2026-03-09", 20, 3)
            .expect("Failed to add"));
        assert!(repo
            .add_hora_delta("torno-01", "2026-03-09", 20, 4)
            .expect("Failed to add"));

        let horas = repo
            .load_np_por_hora_24("torno-01", "2026-03-09")
            .expect("Failed to load");
        assert_eq!(horas[20], 7);
        assert_eq!(horas.iter().sum::<i64>(), 7);
    }

    #[test]
    fn test_hora_delta_skips_non_positive() {
        let repo = NonScheduledRepository::new(":memory:").expect("Failed to create test repository");

        assert!(!repo
            .add_hora_delta("torno-01", "2026-03-09", 5, 0)
            .expect("Should skip zero"));
        assert!(!repo
            .add_hora_delta("torno-01", "2026-03-09", 5, -3)
            .expect("Should skip negative"));

        let horas = repo
            .load_np_por_hora_24("torno-01", "2026-03-09")
            .expect("Failed to load");
        assert_eq!(horas[5], 0);
    }

    #[test]
    fn test_hora_delta_validates_slot() {
        let repo = NonScheduledRepository::new(":memory:").expect("Failed to create test repository");

        let err = repo
            .add_hora_delta("torno-01", "2026-03-09", 24, 1)
            .expect_err("Should reject hour 24");
        assert!(matches!(err, RepositoryError::FieldValueError { .. }));

        let err = repo
            .add_hora_delta("  ", "2026-03-09", 3, 1)
            .expect_err("Should reject empty machine id");
        assert!(matches!(err, RepositoryError::FieldValueError { .. }));
    }
}
