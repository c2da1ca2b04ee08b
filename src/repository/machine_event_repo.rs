// ==========================================
// 车间机台产量跟踪系统 - 机台脉冲事件仓储
// ==========================================
// 职责: 管理 machine_state_event 表 (计数增量产生的运行脉冲)
// 说明: 每个有效增量写一条事件,日明细用时间窗扫描还原运行区间
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::split_scoped_machine_id;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

pub struct MachineEventRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MachineEventRepository {
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
            CREATE TABLE IF NOT EXISTS machine_state_event (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              machine_id TEXT NOT NULL,
              effective_machine_id TEXT NOT NULL,
              cliente_id TEXT,
              ts_ms INTEGER NOT NULL,
              ts_iso TEXT,
              data_ref TEXT NOT NULL,
              hora_idx INTEGER,
              state TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS ix_mse_eff
              ON machine_state_event(effective_machine_id, data_ref, ts_ms);
            CREATE INDEX IF NOT EXISTS ix_mse_cliente
              ON machine_state_event(cliente_id, effective_machine_id, data_ref, ts_ms);
            CREATE INDEX IF NOT EXISTS ix_mse_mid
              ON machine_state_event(machine_id, data_ref, ts_ms);
            "#,
        )?;
        Ok(())
    }

    /// 追加一条脉冲事件 (cliente_id 从生效标识拆出)
    #[allow(clippy::too_many_arguments)]
    pub fn insert_event(
        &self,
        machine_id: &str,
        effective_id: &str,
        ts_ms: i64,
        ts_iso: &str,
        data_ref: &str,
        hora_idx: Option<i64>,
        state: &str,
    ) -> RepositoryResult<()> {
        let (cliente_id, _) = split_scoped_machine_id(effective_id);
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO machine_state_event
              (machine_id, effective_machine_id, cliente_id, ts_ms, ts_iso, data_ref, hora_idx, state)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                machine_id,
                effective_id,
                cliente_id,
                ts_ms,
                ts_iso,
                data_ref,
                hora_idx,
                state
            ],
        )?;
        Ok(())
    }

    /// 按毫秒时间窗取事件时刻 (生效标识或原始标识命中均算),升序
    pub fn event_times_between(
        &self,
        effective_id: &str,
        machine_id: &str,
        ts_ms_inicio: i64,
        ts_ms_fim: i64,
    ) -> RepositoryResult<Vec<i64>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT ts_ms FROM machine_state_event
            WHERE (effective_machine_id = ?1 OR machine_id = ?2)
              AND ts_ms >= ?3 AND ts_ms < ?4
            ORDER BY ts_ms ASC
            "#,
        )?;
        let times = stmt
            .query_map(
                params![effective_id, machine_id, ts_ms_inicio, ts_ms_fim],
                |row| row.get::<_, i64>(0),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(times)
    }

    /// 某机台某日是否有事件 (历史列表用来跳过空日)
    pub fn has_events_for_day(
        &self,
        effective_id: &str,
        machine_id: &str,
        data_ref: &str,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM machine_state_event
            WHERE (effective_machine_id = ?1 OR machine_id = ?2)
              AND data_ref = ?3
            "#,
            params![effective_id, machine_id, data_ref],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_window_scan() {
        let repo = MachineEventRepository::new(":memory:").expect("Failed to create test repository");

        for (ts, iso) in [
            (1_000_000, "2026-03-09T08:00:00"),
            (2_000_000, "2026-03-09T08:16:40"),
            (3_000_000, "2026-03-09T08:33:20"),
        ] {
            repo.insert_event(
                "torno-01",
                "acme::torno-01",
                ts,
                iso,
                "2026-03-09",
                Some(1),
                "RUN",
            )
            .expect("Failed to insert event");
        }

        let times = repo
            .event_times_between("acme::torno-01", "torno-01", 1_500_000, 3_000_000)
            .expect("Failed to scan window");
        assert_eq!(times, vec![2_000_000]);
    }

    #[test]
    fn test_raw_id_also_matches() {
        let repo = MachineEventRepository::new(":memory:").expect("Failed to create test repository");

        // 事件落库时只有原始标识 (老数据没有 scoped 形态)
        repo.insert_event(
            "torno-01",
            "torno-01",
            5_000_000,
            "2026-03-09T09:00:00",
            "2026-03-09",
            None,
            "RUN",
        )
        .expect("Failed to insert event");

        let times = repo
            .event_times_between("acme::torno-01", "torno-01", 0, 10_000_000)
            .expect("Failed to scan window");
        assert_eq!(times.len(), 1);
    }

    #[test]
    fn test_cliente_id_split_from_effective() {
        let repo = MachineEventRepository::new(":memory:").expect("Failed to create test repository");

        repo.insert_event(
            "torno-01",
            "Acme::Torno-01",
            7_000_000,
            "2026-03-09T10:00:00",
            "2026-03-09",
            Some(2),
            "RUN",
        )
        .expect("Failed to insert event");

        let conn = repo.conn.lock().expect("Failed to lock connection");
        let cid: Option<String> = conn
            .query_row(
                "SELECT cliente_id FROM machine_state_event LIMIT 1",
                [],
                |row| row.get(0),
            )
            .expect("Failed to read cliente_id");
        assert_eq!(cid.as_deref(), Some("acme"));
    }

    #[test]
    fn test_has_events_for_day() {
        let repo = MachineEventRepository::new(":memory:").expect("Failed to create test repository");

        repo.insert_event(
            "torno-01",
            "acme::torno-01",
            1_000,
            "2026-03-09T00:00:01",
            "2026-03-09",
            None,
            "RUN",
        )
        .expect("Failed to insert event");

        assert!(repo
            .has_events_for_day("acme::torno-01", "torno-01", "2026-03-09")
            .expect("Failed to probe day"));
        assert!(!repo
            .has_events_for_day("acme::torno-01", "torno-01", "2026-03-10")
            .expect("Failed to probe empty day"));
    }
}
