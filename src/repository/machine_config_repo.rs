// ==========================================
// 车间机台产量跟踪系统 - 机台配置仓储
// ==========================================
// 职责: 管理 machine_config 表 (按作用域机台ID)
// 说明: 旧版安装缺少单位/换算/告警列,启动时做增量列迁移
// ==========================================

use crate::db::{has_column, open_sqlite_connection};
use crate::domain::machine::MachineConfig;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};

/// alerta_sem_contagem_seg 的合法区间(秒)
const ALERTA_MIN_SEG: i64 = 5;
const ALERTA_MAX_SEG: i64 = 86_400;

pub struct MachineConfigRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MachineConfigRepository {
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

    /// 确保表存在（如果不存在则创建），并补齐旧库缺失的列
    fn ensure_table(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS machine_config (
              machine_id TEXT PRIMARY KEY,
              meta_turno INTEGER NOT NULL DEFAULT 0,
              turno_inicio TEXT,
              turno_fim TEXT,
              rampa_percentual INTEGER NOT NULL DEFAULT 0,
              horas_turno_json TEXT,
              meta_por_hora_json TEXT,
              updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "#,
        )?;

        // 增量列迁移(旧版安装)
        Self::ensure_column(&conn, "unidade_1", "TEXT")?;
        Self::ensure_column(&conn, "unidade_2", "TEXT")?;
        Self::ensure_column(&conn, "conv_m_por_pcs", "REAL NOT NULL DEFAULT 1.0")?;
        Self::ensure_column(&conn, "alerta_sem_contagem_seg", "INTEGER")?;
        Ok(())
    }

    fn ensure_column(conn: &Connection, column: &str, decl: &str) -> RepositoryResult<()> {
        if !has_column(conn, "machine_config", column)? {
            conn.execute_batch(&format!(
                "ALTER TABLE machine_config ADD COLUMN {} {};",
                column, decl
            ))?;
        }
        Ok(())
    }

    /// 创建或更新配置（Upsert 操作）
    ///
    /// alerta_sem_contagem_seg 落库前夹取到 [5, 86400]
    pub fn upsert(&self, cfg: &MachineConfig) -> RepositoryResult<()> {
        let alerta = cfg
            .alerta_sem_contagem_seg
            .map(|v| v.clamp(ALERTA_MIN_SEG, ALERTA_MAX_SEG));
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO machine_config (
                machine_id,
                meta_turno,
                turno_inicio,
                turno_fim,
                rampa_percentual,
                horas_turno_json,
                meta_por_hora_json,
                unidade_1,
                unidade_2,
                conv_m_por_pcs,
                alerta_sem_contagem_seg,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(machine_id) DO UPDATE SET
                meta_turno = excluded.meta_turno,
                turno_inicio = excluded.turno_inicio,
                turno_fim = excluded.turno_fim,
                rampa_percentual = excluded.rampa_percentual,
                horas_turno_json = excluded.horas_turno_json,
                meta_por_hora_json = excluded.meta_por_hora_json,
                unidade_1 = excluded.unidade_1,
                unidade_2 = excluded.unidade_2,
                conv_m_por_pcs = excluded.conv_m_por_pcs,
                alerta_sem_contagem_seg = excluded.alerta_sem_contagem_seg,
                updated_at = excluded.updated_at
            "#,
            params![
                cfg.machine_id,
                cfg.meta_turno,
                cfg.turno_inicio,
                cfg.turno_fim,
                cfg.rampa_percentual,
                cfg.horas_turno_json,
                cfg.meta_por_hora_json,
                cfg.unidade_1,
                cfg.unidade_2,
                cfg.conv_m_por_pcs,
                alerta,
                cfg.updated_at,
            ],
        )?;
        Ok(())
    }

    /// 按机台ID查找配置
    pub fn find_by_machine(&self, machine_id: &str) -> RepositoryResult<Option<MachineConfig>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                machine_id,
                meta_turno,
                turno_inicio,
                turno_fim,
                rampa_percentual,
                horas_turno_json,
                meta_por_hora_json,
                unidade_1,
                unidade_2,
                conv_m_por_pcs,
                alerta_sem_contagem_seg,
                updated_at
            FROM machine_config
            WHERE machine_id = ?1
            "#,
        )?;

        let result = stmt.query_row(params![machine_id], |row| {
            Ok(MachineConfig {
                machine_id: row.get(0)?,
                meta_turno: row.get(1)?,
                turno_inicio: row.get(2)?,
                turno_fim: row.get(3)?,
                rampa_percentual: row.get(4)?,
                horas_turno_json: row.get(5)?,
                meta_por_hora_json: row.get(6)?,
                unidade_1: row.get(7)?,
                unidade_2: row.get(8)?,
                conv_m_por_pcs: row.get(9)?,
                alerta_sem_contagem_seg: row.get(10)?,
                updated_at: row.get(11)?,
            })
        });

        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 列出全部配置（按机台ID排序,用于启动摘要）
    pub fn list_all(&self) -> RepositoryResult<Vec<MachineConfig>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                machine_id,
                meta_turno,
                turno_inicio,
                turno_fim,
                rampa_percentual,
                horas_turno_json,
                meta_por_hora_json,
                unidade_1,
                unidade_2,
                conv_m_por_pcs,
                alerta_sem_contagem_seg,
                updated_at
            FROM machine_config
            ORDER BY machine_id ASC
            "#,
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(MachineConfig {
                    machine_id: row.get(0)?,
                    meta_turno: row.get(1)?,
                    turno_inicio: row.get(2)?,
                    turno_fim: row.get(3)?,
                    rampa_percentual: row.get(4)?,
                    horas_turno_json: row.get(5)?,
                    meta_por_hora_json: row.get(6)?,
                    unidade_1: row.get(7)?,
                    unidade_2: row.get(8)?,
                    conv_m_por_pcs: row.get(9)?,
                    alerta_sem_contagem_seg: row.get(10)?,
                    updated_at: row.get(11)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(rows)
    }
}
