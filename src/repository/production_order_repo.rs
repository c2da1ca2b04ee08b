// ==========================================
// 车间机台产量跟踪系统 - 生产工单仓储 (只读)
// ==========================================
// 职责: 读取 ordens_producao 表,关联历史日与当日的工单上下文
// 红线: 本核心不建表不写入,表缺失时返回空列表
// ==========================================

use crate::db::{open_sqlite_connection, table_exists};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{Duration, NaiveDate};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// 一条工单上下文 (字段均可缺失,原样透传)
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrderContext {
    pub op: Option<String>,       // 工单号
    pub lote: Option<String>,     // 批次
    pub operador: Option<String>, // 操作员
    pub inicio: Option<String>,   // 开始时刻 (ISO)
    pub fim: Option<String>,      // 结束时刻 (ISO)
    pub status: Option<String>,   // 工单状态
}

pub struct ProductionOrderRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProductionOrderRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 按运营日取某机台的工单,窗口 [当日 00:01, 次日 00:01)
    ///
    /// inicio_iso 可能是 "T" 分隔的 ISO 形态,比较前归一为空格分隔
    pub fn orders_for_day(
        &self,
        machine_id: &str,
        dia: NaiveDate,
    ) -> RepositoryResult<Vec<OrderContext>> {
        let conn = self.get_conn()?;
        if !table_exists(&conn, "ordens_producao")? {
            return Ok(Vec::new());
        }

        let janela_inicio = format!("{} 00:01:00", dia.format("%Y-%m-%d"));
        let janela_fim = format!("{} 00:01:00", (dia + Duration::days(1)).format("%Y-%m-%d"));

        let mut stmt = conn.prepare(
            r#"
            SELECT op, lote, operador, inicio_iso, fim_iso, status
            FROM ordens_producao
            WHERE machine_id = ?1
              AND datetime(replace(inicio_iso, 'T', ' ')) >= datetime(?2)
              AND datetime(replace(inicio_iso, 'T', ' ')) < datetime(?3)
            ORDER BY datetime(replace(inicio_iso, 'T', ' ')) ASC
            "#,
        )?;
        let orders = stmt
            .query_map(params![machine_id, janela_inicio, janela_fim], |row| {
                Ok(OrderContext {
                    op: row.get(0)?,
                    lote: row.get(1)?,
                    operador: row.get(2)?,
                    inicio: row.get(3)?,
                    fim: row.get(4)?,
                    status: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(orders)
    }
}
