pub mod schema;

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::{DetectionResult, InputKind};
use crate::signals::budget::BudgetState;

/// A persisted detection from the history table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub input_type: String,
    pub input_text: String,
    pub status: String,
    pub reason: String,
    pub top_score: Option<f64>,
    pub matched_case_id: Option<String>,
    pub escalated: bool,
    pub detection_group: Option<String>,
    pub quality_score: Option<f64>,
    pub action: String,
    pub created_at: String,
}

pub struct Database {
    conn: Connection,
}

/// Thread-safe wrapper around Database.
#[derive(Clone)]
pub struct SharedDatabase {
    inner: Arc<Mutex<Database>>,
}

impl SharedDatabase {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let db = Database::open(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(db)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Database> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record one completed detection.
    pub fn record_detection(
        &self,
        kind: InputKind,
        input_text: &str,
        result: &DetectionResult,
    ) -> Result<i64, rusqlite::Error> {
        self.lock().record_detection(kind, input_text, result)
    }

    /// Most recent detections first.
    pub fn recent_detections(&self, limit: usize) -> Result<Vec<HistoryRecord>, rusqlite::Error> {
        self.lock().recent_detections(limit)
    }

    /// Number of detections per status label.
    pub fn count_by_status(&self) -> Result<HashMap<String, usize>, rusqlite::Error> {
        self.lock().count_by_status()
    }

    /// Persist LLM budget usage. Counters only ever grow within a day.
    pub fn save_budget(&self, state: &BudgetState) -> Result<(), rusqlite::Error> {
        self.lock().save_budget(state)
    }

    /// Budget usage recorded for `day`, if any.
    pub fn load_budget(&self, day: NaiveDate) -> Result<Option<BudgetState>, rusqlite::Error> {
        self.lock().load_budget(day)
    }
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    pub fn record_detection(
        &self,
        kind: InputKind,
        input_text: &str,
        result: &DetectionResult,
    ) -> Result<i64, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO detection_history (input_type, input_text, status, reason, top_score, matched_case_id, escalated, detection_group, quality_score, action, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, datetime('now'))",
            rusqlite::params![
                kind.as_str(),
                input_text,
                result.status.as_str(),
                result.reason,
                result.top_score.map(f64::from),
                result.matched_case_id,
                result.escalated as i32,
                result.group.map(|g| g.as_str()),
                result.quality_score,
                result.action.as_str(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<HistoryRecord> {
        let escalated: i32 = row.get(7)?;
        Ok(HistoryRecord {
            id: row.get(0)?,
            input_type: row.get(1)?,
            input_text: row.get(2)?,
            status: row.get(3)?,
            reason: row.get(4)?,
            top_score: row.get(5)?,
            matched_case_id: row.get(6)?,
            escalated: escalated != 0,
            detection_group: row.get(8)?,
            quality_score: row.get(9)?,
            action: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    pub fn recent_detections(&self, limit: usize) -> Result<Vec<HistoryRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, input_type, input_text, status, reason, top_score, matched_case_id, escalated, detection_group, quality_score, action, created_at
             FROM detection_history ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![limit as i64], Self::row_to_record)?;
        rows.collect()
    }

    pub fn count_by_status(&self) -> Result<HashMap<String, usize>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM detection_history GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
        })?;
        rows.collect()
    }

    pub fn save_budget(&self, state: &BudgetState) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO llm_budget (day, calls_used, cost_used) VALUES (?1, ?2, ?3)
             ON CONFLICT(day) DO UPDATE SET
                calls_used = MAX(calls_used, excluded.calls_used),
                cost_used = MAX(cost_used, excluded.cost_used)",
            rusqlite::params![state.day.to_string(), state.calls_used, state.cost_used],
        )?;
        Ok(())
    }

    pub fn load_budget(&self, day: NaiveDate) -> Result<Option<BudgetState>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT calls_used, cost_used FROM llm_budget WHERE day = ?1",
                rusqlite::params![day.to_string()],
                |row| {
                    Ok(BudgetState {
                        day,
                        calls_used: row.get(0)?,
                        cost_used: row.get(1)?,
                    })
                },
            )
            .optional()
    }
}
