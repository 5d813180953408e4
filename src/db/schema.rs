use rusqlite::Connection;

pub fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS detection_history (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            input_type      TEXT NOT NULL,
            input_text      TEXT NOT NULL,
            status          TEXT NOT NULL,
            reason          TEXT NOT NULL,
            top_score       REAL,
            matched_case_id TEXT,
            escalated       INTEGER NOT NULL DEFAULT 0,
            detection_group TEXT,
            quality_score   REAL,
            action          TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS llm_budget (
            day         TEXT PRIMARY KEY,
            calls_used  INTEGER NOT NULL,
            cost_used   REAL NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_history_created ON detection_history(created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_history_status ON detection_history(status);
        ",
    )?;
    Ok(())
}
