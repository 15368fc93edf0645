use rusqlite::Connection;

use crate::error::Result;

/// Initialise the store schema in `conn`.
///
/// `schedulers` holds job definitions, `logs` one row per execution attempt.
/// Timestamps are RFC 3339 UTC text with a fixed precision so they sort
/// lexically.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schedulers (
            id                TEXT    NOT NULL PRIMARY KEY,
            name              TEXT    NOT NULL,
            description       TEXT,
            job_type          TEXT    NOT NULL,
            frequency         TEXT    NOT NULL,
            frequency_config  TEXT    NOT NULL,   -- JSON object
            is_active         INTEGER NOT NULL DEFAULT 1,
            created_at        TEXT    NOT NULL,
            updated_at        TEXT,
            last_run          TEXT,
            next_run          TEXT
        ) STRICT;

        CREATE TABLE IF NOT EXISTS logs (
            id            TEXT    NOT NULL PRIMARY KEY,
            scheduler_id  TEXT    NOT NULL,
            job_type      TEXT    NOT NULL,
            status        TEXT    NOT NULL,
            message       TEXT,
            started_at    TEXT    NOT NULL,
            completed_at  TEXT,
            duration      INTEGER
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_schedulers_created ON schedulers (created_at);
        CREATE INDEX IF NOT EXISTS idx_logs_started ON logs (started_at);
        CREATE INDEX IF NOT EXISTS idx_logs_scheduler ON logs (scheduler_id, started_at);
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('schedulers', 'logs')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(n, 2);
    }
}
