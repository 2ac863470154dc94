use anyhow::{Context, Result};
use rusqlite::Connection;

pub mod attendance;
pub mod meetings;

pub use attendance::AttendanceRepository;
pub use meetings::MeetingRepository;

pub fn init_db() -> Result<Connection> {
    let db_path = crate::global::db_file()?;

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let conn = Connection::open(&db_path).context("Failed to open database connection")?;

    migrate(&conn)?;

    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meetings (
            id TEXT PRIMARY KEY,
            join_token TEXT NOT NULL,
            status TEXT NOT NULL,
            expires_at TEXT,
            doc TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("Failed to create meetings table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_meetings_token ON meetings(join_token)",
        [],
    )
    .context("Failed to create meetings token index")?;

    // Expiry sweep scans by (status, expires_at)
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_meetings_status_expiry ON meetings(status, expires_at)",
        [],
    )
    .context("Failed to create meetings expiry index")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            candidate_id TEXT NOT NULL,
            day TEXT NOT NULL,
            punch_in TEXT NOT NULL,
            punch_out TEXT,
            timezone TEXT NOT NULL DEFAULT 'UTC',
            duration_seconds INTEGER,
            status TEXT NOT NULL,
            note TEXT,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("Failed to create attendance table")?;

    // Single open session per candidate per calendar day
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_attendance_open
         ON attendance(candidate_id, day) WHERE punch_out IS NULL",
        [],
    )
    .context("Failed to create attendance open-session index")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('meetings', 'attendance')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
    }
}
