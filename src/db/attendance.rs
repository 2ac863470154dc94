//! Attendance record persistence.
//!
//! One row per punch-in. A partial unique index guarantees at most one open
//! session (punch_out IS NULL) per candidate per calendar day; the service
//! layer pre-checks and maps the violation to `Conflict`.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Open,
    Closed,
    AutoClosed,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::AutoClosed => "auto_closed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "closed" => Self::Closed,
            "auto_closed" => Self::AutoClosed,
            _ => Self::Open,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub id: i64,
    pub candidate_id: String,
    /// Calendar date of the punch-in, UTC-midnight normalized.
    pub day: NaiveDate,
    pub punch_in: DateTime<Utc>,
    pub punch_out: Option<DateTime<Utc>>,
    /// IANA timezone name the candidate punched in under.
    pub timezone: String,
    pub duration_seconds: Option<i64>,
    pub status: AttendanceStatus,
    pub note: Option<String>,
}

pub struct AttendanceRepository;

impl AttendanceRepository {
    /// Insert a new open record. Returns the record ID.
    pub fn insert(
        conn: &Connection,
        candidate_id: &str,
        day: NaiveDate,
        punch_in: DateTime<Utc>,
        timezone: &str,
    ) -> Result<i64> {
        conn.execute(
            "INSERT INTO attendance (candidate_id, day, punch_in, timezone, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                candidate_id,
                day.to_string(),
                punch_in.to_rfc3339(),
                timezone,
                AttendanceStatus::Open.as_str(),
            ],
        )
        .context("Failed to insert attendance record")?;

        Ok(conn.last_insert_rowid())
    }

    pub fn get(conn: &Connection, id: i64) -> Result<Option<AttendanceRecord>> {
        conn.query_row(
            "SELECT id, candidate_id, day, punch_in, punch_out, timezone,
                    duration_seconds, status, note
             FROM attendance WHERE id = ?1",
            params![id],
            Self::from_row,
        )
        .optional()
        .context("Failed to query attendance record")
    }

    /// The open session for a candidate on a given day, if any.
    pub fn find_open(
        conn: &Connection,
        candidate_id: &str,
        day: NaiveDate,
    ) -> Result<Option<AttendanceRecord>> {
        conn.query_row(
            "SELECT id, candidate_id, day, punch_in, punch_out, timezone,
                    duration_seconds, status, note
             FROM attendance
             WHERE candidate_id = ?1 AND day = ?2 AND punch_out IS NULL",
            params![candidate_id, day.to_string()],
            Self::from_row,
        )
        .optional()
        .context("Failed to query open attendance session")
    }

    /// All open sessions, for the auto-punch-out sweep.
    pub fn list_open(conn: &Connection) -> Result<Vec<AttendanceRecord>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, candidate_id, day, punch_in, punch_out, timezone,
                        duration_seconds, status, note
                 FROM attendance WHERE punch_out IS NULL ORDER BY punch_in ASC",
            )
            .context("Failed to prepare open sessions query")?;

        let rows = stmt
            .query_map([], Self::from_row)
            .context("Failed to list open attendance sessions")?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Close a session with the given punch-out, duration, status and note.
    pub fn close(
        conn: &Connection,
        id: i64,
        punch_out: DateTime<Utc>,
        duration_seconds: i64,
        status: AttendanceStatus,
        note: Option<&str>,
    ) -> Result<()> {
        conn.execute(
            "UPDATE attendance
             SET punch_out = ?1, duration_seconds = ?2, status = ?3, note = ?4
             WHERE id = ?5",
            params![
                punch_out.to_rfc3339(),
                duration_seconds,
                status.as_str(),
                note,
                id,
            ],
        )
        .context("Failed to close attendance session")?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<AttendanceRecord> {
        let day: String = row.get(2)?;
        let punch_in: String = row.get(3)?;
        let punch_out: Option<String> = row.get(4)?;
        let status: String = row.get(7)?;

        Ok(AttendanceRecord {
            id: row.get(0)?,
            candidate_id: row.get(1)?,
            day: day.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
            punch_in: DateTime::parse_from_rfc3339(&punch_in)
                .map_err(|_| rusqlite::Error::InvalidQuery)?
                .with_timezone(&Utc),
            punch_out: punch_out
                .map(|t| {
                    DateTime::parse_from_rfc3339(&t)
                        .map(|t| t.with_timezone(&Utc))
                        .map_err(|_| rusqlite::Error::InvalidQuery)
                })
                .transpose()?,
            timezone: row.get(5)?,
            duration_seconds: row.get(6)?,
            status: AttendanceStatus::parse(&status),
            note: row.get(8)?,
        })
    }
}
