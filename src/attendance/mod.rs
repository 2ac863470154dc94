//! Attendance sessions: punch in, punch out, and the rules the
//! auto-punch-out sweep relies on.
//!
//! A candidate holds at most one open session per calendar day. The timezone
//! captured at punch-in is the one later threshold checks are evaluated in.

use chrono::Utc;
use chrono_tz::Tz;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::db::attendance::{AttendanceRecord, AttendanceStatus};
use crate::db::AttendanceRepository;
use crate::error::{CoreError, CoreResult};

pub struct AttendanceService;

impl AttendanceService {
    /// Open today's session for a candidate. An unknown timezone is stored
    /// as UTC rather than rejected, matching how threshold checks treat it.
    pub fn punch_in(
        conn: &Connection,
        candidate_id: &str,
        timezone: Option<&str>,
    ) -> CoreResult<AttendanceRecord> {
        let now = Utc::now();
        let day = now.date_naive();

        if let Some(existing) = AttendanceRepository::find_open(conn, candidate_id, day)
            .map_err(CoreError::Internal)?
        {
            return Err(CoreError::Conflict(format!(
                "candidate {} already punched in at {}",
                candidate_id,
                existing.punch_in.to_rfc3339()
            )));
        }

        let timezone = match timezone {
            Some(tz) if tz.parse::<Tz>().is_ok() => tz.to_string(),
            Some(tz) => {
                warn!(
                    "Unknown timezone {:?} for candidate {}, storing UTC",
                    tz, candidate_id
                );
                "UTC".to_string()
            }
            None => "UTC".to_string(),
        };

        let id = AttendanceRepository::insert(conn, candidate_id, day, now, &timezone)
            .map_err(CoreError::Internal)?;

        info!(
            "Candidate {} punched in ({}, timezone {})",
            candidate_id, day, timezone
        );

        AttendanceRepository::get(conn, id)
            .map_err(CoreError::Internal)?
            .ok_or_else(|| CoreError::NotFound(format!("attendance record {}", id)))
    }

    /// Close today's open session and record the worked duration.
    pub fn punch_out(conn: &Connection, candidate_id: &str) -> CoreResult<AttendanceRecord> {
        let now = Utc::now();
        let day = now.date_naive();

        let open = AttendanceRepository::find_open(conn, candidate_id, day)
            .map_err(CoreError::Internal)?
            .ok_or_else(|| {
                CoreError::NotFound(format!(
                    "no open attendance session for candidate {} on {}",
                    candidate_id, day
                ))
            })?;

        let duration_seconds = (now - open.punch_in).num_seconds().max(0);
        AttendanceRepository::close(
            conn,
            open.id,
            now,
            duration_seconds,
            AttendanceStatus::Closed,
            None,
        )
        .map_err(CoreError::Internal)?;

        info!(
            "Candidate {} punched out after {}s",
            candidate_id, duration_seconds
        );

        AttendanceRepository::get(conn, open.id)
            .map_err(CoreError::Internal)?
            .ok_or_else(|| CoreError::NotFound(format!("attendance record {}", open.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn
    }

    #[test]
    fn test_punch_in_and_out() {
        let conn = setup_db();

        let record = AttendanceService::punch_in(&conn, "cand-1", Some("America/New_York"))
            .unwrap();
        assert_eq!(record.status, AttendanceStatus::Open);
        assert_eq!(record.timezone, "America/New_York");

        let closed = AttendanceService::punch_out(&conn, "cand-1").unwrap();
        assert_eq!(closed.status, AttendanceStatus::Closed);
        assert!(closed.punch_out.is_some());
        assert!(closed.duration_seconds.unwrap() >= 0);
    }

    #[test]
    fn test_double_punch_in_conflicts() {
        let conn = setup_db();
        AttendanceService::punch_in(&conn, "cand-1", None).unwrap();

        let err = AttendanceService::punch_in(&conn, "cand-1", None).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn test_punch_out_without_session() {
        let conn = setup_db();
        let err = AttendanceService::punch_out(&conn, "cand-1").unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn test_unknown_timezone_falls_back_to_utc() {
        let conn = setup_db();
        let record = AttendanceService::punch_in(&conn, "cand-1", Some("Mars/Olympus")).unwrap();
        assert_eq!(record.timezone, "UTC");
    }

    #[test]
    fn test_new_session_allowed_after_punch_out() {
        let conn = setup_db();
        AttendanceService::punch_in(&conn, "cand-1", None).unwrap();
        AttendanceService::punch_out(&conn, "cand-1").unwrap();

        let second = AttendanceService::punch_in(&conn, "cand-1", None).unwrap();
        assert_eq!(second.status, AttendanceStatus::Open);
    }
}
