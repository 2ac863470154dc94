//! The two maintenance sweeps: meeting auto-expiry and attendance
//! auto-punch-out. Each sweep opens its own connection, walks its candidate
//! set, and isolates per-item failures so one bad record never aborts the
//! rest of the run.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{error, info, warn};

use crate::db::attendance::AttendanceStatus;
use crate::db::{AttendanceRepository, MeetingRepository};
use crate::timewindow;

/// End active meetings whose expiry has passed.
pub async fn expire_meetings() {
    let result = (|| -> Result<usize> {
        let conn = crate::db::init_db()?;
        sweep_expired_meetings(&conn, Utc::now())
    })();

    match result {
        Ok(0) => {}
        Ok(ended) => info!("Auto-expiry sweep ended {} meeting(s)", ended),
        Err(e) => error!("Meeting auto-expiry sweep failed: {}", e),
    }
}

pub fn sweep_expired_meetings(conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
    let mut ended = 0;
    for mut meeting in MeetingRepository::list_active_expired(conn, now)? {
        if !meeting.auto_end_if_expired_at(now) {
            continue;
        }
        match MeetingRepository::save(conn, &mut meeting) {
            Ok(()) => ended += 1,
            Err(e) => {
                // Another writer may have ended it first; skip and move on.
                warn!("Could not auto-end meeting {}: {}", meeting.id, e);
            }
        }
    }
    Ok(ended)
}

/// Force punch-out for open attendance sessions past the threshold,
/// evaluated in each record's own timezone.
pub async fn auto_punch_out(threshold_hours: u32) {
    let result = (|| -> Result<usize> {
        let conn = crate::db::init_db()?;
        sweep_open_attendance(&conn, threshold_hours, Utc::now())
    })();

    match result {
        Ok(0) => {}
        Ok(closed) => info!("Auto-punch-out sweep closed {} session(s)", closed),
        Err(e) => error!("Attendance auto-punch-out sweep failed: {}", e),
    }
}

pub fn sweep_open_attendance(
    conn: &Connection,
    threshold_hours: u32,
    now: DateTime<Utc>,
) -> Result<usize> {
    let mut closed = 0;
    for record in AttendanceRepository::list_open(conn)? {
        if !timewindow::hours_elapsed_exceeds_at(
            record.punch_in,
            &record.timezone,
            threshold_hours,
            now,
        ) {
            continue;
        }

        let duration_seconds = (now - record.punch_in).num_seconds().max(0);
        let note = format!(
            "Auto-punched out after exceeding the {}h threshold",
            threshold_hours
        );
        match AttendanceRepository::close(
            conn,
            record.id,
            now,
            duration_seconds,
            AttendanceStatus::AutoClosed,
            Some(&note),
        ) {
            Ok(()) => {
                info!(
                    "Auto-punched out candidate {} (session {}, {}s)",
                    record.candidate_id, record.id, duration_seconds
                );
                closed += 1;
            }
            Err(e) => {
                warn!(
                    "Could not auto-punch-out session {} for candidate {}: {}",
                    record.id, record.candidate_id, e
                );
            }
        }
    }
    Ok(closed)
}
