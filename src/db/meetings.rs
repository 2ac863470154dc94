//! Meeting document persistence.
//!
//! Meetings are stored as JSON documents alongside a few indexed columns.
//! Every save carries the version read at load time; a mismatch means another
//! writer got there first and surfaces as `Conflict`, forcing the caller to
//! reload and retry.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{CoreError, CoreResult};
use crate::meeting::model::Meeting;

pub struct MeetingRepository;

impl MeetingRepository {
    /// Insert a freshly created meeting at version 0.
    pub fn insert(conn: &Connection, meeting: &Meeting) -> Result<()> {
        let doc = serde_json::to_string(meeting).context("Failed to serialize meeting")?;
        conn.execute(
            "INSERT INTO meetings (id, join_token, status, expires_at, doc, version)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            params![
                meeting.id,
                meeting.join_token,
                meeting.status.as_str(),
                meeting.expires_at.map(|t| t.to_rfc3339()),
                doc,
            ],
        )
        .context("Failed to insert meeting")?;
        Ok(())
    }

    pub fn get(conn: &Connection, id: &str) -> Result<Option<Meeting>> {
        let row = conn
            .query_row(
                "SELECT doc, version FROM meetings WHERE id = ?1",
                params![id],
                |row| {
                    let doc: String = row.get(0)?;
                    let version: i64 = row.get(1)?;
                    Ok((doc, version))
                },
            )
            .optional()
            .context("Failed to query meeting")?;

        row.map(|(doc, version)| Self::hydrate(&doc, version))
            .transpose()
    }

    pub fn get_by_token(conn: &Connection, join_token: &str) -> Result<Option<Meeting>> {
        let row = conn
            .query_row(
                "SELECT doc, version FROM meetings WHERE join_token = ?1",
                params![join_token],
                |row| {
                    let doc: String = row.get(0)?;
                    let version: i64 = row.get(1)?;
                    Ok((doc, version))
                },
            )
            .optional()
            .context("Failed to query meeting by token")?;

        row.map(|(doc, version)| Self::hydrate(&doc, version))
            .transpose()
    }

    /// Versioned save. Succeeds only when the stored version still matches
    /// the one this meeting was loaded at; bumps the meeting's version on
    /// success so the same instance can be saved again.
    pub fn save(conn: &Connection, meeting: &mut Meeting) -> CoreResult<()> {
        let doc = serde_json::to_string(&*meeting)
            .context("Failed to serialize meeting")
            .map_err(CoreError::Internal)?;

        let updated = conn
            .execute(
                "UPDATE meetings SET doc = ?1, status = ?2, expires_at = ?3, version = version + 1
                 WHERE id = ?4 AND version = ?5",
                params![
                    doc,
                    meeting.status.as_str(),
                    meeting.expires_at.map(|t| t.to_rfc3339()),
                    meeting.id,
                    meeting.version,
                ],
            )
            .context("Failed to save meeting")
            .map_err(CoreError::Internal)?;

        if updated == 0 {
            let exists = Self::exists(conn, &meeting.id).map_err(CoreError::Internal)?;
            return if exists {
                Err(CoreError::Conflict(format!(
                    "meeting {} was modified concurrently",
                    meeting.id
                )))
            } else {
                Err(CoreError::NotFound(format!("meeting {}", meeting.id)))
            };
        }

        meeting.version += 1;
        Ok(())
    }

    pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
        let deleted = conn
            .execute("DELETE FROM meetings WHERE id = ?1", params![id])
            .context("Failed to delete meeting")?;
        Ok(deleted > 0)
    }

    /// Meetings, newest first.
    pub fn list(conn: &Connection, limit: usize) -> Result<Vec<Meeting>> {
        let mut stmt = conn
            .prepare(
                "SELECT doc, version FROM meetings ORDER BY created_at DESC, id DESC LIMIT ?1",
            )
            .context("Failed to prepare meetings list query")?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                let doc: String = row.get(0)?;
                let version: i64 = row.get(1)?;
                Ok((doc, version))
            })
            .context("Failed to list meetings")?;

        let mut meetings = Vec::new();
        for row in rows {
            let (doc, version) = row?;
            meetings.push(Self::hydrate(&doc, version)?);
        }
        Ok(meetings)
    }

    /// Active meetings whose expiry has passed; the auto-expiry sweep's scan.
    pub fn list_active_expired(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<Meeting>> {
        let mut stmt = conn
            .prepare(
                "SELECT doc, version FROM meetings
                 WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at <= ?1",
            )
            .context("Failed to prepare expired meetings query")?;

        let rows = stmt
            .query_map(params![now.to_rfc3339()], |row| {
                let doc: String = row.get(0)?;
                let version: i64 = row.get(1)?;
                Ok((doc, version))
            })
            .context("Failed to query expired meetings")?;

        let mut meetings = Vec::new();
        for row in rows {
            let (doc, version) = row?;
            meetings.push(Self::hydrate(&doc, version)?);
        }
        Ok(meetings)
    }

    fn exists(conn: &Connection, id: &str) -> Result<bool> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM meetings WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .context("Failed to check meeting existence")?;
        Ok(count > 0)
    }

    fn hydrate(doc: &str, version: i64) -> Result<Meeting> {
        let mut meeting: Meeting =
            serde_json::from_str(doc).context("Failed to deserialize meeting document")?;
        meeting.version = version;
        Ok(meeting)
    }
}
