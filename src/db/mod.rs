//! Database layer for fetchy-dl
//!
//! Handles SQLite persistence of job outcomes. The store runs in WAL journal
//! mode so that a process killed mid-write (extension lifetime limits) never
//! leaves a torn database behind.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`history`] - History entry insertion, pagination and deletion

use crate::error::{DatabaseError, Error, Result};
use crate::types::{HistoryEntry, HistoryStatus};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;
use uuid::Uuid;

mod history;
mod migrations;

/// History record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    /// UUID in hyphenated text form
    pub id: String,
    /// Display title
    pub title: String,
    /// Source URL
    pub url: String,
    /// Service label
    pub service: String,
    /// Unix timestamp in nanoseconds
    pub created_at: i64,
    /// Status column value
    pub status: String,
    /// Local file path, if the job produced one
    pub local_path: Option<String>,
}

/// Column value for `at`: nanoseconds since the Unix epoch
///
/// Full precision keeps `created_at` comparisons exact. Instants outside
/// 1677..2262 do not fit and are rejected.
pub(crate) fn to_stored_time(at: DateTime<Utc>) -> Result<i64> {
    at.timestamp_nanos_opt().ok_or_else(|| {
        Error::Database(DatabaseError::QueryFailed(format!(
            "timestamp {} is outside the storable range",
            at
        )))
    })
}

/// Inverse of [`to_stored_time`]; every column value maps to one instant
pub(crate) fn from_stored_time(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = String;

    fn try_from(row: HistoryRow) -> std::result::Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id).map_err(|e| format!("bad id '{}': {}", row.id, e))?;
        let status = row.status.parse::<HistoryStatus>()?;

        Ok(HistoryEntry {
            id,
            title: row.title,
            url: row.url,
            service: row.service,
            created_at: from_stored_time(row.created_at),
            status,
            local_path: row
                .local_path
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        })
    }
}

/// Database handle for fetchy-dl
pub struct Database {
    pool: SqlitePool,
}
