//! History management operations.

use crate::types::HistoryEntry;
use crate::utils::truncate_log;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Database, HistoryRow, to_stored_time};

const INSERT_HISTORY: &str = r#"
    INSERT INTO history (
        id, title, url, service, created_at, status, local_path, raw_log
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#;

fn rows_to_entries(rows: Vec<HistoryRow>) -> Vec<HistoryEntry> {
    rows.into_iter()
        .filter_map(|row| match HistoryEntry::try_from(row) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable history row");
                None
            }
        })
        .collect()
}

impl Database {
    /// Insert a job outcome into history
    ///
    /// The raw log is capped with [`truncate_log`] before it is written. Safe to
    /// call concurrently from independent jobs; each call is one statement.
    pub async fn insert_history(&self, entry: &HistoryEntry, raw_log: Option<&str>) -> Result<()> {
        let raw_log = raw_log.map(truncate_log);
        let created_at = to_stored_time(entry.created_at)?;

        sqlx::query(INSERT_HISTORY)
            .bind(entry.id.to_string())
            .bind(&entry.title)
            .bind(&entry.url)
            .bind(&entry.service)
            .bind(created_at)
            .bind(entry.status.as_str())
            .bind(
                entry
                    .local_path
                    .as_ref()
                    .and_then(|p| p.to_str().map(String::from)),
            )
            .bind(raw_log)
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(())
    }

    /// Insert many entries in a single transaction
    ///
    /// Used for seeding and imports; either every row lands or none does.
    pub async fn insert_history_batch(&self, entries: &[(HistoryEntry, Option<String>)]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Sqlx)?;

        for (entry, raw_log) in entries {
            let created_at = to_stored_time(entry.created_at)?;
            sqlx::query(INSERT_HISTORY)
                .bind(entry.id.to_string())
                .bind(&entry.title)
                .bind(&entry.url)
                .bind(&entry.service)
                .bind(created_at)
                .bind(entry.status.as_str())
                .bind(
                    entry
                        .local_path
                        .as_ref()
                        .and_then(|p| p.to_str().map(String::from)),
                )
                .bind(raw_log.as_deref().map(truncate_log))
                .execute(&mut *tx)
                .await
                .map_err(Error::Sqlx)?;
        }

        tx.commit().await.map_err(Error::Sqlx)?;
        Ok(())
    }

    /// Query history with pagination
    ///
    /// Returns entries ordered by creation time (most recent first). Offsets are
    /// not stable across concurrent inserts.
    pub async fn query_history(&self, limit: usize, offset: usize) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, title, url, service, created_at, status, local_path
            FROM history
            ORDER BY created_at DESC, rowid DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(rows_to_entries(rows))
    }

    /// Count history entries
    pub async fn count_history(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM history")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(count)
    }

    /// Get a single history entry by ID
    pub async fn get_history_entry(&self, id: Uuid) -> Result<Option<HistoryEntry>> {
        let row = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, title, url, service, created_at, status, local_path
            FROM history
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(row.and_then(|row| rows_to_entries(vec![row]).pop()))
    }

    /// Fetch the stored raw log of an entry
    ///
    /// Returns `None` both for a missing entry and for an entry without a log.
    pub async fn get_raw_log(&self, id: Uuid) -> Result<Option<String>> {
        let log = sqlx::query_scalar::<_, Option<String>>("SELECT raw_log FROM history WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(log.flatten())
    }

    /// Delete a single history entry
    ///
    /// Returns the number of rows deleted; deleting an unknown id is not an error.
    pub async fn delete_history_entry(&self, id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM history WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(result.rows_affected())
    }

    /// Delete history entries created strictly before `cutoff`
    ///
    /// Returns the number of records deleted.
    pub async fn delete_history_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        // A cutoff past the storable range is below or above every row
        let cutoff = to_stored_time(cutoff).unwrap_or_else(|_| {
            if cutoff.timestamp() < 0 {
                i64::MIN
            } else {
                i64::MAX
            }
        });

        let result = sqlx::query("DELETE FROM history WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(result.rows_affected())
    }

    /// Clear all history
    ///
    /// Returns the number of records deleted.
    pub async fn clear_history(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM history")
            .execute(&self.pool)
            .await
            .map_err(Error::Sqlx)?;

        Ok(result.rows_affected())
    }
}
