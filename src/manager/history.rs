//! History access for the presentation layer.

use super::FetchManager;
use crate::error::Result;
use crate::types::HistoryEntry;
use chrono::{DateTime, Utc};
use uuid::Uuid;

impl FetchManager {
    /// One page of history, most recent first
    pub async fn history(&self, limit: usize, offset: usize) -> Result<Vec<HistoryEntry>> {
        self.db.query_history(limit, offset).await
    }

    /// Total number of history entries
    pub async fn history_count(&self) -> Result<i64> {
        self.db.count_history().await
    }

    /// A single history entry
    pub async fn history_entry(&self, id: Uuid) -> Result<Option<HistoryEntry>> {
        self.db.get_history_entry(id).await
    }

    /// Stored raw log of an entry
    pub async fn raw_log(&self, id: Uuid) -> Result<Option<String>> {
        self.db.get_raw_log(id).await
    }

    /// Delete one entry; unknown ids are a no-op
    pub async fn delete_entry(&self, id: Uuid) -> Result<()> {
        let deleted = self.db.delete_history_entry(id).await?;
        tracing::debug!(entry_id = %id, deleted, "History entry deleted");
        Ok(())
    }

    /// Delete every entry created strictly before `cutoff`, returning the count
    pub async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let deleted = self.db.delete_history_before(cutoff).await?;
        tracing::info!(cutoff = %cutoff, deleted, "Pruned history");
        Ok(deleted)
    }

    /// Insert prepared entries in one transaction (seeding, imports)
    pub async fn seed_history(&self, entries: &[(HistoryEntry, Option<String>)]) -> Result<()> {
        self.db.insert_history_batch(entries).await?;
        tracing::info!(count = entries.len(), "Seeded history");
        Ok(())
    }

    /// Delete all history, returning the count
    pub async fn clear_history(&self) -> Result<u64> {
        self.db.clear_history().await
    }
}
