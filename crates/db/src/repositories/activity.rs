use tracing::warn;

use tafel_core::activity::{ActivityEntry, ActivityLog};

use super::RepositoryError;
use crate::DbPool;

/// Activity feed persisted to SQLite. `append` is fire-and-forget: the
/// insert runs on a detached task and failures are logged, never surfaced.
#[derive(Clone)]
pub struct SqlActivityLog {
    pool: DbPool,
}

impl SqlActivityLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, entry: &ActivityEntry) -> Result<(), RepositoryError> {
        let metadata_json = serde_json::to_string(&entry.metadata)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO activity_log (entry_id, entity_id, action, actor, metadata, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.entry_id)
        .bind(&entry.entity_id)
        .bind(&entry.action)
        .bind(entry.actor.as_deref())
        .bind(metadata_json)
        .bind(entry.occurred_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl ActivityLog for SqlActivityLog {
    fn append(&self, entry: ActivityEntry) {
        let log = self.clone();
        tokio::spawn(async move {
            if let Err(error) = log.insert(&entry).await {
                warn!(
                    event_name = "activity.append_failed",
                    entity_id = %entry.entity_id,
                    action = %entry.action,
                    error = %error,
                    "dropping activity entry"
                );
            }
        });
    }
}
