use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub entry_id: String,
    pub entity_id: String,
    pub action: String,
    pub actor: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(
        entity_id: impl Into<String>,
        action: impl Into<String>,
        actor: Option<String>,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4().to_string(),
            entity_id: entity_id.into(),
            action: action.into(),
            actor,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Fire-and-forget activity feed. Implementations must swallow their own
/// failures; callers never observe an error from `append`.
pub trait ActivityLog: Send + Sync {
    fn append(&self, entry: ActivityEntry);
}

#[derive(Clone, Default)]
pub struct InMemoryActivityLog {
    entries: Arc<Mutex<Vec<ActivityEntry>>>,
}

impl InMemoryActivityLog {
    pub fn entries(&self) -> Vec<ActivityEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ActivityLog for InMemoryActivityLog {
    fn append(&self, entry: ActivityEntry) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

/// Emits activity entries as structured log lines. Used as the fallback sink
/// when no persistent activity store is wired up.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingActivityLog;

impl ActivityLog for TracingActivityLog {
    fn append(&self, entry: ActivityEntry) {
        info!(
            event_name = %entry.action,
            entity_id = %entry.entity_id,
            actor = entry.actor.as_deref().unwrap_or("system"),
            metadata = ?entry.metadata,
            "activity recorded"
        );
    }
}
