use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::option::OfferOption;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryEntryId(pub String);

impl HistoryEntryId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Immutable record of one sent offer: the exact option set and email body
/// at the moment of sending. Appended once per send, never updated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OfferHistoryEntry {
    pub id: HistoryEntryId,
    pub version: u32,
    pub sent_at: DateTime<Utc>,
    pub sent_by: Option<String>,
    pub email_content: Option<String>,
    pub pdf_url: Option<String>,
    pub options_snapshot: Vec<OfferOption>,
}

/// Display order for the version history: newest version first.
pub fn sort_newest_first(entries: &mut [OfferHistoryEntry]) {
    entries.sort_by(|a, b| b.version.cmp(&a.version));
}
