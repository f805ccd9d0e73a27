//! Persistence port for the offer composer.
//!
//! The store is the system of record; the engine's in-memory option set is a
//! working copy reconciled by full replace (delete by inquiry, then insert
//! each live option). The contract requires per-record insert only; no bulk
//! upsert is assumed of any backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::history::{sort_newest_first, OfferHistoryEntry};
use crate::domain::inquiry::{Inquiry, InquiryId, InquiryStatus, OfferFields};
use crate::domain::option::OfferOption;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
    #[error("record not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait OfferStore: Send + Sync {
    async fn load_inquiry(&self, id: &InquiryId) -> Result<Option<Inquiry>, StoreError>;

    async fn list_by_inquiry(&self, id: &InquiryId) -> Result<Vec<OfferOption>, StoreError>;

    async fn delete_by_inquiry(&self, id: &InquiryId) -> Result<(), StoreError>;

    async fn insert_option(
        &self,
        inquiry_id: &InquiryId,
        option: &OfferOption,
    ) -> Result<(), StoreError>;

    /// History entries, newest version first.
    async fn list_history(&self, id: &InquiryId) -> Result<Vec<OfferHistoryEntry>, StoreError>;

    async fn insert_history(
        &self,
        inquiry_id: &InquiryId,
        entry: &OfferHistoryEntry,
    ) -> Result<(), StoreError>;

    async fn update_offer_fields(
        &self,
        id: &InquiryId,
        fields: &OfferFields,
    ) -> Result<(), StoreError>;

    async fn update_status(&self, id: &InquiryId, status: InquiryStatus) -> Result<(), StoreError>;

    async fn stamp_last_edited(
        &self,
        id: &InquiryId,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

#[derive(Default)]
struct InMemoryState {
    inquiries: HashMap<String, Inquiry>,
    options: HashMap<String, Vec<OfferOption>>,
    history: HashMap<String, Vec<OfferHistoryEntry>>,
    last_edited: HashMap<String, (String, DateTime<Utc>)>,
}

/// Test double backed by process memory. `fail_writes` makes every write
/// operation report a backend failure, which is how the autosave error path
/// is exercised.
#[derive(Default)]
pub struct InMemoryOfferStore {
    state: RwLock<InMemoryState>,
    fail_writes: AtomicBool,
}

impl InMemoryOfferStore {
    pub async fn put_inquiry(&self, inquiry: Inquiry) {
        let mut state = self.state.write().await;
        state.inquiries.insert(inquiry.id.0.clone(), inquiry);
    }

    pub async fn put_options(&self, inquiry_id: &InquiryId, options: Vec<OfferOption>) {
        let mut state = self.state.write().await;
        state.options.insert(inquiry_id.0.clone(), options);
    }

    pub async fn options_for(&self, inquiry_id: &InquiryId) -> Vec<OfferOption> {
        let state = self.state.read().await;
        state.options.get(&inquiry_id.0).cloned().unwrap_or_default()
    }

    pub async fn history_for(&self, inquiry_id: &InquiryId) -> Vec<OfferHistoryEntry> {
        let state = self.state.read().await;
        state.history.get(&inquiry_id.0).cloned().unwrap_or_default()
    }

    pub async fn inquiry(&self, inquiry_id: &InquiryId) -> Option<Inquiry> {
        let state = self.state.read().await;
        state.inquiries.get(&inquiry_id.0).cloned()
    }

    pub async fn last_edited(&self, inquiry_id: &InquiryId) -> Option<(String, DateTime<Utc>)> {
        let state = self.state.read().await;
        state.last_edited.get(&inquiry_id.0).cloned()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("simulated write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl OfferStore for InMemoryOfferStore {
    async fn load_inquiry(&self, id: &InquiryId) -> Result<Option<Inquiry>, StoreError> {
        let state = self.state.read().await;
        Ok(state.inquiries.get(&id.0).cloned())
    }

    async fn list_by_inquiry(&self, id: &InquiryId) -> Result<Vec<OfferOption>, StoreError> {
        let state = self.state.read().await;
        Ok(state.options.get(&id.0).cloned().unwrap_or_default())
    }

    async fn delete_by_inquiry(&self, id: &InquiryId) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        state.options.remove(&id.0);
        Ok(())
    }

    async fn insert_option(
        &self,
        inquiry_id: &InquiryId,
        option: &OfferOption,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        state.options.entry(inquiry_id.0.clone()).or_default().push(option.clone());
        Ok(())
    }

    async fn list_history(&self, id: &InquiryId) -> Result<Vec<OfferHistoryEntry>, StoreError> {
        let state = self.state.read().await;
        let mut entries = state.history.get(&id.0).cloned().unwrap_or_default();
        sort_newest_first(&mut entries);
        Ok(entries)
    }

    async fn insert_history(
        &self,
        inquiry_id: &InquiryId,
        entry: &OfferHistoryEntry,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        state.history.entry(inquiry_id.0.clone()).or_default().push(entry.clone());
        Ok(())
    }

    async fn update_offer_fields(
        &self,
        id: &InquiryId,
        fields: &OfferFields,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        let inquiry = state
            .inquiries
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::NotFound(format!("inquiry `{}`", id.0)))?;
        inquiry.offer_sent_at = fields.offer_sent_at;
        inquiry.offer_sent_by = fields.offer_sent_by.clone();
        inquiry.current_offer_version = fields.current_offer_version;
        inquiry.email_draft = fields.email_draft.clone();
        Ok(())
    }

    async fn update_status(&self, id: &InquiryId, status: InquiryStatus) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        let inquiry = state
            .inquiries
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::NotFound(format!("inquiry `{}`", id.0)))?;
        inquiry.status = status;
        Ok(())
    }

    async fn stamp_last_edited(
        &self,
        id: &InquiryId,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        state.last_edited.insert(id.0.clone(), (actor.to_string(), at));
        Ok(())
    }
}
