//! Debounced persistence for the working option set.
//!
//! Every mutation hands the autosaver a full snapshot of the live options.
//! A new snapshot within the debounce window replaces the scheduled task
//! (trailing-edge only). A fired save replaces the entire persisted option
//! set: delete by inquiry, then insert each live option.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::activity::{ActivityEntry, ActivityLog};
use crate::domain::inquiry::InquiryId;
use crate::domain::option::OfferOption;
use crate::identity::Actor;
use crate::pricing;
use crate::store::{OfferStore, StoreError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveStatus {
    Idle,
    Saving,
    Saved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AutosavePolicy {
    pub debounce: Duration,
    pub saved_display: Duration,
}

impl Default for AutosavePolicy {
    fn default() -> Self {
        Self { debounce: Duration::from_millis(800), saved_display: Duration::from_secs(2) }
    }
}

/// Everything one save cycle needs, captured at schedule time.
#[derive(Clone, Debug)]
pub(crate) struct SaveCycle {
    pub inquiry_id: InquiryId,
    pub actor: Actor,
    pub options: Vec<OfferOption>,
}

impl SaveCycle {
    fn active_count(&self) -> usize {
        self.options.iter().filter(|option| option.is_active).count()
    }

    fn active_value(&self) -> Decimal {
        pricing::active_total(&self.options)
    }
}

/// Replace the persisted option set and stamp the inquiry's edit audit
/// fields. Shared by the debounced path and the explicit `save_options`.
pub(crate) async fn persist_cycle(
    store: &dyn OfferStore,
    activity: &dyn ActivityLog,
    cycle: &SaveCycle,
) -> Result<(), StoreError> {
    store.delete_by_inquiry(&cycle.inquiry_id).await?;
    for option in &cycle.options {
        store.insert_option(&cycle.inquiry_id, option).await?;
    }
    store.stamp_last_edited(&cycle.inquiry_id, &cycle.actor.email, chrono::Utc::now()).await?;

    activity.append(
        ActivityEntry::new(
            cycle.inquiry_id.0.clone(),
            "offer.options_saved",
            Some(cycle.actor.email.clone()),
        )
        .with_metadata("active_options", cycle.active_count().to_string())
        .with_metadata("total_value", cycle.active_value().to_string()),
    );
    Ok(())
}

pub(crate) struct Autosaver {
    policy: AutosavePolicy,
    status_tx: watch::Sender<SaveStatus>,
    pending: Option<JoinHandle<()>>,
}

impl Autosaver {
    pub fn new(policy: AutosavePolicy) -> Self {
        let (status_tx, _) = watch::channel(SaveStatus::Idle);
        Self { policy, status_tx, pending: None }
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.status_tx.subscribe()
    }

    /// Drop any scheduled or in-flight debounced save. An aborted cycle must
    /// not leave the status stuck at `Saving`.
    pub fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
        if *self.status_tx.borrow() != SaveStatus::Idle {
            let _ = self.status_tx.send(SaveStatus::Idle);
        }
    }

    /// (Re)start the debounce timer with a fresh snapshot. Failures are
    /// logged and swallowed: the working draft is non-critical and the next
    /// edit schedules another attempt.
    pub fn schedule(
        &mut self,
        cycle: SaveCycle,
        store: Arc<dyn OfferStore>,
        activity: Arc<dyn ActivityLog>,
    ) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }

        let status_tx = self.status_tx.clone();
        let debounce = self.policy.debounce;
        let saved_display = self.policy.saved_display;

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let _ = status_tx.send(SaveStatus::Saving);

            match persist_cycle(store.as_ref(), activity.as_ref(), &cycle).await {
                Ok(()) => {
                    let _ = status_tx.send(SaveStatus::Saved);
                    tokio::time::sleep(saved_display).await;
                    let _ = status_tx.send(SaveStatus::Idle);
                }
                Err(error) => {
                    warn!(
                        event_name = "offer.autosave_failed",
                        inquiry_id = %cycle.inquiry_id.0,
                        error = %error,
                        "autosave cycle failed; draft changes remain in memory"
                    );
                    let _ = status_tx.send(SaveStatus::Idle);
                }
            }
        }));
    }
}

impl Drop for Autosaver {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}
