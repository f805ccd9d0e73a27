//! Offer state engine.
//!
//! Owns the in-memory option set for one open inquiry, applies mutations
//! synchronously, and reconciles with the store through the debounced
//! autosave cycle or an explicit save. Lifecycle transitions (send, unlock)
//! advance the inquiry's version counter; only a send grows the history
//! ledger.

pub mod autosave;

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::activity::{ActivityEntry, ActivityLog};
use crate::completeness;
use crate::domain::history::{sort_newest_first, HistoryEntryId, OfferHistoryEntry};
use crate::domain::inquiry::{Inquiry, InquiryId, InquiryStatus};
use crate::domain::menu::{CourseSelection, DrinkSelection, MenuSelection};
use crate::domain::option::{
    OfferOption, OptionId, OptionLabel, PaymentLink, MAX_LIVE_OPTIONS,
};
use crate::domain::package::Package;
use crate::identity::IdentityProvider;
use crate::pricing;
use crate::store::{OfferStore, StoreError};

use self::autosave::{persist_cycle, AutosavePolicy, Autosaver, SaveCycle, SaveStatus};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("inquiry `{0}` was not found")]
    InquiryNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddOptionOutcome {
    Added { id: OptionId, label: OptionLabel },
    /// All five labels are in use. A soft capacity limit, not an error.
    CapacityReached,
}

/// Shallow field patch for one option. Package changes go through
/// [`OfferEngine::change_package`] so menu reset and price recomputation
/// cannot be skipped; totals here are the caller's recomputation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OptionPatch {
    pub guest_count: Option<u32>,
    pub total_amount: Option<Decimal>,
    pub sort_order: Option<u32>,
}

pub struct OfferEngine {
    inquiry: Inquiry,
    options: Vec<OfferOption>,
    history: Vec<OfferHistoryEntry>,
    store: Arc<dyn OfferStore>,
    identity: Arc<dyn IdentityProvider>,
    activity: Arc<dyn ActivityLog>,
    autosaver: Autosaver,
    load_guard: bool,
}

impl OfferEngine {
    /// Fetch the inquiry, its live options and its version history. A brand
    /// new inquiry with a customer preselection gets option A seeded from
    /// that package. The engine starts behind the load guard: nothing that
    /// happens before [`release_load_guard`](Self::release_load_guard)
    /// schedules an autosave.
    pub async fn load(
        store: Arc<dyn OfferStore>,
        identity: Arc<dyn IdentityProvider>,
        activity: Arc<dyn ActivityLog>,
        policy: AutosavePolicy,
        inquiry_id: &InquiryId,
        catalog: &[Package],
    ) -> Result<Self, EngineError> {
        let inquiry = store
            .load_inquiry(inquiry_id)
            .await?
            .ok_or_else(|| EngineError::InquiryNotFound(inquiry_id.0.clone()))?;

        let mut options = store.list_by_inquiry(inquiry_id).await?;
        options.sort_by_key(|option| option.sort_order);

        let mut history = store.list_history(inquiry_id).await?;
        sort_newest_first(&mut history);

        let mut engine = Self {
            inquiry,
            options,
            history,
            store,
            identity,
            activity,
            autosaver: Autosaver::new(policy),
            load_guard: true,
        };

        if engine.options.is_empty() {
            engine.seed_from_preselection(catalog);
        }

        Ok(engine)
    }

    /// Lift the load guard once the initial state has been handed to the
    /// caller. Mutations from here on schedule autosaves.
    pub fn release_load_guard(&mut self) {
        self.load_guard = false;
    }

    pub fn inquiry(&self) -> &Inquiry {
        &self.inquiry
    }

    pub fn options(&self) -> &[OfferOption] {
        &self.options
    }

    pub fn option(&self, id: &OptionId) -> Option<&OfferOption> {
        self.options.iter().find(|option| &option.id == id)
    }

    pub fn history(&self) -> &[OfferHistoryEntry] {
        &self.history
    }

    pub fn is_locked(&self) -> bool {
        self.inquiry.is_locked()
    }

    pub fn active_total(&self) -> Decimal {
        pricing::active_total(&self.options)
    }

    pub fn save_status(&self) -> watch::Receiver<SaveStatus> {
        self.autosaver.subscribe()
    }

    pub fn incomplete_active_options(&self, catalog: &[Package]) -> Vec<OptionLabel> {
        completeness::incomplete_active_options(&self.options, catalog)
    }

    /// Allocate the lowest unused label. At capacity the set is left
    /// untouched and the caller gets a warning outcome.
    pub fn add_option(&mut self) -> AddOptionOutcome {
        if self.options.len() >= MAX_LIVE_OPTIONS {
            warn!(
                event_name = "offer.option_capacity_reached",
                inquiry_id = %self.inquiry.id.0,
                "all option labels are in use"
            );
            return AddOptionOutcome::CapacityReached;
        }

        let Some(label) = OptionLabel::ALL
            .into_iter()
            .find(|candidate| self.options.iter().all(|option| option.label != *candidate))
        else {
            return AddOptionOutcome::CapacityReached;
        };

        let sort_order =
            self.options.iter().map(|option| option.sort_order).max().map_or(0, |max| max + 1);
        let option = OfferOption::blank(
            label,
            self.inquiry.guest_count,
            self.inquiry.current_offer_version,
            sort_order,
        );
        let id = option.id.clone();
        self.options.push(option);
        self.schedule_autosave();
        AddOptionOutcome::Added { id, label }
    }

    /// Unconditional removal, including the last remaining option.
    pub fn remove_option(&mut self, id: &OptionId) -> bool {
        let before = self.options.len();
        self.options.retain(|option| &option.id != id);
        if self.options.len() == before {
            return false;
        }
        self.schedule_autosave();
        true
    }

    pub fn update_option(&mut self, id: &OptionId, patch: OptionPatch) -> bool {
        let Some(option) = self.options.iter_mut().find(|option| &option.id == id) else {
            return false;
        };
        if let Some(guest_count) = patch.guest_count {
            option.guest_count = guest_count;
        }
        if let Some(total_amount) = patch.total_amount {
            option.total_amount = total_amount;
        }
        if let Some(sort_order) = patch.sort_order {
            option.sort_order = sort_order;
        }
        self.schedule_autosave();
        true
    }

    /// Atomic package switch: sets the package reference, wipes the menu
    /// selection (prior choices are meaningless under the new package) and
    /// recomputes the total. `None` detaches the package and zeroes the
    /// price.
    pub fn change_package(&mut self, id: &OptionId, package: Option<&Package>) -> bool {
        let Some(option) = self.options.iter_mut().find(|option| &option.id == id) else {
            return false;
        };
        match package {
            Some(package) => {
                option.package_id = Some(package.id.clone());
                option.package_name = package.name.clone();
                option.total_amount = pricing::package_total(package, option.guest_count);
            }
            None => {
                option.package_id = None;
                option.package_name = String::new();
                option.total_amount = Decimal::ZERO;
            }
        }
        option.menu = MenuSelection::default();
        self.schedule_autosave();
        true
    }

    /// Inactive options stay visible and editable but are excluded from
    /// totals, email generation and payment-link generation.
    pub fn toggle_option_active(&mut self, id: &OptionId) -> bool {
        let Some(option) = self.options.iter_mut().find(|option| &option.id == id) else {
            return false;
        };
        option.is_active = !option.is_active;
        self.schedule_autosave();
        true
    }

    /// One selection per course type: a pick for an already-represented type
    /// replaces the earlier entry in place.
    pub fn select_course(&mut self, id: &OptionId, selection: CourseSelection) -> bool {
        let Some(option) = self.options.iter_mut().find(|option| &option.id == id) else {
            return false;
        };
        match option
            .menu
            .courses
            .iter_mut()
            .find(|existing| existing.course_type == selection.course_type)
        {
            Some(existing) => *existing = selection,
            None => option.menu.courses.push(selection),
        }
        self.schedule_autosave();
        true
    }

    pub fn select_drink(&mut self, id: &OptionId, selection: DrinkSelection) -> bool {
        let Some(option) = self.options.iter_mut().find(|option| &option.id == id) else {
            return false;
        };
        match option
            .menu
            .drinks
            .iter_mut()
            .find(|existing| existing.drink_group == selection.drink_group)
        {
            Some(existing) => *existing = selection,
            None => option.menu.drinks.push(selection),
        }
        self.schedule_autosave();
        true
    }

    pub fn attach_payment_link(&mut self, id: &OptionId, link: PaymentLink) -> bool {
        let Some(option) = self.options.iter_mut().find(|option| &option.id == id) else {
            return false;
        };
        option.payment_link = Some(link);
        self.schedule_autosave();
        true
    }

    /// Immediate, non-debounced save of the live option set. Unlike the
    /// autosave path, failures surface to the caller.
    pub async fn save_options(&mut self) -> Result<(), EngineError> {
        self.autosaver.cancel_pending();
        let cycle = self.save_cycle();
        persist_cycle(self.store.as_ref(), self.activity.as_ref(), &cycle).await?;
        Ok(())
    }

    /// The send transition: advance the version counter, stamp every live
    /// option, append exactly one immutable history entry snapshotting the
    /// stamped set and the outgoing email, and write the sent markers back
    /// to the inquiry. Not reversible.
    pub async fn create_new_version(
        &mut self,
        email_content: Option<String>,
    ) -> Result<OfferHistoryEntry, EngineError> {
        let actor = self.identity.current_actor();
        let sent_at = Utc::now();
        let next_version = self.inquiry.current_offer_version + 1;

        for option in &mut self.options {
            option.offer_version = next_version;
        }

        let entry = OfferHistoryEntry {
            id: HistoryEntryId::generate(),
            version: next_version,
            sent_at,
            sent_by: Some(actor.email.clone()),
            email_content: email_content.clone(),
            pdf_url: None,
            options_snapshot: self.options.clone(),
        };

        self.autosaver.cancel_pending();
        let cycle = self.save_cycle();
        persist_cycle(self.store.as_ref(), self.activity.as_ref(), &cycle).await?;
        self.store.insert_history(&self.inquiry.id, &entry).await?;

        self.inquiry.offer_sent_at = Some(sent_at);
        self.inquiry.offer_sent_by = Some(actor.email.clone());
        self.inquiry.current_offer_version = next_version;
        self.inquiry.email_draft = email_content;
        self.store.update_offer_fields(&self.inquiry.id, &self.inquiry.offer_fields()).await?;

        self.history.insert(0, entry.clone());

        info!(
            event_name = "offer.version_sent",
            inquiry_id = %self.inquiry.id.0,
            version = next_version,
            actor = %actor.email,
            "offer version sent and snapshotted"
        );
        Ok(entry)
    }

    /// The unlock transition: advance the version counter for the revision
    /// in progress, clear the sent markers, stamp every live option, and
    /// append nothing to the ledger (no snapshot exists yet for the new
    /// revision). The inquiry's CRM status bucket is deliberately untouched.
    pub async fn unlock_for_new_version(&mut self) -> Result<(), EngineError> {
        let actor = self.identity.current_actor();
        let next_version = self.inquiry.current_offer_version + 1;

        for option in &mut self.options {
            option.offer_version = next_version;
        }

        self.autosaver.cancel_pending();
        let cycle = self.save_cycle();
        persist_cycle(self.store.as_ref(), self.activity.as_ref(), &cycle).await?;

        self.inquiry.offer_sent_at = None;
        self.inquiry.offer_sent_by = None;
        self.inquiry.current_offer_version = next_version;
        self.store.update_offer_fields(&self.inquiry.id, &self.inquiry.offer_fields()).await?;

        self.activity.append(
            ActivityEntry::new(
                self.inquiry.id.0.clone(),
                "offer.unlocked_for_revision",
                Some(actor.email.clone()),
            )
            .with_metadata("version", next_version.to_string()),
        );
        info!(
            event_name = "offer.unlocked_for_revision",
            inquiry_id = %self.inquiry.id.0,
            version = next_version,
            actor = %actor.email,
            "offer unlocked for a new revision"
        );
        Ok(())
    }

    /// Move the inquiry into the sent-offers bucket. Final step of the send
    /// flow, separate from the lock fields.
    pub async fn mark_status_offer_sent(&mut self) -> Result<(), StoreError> {
        self.store.update_status(&self.inquiry.id, InquiryStatus::OfferSent).await?;
        self.inquiry.status = InquiryStatus::OfferSent;
        Ok(())
    }

    fn seed_from_preselection(&mut self, catalog: &[Package]) {
        let Some(package) = self
            .inquiry
            .preselected_packages
            .iter()
            .find_map(|id| catalog.iter().find(|package| &package.id == id))
        else {
            return;
        };

        let mut option = OfferOption::blank(
            OptionLabel::A,
            self.inquiry.guest_count,
            self.inquiry.current_offer_version,
            0,
        );
        option.package_id = Some(package.id.clone());
        option.package_name = package.name.clone();
        option.total_amount = pricing::package_total(package, option.guest_count);
        self.options.push(option);
    }

    fn save_cycle(&self) -> SaveCycle {
        SaveCycle {
            inquiry_id: self.inquiry.id.clone(),
            actor: self.identity.current_actor(),
            options: self.options.clone(),
        }
    }

    fn schedule_autosave(&mut self) {
        if self.load_guard {
            return;
        }
        let cycle = self.save_cycle();
        self.autosaver.schedule(cycle, Arc::clone(&self.store), Arc::clone(&self.activity));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rust_decimal::Decimal;

    use super::autosave::{AutosavePolicy, SaveStatus};
    use super::{AddOptionOutcome, EngineError, OfferEngine, OptionPatch};
    use crate::activity::InMemoryActivityLog;
    use crate::domain::inquiry::{Inquiry, InquiryId, InquiryStatus};
    use crate::domain::menu::{CourseSelection, CourseType};
    use crate::domain::option::{OptionId, OptionLabel, PaymentLink};
    use crate::domain::package::{CourseSlot, Package, PackageId, PricingMode};
    use crate::identity::StaticIdentityProvider;
    use crate::store::InMemoryOfferStore;

    const ACTOR: &str = "service@tafel.example";

    fn inquiry(id: &str, guest_count: u32) -> Inquiry {
        Inquiry {
            id: InquiryId(id.to_string()),
            customer_name: "Erika Mustermann".to_string(),
            customer_email: "erika@example.com".to_string(),
            event_date: None,
            guest_count,
            preselected_packages: Vec::new(),
            status: InquiryStatus::InProgress,
            offer_sent_at: None,
            offer_sent_by: None,
            current_offer_version: 1,
            email_draft: None,
        }
    }

    fn per_person_package(id: &str, unit_price: Decimal) -> Package {
        Package {
            id: PackageId(id.to_string()),
            name: format!("Package {id}"),
            pricing_mode: PricingMode::PerPerson,
            unit_price,
            courses: vec![CourseSlot {
                course_type: CourseType("main".to_string()),
                label: "Main course".to_string(),
                required: true,
            }],
            drinks: Vec::new(),
        }
    }

    struct Harness {
        store: Arc<InMemoryOfferStore>,
        activity: InMemoryActivityLog,
        engine: OfferEngine,
    }

    async fn harness(inquiry: Inquiry, catalog: &[Package]) -> Harness {
        let store = Arc::new(InMemoryOfferStore::default());
        store.put_inquiry(inquiry.clone()).await;
        let activity = InMemoryActivityLog::default();

        let engine = OfferEngine::load(
            store.clone(),
            Arc::new(StaticIdentityProvider::new(ACTOR)),
            Arc::new(activity.clone()),
            AutosavePolicy::default(),
            &inquiry.id,
            catalog,
        )
        .await
        .expect("load engine");

        Harness { store, activity, engine }
    }

    fn first_option_id(engine: &OfferEngine) -> OptionId {
        engine.options()[0].id.clone()
    }

    #[tokio::test]
    async fn load_fails_for_unknown_inquiry() {
        let store: Arc<InMemoryOfferStore> = Arc::new(InMemoryOfferStore::default());
        let result = OfferEngine::load(
            store,
            Arc::new(StaticIdentityProvider::new(ACTOR)),
            Arc::new(InMemoryActivityLog::default()),
            AutosavePolicy::default(),
            &InquiryId("ghost".to_string()),
            &[],
        )
        .await;

        assert!(matches!(result, Err(EngineError::InquiryNotFound(_))));
    }

    #[tokio::test]
    async fn first_load_seeds_option_a_from_preselection() {
        let package = per_person_package("pkg-gala", Decimal::new(2_500, 2));
        let mut inquiry = inquiry("inq-seed", 20);
        inquiry.preselected_packages = vec![package.id.clone()];

        let harness = harness(inquiry, std::slice::from_ref(&package)).await;
        let options = harness.engine.options();

        assert_eq!(options.len(), 1);
        assert_eq!(options[0].label, OptionLabel::A);
        assert_eq!(options[0].package_id, Some(package.id));
        assert_eq!(options[0].total_amount, Decimal::new(50_000, 2));
        assert!(options[0].menu.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn add_option_assigns_lowest_unused_label_up_to_capacity() {
        let mut harness = harness(inquiry("inq-labels", 10), &[]).await;
        harness.engine.release_load_guard();

        let mut labels = Vec::new();
        for _ in 0..5 {
            match harness.engine.add_option() {
                AddOptionOutcome::Added { label, .. } => labels.push(label),
                AddOptionOutcome::CapacityReached => panic!("capacity reached too early"),
            }
        }
        assert_eq!(
            labels,
            vec![OptionLabel::A, OptionLabel::B, OptionLabel::C, OptionLabel::D, OptionLabel::E]
        );

        assert_eq!(harness.engine.add_option(), AddOptionOutcome::CapacityReached);
        assert_eq!(harness.engine.options().len(), 5);

        // Freeing a middle label makes it the next allocation.
        let b_id = harness.engine.options()[1].id.clone();
        assert!(harness.engine.remove_option(&b_id));
        match harness.engine.add_option() {
            AddOptionOutcome::Added { label, .. } => assert_eq!(label, OptionLabel::B),
            AddOptionOutcome::CapacityReached => panic!("label B should be free"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn change_package_resets_menu_and_recomputes_total() {
        let first = per_person_package("pkg-first", Decimal::new(3_000, 2));
        let second = per_person_package("pkg-second", Decimal::new(4_000, 2));
        let mut harness = harness(inquiry("inq-switch", 10), &[]).await;
        harness.engine.release_load_guard();

        harness.engine.add_option();
        let id = first_option_id(&harness.engine);
        harness.engine.change_package(&id, Some(&first));
        harness.engine.select_course(
            &id,
            CourseSelection {
                course_type: CourseType("main".to_string()),
                course_label: "Main course".to_string(),
                item_id: Some("item-1".to_string()),
                item_name: "Schnitzel".to_string(),
                item_description: String::new(),
                item_source: "catalog".to_string(),
                is_custom: false,
            },
        );
        assert!(!harness.engine.option(&id).expect("option").menu.is_empty());

        harness.engine.change_package(&id, Some(&second));
        let option = harness.engine.option(&id).expect("option");
        assert!(option.menu.is_empty());
        assert_eq!(option.total_amount, Decimal::new(40_000, 2));
        assert_eq!(option.package_name, "Package pkg-second");
    }

    #[tokio::test(start_paused = true)]
    async fn selecting_a_course_twice_replaces_in_place() {
        let mut harness = harness(inquiry("inq-menu", 10), &[]).await;
        harness.engine.release_load_guard();
        harness.engine.add_option();
        let id = first_option_id(&harness.engine);

        let selection = |item: &str| CourseSelection {
            course_type: CourseType("starter".to_string()),
            course_label: "Starter".to_string(),
            item_id: Some(item.to_string()),
            item_name: item.to_string(),
            item_description: String::new(),
            item_source: "catalog".to_string(),
            is_custom: false,
        };

        harness.engine.select_course(&id, selection("soup"));
        harness.engine.select_course(&id, selection("salad"));

        let menu = &harness.engine.option(&id).expect("option").menu;
        assert_eq!(menu.courses.len(), 1);
        assert_eq!(menu.courses[0].item_id.as_deref(), Some("salad"));
    }

    #[tokio::test(start_paused = true)]
    async fn autosave_fires_once_after_debounce_window() {
        let mut harness = harness(inquiry("inq-autosave", 10), &[]).await;
        harness.engine.release_load_guard();

        harness.engine.add_option();
        tokio::time::sleep(Duration::from_millis(400)).await;
        let id = first_option_id(&harness.engine);
        harness.engine.update_option(&id, OptionPatch { guest_count: Some(12), ..OptionPatch::default() });

        // 500ms after the second change: the restarted timer has not fired.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(harness.store.options_for(&InquiryId("inq-autosave".to_string())).await.is_empty());

        tokio::time::sleep(Duration::from_millis(400)).await;
        let persisted = harness.store.options_for(&InquiryId("inq-autosave".to_string())).await;
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].guest_count, 12);

        let saves: Vec<_> = harness
            .activity
            .entries()
            .into_iter()
            .filter(|entry| entry.action == "offer.options_saved")
            .collect();
        assert_eq!(saves.len(), 1);
        assert!(harness
            .store
            .last_edited(&InquiryId("inq-autosave".to_string()))
            .await
            .is_some_and(|(actor, _)| actor == ACTOR));
    }

    #[tokio::test(start_paused = true)]
    async fn autosave_does_not_fire_behind_load_guard() {
        let mut harness = harness(inquiry("inq-guard", 10), &[]).await;

        harness.engine.add_option();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(harness.store.options_for(&InquiryId("inq-guard".to_string())).await.is_empty());
        assert!(harness.activity.entries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn autosave_failure_is_silent_and_resets_status() {
        let mut harness = harness(inquiry("inq-fail", 10), &[]).await;
        harness.engine.release_load_guard();
        let status = harness.engine.save_status();

        harness.store.set_fail_writes(true);
        harness.engine.add_option();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(*status.borrow(), SaveStatus::Idle);
        assert!(harness.activity.entries().is_empty());
        // The draft survives in memory for the next attempt.
        assert_eq!(harness.engine.options().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn save_status_shows_saved_then_reverts_to_idle() {
        let mut harness = harness(inquiry("inq-status", 10), &[]).await;
        harness.engine.release_load_guard();
        let status = harness.engine.save_status();

        harness.engine.add_option();
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(*status.borrow(), SaveStatus::Saved);

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(*status.borrow(), SaveStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_save_surfaces_store_failure() {
        let mut harness = harness(inquiry("inq-explicit", 10), &[]).await;
        harness.engine.release_load_guard();
        harness.engine.add_option();

        harness.store.set_fail_writes(true);
        let error = harness.engine.save_options().await.expect_err("save should fail");
        assert!(matches!(error, EngineError::Store(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn send_scenario_produces_version_two_and_one_snapshot() {
        let package = per_person_package("pkg-dinner", Decimal::new(2_500, 2));
        let mut harness = harness(inquiry("inq-send", 20), &[]).await;
        harness.engine.release_load_guard();

        harness.engine.add_option();
        let id = first_option_id(&harness.engine);
        harness.engine.change_package(&id, Some(&package));
        assert_eq!(harness.engine.option(&id).expect("option").total_amount, Decimal::new(50_000, 2));

        let entry = harness
            .engine
            .create_new_version(Some("Sehr geehrte Frau Mustermann, ...".to_string()))
            .await
            .expect("send");

        assert_eq!(entry.version, 2);
        assert_eq!(entry.options_snapshot.len(), 1);
        assert_eq!(entry.options_snapshot[0].offer_version, 2);
        assert_eq!(entry.options_snapshot, harness.engine.options());
        assert_eq!(entry.sent_by.as_deref(), Some(ACTOR));

        let inquiry = harness.engine.inquiry();
        assert_eq!(inquiry.current_offer_version, 2);
        assert!(inquiry.offer_sent_at.is_some());
        assert_eq!(inquiry.offer_sent_by.as_deref(), Some(ACTOR));
        assert!(harness.engine.is_locked());

        assert_eq!(harness.engine.history().len(), 1);
        let stored = harness.store.history_for(&InquiryId("inq-send".to_string())).await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].email_content.as_deref(), Some("Sehr geehrte Frau Mustermann, ..."));

        let persisted_inquiry =
            harness.store.inquiry(&InquiryId("inq-send".to_string())).await.expect("inquiry");
        assert_eq!(persisted_inquiry.current_offer_version, 2);
        assert_eq!(
            persisted_inquiry.email_draft.as_deref(),
            Some("Sehr geehrte Frau Mustermann, ...")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unlock_increments_version_without_history_entry() {
        let mut harness = harness(inquiry("inq-unlock", 20), &[]).await;
        harness.engine.release_load_guard();
        harness.engine.add_option();

        harness.engine.create_new_version(None).await.expect("send");
        assert_eq!(harness.engine.inquiry().current_offer_version, 2);
        assert_eq!(harness.engine.history().len(), 1);

        harness.engine.unlock_for_new_version().await.expect("unlock");

        let inquiry = harness.engine.inquiry();
        assert_eq!(inquiry.current_offer_version, 3);
        assert!(inquiry.offer_sent_at.is_none());
        assert!(inquiry.offer_sent_by.is_none());
        assert!(!harness.engine.is_locked());
        assert_eq!(harness.engine.history().len(), 1);
        assert_eq!(harness.engine.options()[0].offer_version, 3);

        let stored = harness.store.history_for(&InquiryId("inq-unlock".to_string())).await;
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unlock_preserves_crm_status_bucket() {
        let mut harness = harness(inquiry("inq-bucket", 20), &[]).await;
        harness.engine.release_load_guard();
        harness.engine.add_option();

        harness.engine.create_new_version(None).await.expect("send");
        harness.engine.mark_status_offer_sent().await.expect("status");
        assert_eq!(harness.engine.inquiry().status, InquiryStatus::OfferSent);

        harness.engine.unlock_for_new_version().await.expect("unlock");

        assert_eq!(harness.engine.inquiry().status, InquiryStatus::OfferSent);
        let persisted =
            harness.store.inquiry(&InquiryId("inq-bucket".to_string())).await.expect("inquiry");
        assert_eq!(persisted.status, InquiryStatus::OfferSent);
    }

    #[tokio::test(start_paused = true)]
    async fn mutations_on_locked_inquiry_are_not_blocked() {
        let mut harness = harness(inquiry("inq-locked", 20), &[]).await;
        harness.engine.release_load_guard();
        harness.engine.add_option();
        harness.engine.create_new_version(None).await.expect("send");
        assert!(harness.engine.is_locked());

        // Write-protection is a caller convention, not an engine invariant.
        let outcome = harness.engine.add_option();
        assert!(matches!(outcome, AddOptionOutcome::Added { label: OptionLabel::B, .. }));
        assert_eq!(harness.engine.options().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn payment_link_attachment_round_trips() {
        let mut harness = harness(inquiry("inq-link", 20), &[]).await;
        harness.engine.release_load_guard();
        harness.engine.add_option();
        let id = first_option_id(&harness.engine);

        assert!(harness.engine.attach_payment_link(
            &id,
            PaymentLink { id: "plink_1".to_string(), url: "https://pay.example/1".to_string() },
        ));
        assert_eq!(
            harness.engine.option(&id).expect("option").payment_link.as_ref().map(|l| l.id.as_str()),
            Some("plink_1")
        );
        assert!(!harness
            .engine
            .attach_payment_link(
                &OptionId("missing".to_string()),
                PaymentLink { id: "x".to_string(), url: "y".to_string() },
            ));
    }
}
