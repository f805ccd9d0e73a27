//! Send-flow orchestration.
//!
//! Sequences the multi-step send: save → payment links → version transition
//! → quotation document → status update. Collaborator calls run one at a
//! time so a failure can abort the remainder and name where it happened;
//! completed steps are not compensated.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::activity::{ActivityEntry, ActivityLog};
use crate::domain::history::OfferHistoryEntry;
use crate::domain::inquiry::{Inquiry, InquiryId};
use crate::domain::option::{OfferOption, OptionId, OptionLabel, PaymentLink};
use crate::domain::package::Package;
use crate::engine::{EngineError, OfferEngine};
use crate::store::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("collaborator rejected the request: {0}")]
    Rejected(String),
    #[error("collaborator call failed: {0}")]
    Transport(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentLinkRequest {
    pub inquiry_id: InquiryId,
    pub option_id: OptionId,
    pub package_name: String,
    pub amount: Decimal,
    pub customer_name: String,
    pub customer_email: String,
}

/// Payment-link collaborator. Safe to retry manually after a failure; the
/// flow itself never retries.
#[async_trait]
pub trait PaymentLinkProvider: Send + Sync {
    async fn create_link(&self, request: &PaymentLinkRequest)
        -> Result<PaymentLink, ProviderError>;
}

/// Renders the outgoing offer email from the active options and inquiry
/// metadata. Failures surface to the operator; there is no retry.
#[async_trait]
pub trait OfferEmailGenerator: Send + Sync {
    async fn generate(
        &self,
        inquiry: &Inquiry,
        options: &[OfferOption],
    ) -> Result<String, ProviderError>;
}

/// Produces the customer-facing quotation document for a sent version.
#[async_trait]
pub trait QuotationGenerator: Send + Sync {
    async fn generate(
        &self,
        inquiry: &Inquiry,
        entry: &OfferHistoryEntry,
    ) -> Result<(), ProviderError>;
}

#[derive(Clone, Debug, Error)]
pub enum SendError {
    #[error("offer options could not be saved before sending: {0}")]
    Save(#[source] EngineError),
    #[error("payment link generation failed for option {label}: {source}")]
    PaymentLink {
        label: OptionLabel,
        #[source]
        source: ProviderError,
    },
    #[error("offer version transition failed: {0}")]
    Version(#[source] EngineError),
    #[error("quotation generation failed after version advance: {0}")]
    Quotation(#[source] ProviderError),
    #[error("inquiry status update failed after version advance: {0}")]
    StatusUpdate(#[source] StoreError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendOutcome {
    pub version: u32,
    pub links_created: u32,
}

/// Result of the gated email-generation step. An incomplete menu is a
/// business condition, not an error: the caller gets the offending labels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmailGeneration {
    Generated(String),
    Incomplete { labels: Vec<OptionLabel> },
}

pub struct SendFlow {
    payments: Arc<dyn PaymentLinkProvider>,
    email: Arc<dyn OfferEmailGenerator>,
    quotation: Arc<dyn QuotationGenerator>,
    activity: Arc<dyn ActivityLog>,
}

impl SendFlow {
    pub fn new(
        payments: Arc<dyn PaymentLinkProvider>,
        email: Arc<dyn OfferEmailGenerator>,
        quotation: Arc<dyn QuotationGenerator>,
        activity: Arc<dyn ActivityLog>,
    ) -> Self {
        Self { payments, email, quotation, activity }
    }

    /// Render the offer email, refusing while any active packaged option is
    /// still incomplete.
    pub async fn generate_email(
        &self,
        engine: &OfferEngine,
        catalog: &[Package],
    ) -> Result<EmailGeneration, ProviderError> {
        let incomplete = engine.incomplete_active_options(catalog);
        if !incomplete.is_empty() {
            return Ok(EmailGeneration::Incomplete { labels: incomplete });
        }

        let active: Vec<OfferOption> =
            engine.options().iter().filter(|option| option.is_active).cloned().collect();
        let body = self.email.generate(engine.inquiry(), &active).await?;
        Ok(EmailGeneration::Generated(body))
    }

    /// The full send sequence. Any failure aborts the remaining steps; a
    /// failure after the version transition leaves the counter advanced and
    /// records an explicit send-failure marker instead of rolling back.
    pub async fn send_offer(
        &self,
        engine: &mut OfferEngine,
        email_content: String,
    ) -> Result<SendOutcome, SendError> {
        engine.save_options().await.map_err(SendError::Save)?;

        let pending: Vec<(OptionId, OptionLabel, PaymentLinkRequest)> = engine
            .options()
            .iter()
            .filter(|option| {
                option.is_active && option.has_package() && option.payment_link.is_none()
            })
            .map(|option| {
                (
                    option.id.clone(),
                    option.label,
                    PaymentLinkRequest {
                        inquiry_id: engine.inquiry().id.clone(),
                        option_id: option.id.clone(),
                        package_name: option.package_name.clone(),
                        amount: option.total_amount,
                        customer_name: engine.inquiry().customer_name.clone(),
                        customer_email: engine.inquiry().customer_email.clone(),
                    },
                )
            })
            .collect();

        let mut links_created = 0_u32;
        for (option_id, label, request) in pending {
            let link = self
                .payments
                .create_link(&request)
                .await
                .map_err(|source| SendError::PaymentLink { label, source })?;
            engine.attach_payment_link(&option_id, link);
            links_created += 1;
        }

        let entry = engine
            .create_new_version(Some(email_content))
            .await
            .map_err(SendError::Version)?;

        if let Err(source) = self.quotation.generate(engine.inquiry(), &entry).await {
            self.record_send_failure(engine, entry.version, "quotation_generation");
            return Err(SendError::Quotation(source));
        }

        if let Err(source) = engine.mark_status_offer_sent().await {
            self.record_send_failure(engine, entry.version, "status_update");
            return Err(SendError::StatusUpdate(source));
        }

        Ok(SendOutcome { version: entry.version, links_created })
    }

    /// Marker for a version that advanced without completing the sequence.
    /// The inconsistency stays visible in the activity feed rather than
    /// being silently repaired.
    fn record_send_failure(&self, engine: &OfferEngine, version: u32, failed_step: &str) {
        self.activity.append(
            ActivityEntry::new(
                engine.inquiry().id.0.clone(),
                "offer.send_failed",
                engine.inquiry().offer_sent_by.clone(),
            )
            .with_metadata("version", version.to_string())
            .with_metadata("failed_step", failed_step.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use super::{
        EmailGeneration, OfferEmailGenerator, PaymentLinkProvider, PaymentLinkRequest,
        ProviderError, QuotationGenerator, SendError, SendFlow,
    };
    use crate::activity::InMemoryActivityLog;
    use crate::domain::history::OfferHistoryEntry;
    use crate::domain::inquiry::{Inquiry, InquiryId, InquiryStatus};
    use crate::domain::menu::{CourseSelection, CourseType};
    use crate::domain::option::{OfferOption, PaymentLink};
    use crate::domain::package::{CourseSlot, Package, PackageId, PricingMode};
    use crate::engine::autosave::AutosavePolicy;
    use crate::engine::OfferEngine;
    use crate::identity::StaticIdentityProvider;
    use crate::store::InMemoryOfferStore;

    const ACTOR: &str = "events@tafel.example";

    struct CountingPayments {
        calls: AtomicU32,
        fail_on_call: Option<u32>,
    }

    impl CountingPayments {
        fn new(fail_on_call: Option<u32>) -> Self {
            Self { calls: AtomicU32::new(0), fail_on_call }
        }
    }

    #[async_trait]
    impl PaymentLinkProvider for CountingPayments {
        async fn create_link(
            &self,
            request: &PaymentLinkRequest,
        ) -> Result<PaymentLink, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_call == Some(call) {
                return Err(ProviderError::Transport("gateway timeout".to_string()));
            }
            Ok(PaymentLink {
                id: format!("plink_{call}"),
                url: format!("https://pay.example/{}", request.option_id.0),
            })
        }
    }

    struct StubEmail;

    #[async_trait]
    impl OfferEmailGenerator for StubEmail {
        async fn generate(
            &self,
            inquiry: &Inquiry,
            options: &[OfferOption],
        ) -> Result<String, ProviderError> {
            Ok(format!("offer for {} with {} options", inquiry.customer_name, options.len()))
        }
    }

    struct StubQuotation {
        fail: bool,
    }

    #[async_trait]
    impl QuotationGenerator for StubQuotation {
        async fn generate(
            &self,
            _inquiry: &Inquiry,
            _entry: &OfferHistoryEntry,
        ) -> Result<(), ProviderError> {
            if self.fail {
                return Err(ProviderError::Rejected("renderer unavailable".to_string()));
            }
            Ok(())
        }
    }

    fn inquiry(id: &str) -> Inquiry {
        Inquiry {
            id: InquiryId(id.to_string()),
            customer_name: "Erika Mustermann".to_string(),
            customer_email: "erika@example.com".to_string(),
            event_date: None,
            guest_count: 20,
            preselected_packages: Vec::new(),
            status: InquiryStatus::InProgress,
            offer_sent_at: None,
            offer_sent_by: None,
            current_offer_version: 1,
            email_draft: None,
        }
    }

    fn package(id: &str) -> Package {
        Package {
            id: PackageId(id.to_string()),
            name: format!("Package {id}"),
            pricing_mode: PricingMode::PerPerson,
            unit_price: Decimal::new(2_500, 2),
            courses: vec![CourseSlot {
                course_type: CourseType("main".to_string()),
                label: "Main course".to_string(),
                required: true,
            }],
            drinks: Vec::new(),
        }
    }

    struct Setup {
        store: Arc<InMemoryOfferStore>,
        activity: InMemoryActivityLog,
        engine: OfferEngine,
    }

    async fn engine_with_options(inquiry_id: &str, packaged: u32) -> Setup {
        let store = Arc::new(InMemoryOfferStore::default());
        store.put_inquiry(inquiry(inquiry_id)).await;
        let activity = InMemoryActivityLog::default();

        let mut engine = OfferEngine::load(
            store.clone(),
            Arc::new(StaticIdentityProvider::new(ACTOR)),
            Arc::new(activity.clone()),
            AutosavePolicy::default(),
            &InquiryId(inquiry_id.to_string()),
            &[],
        )
        .await
        .expect("load engine");
        engine.release_load_guard();

        let pkg = package("pkg-send");
        for _ in 0..packaged {
            engine.add_option();
            let id = engine.options().last().expect("option").id.clone();
            engine.change_package(&id, Some(&pkg));
        }

        Setup { store, activity, engine }
    }

    fn flow(payments: CountingPayments, quotation_fails: bool, activity: &InMemoryActivityLog) -> SendFlow {
        SendFlow::new(
            Arc::new(payments),
            Arc::new(StubEmail),
            Arc::new(StubQuotation { fail: quotation_fails }),
            Arc::new(activity.clone()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn send_creates_links_only_for_options_lacking_one() {
        let mut setup = engine_with_options("inq-flow-1", 2).await;

        // Option A already carries a link; the inactive option C never gets one.
        let first = setup.engine.options()[0].id.clone();
        setup.engine.attach_payment_link(
            &first,
            PaymentLink { id: "plink_existing".to_string(), url: "https://pay.example/existing".to_string() },
        );
        setup.engine.add_option();
        let third = setup.engine.options()[2].id.clone();
        setup.engine.change_package(&third, Some(&package("pkg-send")));
        setup.engine.toggle_option_active(&third);

        let flow = flow(CountingPayments::new(None), false, &setup.activity);
        let outcome = flow
            .send_offer(&mut setup.engine, "final email".to_string())
            .await
            .expect("send succeeds");

        assert_eq!(outcome.version, 2);
        assert_eq!(outcome.links_created, 1);
        assert!(setup.engine.options()[1].payment_link.is_some());
        assert!(setup.engine.options()[2].payment_link.is_none());
        assert_eq!(setup.engine.inquiry().status, InquiryStatus::OfferSent);

        let history = setup.store.history_for(&InquiryId("inq-flow-1".to_string())).await;
        assert_eq!(history.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn payment_failure_aborts_before_version_advance() {
        let mut setup = engine_with_options("inq-flow-2", 2).await;

        let flow = flow(CountingPayments::new(Some(2)), false, &setup.activity);
        let error = flow
            .send_offer(&mut setup.engine, "final email".to_string())
            .await
            .expect_err("second link fails");

        match error {
            SendError::PaymentLink { label, .. } => {
                assert_eq!(label, setup.engine.options()[1].label);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // Abort happened before the transition: no version bump, no snapshot.
        assert_eq!(setup.engine.inquiry().current_offer_version, 1);
        assert!(setup.engine.inquiry().offer_sent_at.is_none());
        assert!(setup.store.history_for(&InquiryId("inq-flow-2".to_string())).await.is_empty());
        // The first link was created and stays attached for a manual retry.
        assert!(setup.engine.options()[0].payment_link.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn quotation_failure_leaves_version_advanced_with_marker() {
        let mut setup = engine_with_options("inq-flow-3", 1).await;

        let flow = flow(CountingPayments::new(None), true, &setup.activity);
        let error = flow
            .send_offer(&mut setup.engine, "final email".to_string())
            .await
            .expect_err("quotation fails");
        assert!(matches!(error, SendError::Quotation(_)));

        assert_eq!(setup.engine.inquiry().current_offer_version, 2);
        assert_eq!(setup.store.history_for(&InquiryId("inq-flow-3".to_string())).await.len(), 1);
        assert_ne!(setup.engine.inquiry().status, InquiryStatus::OfferSent);

        let markers: Vec<_> = setup
            .activity
            .entries()
            .into_iter()
            .filter(|entry| entry.action == "offer.send_failed")
            .collect();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].metadata.get("failed_step").map(String::as_str), Some("quotation_generation"));
        assert_eq!(markers[0].metadata.get("version").map(String::as_str), Some("2"));
    }

    #[tokio::test(start_paused = true)]
    async fn email_generation_refuses_incomplete_active_options() {
        let setup = engine_with_options("inq-flow-4", 1).await;
        let catalog = vec![package("pkg-send")];

        let flow = flow(CountingPayments::new(None), false, &setup.activity);
        let generated = flow.generate_email(&setup.engine, &catalog).await.expect("no provider error");

        match generated {
            EmailGeneration::Incomplete { labels } => {
                assert_eq!(labels, vec![setup.engine.options()[0].label]);
            }
            EmailGeneration::Generated(_) => panic!("incomplete menu must gate the email"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn email_generation_uses_active_options_once_complete() {
        let mut setup = engine_with_options("inq-flow-5", 1).await;
        let catalog = vec![package("pkg-send")];

        let id = setup.engine.options()[0].id.clone();
        setup.engine.select_course(
            &id,
            CourseSelection {
                course_type: CourseType("main".to_string()),
                course_label: "Main course".to_string(),
                item_id: Some("item-duck".to_string()),
                item_name: "Roast duck".to_string(),
                item_description: String::new(),
                item_source: "catalog".to_string(),
                is_custom: false,
            },
        );

        let flow = flow(CountingPayments::new(None), false, &setup.activity);
        let generated = flow.generate_email(&setup.engine, &catalog).await.expect("generated");

        assert_eq!(
            generated,
            EmailGeneration::Generated("offer for Erika Mustermann with 1 options".to_string())
        );
    }
}
