pub mod activity;
pub mod completeness;
pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod identity;
pub mod pricing;
pub mod send;
pub mod store;

pub use activity::{ActivityEntry, ActivityLog, InMemoryActivityLog, TracingActivityLog};
pub use completeness::{incomplete_active_options, is_menu_complete};
pub use domain::history::{HistoryEntryId, OfferHistoryEntry};
pub use domain::inquiry::{Inquiry, InquiryId, InquiryStatus, OfferFields};
pub use domain::menu::{CourseSelection, CourseType, DrinkGroup, DrinkSelection, MenuSelection};
pub use domain::option::{
    OfferOption, OptionId, OptionLabel, PaymentLink, MAX_LIVE_OPTIONS,
};
pub use domain::package::{CourseSlot, DrinkSlot, Package, PackageId, PricingMode};
pub use engine::autosave::{AutosavePolicy, SaveStatus};
pub use engine::{AddOptionOutcome, EngineError, OfferEngine, OptionPatch};
pub use errors::{ApplicationError, InterfaceError};
pub use identity::{Actor, IdentityProvider, StaticIdentityProvider};
pub use send::{
    EmailGeneration, OfferEmailGenerator, PaymentLinkProvider, PaymentLinkRequest, ProviderError,
    QuotationGenerator, SendError, SendFlow, SendOutcome,
};
pub use store::{InMemoryOfferStore, OfferStore, StoreError};
