use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::package::PackageId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InquiryId(pub String);

/// CRM status bucket. Owned by the surrounding CRM subsystem; the composer
/// reads it and only ever moves an inquiry forward into `OfferSent`.
/// Unlocking for revision must NOT move an inquiry out of this bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InquiryStatus {
    New,
    InProgress,
    OfferSent,
    Confirmed,
    Declined,
}

impl InquiryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::OfferSent => "offer_sent",
            Self::Confirmed => "confirmed",
            Self::Declined => "declined",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "new" => Some(Self::New),
            "in_progress" => Some(Self::InProgress),
            "offer_sent" => Some(Self::OfferSent),
            "confirmed" => Some(Self::Confirmed),
            "declined" => Some(Self::Declined),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inquiry {
    pub id: InquiryId,
    pub customer_name: String,
    pub customer_email: String,
    pub event_date: Option<NaiveDate>,
    pub guest_count: u32,
    pub preselected_packages: Vec<PackageId>,
    pub status: InquiryStatus,
    pub offer_sent_at: Option<DateTime<Utc>>,
    pub offer_sent_by: Option<String>,
    pub current_offer_version: u32,
    pub email_draft: Option<String>,
}

/// The four inquiry fields this subsystem writes back. Everything else on
/// the record belongs to the CRM.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferFields {
    pub offer_sent_at: Option<DateTime<Utc>>,
    pub offer_sent_by: Option<String>,
    pub current_offer_version: u32,
    pub email_draft: Option<String>,
}

impl Inquiry {
    /// An inquiry is locked once an offer has gone out. The lock is a UI
    /// contract; the engine itself never blocks mutations on it.
    pub fn is_locked(&self) -> bool {
        self.offer_sent_at.is_some()
    }

    pub fn offer_fields(&self) -> OfferFields {
        OfferFields {
            offer_sent_at: self.offer_sent_at,
            offer_sent_by: self.offer_sent_by.clone(),
            current_offer_version: self.current_offer_version,
            email_draft: self.email_draft.clone(),
        }
    }
}
