use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::menu::MenuSelection;
use crate::domain::package::PackageId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OptionId(pub String);

impl OptionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Fixed label sequence for offer options. The label count is also the
/// capacity limit on an inquiry's live option set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionLabel {
    A,
    B,
    C,
    D,
    E,
}

impl OptionLabel {
    pub const ALL: [OptionLabel; 5] =
        [OptionLabel::A, OptionLabel::B, OptionLabel::C, OptionLabel::D, OptionLabel::E];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            "E" => Some(Self::E),
            _ => None,
        }
    }
}

impl std::fmt::Display for OptionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const MAX_LIVE_OPTIONS: usize = OptionLabel::ALL.len();

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLink {
    pub id: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OfferOption {
    pub id: OptionId,
    pub package_id: Option<PackageId>,
    pub package_name: String,
    pub label: OptionLabel,
    pub is_active: bool,
    pub guest_count: u32,
    pub menu: MenuSelection,
    pub total_amount: Decimal,
    pub payment_link: Option<PaymentLink>,
    pub offer_version: u32,
    pub sort_order: u32,
}

impl OfferOption {
    /// A freshly added option: no package, zero price, empty menu.
    pub fn blank(label: OptionLabel, guest_count: u32, offer_version: u32, sort_order: u32) -> Self {
        Self {
            id: OptionId::generate(),
            package_id: None,
            package_name: String::new(),
            label,
            is_active: true,
            guest_count,
            menu: MenuSelection::default(),
            total_amount: Decimal::ZERO,
            payment_link: None,
            offer_version,
            sort_order,
        }
    }

    pub fn has_package(&self) -> bool {
        self.package_id.is_some()
    }
}
