use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::menu::{CourseType, DrinkGroup};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingMode {
    PerPerson,
    Flat,
}

/// One course position a package offers, e.g. "starter" or "main".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSlot {
    pub course_type: CourseType,
    pub label: String,
    pub required: bool,
}

/// One drink position a package offers. `is_choice` marks groups the
/// customer must pick from, as opposed to included house drinks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrinkSlot {
    pub group: DrinkGroup,
    pub label: String,
    pub is_choice: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub name: String,
    pub pricing_mode: PricingMode,
    pub unit_price: Decimal,
    pub courses: Vec<CourseSlot>,
    pub drinks: Vec<DrinkSlot>,
}

impl Package {
    pub fn required_courses(&self) -> impl Iterator<Item = &CourseSlot> {
        self.courses.iter().filter(|slot| slot.required)
    }

    pub fn choice_drinks(&self) -> impl Iterator<Item = &DrinkSlot> {
        self.drinks.iter().filter(|slot| slot.is_choice)
    }
}
