//! Deterministic development seeds: a package catalog and one demo inquiry.
//!
//! The package catalog is owned by the menu-administration side of the
//! application and consumed here as plain values; only the inquiry lives in
//! the database.

use rust_decimal::Decimal;

use tafel_core::domain::inquiry::InquiryId;
use tafel_core::domain::menu::{CourseType, DrinkGroup};
use tafel_core::domain::package::{CourseSlot, DrinkSlot, Package, PackageId, PricingMode};

use crate::repositories::RepositoryError;
use crate::DbPool;

pub const DEMO_INQUIRY_ID: &str = "inq-demo-0001";

pub fn demo_catalog() -> Vec<Package> {
    vec![
        Package {
            id: PackageId("pkg-dinner-classic".to_string()),
            name: "Classic Dinner".to_string(),
            pricing_mode: PricingMode::PerPerson,
            unit_price: Decimal::new(4_950, 2),
            courses: vec![
                CourseSlot {
                    course_type: CourseType("starter".to_string()),
                    label: "Starter".to_string(),
                    required: true,
                },
                CourseSlot {
                    course_type: CourseType("main".to_string()),
                    label: "Main course".to_string(),
                    required: true,
                },
                CourseSlot {
                    course_type: CourseType("dessert".to_string()),
                    label: "Dessert".to_string(),
                    required: false,
                },
            ],
            drinks: vec![
                DrinkSlot {
                    group: DrinkGroup("wine".to_string()),
                    label: "Wine pairing".to_string(),
                    is_choice: true,
                },
                DrinkSlot {
                    group: DrinkGroup("soft".to_string()),
                    label: "Soft drinks".to_string(),
                    is_choice: false,
                },
            ],
        },
        Package {
            id: PackageId("pkg-buffet-flat".to_string()),
            name: "Buffet (flat rate)".to_string(),
            pricing_mode: PricingMode::Flat,
            unit_price: Decimal::new(120_000, 2),
            courses: Vec::new(),
            drinks: vec![DrinkSlot {
                group: DrinkGroup("aperitif".to_string()),
                label: "Aperitif".to_string(),
                is_choice: true,
            }],
        },
    ]
}

/// Insert the demo inquiry if it does not exist yet. Safe to call on every
/// startup.
pub async fn seed_demo_inquiry(pool: &DbPool) -> Result<InquiryId, RepositoryError> {
    sqlx::query(
        "INSERT OR IGNORE INTO inquiry
             (id, customer_name, customer_email, event_date, guest_count,
              preselected_packages, status, current_offer_version)
         VALUES (?, ?, ?, ?, ?, ?, ?, 1)",
    )
    .bind(DEMO_INQUIRY_ID)
    .bind("Erika Mustermann")
    .bind("erika@example.com")
    .bind("2026-09-18")
    .bind(30_i64)
    .bind(r#"["pkg-dinner-classic"]"#)
    .bind("in_progress")
    .execute(pool)
    .await?;

    Ok(InquiryId(DEMO_INQUIRY_ID.to_string()))
}
