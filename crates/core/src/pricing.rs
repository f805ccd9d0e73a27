use rust_decimal::Decimal;

use crate::domain::option::OfferOption;
use crate::domain::package::{Package, PricingMode};

/// Option total under a pricing mode. Per-person packages scale with the
/// guest count; flat packages ignore it.
pub fn option_total(mode: PricingMode, unit_price: Decimal, guest_count: u32) -> Decimal {
    match mode {
        PricingMode::PerPerson => unit_price * Decimal::from(guest_count),
        PricingMode::Flat => unit_price,
    }
}

pub fn package_total(package: &Package, guest_count: u32) -> Decimal {
    option_total(package.pricing_mode, package.unit_price, guest_count)
}

/// Combined value of the active options. Inactive options stay priced but
/// never count toward the offer total.
pub fn active_total(options: &[OfferOption]) -> Decimal {
    options.iter().filter(|option| option.is_active).map(|option| option.total_amount).sum()
}
