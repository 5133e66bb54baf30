//! Pricing Resolver
//!
//! Turns a checkout target into the subtotal, itemized fees and total shown
//! to the payer. Pure: identical input always yields identical output.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::model::{CheckoutTarget, FeeSchedule};

/// One itemized fee line
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeLine {
    pub name: String,
    pub percentage: Decimal,
    pub amount: Decimal,
}

/// Derived totals for a checkout target
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputedTotal {
    pub currency: String,
    pub subtotal: Decimal,
    pub fees: Vec<FeeLine>,
    pub total: Decimal,
}

impl ComputedTotal {
    pub fn fee_total(&self) -> Decimal {
        self.fees.iter().map(|f| f.amount).sum()
    }
}

/// Base price of the active target; ad-hoc links without a price cost 0
pub fn base_price(target: &CheckoutTarget) -> Decimal {
    match target {
        CheckoutTarget::Product(product) => product.price,
        CheckoutTarget::Subscription(plan) => plan.amount,
        CheckoutTarget::AdHoc { price, .. } => price.unwrap_or(Decimal::ZERO),
    }
}

/// Compute subtotal, fees and total
///
/// Only product fee schedules apply. Amounts are exact; no currency rounding
/// happens here. Amounts from the backend are bounded by
/// [`MAX_AMOUNT`](crate::model::MAX_AMOUNT); beyond that the total saturates.
pub fn compute_total(target: &CheckoutTarget) -> ComputedTotal {
    let subtotal = base_price(target);

    let fees = match target {
        CheckoutTarget::Product(product) => fee_lines(subtotal, &product.fees),
        CheckoutTarget::Subscription(_) | CheckoutTarget::AdHoc { .. } => Vec::new(),
    };

    let total = fees.iter().fold(subtotal, |acc, f| acc.saturating_add(f.amount));

    ComputedTotal {
        currency: target.currency().to_string(),
        subtotal,
        fees,
        total,
    }
}

fn fee_lines(base: Decimal, schedule: &FeeSchedule) -> Vec<FeeLine> {
    schedule
        .enabled()
        .map(|fee| FeeLine {
            name: fee.name.clone(),
            percentage: fee.percentage,
            // Share is at most 1, so the product never exceeds the base
            amount: base * (fee.percentage / Decimal::ONE_HUNDRED),
        })
        .collect()
}

/// Number of minor units for an ISO 4217 currency code
pub fn minor_units(currency: &str) -> u32 {
    match currency.to_uppercase().as_str() {
        // CFA francs and other currencies without a subunit in practice
        "XOF" | "XAF" | "GNF" | "RWF" | "UGX" | "KMF" | "DJF" | "BIF" | "JPY" | "KRW" | "VND" => 0,
        _ => 2,
    }
}

/// Round an amount to the currency's minor units (half away from zero)
pub fn round_for_currency(amount: Decimal, currency: &str) -> Decimal {
    amount.round_dp_with_strategy(minor_units(currency), RoundingStrategy::MidpointAwayFromZero)
}
