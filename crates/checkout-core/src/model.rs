//! Domain Models
//!
//! Payment links, the product / subscription / ad-hoc checkout target, fee
//! schedules and derived totals. Uses `rust_decimal` for every monetary value.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CheckoutError, Result};
use crate::provider::ProviderCode;

/// Recurring billing cadence of a subscription plan
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BillingFrequency {
    Weekly,
    BiWeekly,
    Monthly,
    BiMonthly,
    Quarterly,
    SemiAnnual,
    Yearly,
    OneTime,
}

impl BillingFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingFrequency::Weekly => "weekly",
            BillingFrequency::BiWeekly => "bi-weekly",
            BillingFrequency::Monthly => "monthly",
            BillingFrequency::BiMonthly => "bi-monthly",
            BillingFrequency::Quarterly => "quarterly",
            BillingFrequency::SemiAnnual => "semi-annual",
            BillingFrequency::Yearly => "yearly",
            BillingFrequency::OneTime => "one-time",
        }
    }

    /// Suffix shown next to a recurring price
    pub fn label(&self) -> &'static str {
        match self {
            BillingFrequency::Weekly => "per week",
            BillingFrequency::BiWeekly => "every 2 weeks",
            BillingFrequency::Monthly => "per month",
            BillingFrequency::BiMonthly => "every 2 months",
            BillingFrequency::Quarterly => "per quarter",
            BillingFrequency::SemiAnnual => "every 6 months",
            BillingFrequency::Yearly => "per year",
            BillingFrequency::OneTime => "one-time",
        }
    }
}

/// A single fee applied on top of a product price
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub fee_type_id: String,
    pub name: String,
    /// Percentage of the base price, in [0, 100]
    pub percentage: Decimal,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Fee {
    pub fn new(fee_type_id: impl Into<String>, name: impl Into<String>, percentage: Decimal) -> Self {
        Self {
            fee_type_id: fee_type_id.into(),
            name: name.into(),
            percentage,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Ordered list of fees; percentages are range-checked on construction
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FeeSchedule(Vec<Fee>);

impl FeeSchedule {
    pub fn new(fees: Vec<Fee>) -> Result<Self> {
        for fee in &fees {
            if fee.percentage < Decimal::ZERO || fee.percentage > Decimal::ONE_HUNDRED {
                return Err(CheckoutError::InvalidFee {
                    name: fee.name.clone(),
                    percentage: fee.percentage,
                });
            }
        }
        Ok(Self(fees))
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Fees that contribute to the total
    pub fn enabled(&self) -> impl Iterator<Item = &Fee> {
        self.0.iter().filter(|f| f.enabled)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for FeeSchedule {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let fees = Vec::<Fee>::deserialize(deserializer)?;
        FeeSchedule::new(fees).map_err(serde::de::Error::custom)
    }
}

/// Largest price or plan amount accepted from the backend
pub const MAX_AMOUNT: Decimal = dec!(1000000000000000);

pub fn check_amount(amount: Decimal) -> Result<Decimal> {
    if amount.abs() > MAX_AMOUNT {
        return Err(CheckoutError::InvalidAmount(amount));
    }
    Ok(amount)
}

fn bounded_amount<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Decimal, D::Error> {
    check_amount(<Decimal as Deserialize>::deserialize(deserializer)?).map_err(serde::de::Error::custom)
}

fn bounded_optional_amount<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<Decimal>, D::Error> {
    Option::<Decimal>::deserialize(deserializer)?
        .map(check_amount)
        .transpose()
        .map_err(serde::de::Error::custom)
}

/// A one-off product sold through a link
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(deserialize_with = "bounded_amount")]
    pub price: Decimal,
    pub currency: String,
    #[serde(default)]
    pub fees: FeeSchedule,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A recurring plan sold through a link
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: String,
    pub name: String,
    #[serde(deserialize_with = "bounded_amount")]
    pub amount: Decimal,
    pub currency: String,
    pub frequency: BillingFrequency,
    #[serde(default)]
    pub description: Option<String>,
}

/// What the payer is paying for; exactly one variant is active
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckoutTarget {
    /// Fixed price set on the link itself
    AdHoc {
        #[serde(default, deserialize_with = "bounded_optional_amount")]
        price: Option<Decimal>,
        currency: String,
    },
    Product(Product),
    Subscription(SubscriptionPlan),
}

impl CheckoutTarget {
    pub fn currency(&self) -> &str {
        match self {
            CheckoutTarget::AdHoc { currency, .. } => currency,
            CheckoutTarget::Product(p) => &p.currency,
            CheckoutTarget::Subscription(s) => &s.currency,
        }
    }

    pub fn product_id(&self) -> Option<&str> {
        match self {
            CheckoutTarget::Product(p) => Some(&p.id),
            _ => None,
        }
    }

    pub fn subscription(&self) -> Option<&SubscriptionPlan> {
        match self {
            CheckoutTarget::Subscription(s) => Some(s),
            _ => None,
        }
    }
}

/// Merchant-facing payment link configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLink {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub currency: String,
    /// Empty means every provider is accepted
    #[serde(default)]
    pub allowed_providers: Vec<ProviderCode>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub success_url: Option<String>,
    #[serde(default)]
    pub cancel_url: Option<String>,
    #[serde(default)]
    pub merchant_id: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
}

impl PaymentLink {
    pub fn accepts(&self, provider: ProviderCode) -> bool {
        self.allowed_providers.is_empty() || self.allowed_providers.contains(&provider)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Merchant and organization ids, when both are present and non-blank
    pub fn owner_ids(&self) -> Option<(&str, &str)> {
        let merchant = self.merchant_id.as_deref().filter(|s| !s.trim().is_empty())?;
        let org = self.organization_id.as_deref().filter(|s| !s.trim().is_empty())?;
        Some((merchant, org))
    }
}

/// A link together with the resolved checkout target
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutData {
    pub link: PaymentLink,
    pub target: CheckoutTarget,
}

/// Checkout data as the backend returns it: optional-field record
#[derive(Clone, Debug, Deserialize)]
pub struct CheckoutRecord {
    #[serde(flatten)]
    pub link: PaymentLink,
    #[serde(default, deserialize_with = "bounded_optional_amount")]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub product: Option<Product>,
    #[serde(default)]
    pub subscription: Option<SubscriptionPlan>,
}

impl From<CheckoutRecord> for CheckoutData {
    fn from(record: CheckoutRecord) -> Self {
        let target = match (record.product, record.subscription) {
            (Some(product), _) => CheckoutTarget::Product(product),
            (None, Some(plan)) => CheckoutTarget::Subscription(plan),
            (None, None) => CheckoutTarget::AdHoc {
                price: record.price,
                currency: record.link.currency.clone(),
            },
        };
        Self {
            link: record.link,
            target,
        }
    }
}
