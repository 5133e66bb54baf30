//! Customer Upsert
//!
//! Form state for the payer, the required-field gate that runs before any
//! provider is contacted, and normalization of contact fields for the
//! remote upsert.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::CheckoutBackend;

/// Mutable customer form state for one checkout page
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomerDraft {
    pub first_name: String,
    pub last_name: String,
    /// Explicit display name; wins over first + last when present
    pub display_name: Option<String>,
    pub email: String,
    pub phone_number: String,
    /// Dial code such as `+225`
    pub country_code: Option<String>,
    pub whatsapp_number: Option<String>,
    /// Payer ticked "my WhatsApp number is different"
    pub whatsapp_differs: bool,
    pub country: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    /// Merged back after a successful upsert
    pub customer_id: Option<String>,
}

impl CustomerDraft {
    pub fn full_name(&self) -> String {
        if let Some(name) = self.display_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Phone number prefixed with the dial code when one was supplied
    pub fn resolved_phone(&self) -> String {
        let phone = self.phone_number.trim();
        match self.country_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(_) if phone.starts_with('+') => phone.to_string(),
            Some(code) => {
                let code = code.trim_start_matches('+');
                format!("+{code}{phone}")
            }
            None => phone.to_string(),
        }
    }

    /// WhatsApp number, defaulting to the phone number
    ///
    /// Resolved at submission time so later phone edits are picked up.
    pub fn resolved_whatsapp(&self) -> String {
        match self.whatsapp_number.as_deref().map(str::trim) {
            Some(number) if self.whatsapp_differs && !number.is_empty() => number.to_string(),
            _ => self.resolved_phone(),
        }
    }

    /// Required-field gate run before any network call
    pub fn validate_required(&self) -> Result<(), ValidationError> {
        if !self.full_name().contains(' ') {
            return Err(ValidationError::new(RequiredField::FullName));
        }
        if !self.email.contains('@') {
            return Err(ValidationError::new(RequiredField::Email));
        }
        if self.phone_number.trim().is_empty() {
            return Err(ValidationError::new(RequiredField::PhoneNumber));
        }
        Ok(())
    }

    /// Set first/last name from a single "full name" input
    pub fn set_full_name(&mut self, full_name: &str) {
        let mut parts = full_name.trim().splitn(2, char::is_whitespace);
        self.first_name = parts.next().unwrap_or_default().to_string();
        self.last_name = parts.next().unwrap_or_default().trim().to_string();
    }

    /// Normalized payload for the remote upsert
    pub fn to_fields(&self) -> CustomerFields {
        CustomerFields {
            name: self.full_name(),
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            phone_number: self.resolved_phone(),
            whatsapp_number: self.resolved_whatsapp(),
            country: self.country.clone(),
            city: self.city.clone(),
            address: self.address.clone(),
            postal_code: self.postal_code.clone(),
        }
    }
}

/// Field the page should focus after a failed gate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredField {
    FullName,
    Email,
    PhoneNumber,
}

/// Required-field gate failure
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: RequiredField,
}

impl ValidationError {
    pub fn new(field: RequiredField) -> Self {
        Self { field }
    }

    pub fn message(&self) -> String {
        match self.field {
            RequiredField::FullName => "Please enter your first and last name.".into(),
            RequiredField::Email => "Please enter a valid email address.".into(),
            RequiredField::PhoneNumber => "Please enter your phone number.".into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for ValidationError {}

/// Normalized contact fields sent to the backend
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerFields {
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub whatsapp_number: String,
    pub country: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
}

/// Remote upsert request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerUpsert {
    pub merchant_id: String,
    pub organization_id: String,
    #[serde(flatten)]
    pub fields: CustomerFields,
}

/// Create or update the customer for a merchant/organization
///
/// Returns `None` when either id is missing or the remote call fails; the
/// caller must stop there. Deduplication is the backend's job.
pub async fn upsert_customer(
    backend: &dyn CheckoutBackend,
    merchant_id: Option<&str>,
    organization_id: Option<&str>,
    draft: &CustomerDraft,
) -> Option<String> {
    let (Some(merchant_id), Some(organization_id)) = (
        merchant_id.filter(|s| !s.trim().is_empty()),
        organization_id.filter(|s| !s.trim().is_empty()),
    ) else {
        warn!("Customer upsert skipped: merchant or organization id missing");
        return None;
    };

    let request = CustomerUpsert {
        merchant_id: merchant_id.to_string(),
        organization_id: organization_id.to_string(),
        fields: draft.to_fields(),
    };

    match backend.upsert_customer(&request).await {
        Ok(Some(id)) => {
            info!(customer_id = %id, merchant_id, "Customer upserted");
            Some(id)
        }
        Ok(None) => {
            warn!(merchant_id, "Customer upsert returned no id");
            None
        }
        Err(e) => {
            warn!(merchant_id, error = %e, "Customer upsert failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;

    fn valid_draft() -> CustomerDraft {
        CustomerDraft {
            first_name: "John".into(),
            last_name: "Doe".into(),
            email: "x@x.com".into(),
            phone_number: "123".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_gate_blocks_single_word_name() {
        let mut draft = valid_draft();
        draft.set_full_name("John");
        let err = draft.validate_required().unwrap_err();
        assert_eq!(err.field, RequiredField::FullName);
    }

    #[test]
    fn test_gate_passes_complete_fields() {
        let mut draft = CustomerDraft::default();
        draft.set_full_name("John Doe");
        draft.email = "x@x.com".into();
        draft.phone_number = "123".into();
        assert!(draft.validate_required().is_ok());
    }

    #[test]
    fn test_gate_checks_email_then_phone() {
        let mut draft = valid_draft();
        draft.email = "nope".into();
        assert_eq!(draft.validate_required().unwrap_err().field, RequiredField::Email);

        let mut draft = valid_draft();
        draft.phone_number = "  ".into();
        assert_eq!(draft.validate_required().unwrap_err().field, RequiredField::PhoneNumber);
    }

    #[test]
    fn test_display_name_takes_precedence() {
        let mut draft = valid_draft();
        assert_eq!(draft.full_name(), "John Doe");
        draft.display_name = Some("Johnny D".into());
        assert_eq!(draft.full_name(), "Johnny D");
    }

    #[test]
    fn test_phone_prefix() {
        let mut draft = valid_draft();
        draft.phone_number = "0700000000".into();
        assert_eq!(draft.resolved_phone(), "0700000000");

        draft.country_code = Some("+225".into());
        assert_eq!(draft.resolved_phone(), "+2250700000000");

        draft.phone_number = "+221770000000".into();
        assert_eq!(draft.resolved_phone(), "+221770000000");
    }

    #[test]
    fn test_whatsapp_defaults_to_phone() {
        let mut draft = valid_draft();
        draft.whatsapp_number = Some("999".into());
        assert_eq!(draft.resolved_whatsapp(), "123");

        draft.whatsapp_differs = true;
        assert_eq!(draft.resolved_whatsapp(), "999");

        draft.whatsapp_number = Some(String::new());
        assert_eq!(draft.resolved_whatsapp(), "123");
    }

    #[tokio::test]
    async fn test_upsert_without_org_returns_none() {
        let backend = MockBackend::new();
        let id = upsert_customer(&backend, Some("m_1"), None, &valid_draft()).await;
        assert!(id.is_none());
        assert_eq!(backend.upsert_calls(), 0);
    }

    #[tokio::test]
    async fn test_upsert_returns_remote_id() {
        let backend = MockBackend::new();
        let id = upsert_customer(&backend, Some("m_1"), Some("o_1"), &valid_draft()).await;
        assert!(id.is_some());
        assert_eq!(backend.upsert_calls(), 1);
    }

    #[tokio::test]
    async fn test_upsert_failure_returns_none() {
        let backend = MockBackend::new().failing_upsert();
        let id = upsert_customer(&backend, Some("m_1"), Some("o_1"), &valid_draft()).await;
        assert!(id.is_none());
    }
}
