use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::organization::OrganizationId;
use crate::errors::ApplicationError;

/// Storage id of an invoice record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvoiceId(pub String);

impl InvoiceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Human-facing `<CODE>-<DIGITS>` identifier printed on billing documents.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvoiceIdentifier(pub String);

impl InvoiceIdentifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InvoiceIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub organization_id: OrganizationId,
    pub identifier: Option<String>,
    pub customer_name: String,
    pub currency: String,
    pub total: Decimal,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn soft_delete(&mut self) {
        self.deleted = true;
        self.updated_at = Utc::now();
    }
}

/// Invoice draft accepted by the issuing workflow before an identifier exists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewInvoice {
    pub organization_id: OrganizationId,
    pub customer_name: String,
    pub currency: String,
    pub total: Decimal,
}

impl NewInvoice {
    pub fn validate(&self) -> Result<(), ApplicationError> {
        if self.customer_name.trim().is_empty() {
            return Err(ApplicationError::BadInput("customer_name is required".to_string()));
        }

        let currency = self.currency.trim();
        if currency.len() != 3 || !currency.chars().all(|ch| ch.is_ascii_alphabetic()) {
            return Err(ApplicationError::BadInput(
                "currency must be a 3-letter ISO code".to_string(),
            ));
        }

        if self.total.is_sign_negative() {
            return Err(ApplicationError::BadInput("total must not be negative".to_string()));
        }

        Ok(())
    }

    pub fn into_invoice(self, identifier: InvoiceIdentifier) -> Invoice {
        let now = Utc::now();
        Invoice {
            id: InvoiceId::generate(),
            organization_id: self.organization_id,
            identifier: Some(identifier.0),
            customer_name: self.customer_name.trim().to_string(),
            currency: self.currency.trim().to_ascii_uppercase(),
            total: self.total,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{InvoiceIdentifier, NewInvoice};
    use crate::domain::organization::OrganizationId;
    use crate::errors::ApplicationError;

    fn draft() -> NewInvoice {
        NewInvoice {
            organization_id: OrganizationId("org-1".to_string()),
            customer_name: " Acme Corp ".to_string(),
            currency: "usd".to_string(),
            total: Decimal::new(125_000, 2),
        }
    }

    #[test]
    fn into_invoice_normalizes_fields() {
        let invoice = draft().into_invoice(InvoiceIdentifier("TCL-0001".to_string()));

        assert_eq!(invoice.identifier.as_deref(), Some("TCL-0001"));
        assert_eq!(invoice.customer_name, "Acme Corp");
        assert_eq!(invoice.currency, "USD");
        assert!(!invoice.deleted);
    }

    #[test]
    fn validate_rejects_negative_total_and_bad_currency() {
        let mut negative = draft();
        negative.total = Decimal::new(-1, 0);
        assert!(matches!(negative.validate(), Err(ApplicationError::BadInput(_))));

        let mut currency = draft();
        currency.currency = "dollars".to_string();
        assert!(matches!(currency.validate(), Err(ApplicationError::BadInput(_))));

        assert!(draft().validate().is_ok());
    }

    #[test]
    fn soft_delete_marks_record_inactive() {
        let mut invoice = draft().into_invoice(InvoiceIdentifier("TCL-0002".to_string()));
        invoice.soft_delete();
        assert!(invoice.deleted);
    }
}
