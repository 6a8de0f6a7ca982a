use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use tenantry_core::domain::invoice::{Invoice, InvoiceId};
use tenantry_core::domain::organization::{Organization, OrganizationId};
use tenantry_core::errors::ApplicationError;

pub mod invoice;
pub mod memory;
pub mod organization;
pub mod sequence;

pub use invoice::SqlInvoiceRepository;
pub use memory::{
    InMemoryInvoiceRepository, InMemoryOrganizationRepository, InMemorySequenceCounter,
};
pub use organization::SqlOrganizationRepository;
pub use sequence::SqlSequenceCounter;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Conflict(message) => ApplicationError::Conflict(message),
            other => ApplicationError::Persistence(other.to_string()),
        }
    }
}

#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    async fn find_by_id(&self, id: &OrganizationId)
        -> Result<Option<Organization>, RepositoryError>;
    async fn save(&self, organization: Organization) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn find_by_id(&self, id: &InvoiceId) -> Result<Option<Invoice>, RepositoryError>;

    /// Inserts or updates an invoice. A live invoice that would duplicate
    /// another live identifier in the same organization fails with
    /// [`RepositoryError::Conflict`].
    async fn save(&self, invoice: Invoice) -> Result<(), RepositoryError>;

    /// Marks an invoice deleted. Returns `false` when no live invoice matched.
    async fn soft_delete(&self, id: &InvoiceId) -> Result<bool, RepositoryError>;

    /// Identifiers of the organization's live invoices, skipping null and
    /// empty identifiers.
    async fn list_identifiers_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<String>, RepositoryError>;
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_error) => db_error.is_unique_violation(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use tenantry_core::errors::ApplicationError;

    use super::RepositoryError;

    #[test]
    fn conflicts_keep_their_class_when_lifted() {
        let lifted: ApplicationError = RepositoryError::Conflict("dup".to_string()).into();
        assert_eq!(lifted, ApplicationError::Conflict("dup".to_string()));

        let lifted: ApplicationError = RepositoryError::Decode("bad row".to_string()).into();
        assert!(matches!(lifted, ApplicationError::Persistence(ref m) if m.contains("bad row")));
    }
}
