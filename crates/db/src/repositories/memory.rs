use std::collections::HashMap;

use tokio::sync::{Mutex, RwLock};

use tenantry_core::domain::invoice::{Invoice, InvoiceId};
use tenantry_core::domain::organization::{Organization, OrganizationId};
use tenantry_core::errors::ApplicationError;
use tenantry_core::invoicing::{
    InvoiceStore, IssuedIdentifierSource, OrganizationCode, OrganizationDirectory,
    SequenceCounter,
};

use super::{InvoiceRepository, OrganizationRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryOrganizationRepository {
    organizations: RwLock<HashMap<String, Organization>>,
}

#[async_trait::async_trait]
impl OrganizationRepository for InMemoryOrganizationRepository {
    async fn find_by_id(
        &self,
        id: &OrganizationId,
    ) -> Result<Option<Organization>, RepositoryError> {
        let organizations = self.organizations.read().await;
        Ok(organizations.get(&id.0).cloned())
    }

    async fn save(&self, organization: Organization) -> Result<(), RepositoryError> {
        let mut organizations = self.organizations.write().await;
        organizations.insert(organization.id.0.clone(), organization);
        Ok(())
    }
}

#[async_trait::async_trait]
impl OrganizationDirectory for InMemoryOrganizationRepository {
    async fn find_organization(
        &self,
        id: &OrganizationId,
    ) -> Result<Option<Organization>, ApplicationError> {
        Ok(self.find_by_id(id).await?)
    }
}

/// Mirrors the SQL uniqueness rule: live invoices of one organization never
/// share an identifier.
#[derive(Default)]
pub struct InMemoryInvoiceRepository {
    invoices: RwLock<HashMap<String, Invoice>>,
}

fn collides(existing: &Invoice, candidate: &Invoice) -> bool {
    existing.id != candidate.id
        && !existing.deleted
        && !candidate.deleted
        && existing.organization_id == candidate.organization_id
        && existing.identifier.is_some()
        && existing.identifier == candidate.identifier
}

#[async_trait::async_trait]
impl InvoiceRepository for InMemoryInvoiceRepository {
    async fn find_by_id(&self, id: &InvoiceId) -> Result<Option<Invoice>, RepositoryError> {
        let invoices = self.invoices.read().await;
        Ok(invoices.get(&id.0).cloned())
    }

    async fn save(&self, invoice: Invoice) -> Result<(), RepositoryError> {
        let mut invoices = self.invoices.write().await;
        if invoices.values().any(|existing| collides(existing, &invoice)) {
            return Err(RepositoryError::Conflict(format!(
                "invoice identifier `{}` is already in use for organization `{}`",
                invoice.identifier.as_deref().unwrap_or_default(),
                invoice.organization_id
            )));
        }
        invoices.insert(invoice.id.0.clone(), invoice);
        Ok(())
    }

    async fn soft_delete(&self, id: &InvoiceId) -> Result<bool, RepositoryError> {
        let mut invoices = self.invoices.write().await;
        match invoices.get_mut(&id.0) {
            Some(invoice) if !invoice.deleted => {
                invoice.soft_delete();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_identifiers_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<String>, RepositoryError> {
        let invoices = self.invoices.read().await;
        Ok(invoices
            .values()
            .filter(|invoice| !invoice.deleted && invoice.organization_id == *organization_id)
            .filter_map(|invoice| invoice.identifier.clone())
            .filter(|identifier| !identifier.is_empty())
            .collect())
    }
}

#[async_trait::async_trait]
impl IssuedIdentifierSource for InMemoryInvoiceRepository {
    async fn issued_identifiers(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<String>, ApplicationError> {
        Ok(self.list_identifiers_for_organization(organization_id).await?)
    }
}

#[async_trait::async_trait]
impl InvoiceStore for InMemoryInvoiceRepository {
    async fn insert_invoice(&self, invoice: Invoice) -> Result<(), ApplicationError> {
        Ok(self.save(invoice).await?)
    }
}

#[derive(Default)]
pub struct InMemorySequenceCounter {
    values: Mutex<HashMap<(String, String), u64>>,
}

#[async_trait::async_trait]
impl SequenceCounter for InMemorySequenceCounter {
    async fn advance(
        &self,
        organization_id: &OrganizationId,
        code: &OrganizationCode,
        floor: u64,
    ) -> Result<u64, ApplicationError> {
        let mut values = self.values.lock().await;
        let key = (organization_id.0.clone(), code.as_str().to_string());
        let slot = values.entry(key).or_insert(0);
        let next = (*slot).max(floor).checked_add(1).ok_or_else(|| {
            ApplicationError::Conflict(format!("sequence for code `{code}` is exhausted"))
        })?;
        *slot = next;
        Ok(next)
    }
}
