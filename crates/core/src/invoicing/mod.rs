//! Invoice identifier allocation.
//!
//! Identifiers look like `<CODE>-<DIGITS>`: the code is derived from the
//! organization's display name and the digits are one past the highest
//! sequence already issued under that code for the organization.
//!
//! Under [`SequenceStrategy::Scan`] the next sequence is rebuilt from the
//! issued identifiers on every call. Two concurrent callers for the same
//! organization can observe the same maximum and produce the same
//! identifier; persistence rejects the second insert. [`SequenceStrategy::Counter`]
//! additionally routes the value through an atomic [`SequenceCounter`], which
//! removes that race.

pub mod code;
pub mod sequence;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use crate::domain::invoice::{Invoice, InvoiceIdentifier, NewInvoice};
use crate::domain::organization::{Organization, OrganizationId};
use crate::errors::ApplicationError;

pub use code::OrganizationCode;
pub use sequence::{format_identifier, max_issued_sequence, IdentifierPattern};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceStrategy {
    #[default]
    Scan,
    Counter,
}

impl std::str::FromStr for SequenceStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "scan" => Ok(Self::Scan),
            "counter" => Ok(Self::Counter),
            other => {
                Err(format!("unsupported sequence strategy `{other}` (expected scan|counter)"))
            }
        }
    }
}

#[async_trait]
pub trait OrganizationDirectory: Send + Sync {
    async fn find_organization(
        &self,
        id: &OrganizationId,
    ) -> Result<Option<Organization>, ApplicationError>;
}

/// Source of identifiers already issued to an organization.
///
/// Implementations return only identifiers of invoices that are not
/// soft-deleted and whose identifier is present and non-empty.
#[async_trait]
pub trait IssuedIdentifierSource: Send + Sync {
    async fn issued_identifiers(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<String>, ApplicationError>;
}

/// Atomic increment-and-fetch scoped by organization and code.
///
/// `floor` is the highest sequence found by scanning; the returned value must
/// be greater than both `floor` and every value previously returned for the
/// same key.
#[async_trait]
pub trait SequenceCounter: Send + Sync {
    async fn advance(
        &self,
        organization_id: &OrganizationId,
        code: &OrganizationCode,
        floor: u64,
    ) -> Result<u64, ApplicationError>;
}

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn insert_invoice(&self, invoice: Invoice) -> Result<(), ApplicationError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AllocatedIdentifier {
    pub identifier: InvoiceIdentifier,
    pub code: OrganizationCode,
    pub sequence: u64,
}

#[derive(Clone)]
enum SequenceSource {
    Scan,
    Counter(Arc<dyn SequenceCounter>),
}

#[derive(Clone)]
pub struct InvoiceIdAllocator {
    directory: Arc<dyn OrganizationDirectory>,
    identifiers: Arc<dyn IssuedIdentifierSource>,
    source: SequenceSource,
    audit: Arc<dyn AuditSink>,
}

impl InvoiceIdAllocator {
    pub fn new(
        directory: Arc<dyn OrganizationDirectory>,
        identifiers: Arc<dyn IssuedIdentifierSource>,
    ) -> Self {
        Self {
            directory,
            identifiers,
            source: SequenceSource::Scan,
            audit: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_counter(mut self, counter: Arc<dyn SequenceCounter>) -> Self {
        self.source = SequenceSource::Counter(counter);
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn strategy(&self) -> SequenceStrategy {
        match self.source {
            SequenceSource::Scan => SequenceStrategy::Scan,
            SequenceSource::Counter(_) => SequenceStrategy::Counter,
        }
    }

    /// Computes the next identifier for an organization without persisting it.
    pub async fn next_identifier(
        &self,
        organization_id: &OrganizationId,
        context: &AuditContext,
    ) -> Result<AllocatedIdentifier, ApplicationError> {
        let organization =
            self.directory.find_organization(organization_id).await?.ok_or_else(|| {
                ApplicationError::NotFound(format!("organization `{organization_id}` not found"))
            })?;

        let code = OrganizationCode::derive(&organization.name)?;
        let pattern = IdentifierPattern::for_code(&code)?;

        let issued = self.identifiers.issued_identifiers(organization_id).await?;
        let max_sequence = max_issued_sequence(&pattern, issued.iter().map(String::as_str));

        let sequence = match &self.source {
            SequenceSource::Scan => max_sequence.checked_add(1).ok_or_else(|| {
                ApplicationError::Conflict(format!("sequence for code `{code}` is exhausted"))
            })?,
            SequenceSource::Counter(counter) => {
                counter.advance(organization_id, &code, max_sequence).await?
            }
        };
        let identifier = format_identifier(&code, sequence);

        info!(
            event_name = "invoicing.identifier.allocated",
            correlation_id = %context.correlation_id,
            organization_id = %organization_id,
            code = %code,
            scanned = issued.len(),
            max_sequence,
            identifier = %identifier,
            strategy = ?self.strategy(),
            "invoice identifier allocated"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(organization_id.clone()),
                context,
                "invoice.identifier_allocated",
                AuditCategory::Invoicing,
                AuditOutcome::Success,
            )
            .with_metadata("identifier", identifier.as_str())
            .with_metadata("sequence", sequence.to_string()),
        );

        Ok(AllocatedIdentifier { identifier, code, sequence })
    }
}

/// Invoice-creation workflow: allocates an identifier and stores the invoice.
#[derive(Clone)]
pub struct InvoiceIssuer {
    allocator: InvoiceIdAllocator,
    store: Arc<dyn InvoiceStore>,
}

impl InvoiceIssuer {
    pub fn new(allocator: InvoiceIdAllocator, store: Arc<dyn InvoiceStore>) -> Self {
        Self { allocator, store }
    }

    pub fn allocator(&self) -> &InvoiceIdAllocator {
        &self.allocator
    }

    pub async fn issue(
        &self,
        draft: NewInvoice,
        context: &AuditContext,
    ) -> Result<Invoice, ApplicationError> {
        draft.validate()?;

        let organization_id = draft.organization_id.clone();
        let allocated = self.allocator.next_identifier(&organization_id, context).await?;
        let invoice = draft.into_invoice(allocated.identifier.clone());

        if let Err(error) = self.store.insert_invoice(invoice.clone()).await {
            warn!(
                event_name = "invoicing.invoice.insert_failed",
                correlation_id = %context.correlation_id,
                organization_id = %organization_id,
                identifier = %allocated.identifier,
                error = %error,
                "invoice insert failed after identifier allocation"
            );
            self.allocator.audit.emit(
                AuditEvent::new(
                    Some(organization_id),
                    context,
                    "invoice.created",
                    AuditCategory::Invoicing,
                    AuditOutcome::Failed,
                )
                .with_metadata("identifier", allocated.identifier.as_str())
                .with_metadata("error_class", error.error_class()),
            );
            return Err(error);
        }

        self.allocator.audit.emit(
            AuditEvent::new(
                Some(organization_id),
                context,
                "invoice.created",
                AuditCategory::Invoicing,
                AuditOutcome::Success,
            )
            .with_metadata("invoice_id", invoice.id.0.as_str())
            .with_metadata("identifier", allocated.identifier.as_str()),
        );

        Ok(invoice)
    }
}
