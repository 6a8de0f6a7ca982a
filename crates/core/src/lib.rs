pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod invoicing;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use domain::invoice::{Invoice, InvoiceId, InvoiceIdentifier, NewInvoice};
pub use domain::organization::{Organization, OrganizationId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use invoicing::{
    AllocatedIdentifier, InvoiceIdAllocator, InvoiceIssuer, OrganizationCode, SequenceStrategy,
};
