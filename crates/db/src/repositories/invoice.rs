use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::Row;

use tenantry_core::domain::invoice::{Invoice, InvoiceId};
use tenantry_core::domain::organization::OrganizationId;
use tenantry_core::errors::ApplicationError;
use tenantry_core::invoicing::{InvoiceStore, IssuedIdentifierSource};

use super::{is_unique_violation, parse_timestamp, InvoiceRepository, RepositoryError};
use crate::DbPool;

#[derive(Clone)]
pub struct SqlInvoiceRepository {
    pool: DbPool,
}

impl SqlInvoiceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_invoice(row: &sqlx::sqlite::SqliteRow) -> Result<Invoice, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let organization_id: String =
        row.try_get("organization_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let identifier: Option<String> =
        row.try_get("identifier").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let customer_name: String =
        row.try_get("customer_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let currency: String =
        row.try_get("currency").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let total: String = row.try_get("total").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let deleted: i64 = row.try_get("deleted").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let total = Decimal::from_str(&total)
        .map_err(|e| RepositoryError::Decode(format!("invalid invoice total `{total}`: {e}")))?;

    Ok(Invoice {
        id: InvoiceId(id),
        organization_id: OrganizationId(organization_id),
        identifier,
        customer_name,
        currency,
        total,
        deleted: deleted != 0,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn conflict_for(invoice: &Invoice, error: sqlx::Error) -> RepositoryError {
    if is_unique_violation(&error) {
        RepositoryError::Conflict(format!(
            "invoice identifier `{}` is already in use for organization `{}`",
            invoice.identifier.as_deref().unwrap_or_default(),
            invoice.organization_id
        ))
    } else {
        RepositoryError::Database(error)
    }
}

#[async_trait::async_trait]
impl InvoiceRepository for SqlInvoiceRepository {
    async fn find_by_id(&self, id: &InvoiceId) -> Result<Option<Invoice>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, organization_id, identifier, customer_name, currency, total,
                    deleted, created_at, updated_at
             FROM invoice WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_invoice).transpose()
    }

    async fn save(&self, invoice: Invoice) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO invoice (id, organization_id, identifier, customer_name, currency,
                                  total, deleted, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 identifier = excluded.identifier,
                 customer_name = excluded.customer_name,
                 currency = excluded.currency,
                 total = excluded.total,
                 deleted = excluded.deleted,
                 updated_at = excluded.updated_at",
        )
        .bind(&invoice.id.0)
        .bind(&invoice.organization_id.0)
        .bind(&invoice.identifier)
        .bind(&invoice.customer_name)
        .bind(&invoice.currency)
        .bind(invoice.total.to_string())
        .bind(i64::from(invoice.deleted))
        .bind(invoice.created_at.to_rfc3339())
        .bind(invoice.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|error| conflict_for(&invoice, error))?;

        Ok(())
    }

    async fn soft_delete(&self, id: &InvoiceId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE invoice SET deleted = 1, updated_at = ? WHERE id = ? AND deleted = 0",
        )
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_identifiers_for_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT identifier FROM invoice
             WHERE organization_id = ?
               AND deleted = 0
               AND identifier IS NOT NULL
               AND identifier <> ''",
        )
        .bind(&organization_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("identifier")
                    .map_err(|e| RepositoryError::Decode(e.to_string()))
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl IssuedIdentifierSource for SqlInvoiceRepository {
    async fn issued_identifiers(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<String>, ApplicationError> {
        Ok(self.list_identifiers_for_organization(organization_id).await?)
    }
}

#[async_trait::async_trait]
impl InvoiceStore for SqlInvoiceRepository {
    async fn insert_invoice(&self, invoice: Invoice) -> Result<(), ApplicationError> {
        sqlx::query(
            "INSERT INTO invoice (id, organization_id, identifier, customer_name, currency,
                                  total, deleted, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&invoice.id.0)
        .bind(&invoice.organization_id.0)
        .bind(&invoice.identifier)
        .bind(&invoice.customer_name)
        .bind(&invoice.currency)
        .bind(invoice.total.to_string())
        .bind(i64::from(invoice.deleted))
        .bind(invoice.created_at.to_rfc3339())
        .bind(invoice.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|error| conflict_for(&invoice, error))?;

        Ok(())
    }
}
