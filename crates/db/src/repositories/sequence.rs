use chrono::Utc;
use sqlx::Row;

use tenantry_core::domain::organization::OrganizationId;
use tenantry_core::errors::ApplicationError;
use tenantry_core::invoicing::{OrganizationCode, SequenceCounter};

use super::RepositoryError;
use crate::DbPool;

/// Per-(organization, code) counter backed by the `invoice_sequence` table.
///
/// One upsert statement both seeds and advances the row, so concurrent
/// callers serialize on SQLite's write lock and never observe the same value.
#[derive(Clone)]
pub struct SqlSequenceCounter {
    pool: DbPool,
}

impl SqlSequenceCounter {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn advance_row(
        &self,
        organization_id: &OrganizationId,
        code: &OrganizationCode,
        floor: i64,
    ) -> Result<i64, RepositoryError> {
        let row = sqlx::query(
            "INSERT INTO invoice_sequence (organization_id, code, last_value, updated_at)
             VALUES (?, ?, ? + 1, ?)
             ON CONFLICT(organization_id, code) DO UPDATE SET
                 last_value = MAX(invoice_sequence.last_value, excluded.last_value - 1) + 1,
                 updated_at = excluded.updated_at
             RETURNING last_value",
        )
        .bind(&organization_id.0)
        .bind(code.as_str())
        .bind(floor)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        row.try_get::<i64, _>("last_value").map_err(|e| RepositoryError::Decode(e.to_string()))
    }
}

#[async_trait::async_trait]
impl SequenceCounter for SqlSequenceCounter {
    async fn advance(
        &self,
        organization_id: &OrganizationId,
        code: &OrganizationCode,
        floor: u64,
    ) -> Result<u64, ApplicationError> {
        let floor = i64::try_from(floor)
            .ok()
            .filter(|value| *value < i64::MAX)
            .ok_or_else(|| {
                ApplicationError::Conflict(format!("sequence for code `{code}` is exhausted"))
            })?;

        let value = self.advance_row(organization_id, code, floor).await?;
        u64::try_from(value).map_err(|_| {
            ApplicationError::Persistence(format!("negative sequence value {value} stored"))
        })
    }
}
