use sqlx::Row;

use tenantry_core::domain::organization::{Organization, OrganizationId};
use tenantry_core::errors::ApplicationError;
use tenantry_core::invoicing::OrganizationDirectory;

use super::{parse_timestamp, OrganizationRepository, RepositoryError};
use crate::DbPool;

#[derive(Clone)]
pub struct SqlOrganizationRepository {
    pool: DbPool,
}

impl SqlOrganizationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_organization(row: &sqlx::sqlite::SqliteRow) -> Result<Organization, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Organization {
        id: OrganizationId(id),
        name,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[async_trait::async_trait]
impl OrganizationRepository for SqlOrganizationRepository {
    async fn find_by_id(
        &self,
        id: &OrganizationId,
    ) -> Result<Option<Organization>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, created_at, updated_at FROM organization WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_organization).transpose()
    }

    async fn save(&self, organization: Organization) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO organization (id, name, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 updated_at = excluded.updated_at",
        )
        .bind(&organization.id.0)
        .bind(&organization.name)
        .bind(organization.created_at.to_rfc3339())
        .bind(organization.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl OrganizationDirectory for SqlOrganizationRepository {
    async fn find_organization(
        &self,
        id: &OrganizationId,
    ) -> Result<Option<Organization>, ApplicationError> {
        Ok(self.find_by_id(id).await?)
    }
}
