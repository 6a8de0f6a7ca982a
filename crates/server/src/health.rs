use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tenantry_core::config::PdfConfig;
use tenantry_db::DbPool;

use crate::pdf::resolve_executable;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    pdf: PdfConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub browser: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, pdf: PdfConfig) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, pdf })
}

/// Readiness follows the database only. The browser check is informational
/// because invoice numbering keeps working without a renderer.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "tenantry-server runtime initialized".to_string(),
        },
        database,
        browser: browser_check(&state.pdf),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match tenantry_db::connection::ping(pool).await {
        Ok(()) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

fn browser_check(pdf: &PdfConfig) -> HealthCheck {
    match resolve_executable(pdf) {
        Ok(path) => HealthCheck {
            status: "ready",
            detail: format!("browser executable: {}", path.display()),
        },
        Err(error) => HealthCheck { status: "unconfigured", detail: error.to_string() },
    }
}
