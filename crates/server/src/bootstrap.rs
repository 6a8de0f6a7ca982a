use axum::Router;
use tenantry_core::config::{AppConfig, BrowserMode, ConfigError, LoadOptions};
use tenantry_db::{connection::connect_with_config, migrations, DbPool};
use thiserror::Error;
use tracing::{info, warn};

use crate::api::{self, ApiState};
use crate::health;
use crate::pdf::{resolve_executable, PdfError, PdfRenderer};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: ApiState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("document templates failed to load: {0}")]
    Templates(#[source] PdfError),
}

impl Application {
    pub fn router(&self) -> Router {
        api::router(self.state.clone())
            .merge(health::router(self.db_pool.clone(), self.config.pdf.clone()))
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    // Rendering requests fail individually when no browser is available; the
    // rest of the service still starts.
    if let Err(error) = resolve_executable(&config.pdf) {
        warn!(
            event_name = "system.bootstrap.browser_unavailable",
            correlation_id = "bootstrap",
            browser_mode = ?config.pdf.browser_mode,
            error = %error,
            "PDF rendering will fail until a browser executable is configured"
        );
    } else if config.pdf.browser_mode == BrowserMode::Bundled {
        info!(
            event_name = "system.bootstrap.browser_bundled",
            correlation_id = "bootstrap",
            "using locally resolved chromium for PDF rendering"
        );
    }

    let renderer = PdfRenderer::with_chromium(config.pdf.clone());
    let state =
        ApiState::sql(db_pool.clone(), &config, renderer).map_err(BootstrapError::Templates)?;

    Ok(Application { config, db_pool, state })
}
