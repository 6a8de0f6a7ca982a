//! JSON API routes.
//!
//! - `POST   /api/v1/organizations`                          — register an organization
//! - `POST   /api/v1/organizations/{id}/invoice-identifiers` — preview the next identifier
//! - `POST   /api/v1/invoices`                               — create an invoice
//! - `DELETE /api/v1/invoices/{id}`                          — soft-delete an invoice
//! - `POST   /api/v1/documents/pdf`                          — render posted HTML to PDF
//! - `POST   /api/v1/invoices/{id}/pdf`                      — render an invoice document
//! - `GET    /documents/*`                                   — rendered files

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, post},
    Json, Router,
};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tenantry_core::audit::AuditContext;
use tenantry_core::config::AppConfig;
use tenantry_core::domain::invoice::{Invoice, InvoiceId, NewInvoice};
use tenantry_core::domain::organization::{Organization, OrganizationId};
use tenantry_core::errors::ApplicationError;
use tenantry_core::invoicing::{
    AllocatedIdentifier, InvoiceIdAllocator, InvoiceIssuer, OrganizationCode, SequenceStrategy,
};
use tenantry_db::{
    DbPool, InvoiceRepository, OrganizationRepository, SqlInvoiceRepository,
    SqlOrganizationRepository, SqlSequenceCounter,
};
use tower_http::services::ServeDir;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::pdf::document::DocumentTemplates;
use crate::pdf::{PdfError, PdfRenderer, RenderRequest, RenderedDocument};

const CORRELATION_HEADER: &str = "x-correlation-id";
const API_ACTOR: &str = "api";

/// Characters escaped when a rendered filename becomes a URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Clone)]
pub struct ApiState {
    organizations: Arc<dyn OrganizationRepository>,
    invoices: Arc<dyn InvoiceRepository>,
    issuer: InvoiceIssuer,
    renderer: PdfRenderer,
    templates: Arc<DocumentTemplates>,
}

impl ApiState {
    pub fn new(
        organizations: Arc<dyn OrganizationRepository>,
        invoices: Arc<dyn InvoiceRepository>,
        issuer: InvoiceIssuer,
        renderer: PdfRenderer,
    ) -> Result<Self, PdfError> {
        Ok(Self {
            organizations,
            invoices,
            issuer,
            renderer,
            templates: Arc::new(DocumentTemplates::new()?),
        })
    }

    /// SQLite-backed state honoring `invoicing.sequence_strategy`.
    pub fn sql(
        pool: DbPool,
        config: &AppConfig,
        renderer: PdfRenderer,
    ) -> Result<Self, PdfError> {
        let organizations = Arc::new(SqlOrganizationRepository::new(pool.clone()));
        let invoices = Arc::new(SqlInvoiceRepository::new(pool.clone()));

        let mut allocator = InvoiceIdAllocator::new(organizations.clone(), invoices.clone());
        if config.invoicing.sequence_strategy == SequenceStrategy::Counter {
            allocator = allocator.with_counter(Arc::new(SqlSequenceCounter::new(pool)));
        }
        let issuer = InvoiceIssuer::new(allocator, invoices.clone());

        Self::new(organizations, invoices, issuer, renderer)
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub error_class: &'static str,
    pub correlation_id: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Deserialize)]
pub struct CreateOrganizationRequest {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub organization_id: String,
    pub customer_name: String,
    pub currency: String,
    pub total: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct RenderDocumentRequest {
    pub html: String,
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub filename: String,
    pub url: String,
    pub bytes: usize,
}

impl From<RenderedDocument> for DocumentResponse {
    fn from(document: RenderedDocument) -> Self {
        Self {
            url: format!("/documents/{}", utf8_percent_encode(&document.filename, PATH_SEGMENT)),
            filename: document.filename,
            bytes: document.bytes,
        }
    }
}

pub fn router(state: ApiState) -> Router {
    let documents = ServeDir::new(state.renderer.output_dir());

    Router::new()
        .route("/api/v1/organizations", post(create_organization))
        .route("/api/v1/organizations/{id}/invoice-identifiers", post(preview_identifier))
        .route("/api/v1/invoices", post(create_invoice))
        .route("/api/v1/invoices/{id}", delete(delete_invoice))
        .route("/api/v1/invoices/{id}/pdf", post(render_invoice_pdf))
        .route("/api/v1/documents/pdf", post(render_document))
        .nest_service("/documents", documents)
        .with_state(state)
}

fn audit_context(headers: &HeaderMap) -> AuditContext {
    let correlation_id = headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
    AuditContext::new(correlation_id, API_ACTOR)
}

fn reject(error: ApplicationError, context: &AuditContext) -> (StatusCode, Json<ApiError>) {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let error_class = error.error_class();

    if status.is_server_error() {
        error!(
            event_name = "api.request.failed",
            correlation_id = %context.correlation_id,
            error_class,
            error = %error,
            "request failed"
        );
    } else {
        warn!(
            event_name = "api.request.rejected",
            correlation_id = %context.correlation_id,
            error_class,
            error = %error,
            "request rejected"
        );
    }

    // Configuration details stay visible so operators can fix the deployment.
    let message = match error {
        ApplicationError::Configuration(detail) => detail,
        other if status.is_server_error() => {
            other.into_interface(context.correlation_id.clone()).user_message().to_string()
        }
        other => other.to_string(),
    };

    let body = ApiError {
        error: message,
        error_class,
        correlation_id: context.correlation_id.clone(),
    };
    (status, Json(body))
}

async fn create_organization(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<CreateOrganizationRequest>,
) -> ApiResult<(StatusCode, Json<Organization>)> {
    let context = audit_context(&headers);

    OrganizationCode::derive(&request.name)
        .map_err(|error| reject(ApplicationError::from(error), &context))?;
    let id = request
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let organization = Organization::new(id, request.name);

    state
        .organizations
        .save(organization.clone())
        .await
        .map_err(|error| reject(error.into(), &context))?;

    info!(
        event_name = "api.organization.saved",
        correlation_id = %context.correlation_id,
        organization_id = %organization.id,
        "organization saved"
    );
    Ok((StatusCode::CREATED, Json(organization)))
}

async fn preview_identifier(
    State(state): State<ApiState>,
    Path(organization_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<AllocatedIdentifier>> {
    let context = audit_context(&headers);
    let allocated = state
        .issuer
        .allocator()
        .next_identifier(&OrganizationId(organization_id), &context)
        .await
        .map_err(|error| reject(error, &context))?;
    Ok(Json(allocated))
}

async fn create_invoice(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<CreateInvoiceRequest>,
) -> ApiResult<(StatusCode, Json<Invoice>)> {
    let context = audit_context(&headers);
    let draft = NewInvoice {
        organization_id: OrganizationId(request.organization_id),
        customer_name: request.customer_name,
        currency: request.currency,
        total: request.total,
    };

    let invoice =
        state.issuer.issue(draft, &context).await.map_err(|error| reject(error, &context))?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

async fn delete_invoice(
    State(state): State<ApiState>,
    Path(invoice_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let context = audit_context(&headers);
    let deleted = state
        .invoices
        .soft_delete(&InvoiceId(invoice_id.clone()))
        .await
        .map_err(|error| reject(error.into(), &context))?;

    if !deleted {
        return Err(reject(
            ApplicationError::NotFound(format!("invoice `{invoice_id}` not found")),
            &context,
        ));
    }

    info!(
        event_name = "api.invoice.deleted",
        correlation_id = %context.correlation_id,
        invoice_id = %invoice_id,
        "invoice soft-deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn render_document(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<RenderDocumentRequest>,
) -> ApiResult<Json<DocumentResponse>> {
    let context = audit_context(&headers);
    let rendered = state
        .renderer
        .render(RenderRequest { html: request.html, filename: request.filename, output_dir: None })
        .await
        .map_err(|error| reject(error.into(), &context))?;
    Ok(Json(rendered.into()))
}

async fn render_invoice_pdf(
    State(state): State<ApiState>,
    Path(invoice_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<DocumentResponse>> {
    let context = audit_context(&headers);
    let not_found = || ApplicationError::NotFound(format!("invoice `{invoice_id}` not found"));

    let invoice = state
        .invoices
        .find_by_id(&InvoiceId(invoice_id.clone()))
        .await
        .map_err(|error| reject(error.into(), &context))?
        .filter(|invoice| !invoice.deleted)
        .ok_or_else(|| reject(not_found(), &context))?;
    let organization = state
        .organizations
        .find_by_id(&invoice.organization_id)
        .await
        .map_err(|error| reject(error.into(), &context))?
        .ok_or_else(|| {
            reject(
                ApplicationError::NotFound(format!(
                    "organization `{}` not found",
                    invoice.organization_id
                )),
                &context,
            )
        })?;

    let html = state
        .templates
        .render_invoice(&invoice, &organization)
        .map_err(|error| reject(error.into(), &context))?;
    let filename = invoice.identifier.clone().unwrap_or_else(|| invoice.id.0.clone());

    let rendered = state
        .renderer
        .render(RenderRequest { html, filename, output_dir: None })
        .await
        .map_err(|error| reject(error.into(), &context))?;
    Ok(Json(rendered.into()))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tenantry_core::config::{AppConfig, BrowserMode, PdfConfig};
    use tenantry_db::{connect_with_settings, migrations};
    use tower::ServiceExt;

    use super::{router, ApiState};
    use crate::pdf::browser::{BrowserLauncher, BrowserSession, LaunchSettings, PrintOptions};
    use crate::pdf::{PdfError, PdfRenderer};

    struct StubLauncher;
    struct StubSession;

    #[async_trait]
    impl BrowserLauncher for StubLauncher {
        async fn launch(
            &self,
            _settings: &LaunchSettings,
        ) -> Result<Box<dyn BrowserSession>, PdfError> {
            Ok(Box::new(StubSession))
        }
    }

    #[async_trait]
    impl BrowserSession for StubSession {
        async fn load_content(&mut self, _html: &str) -> Result<(), PdfError> {
            Ok(())
        }

        async fn wait_for_fonts(&mut self) -> Result<(), PdfError> {
            Ok(())
        }

        async fn print_pdf(&mut self, _options: &PrintOptions) -> Result<Vec<u8>, PdfError> {
            Ok(b"%PDF-1.7 stub".to_vec())
        }

        async fn close(&mut self) -> Result<(), PdfError> {
            Ok(())
        }
    }

    async fn app(dir: &TempDir, pdf: PdfConfig) -> Router {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let config = AppConfig::default();
        let renderer = PdfRenderer::new(
            PdfConfig { output_dir: dir.path().join("documents"), settle_delay_ms: 0, ..pdf },
            Arc::new(StubLauncher),
        );
        router(ApiState::sql(pool, &config, renderer).expect("state"))
    }

    fn bundled_pdf() -> PdfConfig {
        PdfConfig {
            browser_mode: BrowserMode::Bundled,
            executable_path: Some(PathBuf::from("/opt/chromium/chrome")),
            ..AppConfig::default().pdf
        }
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-correlation-id", "req-test")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn create_org(app: &Router, id: &str, name: &str) {
        let (status, _) =
            send(app, "POST", "/api/v1/organizations", Some(json!({ "id": id, "name": name })))
                .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    async fn create_invoice(app: &Router, org: &str) -> Value {
        let (status, body) = send(
            app,
            "POST",
            "/api/v1/invoices",
            Some(json!({
                "organization_id": org,
                "customer_name": "Acme",
                "currency": "usd",
                "total": "150.00"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    #[tokio::test]
    async fn invoices_receive_sequential_identifiers_and_reuse_after_delete() {
        let dir = TempDir::new().expect("tempdir");
        let app = app(&dir, bundled_pdf()).await;
        create_org(&app, "org-g", "Google").await;

        let first = create_invoice(&app, "org-g").await;
        let second = create_invoice(&app, "org-g").await;
        assert_eq!(first["identifier"], "GOO-0001");
        assert_eq!(second["identifier"], "GOO-0002");

        let second_id = second["id"].as_str().expect("id");
        let (status, _) =
            send(&app, "DELETE", &format!("/api/v1/invoices/{second_id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, preview) =
            send(&app, "POST", "/api/v1/organizations/org-g/invoice-identifiers", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(preview["identifier"], "GOO-0002");
        assert_eq!(preview["sequence"], 2);
    }

    #[tokio::test]
    async fn unknown_organization_maps_to_not_found() {
        let dir = TempDir::new().expect("tempdir");
        let app = app(&dir, bundled_pdf()).await;

        let (status, body) =
            send(&app, "POST", "/api/v1/organizations/ghost/invoice-identifiers", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error_class"], "not_found");
        assert_eq!(body["correlation_id"], "req-test");
    }

    #[tokio::test]
    async fn blank_organization_name_is_bad_request() {
        let dir = TempDir::new().expect("tempdir");
        let app = app(&dir, bundled_pdf()).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/organizations",
            Some(json!({ "id": "org-x", "name": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_class"], "bad_input");
    }

    #[tokio::test]
    async fn deleting_unknown_invoice_is_not_found() {
        let dir = TempDir::new().expect("tempdir");
        let app = app(&dir, bundled_pdf()).await;

        let (status, _) = send(&app, "DELETE", "/api/v1/invoices/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invoice_pdf_is_rendered_and_served() {
        let dir = TempDir::new().expect("tempdir");
        let app = app(&dir, bundled_pdf()).await;
        create_org(&app, "org-t", "Thunder Client Limited").await;
        let invoice = create_invoice(&app, "org-t").await;
        let invoice_id = invoice["id"].as_str().expect("id");

        let (status, body) =
            send(&app, "POST", &format!("/api/v1/invoices/{invoice_id}/pdf"), None).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["filename"], "TCL-0001.pdf");
        assert_eq!(body["url"], "/documents/TCL-0001.pdf");
        assert!(dir.path().join("documents").join("TCL-0001.pdf").exists());

        let response = app
            .clone()
            .oneshot(
                Request::builder().uri("/documents/TCL-0001.pdf").body(Body::empty()).expect("req"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn document_url_is_percent_encoded_and_resolves() {
        let dir = TempDir::new().expect("tempdir");
        let app = app(&dir, bundled_pdf()).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/documents/pdf",
            Some(json!({ "html": "<p>signed</p>", "filename": "INV 42#final" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["filename"], "INV 42#final.pdf");
        assert_eq!(body["url"], "/documents/INV%2042%23final.pdf");

        let url = body["url"].as_str().expect("url");
        let response = app
            .clone()
            .oneshot(Request::builder().uri(url).body(Body::empty()).expect("req"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_production_executable_is_a_configuration_error() {
        let dir = TempDir::new().expect("tempdir");
        let pdf = PdfConfig {
            browser_mode: BrowserMode::External,
            executable_path: None,
            ..AppConfig::default().pdf
        };
        let app = app(&dir, pdf).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/documents/pdf",
            Some(json!({ "html": "<p>hello</p>", "filename": "hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error_class"], "configuration");
        assert!(body["error"].as_str().unwrap_or_default().contains("pdf.executable_path"));
    }
}
