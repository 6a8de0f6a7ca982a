//! HTML to PDF rendering through a headless Chromium.
//!
//! Each render owns one browser process from launch to close. The process is
//! closed on every exit path, including content timeouts and print failures.

pub mod browser;
pub mod document;
pub mod fonts;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tenantry_core::config::{BrowserMode, PdfConfig};
use tenantry_core::errors::ApplicationError;
use tracing::{debug, info, warn};

use self::browser::{
    BrowserLauncher, BrowserSession, ChromiumLauncher, LaunchSettings, PrintOptions,
};

/// Characters stripped from requested filenames before `.pdf` is appended.
const ILLEGAL_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Binaries probed on `PATH` when running with a bundled browser.
const CHROMIUM_CANDIDATES: &[&str] =
    &["chromium", "chromium-browser", "google-chrome", "google-chrome-stable", "chrome"];

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("filename `{0}` has no usable characters")]
    InvalidFilename(String),
    #[error("pdf.executable_path must be set when pdf.browser_mode is external")]
    MissingExecutable,
    #[error("no chromium executable found on PATH (tried {0})")]
    ExecutableNotFound(String),
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("document content did not load within {0:?}")]
    Timeout(Duration),
    #[error("browser error: {0}")]
    Browser(String),
    #[error("template error: {0}")]
    Template(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PdfError> for ApplicationError {
    fn from(error: PdfError) -> Self {
        match error {
            PdfError::MissingExecutable | PdfError::ExecutableNotFound(_) => {
                ApplicationError::Configuration(error.to_string())
            }
            PdfError::InvalidFilename(_) => ApplicationError::BadInput(error.to_string()),
            other => ApplicationError::Rendering(other.to_string()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RenderRequest {
    pub html: String,
    pub filename: String,
    /// Falls back to `pdf.output_dir` when unset.
    pub output_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RenderedDocument {
    pub filename: String,
    pub path: PathBuf,
    pub bytes: usize,
}

/// Strips characters that are illegal in file paths, trims surrounding
/// whitespace and appends `.pdf`.
///
/// Names are never deduplicated; rendering twice with the same name
/// overwrites the earlier file.
pub fn sanitize_filename(requested: &str) -> Result<String, PdfError> {
    let cleaned: String =
        requested.chars().filter(|ch| !ILLEGAL_FILENAME_CHARS.contains(ch)).collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned.chars().all(|ch| ch == '.') {
        return Err(PdfError::InvalidFilename(requested.to_string()));
    }

    Ok(format!("{cleaned}.pdf"))
}

/// Picks the browser binary for the configured mode. External mode never
/// falls back to a `PATH` lookup.
pub fn resolve_executable(config: &PdfConfig) -> Result<PathBuf, PdfError> {
    match (config.browser_mode, config.executable_path.as_ref()) {
        (_, Some(path)) => Ok(path.clone()),
        (BrowserMode::External, None) => Err(PdfError::MissingExecutable),
        (BrowserMode::Bundled, None) => CHROMIUM_CANDIDATES
            .iter()
            .find_map(|candidate| which::which(candidate).ok())
            .ok_or_else(|| PdfError::ExecutableNotFound(CHROMIUM_CANDIDATES.join(", "))),
    }
}

#[derive(Clone)]
pub struct PdfRenderer {
    config: PdfConfig,
    launcher: Arc<dyn BrowserLauncher>,
}

impl PdfRenderer {
    pub fn new(config: PdfConfig, launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self { config, launcher }
    }

    pub fn with_chromium(config: PdfConfig) -> Self {
        Self::new(config, Arc::new(ChromiumLauncher))
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    pub async fn render(&self, request: RenderRequest) -> Result<RenderedDocument, PdfError> {
        let filename = sanitize_filename(&request.filename)?;
        let executable = resolve_executable(&self.config)?;

        let font_css = fonts::build_font_css(&self.config.font_dir).await;
        let html = document::wrap_with_fonts(&request.html, &font_css)?;

        let settings = LaunchSettings {
            executable,
            viewport_width: self.config.viewport_width,
            viewport_height: self.config.viewport_height,
        };
        let mut session = self.launcher.launch(&settings).await?;

        let printed = self.print(session.as_mut(), &html).await;
        if let Err(error) = session.close().await {
            warn!(
                event_name = "pdf.browser.close_failed",
                filename = %filename,
                error = %error,
                "browser did not close cleanly"
            );
        }
        let pdf = printed?;

        let output_dir = request.output_dir.unwrap_or_else(|| self.config.output_dir.clone());
        tokio::fs::create_dir_all(&output_dir).await?;
        let path = output_dir.join(&filename);
        tokio::fs::write(&path, &pdf).await?;

        info!(
            event_name = "pdf.render.completed",
            filename = %filename,
            path = %path.display(),
            size = pdf.len(),
            "PDF written"
        );

        Ok(RenderedDocument { filename, path, bytes: pdf.len() })
    }

    async fn print(
        &self,
        session: &mut dyn BrowserSession,
        html: &str,
    ) -> Result<Vec<u8>, PdfError> {
        let ceiling = Duration::from_secs(self.config.content_timeout_secs);
        tokio::time::timeout(ceiling, session.load_content(html))
            .await
            .map_err(|_| PdfError::Timeout(ceiling))??;

        if let Err(error) = session.wait_for_fonts().await {
            debug!(
                event_name = "pdf.fonts.wait_skipped",
                error = %error,
                "font readiness wait unavailable, continuing"
            );
        }

        tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;

        session.print_pdf(&PrintOptions::a4()).await
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;
    use tenantry_core::config::{AppConfig, BrowserMode, PdfConfig};
    use tenantry_core::errors::ApplicationError;

    use super::browser::{BrowserLauncher, BrowserSession, LaunchSettings, PrintOptions};
    use super::{resolve_executable, sanitize_filename, PdfError, PdfRenderer, RenderRequest};

    #[derive(Clone, Copy, Default)]
    enum Failure {
        #[default]
        None,
        Hang,
        Print,
        Fonts,
    }

    #[derive(Default)]
    struct RecordingLauncher {
        failure: Failure,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingLauncher {
        fn failing(failure: Failure) -> Self {
            Self { failure, ..Self::default() }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    struct RecordingSession {
        failure: Failure,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingSession {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().expect("calls lock").push(call.into());
        }
    }

    #[async_trait]
    impl BrowserLauncher for RecordingLauncher {
        async fn launch(
            &self,
            settings: &LaunchSettings,
        ) -> Result<Box<dyn BrowserSession>, PdfError> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(format!("launch:{}", settings.executable.display()));
            Ok(Box::new(RecordingSession { failure: self.failure, calls: self.calls.clone() }))
        }
    }

    #[async_trait]
    impl BrowserSession for RecordingSession {
        async fn load_content(&mut self, html: &str) -> Result<(), PdfError> {
            self.record("load");
            if matches!(self.failure, Failure::Hang) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            assert!(html.contains("@font-face") || html.contains("@import"));
            Ok(())
        }

        async fn wait_for_fonts(&mut self) -> Result<(), PdfError> {
            self.record("fonts");
            match self.failure {
                Failure::Fonts => Err(PdfError::Browser("document.fonts unavailable".to_string())),
                _ => Ok(()),
            }
        }

        async fn print_pdf(&mut self, options: &PrintOptions) -> Result<Vec<u8>, PdfError> {
            self.record(format!("print:{}x{}", options.paper_width_in, options.paper_height_in));
            match self.failure {
                Failure::Print => Err(PdfError::Browser("target crashed".to_string())),
                _ => Ok(b"%PDF-1.7 fake".to_vec()),
            }
        }

        async fn close(&mut self) -> Result<(), PdfError> {
            self.record("close");
            Ok(())
        }
    }

    fn pdf_config(dir: &TempDir) -> PdfConfig {
        PdfConfig {
            browser_mode: BrowserMode::Bundled,
            executable_path: Some(PathBuf::from("/opt/chromium/chrome")),
            output_dir: dir.path().join("documents"),
            font_dir: dir.path().join("fonts"),
            settle_delay_ms: 0,
            ..AppConfig::default().pdf
        }
    }

    fn request(filename: &str) -> RenderRequest {
        RenderRequest {
            html: "<html><head><title>t</title></head><body>Hi</body></html>".to_string(),
            filename: filename.to_string(),
            output_dir: None,
        }
    }

    #[test]
    fn sanitize_strips_illegal_characters_and_appends_extension() {
        assert_eq!(sanitize_filename("inv<o>i:c\"e/1\\2|3?4*").expect("name"), "invoice1234.pdf");
        assert_eq!(sanitize_filename("TCL-0001").expect("name"), "TCL-0001.pdf");
        assert_eq!(sanitize_filename("report.final").expect("name"), "report.final.pdf");
    }

    #[test]
    fn sanitize_trims_surrounding_whitespace_but_keeps_inner_spaces() {
        assert_eq!(sanitize_filename("  INV 42  ").expect("name"), "INV 42.pdf");
        assert_eq!(sanitize_filename("\tQ3 report?\n").expect("name"), "Q3 report.pdf");
    }

    #[test]
    fn sanitize_rejects_names_with_nothing_left() {
        assert!(matches!(sanitize_filename("<>:\"/\\|?*"), Err(PdfError::InvalidFilename(_))));
        assert!(matches!(sanitize_filename("   "), Err(PdfError::InvalidFilename(_))));
        assert!(matches!(sanitize_filename("/../"), Err(PdfError::InvalidFilename(_))));
    }

    #[test]
    fn external_mode_requires_configured_executable() {
        let config = PdfConfig {
            browser_mode: BrowserMode::External,
            executable_path: None,
            ..AppConfig::default().pdf
        };
        assert!(matches!(resolve_executable(&config), Err(PdfError::MissingExecutable)));

        let configured = PdfConfig {
            executable_path: Some(PathBuf::from("/usr/bin/chromium")),
            ..config
        };
        assert_eq!(
            resolve_executable(&configured).expect("path"),
            PathBuf::from("/usr/bin/chromium")
        );
    }

    #[test]
    fn error_classes_separate_configuration_from_rendering() {
        let missing: ApplicationError = PdfError::MissingExecutable.into();
        assert_eq!(missing.error_class(), "configuration");

        let timeout: ApplicationError = PdfError::Timeout(Duration::from_secs(60)).into();
        assert_eq!(timeout.error_class(), "rendering");

        let bad_name: ApplicationError = PdfError::InvalidFilename("*".to_string()).into();
        assert_eq!(bad_name.error_class(), "bad_input");
    }

    #[tokio::test]
    async fn render_writes_pdf_at_sanitized_path() {
        let dir = TempDir::new().expect("tempdir");
        let launcher = Arc::new(RecordingLauncher::default());
        let renderer = PdfRenderer::new(pdf_config(&dir), launcher.clone());

        let rendered = renderer.render(request("agreement:<v2>?")).await.expect("render");

        assert_eq!(rendered.filename, "agreementv2.pdf");
        assert_eq!(rendered.path, dir.path().join("documents").join("agreementv2.pdf"));
        assert!(rendered.path.exists());
        let written = std::fs::read(&rendered.path).expect("read pdf");
        assert_eq!(written.len(), rendered.bytes);
        assert!(written.starts_with(b"%PDF"));

        assert_eq!(
            launcher.calls(),
            vec!["launch:/opt/chromium/chrome", "load", "fonts", "print:8.27x11.69", "close"]
        );
    }

    #[tokio::test]
    async fn render_honors_explicit_output_dir_and_overwrites() {
        let dir = TempDir::new().expect("tempdir");
        let renderer =
            PdfRenderer::new(pdf_config(&dir), Arc::new(RecordingLauncher::default()));
        let target = dir.path().join("nested").join("deeper");

        let mut req = request("same-name");
        req.output_dir = Some(target.clone());
        let first = renderer.render(req.clone()).await.expect("first render");
        let second = renderer.render(req).await.expect("second render");

        assert_eq!(first.path, target.join("same-name.pdf"));
        assert_eq!(first.path, second.path);
        let entries = std::fs::read_dir(&target).expect("read dir").count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn external_mode_without_executable_fails_before_launch() {
        let dir = TempDir::new().expect("tempdir");
        let launcher = Arc::new(RecordingLauncher::default());
        let config = PdfConfig {
            browser_mode: BrowserMode::External,
            executable_path: None,
            ..pdf_config(&dir)
        };
        let renderer = PdfRenderer::new(config, launcher.clone());

        let error = renderer.render(request("invoice")).await.expect_err("must fail");

        assert!(matches!(error, PdfError::MissingExecutable));
        assert!(launcher.calls().is_empty(), "browser must not be launched");
        assert!(!dir.path().join("documents").exists());
    }

    #[tokio::test]
    async fn print_failure_still_closes_browser() {
        let dir = TempDir::new().expect("tempdir");
        let launcher = Arc::new(RecordingLauncher::failing(Failure::Print));
        let renderer = PdfRenderer::new(pdf_config(&dir), launcher.clone());

        let error = renderer.render(request("invoice")).await.expect_err("print fails");

        assert!(matches!(error, PdfError::Browser(_)));
        assert_eq!(launcher.calls().last().map(String::as_str), Some("close"));
        assert!(!dir.path().join("documents").join("invoice.pdf").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn content_timeout_is_a_rendering_failure_and_closes_browser() {
        let dir = TempDir::new().expect("tempdir");
        let launcher = Arc::new(RecordingLauncher::failing(Failure::Hang));
        let renderer = PdfRenderer::new(pdf_config(&dir), launcher.clone());

        let error = renderer.render(request("slow")).await.expect_err("timeout");

        assert!(matches!(error, PdfError::Timeout(ceiling) if ceiling == Duration::from_secs(60)));
        assert_eq!(launcher.calls(), vec!["launch:/opt/chromium/chrome", "load", "close"]);
    }

    #[tokio::test]
    async fn font_wait_failure_is_ignored() {
        let dir = TempDir::new().expect("tempdir");
        let launcher = Arc::new(RecordingLauncher::failing(Failure::Fonts));
        let renderer = PdfRenderer::new(pdf_config(&dir), launcher.clone());

        let rendered = renderer.render(request("fonts-missing")).await.expect("render");

        assert!(rendered.path.exists());
        assert!(launcher.calls().contains(&"print:8.27x11.69".to_string()));
    }
}
