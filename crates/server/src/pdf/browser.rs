use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{PrintToPdfParams, SetDocumentContentParams};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::debug;

use super::PdfError;

const FONTS_READY_EXPRESSION: &str = "document.fonts.ready.then(() => true)";
const READY_STATE_EXPRESSION: &str = "document.readyState";
const READY_STATE_POLL: Duration = Duration::from_millis(25);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchSettings {
    pub executable: PathBuf,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

/// Paper geometry in inches, as the DevTools protocol expects.
#[derive(Clone, Debug, PartialEq)]
pub struct PrintOptions {
    pub paper_width_in: f64,
    pub paper_height_in: f64,
    pub margin_in: f64,
    pub print_background: bool,
}

impl PrintOptions {
    /// A4 with 10 mm margins on every side and backgrounds printed.
    pub fn a4() -> Self {
        Self {
            paper_width_in: 8.27,
            paper_height_in: 11.69,
            margin_in: 0.39,
            print_background: true,
        }
    }
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Starts one isolated browser process with a blank page open.
    async fn launch(
        &self,
        settings: &LaunchSettings,
    ) -> Result<Box<dyn BrowserSession>, PdfError>;
}

#[async_trait]
pub trait BrowserSession: Send {
    /// Replaces the page content and returns once `document.readyState` has
    /// left `loading`. The `load` event is not awaited, so an unreachable
    /// remote stylesheet cannot stall it.
    async fn load_content(&mut self, html: &str) -> Result<(), PdfError>;

    async fn wait_for_fonts(&mut self) -> Result<(), PdfError>;

    async fn print_pdf(&mut self, options: &PrintOptions) -> Result<Vec<u8>, PdfError>;

    async fn close(&mut self) -> Result<(), PdfError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ChromiumLauncher;

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(
        &self,
        settings: &LaunchSettings,
    ) -> Result<Box<dyn BrowserSession>, PdfError> {
        let config = browser_config(settings)?;
        let (browser, mut handler) =
            Browser::launch(config).await.map_err(|e| PdfError::Launch(e.to_string()))?;

        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let mut session = ChromiumSession { browser, page: None, events };
        match session.browser.new_page("about:blank").await {
            Ok(page) => {
                session.page = Some(page);
                Ok(Box::new(session))
            }
            Err(error) => {
                let _ = session.close().await;
                Err(PdfError::Launch(error.to_string()))
            }
        }
    }
}

/// Page layout follows the configured viewport through device-metrics
/// emulation; the window size alone does not change it.
pub(crate) fn browser_config(settings: &LaunchSettings) -> Result<BrowserConfig, PdfError> {
    BrowserConfig::builder()
        .chrome_executable(&settings.executable)
        .no_sandbox()
        .arg("--disable-dev-shm-usage")
        .arg("--disable-gpu")
        .window_size(settings.viewport_width, settings.viewport_height)
        .viewport(Viewport {
            width: settings.viewport_width,
            height: settings.viewport_height,
            ..Viewport::default()
        })
        .build()
        .map_err(PdfError::Launch)
}

/// Polls `ready_state` until the document is parsed (`interactive` or
/// `complete`). Callers bound the wait with their own timeout.
pub(crate) async fn wait_until_parsed<F, Fut>(mut ready_state: F) -> Result<(), PdfError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, PdfError>>,
{
    loop {
        if ready_state().await? != "loading" {
            return Ok(());
        }
        tokio::time::sleep(READY_STATE_POLL).await;
    }
}

/// Dropping a `Browser` kills its child process, so a cancelled render does
/// not leak Chromium even when `close` never runs.
pub struct ChromiumSession {
    browser: Browser,
    page: Option<Page>,
    events: JoinHandle<()>,
}

impl ChromiumSession {
    fn page(&self) -> Result<&Page, PdfError> {
        self.page.as_ref().ok_or_else(|| PdfError::Browser("page is not open".to_string()))
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn load_content(&mut self, html: &str) -> Result<(), PdfError> {
        let page = self.page()?;
        let frame_id = page
            .mainframe()
            .await
            .map_err(|e| PdfError::Browser(e.to_string()))?
            .ok_or_else(|| PdfError::Browser("page has no main frame".to_string()))?;

        page.execute(SetDocumentContentParams::new(frame_id, html))
            .await
            .map_err(|e| PdfError::Browser(e.to_string()))?;

        wait_until_parsed(|| async move {
            page.evaluate(READY_STATE_EXPRESSION)
                .await
                .map_err(|e| PdfError::Browser(e.to_string()))?
                .into_value::<String>()
                .map_err(|e| PdfError::Browser(e.to_string()))
        })
        .await
    }

    async fn wait_for_fonts(&mut self) -> Result<(), PdfError> {
        let params = EvaluateParams::builder()
            .expression(FONTS_READY_EXPRESSION)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(PdfError::Browser)?;
        self.page()?
            .evaluate_expression(params)
            .await
            .map_err(|e| PdfError::Browser(e.to_string()))?;
        Ok(())
    }

    async fn print_pdf(&mut self, options: &PrintOptions) -> Result<Vec<u8>, PdfError> {
        let params = PrintToPdfParams {
            print_background: Some(options.print_background),
            paper_width: Some(options.paper_width_in),
            paper_height: Some(options.paper_height_in),
            margin_top: Some(options.margin_in),
            margin_bottom: Some(options.margin_in),
            margin_left: Some(options.margin_in),
            margin_right: Some(options.margin_in),
            ..PrintToPdfParams::default()
        };
        self.page()?.pdf(params).await.map_err(|e| PdfError::Browser(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), PdfError> {
        if let Some(page) = self.page.take() {
            if let Err(error) = page.close().await {
                debug!(
                    event_name = "pdf.browser.page_close_failed",
                    error = %error,
                    "page close failed"
                );
            }
        }

        let closed =
            self.browser.close().await.map(|_| ()).map_err(|e| PdfError::Browser(e.to_string()));
        let waited = self.browser.wait().await.map(|_| ()).map_err(PdfError::Io);
        self.events.abort();

        closed.and(waited)
    }
}
