use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::invoicing::SequenceStrategy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub pdf: PdfConfig,
    pub invoicing: InvoicingConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PdfConfig {
    pub browser_mode: BrowserMode,
    pub executable_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub font_dir: PathBuf,
    pub content_timeout_secs: u64,
    pub settle_delay_ms: u64,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

#[derive(Clone, Debug)]
pub struct InvoicingConfig {
    pub sequence_strategy: SequenceStrategy,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Where the headless browser binary comes from.
///
/// `Bundled` locates a Chromium build on the host (development); `External`
/// requires `pdf.executable_path` (production containers).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserMode {
    Bundled,
    External,
}

impl BrowserMode {
    /// Debug builds default to `Bundled`, release builds to `External`.
    pub fn build_default() -> Self {
        if cfg!(debug_assertions) {
            Self::Bundled
        } else {
            Self::External
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub browser_mode: Option<BrowserMode>,
    pub browser_executable_path: Option<PathBuf>,
    pub pdf_output_dir: Option<PathBuf>,
    pub pdf_font_dir: Option<PathBuf>,
    pub sequence_strategy: Option<SequenceStrategy>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://tenantry.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            pdf: PdfConfig {
                browser_mode: BrowserMode::build_default(),
                executable_path: None,
                output_dir: PathBuf::from("storage/documents"),
                font_dir: PathBuf::from("assets/fonts"),
                content_timeout_secs: 60,
                settle_delay_ms: 500,
                viewport_width: 1240,
                viewport_height: 1754,
            },
            invoicing: InvoicingConfig { sequence_strategy: SequenceStrategy::Scan },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for BrowserMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bundled" | "development" => Ok(Self::Bundled),
            "external" | "production" => Ok(Self::External),
            other => Err(ConfigError::Validation(format!(
                "unsupported browser mode `{other}` (expected bundled|external)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("tenantry.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(pdf) = patch.pdf {
            if let Some(browser_mode) = pdf.browser_mode {
                self.pdf.browser_mode = browser_mode;
            }
            if let Some(executable_path) = pdf.executable_path {
                self.pdf.executable_path = Some(executable_path);
            }
            if let Some(output_dir) = pdf.output_dir {
                self.pdf.output_dir = output_dir;
            }
            if let Some(font_dir) = pdf.font_dir {
                self.pdf.font_dir = font_dir;
            }
            if let Some(content_timeout_secs) = pdf.content_timeout_secs {
                self.pdf.content_timeout_secs = content_timeout_secs;
            }
            if let Some(settle_delay_ms) = pdf.settle_delay_ms {
                self.pdf.settle_delay_ms = settle_delay_ms;
            }
            if let Some(viewport_width) = pdf.viewport_width {
                self.pdf.viewport_width = viewport_width;
            }
            if let Some(viewport_height) = pdf.viewport_height {
                self.pdf.viewport_height = viewport_height;
            }
        }

        if let Some(invoicing) = patch.invoicing {
            if let Some(sequence_strategy) = invoicing.sequence_strategy {
                self.invoicing.sequence_strategy = sequence_strategy;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TENANTRY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TENANTRY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("TENANTRY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TENANTRY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("TENANTRY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TENANTRY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TENANTRY_SERVER_PORT") {
            self.server.port = parse_u16("TENANTRY_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("TENANTRY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("TENANTRY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("TENANTRY_PDF_BROWSER_MODE") {
            self.pdf.browser_mode = value.parse()?;
        }
        if let Some(value) = read_env("TENANTRY_PDF_EXECUTABLE_PATH") {
            self.pdf.executable_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("TENANTRY_PDF_OUTPUT_DIR") {
            self.pdf.output_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("TENANTRY_PDF_FONT_DIR") {
            self.pdf.font_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("TENANTRY_PDF_CONTENT_TIMEOUT_SECS") {
            self.pdf.content_timeout_secs =
                parse_u64("TENANTRY_PDF_CONTENT_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TENANTRY_PDF_SETTLE_DELAY_MS") {
            self.pdf.settle_delay_ms = parse_u64("TENANTRY_PDF_SETTLE_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("TENANTRY_INVOICING_SEQUENCE_STRATEGY") {
            self.invoicing.sequence_strategy = value.parse().map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "TENANTRY_INVOICING_SEQUENCE_STRATEGY".to_string(),
                    value: value.clone(),
                }
            })?;
        }

        let log_level =
            read_env("TENANTRY_LOGGING_LEVEL").or_else(|| read_env("TENANTRY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TENANTRY_LOGGING_FORMAT").or_else(|| read_env("TENANTRY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(browser_mode) = overrides.browser_mode {
            self.pdf.browser_mode = browser_mode;
        }
        if let Some(executable_path) = overrides.browser_executable_path {
            self.pdf.executable_path = Some(executable_path);
        }
        if let Some(output_dir) = overrides.pdf_output_dir {
            self.pdf.output_dir = output_dir;
        }
        if let Some(font_dir) = overrides.pdf_font_dir {
            self.pdf.font_dir = font_dir;
        }
        if let Some(sequence_strategy) = overrides.sequence_strategy {
            self.invoicing.sequence_strategy = sequence_strategy;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_pdf(&self.pdf)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("tenantry.toml"), PathBuf::from("config/tenantry.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

// A missing executable in external mode is reported when a render is
// attempted, not at load time, so non-rendering commands still start.
fn validate_pdf(pdf: &PdfConfig) -> Result<(), ConfigError> {
    if pdf.content_timeout_secs == 0 || pdf.content_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "pdf.content_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if pdf.settle_delay_ms > 10_000 {
        return Err(ConfigError::Validation(
            "pdf.settle_delay_ms must be at most 10000".to_string(),
        ));
    }

    if pdf.viewport_width == 0 || pdf.viewport_height == 0 {
        return Err(ConfigError::Validation(
            "pdf.viewport_width and pdf.viewport_height must be greater than zero".to_string(),
        ));
    }

    if pdf.output_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation("pdf.output_dir must not be empty".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    pdf: Option<PdfPatch>,
    invoicing: Option<InvoicingPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PdfPatch {
    browser_mode: Option<BrowserMode>,
    executable_path: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    font_dir: Option<PathBuf>,
    content_timeout_secs: Option<u64>,
    settle_delay_ms: Option<u64>,
    viewport_width: Option<u32>,
    viewport_height: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct InvoicingPatch {
    sequence_strategy: Option<SequenceStrategy>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
