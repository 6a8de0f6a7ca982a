use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tenantry_core::config::{AppConfig, LoadOptions};
use toml::Value;

/// One reported setting: dotted key, rendered value and the env vars that can set it.
struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run(options: LoadOptions) -> String {
    let config_file_path = options.config_path.clone().or_else(detect_config_path);
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let executable = config
        .pdf
        .executable_path
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<unset>".to_string());

    vec![
        Field {
            key: "database.url",
            value: config.database.url.clone(),
            env_keys: &["TENANTRY_DATABASE_URL"],
        },
        Field {
            key: "database.max_connections",
            value: config.database.max_connections.to_string(),
            env_keys: &["TENANTRY_DATABASE_MAX_CONNECTIONS"],
        },
        Field {
            key: "database.timeout_secs",
            value: config.database.timeout_secs.to_string(),
            env_keys: &["TENANTRY_DATABASE_TIMEOUT_SECS"],
        },
        Field {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["TENANTRY_SERVER_BIND_ADDRESS"],
        },
        Field {
            key: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["TENANTRY_SERVER_PORT"],
        },
        Field {
            key: "server.graceful_shutdown_secs",
            value: config.server.graceful_shutdown_secs.to_string(),
            env_keys: &["TENANTRY_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        },
        Field {
            key: "pdf.browser_mode",
            value: format!("{:?}", config.pdf.browser_mode),
            env_keys: &["TENANTRY_PDF_BROWSER_MODE"],
        },
        Field {
            key: "pdf.executable_path",
            value: executable,
            env_keys: &["TENANTRY_PDF_EXECUTABLE_PATH"],
        },
        Field {
            key: "pdf.output_dir",
            value: config.pdf.output_dir.display().to_string(),
            env_keys: &["TENANTRY_PDF_OUTPUT_DIR"],
        },
        Field {
            key: "pdf.font_dir",
            value: config.pdf.font_dir.display().to_string(),
            env_keys: &["TENANTRY_PDF_FONT_DIR"],
        },
        Field {
            key: "pdf.content_timeout_secs",
            value: config.pdf.content_timeout_secs.to_string(),
            env_keys: &["TENANTRY_PDF_CONTENT_TIMEOUT_SECS"],
        },
        Field {
            key: "pdf.settle_delay_ms",
            value: config.pdf.settle_delay_ms.to_string(),
            env_keys: &["TENANTRY_PDF_SETTLE_DELAY_MS"],
        },
        Field {
            key: "pdf.viewport_width",
            value: config.pdf.viewport_width.to_string(),
            env_keys: &[],
        },
        Field {
            key: "pdf.viewport_height",
            value: config.pdf.viewport_height.to_string(),
            env_keys: &[],
        },
        Field {
            key: "invoicing.sequence_strategy",
            value: format!("{:?}", config.invoicing.sequence_strategy),
            env_keys: &["TENANTRY_INVOICING_SEQUENCE_STRATEGY"],
        },
        Field {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["TENANTRY_LOGGING_LEVEL", "TENANTRY_LOG_LEVEL"],
        },
        Field {
            key: "logging.format",
            value: format!("{:?}", config.logging.format),
            env_keys: &["TENANTRY_LOGGING_FORMAT", "TENANTRY_LOG_FORMAT"],
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("tenantry.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/tenantry.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(*key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
