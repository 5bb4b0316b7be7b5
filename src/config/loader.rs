use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::AppConfig;

/// Prefix for environment overrides, e.g. `STRATA__MIDDLEWARE__TIMEOUT__DURATION=5s`.
pub const ENV_PREFIX: &str = "STRATA";

/// Load configuration from a file plus `STRATA__*` environment overrides.
/// Supports YAML (default), JSON, TOML and INI by extension.
pub async fn load_config(config_path: &str) -> Result<AppConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously
pub fn load_config_sync(config_path: &str) -> Result<AppConfig> {
    let path = Path::new(config_path);
    let file = path
        .to_str()
        .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", path.display()))?;

    let settings = Config::builder()
        .add_source(File::new(file, format_for(path)))
        .add_source(environment())
        .build()
        .with_context(|| format!("Failed to build config from {}", path.display()))?;

    settings
        .try_deserialize()
        .with_context(|| format!("Failed to deserialize config from {}", path.display()))
}

/// Load configuration from an in-memory document (no environment overrides).
pub fn load_config_from_str(content: &str, format: FileFormat) -> Result<AppConfig> {
    Config::builder()
        .add_source(File::from_str(content, format))
        .build()
        .wrap_err("Failed to build config from string")?
        .try_deserialize()
        .wrap_err("Failed to deserialize config from string")
}

fn format_for(path: &Path) -> FileFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Yaml,
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

/// Default configuration written by `strata init`.
pub const DEFAULT_CONFIG_YAML: &str = r#"# strata service configuration

dev_mode: false

server:
  public_addr: "0.0.0.0:8080"
  protected_addr: "0.0.0.0:8081"
  hidden_addr: "127.0.0.1:8082"
  shutdown_timeout: "30s"

logging:
  level: "info"
  json: true

clients:
  identity:
    tokens:
      change-me:
        subject: "admin"
        roles: ["admin"]

middleware:
  recovery:
    enabled: true
  request_id:
    enabled: true
    header: "x-request-id"
  logger:
    enabled: true
    slow_threshold: "1s"
    skip_paths: ["/health"]
  timeout:
    enabled: true
    disable_in_dev_mode: true
    duration: "30s"
  security_headers:
    enabled: true
    frame_options: "DENY"
  cors:
    enabled: false
    allow_origins: ["*"]
  rate_limit:
    enabled: false
    disable_in_dev_mode: true
    by: "ip"
    requests: 100
    period: "1s"
  compression:
    enabled: true
    quality: "default"
  auth:
    enabled: true
    client: "identity"
  pagination:
    enabled: true
    default_per_page: 20
    max_per_page: 100
"#;
