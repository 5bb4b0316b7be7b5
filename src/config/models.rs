//! Configuration data structures for strata.
//!
//! These types map directly to YAML (also JSON / TOML) configuration files and
//! to `STRATA__...` environment overrides. Every field has a default so that a
//! minimal file stays short. Each built-in middleware owns one section under
//! `middleware`, and every such section declares the `enabled` /
//! `disable_in_dev_mode` toggles the orchestrator checks.
use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::config::resolver::{BaseToggles, ConfigPaths, ConfigRoot, ConfigSection, ConfigValue};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Development mode; middleware with `disable_in_dev_mode` are skipped.
    pub dev_mode: bool,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub clients: ClientsConfig,
    pub middleware: MiddlewareConfig,
}

/// Listener addresses for the three exposure surfaces.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub public_addr: String,
    pub protected_addr: String,
    pub hidden_addr: String,
    /// Maximum time to drain connections on shutdown (e.g. "30s")
    pub shutdown_timeout: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            public_addr: "0.0.0.0:8080".to_string(),
            protected_addr: "0.0.0.0:8081".to_string(),
            hidden_addr: "127.0.0.1:8082".to_string(),
            shutdown_timeout: "30s".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. "info" or "strata=debug,tower_http=warn"
    pub level: String,
    /// JSON output; ignored (pretty output) in dev mode
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ClientsConfig {
    pub identity: Option<IdentityClientConfig>,
}

/// Static token table backing the built-in identity client.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct IdentityClientConfig {
    pub tokens: HashMap<String, PrincipalConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PrincipalConfig {
    pub subject: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MiddlewareConfig {
    pub recovery: RecoveryConfig,
    pub request_id: RequestIdConfig,
    pub logger: LoggerConfig,
    pub timeout: TimeoutConfig,
    pub security_headers: SecurityHeadersConfig,
    pub cors: CorsConfig,
    pub rate_limit: RateLimitConfig,
    pub compression: CompressionConfig,
    pub auth: AuthConfig,
    pub pagination: PaginationConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RecoveryConfig {
    pub enabled: bool,
    pub disable_in_dev_mode: bool,
    /// Include the panic message in the response body
    pub expose_panic_message: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            disable_in_dev_mode: false,
            expose_panic_message: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RequestIdConfig {
    pub enabled: bool,
    pub disable_in_dev_mode: bool,
    pub header: String,
}

impl Default for RequestIdConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            disable_in_dev_mode: false,
            header: "x-request-id".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggerConfig {
    pub enabled: bool,
    pub disable_in_dev_mode: bool,
    /// Requests slower than this are logged at WARN (e.g. "1s")
    pub slow_threshold: String,
    /// Paths that are never logged (e.g. "/health")
    pub skip_paths: Vec<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            disable_in_dev_mode: false,
            slow_threshold: "1s".to_string(),
            skip_paths: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TimeoutConfig {
    pub enabled: bool,
    pub disable_in_dev_mode: bool,
    /// Request deadline (e.g. "30s", "500ms")
    pub duration: String,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            disable_in_dev_mode: true,
            duration: "30s".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SecurityHeadersConfig {
    pub enabled: bool,
    pub disable_in_dev_mode: bool,
    pub content_type_nosniff: bool,
    pub frame_options: String,
    pub referrer_policy: String,
    /// Strict-Transport-Security max-age in seconds; `None` omits the header
    pub hsts_max_age: Option<u64>,
    /// Extra headers to set on every response
    pub custom: HashMap<String, String>,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            disable_in_dev_mode: false,
            content_type_nosniff: true,
            frame_options: "DENY".to_string(),
            referrer_policy: "strict-origin-when-cross-origin".to_string(),
            hsts_max_age: None,
            custom: HashMap::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    pub disable_in_dev_mode: bool,
    /// Allowed origins; "*" allows any, "https://*.example.com" allows subdomains
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            disable_in_dev_mode: false,
            allow_origins: vec!["*".to_string()],
            allow_methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
                .into_iter()
                .map(String::from)
                .collect(),
            allow_headers: ["Content-Type", "Authorization", "X-Request-ID"]
                .into_iter()
                .map(String::from)
                .collect(),
            allow_credentials: false,
            max_age_secs: 86_400,
        }
    }
}

/// What a rate limit is keyed by.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitBy {
    /// One bucket shared by every caller
    Global,
    /// One bucket per client IP
    #[default]
    Ip,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub disable_in_dev_mode: bool,
    pub by: RateLimitBy,
    /// Requests allowed per `period`
    pub requests: u64,
    /// Window length (e.g. "1s", "1m")
    pub period: String,
    pub status_code: u16,
    pub message: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            disable_in_dev_mode: true,
            by: RateLimitBy::Ip,
            requests: 100,
            period: "1s".to_string(),
            status_code: 429,
            message: "Too Many Requests".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompressionQuality {
    Fastest,
    #[default]
    Default,
    Best,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub disable_in_dev_mode: bool,
    pub gzip: bool,
    pub br: bool,
    pub deflate: bool,
    pub zstd: bool,
    pub quality: CompressionQuality,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            disable_in_dev_mode: false,
            gzip: true,
            br: true,
            deflate: true,
            zstd: true,
            quality: CompressionQuality::Default,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub disable_in_dev_mode: bool,
    /// Name of the identity client in the client registry
    pub client: String,
    pub header: String,
    pub scheme: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            disable_in_dev_mode: false,
            client: "identity".to_string(),
            header: "authorization".to_string(),
            scheme: "Bearer".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PaginationConfig {
    pub enabled: bool,
    pub disable_in_dev_mode: bool,
    pub default_per_page: u32,
    pub max_per_page: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            disable_in_dev_mode: false,
            default_per_page: 20,
            max_per_page: 100,
        }
    }
}

/// Sections that declare the `enabled` / `disable_in_dev_mode` toggles.
macro_rules! toggled_sections {
    ($($section:ty),+ $(,)?) => {
        $(
            impl ConfigSection for $section {
                fn base_toggles(&self) -> BaseToggles {
                    BaseToggles::declared(self.enabled, self.disable_in_dev_mode)
                }
            }
        )+
    };
}

toggled_sections!(
    RecoveryConfig,
    RequestIdConfig,
    LoggerConfig,
    TimeoutConfig,
    SecurityHeadersConfig,
    CorsConfig,
    RateLimitConfig,
    CompressionConfig,
    AuthConfig,
    PaginationConfig,
);

impl ConfigSection for ServerConfig {}
impl ConfigSection for LoggingConfig {}
impl ConfigSection for ClientsConfig {}
impl ConfigSection for IdentityClientConfig {}
impl ConfigSection for MiddlewareConfig {}

static APP_CONFIG_PATHS: Lazy<ConfigPaths<AppConfig>> = Lazy::new(|| {
    ConfigPaths::new()
        .scalar("dev_mode", |c: &AppConfig| ConfigValue::Bool(c.dev_mode))
        .section("server", |c: &AppConfig| &c.server)
        .scalar("server.public_addr", |c: &AppConfig| {
            ConfigValue::Str(c.server.public_addr.clone())
        })
        .scalar("server.protected_addr", |c: &AppConfig| {
            ConfigValue::Str(c.server.protected_addr.clone())
        })
        .scalar("server.hidden_addr", |c: &AppConfig| {
            ConfigValue::Str(c.server.hidden_addr.clone())
        })
        .scalar("server.shutdown_timeout", |c: &AppConfig| {
            ConfigValue::Str(c.server.shutdown_timeout.clone())
        })
        .section("logging", |c: &AppConfig| &c.logging)
        .scalar("logging.level", |c: &AppConfig| {
            ConfigValue::Str(c.logging.level.clone())
        })
        .scalar("logging.json", |c: &AppConfig| ConfigValue::Bool(c.logging.json))
        .section("clients", |c: &AppConfig| &c.clients)
        .optional_section("clients.identity", |c: &AppConfig| c.clients.identity.as_ref())
        .section("middleware", |c: &AppConfig| &c.middleware)
        .section("middleware.recovery", |c: &AppConfig| &c.middleware.recovery)
        .section("middleware.request_id", |c: &AppConfig| &c.middleware.request_id)
        .section("middleware.logger", |c: &AppConfig| &c.middleware.logger)
        .section("middleware.timeout", |c: &AppConfig| &c.middleware.timeout)
        .section("middleware.security_headers", |c: &AppConfig| {
            &c.middleware.security_headers
        })
        .section("middleware.cors", |c: &AppConfig| &c.middleware.cors)
        .section("middleware.rate_limit", |c: &AppConfig| &c.middleware.rate_limit)
        .section("middleware.compression", |c: &AppConfig| &c.middleware.compression)
        .section("middleware.auth", |c: &AppConfig| &c.middleware.auth)
        .section("middleware.pagination", |c: &AppConfig| &c.middleware.pagination)
});

impl ConfigRoot for AppConfig {
    fn config_paths() -> &'static ConfigPaths<Self> {
        &APP_CONFIG_PATHS
    }

    fn dev_mode(&self) -> bool {
        self.dev_mode
    }
}

impl AppConfig {
    /// Identity client settings, if any are configured.
    pub fn identity_client(&self) -> Option<&IdentityClientConfig> {
        self.clients.identity.as_ref()
    }
}
