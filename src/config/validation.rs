#![allow(clippy::collapsible_if)]

use std::{collections::HashSet, net::SocketAddr};

use eyre::Result;
use http::{HeaderName, HeaderValue, Method};
use regex::Regex;

use crate::config::models::{
    AppConfig, CorsConfig, PaginationConfig, RateLimitConfig, SecurityHeadersConfig, ServerConfig,
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Application configuration validator
pub struct AppConfigValidator;

impl AppConfigValidator {
    /// Validate the entire application configuration
    pub fn validate(config: &AppConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        errors.extend(Self::validate_server(&config.server));

        if config.logging.level.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "logging.level".to_string(),
            });
        }

        let middleware = &config.middleware;

        if middleware.request_id.header.parse::<HeaderName>().is_err() {
            errors.push(ValidationError::InvalidField {
                field: "middleware.request_id.header".to_string(),
                message: format!("'{}' is not a valid header name", middleware.request_id.header),
            });
        }

        if let Err(e) =
            Self::validate_duration("middleware.logger.slow_threshold", &middleware.logger.slow_threshold)
        {
            errors.push(e);
        }
        for path in &middleware.logger.skip_paths {
            if !path.starts_with('/') {
                errors.push(ValidationError::InvalidField {
                    field: "middleware.logger.skip_paths".to_string(),
                    message: format!("Path '{path}' must start with '/'"),
                });
            }
        }

        if let Err(e) = Self::validate_duration("middleware.timeout.duration", &middleware.timeout.duration)
        {
            errors.push(e);
        }

        errors.extend(Self::validate_security_headers(&middleware.security_headers));

        if middleware.cors.enabled {
            errors.extend(Self::validate_cors(&middleware.cors));
        }

        if middleware.rate_limit.enabled {
            errors.extend(Self::validate_rate_limit(&middleware.rate_limit));
        }

        if middleware.auth.enabled {
            if middleware.auth.client.trim().is_empty() {
                errors.push(ValidationError::MissingField {
                    field: "middleware.auth.client".to_string(),
                });
            }
            if middleware.auth.header.parse::<HeaderName>().is_err() {
                errors.push(ValidationError::InvalidField {
                    field: "middleware.auth.header".to_string(),
                    message: format!("'{}' is not a valid header name", middleware.auth.header),
                });
            }
        }

        errors.extend(Self::validate_pagination(&middleware.pagination));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    fn validate_server(server: &ServerConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for (field, address) in [
            ("server.public_addr", &server.public_addr),
            ("server.protected_addr", &server.protected_addr),
            ("server.hidden_addr", &server.hidden_addr),
        ] {
            match Self::validate_listen_address(address) {
                Ok(addr) => {
                    // Port 0 asks the OS for a free port, so it never collides
                    if addr.port() != 0 && !seen.insert(addr) {
                        errors.push(ValidationError::InvalidField {
                            field: field.to_string(),
                            message: format!("Address {addr} is already used by another surface"),
                        });
                    }
                }
                Err(e) => errors.push(e),
            }
        }

        if let Err(e) = Self::validate_duration("server.shutdown_timeout", &server.shutdown_timeout) {
            errors.push(e);
        }

        errors
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<SocketAddr> {
        address
            .parse::<SocketAddr>()
            .map_err(|_| ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            })
    }

    /// Validate a humantime duration such as "30s" or "500ms"
    fn validate_duration(field: &str, value: &str) -> ValidationResult<()> {
        match humantime::parse_duration(value) {
            Ok(duration) if duration.is_zero() => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: "Duration must be greater than 0".to_string(),
            }),
            Ok(_) => Ok(()),
            Err(e) => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("Invalid duration '{value}': {e}"),
            }),
        }
    }

    fn validate_security_headers(config: &SecurityHeadersConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (field, value) in [
            ("middleware.security_headers.frame_options", &config.frame_options),
            ("middleware.security_headers.referrer_policy", &config.referrer_policy),
        ] {
            if HeaderValue::from_str(value).is_err() {
                errors.push(ValidationError::InvalidField {
                    field: field.to_string(),
                    message: format!("'{value}' is not a valid header value"),
                });
            }
        }

        for (name, value) in &config.custom {
            if name.parse::<HeaderName>().is_err() || HeaderValue::from_str(value).is_err() {
                errors.push(ValidationError::InvalidField {
                    field: format!("middleware.security_headers.custom.{name}"),
                    message: "Invalid header name or value".to_string(),
                });
            }
        }

        errors
    }

    fn validate_cors(config: &CorsConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if config.allow_origins.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "middleware.cors.allow_origins".to_string(),
            });
        }

        let origin_regex =
            Regex::new(r"^(\*|https?://(\*\.)?[a-zA-Z0-9.\-]+(:\d+)?)$").expect("invalid origin regex");
        for origin in &config.allow_origins {
            if !origin_regex.is_match(origin) {
                errors.push(ValidationError::InvalidField {
                    field: "middleware.cors.allow_origins".to_string(),
                    message: format!(
                        "Origin '{origin}' must be '*' or 'scheme://host[:port]' with an optional '*.' subdomain wildcard"
                    ),
                });
            }
        }

        if config.allow_credentials && config.allow_origins.iter().any(|o| o == "*") {
            errors.push(ValidationError::InvalidField {
                field: "middleware.cors.allow_credentials".to_string(),
                message: "Credentials cannot be allowed together with the '*' origin".to_string(),
            });
        }

        for method in &config.allow_methods {
            if method.parse::<Method>().is_err() {
                errors.push(ValidationError::InvalidField {
                    field: "middleware.cors.allow_methods".to_string(),
                    message: format!("'{method}' is not a valid HTTP method"),
                });
            }
        }

        for header in &config.allow_headers {
            if header.parse::<HeaderName>().is_err() {
                errors.push(ValidationError::InvalidField {
                    field: "middleware.cors.allow_headers".to_string(),
                    message: format!("'{header}' is not a valid header name"),
                });
            }
        }

        errors
    }

    /// Validate rate limit configuration
    fn validate_rate_limit(config: &RateLimitConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if config.requests == 0 {
            errors.push(ValidationError::InvalidField {
                field: "middleware.rate_limit.requests".to_string(),
                message: "Rate limit requests must be greater than 0".to_string(),
            });
        }

        if let Err(e) = Self::validate_duration("middleware.rate_limit.period", &config.period) {
            errors.push(e);
        }

        if !(400..=599).contains(&config.status_code) {
            errors.push(ValidationError::InvalidField {
                field: "middleware.rate_limit.status_code".to_string(),
                message: format!("Status code {} is not an error status", config.status_code),
            });
        }

        errors
    }

    fn validate_pagination(config: &PaginationConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if config.max_per_page == 0 {
            errors.push(ValidationError::InvalidField {
                field: "middleware.pagination.max_per_page".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if config.default_per_page == 0 || config.default_per_page > config.max_per_page {
            errors.push(ValidationError::InvalidField {
                field: "middleware.pagination.default_per_page".to_string(),
                message: format!(
                    "Must be between 1 and max_per_page ({})",
                    config.max_per_page
                ),
            });
        }

        errors
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(config: &AppConfig) -> String {
        match AppConfigValidator::validate(config) {
            Err(ValidationError::ValidationFailed { message }) => message,
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(AppConfigValidator::validate(&AppConfig::default()).is_ok());
    }

    #[test]
    fn validate_rejects_bad_listen_address() {
        let mut config = AppConfig::default();
        config.server.public_addr = "localhost".to_string();

        assert!(message(&config).contains("Invalid listen address 'localhost'"));
    }

    #[test]
    fn validate_rejects_shared_surface_addresses() {
        let mut config = AppConfig::default();
        config.server.protected_addr = config.server.public_addr.clone();

        assert!(message(&config).contains("server.protected_addr"));
    }

    #[test]
    fn validate_allows_ephemeral_ports_on_every_surface() {
        let mut config = AppConfig::default();
        config.server.public_addr = "127.0.0.1:0".to_string();
        config.server.protected_addr = "127.0.0.1:0".to_string();
        config.server.hidden_addr = "127.0.0.1:0".to_string();

        assert!(AppConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn validate_rejects_bad_durations() {
        let mut config = AppConfig::default();
        config.middleware.timeout.duration = "soon".to_string();
        config.middleware.logger.slow_threshold = "0s".to_string();

        let message = message(&config);
        assert!(message.contains("Found 2 validation errors"));
        assert!(message.contains("middleware.timeout.duration"));
        assert!(message.contains("middleware.logger.slow_threshold"));
    }

    #[test]
    fn validate_rejects_zero_rate_limit_only_when_enabled() {
        let mut config = AppConfig::default();
        config.middleware.rate_limit.requests = 0;
        assert!(AppConfigValidator::validate(&config).is_ok());

        config.middleware.rate_limit.enabled = true;
        assert!(message(&config).contains("middleware.rate_limit.requests"));
    }

    #[test]
    fn validate_rejects_pagination_bounds() {
        let mut config = AppConfig::default();
        config.middleware.pagination.default_per_page = 500;

        assert!(message(&config).contains("middleware.pagination.default_per_page"));
    }

    #[test]
    fn validate_cors_origins() {
        let mut config = AppConfig::default();
        config.middleware.cors.enabled = true;
        config.middleware.cors.allow_origins = vec![
            "https://*.example.com".to_string(),
            "http://localhost:3000".to_string(),
        ];
        assert!(AppConfigValidator::validate(&config).is_ok());

        config.middleware.cors.allow_origins = vec!["example.com".to_string()];
        assert!(message(&config).contains("Origin 'example.com'"));

        config.middleware.cors.allow_origins = vec![];
        assert!(message(&config).contains("middleware.cors.allow_origins"));
    }

    #[test]
    fn validate_rejects_wildcard_with_credentials() {
        let mut config = AppConfig::default();
        config.middleware.cors.enabled = true;
        config.middleware.cors.allow_credentials = true;

        assert!(message(&config).contains("middleware.cors.allow_credentials"));
    }
}
