use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::models::LoggingConfig;

/// Initialize tracing with custom configuration.
///
/// `RUST_LOG`, when set, takes precedence over `level`.
pub fn init_tracing_with_config(level: &str, json_format: bool, include_spans: bool) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}"))?,
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json_format {
        Registry::default()
            .with(env_filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(include_spans)
                    .with_span_list(include_spans),
            )
            .try_init()
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .try_init()
    }
    .wrap_err("Failed to install tracing subscriber")?;

    tracing::info!(
        level = %level,
        json = json_format,
        spans = include_spans,
        "Strata logging initialized"
    );
    Ok(())
}

/// Initialize tracing from the `logging` section. Dev mode always uses the
/// pretty console format.
pub fn init_from_config(logging: &LoggingConfig, dev_mode: bool) -> Result<()> {
    init_tracing_with_config(&logging.level, logging.json && !dev_mode, true)
}

/// Configure tracing for specific service components
pub fn configure_component_tracing(component: &str) -> tracing::Span {
    tracing::info_span!("component", name = component)
}

/// Create a request-scoped tracing span
pub fn create_request_span(method: &str, path: &str, request_id: &str) -> tracing::Span {
    tracing::info_span!(
        "request",
        http.method = method,
        http.path = path,
        request.id = request_id,
        http.status_code = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails_instead_of_panicking() {
        let _ = init_tracing_with_config("debug", true, true);
        assert!(init_tracing_with_config("debug", false, false).is_err());
    }

    #[test]
    fn test_create_request_span() {
        let span = create_request_span("GET", "/api/test", "req-123");
        if let Some(metadata) = span.metadata() {
            assert_eq!(metadata.name(), "request");
        }
    }

    #[test]
    fn test_configure_component_tracing() {
        let span = configure_component_tracing("orchestrator");
        if let Some(metadata) = span.metadata() {
            assert_eq!(metadata.name(), "component");
        }
    }
}
