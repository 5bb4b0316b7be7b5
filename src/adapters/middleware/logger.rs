use std::{
    collections::HashSet,
    time::{Duration, Instant},
};

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::Instrument;

use super::request_id::RequestId;
use crate::{
    config::{models::LoggerConfig, resolver::ConfigValue},
    core::middleware::{
        BoxFuture, ConfigureError, ConfiguredState, Middleware, SurfaceMask, priority,
        typed_section,
    },
    tracing_setup::create_request_span,
};

const NAME: &str = "logger";

struct LoggerSettings {
    slow_threshold: Duration,
    skip_paths: HashSet<String>,
}

/// Access log: one event per request inside a request span.
#[derive(Default)]
pub struct LoggerMiddleware {
    settings: ConfiguredState<LoggerSettings>,
}

impl LoggerMiddleware {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Middleware for LoggerMiddleware {
    fn name(&self) -> &'static str {
        NAME
    }

    fn config_key(&self) -> &'static str {
        "middleware.logger"
    }

    fn priority(&self) -> i32 {
        priority::LOGGER
    }

    fn surfaces(&self) -> SurfaceMask {
        SurfaceMask::ALL
    }

    fn configure(&self, section: Option<&ConfigValue>) -> Result<(), ConfigureError> {
        let config: LoggerConfig = typed_section(NAME, section)?;
        let slow_threshold = humantime::parse_duration(&config.slow_threshold).map_err(|e| {
            ConfigureError::InvalidValue {
                middleware: NAME,
                field: "slow_threshold",
                message: e.to_string(),
            }
        })?;
        self.settings.set(
            NAME,
            LoggerSettings {
                slow_threshold,
                skip_paths: config.skip_paths.into_iter().collect(),
            },
        )
    }

    fn handle<'a>(&'a self, req: Request, next: Next) -> BoxFuture<'a, Response> {
        let path = req.uri().path().to_string();
        let skip = self
            .settings
            .get()
            .is_some_and(|settings| settings.skip_paths.contains(&path));
        if skip {
            return Box::pin(next.run(req));
        }

        let method = req.method().clone();
        let version = req.version();
        let request_id = req
            .extensions()
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .unwrap_or_default();
        let span = create_request_span(method.as_str(), &path, &request_id);
        let slow_threshold = self.settings.get().map(|settings| settings.slow_threshold);

        let recorder = span.clone();
        Box::pin(
            async move {
                let start = Instant::now();
                tracing::debug!(?version, "Started processing request");

                let response = next.run(req).await;
                let elapsed = start.elapsed();
                let status = response.status().as_u16();
                recorder.record("http.status_code", status);
                recorder.record("duration_ms", elapsed.as_millis() as u64);

                if slow_threshold.is_some_and(|threshold| elapsed >= threshold) {
                    tracing::warn!(status, ?elapsed, "Slow request {} {}", method, path);
                } else {
                    tracing::info!(status, ?elapsed, "Completed {} {}", method, path);
                }
                response
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{Router, http::StatusCode, routing::get};

    use super::*;
    use crate::adapters::middleware::test_support::{get as get_request, send, with_stage};

    #[tokio::test]
    async fn test_logged_request_passes_through() {
        let stage = LoggerMiddleware::new();
        stage.configure(None).unwrap();
        let app = with_stage(stage, Router::new().route("/", get(|| async { "hi" })));

        let response = send(app, get_request("/")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_skipped_path_still_served() {
        let stage = LoggerMiddleware::new();
        let section = ConfigValue::Section(Arc::new(LoggerConfig {
            skip_paths: vec!["/health".to_string()],
            ..Default::default()
        }));
        stage.configure(Some(&section)).unwrap();
        assert!(stage.settings.get().unwrap().skip_paths.contains("/health"));

        let app = with_stage(stage, Router::new().route("/health", get(|| async { "ok" })));
        let response = send(app, get_request("/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_invalid_threshold_fails_configure() {
        let stage = LoggerMiddleware::new();
        let section = ConfigValue::Section(Arc::new(LoggerConfig {
            slow_threshold: "whenever".to_string(),
            ..Default::default()
        }));
        assert!(matches!(
            stage.configure(Some(&section)),
            Err(ConfigureError::InvalidValue {
                field: "slow_threshold",
                ..
            })
        ));
    }
}
