//! Per-request deadline; late requests are answered with 504.
use std::time::Duration;

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};

use super::error_response;
use crate::{
    config::{models::TimeoutConfig, resolver::ConfigValue},
    core::middleware::{
        BoxFuture, ConfigureError, ConfiguredState, Middleware, SurfaceMask, priority,
        typed_section,
    },
};

const NAME: &str = "timeout";

/// Answers 504 when the inner pipeline misses the deadline.
#[derive(Default)]
pub struct TimeoutMiddleware {
    duration: ConfiguredState<Duration>,
}

impl TimeoutMiddleware {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Middleware for TimeoutMiddleware {
    fn name(&self) -> &'static str {
        NAME
    }

    fn config_key(&self) -> &'static str {
        "middleware.timeout"
    }

    fn priority(&self) -> i32 {
        priority::TIMEOUT
    }

    fn surfaces(&self) -> SurfaceMask {
        SurfaceMask::ALL
    }

    fn configure(&self, section: Option<&ConfigValue>) -> Result<(), ConfigureError> {
        let config: TimeoutConfig = typed_section(NAME, section)?;
        let invalid = |message: String| ConfigureError::InvalidValue {
            middleware: NAME,
            field: "duration",
            message,
        };
        let duration =
            humantime::parse_duration(&config.duration).map_err(|e| invalid(e.to_string()))?;
        if duration.is_zero() {
            return Err(invalid("duration must be greater than 0".to_string()));
        }
        self.duration.set(NAME, duration)
    }

    fn handle<'a>(&'a self, req: Request, next: Next) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let Some(duration) = self.duration.get().copied() else {
                return next.run(req).await;
            };
            let path = req.uri().path().to_string();

            match tokio::time::timeout(duration, next.run(req)).await {
                Ok(response) => response,
                Err(_) => {
                    tracing::warn!(http.path = %path, ?duration, "Request timed out");
                    error_response(
                        StatusCode::GATEWAY_TIMEOUT,
                        format!(
                            "Request timed out after {}",
                            humantime::format_duration(duration)
                        ),
                    )
                }
            }
        })
    }
}
