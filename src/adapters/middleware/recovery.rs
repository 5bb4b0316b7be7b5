//! Panic recovery for handlers and inner stages.
use std::{any::Any, panic::AssertUnwindSafe};

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use futures_util::FutureExt;

use super::error_response;
use crate::{
    config::{models::RecoveryConfig, resolver::ConfigValue},
    core::middleware::{
        BoxFuture, ConfigureError, ConfiguredState, Middleware, SurfaceMask, priority,
        typed_section,
    },
};

const NAME: &str = "recovery";

/// Turns a panicking handler into a 500 response instead of a dropped
/// connection.
#[derive(Default)]
pub struct RecoveryMiddleware {
    expose_panic_message: ConfiguredState<bool>,
}

impl RecoveryMiddleware {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Middleware for RecoveryMiddleware {
    fn name(&self) -> &'static str {
        NAME
    }

    fn config_key(&self) -> &'static str {
        "middleware.recovery"
    }

    fn priority(&self) -> i32 {
        priority::RECOVERY
    }

    fn surfaces(&self) -> SurfaceMask {
        SurfaceMask::ALL
    }

    fn configure(&self, section: Option<&ConfigValue>) -> Result<(), ConfigureError> {
        let config: RecoveryConfig = typed_section(NAME, section)?;
        self.expose_panic_message
            .set(NAME, config.expose_panic_message)
    }

    fn handle<'a>(&'a self, req: Request, next: Next) -> BoxFuture<'a, Response> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        Box::pin(async move {
            match AssertUnwindSafe(next.run(req)).catch_unwind().await {
                Ok(response) => response,
                Err(panic) => {
                    let message = panic_message(&*panic);
                    tracing::error!(
                        http.method = %method,
                        http.path = %path,
                        panic = %message,
                        "Request handler panicked"
                    );
                    let expose = self.expose_panic_message.get().copied().unwrap_or(false);
                    let body = if expose {
                        message
                    } else {
                        "Internal Server Error".to_string()
                    };
                    error_response(StatusCode::INTERNAL_SERVER_ERROR, body)
                }
            }
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
