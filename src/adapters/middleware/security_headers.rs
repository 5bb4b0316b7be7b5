use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue, header},
    middleware::Next,
    response::Response,
};

use crate::{
    config::{models::SecurityHeadersConfig, resolver::ConfigValue},
    core::middleware::{
        BoxFuture, ConfigureError, ConfiguredState, Middleware, SurfaceMask, priority,
        typed_section,
    },
};

const NAME: &str = "security_headers";

/// Adds hardening headers to every response. Headers already set by a
/// handler win.
#[derive(Default)]
pub struct SecurityHeadersMiddleware {
    headers: ConfiguredState<Vec<(HeaderName, HeaderValue)>>,
}

impl SecurityHeadersMiddleware {
    pub fn new() -> Self {
        Self::default()
    }
}

fn value(field: &'static str, raw: &str) -> Result<HeaderValue, ConfigureError> {
    HeaderValue::from_str(raw).map_err(|e| ConfigureError::InvalidValue {
        middleware: NAME,
        field,
        message: format!("'{raw}': {e}"),
    })
}

fn build_headers(
    config: &SecurityHeadersConfig,
) -> Result<Vec<(HeaderName, HeaderValue)>, ConfigureError> {
    let mut headers = Vec::new();

    if config.content_type_nosniff {
        headers.push((
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ));
    }
    if !config.frame_options.is_empty() {
        headers.push((
            header::X_FRAME_OPTIONS,
            value("frame_options", &config.frame_options)?,
        ));
    }
    if !config.referrer_policy.is_empty() {
        headers.push((
            header::REFERRER_POLICY,
            value("referrer_policy", &config.referrer_policy)?,
        ));
    }
    if let Some(max_age) = config.hsts_max_age {
        headers.push((
            header::STRICT_TRANSPORT_SECURITY,
            value("hsts_max_age", &format!("max-age={max_age}; includeSubDomains"))?,
        ));
    }

    // Sorted so the emitted order does not depend on map iteration
    let mut custom: Vec<_> = config.custom.iter().collect();
    custom.sort();
    for (name, raw) in custom {
        let name = HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes()).map_err(|e| {
            ConfigureError::InvalidValue {
                middleware: NAME,
                field: "custom",
                message: format!("'{name}': {e}"),
            }
        })?;
        headers.push((name, value("custom", raw)?));
    }

    Ok(headers)
}

impl Middleware for SecurityHeadersMiddleware {
    fn name(&self) -> &'static str {
        NAME
    }

    fn config_key(&self) -> &'static str {
        "middleware.security_headers"
    }

    fn priority(&self) -> i32 {
        priority::SECURITY_HEADERS
    }

    fn surfaces(&self) -> SurfaceMask {
        SurfaceMask::PUBLIC | SurfaceMask::PROTECTED
    }

    fn configure(&self, section: Option<&ConfigValue>) -> Result<(), ConfigureError> {
        let config: SecurityHeadersConfig = typed_section(NAME, section)?;
        self.headers.set(NAME, build_headers(&config)?)
    }

    fn handle<'a>(&'a self, req: Request, next: Next) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let mut response = next.run(req).await;
            if let Some(headers) = self.headers.get() {
                let target = response.headers_mut();
                for (name, value) in headers {
                    target.entry(name).or_insert_with(|| value.clone());
                }
            }
            response
        })
    }
}
