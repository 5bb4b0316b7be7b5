use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use regex::Regex;

use super::error_response;
use crate::{
    config::{models::CorsConfig, resolver::ConfigValue},
    core::middleware::{
        BoxFuture, ConfigureError, ConfiguredState, Middleware, SurfaceMask, priority,
        typed_section,
    },
};

const NAME: &str = "cors";

#[derive(Debug)]
enum OriginRule {
    Any,
    Exact(String),
    /// `https://*.example.com`; the wildcard matches one or more labels
    Wildcard(Regex),
}

impl OriginRule {
    fn parse(origin: &str) -> Result<Self, ConfigureError> {
        if origin == "*" {
            return Ok(Self::Any);
        }
        if !origin.contains('*') {
            return Ok(Self::Exact(origin.to_ascii_lowercase()));
        }
        let pattern = format!(
            "^{}$",
            regex::escape(&origin.to_ascii_lowercase()).replace(r"\*", r"[a-z0-9\-]+(\.[a-z0-9\-]+)*")
        );
        Regex::new(&pattern)
            .map(Self::Wildcard)
            .map_err(|e| ConfigureError::InvalidValue {
                middleware: NAME,
                field: "allow_origins",
                message: format!("'{origin}': {e}"),
            })
    }

    fn matches(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(allowed) => allowed.eq_ignore_ascii_case(origin),
            Self::Wildcard(pattern) => pattern.is_match(&origin.to_ascii_lowercase()),
        }
    }
}

struct CorsSettings {
    origins: Vec<OriginRule>,
    allow_methods: HeaderValue,
    allow_headers: HeaderValue,
    allow_credentials: bool,
    max_age: HeaderValue,
}

impl CorsSettings {
    fn from_config(config: &CorsConfig) -> Result<Self, ConfigureError> {
        let origins = config
            .allow_origins
            .iter()
            .map(|origin| OriginRule::parse(origin))
            .collect::<Result<Vec<_>, _>>()?;

        let joined = |field: &'static str, values: &[String]| {
            HeaderValue::from_str(&values.join(", ")).map_err(|e| ConfigureError::InvalidValue {
                middleware: NAME,
                field,
                message: e.to_string(),
            })
        };

        Ok(Self {
            origins,
            allow_methods: joined("allow_methods", &config.allow_methods)?,
            allow_headers: joined("allow_headers", &config.allow_headers)?,
            allow_credentials: config.allow_credentials,
            max_age: HeaderValue::from(config.max_age_secs),
        })
    }

    fn allows(&self, origin: &str) -> bool {
        self.origins.iter().any(|rule| rule.matches(origin))
    }

    fn allow_any(&self) -> bool {
        self.origins.iter().any(|rule| matches!(rule, OriginRule::Any))
    }

    /// Origin-dependent headers shared by preflight and actual responses.
    fn apply_origin(&self, headers: &mut HeaderMap, origin: &HeaderValue) {
        let allow_origin = if self.allow_any() && !self.allow_credentials {
            HeaderValue::from_static("*")
        } else {
            origin.clone()
        };
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
        if self.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        headers.append(header::VARY, HeaderValue::from_static("origin"));
    }
}

/// Cross-origin resource sharing for browser callers.
#[derive(Default)]
pub struct CorsMiddleware {
    settings: ConfiguredState<CorsSettings>,
}

impl CorsMiddleware {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Middleware for CorsMiddleware {
    fn name(&self) -> &'static str {
        NAME
    }

    fn config_key(&self) -> &'static str {
        "middleware.cors"
    }

    fn priority(&self) -> i32 {
        priority::CORS
    }

    fn surfaces(&self) -> SurfaceMask {
        SurfaceMask::PUBLIC
    }

    fn configure(&self, section: Option<&ConfigValue>) -> Result<(), ConfigureError> {
        let config: CorsConfig = typed_section(NAME, section)?;
        self.settings.set(NAME, CorsSettings::from_config(&config)?)
    }

    fn handle<'a>(&'a self, req: Request, next: Next) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let (Some(settings), Some(origin)) =
                (self.settings.get(), req.headers().get(header::ORIGIN).cloned())
            else {
                return next.run(req).await;
            };
            let allowed = origin.to_str().is_ok_and(|origin| settings.allows(origin));

            let preflight = req.method() == Method::OPTIONS
                && req
                    .headers()
                    .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);

            if preflight {
                if !allowed {
                    tracing::debug!(origin = ?origin, "Rejected CORS preflight");
                    return error_response(StatusCode::FORBIDDEN, "Origin not allowed");
                }
                let mut response = StatusCode::NO_CONTENT.into_response();
                let headers = response.headers_mut();
                settings.apply_origin(headers, &origin);
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_METHODS,
                    settings.allow_methods.clone(),
                );
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_HEADERS,
                    settings.allow_headers.clone(),
                );
                headers.insert(header::ACCESS_CONTROL_MAX_AGE, settings.max_age.clone());
                return response;
            }

            let mut response = next.run(req).await;
            if allowed {
                settings.apply_origin(response.headers_mut(), &origin);
            }
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{Router, body::Body, routing::get};

    use super::*;
    use crate::adapters::middleware::test_support::{send, with_stage};

    fn stage(origins: &[&str], credentials: bool) -> CorsMiddleware {
        let stage = CorsMiddleware::new();
        let section = ConfigValue::Section(Arc::new(CorsConfig {
            enabled: true,
            allow_origins: origins.iter().map(|o| o.to_string()).collect(),
            allow_credentials: credentials,
            ..Default::default()
        }));
        stage.configure(Some(&section)).unwrap();
        stage
    }

    fn app(stage: CorsMiddleware) -> Router {
        with_stage(stage, Router::new().route("/", get(|| async { "ok" })))
    }

    fn request(method: Method, origin: Option<&str>, preflight: bool) -> Request {
        let mut builder = Request::builder().method(method).uri("/");
        if let Some(origin) = origin {
            builder = builder.header("origin", origin);
        }
        if preflight {
            builder = builder.header("access-control-request-method", "POST");
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_wildcard_origin_without_credentials() {
        let response = send(
            app(stage(&["*"], false)),
            request(Method::GET, Some("https://anywhere.dev"), false),
        )
        .await;
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_subdomain_pattern() {
        let cors = || stage(&["https://*.example.com"], true);

        let response = send(
            app(cors()),
            request(Method::GET, Some("https://api.eu.example.com"), false),
        )
        .await;
        let headers = response.headers();
        assert_eq!(
            headers.get("access-control-allow-origin").unwrap(),
            "https://api.eu.example.com"
        );
        assert_eq!(
            headers.get("access-control-allow-credentials").unwrap(),
            "true"
        );
        assert_eq!(headers.get("vary").unwrap(), "origin");

        let response = send(
            app(cors()),
            request(Method::GET, Some("https://example.com.evil.io"), false),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key("access-control-allow-origin"));
    }

    #[tokio::test]
    async fn test_preflight_answered_without_reaching_handler() {
        let response = send(
            app(stage(&["https://app.example.com"], false)),
            request(Method::OPTIONS, Some("https://app.example.com"), true),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let headers = response.headers();
        assert_eq!(
            headers.get("access-control-allow-methods").unwrap(),
            "GET, POST, PUT, PATCH, DELETE, OPTIONS"
        );
        assert_eq!(headers.get("access-control-max-age").unwrap(), "86400");
    }

    #[tokio::test]
    async fn test_preflight_from_unknown_origin_rejected() {
        let response = send(
            app(stage(&["https://app.example.com"], false)),
            request(Method::OPTIONS, Some("https://other.example.com"), true),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_same_origin_requests_untouched() {
        let response = send(app(stage(&["*"], false)), request(Method::GET, None, false)).await;
        assert!(!response.headers().contains_key("access-control-allow-origin"));
    }
}
