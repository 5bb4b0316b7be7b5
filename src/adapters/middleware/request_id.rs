use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::{
    config::{models::RequestIdConfig, resolver::ConfigValue},
    core::middleware::{
        BoxFuture, ConfigureError, ConfiguredState, Middleware, SurfaceMask, priority,
        typed_section,
    },
};

const NAME: &str = "request_id";
const MAX_INCOMING_LEN: usize = 128;

/// Correlation id of the current request, available as a request extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Propagates the caller's request id or generates a UUID v4, and echoes it on
/// the response.
#[derive(Default)]
pub struct RequestIdMiddleware {
    header: ConfiguredState<HeaderName>,
}

impl RequestIdMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    fn header(&self) -> HeaderName {
        self.header
            .get()
            .cloned()
            .unwrap_or_else(|| HeaderName::from_static("x-request-id"))
    }
}

impl Middleware for RequestIdMiddleware {
    fn name(&self) -> &'static str {
        NAME
    }

    fn config_key(&self) -> &'static str {
        "middleware.request_id"
    }

    fn priority(&self) -> i32 {
        priority::REQUEST_ID
    }

    fn surfaces(&self) -> SurfaceMask {
        SurfaceMask::ALL
    }

    fn configure(&self, section: Option<&ConfigValue>) -> Result<(), ConfigureError> {
        let config: RequestIdConfig = typed_section(NAME, section)?;
        let header = HeaderName::from_bytes(config.header.to_ascii_lowercase().as_bytes())
            .map_err(|e| ConfigureError::InvalidValue {
                middleware: NAME,
                field: "header",
                message: e.to_string(),
            })?;
        self.header.set(NAME, header)
    }

    fn handle<'a>(&'a self, mut req: Request, next: Next) -> BoxFuture<'a, Response> {
        let header = self.header();

        let incoming = req
            .headers()
            .get(&header)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty() && value.len() <= MAX_INCOMING_LEN)
            .map(str::to_string);

        let request_id = match incoming {
            Some(id) => id,
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                if let Ok(value) = HeaderValue::from_str(&id) {
                    req.headers_mut().insert(header.clone(), value);
                }
                id
            }
        };
        req.extensions_mut().insert(RequestId(request_id.clone()));

        Box::pin(async move {
            let mut response = next.run(req).await;
            if let Ok(value) = HeaderValue::from_str(&request_id) {
                response.headers_mut().insert(header, value);
            }
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::{Extension, Router, body::Body, routing::get};

    use super::*;
    use crate::adapters::middleware::test_support::{get as get_request, send, with_stage};

    fn routes() -> Router {
        Router::new().route(
            "/",
            get(|Extension(id): Extension<RequestId>| async move { id.0 }),
        )
    }

    #[tokio::test]
    async fn test_generates_uuid_when_absent() {
        let stage = RequestIdMiddleware::new();
        stage.configure(None).unwrap();
        let app = with_stage(stage, routes());

        let response = send(app, get_request("/")).await;
        let request_id = response.headers().get("x-request-id").unwrap().to_str().unwrap();
        assert!(uuid::Uuid::parse_str(request_id).is_ok());
    }

    #[tokio::test]
    async fn test_propagates_incoming_id() {
        let stage = RequestIdMiddleware::new();
        stage.configure(None).unwrap();
        let app = with_stage(stage, routes());

        let request = Request::builder()
            .uri("/")
            .header("x-request-id", "abc-123")
            .body(Body::empty())
            .unwrap();
        let response = send(app, request).await;
        assert_eq!(response.headers().get("x-request-id").unwrap(), "abc-123");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"abc-123");
    }

    #[tokio::test]
    async fn test_custom_header_name() {
        let stage = RequestIdMiddleware::new();
        let section = ConfigValue::Section(std::sync::Arc::new(RequestIdConfig {
            header: "X-Correlation-ID".to_string(),
            ..Default::default()
        }));
        stage.configure(Some(&section)).unwrap();
        let app = with_stage(stage, routes());

        let response = send(app, get_request("/")).await;
        assert!(response.headers().contains_key("x-correlation-id"));
        assert!(!response.headers().contains_key("x-request-id"));
    }

    #[test]
    fn test_invalid_header_name_fails_configure() {
        let stage = RequestIdMiddleware::new();
        let section = ConfigValue::Section(std::sync::Arc::new(RequestIdConfig {
            header: "bad header".to_string(),
            ..Default::default()
        }));
        assert!(matches!(
            stage.configure(Some(&section)),
            Err(ConfigureError::InvalidValue {
                field: "header",
                ..
            })
        ));
    }
}
