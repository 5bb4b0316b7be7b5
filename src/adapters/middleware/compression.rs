//! Response compression via tower-http.
use axum::{body::Body, extract::Request, middleware::Next, response::Response};
use tower::{Layer, ServiceExt};
use tower_http::{CompressionLevel, compression::CompressionLayer};

use crate::{
    config::{
        models::{CompressionConfig, CompressionQuality},
        resolver::ConfigValue,
    },
    core::middleware::{
        BoxFuture, ConfigureError, ConfiguredState, Middleware, SurfaceMask, priority,
        typed_section,
    },
};

const NAME: &str = "compression";

/// Response compression negotiated from `Accept-Encoding`, delegating to
/// tower-http's `CompressionLayer`.
#[derive(Default)]
pub struct CompressionMiddleware {
    layer: ConfiguredState<CompressionLayer>,
}

impl CompressionMiddleware {
    pub fn new() -> Self {
        Self::default()
    }
}

fn level(quality: CompressionQuality) -> CompressionLevel {
    match quality {
        CompressionQuality::Fastest => CompressionLevel::Fastest,
        CompressionQuality::Default => CompressionLevel::Default,
        CompressionQuality::Best => CompressionLevel::Best,
    }
}

impl Middleware for CompressionMiddleware {
    fn name(&self) -> &'static str {
        NAME
    }

    fn config_key(&self) -> &'static str {
        "middleware.compression"
    }

    fn priority(&self) -> i32 {
        priority::COMPRESSION
    }

    fn surfaces(&self) -> SurfaceMask {
        SurfaceMask::PUBLIC | SurfaceMask::PROTECTED
    }

    fn configure(&self, section: Option<&ConfigValue>) -> Result<(), ConfigureError> {
        let config: CompressionConfig = typed_section(NAME, section)?;
        if !(config.gzip || config.br || config.deflate || config.zstd) {
            return Err(ConfigureError::InvalidValue {
                middleware: NAME,
                field: "gzip",
                message: "at least one encoding must be enabled".to_string(),
            });
        }
        let layer = CompressionLayer::new()
            .gzip(config.gzip)
            .br(config.br)
            .deflate(config.deflate)
            .zstd(config.zstd)
            .quality(level(config.quality));
        self.layer.set(NAME, layer)
    }

    fn handle<'a>(&'a self, req: Request, next: Next) -> BoxFuture<'a, Response> {
        let Some(layer) = self.layer.get() else {
            return Box::pin(next.run(req));
        };
        let service = layer.clone().layer(next);
        Box::pin(async move {
            match service.oneshot(req).await {
                Ok(response) => response.map(Body::new),
                Err(never) => match never {},
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{Router, http::StatusCode, routing::get};

    use super::*;
    use crate::adapters::middleware::test_support::{get as get_request, send, with_stage};

    fn routes() -> Router {
        Router::new().route("/", get(|| async { "strata ".repeat(256) }))
    }

    fn stage(config: CompressionConfig) -> CompressionMiddleware {
        let stage = CompressionMiddleware::new();
        stage
            .configure(Some(&ConfigValue::Section(Arc::new(config))))
            .unwrap();
        stage
    }

    fn accepting(encoding: &str) -> Request {
        Request::builder()
            .uri("/")
            .header("accept-encoding", encoding)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_gzip_negotiated() {
        let app = with_stage(stage(CompressionConfig::default()), routes());

        let response = send(app, accepting("gzip")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("content-encoding").unwrap(), "gzip");
    }

    #[tokio::test]
    async fn test_disabled_encoding_not_used() {
        let config = CompressionConfig {
            gzip: false,
            ..Default::default()
        };
        let app = with_stage(stage(config), routes());

        let response = send(app, accepting("gzip")).await;
        assert!(!response.headers().contains_key("content-encoding"));
    }

    #[tokio::test]
    async fn test_identity_when_not_requested() {
        let app = with_stage(stage(CompressionConfig::default()), routes());
        let response = send(app, get_request("/")).await;
        assert!(!response.headers().contains_key("content-encoding"));
    }

    #[test]
    fn test_no_encodings_fails_configure() {
        let config = CompressionConfig {
            gzip: false,
            br: false,
            deflate: false,
            zstd: false,
            ..Default::default()
        };
        let stage = CompressionMiddleware::new();
        assert!(
            stage
                .configure(Some(&ConfigValue::Section(Arc::new(config))))
                .is_err()
        );
    }
}
