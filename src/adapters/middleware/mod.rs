//! Built-in middleware catalog.
//!
//! Each stage implements [`Middleware`](crate::core::middleware::Middleware)
//! over axum's `Request`/`Next`, owns one `middleware.<name>` configuration
//! section and keeps its configured state in a write-once cell.
use std::sync::Arc;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::core::{clients::ClientRegistry, middleware_registry::MiddlewareRegistry};

pub mod auth;
pub mod compression;
pub mod cors;
pub mod logger;
pub mod pagination;
pub mod rate_limit;
pub mod recovery;
pub mod request_id;
pub mod security_headers;
pub mod timeout;

pub use auth::AuthMiddleware;
pub use compression::CompressionMiddleware;
pub use cors::CorsMiddleware;
pub use logger::LoggerMiddleware;
pub use pagination::{Pagination, PaginationMiddleware};
pub use rate_limit::RateLimitMiddleware;
pub use recovery::RecoveryMiddleware;
pub use request_id::{RequestId, RequestIdMiddleware};
pub use security_headers::SecurityHeadersMiddleware;
pub use timeout::TimeoutMiddleware;

/// JSON error body shared by every built-in: `{"error": {"status", "message"}}`.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({
        "error": {
            "status": status.as_u16(),
            "message": message.into(),
        }
    });
    (status, Json(body)).into_response()
}

/// Register the whole built-in catalog. `auth` resolves its identity client
/// from `clients` at configure time.
pub fn register_builtin(registry: &MiddlewareRegistry, clients: Arc<ClientRegistry>) {
    registry.register(Arc::new(RecoveryMiddleware::new()));
    registry.register(Arc::new(RequestIdMiddleware::new()));
    registry.register(Arc::new(LoggerMiddleware::new()));
    registry.register(Arc::new(TimeoutMiddleware::new()));
    registry.register(Arc::new(SecurityHeadersMiddleware::new()));
    registry.register(Arc::new(CorsMiddleware::new()));
    registry.register(Arc::new(RateLimitMiddleware::new()));
    registry.register(Arc::new(CompressionMiddleware::new()));
    registry.register(Arc::new(AuthMiddleware::new(clients)));
    registry.register(Arc::new(PaginationMiddleware::new()));
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::{Router, body::Body, extract::Request, response::Response};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::{
        adapters::surface_router::SurfaceRouter,
        core::middleware::{Middleware, Surface},
        ports::pipeline::StagePipeline,
    };

    /// Wrap `routes` in a single configured stage.
    pub fn with_stage<M: Middleware>(stage: M, routes: Router) -> Router {
        let mut pipeline = SurfaceRouter::new(Surface::Public, routes);
        pipeline.register_stage(std::sync::Arc::new(stage));
        pipeline.into_router()
    }

    pub async fn send(app: Router, request: Request) -> Response {
        app.oneshot(request).await.unwrap()
    }

    pub fn get(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    pub async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }
}
