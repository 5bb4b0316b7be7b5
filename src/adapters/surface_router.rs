//! Axum adapter for the [`StagePipeline`] port.
//!
//! A [`SurfaceRouter`] collects the stages the orchestrator registers for one
//! surface and, once routes are in place, folds them onto the router as
//! `axum::middleware::from_fn` layers. Stages are layered in reverse so the
//! first registered stage is the outermost and sees the request first.
use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    middleware::{Next, from_fn},
};

use crate::{
    core::middleware::{Middleware, Surface},
    ports::pipeline::StagePipeline,
};

pub struct SurfaceRouter {
    surface: Surface,
    router: Router,
    stages: Vec<Arc<dyn Middleware>>,
}

impl SurfaceRouter {
    pub fn new(surface: Surface, router: Router) -> Self {
        Self {
            surface,
            router,
            stages: Vec::new(),
        }
    }

    /// Add routes; must happen before [`SurfaceRouter::into_router`].
    pub fn merge(mut self, routes: Router) -> Self {
        self.router = self.router.merge(routes);
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Wrap every registered route in the collected stages.
    pub fn into_router(self) -> Router {
        let surface = self.surface;
        let router = self
            .stages
            .into_iter()
            .rev()
            .fold(self.router, |router, stage| {
                router.layer(from_fn(move |req: Request, next: Next| {
                    let stage = stage.clone();
                    async move { stage.handle(req, next).await }
                }))
            });
        tracing::debug!(surface = %surface, "Surface router assembled");
        router
    }
}

impl StagePipeline for SurfaceRouter {
    fn surface(&self) -> Surface {
        self.surface
    }

    fn register_stage(&mut self, middleware: Arc<dyn Middleware>) {
        self.stages.push(middleware);
    }
}

impl std::fmt::Debug for SurfaceRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceRouter")
            .field("surface", &self.surface)
            .field("stages", &self.stage_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::{body::Body, http::StatusCode, response::Response, routing::get};
    use tower::ServiceExt;

    use super::*;
    use crate::core::middleware::BoxFuture;

    /// Records entry and exit order into a shared journal.
    struct Journal {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Journal {
        fn name(&self) -> &'static str {
            self.name
        }

        fn priority(&self) -> i32 {
            0
        }

        fn handle<'a>(&'a self, req: Request, next: Next) -> BoxFuture<'a, Response> {
            Box::pin(async move {
                self.log.lock().unwrap().push(format!("enter {}", self.name));
                let response = next.run(req).await;
                self.log.lock().unwrap().push(format!("exit {}", self.name));
                response
            })
        }
    }

    #[tokio::test]
    async fn test_first_registered_stage_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = SurfaceRouter::new(
            Surface::Public,
            Router::new().route("/", get(|| async { "ok" })),
        );
        for name in ["outer", "inner"] {
            pipeline.register_stage(Arc::new(Journal {
                name,
                log: log.clone(),
            }));
        }
        assert_eq!(pipeline.stage_names(), vec!["outer", "inner"]);

        let response = pipeline
            .into_router()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["enter outer", "enter inner", "exit inner", "exit outer"]
        );
    }

    #[tokio::test]
    async fn test_without_stages_router_is_unchanged() {
        let pipeline = SurfaceRouter::new(Surface::Hidden, Router::new())
            .merge(Router::new().route("/ping", get(|| async { "pong" })));
        assert_eq!(pipeline.surface(), Surface::Hidden);

        let response = pipeline
            .into_router()
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
