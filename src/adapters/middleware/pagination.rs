//! `page` / `per_page` query parsing into a [`Pagination`] extension.
use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use serde::Serialize;

use super::error_response;
use crate::{
    config::{models::PaginationConfig, resolver::ConfigValue},
    core::middleware::{
        BoxFuture, ConfigureError, ConfiguredState, Middleware, SurfaceMask, priority,
        typed_section,
    },
};

const NAME: &str = "pagination";

/// Page window parsed from `?page=&per_page=`, available as a request
/// extension. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.per_page)
    }
}

#[derive(Debug)]
struct Bounds {
    default_per_page: u32,
    max_per_page: u32,
}

impl Bounds {
    fn parse(&self, query: Option<&str>) -> Result<Pagination, String> {
        let mut page = 1;
        let mut per_page = self.default_per_page;

        for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            match key.as_ref() {
                "page" => {
                    page = value
                        .parse::<u32>()
                        .ok()
                        .filter(|page| *page >= 1)
                        .ok_or_else(|| format!("'page' must be a positive integer, got '{value}'"))?;
                }
                "per_page" => {
                    per_page = value
                        .parse::<u32>()
                        .ok()
                        .filter(|per_page| *per_page >= 1)
                        .ok_or_else(|| {
                            format!("'per_page' must be a positive integer, got '{value}'")
                        })?;
                }
                _ => {}
            }
        }

        Ok(Pagination {
            page,
            per_page: per_page.min(self.max_per_page),
        })
    }
}

#[derive(Default)]
pub struct PaginationMiddleware {
    bounds: ConfiguredState<Bounds>,
}

impl PaginationMiddleware {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Middleware for PaginationMiddleware {
    fn name(&self) -> &'static str {
        NAME
    }

    fn config_key(&self) -> &'static str {
        "middleware.pagination"
    }

    fn priority(&self) -> i32 {
        priority::PAGINATION
    }

    fn surfaces(&self) -> SurfaceMask {
        SurfaceMask::PUBLIC | SurfaceMask::PROTECTED
    }

    fn configure(&self, section: Option<&ConfigValue>) -> Result<(), ConfigureError> {
        let config: PaginationConfig = typed_section(NAME, section)?;
        if config.max_per_page == 0 {
            return Err(ConfigureError::InvalidValue {
                middleware: NAME,
                field: "max_per_page",
                message: "must be greater than 0".to_string(),
            });
        }
        if config.default_per_page == 0 || config.default_per_page > config.max_per_page {
            return Err(ConfigureError::InvalidValue {
                middleware: NAME,
                field: "default_per_page",
                message: format!("must be between 1 and {}", config.max_per_page),
            });
        }
        self.bounds.set(
            NAME,
            Bounds {
                default_per_page: config.default_per_page,
                max_per_page: config.max_per_page,
            },
        )
    }

    fn handle<'a>(&'a self, mut req: Request, next: Next) -> BoxFuture<'a, Response> {
        let Some(bounds) = self.bounds.get() else {
            return Box::pin(next.run(req));
        };
        match bounds.parse(req.uri().query()) {
            Ok(pagination) => {
                req.extensions_mut().insert(pagination);
                Box::pin(next.run(req))
            }
            Err(message) => {
                let response = error_response(StatusCode::BAD_REQUEST, message);
                Box::pin(async move { response })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{Extension, Json, Router, routing::get};

    use super::*;
    use crate::adapters::middleware::test_support::{body_json, get as get_request, send, with_stage};

    fn bounds() -> Bounds {
        Bounds {
            default_per_page: 20,
            max_per_page: 100,
        }
    }

    #[test]
    fn test_defaults_without_query() {
        let pagination = bounds().parse(None).unwrap();
        assert_eq!(
            pagination,
            Pagination {
                page: 1,
                per_page: 20
            }
        );
        assert_eq!(pagination.offset(), 0);
    }

    #[test]
    fn test_explicit_values_and_clamping() {
        let pagination = bounds().parse(Some("page=3&per_page=500&sort=name")).unwrap();
        assert_eq!(pagination.page, 3);
        assert_eq!(pagination.per_page, 100);
        assert_eq!(pagination.offset(), 200);
        assert_eq!(pagination.limit(), 100);
    }

    #[test]
    fn test_malformed_values_rejected() {
        for query in ["page=0", "page=-1", "page=abc", "per_page=0", "per_page=ten"] {
            assert!(bounds().parse(Some(query)).is_err(), "{query}");
        }
    }

    #[tokio::test]
    async fn test_pagination_extension_reaches_handler() {
        let stage = PaginationMiddleware::new();
        stage
            .configure(Some(&ConfigValue::Section(Arc::new(PaginationConfig {
                max_per_page: 50,
                ..Default::default()
            }))))
            .unwrap();
        let app = with_stage(
            stage,
            Router::new().route(
                "/items",
                get(|Extension(p): Extension<Pagination>| async move { Json(p) }),
            ),
        );

        let body = body_json(send(app.clone(), get_request("/items?page=2&per_page=80")).await).await;
        assert_eq!(body["page"], 2);
        assert_eq!(body["per_page"], 50);

        let response = send(app, get_request("/items?page=zero")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_inconsistent_bounds_fail_configure() {
        let stage = PaginationMiddleware::new();
        let section = ConfigValue::Section(Arc::new(PaginationConfig {
            default_per_page: 200,
            max_per_page: 100,
            ..Default::default()
        }));
        assert!(matches!(
            stage.configure(Some(&section)),
            Err(ConfigureError::InvalidValue {
                field: "default_per_page",
                ..
            })
        ));
    }
}
