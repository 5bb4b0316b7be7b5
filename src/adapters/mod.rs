pub mod identity;
pub mod middleware;
pub mod surface_router;

/// Re-export commonly used types from adapters
pub use identity::StaticTokenProvider;
pub use middleware::register_builtin;
pub use surface_router::SurfaceRouter;
