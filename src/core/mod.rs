pub mod clients;
pub mod middleware;
pub mod middleware_registry;
pub mod orchestrator;
pub mod registry;

pub use clients::{ClientError, ClientRegistry};
pub use middleware::{Middleware, Surface, SurfaceMask};
pub use middleware_registry::MiddlewareRegistry;
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use registry::{Registry, RegistryError};
