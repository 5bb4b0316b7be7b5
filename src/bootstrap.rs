//! Composition root.
//!
//! [`Application`] owns the client catalog, the middleware registry and the
//! orchestrator for one configuration. Typical startup:
//!
//! ```no_run
//! # use strata::{bootstrap::Application, config::AppConfig, core::middleware::Surface};
//! # use axum::{Router, routing::get};
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let app = Application::new(AppConfig::default())?
//!     .route(Surface::Public, Router::new().route("/", get(|| async { "hello" })));
//! app.initialize()?;
//! app.serve().await
//! # }
//! ```
use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use axum::{Json, Router, extract::State, routing::get};
use eyre::{Result, WrapErr};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::Instrument;

use crate::{
    adapters::{
        identity::StaticTokenProvider, middleware::register_builtin, surface_router::SurfaceRouter,
    },
    config::models::AppConfig,
    core::{
        clients::ClientRegistry,
        middleware::{MiddlewareInfo, Surface},
        middleware_registry::MiddlewareRegistry,
        orchestrator::Orchestrator,
    },
    ports::identity::IdentityProvider,
    tracing_setup::configure_component_tracing,
    utils::graceful_shutdown::{GracefulShutdown, ShutdownToken},
};

/// Name the built-in identity client is registered under.
pub const IDENTITY_CLIENT: &str = "identity";

pub struct Application {
    config: Arc<AppConfig>,
    clients: Arc<ClientRegistry>,
    registry: Arc<MiddlewareRegistry>,
    orchestrator: Arc<Orchestrator<AppConfig>>,
    routes: HashMap<Surface, Router>,
}

impl Application {
    /// Register configured clients and the built-in middleware catalog.
    pub fn new(config: AppConfig) -> Result<Self> {
        let config = Arc::new(config);
        let clients = Arc::new(ClientRegistry::new());

        if let Some(identity) = config.identity_client() {
            let provider: Arc<dyn IdentityProvider> =
                Arc::new(StaticTokenProvider::from_config(identity));
            clients
                .register(IDENTITY_CLIENT, provider)
                .wrap_err("Failed to register identity client")?;
        }

        let registry = Arc::new(MiddlewareRegistry::new());
        register_builtin(&registry, clients.clone());

        let orchestrator = Arc::new(Orchestrator::new(registry.clone(), config.clone()));

        Ok(Self {
            config,
            clients,
            registry,
            orchestrator,
            routes: HashMap::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    /// Register application middleware here before [`Application::initialize`].
    pub fn registry(&self) -> &Arc<MiddlewareRegistry> {
        &self.registry
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator<AppConfig>> {
        &self.orchestrator
    }

    /// Mount `routes` on `surface`.
    pub fn route(mut self, surface: Surface, routes: Router) -> Self {
        let merged = match self.routes.remove(&surface) {
            Some(existing) => existing.merge(routes),
            None => routes,
        };
        self.routes.insert(surface, merged);
        self
    }

    pub fn initialize(&self) -> Result<()> {
        self.orchestrator
            .initialize()
            .wrap_err("Failed to initialize middleware pipeline")
    }

    /// The fully layered router for `surface`.
    pub fn router(&self, surface: Surface) -> Result<Router> {
        let mut routes = self.routes.get(&surface).cloned().unwrap_or_default();
        if surface == Surface::Hidden {
            routes = routes.merge(diagnostics_routes(self.orchestrator.clone()));
        }

        let mut pipeline = SurfaceRouter::new(surface, routes);
        let attached = self
            .orchestrator
            .apply(&mut pipeline)
            .wrap_err_with(|| format!("Failed to attach middleware to the {surface} surface"))?;
        tracing::info!(
            surface = %surface,
            stages = attached,
            pipeline = ?pipeline.stage_names(),
            "Surface pipeline ready"
        );
        Ok(pipeline.into_router())
    }

    /// Bind the three configured listeners and serve until SIGINT/SIGTERM.
    pub async fn serve(self) -> Result<()> {
        let server = &self.config.server;
        let mut listeners = Vec::with_capacity(Surface::ALL.len());
        for (surface, addr) in [
            (Surface::Public, &server.public_addr),
            (Surface::Protected, &server.protected_addr),
            (Surface::Hidden, &server.hidden_addr),
        ] {
            let listener = TcpListener::bind(addr.as_str())
                .await
                .wrap_err_with(|| format!("Failed to bind {surface} listener on {addr}"))?;
            listeners.push((surface, listener));
        }

        let drain = humantime::parse_duration(&server.shutdown_timeout)
            .wrap_err("Invalid server.shutdown_timeout")?;
        let shutdown = Arc::new(GracefulShutdown::with_timeout(drain));

        let signal_handler = shutdown.clone();
        tokio::spawn(async move { signal_handler.run_signal_handler().await });

        self.run(listeners, shutdown).await
    }

    /// Serve on already-bound listeners until `shutdown` fires, then give
    /// in-flight requests up to its drain timeout.
    pub async fn run(
        self,
        listeners: Vec<(Surface, TcpListener)>,
        shutdown: Arc<GracefulShutdown>,
    ) -> Result<()> {
        if !self.orchestrator.is_initialized() {
            self.initialize()?;
        }
        let drain_signal = shutdown.shutdown_token();

        let mut servers = Vec::with_capacity(listeners.len());
        for (surface, listener) in listeners {
            let router = self.router(surface)?;
            servers.push(serve_surface(
                surface,
                listener,
                router,
                shutdown.shutdown_token(),
            ));
        }

        let servers = futures_util::future::try_join_all(servers);
        tokio::pin!(servers);

        tokio::select! {
            result = &mut servers => {
                result?;
            }
            reason = drain_signal.wait_for_shutdown() => {
                tracing::info!(?reason, drain = ?shutdown.drain_timeout(), "Draining connections");
                match tokio::time::timeout(shutdown.drain_timeout(), &mut servers).await {
                    Ok(result) => {
                        result?;
                    }
                    Err(_) => tracing::warn!("Drain timeout exceeded, forcing shutdown"),
                }
            }
        }

        tracing::info!("Graceful shutdown completed");
        Ok(())
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("clients", &self.clients)
            .field("orchestrator", &self.orchestrator)
            .field("surfaces", &self.routes.keys().collect::<Vec<_>>())
            .finish()
    }
}

async fn serve_surface(
    surface: Surface,
    listener: TcpListener,
    router: Router,
    token: ShutdownToken,
) -> Result<()> {
    let addr = listener
        .local_addr()
        .wrap_err_with(|| format!("Failed to read {surface} listener address"))?;
    tracing::info!(surface = %surface, %addr, "Listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        token.wait_for_shutdown().await;
    })
    .into_future()
    .instrument(configure_component_tracing(surface.as_str()))
    .await
    .wrap_err_with(|| format!("{surface} server error"))
}

#[derive(Serialize)]
struct PipelineReport {
    public: Vec<MiddlewareInfo>,
    protected: Vec<MiddlewareInfo>,
    hidden: Vec<MiddlewareInfo>,
}

/// `/health` and `/middleware` on the hidden surface.
fn diagnostics_routes(orchestrator: Arc<Orchestrator<AppConfig>>) -> Router {
    Router::new()
        .route(
            "/health",
            get(|| async { Json(serde_json::json!({ "status": "ok" })) }),
        )
        .route(
            "/middleware",
            get(
                |State(orchestrator): State<Arc<Orchestrator<AppConfig>>>| async move {
                    Json(PipelineReport {
                        public: orchestrator.describe(Some(Surface::Public)),
                        protected: orchestrator.describe(Some(Surface::Protected)),
                        hidden: orchestrator.describe(Some(Surface::Hidden)),
                    })
                },
            ),
        )
        .with_state(orchestrator)
}
