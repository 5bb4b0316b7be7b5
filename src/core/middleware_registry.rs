//! The middleware catalog.
//!
//! Wraps [`Registry`] with the item type fixed to `Arc<dyn Middleware>`.
//! Registration through [`MiddlewareRegistry::register`] treats a name
//! collision as a fatal composition error: it prints a diagnostic and exits
//! the process before any listener is bound. [`MiddlewareRegistry::try_register`]
//! keeps the fallible contract for tests and dynamically loaded stages.
use std::{fmt::Write as _, sync::Arc};

use crate::core::{
    middleware::Middleware,
    registry::{Registry, RegistryError},
};

#[derive(Default)]
pub struct MiddlewareRegistry {
    inner: Registry<Arc<dyn Middleware>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a middleware, terminating the process on a duplicate name.
    pub fn register(&self, middleware: Arc<dyn Middleware>) {
        if let Err(RegistryError::Duplicate { name }) = self.try_register(middleware.clone()) {
            let existing = self.inner.get(&name).ok();
            let diagnostic = render_duplicate(middleware.as_ref(), existing.as_deref());
            tracing::error!(middleware = %name, "Duplicate middleware registration");
            eprintln!("{diagnostic}");
            std::process::exit(1);
        }
    }

    pub fn try_register(&self, middleware: Arc<dyn Middleware>) -> Result<(), RegistryError> {
        let name = middleware.name();
        self.inner.register(name, middleware)?;
        tracing::debug!(middleware = name, "Registered middleware");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Middleware>, RegistryError> {
        self.inner.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.inner.has(name)
    }

    /// Middleware in registration order.
    pub fn entries(&self) -> Vec<Arc<dyn Middleware>> {
        self.inner
            .entries()
            .into_iter()
            .map(|(_, middleware)| middleware)
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.keys()
    }

    pub fn count(&self) -> usize {
        self.inner.count()
    }

    pub fn remove(&self, name: &str) -> bool {
        self.inner.remove(name)
    }
}

impl std::fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareRegistry")
            .field("names", &self.names())
            .finish()
    }
}

/// Human-readable report for a rejected duplicate registration.
pub fn render_duplicate(rejected: &dyn Middleware, existing: Option<&dyn Middleware>) -> String {
    let mut out = String::new();
    let rule = "=".repeat(64);
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "FATAL: duplicate middleware registration");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "  name:      {}", rejected.name());
    if let Some(existing) = existing {
        let _ = writeln!(out, "  existing:  {}", describe(existing));
    }
    let _ = writeln!(out, "  rejected:  {}", describe(rejected));
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Middleware names must be unique. Rename one of the stages or drop the"
    );
    let _ = write!(out, "second registration.");
    out
}

fn describe(middleware: &dyn Middleware) -> String {
    let key = match middleware.config_key() {
        "" => "<none>",
        key => key,
    };
    format!(
        "priority {}, surfaces {}, config key {}",
        middleware.priority(),
        middleware.surfaces(),
        key
    )
}
