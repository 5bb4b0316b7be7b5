//! Middleware composition engine.
//!
//! An [`Orchestrator`] is bound to one middleware registry and one resolved
//! configuration. [`Orchestrator::initialize`] runs once at startup and
//! decides, for every registered middleware, whether it joins the active
//! pipeline:
//!
//! 1. resolve the middleware's configuration section by its dotted key;
//! 2. apply the base toggles (`enabled`, `disable_in_dev_mode`);
//! 3. ask the middleware's own `enabled` predicate;
//! 4. `configure` it (a failure aborts initialization);
//! 5. append it to the active list.
//!
//! The active list is then stably sorted by priority, so equal priorities keep
//! registration order. After initialization the list is immutable and
//! [`Orchestrator::apply`] attaches it to each surface's pipeline.
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use once_cell::sync::OnceCell;

use crate::{
    config::resolver::{ConfigRoot, ConfigValue},
    core::{
        middleware::{ConfigureError, Middleware, MiddlewareInfo, Surface},
        middleware_registry::MiddlewareRegistry,
    },
    ports::pipeline::StagePipeline,
};

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("middleware orchestrator is already initialized")]
    AlreadyInitialized,

    #[error("middleware orchestrator has not been initialized")]
    NotInitialized,

    #[error("failed to configure middleware '{name}'")]
    Configure {
        name: &'static str,
        #[source]
        source: ConfigureError,
    },
}

/// Why a middleware was left out of the active list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    Disabled,
    DevMode,
    Predicate,
}

pub struct Orchestrator<C: ConfigRoot> {
    registry: Arc<MiddlewareRegistry>,
    config: Arc<C>,
    started: AtomicBool,
    active: OnceCell<Vec<Arc<dyn Middleware>>>,
}

impl<C: ConfigRoot> Orchestrator<C> {
    pub fn new(registry: Arc<MiddlewareRegistry>, config: Arc<C>) -> Self {
        Self {
            registry,
            config,
            started: AtomicBool::new(false),
            active: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    /// Build the active pipeline. Only the first call does any work; later
    /// calls fail with [`OrchestratorError::AlreadyInitialized`], including
    /// after a failed first attempt.
    pub fn initialize(&self) -> Result<(), OrchestratorError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(OrchestratorError::AlreadyInitialized);
        }

        let dev_mode = self.config.dev_mode();
        let mut active: Vec<Arc<dyn Middleware>> = Vec::new();

        for middleware in self.registry.entries() {
            let name = middleware.name();
            let section = self.config.resolve(middleware.config_key());

            if let Some(reason) = skip_reason(middleware.as_ref(), section.as_ref(), dev_mode) {
                tracing::debug!(middleware = name, reason = ?reason, "Skipping middleware");
                continue;
            }

            middleware
                .configure(section.as_ref())
                .map_err(|source| OrchestratorError::Configure { name, source })?;

            tracing::debug!(
                middleware = name,
                priority = middleware.priority(),
                surfaces = %middleware.surfaces(),
                "Configured middleware"
            );
            active.push(middleware);
        }

        // Stable: equal priorities keep registration order
        active.sort_by_key(|middleware| middleware.priority());

        tracing::info!(
            registered = self.registry.count(),
            active = active.len(),
            dev_mode,
            pipeline = ?active.iter().map(|m| m.name()).collect::<Vec<_>>(),
            "Middleware pipeline initialized"
        );

        if self.active.set(active).is_err() {
            return Err(OrchestratorError::AlreadyInitialized);
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.active.get().is_some()
    }

    /// Every active middleware, in execution order. Empty before
    /// initialization.
    pub fn list_all(&self) -> Vec<Arc<dyn Middleware>> {
        self.active.get().cloned().unwrap_or_default()
    }

    /// Active middleware applicable to `surface`, in execution order.
    pub fn list(&self, surface: Surface) -> Vec<Arc<dyn Middleware>> {
        self.active
            .get()
            .map(|active| {
                active
                    .iter()
                    .filter(|middleware| middleware.surfaces().includes(surface))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Register every applicable middleware on `pipeline`, in execution order.
    /// Returns the number of stages attached.
    pub fn apply<P>(&self, pipeline: &mut P) -> Result<usize, OrchestratorError>
    where
        P: StagePipeline + ?Sized,
    {
        if !self.is_initialized() {
            return Err(OrchestratorError::NotInitialized);
        }
        let surface = pipeline.surface();
        let stages = self.list(surface);
        let count = stages.len();
        for middleware in stages {
            tracing::debug!(
                middleware = middleware.name(),
                surface = %surface,
                "Attaching middleware"
            );
            pipeline.register_stage(middleware);
        }
        Ok(count)
    }

    /// Diagnostic view of `list(surface)`, or of `list_all()` when `None`.
    pub fn describe(&self, surface: Option<Surface>) -> Vec<MiddlewareInfo> {
        let middleware = match surface {
            Some(surface) => self.list(surface),
            None => self.list_all(),
        };
        middleware
            .iter()
            .map(|m| MiddlewareInfo::of(m.as_ref()))
            .collect()
    }
}

impl<C: ConfigRoot> std::fmt::Debug for Orchestrator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("initialized", &self.is_initialized())
            .field("active", &self.describe(None))
            .finish()
    }
}

/// Base enablement check over a section's toggles.
///
/// No section, a scalar section, or a section without toggles is enabled.
pub fn base_enabled(section: Option<&ConfigValue>, dev_mode: bool) -> bool {
    base_skip(section, dev_mode).is_none()
}

fn base_skip(section: Option<&ConfigValue>, dev_mode: bool) -> Option<Skip> {
    let toggles = section?.base_toggles();
    if toggles.enabled == Some(false) {
        Some(Skip::Disabled)
    } else if dev_mode && toggles.disable_in_dev_mode == Some(true) {
        Some(Skip::DevMode)
    } else {
        None
    }
}

fn skip_reason(
    middleware: &dyn Middleware,
    section: Option<&ConfigValue>,
    dev_mode: bool,
) -> Option<Skip> {
    if let Some(reason) = base_skip(section, dev_mode) {
        return Some(reason);
    }
    if !middleware.enabled(section) {
        return Some(Skip::Predicate);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resolver::{BaseToggles, ConfigSection};

    #[derive(Debug, Clone)]
    struct Toggled(BaseToggles);

    impl ConfigSection for Toggled {
        fn base_toggles(&self) -> BaseToggles {
            self.0
        }
    }

    fn section(enabled: Option<bool>, disable_in_dev_mode: Option<bool>) -> ConfigValue {
        ConfigValue::Section(Arc::new(Toggled(BaseToggles {
            enabled,
            disable_in_dev_mode,
        })))
    }

    #[test]
    fn test_missing_section_is_enabled() {
        assert!(base_enabled(None, false));
        assert!(base_enabled(None, true));
    }

    #[test]
    fn test_scalar_section_is_enabled() {
        assert!(base_enabled(Some(&ConfigValue::Bool(false)), true));
        assert!(base_enabled(Some(&ConfigValue::Str("x".into())), false));
    }

    #[test]
    fn test_section_without_toggles_is_enabled() {
        let value = section(None, None);
        assert!(base_enabled(Some(&value), true));
    }

    #[test]
    fn test_enabled_false_disables() {
        let value = section(Some(false), None);
        assert!(!base_enabled(Some(&value), false));
        assert!(!base_enabled(Some(&value), true));
    }

    #[test]
    fn test_disable_in_dev_mode_only_applies_in_dev_mode() {
        let value = section(Some(true), Some(true));
        assert!(!base_enabled(Some(&value), true));
        assert!(base_enabled(Some(&value), false));

        // Only the dev-mode flag present
        let value = section(None, Some(true));
        assert!(!base_enabled(Some(&value), true));
        assert!(base_enabled(Some(&value), false));
    }

    #[test]
    fn test_skip_reasons() {
        assert_eq!(
            base_skip(Some(&section(Some(false), Some(true))), true),
            Some(Skip::Disabled)
        );
        assert_eq!(
            base_skip(Some(&section(Some(true), Some(true))), true),
            Some(Skip::DevMode)
        );
        assert_eq!(base_skip(Some(&section(Some(true), Some(false))), true), None);
    }
}
