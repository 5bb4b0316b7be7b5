//! The contract every pipeline stage implements.
//!
//! A [`Middleware`] carries a unique name, the dotted path of its
//! configuration section, a priority (lower runs earlier) and the set of
//! exposure surfaces it applies to. The orchestrator drives its lifecycle:
//! `enabled` → `configure` (exactly once) → `handle` on every request.
use std::{fmt, future::Future, ops::BitOr, pin::Pin, str::FromStr};

use axum::{extract::Request, middleware::Next, response::Response};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::config::resolver::{ConfigSection, ConfigValue};

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Built-in priorities. Gaps leave room for application middleware.
pub mod priority {
    pub const RECOVERY: i32 = 0;
    pub const REQUEST_ID: i32 = 10;
    pub const LOGGER: i32 = 20;
    pub const TIMEOUT: i32 = 30;
    pub const SECURITY_HEADERS: i32 = 40;
    pub const CORS: i32 = 50;
    pub const RATE_LIMIT: i32 = 60;
    pub const COMPRESSION: i32 = 70;
    pub const AUTH: i32 = 80;
    pub const PAGINATION: i32 = 90;
}

/// One of the listener groups a service exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    Public,
    Protected,
    Hidden,
}

impl Surface {
    pub const ALL: [Surface; 3] = [Surface::Public, Surface::Protected, Surface::Hidden];

    const fn bit(self) -> u8 {
        match self {
            Self::Public => 0b001,
            Self::Protected => 0b010,
            Self::Hidden => 0b100,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Protected => "protected",
            Self::Hidden => "hidden",
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Surface {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "protected" => Ok(Self::Protected),
            "hidden" => Ok(Self::Hidden),
            other => Err(format!(
                "unknown surface '{other}' (expected public, protected or hidden)"
            )),
        }
    }
}

/// Set of surfaces a middleware applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceMask(u8);

impl SurfaceMask {
    pub const NONE: Self = Self(0);
    pub const PUBLIC: Self = Self(Surface::Public.bit());
    pub const PROTECTED: Self = Self(Surface::Protected.bit());
    pub const HIDDEN: Self = Self(Surface::Hidden.bit());
    pub const ALL: Self = Self(0b111);

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// True when `surface` is in the set; always true for [`SurfaceMask::ALL`].
    pub const fn includes(self, surface: Surface) -> bool {
        self.0 == Self::ALL.0 || self.0 & surface.bit() != 0
    }

    pub const fn is_all(self) -> bool {
        self.0 == Self::ALL.0
    }

    pub fn surfaces(self) -> Vec<Surface> {
        Surface::ALL
            .into_iter()
            .filter(|surface| self.includes(*surface))
            .collect()
    }
}

impl From<Surface> for SurfaceMask {
    fn from(surface: Surface) -> Self {
        Self(surface.bit())
    }
}

impl BitOr for SurfaceMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Display for SurfaceMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            return f.write_str("all");
        }
        let names: Vec<&str> = self.surfaces().into_iter().map(Surface::as_str).collect();
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

impl Serialize for SurfaceMask {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.surfaces())
    }
}

/// Errors raised while configuring a middleware.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigureError {
    #[error("middleware '{middleware}' expected a {expected} section")]
    UnexpectedSection {
        middleware: &'static str,
        expected: &'static str,
    },

    #[error("invalid '{field}' for middleware '{middleware}': {message}")]
    InvalidValue {
        middleware: &'static str,
        field: &'static str,
        message: String,
    },

    #[error("middleware '{middleware}' requires client '{client}' which is not registered")]
    MissingClient {
        middleware: &'static str,
        client: String,
    },

    #[error("middleware '{0}' is already configured")]
    AlreadyConfigured(&'static str),
}

/// A composable request-pipeline stage.
pub trait Middleware: Send + Sync + 'static {
    /// Unique name within a registry.
    fn name(&self) -> &'static str;

    /// Dotted path of the configuration section; empty means none.
    fn config_key(&self) -> &'static str {
        ""
    }

    /// Ordering key; lower values run earlier (outermost).
    fn priority(&self) -> i32;

    fn surfaces(&self) -> SurfaceMask {
        SurfaceMask::ALL
    }

    /// Middleware-specific enablement, evaluated after the base toggles.
    fn enabled(&self, _section: Option<&ConfigValue>) -> bool {
        true
    }

    /// Acquire runtime state. Called at most once, before any request.
    fn configure(&self, _section: Option<&ConfigValue>) -> Result<(), ConfigureError> {
        Ok(())
    }

    /// Process one request.
    fn handle<'a>(&'a self, req: Request, next: Next) -> BoxFuture<'a, Response>;
}

impl fmt::Debug for dyn Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware")
            .field("name", &self.name())
            .field("config_key", &self.config_key())
            .field("priority", &self.priority())
            .field("surfaces", &self.surfaces())
            .finish()
    }
}

/// Write-once holder for a middleware's configured state.
pub struct ConfiguredState<T>(OnceCell<T>);

impl<T> ConfiguredState<T> {
    pub const fn new() -> Self {
        Self(OnceCell::new())
    }

    pub fn set(&self, middleware: &'static str, value: T) -> Result<(), ConfigureError> {
        self.0
            .set(value)
            .map_err(|_| ConfigureError::AlreadyConfigured(middleware))
    }

    pub fn get(&self) -> Option<&T> {
        self.0.get()
    }
}

impl<T> Default for ConfiguredState<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The typed section for `middleware`, or `T::default()` when absent.
pub fn typed_section<T>(
    middleware: &'static str,
    section: Option<&ConfigValue>,
) -> Result<T, ConfigureError>
where
    T: ConfigSection + Clone + Default,
{
    match section {
        None => Ok(T::default()),
        Some(value) => value
            .section::<T>()
            .cloned()
            .ok_or(ConfigureError::UnexpectedSection {
                middleware,
                expected: std::any::type_name::<T>(),
            }),
    }
}

/// Serializable view of a middleware for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MiddlewareInfo {
    pub name: &'static str,
    pub priority: i32,
    pub config_key: &'static str,
    pub surfaces: SurfaceMask,
}

impl MiddlewareInfo {
    pub fn of(middleware: &dyn Middleware) -> Self {
        Self {
            name: middleware.name(),
            priority: middleware.priority(),
            config_key: middleware.config_key(),
            surfaces: middleware.surfaces(),
        }
    }
}
