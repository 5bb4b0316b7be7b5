//! Dotted-path lookup over a typed configuration tree.
//!
//! Middleware name their configuration by a dotted path such as
//! `middleware.logger`. Instead of walking fields at runtime, every root
//! configuration type publishes a [`ConfigPaths`] table mapping each
//! addressable path to a typed accessor. Lookups fold ASCII case per segment,
//! return `None` for unknown paths, and always hand back an owned copy of a
//! record leaf so the source tree is never mutated through a resolved value.
use std::{any::Any, collections::HashMap, fmt, sync::Arc};

/// Helper for downcasting configuration sections.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The optional `enabled` / `disable_in_dev_mode` pair a section may declare.
///
/// `None` means the section has no such field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaseToggles {
    pub enabled: Option<bool>,
    pub disable_in_dev_mode: Option<bool>,
}

impl BaseToggles {
    /// Toggles for a section that declares both fields.
    pub const fn declared(enabled: bool, disable_in_dev_mode: bool) -> Self {
        Self {
            enabled: Some(enabled),
            disable_in_dev_mode: Some(disable_in_dev_mode),
        }
    }
}

/// A record in the configuration tree.
///
/// Sections that carry the conventional toggle fields override
/// [`ConfigSection::base_toggles`]; all others inherit "no toggles".
pub trait ConfigSection: AsAny + fmt::Debug + Send + Sync {
    fn base_toggles(&self) -> BaseToggles {
        BaseToggles::default()
    }
}

/// A resolved configuration value.
#[derive(Debug, Clone)]
pub enum ConfigValue {
    /// A record leaf; always a fresh copy of the source record.
    Section(Arc<dyn ConfigSection>),
    Bool(bool),
    Int(i64),
    Str(String),
}

impl ConfigValue {
    /// Downcast a record leaf to its concrete section type.
    pub fn section<T: ConfigSection>(&self) -> Option<&T> {
        match self {
            Self::Section(section) => (**section).as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn base_toggles(&self) -> BaseToggles {
        match self {
            Self::Section(section) => section.base_toggles(),
            _ => BaseToggles::default(),
        }
    }

    pub const fn is_section(&self) -> bool {
        matches!(self, Self::Section(_))
    }
}

type Accessor<C> = Box<dyn Fn(&C) -> Option<ConfigValue> + Send + Sync>;

/// Lookup table from normalized dotted path to accessor over root type `C`.
pub struct ConfigPaths<C> {
    accessors: HashMap<String, Accessor<C>>,
}

impl<C: 'static> ConfigPaths<C> {
    pub fn new() -> Self {
        Self {
            accessors: HashMap::new(),
        }
    }

    /// Register a record at `path`. Resolving it yields a clone of the record.
    ///
    /// # Panics
    ///
    /// Panics if `path` is empty or contains an empty segment.
    pub fn section<S, F>(self, path: &str, accessor: F) -> Self
    where
        S: ConfigSection + Clone,
        F: Fn(&C) -> &S + Send + Sync + 'static,
    {
        self.insert(
            path,
            Box::new(move |root: &C| Some(ConfigValue::Section(Arc::new(accessor(root).clone())))),
        )
    }

    /// Register an optional record at `path`; an absent record resolves to
    /// `None`.
    ///
    /// # Panics
    ///
    /// Panics if `path` is empty or contains an empty segment.
    pub fn optional_section<S, F>(self, path: &str, accessor: F) -> Self
    where
        S: ConfigSection + Clone,
        F: Fn(&C) -> Option<&S> + Send + Sync + 'static,
    {
        self.insert(
            path,
            Box::new(move |root: &C| {
                accessor(root).map(|section| ConfigValue::Section(Arc::new(section.clone())))
            }),
        )
    }

    /// Register a scalar at `path`.
    ///
    /// # Panics
    ///
    /// Panics if `path` is empty or contains an empty segment.
    pub fn scalar<F>(self, path: &str, accessor: F) -> Self
    where
        F: Fn(&C) -> ConfigValue + Send + Sync + 'static,
    {
        self.insert(path, Box::new(move |root: &C| Some(accessor(root))))
    }

    fn insert(mut self, path: &str, accessor: Accessor<C>) -> Self {
        let key = normalize(path)
            .unwrap_or_else(|| panic!("invalid configuration path literal '{path}'"));
        self.accessors.insert(key, accessor);
        self
    }

    /// Resolve `path` against `root`. Segments match ASCII case-insensitively;
    /// empty, unknown or absent optional paths yield `None`.
    pub fn resolve(&self, root: &C, path: &str) -> Option<ConfigValue> {
        let key = normalize(path)?;
        self.accessors.get(&key).and_then(|accessor| accessor(root))
    }

    pub fn contains(&self, path: &str) -> bool {
        normalize(path).is_some_and(|key| self.accessors.contains_key(&key))
    }

    /// Registered paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.accessors.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}

impl<C: 'static> Default for ConfigPaths<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: 'static> fmt::Debug for ConfigPaths<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigPaths")
            .field("paths", &self.paths())
            .finish()
    }
}

/// Lower-case every segment; reject empty paths and empty segments.
fn normalize(path: &str) -> Option<String> {
    if path.is_empty() {
        return None;
    }
    let mut segments = Vec::new();
    for segment in path.split('.') {
        if segment.is_empty() {
            return None;
        }
        segments.push(segment.to_ascii_lowercase());
    }
    Some(segments.join("."))
}

/// A root configuration record the orchestrator can be bound to.
pub trait ConfigRoot: Send + Sync + Sized + 'static {
    /// The path table for this root type, built once per process.
    fn config_paths() -> &'static ConfigPaths<Self>;

    /// Whether the service runs in development mode.
    fn dev_mode(&self) -> bool;

    fn resolve(&self, path: &str) -> Option<ConfigValue> {
        Self::config_paths().resolve(self, path)
    }
}
