//! Collaborator client catalog.
//!
//! Bootstrap code registers long-lived clients (identity providers, caches,
//! database pools) by name; middleware look them up while configuring. Clients
//! are stored type-erased and retrieved by the exact type they were
//! registered as.
use std::{
    any::{Any, type_name},
    sync::Arc,
};

use crate::core::registry::{Registry, RegistryError};

type AnyClient = Arc<dyn Any + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("client '{name}' is not a {expected}")]
    WrongType { name: String, expected: &'static str },
}

#[derive(Default)]
pub struct ClientRegistry {
    inner: Registry<AnyClient>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `client` under `name`. Look it up later as `T`.
    pub fn register<T>(&self, name: impl Into<String>, client: T) -> Result<(), RegistryError>
    where
        T: Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!(client = %name, kind = type_name::<T>(), "Registered client");
        self.inner.register(name, Arc::new(client))
    }

    /// Fetch the client registered under `name` as `T`.
    pub fn get<T>(&self, name: &str) -> Result<T, ClientError>
    where
        T: Clone + 'static,
    {
        let client = self.inner.get(name)?;
        client
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| ClientError::WrongType {
                name: name.to_string(),
                expected: type_name::<T>(),
            })
    }

    pub fn has(&self, name: &str) -> bool {
        self.inner.has(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.keys()
    }

    pub fn remove(&self, name: &str) -> bool {
        self.inner.remove(name)
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[test]
    fn test_register_and_get_trait_object() {
        let clients = ClientRegistry::new();
        let greeter: Arc<dyn Greeter> = Arc::new(English);
        clients.register("greeter", greeter).unwrap();

        let fetched = clients.get::<Arc<dyn Greeter>>("greeter").unwrap();
        assert_eq!(fetched.greet(), "hello");
        assert!(clients.has("greeter"));
    }

    #[test]
    fn test_wrong_type_is_reported() {
        let clients = ClientRegistry::new();
        clients.register("port", 8080_u16).unwrap();

        assert!(matches!(
            clients.get::<String>("port"),
            Err(ClientError::WrongType { name, .. }) if name == "port"
        ));
        assert_eq!(clients.get::<u16>("port").unwrap(), 8080);
    }

    #[test]
    fn test_missing_and_duplicate_clients() {
        let clients = ClientRegistry::new();
        assert!(matches!(
            clients.get::<u16>("missing"),
            Err(ClientError::Registry(RegistryError::NotFound { .. }))
        ));

        clients.register("db", 1_u8).unwrap();
        assert!(matches!(
            clients.register("db", 2_u8),
            Err(RegistryError::Duplicate { .. })
        ));
    }
}
