use std::collections::HashMap;

use async_trait::async_trait;

use crate::{
    config::models::IdentityClientConfig,
    ports::identity::{IdentityError, IdentityProvider, IdentityResult, Principal},
};

/// Identity client backed by a fixed token table from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenProvider {
    pub fn new(tokens: HashMap<String, Principal>) -> Self {
        Self { tokens }
    }

    pub fn from_config(config: &IdentityClientConfig) -> Self {
        let tokens = config
            .tokens
            .iter()
            .map(|(token, principal)| {
                (
                    token.clone(),
                    Principal {
                        subject: principal.subject.clone(),
                        roles: principal.roles.clone(),
                    },
                )
            })
            .collect();
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenProvider {
    async fn authenticate(&self, credential: &str) -> IdentityResult<Principal> {
        self.tokens
            .get(credential)
            .cloned()
            .ok_or(IdentityError::InvalidCredentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::PrincipalConfig;

    #[tokio::test]
    async fn test_authenticate_known_and_unknown_tokens() {
        let config = IdentityClientConfig {
            tokens: HashMap::from([(
                "secret".to_string(),
                PrincipalConfig {
                    subject: "alice".to_string(),
                    roles: vec!["admin".to_string()],
                },
            )]),
        };
        let provider = StaticTokenProvider::from_config(&config);
        assert_eq!(provider.len(), 1);

        let principal = provider.authenticate("secret").await.unwrap();
        assert_eq!(principal.subject, "alice");
        assert!(principal.has_role("admin"));

        assert!(matches!(
            provider.authenticate("guess").await,
            Err(IdentityError::InvalidCredentials)
        ));
    }
}
