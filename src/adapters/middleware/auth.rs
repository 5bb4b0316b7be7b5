//! Bearer authentication for the protected surface.
//!
//! The credential is checked by the identity client named in
//! `middleware.auth.client`. Without that client in the [`ClientRegistry`]
//! the stage reports itself disabled and is left out of the pipeline.
use std::sync::Arc;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue, StatusCode, header},
    middleware::Next,
    response::Response,
};

use super::error_response;
use crate::{
    config::{models::AuthConfig, resolver::ConfigValue},
    core::{
        clients::ClientRegistry,
        middleware::{
            BoxFuture, ConfigureError, ConfiguredState, Middleware, SurfaceMask, priority,
            typed_section,
        },
    },
    ports::identity::{IdentityError, IdentityProvider},
};

const NAME: &str = "auth";

struct AuthSettings {
    provider: Arc<dyn IdentityProvider>,
    header: HeaderName,
    scheme: String,
    challenge: HeaderValue,
}

impl AuthSettings {
    /// The credential after the scheme, if the header carries one.
    fn credential<'r>(&self, req: &'r Request) -> Option<&'r str> {
        let value = req.headers().get(&self.header)?.to_str().ok()?;
        let (scheme, credential) = value.split_once(' ')?;
        let credential = credential.trim();
        (scheme.eq_ignore_ascii_case(&self.scheme) && !credential.is_empty()).then_some(credential)
    }

    fn unauthorized(&self, message: &str) -> Response {
        let mut response = error_response(StatusCode::UNAUTHORIZED, message);
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, self.challenge.clone());
        response
    }
}

pub struct AuthMiddleware {
    clients: Arc<ClientRegistry>,
    settings: ConfiguredState<AuthSettings>,
}

impl AuthMiddleware {
    pub fn new(clients: Arc<ClientRegistry>) -> Self {
        Self {
            clients,
            settings: ConfiguredState::new(),
        }
    }
}

impl Middleware for AuthMiddleware {
    fn name(&self) -> &'static str {
        NAME
    }

    fn config_key(&self) -> &'static str {
        "middleware.auth"
    }

    fn priority(&self) -> i32 {
        priority::AUTH
    }

    fn surfaces(&self) -> SurfaceMask {
        SurfaceMask::PROTECTED
    }

    fn enabled(&self, section: Option<&ConfigValue>) -> bool {
        let default_client = AuthConfig::default().client;
        let client = section
            .and_then(|value| value.section::<AuthConfig>())
            .map_or(default_client.as_str(), |config| config.client.as_str());
        let registered = self.clients.has(client);
        if !registered {
            tracing::warn!(
                client,
                "Identity client not registered, protected surface runs without authentication"
            );
        }
        registered
    }

    fn configure(&self, section: Option<&ConfigValue>) -> Result<(), ConfigureError> {
        let config: AuthConfig = typed_section(NAME, section)?;
        let provider = self
            .clients
            .get::<Arc<dyn IdentityProvider>>(&config.client)
            .map_err(|_| ConfigureError::MissingClient {
                middleware: NAME,
                client: config.client.clone(),
            })?;
        let header = HeaderName::from_bytes(config.header.to_ascii_lowercase().as_bytes())
            .map_err(|e| ConfigureError::InvalidValue {
                middleware: NAME,
                field: "header",
                message: e.to_string(),
            })?;
        let challenge = HeaderValue::from_str(&format!("{} realm=\"strata\"", config.scheme))
            .map_err(|e| ConfigureError::InvalidValue {
                middleware: NAME,
                field: "scheme",
                message: e.to_string(),
            })?;

        self.settings.set(
            NAME,
            AuthSettings {
                provider,
                header,
                scheme: config.scheme,
                challenge,
            },
        )
    }

    fn handle<'a>(&'a self, mut req: Request, next: Next) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let Some(settings) = self.settings.get() else {
                return error_response(StatusCode::SERVICE_UNAVAILABLE, "Authentication unavailable");
            };
            let Some(credential) = settings.credential(&req).map(str::to_string) else {
                return settings.unauthorized("Missing credentials");
            };

            match settings.provider.authenticate(&credential).await {
                Ok(principal) => {
                    tracing::debug!(subject = %principal.subject, "Authenticated request");
                    req.extensions_mut().insert(principal);
                    next.run(req).await
                }
                Err(IdentityError::InvalidCredentials) => settings.unauthorized("Invalid credentials"),
                Err(e) => {
                    tracing::error!(error = %e, "Identity provider failed");
                    error_response(StatusCode::SERVICE_UNAVAILABLE, "Authentication unavailable")
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::{Extension, Router, body::Body, routing::get};

    use super::*;
    use crate::{
        adapters::{
            identity::StaticTokenProvider,
            middleware::test_support::{body_json, get as get_request, send, with_stage},
        },
        ports::identity::Principal,
    };

    fn clients_with_identity() -> Arc<ClientRegistry> {
        let clients = Arc::new(ClientRegistry::new());
        let provider: Arc<dyn IdentityProvider> = Arc::new(StaticTokenProvider::new(
            HashMap::from([(
                "s3cret".to_string(),
                Principal {
                    subject: "svc-billing".to_string(),
                    roles: vec!["reader".to_string()],
                },
            )]),
        ));
        clients.register("identity", provider).unwrap();
        clients
    }

    fn app() -> Router {
        let stage = AuthMiddleware::new(clients_with_identity());
        stage.configure(None).unwrap();
        with_stage(
            stage,
            Router::new().route(
                "/me",
                get(|Extension(principal): Extension<Principal>| async move { principal.subject }),
            ),
        )
    }

    fn bearer(token: &str) -> Request {
        Request::builder()
            .uri("/me")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_valid_token_reaches_handler_with_principal() {
        let response = send(app(), bearer("s3cret")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"svc-billing");
    }

    #[tokio::test]
    async fn test_missing_and_invalid_credentials() {
        let response = send(app(), get_request("/me")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("www-authenticate").unwrap(),
            "Bearer realm=\"strata\""
        );
        assert_eq!(body_json(response).await["error"]["message"], "Missing credentials");

        let response = send(app(), bearer("wrong")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"]["message"], "Invalid credentials");
    }

    #[test]
    fn test_disabled_without_identity_client() {
        let stage = AuthMiddleware::new(Arc::new(ClientRegistry::new()));
        assert!(!stage.enabled(None));

        let stage = AuthMiddleware::new(clients_with_identity());
        assert!(stage.enabled(None));

        let section = ConfigValue::Section(Arc::new(AuthConfig {
            client: "sso".to_string(),
            ..Default::default()
        }));
        assert!(!stage.enabled(Some(&section)));
    }

    #[test]
    fn test_configure_requires_client() {
        let stage = AuthMiddleware::new(Arc::new(ClientRegistry::new()));
        assert!(matches!(
            stage.configure(None),
            Err(ConfigureError::MissingClient { middleware: "auth", client }) if client == "identity"
        ));
    }
}
