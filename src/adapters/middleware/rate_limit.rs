//! Request rate limiting built atop `governor`.
//!
//! One quota of `requests` per `period`, shared by every caller (`global`) or
//! tracked per client IP (`ip`). The IP comes from axum's
//! `ConnectInfo<SocketAddr>`; requests without one are let through. Per-IP
//! state is pruned of fully replenished clients once the number of tracked
//! addresses doubles past the last prune.
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::atomic::{AtomicUsize, Ordering},
};

use axum::{
    extract::{ConnectInfo, Request},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::Response,
};
use governor::{
    NotUntil, Quota, RateLimiter,
    clock::{Clock, DefaultClock, QuantaInstant},
    state::{InMemoryState, NotKeyed, keyed::DefaultKeyedStateStore},
};

use super::error_response;
use crate::{
    config::{
        models::{RateLimitBy, RateLimitConfig},
        resolver::ConfigValue,
    },
    core::middleware::{
        BoxFuture, ConfigureError, ConfiguredState, Middleware, SurfaceMask, priority,
        typed_section,
    },
};

const NAME: &str = "rate_limit";
/// Tracked client addresses before the first prune.
const PRUNE_THRESHOLD: usize = 10_000;

pub type DirectRateLimiterImpl = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;
pub type KeyedRateLimiterImpl<K> = RateLimiter<K, DefaultKeyedStateStore<K>, DefaultClock>;

enum Limiter {
    Global(DirectRateLimiterImpl),
    Ip(KeyedRateLimiterImpl<IpAddr>),
}

struct RateLimitSettings {
    limiter: Limiter,
    /// Keyed state size that triggers the next prune
    prune_above: AtomicUsize,
    clock: DefaultClock,
    status_code: StatusCode,
    message: String,
}

impl RateLimitSettings {
    fn from_config(config: &RateLimitConfig) -> Result<Self, ConfigureError> {
        let invalid = |field: &'static str, message: String| ConfigureError::InvalidValue {
            middleware: NAME,
            field,
            message,
        };

        let period = humantime::parse_duration(&config.period)
            .map_err(|e| invalid("period", format!("'{}': {e}", config.period)))?;
        let requests = u32::try_from(config.requests)
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or_else(|| {
                invalid(
                    "requests",
                    format!("must be between 1 and {}", u32::MAX),
                )
            })?;

        // Burst of `requests`, refilled evenly across `period`
        let quota = Quota::with_period(period / requests.get())
            .ok_or_else(|| invalid("period", "must be greater than 0".to_string()))?
            .allow_burst(requests);

        let status_code = StatusCode::from_u16(config.status_code)
            .map_err(|_| invalid("status_code", format!("{} is not a status code", config.status_code)))?;

        tracing::info!(
            by = ?config.by,
            requests = config.requests,
            period = %config.period,
            status_code = config.status_code,
            "Creating rate limiter"
        );

        let limiter = match config.by {
            RateLimitBy::Global => Limiter::Global(RateLimiter::direct(quota)),
            RateLimitBy::Ip => Limiter::Ip(RateLimiter::keyed(quota)),
        };

        Ok(Self {
            limiter,
            prune_above: AtomicUsize::new(PRUNE_THRESHOLD),
            clock: DefaultClock::default(),
            status_code,
            message: config.message.clone(),
        })
    }

    fn check(&self, req: &Request) -> Result<(), NotUntil<QuantaInstant>> {
        match &self.limiter {
            Limiter::Global(limiter) => limiter.check(),
            Limiter::Ip(limiter) => {
                let client_ip = req
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|connect_info| connect_info.0.ip());
                match client_ip {
                    Some(ip) => {
                        let outcome = limiter.check_key(&ip);
                        if limiter.len() > self.prune_above.load(Ordering::Relaxed) {
                            self.prune();
                        }
                        outcome
                    }
                    None => {
                        tracing::debug!("No client address available, skipping rate limit");
                        Ok(())
                    }
                }
            }
        }
    }

    /// Drop per-IP entries whose quota has fully replenished.
    fn prune(&self) {
        let Limiter::Ip(limiter) = &self.limiter else {
            return;
        };
        let before = limiter.len();
        limiter.retain_recent();
        limiter.shrink_to_fit();
        let after = limiter.len();
        self.prune_above
            .store(PRUNE_THRESHOLD.max(after.saturating_mul(2)), Ordering::Relaxed);
        tracing::debug!(before, after, "Pruned rate limit state");
    }

    fn tracked_clients(&self) -> usize {
        match &self.limiter {
            Limiter::Global(_) => 0,
            Limiter::Ip(limiter) => limiter.len(),
        }
    }

    fn reject(&self, not_until: NotUntil<QuantaInstant>) -> Response {
        let wait = not_until.wait_time_from(self.clock.now());
        let mut response = error_response(self.status_code, self.message.clone());
        let retry_after = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry_after.max(1)));
        response
    }
}

#[derive(Default)]
pub struct RateLimitMiddleware {
    settings: ConfiguredState<RateLimitSettings>,
}

impl RateLimitMiddleware {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        NAME
    }

    fn config_key(&self) -> &'static str {
        "middleware.rate_limit"
    }

    fn priority(&self) -> i32 {
        priority::RATE_LIMIT
    }

    fn surfaces(&self) -> SurfaceMask {
        SurfaceMask::PUBLIC
    }

    fn configure(&self, section: Option<&ConfigValue>) -> Result<(), ConfigureError> {
        let config: RateLimitConfig = typed_section(NAME, section)?;
        self.settings
            .set(NAME, RateLimitSettings::from_config(&config)?)
    }

    fn handle<'a>(&'a self, req: Request, next: Next) -> BoxFuture<'a, Response> {
        if let Some(settings) = self.settings.get() {
            if let Err(not_until) = settings.check(&req) {
                tracing::warn!(http.path = %req.uri().path(), "Rate limit exceeded");
                let response = settings.reject(not_until);
                return Box::pin(async move { response });
            }
        }
        Box::pin(next.run(req))
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use axum::{Router, body::Body, routing::get};

    use super::*;
    use crate::adapters::middleware::test_support::{body_json, get as get_request, send, with_stage};

    fn config(by: RateLimitBy, requests: u64) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            by,
            requests,
            period: "1h".to_string(),
            ..Default::default()
        }
    }

    fn stage(config: RateLimitConfig) -> RateLimitMiddleware {
        let stage = RateLimitMiddleware::new();
        stage
            .configure(Some(&ConfigValue::Section(Arc::new(config))))
            .unwrap();
        stage
    }

    fn from(ip: [u8; 4]) -> Request {
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((ip, 4000))));
        request
    }

    #[tokio::test]
    async fn test_global_limit() {
        let app = with_stage(
            stage(config(RateLimitBy::Global, 2)),
            Router::new().route("/", get(|| async { "ok" })),
        );

        for _ in 0..2 {
            let response = send(app.clone(), get_request("/")).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = send(app, get_request("/")).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("retry-after"));
        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "Too Many Requests");
    }

    #[tokio::test]
    async fn test_ip_limit_is_per_client() {
        let app = with_stage(
            stage(config(RateLimitBy::Ip, 1)),
            Router::new().route("/", get(|| async { "ok" })),
        );

        assert_eq!(send(app.clone(), from([10, 0, 0, 1])).await.status(), StatusCode::OK);
        assert_eq!(
            send(app.clone(), from([10, 0, 0, 1])).await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(send(app.clone(), from([10, 0, 0, 2])).await.status(), StatusCode::OK);

        // No peer address: not limited
        assert_eq!(send(app, get_request("/")).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_custom_status_and_message() {
        let mut config = config(RateLimitBy::Global, 1);
        config.status_code = 503;
        config.message = "busy".to_string();
        let app = with_stage(stage(config), Router::new().route("/", get(|| async { "ok" })));

        send(app.clone(), get_request("/")).await;
        let response = send(app, get_request("/")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["error"]["message"], "busy");
    }

    fn settings_for_many_clients() -> RateLimitSettings {
        RateLimitSettings::from_config(&RateLimitConfig {
            period: "10ms".to_string(),
            ..config(RateLimitBy::Ip, 10)
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_replenished_clients_are_pruned() {
        let settings = settings_for_many_clients();
        for i in 0..2000u32 {
            let [_, a, b, c] = i.to_be_bytes();
            assert!(settings.check(&from([10, a, b, c])).is_ok());
        }
        assert_eq!(settings.tracked_clients(), 2000);

        tokio::time::sleep(Duration::from_millis(50)).await;
        settings.prune();
        assert_eq!(settings.tracked_clients(), 0);
    }

    #[tokio::test]
    async fn test_growth_past_threshold_triggers_prune() {
        let settings = settings_for_many_clients();
        settings.prune_above.store(100, Ordering::Relaxed);
        for i in 0..100u8 {
            assert!(settings.check(&from([192, 168, 0, i])).is_ok());
        }
        assert_eq!(settings.tracked_clients(), 100);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(settings.check(&from([192, 168, 1, 1])).is_ok());
        // only the client seen after the quotas refilled remains
        assert_eq!(settings.tracked_clients(), 1);
        assert_eq!(settings.prune_above.load(Ordering::Relaxed), PRUNE_THRESHOLD);
    }

    #[test]
    fn test_invalid_quota_fails_configure() {
        let cases = [
            RateLimitConfig {
                requests: 0,
                ..Default::default()
            },
            RateLimitConfig {
                period: "invalid".to_string(),
                ..Default::default()
            },
            RateLimitConfig {
                status_code: 42,
                ..Default::default()
            },
        ];
        for config in cases {
            let stage = RateLimitMiddleware::new();
            let section = ConfigValue::Section(Arc::new(config));
            assert!(matches!(
                stage.configure(Some(&section)),
                Err(ConfigureError::InvalidValue { .. })
            ));
        }
    }
}
