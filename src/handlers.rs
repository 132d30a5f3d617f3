use axum::body::Bytes;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use validator::Validate;

use crate::config::LimitRule;
use crate::error::{LimitError, LimitResult};
use crate::health::HealthChecker;
use crate::middleware::{ClientAddr, RequestId};
use crate::rate_limiter::RateLimiter;
use crate::response::LimitResponse;

/// Shared application state
pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub rate_limiter: Arc<RateLimiter>,
    pub health: HealthChecker,
}

impl AppState {
    pub fn new(rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            health: HealthChecker::new(rate_limiter.clone()),
            rate_limiter,
        }
    }
}

/// Per-request overrides of the configured rule.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct LimitOverrides {
    #[validate(length(min = 1))]
    pub zone: Option<String>,
    pub key: Option<String>,
    pub rate: Option<String>,
    #[validate(range(min = 0.0))]
    pub burst: Option<f64>,
    pub interval: Option<u64>,
}

impl LimitOverrides {
    pub fn from_body(body: &[u8]) -> LimitResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let overrides: Self = serde_json::from_slice(body)
            .map_err(|e| LimitError::Config(format!("Invalid limit request: {}", e)))?;
        overrides.validate()?;
        Ok(overrides)
    }

    pub fn apply(self, base: &LimitRule) -> LimitRule {
        LimitRule {
            zone: self.zone.unwrap_or_else(|| base.zone.clone()),
            key: self.key.or_else(|| base.key.clone()),
            rate: self.rate.unwrap_or_else(|| base.rate.clone()),
            burst: self.burst.unwrap_or(base.burst),
            interval: self.interval.unwrap_or(base.interval),
        }
    }
}

/// Decide whether the calling request may proceed.
pub async fn check_limit(
    State(state): State<SharedState>,
    Extension(ClientAddr(client_addr)): Extension<ClientAddr>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    body: Bytes,
) -> Result<LimitResponse, LimitError> {
    let rule = LimitOverrides::from_body(&body)?.apply(state.rate_limiter.default_rule());
    let key = rule.resolve_key(&client_addr);
    let verdict = state.rate_limiter.limit(&rule, &client_addr).await;
    debug!(
        request_id = %request_id,
        zone = %rule.zone,
        key = %key,
        verdict = %verdict,
        "Limit decision"
    );
    Ok(LimitResponse::new(verdict, &rule.zone, key).with_request_id(request_id))
}

/// Replica health; always 200 since the limiter keeps admitting traffic.
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.health.check_health().await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_keeps_rule() {
        let base = LimitRule::default();
        let rule = LimitOverrides::from_body(b"").unwrap().apply(&base);
        assert_eq!(rule, base);
        let rule = LimitOverrides::from_body(b"  \n").unwrap().apply(&base);
        assert_eq!(rule, base);
    }

    #[test]
    fn test_overrides_applied() {
        let base = LimitRule::default();
        let body = br#"{"zone":"login","rate":"5r/m","burst":3,"interval":600}"#;
        let rule = LimitOverrides::from_body(body).unwrap().apply(&base);
        assert_eq!(rule.zone, "login");
        assert_eq!(rule.rate, "5r/m");
        assert_eq!(rule.burst, 3.0);
        assert_eq!(rule.interval, 600);
        assert_eq!(rule.key, None);
    }

    #[test]
    fn test_invalid_overrides_rejected() {
        assert!(matches!(
            LimitOverrides::from_body(b"{oops"),
            Err(LimitError::Config(_))
        ));
        assert!(matches!(
            LimitOverrides::from_body(br#"{"zone":""}"#),
            Err(LimitError::Validation(_))
        ));
        assert!(matches!(
            LimitOverrides::from_body(br#"{"burst":-2}"#),
            Err(LimitError::Validation(_))
        ));
    }
}
