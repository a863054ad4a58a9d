//! Builder for composing clients with middleware layers.
//!
//! Layers form an "onion" around the raw client. The `layers` vector stores
//! middleware outermost-first; `build()` applies them in reverse so that
//! `layers[0]` ends up wrapping everything else.

use std::sync::Arc;
use std::time::Duration;

use candela_core::{ExchangeClient, Middleware};
use candela_types::QuotaConfig;

const QUOTA: &str = "QuotaAwareClient";

/// Middleware builder for composing an exchange client with layered wrappers.
pub struct ClientBuilder {
    raw: Arc<dyn ExchangeClient>,
    /// Middleware layers in outermost-first order.
    layers: Vec<Box<dyn Middleware>>,
}

impl ClientBuilder {
    /// Create a new builder from a raw, unwrapped client.
    #[must_use]
    pub fn new(raw: Arc<dyn ExchangeClient>) -> Self {
        Self {
            raw,
            layers: Vec::new(),
        }
    }

    fn existing_quota_config(&self) -> Option<QuotaConfig> {
        let layer = self.layers.iter().find(|l| l.name() == QUOTA)?;
        let cfg = layer.config_json();
        let defaults = QuotaConfig::default();
        let limit = cfg
            .get("limit")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(defaults.limit);
        let window = cfg
            .get("window_ms")
            .and_then(serde_json::Value::as_u64)
            .map_or(defaults.window, Duration::from_millis);
        Some(QuotaConfig { limit, window })
    }

    /// Add or replace quota configuration as the outermost layer.
    #[must_use]
    pub fn with_quota(mut self, cfg: &QuotaConfig) -> Self {
        self.layers.retain(|m| m.name() != QUOTA);
        self.layers
            .insert(0, Box::new(crate::quota::QuotaMiddleware::new(cfg.clone())));
        self
    }

    /// Remove quota if present.
    #[must_use]
    pub fn without_quota(mut self) -> Self {
        self.layers.retain(|m| m.name() != QUOTA);
        self
    }

    /// Shortcut: set quota limit only (preserves an existing window).
    #[must_use]
    pub fn quota_limit(self, limit: u64) -> Self {
        let mut cfg = self.existing_quota_config().unwrap_or_default();
        cfg.limit = limit;
        self.with_quota(&cfg)
    }

    /// Shortcut: set quota window only (preserves an existing limit).
    #[must_use]
    pub fn quota_window(self, window: Duration) -> Self {
        let mut cfg = self.existing_quota_config().unwrap_or_default();
        cfg.window = window;
        self.with_quota(&cfg)
    }

    /// Names of configured layers, outermost first, followed by the raw client.
    #[must_use]
    pub fn describe(&self) -> Vec<(String, serde_json::Value)> {
        self.layers
            .iter()
            .map(|l| (l.name().to_string(), l.config_json()))
            .chain(std::iter::once((
                "RawClient".to_string(),
                serde_json::json!({ "name": self.raw.name() }),
            )))
            .collect()
    }

    /// Build the wrapped client by applying layers innermost to outermost.
    #[must_use]
    pub fn build(self) -> Arc<dyn ExchangeClient> {
        let mut wrapped: Arc<dyn ExchangeClient> = self.raw;
        for layer in self.layers.into_iter().rev() {
            wrapped = layer.apply(wrapped);
        }
        wrapped
    }
}
