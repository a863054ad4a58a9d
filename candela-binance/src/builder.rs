use std::sync::Arc;
use std::time::Duration;

use candela_core::ExchangeClient;
use candela_middleware::ClientBuilder;
use candela_types::QuotaConfig;

use crate::BinanceClient;

/// Request weight budget Binance grants per minute for the klines endpoint.
const DEFAULT_REQUESTS_PER_MINUTE: u64 = 1_200;

impl BinanceClient {
    /// Returns an unconfigured builder around the default client.
    ///
    /// Customize with the builder methods before calling `.build()`.
    #[must_use]
    pub fn builder() -> ClientBuilder {
        let raw: Arc<dyn ExchangeClient> = Arc::new(Self::new_default());
        ClientBuilder::new(raw)
    }

    /// Returns a builder that paces requests under the public per-minute limit.
    #[must_use]
    pub fn rate_limited() -> ClientBuilder {
        Self::builder().with_quota(&QuotaConfig {
            limit: DEFAULT_REQUESTS_PER_MINUTE,
            window: Duration::from_secs(60),
        })
    }
}
