pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod net;

pub use config::{AppConfig, ConfigError};
pub use error::{ErrorCode, RelayError};
pub use metrics::{Metrics, MetricsSnapshot};

use std::sync::Arc;

use net::{ChannelRegistry, RateLimiter};

/// The single value constructed at startup and threaded, by reference, into
/// every handler. No component reaches for global state.
pub struct AppContext {
    pub config: AppConfig,
    pub registry: ChannelRegistry,
    pub rate_limiter: RateLimiter,
    pub metrics: Arc<Metrics>,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Arc<Self> {
        let metrics = Arc::new(Metrics::new());
        let registry = ChannelRegistry::new(config.max_channels, metrics.clone());
        let rate_limiter = RateLimiter::new(
            config.rate_limit_max,
            std::time::Duration::from_secs(config.rate_limit_window_sec),
        );
        Arc::new(Self {
            config,
            registry,
            rate_limiter,
            metrics,
        })
    }
}
