//! `AppConfig` — parsed once at process start via `clap`, every field also
//! readable from the environment variable of the same name (spec.md §6).
//!
//! Grounded on the teacher's `main.rs` `Args` (`clap::Parser` struct with
//! `#[arg(...)]` defaults), generalized with `env = "..."` since this system
//! is environment-first rather than CLI-first.

use clap::Parser;
use thiserror::Error;

const MIN_IDLE_TIMEOUT_SEC: u64 = 60;
const MAX_IDLE_TIMEOUT_SEC: u64 = 120;
const MIN_RATE_LIMIT_MAX: u32 = 10;
const MAX_RATE_LIMIT_MAX: u32 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("SERVER_SECRET is required and must not be empty")]
    MissingSecret,
    #[error(
        "IDLE_TIMEOUT_SEC must be between {MIN_IDLE_TIMEOUT_SEC} and {MAX_IDLE_TIMEOUT_SEC}, got {0}"
    )]
    IdleTimeoutOutOfRange(u64),
    #[error(
        "RATE_LIMIT_MAX must be between {MIN_RATE_LIMIT_MAX} and {MAX_RATE_LIMIT_MAX}, got {0}"
    )]
    RateLimitOutOfRange(u32),
    #[error("MAX_CHANNELS must be at least 1")]
    ZeroChannels,
    #[error("MAX_MESSAGE_SIZE must be at least 1")]
    ZeroMessageSize,
}

/// Server configuration, matching spec.md §6's table field-for-field.
#[derive(Parser, Debug, Clone)]
#[command(name = "relay", version, about = "Two-endpoint WebSocket relay")]
pub struct AppConfig {
    /// Shared secret clients must present at upgrade time.
    #[arg(long, env = "SERVER_SECRET")]
    pub server_secret: String,

    /// TCP port to bind.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Maximum UTF-8 byte length of an inbound frame.
    #[arg(long, env = "MAX_MESSAGE_SIZE", default_value_t = 104_857_600)]
    pub max_message_size: usize,

    /// Idle timeout enforced by the transport, clamped to 60-120s.
    #[arg(long, env = "IDLE_TIMEOUT_SEC", default_value_t = 90)]
    pub idle_timeout_sec: u64,

    /// Connections allowed per source IP per rate-limit window.
    #[arg(long, env = "RATE_LIMIT_MAX", default_value_t = 30)]
    pub rate_limit_max: u32,

    /// Rate-limit window length in seconds.
    #[arg(long, env = "RATE_LIMIT_WINDOW_SEC", default_value_t = 60)]
    pub rate_limit_window_sec: u64,

    /// Enable permessage-deflate compression on the websocket. Accepted and
    /// validated per the config contract but currently inert: neither axum's
    /// websocket extractor nor tokio-tungstenite implements permessage-deflate
    /// (see DESIGN.md).
    #[arg(long, env = "COMPRESSION", default_value_t = false)]
    pub compression: bool,

    /// Server-wide ceiling on concurrently open channels.
    #[arg(long, env = "MAX_CHANNELS", default_value_t = 4)]
    pub max_channels: usize,

    /// `tracing` filter directive, e.g. "debug", "info", "relay=debug".
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl AppConfig {
    /// Parse from CLI args and environment, then validate ranges.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_secret.trim().is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        if self.idle_timeout_sec < MIN_IDLE_TIMEOUT_SEC || self.idle_timeout_sec > MAX_IDLE_TIMEOUT_SEC
        {
            return Err(ConfigError::IdleTimeoutOutOfRange(self.idle_timeout_sec));
        }
        if self.rate_limit_max < MIN_RATE_LIMIT_MAX || self.rate_limit_max > MAX_RATE_LIMIT_MAX {
            return Err(ConfigError::RateLimitOutOfRange(self.rate_limit_max));
        }
        if self.max_channels == 0 {
            return Err(ConfigError::ZeroChannels);
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::ZeroMessageSize);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> AppConfig {
        AppConfig {
            server_secret: "s3cret".to_string(),
            port: 3000,
            max_message_size: 1024,
            idle_timeout_sec: 90,
            rate_limit_max: 30,
            rate_limit_window_sec: 60,
            compression: false,
            max_channels: 4,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn rejects_empty_secret() {
        let mut cfg = base();
        cfg.server_secret = "   ".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingSecret)));
    }

    #[test]
    fn rejects_idle_timeout_out_of_range() {
        let mut cfg = base();
        cfg.idle_timeout_sec = 10;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::IdleTimeoutOutOfRange(10))
        ));
    }

    #[test]
    fn accepts_defaults() {
        assert!(base().validate().is_ok());
    }
}
