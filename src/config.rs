use clap::{Args, Parser};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("qr_poll_interval_ms must be shorter than the qr wait timeout")]
    PollIntervalTooLong,
}

#[derive(Args, Clone, Debug, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Capacity of the event dispatch queue.
    #[arg(long, env = "EMITTER_BUFFER_SIZE", default_value_t = 2048)]
    pub emitter_buffer_size: usize,

    /// Maximum number of events processed at once.
    #[arg(long, env = "HANDLER_SEMAPHORE_SIZE", default_value_t = 64)]
    pub handler_semaphore_size: usize,

    /// Raise protocol client logging to debug.
    #[arg(long, env = "DEBUG_WHATSMEOW", default_value_t = false)]
    pub debug_client: bool,

    #[arg(long, env = "QR_WAIT_TIMEOUT_SECS", default_value_t = 15)]
    pub qr_wait_timeout_secs: u64,

    #[arg(long, env = "QR_POLL_INTERVAL_MS", default_value_t = 200)]
    pub qr_poll_interval_ms: u64,

    /// How long an unpaired session may wait for a scan before it is discarded.
    #[arg(long, env = "PAIRING_WINDOW_SECS", default_value_t = 120)]
    pub pairing_window_secs: u64,

    #[arg(long, env = "FILE_STORAGE_DIR")]
    pub file_storage_dir: Option<PathBuf>,
}

#[derive(Parser)]
struct EnvOnly {
    #[command(flatten)]
    config: GatewayConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            emitter_buffer_size: 2048,
            handler_semaphore_size: 64,
            debug_client: false,
            qr_wait_timeout_secs: 15,
            qr_poll_interval_ms: 200,
            pairing_window_secs: 120,
            file_storage_dir: None,
        }
    }
}

impl GatewayConfig {
    /// Reads the configuration from environment variables, ignoring process arguments.
    pub fn from_env() -> Result<Self, clap::Error> {
        EnvOnly::try_parse_from(["whatsapp-gateway"]).map(|p| p.config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.emitter_buffer_size == 0 {
            return Err(ConfigError::Zero("emitter_buffer_size"));
        }
        if self.handler_semaphore_size == 0 {
            return Err(ConfigError::Zero("handler_semaphore_size"));
        }
        if self.qr_wait_timeout_secs == 0 {
            return Err(ConfigError::Zero("qr_wait_timeout_secs"));
        }
        if self.qr_poll_interval_ms == 0 {
            return Err(ConfigError::Zero("qr_poll_interval_ms"));
        }
        if self.pairing_window_secs == 0 {
            return Err(ConfigError::Zero("pairing_window_secs"));
        }
        if self.qr_poll_interval() >= self.qr_wait_timeout() {
            return Err(ConfigError::PollIntervalTooLong);
        }
        Ok(())
    }

    pub fn qr_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.qr_wait_timeout_secs)
    }

    pub fn qr_poll_interval(&self) -> Duration {
        Duration::from_millis(self.qr_poll_interval_ms)
    }

    pub fn pairing_window(&self) -> Duration {
        Duration::from_secs(self.pairing_window_secs)
    }
}
