//! Subscriber configuration

use std::net::SocketAddr;
use std::time::Duration;

use book_types::book::MAX_DEPTH;

use crate::error::SubscriberError;
use crate::queue::DEFAULT_OVERLOAD_THRESHOLD;
use crate::reconstruction::ReconstructionConfig;

/// Settings for one subscriber process.
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Publisher address.
    pub connect_addr: SocketAddr,
    /// Reconstruction cadence and mirror depth.
    pub reconstruction: ReconstructionConfig,
    /// Queue length above which a dequeue raises an overload signal.
    pub overload_threshold: usize,
    /// How often the binary logs its headless report.
    pub report_interval: Duration,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            connect_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            reconstruction: ReconstructionConfig::default(),
            overload_threshold: DEFAULT_OVERLOAD_THRESHOLD,
            report_interval: Duration::from_secs(1),
        }
    }
}

impl SubscriberConfig {
    pub fn validate(&self) -> Result<(), SubscriberError> {
        if self.reconstruction.tick_interval.is_zero() {
            return Err(SubscriberError::InvalidConfig(
                "tick interval must be positive".to_string(),
            ));
        }
        if self.reconstruction.depth == 0 || self.reconstruction.depth > MAX_DEPTH {
            return Err(SubscriberError::InvalidConfig(format!(
                "depth must be between 1 and {MAX_DEPTH}"
            )));
        }
        if self.report_interval.is_zero() {
            return Err(SubscriberError::InvalidConfig(
                "report interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
