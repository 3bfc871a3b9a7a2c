//! Publisher configuration

use std::net::SocketAddr;

use rust_decimal::Decimal;

use crate::error::PublisherError;
use crate::generator::GeneratorConfig;

/// Settings for one publisher process.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Address the listener binds to.
    pub listen_addr: SocketAddr,
    /// Symbol stamped on every message.
    pub symbol: String,
    /// Target delta rate in updates per second.
    pub rate: u32,
    /// Synthetic book shape.
    pub generator: GeneratorConfig,
    /// Optional RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            symbol: "BTC/USD".to_string(),
            rate: 10,
            generator: GeneratorConfig::default(),
            seed: None,
        }
    }
}

impl PublisherConfig {
    /// Reject settings the pacing loop or generator cannot run with.
    pub fn validate(&self) -> Result<(), PublisherError> {
        if self.rate == 0 {
            return Err(PublisherError::InvalidConfig(
                "rate must be at least 1 update/sec".to_string(),
            ));
        }
        if self.generator.depth == 0 {
            return Err(PublisherError::InvalidConfig(
                "depth must be at least 1 level per side".to_string(),
            ));
        }
        if self.symbol.trim().is_empty() {
            return Err(PublisherError::InvalidConfig("symbol must not be empty".to_string()));
        }
        let mid = self.generator.mid_price;
        let span = self
            .generator
            .level_spacing
            .checked_mul(Decimal::from(self.generator.depth as u64));
        // Widest ask plus one jitter step must stay representable
        let highest_ask = span
            .and_then(|span| mid.checked_add(span))
            .and_then(|ask| ask.checked_add(self.generator.price_jitter));
        if highest_ask.is_none() {
            return Err(PublisherError::InvalidConfig(format!(
                "mid price {} too high for depth {}",
                mid, self.generator.depth
            )));
        }
        let lowest_bid = span.and_then(|span| mid.checked_sub(span));
        if !matches!(lowest_bid, Some(bid) if bid > Decimal::ZERO) {
            return Err(PublisherError::InvalidConfig(format!(
                "mid price {} too low for depth {}",
                mid, self.generator.depth
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PublisherConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.symbol, "BTC/USD");
        assert_eq!(config.rate, 10);
        assert_eq!(config.listen_addr.port(), 8080);
    }

    #[test]
    fn test_zero_rate_rejected() {
        let config = PublisherConfig {
            rate: 0,
            ..PublisherConfig::default()
        };
        assert!(matches!(config.validate(), Err(PublisherError::InvalidConfig(_))));
    }

    #[test]
    fn test_mid_price_must_clear_depth() {
        let config = PublisherConfig {
            generator: GeneratorConfig {
                mid_price: Decimal::from(5),
                ..GeneratorConfig::default()
            },
            ..PublisherConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mid_price_overflow_rejected() {
        let config = PublisherConfig {
            generator: GeneratorConfig {
                mid_price: Decimal::MAX,
                ..GeneratorConfig::default()
            },
            ..PublisherConfig::default()
        };
        match config.validate() {
            Err(PublisherError::InvalidConfig(msg)) => assert!(msg.contains("too high")),
            other => panic!("expected InvalidConfig, got {other:?}"),
        }

        let config = PublisherConfig {
            generator: GeneratorConfig {
                level_spacing: Decimal::MAX,
                ..GeneratorConfig::default()
            },
            ..PublisherConfig::default()
        };
        assert!(matches!(config.validate(), Err(PublisherError::InvalidConfig(_))));
    }
}
