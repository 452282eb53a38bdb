//! Pool configuration options.

use crate::config::{ConfigError, ProtocolConfig};
use serde::{Deserialize, Serialize};

/// Pool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of committed events to retain in memory.
    pub max_events: usize,
    /// Protocol-wide parameters.
    pub protocol: ProtocolConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            protocol: ProtocolConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn new(protocol: ProtocolConfig) -> Self {
        Self {
            protocol,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_events == 0 {
            return Err(ConfigError::InvalidProtocol {
                reason: "max_events must be positive".to_string(),
            });
        }
        self.protocol.validate()
    }
}
