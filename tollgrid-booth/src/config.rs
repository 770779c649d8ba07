//! Configuration for a toll-booth orchestrator

use std::time::Duration;

/// Booth orchestrator configuration
#[derive(Debug, Clone)]
pub struct BoothConfig {
    /// Identifier of the tollbooth this orchestrator runs for; also its
    /// routing key in every topic it publishes or filters on
    pub tollbooth_id: String,

    /// How long a camera or toll-price round trip may stay outstanding
    /// before its correlation entry is evicted and the crossing rolled back
    pub response_timeout: Duration,
}

impl Default for BoothConfig {
    fn default() -> Self {
        Self {
            tollbooth_id: "MI_Ovest".to_string(),
            response_timeout: Duration::from_secs(30),
        }
    }
}

impl BoothConfig {
    /// Create a config for the given tollbooth
    pub fn new(tollbooth_id: impl Into<String>) -> Self {
        Self {
            tollbooth_id: tollbooth_id.into(),
            ..Default::default()
        }
    }

    /// Set the request/response timeout
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = BoothConfig::new("TO_Sud").with_response_timeout(Duration::from_secs(5));

        assert_eq!(config.tollbooth_id, "TO_Sud");
        assert_eq!(config.response_timeout, Duration::from_secs(5));
    }
}
