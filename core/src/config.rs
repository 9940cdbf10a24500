//! Facade configuration

use crate::hci::ClockAccuracy;
use crate::manager::ConnectionParameters;
use serde::{Deserialize, Serialize};

/// Settings for a [`LeAclFacade`](crate::facade::LeAclFacade)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacadeConfig {
    /// Timing fields placed in successful connection complete events.
    /// The connection manager does not report real values at that point.
    pub reported_parameters: ConnectionParameters,

    /// Clock accuracy placed in connection complete events
    pub clock_accuracy: ClockAccuracy,

    /// Name of the shared inbound data channel (shows up in logs)
    pub data_channel_name: String,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            reported_parameters: ConnectionParameters::default(),
            clock_accuracy: ClockAccuracy::Ppm20,
            data_channel_name: "FetchAclData".to_string(),
        }
    }
}

impl FacadeConfig {
    /// Set the reported connection parameters
    pub fn with_reported_parameters(mut self, parameters: ConnectionParameters) -> Self {
        self.reported_parameters = parameters;
        self
    }

    /// Set the reported clock accuracy
    pub fn with_clock_accuracy(mut self, accuracy: ClockAccuracy) -> Self {
        self.clock_accuracy = accuracy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FacadeConfig::default();
        assert_eq!(config.reported_parameters.interval, 1);
        assert_eq!(config.reported_parameters.latency, 2);
        assert_eq!(config.reported_parameters.supervision_timeout, 3);
        assert_eq!(config.clock_accuracy, ClockAccuracy::Ppm20);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: FacadeConfig =
            serde_json::from_str(r#"{"clock_accuracy":"Ppm50"}"#).expect("deserialize");
        assert_eq!(config.clock_accuracy, ClockAccuracy::Ppm50);
        assert_eq!(config.data_channel_name, "FetchAclData");
    }

    #[test]
    fn test_builder() {
        let params = ConnectionParameters {
            interval: 24,
            latency: 0,
            supervision_timeout: 72,
        };
        let config = FacadeConfig::default()
            .with_reported_parameters(params)
            .with_clock_accuracy(ClockAccuracy::Ppm500);
        assert_eq!(config.reported_parameters, params);
        assert_eq!(config.clock_accuracy, ClockAccuracy::Ppm500);
    }
}
