//! Engine configuration
//!
//! Selects the standard, the classification strategy and the retry policy for
//! the delegated classifier. Loaded from and saved to JSON.

use serde::{Deserialize, Serialize};

use crate::classifier::RetryPolicy;
use crate::error::ComputeError;
use crate::standards::StandardId;

/// Which risk classifier a deployment runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierMode {
    /// Deterministic rule table
    #[default]
    Rules,
    /// External collaborator with retry/backoff
    Delegated,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub standard: StandardId,
    pub classifier: ClassifierMode,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            standard: StandardId::Who,
            classifier: ClassifierMode::Rules,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: Self = serde_json::from_str(json)?;
        config
            .retry
            .validate()
            .map_err(|e| ComputeError::InvalidConfig(e.to_string()))?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.classifier, ClassifierMode::Rules);
    }

    #[test]
    fn test_delegated_config() {
        let json = r#"{
            "standard": "BIS",
            "classifier": "delegated",
            "retry": {"max_attempts": 4, "initial_delay_ms": 500, "multiplier": 3.0}
        }"#;
        let config = EngineConfig::from_json(json).unwrap();
        assert_eq!(config.standard, StandardId::Bis);
        assert_eq!(config.classifier, ClassifierMode::Delegated);
        assert_eq!(config.retry.max_attempts, 4);

        let back = EngineConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_rejects_unknown_standard() {
        assert!(EngineConfig::from_json(r#"{"standard": "EPA"}"#).is_err());
    }

    #[test]
    fn test_rejects_flat_backoff() {
        let json = r#"{"retry": {"multiplier": 1.0}}"#;
        let err = EngineConfig::from_json(json).unwrap_err();
        assert!(matches!(err, ComputeError::InvalidConfig(_)));
        assert_eq!(err.stage(), crate::error::Stage::Configuration);
    }
}
