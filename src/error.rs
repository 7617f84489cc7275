//! Error types for Aqua Index

use std::fmt;

use thiserror::Error;

use crate::classifier::ClassifierError;

/// Pipeline stage an error originated from.
///
/// Callers use this to decide whether a failed run can be resumed from the
/// classification step without recomputing indices. Index calculation has no
/// stage of its own: it never fails a batch, bad rows become [`RowValidationError`]s
/// and anomalies stay visible as NaN or infinity in the indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Configuration,
    Ingest,
    Classification,
    Encoding,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Configuration => "configuration",
            Stage::Ingest => "ingest",
            Stage::Classification => "classification",
            Stage::Encoding => "encoding",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during an assessment run
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Unknown standard: {0}")]
    UnknownStandard(String),

    #[error("Invalid standard {standard}: {reason}")]
    InvalidStandard { standard: String, reason: String },

    #[error("Failed to parse input rows: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("Risk classification failed: {0}")]
    Classification(#[from] ClassifierError),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

impl ComputeError {
    /// Stage of the run that produced this error
    pub fn stage(&self) -> Stage {
        match self {
            ComputeError::UnknownStandard(_)
            | ComputeError::InvalidStandard { .. }
            | ComputeError::InvalidConfig(_) => Stage::Configuration,
            ComputeError::ParseError(_) | ComputeError::JsonError(_) => Stage::Ingest,
            ComputeError::Classification(_) => Stage::Classification,
            ComputeError::EncodingError(_) => Stage::Encoding,
        }
    }
}

/// Reasons a single input row is rejected before computation
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowValidationError {
    #[error("{metal} is missing")]
    MissingMetal { metal: String },

    #[error("{metal} is not a number: {value}")]
    NotNumeric { metal: String, value: String },

    #[error("{metal} is not finite")]
    NonFinite { metal: String },

    #[error("{metal} is negative: {value}")]
    Negative { metal: String, value: f64 },

    #[error("duplicate id {id}")]
    DuplicateId { id: u64 },

    #[error("{field} is not valid: {value}")]
    InvalidField { field: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_mapping() {
        assert_eq!(
            ComputeError::UnknownStandard("EPA".to_string()).stage(),
            Stage::Configuration
        );
        assert_eq!(
            ComputeError::InvalidConfig("no backend".to_string()).stage(),
            Stage::Configuration
        );
        let err = ComputeError::from(ClassifierError::Exhausted {
            attempts: 3,
            last: Box::new(ClassifierError::Backend("quota".to_string())),
        });
        assert_eq!(err.stage(), Stage::Classification);
        assert_eq!(Stage::Classification.to_string(), "classification");
    }

    #[test]
    fn test_row_error_messages() {
        let err = RowValidationError::NotNumeric {
            metal: "Pb".to_string(),
            value: "n/a".to_string(),
        };
        assert_eq!(err.to_string(), "Pb is not a number: n/a");
    }
}
