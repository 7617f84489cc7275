//! Risk classification
//!
//! Maps computed indices plus a standard's thresholds to a [`RiskLevel`].
//! Two strategies share the [`RiskClassifier`] contract:
//!
//! - [`RuleClassifier`]: deterministic rule table, no external dependency
//! - [`DelegatedClassifier`]: hands the whole batch to an external
//!   [`ClassifierBackend`] with bounded retry and exponential backoff
//!
//! Which one runs is a deployment decision (see [`crate::config::ClassifierMode`]).

mod delegated;
mod prompt;
mod retry;
mod rules;

pub use delegated::{
    ClassificationRequest, ClassificationResponse, ClassifierBackend, DelegatedClassifier,
    RiskResult,
};
pub use prompt::{PromptBackend, TextGenerator};
pub use retry::{ClassificationState, RetryPolicy, Sleeper, TokioSleeper};
pub use rules::{classify_indices, RuleClassifier};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::standards::Standard;
use crate::types::{ComputedIndices, RiskLevel};

/// The four index values a classifier sees for one record.
///
/// CF is reduced to a single scalar: the maximum across metals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexSummary {
    pub id: u64,
    pub hpi: f64,
    pub hei: f64,
    pub cf: f64,
    pub pli: f64,
}

impl IndexSummary {
    pub fn from_indices(id: u64, indices: &ComputedIndices) -> Self {
        Self {
            id,
            hpi: indices.hpi,
            hei: indices.hei,
            cf: indices.cf_max(),
            pli: indices.pli,
        }
    }
}

/// Common contract for both classification strategies.
///
/// Implementations return exactly one level per input id, or fail the whole
/// batch.
#[async_trait]
pub trait RiskClassifier: Send + Sync {
    /// Classify a batch of records against a standard's thresholds
    async fn classify(
        &self,
        batch: &[IndexSummary],
        standard: &Standard,
    ) -> Result<BTreeMap<u64, RiskLevel>, ClassifierError>;

    /// Short strategy name for logs
    fn name(&self) -> &'static str;
}

/// Errors raised by a classifier
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifierError {
    #[error("classifier backend failed: {0}")]
    Backend(String),

    #[error("classifier call timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed classifier response: {0}")]
    MalformedResponse(String),

    #[error("classifier response has no result for id {0}")]
    MissingResult(u64),

    #[error("classifier response has a result for unknown id {0}")]
    UnexpectedResult(u64),

    #[error("classifier response has more than one result for id {0}")]
    DuplicateResult(u64),

    #[error("invalid retry policy: {0}")]
    InvalidPolicy(String),

    #[error("classification failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<ClassifierError>,
    },
}

impl ClassifierError {
    /// Whether another attempt could succeed
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            ClassifierError::InvalidPolicy(_) | ClassifierError::Exhausted { .. }
        )
    }
}
