//! Classifier that delegates a whole batch to an external collaborator

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::retry::{ClassificationState, RetryPolicy, Sleeper, TokioSleeper};
use super::{ClassifierError, IndexSummary, RiskClassifier};
use crate::standards::{RiskThresholds, Standard, StandardId};
use crate::types::RiskLevel;

/// Payload sent to the external classifier: one entry per record plus the
/// thresholds of the chosen standard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub standard: StandardId,
    pub thresholds: RiskThresholds,
    pub assessments: Vec<IndexSummary>,
}

impl ClassificationRequest {
    pub fn new(standard: &Standard, batch: &[IndexSummary]) -> Self {
        Self {
            standard: standard.id,
            thresholds: standard.thresholds,
            assessments: batch.to_vec(),
        }
    }
}

/// Expected reply: one result per requested id, no omissions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResponse {
    pub results: Vec<RiskResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskResult {
    pub id: u64,
    pub risk_level: RiskLevel,
}

impl ClassificationResponse {
    /// Match results against the request, rejecting unknown, duplicate or
    /// missing ids
    pub fn into_levels(
        self,
        request: &ClassificationRequest,
    ) -> Result<BTreeMap<u64, RiskLevel>, ClassifierError> {
        let expected: BTreeSet<u64> = request.assessments.iter().map(|a| a.id).collect();
        let mut levels = BTreeMap::new();

        for result in self.results {
            if !expected.contains(&result.id) {
                return Err(ClassifierError::UnexpectedResult(result.id));
            }
            if levels.insert(result.id, result.risk_level).is_some() {
                return Err(ClassifierError::DuplicateResult(result.id));
            }
        }

        if let Some(missing) = expected.iter().find(|id| !levels.contains_key(id)) {
            return Err(ClassifierError::MissingResult(*missing));
        }

        Ok(levels)
    }
}

/// External classification collaborator (a language model, a remote rules
/// service, ...). One call classifies a whole batch.
#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    async fn categorize(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationResponse, ClassifierError>;
}

#[async_trait]
impl<T: ClassifierBackend + ?Sized> ClassifierBackend for Arc<T> {
    async fn categorize(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationResponse, ClassifierError> {
        (**self).categorize(request).await
    }
}

/// Delegating classifier with bounded, sequential retries.
///
/// Every failure (backend error, timeout, malformed or incomplete response)
/// is retried as a unit until the policy's attempts run out. Dropping the
/// returned future abandons the in-flight call; nothing is retained between
/// calls.
pub struct DelegatedClassifier<B, S = TokioSleeper> {
    backend: B,
    sleeper: S,
    policy: RetryPolicy,
}

impl<B: ClassifierBackend> DelegatedClassifier<B, TokioSleeper> {
    pub fn new(backend: B, policy: RetryPolicy) -> Result<Self, ClassifierError> {
        Self::with_sleeper(backend, policy, TokioSleeper)
    }
}

impl<B: ClassifierBackend, S: Sleeper> DelegatedClassifier<B, S> {
    pub fn with_sleeper(backend: B, policy: RetryPolicy, sleeper: S) -> Result<Self, ClassifierError> {
        policy.validate()?;
        Ok(Self {
            backend,
            sleeper,
            policy,
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn attempt(
        &self,
        request: &ClassificationRequest,
    ) -> Result<BTreeMap<u64, RiskLevel>, ClassifierError> {
        let response = match self.policy.attempt_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.backend.categorize(request))
                .await
                .map_err(|_| ClassifierError::Timeout(limit))??,
            None => self.backend.categorize(request).await?,
        };
        response.into_levels(request)
    }
}

fn advance(state: &mut ClassificationState, next: ClassificationState) {
    debug!(from = ?state, to = ?next, "classification state");
    *state = next;
}

#[async_trait]
impl<B: ClassifierBackend, S: Sleeper> RiskClassifier for DelegatedClassifier<B, S> {
    async fn classify(
        &self,
        batch: &[IndexSummary],
        standard: &Standard,
    ) -> Result<BTreeMap<u64, RiskLevel>, ClassifierError> {
        if batch.is_empty() {
            return Ok(BTreeMap::new());
        }

        let request = ClassificationRequest::new(standard, batch);
        let mut state = ClassificationState::Idle;
        let mut attempt = 0;

        loop {
            attempt += 1;
            advance(&mut state, ClassificationState::Requesting { attempt });

            match self.attempt(&request).await {
                Ok(levels) => {
                    advance(&mut state, ClassificationState::Success { attempts: attempt });
                    info!(
                        records = levels.len(),
                        attempts = attempt,
                        standard = %standard.id,
                        "delegated classification succeeded"
                    );
                    return Ok(levels);
                }
                Err(err) if attempt >= self.policy.max_attempts || !err.is_transient() => {
                    advance(&mut state, ClassificationState::Failed { attempts: attempt });
                    warn!(attempts = attempt, error = %err, "delegated classification failed");
                    return Err(ClassifierError::Exhausted {
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
                Err(err) => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "classification attempt failed, retrying"
                    );
                    advance(&mut state, ClassificationState::Retrying { attempt, delay });
                    self.sleeper.sleep(delay).await;
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "delegated"
    }
}
