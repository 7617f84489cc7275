//! Deterministic rule-table classifier

use async_trait::async_trait;
use std::collections::BTreeMap;

use super::{ClassifierError, IndexSummary, RiskClassifier};
use crate::standards::{RiskThresholds, Standard};
use crate::types::RiskLevel;

/// Multiple of a threshold above which a single index alone means high risk
pub const HIGH_RISK_FACTOR: f64 = 1.5;

/// Rule-based classifier.
///
/// - `HighRisk`: any index above 150% of its threshold, or more than one
///   index above its threshold
/// - `Moderate`: exactly one index above its threshold
/// - `Safe`: no index above its threshold
///
/// "Below its threshold" is read as "not above it": an index equal to its
/// threshold does not exceed it, so a sample sitting exactly on every
/// threshold (PLI 1 against a PLI threshold of 1) is `Safe`. NaN counts as
/// exceeding by an unbounded margin, so anomalous records never read as safe.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleClassifier;

impl RuleClassifier {
    pub fn new() -> Self {
        Self
    }
}

/// Classify one record's indices against a set of thresholds
pub fn classify_indices(summary: &IndexSummary, thresholds: &RiskThresholds) -> RiskLevel {
    let pairs = [
        (summary.hpi, thresholds.hpi),
        (summary.hei, thresholds.hei),
        (summary.cf, thresholds.cf),
        (summary.pli, thresholds.pli),
    ];

    let exceeding = pairs
        .iter()
        .filter(|(value, limit)| value.is_nan() || value > limit)
        .count();
    let severe = pairs
        .iter()
        .any(|(value, limit)| value.is_nan() || *value > limit * HIGH_RISK_FACTOR);

    if severe || exceeding > 1 {
        RiskLevel::HighRisk
    } else if exceeding == 1 {
        RiskLevel::Moderate
    } else {
        RiskLevel::Safe
    }
}

#[async_trait]
impl RiskClassifier for RuleClassifier {
    async fn classify(
        &self,
        batch: &[IndexSummary],
        standard: &Standard,
    ) -> Result<BTreeMap<u64, RiskLevel>, ClassifierError> {
        Ok(batch
            .iter()
            .map(|s| (s.id, classify_indices(s, &standard.thresholds)))
            .collect())
    }

    fn name(&self) -> &'static str {
        "rules"
    }
}
