//! Pipeline orchestration
//!
//! Runs a batch of samples through the engine:
//! 1. Resolve the standard from the registry
//! 2. Validate rows (missing metals, non-finite or negative values, duplicate ids)
//! 3. Compute indices for every accepted row, in parallel
//! 4. Classify the whole batch
//!
//! Bad rows never abort the batch: they are collected as [`RowError`]s next to
//! the records. Records keep input order.

use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::classifier::{
    classify_indices, ClassifierBackend, ClassifierError, DelegatedClassifier, IndexSummary,
    RiskClassifier, RuleClassifier,
};
use crate::config::{ClassifierMode, EngineConfig};
use crate::error::{ComputeError, RowValidationError};
use crate::indices::IndexCalculator;
use crate::ingest::IngestedRows;
use crate::standards::{Standard, StandardId, StandardsRegistry};
use crate::types::{
    AssessmentBatch, AssessmentRecord, ComputedIndices, RiskLevel, RowError, Sample,
};

/// Assess a batch with the rule classifier, synchronously.
///
/// # Example
/// ```ignore
/// let registry = StandardsRegistry::builtin();
/// let batch = assess(&samples, StandardId::Who, &registry)?;
/// for record in &batch.records {
///     println!("{}: {}", record.location(), record.risk);
/// }
/// ```
pub fn assess(
    rows: &[Sample],
    standard: StandardId,
    registry: &StandardsRegistry,
) -> Result<AssessmentBatch, ComputeError> {
    let standard = registry.resolve(standard)?;
    let computed = compute_rows(enumerate_rows(rows), standard)?;
    Ok(classify_with_rules(computed))
}

/// Same as [`assess`], for rows coming out of [`crate::ingest::RowIngestor`]
pub fn assess_ingested(
    ingested: IngestedRows,
    standard: StandardId,
    registry: &StandardsRegistry,
) -> Result<AssessmentBatch, ComputeError> {
    let standard = registry.resolve(standard)?;
    let computed = compute_rows(ingested, standard)?;
    Ok(classify_with_rules(computed))
}

fn classify_with_rules(computed: ComputedBatch) -> AssessmentBatch {
    let thresholds = &computed.standard.thresholds;
    let records = computed
        .rows
        .iter()
        .map(|row| {
            let summary = IndexSummary::from_indices(row.sample.id, &row.indices);
            row.to_record(classify_indices(&summary, thresholds))
        })
        .collect();

    AssessmentBatch {
        standard: computed.standard.id,
        records,
        row_errors: computed.row_errors,
    }
}

/// One accepted row with its indices
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedRow {
    /// Zero-based position in the input
    pub index: usize,
    pub sample: Sample,
    pub indices: ComputedIndices,
}

impl ComputedRow {
    fn to_record(&self, risk: RiskLevel) -> AssessmentRecord {
        AssessmentRecord {
            sample: self.sample.clone(),
            indices: self.indices.clone(),
            risk,
        }
    }
}

/// Output of the calculation stage.
///
/// Holds everything the classification stage needs, so a failed
/// classification can be retried without recomputing indices.
#[derive(Debug, Clone)]
pub struct ComputedBatch {
    pub standard: Standard,
    /// Accepted rows, in input order
    pub rows: Vec<ComputedRow>,
    /// Rejected rows, ordered by input position
    pub row_errors: Vec<RowError>,
}

impl ComputedBatch {
    /// Classifier view of every accepted row
    pub fn summaries(&self) -> Vec<IndexSummary> {
        self.rows
            .iter()
            .map(|row| IndexSummary::from_indices(row.sample.id, &row.indices))
            .collect()
    }
}

/// Batch assessor with a configurable classification strategy
pub struct Assessor {
    registry: StandardsRegistry,
    classifier: Box<dyn RiskClassifier>,
}

impl Default for Assessor {
    fn default() -> Self {
        Self::new(StandardsRegistry::builtin())
    }
}

impl Assessor {
    /// Assessor using the rule classifier
    pub fn new(registry: StandardsRegistry) -> Self {
        Self::with_classifier(registry, Box::new(RuleClassifier::new()))
    }

    pub fn with_classifier(
        registry: StandardsRegistry,
        classifier: Box<dyn RiskClassifier>,
    ) -> Self {
        Self {
            registry,
            classifier,
        }
    }

    /// Assessor with the classifier a deployment configured.
    ///
    /// `Delegated` wraps `backend` in a [`DelegatedClassifier`] driven by
    /// `config.retry`, and fails at the configuration stage when no backend
    /// is given. `Rules` ignores `backend`.
    pub fn from_config(
        config: &EngineConfig,
        registry: StandardsRegistry,
        backend: Option<Arc<dyn ClassifierBackend>>,
    ) -> Result<Self, ComputeError> {
        let classifier: Box<dyn RiskClassifier> = match config.classifier {
            ClassifierMode::Rules => Box::new(RuleClassifier::new()),
            ClassifierMode::Delegated => {
                let backend = backend.ok_or_else(|| {
                    ComputeError::InvalidConfig(
                        "delegated classifier configured without a backend".to_string(),
                    )
                })?;
                let delegated = DelegatedClassifier::new(backend, config.retry.clone())
                    .map_err(|e| ComputeError::InvalidConfig(e.to_string()))?;
                Box::new(delegated)
            }
        };
        debug!(classifier = classifier.name(), "assessor configured");
        Ok(Self::with_classifier(registry, classifier))
    }

    pub fn registry(&self) -> &StandardsRegistry {
        &self.registry
    }

    pub fn classifier_name(&self) -> &'static str {
        self.classifier.name()
    }

    /// Calculation stage for already-typed samples
    pub fn compute(
        &self,
        rows: &[Sample],
        standard: StandardId,
    ) -> Result<ComputedBatch, ComputeError> {
        let standard = self.registry.resolve(standard)?;
        compute_rows(enumerate_rows(rows), standard)
    }

    /// Calculation stage for ingested rows; ingestion errors are carried over
    pub fn compute_ingested(
        &self,
        ingested: IngestedRows,
        standard: StandardId,
    ) -> Result<ComputedBatch, ComputeError> {
        let standard = self.registry.resolve(standard)?;
        compute_rows(ingested, standard)
    }

    /// Classification stage.
    ///
    /// Takes the computed batch by reference so the same batch can be
    /// classified again after a failure.
    pub async fn classify(&self, computed: &ComputedBatch) -> Result<AssessmentBatch, ComputeError> {
        let summaries = computed.summaries();
        debug!(
            classifier = self.classifier_name(),
            records = summaries.len(),
            "classifying batch"
        );

        let levels = self
            .classifier
            .classify(&summaries, &computed.standard)
            .await?;

        let mut records = Vec::with_capacity(computed.rows.len());
        for row in &computed.rows {
            let risk = levels
                .get(&row.sample.id)
                .copied()
                .ok_or(ClassifierError::MissingResult(row.sample.id))?;
            records.push(row.to_record(risk));
        }

        let batch = AssessmentBatch {
            standard: computed.standard.id,
            records,
            row_errors: computed.row_errors.clone(),
        };
        info!(
            standard = %batch.standard,
            records = batch.records.len(),
            rejected = batch.row_errors.len(),
            "batch assessed"
        );
        Ok(batch)
    }

    /// Both stages in one call
    pub async fn assess(
        &self,
        rows: &[Sample],
        standard: StandardId,
    ) -> Result<AssessmentBatch, ComputeError> {
        let computed = self.compute(rows, standard)?;
        self.classify(&computed).await
    }
}

fn enumerate_rows(rows: &[Sample]) -> IngestedRows {
    IngestedRows {
        rows: rows.iter().cloned().enumerate().collect(),
        row_errors: Vec::new(),
    }
}

/// Orchestrator-level row checks on top of ingestion: every metal present,
/// finite and non-negative, and ids unique (first occurrence wins).
pub fn screen_rows(ingested: IngestedRows) -> IngestedRows {
    let IngestedRows {
        rows,
        mut row_errors,
    } = ingested;

    let mut seen = HashSet::with_capacity(rows.len());
    let mut accepted = Vec::with_capacity(rows.len());
    for (index, sample) in rows {
        let mut errors = sample.validate();
        if !seen.insert(sample.id) {
            errors.push(RowValidationError::DuplicateId { id: sample.id });
        }

        if errors.is_empty() {
            accepted.push((index, sample));
        } else {
            warn!(
                row = index + 1,
                id = sample.id,
                errors = errors.len(),
                "rejected sample"
            );
            row_errors.push(RowError {
                index,
                id: Some(sample.id),
                location: Some(sample.location),
                errors,
            });
        }
    }
    row_errors.sort_by_key(|e| e.index);

    IngestedRows {
        rows: accepted,
        row_errors,
    }
}

fn compute_rows(ingested: IngestedRows, standard: &Standard) -> Result<ComputedBatch, ComputeError> {
    let total = ingested.total();

    // Stage 1: validate sequentially, duplicate detection depends on order.
    // A batch where every row is rejected is still a batch: no records, all
    // row errors.
    let IngestedRows {
        rows: accepted,
        row_errors,
    } = screen_rows(ingested);

    // Stage 2: per-row indices; indexed collect keeps input order
    let limits = &standard.limits;
    let computed: Vec<ComputedRow> = accepted
        .into_par_iter()
        .map(|(index, sample)| {
            let indices = IndexCalculator::compute(&sample.concentrations, limits);
            ComputedRow {
                index,
                sample,
                indices,
            }
        })
        .collect();

    for row in computed.iter().filter(|r| !r.indices.is_finite()) {
        warn!(id = row.sample.id, "indices are not finite");
    }
    debug!(
        standard = %standard.id,
        total,
        accepted = computed.len(),
        rejected = row_errors.len(),
        "indices computed"
    );

    Ok(ComputedBatch {
        standard: standard.clone(),
        rows: computed,
        row_errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use crate::types::{Metal, MetalConcentration};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn at_permissible(id: u64) -> Sample {
        Sample::new(
            id,
            format!("Well {id}"),
            MetalConcentration::from_values([0.01, 0.003, 0.05, 0.01, 5.0]),
        )
    }

    fn polluted(id: u64) -> Sample {
        Sample::new(
            id,
            format!("Drain {id}"),
            MetalConcentration::from_values([0.05, 0.02, 0.3, 0.1, 12.0]),
        )
    }

    #[test]
    fn test_assess_keeps_input_order() {
        let rows: Vec<Sample> = (1..=200)
            .map(|id| if id % 3 == 0 { polluted(id) } else { at_permissible(id) })
            .collect();
        let batch = assess(&rows, StandardId::Who, &StandardsRegistry::builtin()).unwrap();

        let ids: Vec<u64> = batch.records.iter().map(|r| r.id()).collect();
        assert_eq!(ids, (1..=200).collect::<Vec<_>>());
        assert!(batch.is_complete());
        assert_eq!(batch.by_risk(RiskLevel::HighRisk).count(), 66);
        assert_eq!(batch.by_risk(RiskLevel::Safe).count(), 134);
    }

    #[test]
    fn test_malformed_row_is_collected() {
        let mut broken = at_permissible(2);
        broken.concentrations.insert(Metal::Pb, f64::NAN);
        let rows = vec![at_permissible(1), broken, at_permissible(3)];

        let batch = assess(&rows, StandardId::Who, &StandardsRegistry::builtin()).unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.row_errors.len(), 1);
        assert_eq!(batch.row_errors[0].index, 1);
        assert_eq!(
            batch.row_errors[0].errors,
            vec![RowValidationError::NonFinite {
                metal: "Pb".to_string()
            }]
        );
        assert!(batch.records.iter().all(|r| r.indices.is_finite()));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let rows = vec![at_permissible(7), polluted(7)];
        let batch = assess(&rows, StandardId::Who, &StandardsRegistry::builtin()).unwrap();

        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].location(), "Well 7");
        assert_eq!(
            batch.row_errors[0].errors,
            vec![RowValidationError::DuplicateId { id: 7 }]
        );
    }

    #[test]
    fn test_all_rows_rejected_keeps_row_errors() {
        let mut broken = at_permissible(1);
        broken.concentrations.insert(Metal::Pb, f64::NAN);

        let batch = assess(&[broken], StandardId::Who, &StandardsRegistry::builtin()).unwrap();
        assert_eq!(batch.records.len(), 0);
        assert_eq!(batch.row_errors.len(), 1);
        assert_eq!(batch.row_errors[0].id, Some(1));
        assert_eq!(
            batch.row_errors[0].errors,
            vec![RowValidationError::NonFinite {
                metal: "Pb".to_string()
            }]
        );
    }

    #[test]
    fn test_empty_input_is_empty_batch() {
        let batch = assess(&[], StandardId::Bis, &StandardsRegistry::builtin()).unwrap();
        assert_eq!(batch.standard, StandardId::Bis);
        assert!(batch.records.is_empty());
        assert!(batch.row_errors.is_empty());
    }

    #[tokio::test]
    async fn test_assessor_classifies_all_rejected_batch() {
        let missing = Sample::new(1, "Empty", MetalConcentration::new());
        let batch = Assessor::default()
            .assess(&[missing], StandardId::Who)
            .await
            .unwrap();
        assert!(batch.records.is_empty());
        assert_eq!(batch.row_errors.len(), 1);
    }

    #[test]
    fn test_unregistered_standard_is_configuration_error() {
        let builtin = StandardsRegistry::builtin();
        let who = builtin.resolve(StandardId::Who).unwrap().clone();
        let registry = StandardsRegistry::from_standards([who]).unwrap();

        let err = assess(&[at_permissible(1)], StandardId::Bis, &registry).unwrap_err();
        assert_eq!(err.stage(), Stage::Configuration);
    }

    #[test]
    fn test_compute_ingested_merges_row_errors() {
        let json = r#"[
            {"id": 1, "As": 0.01, "Cd": 0.003, "Cr": 0.05, "Pb": 0.01, "Zn": 5.0},
            {"id": 2, "As": 0.01, "Cd": 0.003, "Cr": 0.05, "Pb": "n/a", "Zn": 5.0},
            {"id": 3, "As": -0.01, "Cd": 0.003, "Cr": 0.05, "Pb": 0.01, "Zn": 5.0},
            {"id": 4, "As": 0.01, "Cd": 0.003, "Cr": 0.05, "Pb": 0.01, "Zn": 5.0}
        ]"#;
        let records = crate::ingest::RowIngestor::parse_array(json).unwrap();
        let ingested = crate::ingest::RowIngestor::ingest(records);

        let computed = Assessor::default()
            .compute_ingested(ingested, StandardId::Who)
            .unwrap();
        let indices: Vec<usize> = computed.rows.iter().map(|r| r.index).collect();
        let rejected: Vec<usize> = computed.row_errors.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 3]);
        assert_eq!(rejected, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_rule_assessor_matches_sync_path() {
        let rows = vec![at_permissible(1), polluted(2)];
        let registry = StandardsRegistry::builtin();

        let sync_batch = assess(&rows, StandardId::Bis, &registry).unwrap();
        let async_batch = Assessor::new(registry)
            .assess(&rows, StandardId::Bis)
            .await
            .unwrap();

        assert_eq!(sync_batch.records, async_batch.records);
    }

    /// Backend that never answers
    struct DownBackend {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ClassifierBackend for DownBackend {
        async fn categorize(
            &self,
            _request: &crate::classifier::ClassificationRequest,
        ) -> Result<crate::classifier::ClassificationResponse, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ClassifierError::Backend("connection refused".to_string()))
        }
    }

    fn delegated_config(max_attempts: u32) -> EngineConfig {
        let json = format!(
            r#"{{"classifier": "delegated", "retry": {{"max_attempts": {max_attempts}, "initial_delay_ms": 1}}}}"#
        );
        EngineConfig::from_json(&json).unwrap()
    }

    #[tokio::test]
    async fn test_from_config_applies_retry_policy() {
        let backend = Arc::new(DownBackend {
            calls: AtomicU32::new(0),
        });
        let shared: Arc<dyn ClassifierBackend> = backend.clone();
        let assessor =
            Assessor::from_config(&delegated_config(2), StandardsRegistry::builtin(), Some(shared))
                .unwrap();
        assert_eq!(assessor.classifier_name(), "delegated");

        let err = assessor
            .assess(&[at_permissible(1)], StandardId::Who)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ComputeError::Classification(ClassifierError::Exhausted { attempts: 2, .. })
        ));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_from_config_delegated_needs_backend() {
        let err = Assessor::from_config(&delegated_config(3), StandardsRegistry::builtin(), None)
            .err()
            .unwrap();
        assert!(matches!(err, ComputeError::InvalidConfig(_)));
        assert_eq!(err.stage(), Stage::Configuration);
    }

    #[test]
    fn test_from_config_rules_ignores_backend() {
        let assessor =
            Assessor::from_config(&EngineConfig::default(), StandardsRegistry::builtin(), None)
                .unwrap();
        assert_eq!(assessor.classifier_name(), "rules");
        assert!(assessor.registry().resolve(StandardId::Bis).is_ok());
    }

    /// Fails the first call, succeeds afterwards
    struct FailOnce {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl RiskClassifier for FailOnce {
        async fn classify(
            &self,
            batch: &[IndexSummary],
            _standard: &Standard,
        ) -> Result<BTreeMap<u64, RiskLevel>, ClassifierError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(ClassifierError::Exhausted {
                    attempts: 3,
                    last: Box::new(ClassifierError::Backend("unavailable".to_string())),
                });
            }
            Ok(batch.iter().map(|s| (s.id, RiskLevel::Moderate)).collect())
        }

        fn name(&self) -> &'static str {
            "fail-once"
        }
    }

    #[tokio::test]
    async fn test_classification_failure_can_be_rerun() {
        let calls = Arc::new(AtomicU32::new(0));
        let assessor = Assessor::with_classifier(
            StandardsRegistry::builtin(),
            Box::new(FailOnce {
                calls: Arc::clone(&calls),
            }),
        );

        let computed = assessor
            .compute(&[at_permissible(1), polluted(2)], StandardId::Who)
            .unwrap();

        let err = assessor.classify(&computed).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Classification);

        let batch = assessor.classify(&computed).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(batch.records.len(), 2);
        assert!(batch
            .records
            .iter()
            .all(|r| r.risk == RiskLevel::Moderate));
    }
}
