//! Report encoding
//!
//! Wraps an assessed batch in a report envelope with producer metadata,
//! provenance and dataset statistics. The engine itself never reads the clock
//! or generates ids; both only appear here.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ComputeError;
use crate::standards::StandardId;
use crate::stats::DatasetStats;
use crate::types::{AssessmentBatch, AssessmentRecord, RowError};
use crate::{AQUA_VERSION, PRODUCER_NAME};

/// Current report schema version
pub const REPORT_VERSION: &str = "1.0.0";

/// Who produced a report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// What a report was computed against, and when
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportProvenance {
    pub standard: StandardId,
    pub computed_at_utc: String,
}

/// Assessment report handed to the report collaborator
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentReport {
    pub report_version: String,
    pub producer: ReportProducer,
    pub provenance: ReportProvenance,
    pub stats: DatasetStats,
    pub records: Vec<AssessmentRecord>,
    pub row_errors: Vec<RowError>,
}

/// Encoder for assessment reports
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn encode(&self, batch: &AssessmentBatch) -> AssessmentReport {
        let producer = ReportProducer {
            name: PRODUCER_NAME.to_string(),
            version: AQUA_VERSION.to_string(),
            instance_id: self.instance_id.clone(),
        };

        let provenance = ReportProvenance {
            standard: batch.standard,
            computed_at_utc: Utc::now().to_rfc3339(),
        };

        AssessmentReport {
            report_version: REPORT_VERSION.to_string(),
            producer,
            provenance,
            stats: DatasetStats::from_records(&batch.records),
            records: batch.records.clone(),
            row_errors: batch.row_errors.clone(),
        }
    }

    /// Encode to pretty-printed JSON
    pub fn encode_to_json(&self, batch: &AssessmentBatch) -> Result<String, ComputeError> {
        let report = self.encode(batch);
        serde_json::to_string_pretty(&report).map_err(|e| ComputeError::EncodingError(e.to_string()))
    }
}
