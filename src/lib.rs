//! Aqua Index - Heavy-metal pollution indices for groundwater samples
//!
//! Aqua Index turns measured metal concentrations into pollution indices and a
//! risk category per location through a deterministic pipeline: row ingestion
//! → validation → index calculation (HPI, HEI, CF, PLI) → risk classification
//! → report encoding.
//!
//! ## Modules
//!
//! - **Standards**: WHO and BIS permissible limits, ideal values, weights and risk thresholds
//! - **Indices**: Pure per-sample index calculation
//! - **Classifier**: Rule-based or delegated (external, with retry/backoff) risk classification
//! - **Pipeline**: Batch orchestration with per-row error collection

pub mod classifier;
pub mod config;
pub mod encoder;
pub mod error;
pub mod indices;
pub mod ingest;
pub mod pipeline;
pub mod standards;
pub mod stats;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use classifier::{DelegatedClassifier, RiskClassifier, RuleClassifier};
pub use error::{ComputeError, Stage};
pub use indices::{compute_indices, IndexCalculator};
pub use pipeline::{assess, Assessor};
pub use standards::{StandardId, StandardsRegistry};
pub use types::{AssessmentBatch, AssessmentRecord, Metal, RiskLevel, Sample};

/// Library version embedded in all reports
pub const AQUA_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "aqua-index";
