//! Row ingestion
//!
//! Converts loosely-typed rows, as handed over by an upload/CSV collaborator,
//! into validated [`Sample`]s. Metal columns may hold numbers or numeric
//! strings; anything else becomes a per-row error instead of a silent zero.
//!
//! Defaults for optional columns: `id` = row number (1-based), `location` =
//! "Location {row number}", `lat`/`lon` = 0.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::{ComputeError, RowValidationError};
use crate::types::{Metal, MetalConcentration, RowError, Sample};

/// One raw input row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<Value>,
    /// Metal columns (`As`, `Cd`, ...) and any extra columns
    #[serde(flatten)]
    pub columns: BTreeMap<String, Value>,
}

impl SampleRecord {
    /// Validate and convert; `index` is the zero-based row position
    pub fn into_sample(self, index: usize) -> Result<Sample, RowError> {
        let row_number = index + 1;
        let mut errors = Vec::new();

        let id = match &self.id {
            None | Some(Value::Null) => Some(row_number as u64),
            Some(value) => match coerce_id(value) {
                Some(id) => Some(id),
                None => {
                    errors.push(RowValidationError::InvalidField {
                        field: "id".to_string(),
                        value: display_value(value),
                    });
                    None
                }
            },
        };

        let location = match &self.location {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => format!("Location {row_number}"),
        };

        let lat = self.lat.as_ref().and_then(coerce_number).unwrap_or(0.0);
        let lon = self.lon.as_ref().and_then(coerce_number).unwrap_or(0.0);

        let mut concentrations = MetalConcentration::new();
        for metal in Metal::ALL {
            match self.columns.get(metal.symbol()) {
                None | Some(Value::Null) => errors.push(RowValidationError::MissingMetal {
                    metal: metal.symbol().to_string(),
                }),
                Some(value) => match coerce_number(value) {
                    Some(v) => {
                        concentrations.insert(metal, v);
                    }
                    None => errors.push(RowValidationError::NotNumeric {
                        metal: metal.symbol().to_string(),
                        value: display_value(value),
                    }),
                },
            }
        }

        match id {
            Some(id) if errors.is_empty() => Ok(Sample {
                id,
                location,
                lat,
                lon,
                concentrations,
            }),
            _ => Err(RowError {
                index,
                id,
                location: Some(location),
                errors,
            }),
        }
    }
}

/// Rows that passed ingestion, tagged with their input position, plus the
/// rows that did not
#[derive(Debug, Clone, Default)]
pub struct IngestedRows {
    pub rows: Vec<(usize, Sample)>,
    pub row_errors: Vec<RowError>,
}

impl IngestedRows {
    pub fn total(&self) -> usize {
        self.rows.len() + self.row_errors.len()
    }
}

/// Parser and validator for raw input rows
pub struct RowIngestor;

impl RowIngestor {
    /// Parse a JSON array of rows
    pub fn parse_array(json: &str) -> Result<Vec<SampleRecord>, ComputeError> {
        let records: Vec<SampleRecord> = serde_json::from_str(json)?;
        Ok(records)
    }

    /// Parse NDJSON (one row object per line)
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<SampleRecord>, ComputeError> {
        let mut records = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<SampleRecord>(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => {
                    return Err(ComputeError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(records)
    }

    /// Metal columns absent from every row (the upload is unusable as a whole)
    pub fn missing_columns(records: &[SampleRecord]) -> Vec<Metal> {
        Metal::ALL
            .into_iter()
            .filter(|m| !records.iter().any(|r| r.columns.contains_key(m.symbol())))
            .collect()
    }

    /// Validate every row independently
    pub fn ingest(records: Vec<SampleRecord>) -> IngestedRows {
        let mut ingested = IngestedRows::default();
        for (index, record) in records.into_iter().enumerate() {
            match record.into_sample(index) {
                Ok(sample) => ingested.rows.push((index, sample)),
                Err(row_error) => {
                    warn!(
                        row = index + 1,
                        errors = row_error.errors.len(),
                        "rejected input row"
                    );
                    ingested.row_errors.push(row_error);
                }
            }
        }
        ingested
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        _ => None,
    }
}

/// Ids are non-negative integers; `3.0` and `"3.0"` count, `2.5` does not
fn coerce_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(integral_id)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral_id))
        }
        _ => None,
    }
}

fn integral_id(value: f64) -> Option<u64> {
    let integral = value.is_finite() && value >= 0.0 && value.fract() == 0.0;
    (integral && value < u64::MAX as f64).then_some(value as u64)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
