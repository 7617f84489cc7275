//! Core types for the Aqua Index pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: samples, per-metal mappings, computed indices, risk levels and
//! assessment records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::RowValidationError;
use crate::standards::StandardId;

/// Heavy metals tracked by the engine.
///
/// The declaration order is the summation order used by every index, so
/// adding a metal means appending it here and to [`Metal::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Metal {
    As,
    Cd,
    Cr,
    Pb,
    Zn,
}

impl Metal {
    /// Every metal, in summation order
    pub const ALL: [Metal; 5] = [Metal::As, Metal::Cd, Metal::Cr, Metal::Pb, Metal::Zn];

    /// Chemical symbol, as used for column names
    pub fn symbol(&self) -> &'static str {
        match self {
            Metal::As => "As",
            Metal::Cd => "Cd",
            Metal::Cr => "Cr",
            Metal::Pb => "Pb",
            Metal::Zn => "Zn",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Metal::As => "Arsenic",
            Metal::Cd => "Cadmium",
            Metal::Cr => "Chromium",
            Metal::Pb => "Lead",
            Metal::Zn => "Zinc",
        }
    }
}

impl fmt::Display for Metal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Metal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metal::ALL
            .into_iter()
            .find(|m| m.symbol().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown metal: {s}"))
    }
}

/// Per-metal values: concentrations (mg/L), limits, weights or contamination
/// factors depending on context.
///
/// Iteration always follows [`Metal::ALL`] order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetalConcentration(BTreeMap<Metal, f64>);

impl MetalConcentration {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build a full mapping from values given in [`Metal::ALL`] order
    pub fn from_values(values: [f64; 5]) -> Self {
        Metal::ALL.into_iter().zip(values).collect()
    }

    pub fn get(&self, metal: Metal) -> Option<f64> {
        self.0.get(&metal).copied()
    }

    pub fn insert(&mut self, metal: Metal, value: f64) -> Option<f64> {
        self.0.insert(metal, value)
    }

    pub fn contains(&self, metal: Metal) -> bool {
        self.0.contains_key(&metal)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metal, f64)> + '_ {
        self.0.iter().map(|(m, v)| (*m, *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Metals of [`Metal::ALL`] that have no entry
    pub fn missing(&self) -> Vec<Metal> {
        Metal::ALL
            .into_iter()
            .filter(|m| !self.contains(*m))
            .collect()
    }

    /// Largest value, NaN if any value is NaN, None when empty
    pub fn max_value(&self) -> Option<f64> {
        let mut values = self.0.values().copied();
        let first = values.next()?;
        Some(values.fold(first, |acc, v| {
            if acc.is_nan() || v.is_nan() {
                f64::NAN
            } else {
                acc.max(v)
            }
        }))
    }
}

impl FromIterator<(Metal, f64)> for MetalConcentration {
    fn from_iter<I: IntoIterator<Item = (Metal, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One sampled location, as supplied by the ingestion collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: u64,
    pub location: String,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
    /// Measured concentrations (mg/L), flattened as `As`, `Cd`, ... columns
    #[serde(flatten)]
    pub concentrations: MetalConcentration,
}

impl Sample {
    pub fn new(id: u64, location: impl Into<String>, concentrations: MetalConcentration) -> Self {
        Self {
            id,
            location: location.into(),
            lat: 0.0,
            lon: 0.0,
            concentrations,
        }
    }

    pub fn with_coordinates(mut self, lat: f64, lon: f64) -> Self {
        self.lat = lat;
        self.lon = lon;
        self
    }

    /// Check that every tracked metal is present, finite and non-negative
    pub fn validate(&self) -> Vec<RowValidationError> {
        let mut errors = Vec::new();
        for metal in Metal::ALL {
            match self.concentrations.get(metal) {
                None => errors.push(RowValidationError::MissingMetal {
                    metal: metal.symbol().to_string(),
                }),
                Some(v) if !v.is_finite() => errors.push(RowValidationError::NonFinite {
                    metal: metal.symbol().to_string(),
                }),
                Some(v) if v < 0.0 => errors.push(RowValidationError::Negative {
                    metal: metal.symbol().to_string(),
                    value: v,
                }),
                Some(_) => {}
            }
        }
        errors
    }
}

/// Pollution indices derived from one sample and one set of limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedIndices {
    /// Heavy Metal Pollution Index
    pub hpi: f64,
    /// Heavy Metal Evaluation Index
    pub hei: f64,
    /// Contamination Factor per metal
    pub cf: MetalConcentration,
    /// Pollution Load Index
    pub pli: f64,
}

impl ComputedIndices {
    /// Highest per-metal contamination factor (0 when no CF was computed)
    pub fn cf_max(&self) -> f64 {
        self.cf.max_value().unwrap_or(0.0)
    }

    /// False when any index carries NaN or Infinity
    pub fn is_finite(&self) -> bool {
        self.hpi.is_finite()
            && self.hei.is_finite()
            && self.pli.is_finite()
            && self.cf.iter().all(|(_, v)| v.is_finite())
    }
}

/// Discrete risk category for one location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Safe,
    Moderate,
    #[serde(rename = "High Risk", alias = "HighRisk")]
    HighRisk,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "Safe",
            RiskLevel::Moderate => "Moderate",
            RiskLevel::HighRisk => "High Risk",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully assessed location
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentRecord {
    #[serde(flatten)]
    pub sample: Sample,
    #[serde(flatten)]
    pub indices: ComputedIndices,
    pub risk: RiskLevel,
}

impl AssessmentRecord {
    pub fn id(&self) -> u64 {
        self.sample.id
    }

    pub fn location(&self) -> &str {
        &self.sample.location
    }
}

/// Input row rejected before computation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    /// Zero-based position in the input
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub errors: Vec<RowValidationError>,
}

/// Result of one assessment run
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentBatch {
    pub standard: StandardId,
    /// Accepted rows, in input order
    pub records: Vec<AssessmentRecord>,
    pub row_errors: Vec<RowError>,
}

impl AssessmentBatch {
    pub fn by_risk(&self, risk: RiskLevel) -> impl Iterator<Item = &AssessmentRecord> + '_ {
        self.records.iter().filter(move |r| r.risk == risk)
    }

    pub fn is_complete(&self) -> bool {
        self.row_errors.is_empty()
    }
}
