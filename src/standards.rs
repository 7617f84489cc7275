//! Standards registry
//!
//! Permissible limits, ideal limits, metal weights and risk thresholds per
//! regulatory standard. All values are in mg/L unless noted otherwise.
//!
//! The registry is a plain value handed to the calculator and classifier.
//! WHO and BIS currently ship identical numbers but stay independently
//! addressable, so a divergence only touches the registry data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ComputeError;
use crate::types::{Metal, MetalConcentration};

/// Identifier of a regulatory standard
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StandardId {
    #[serde(rename = "WHO")]
    Who,
    #[serde(rename = "BIS")]
    Bis,
}

impl StandardId {
    pub const ALL: [StandardId; 2] = [StandardId::Who, StandardId::Bis];

    pub fn as_str(&self) -> &'static str {
        match self {
            StandardId::Who => "WHO",
            StandardId::Bis => "BIS",
        }
    }
}

impl fmt::Display for StandardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StandardId {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WHO" => Ok(StandardId::Who),
            "BIS" => Ok(StandardId::Bis),
            _ => Err(ComputeError::UnknownStandard(s.to_string())),
        }
    }
}

/// Per-metal limits used by the index calculator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardLimits {
    /// Maximum safe concentration
    pub permissible: MetalConcentration,
    /// Background/target concentration (<= permissible)
    pub ideal: MetalConcentration,
    /// Relative importance in HPI (unitless, > 0)
    pub weight: MetalConcentration,
}

/// Index values above which a location is considered at risk
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub hpi: f64,
    pub hei: f64,
    pub cf: f64,
    pub pli: f64,
}

/// A complete regulatory standard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standard {
    pub id: StandardId,
    pub limits: StandardLimits,
    pub thresholds: RiskThresholds,
}

impl Standard {
    /// Check the invariants the calculator relies on
    pub fn validate(&self) -> Result<(), ComputeError> {
        let invalid = |reason: String| ComputeError::InvalidStandard {
            standard: self.id.to_string(),
            reason,
        };

        for metal in Metal::ALL {
            let permissible = self
                .limits
                .permissible
                .get(metal)
                .ok_or_else(|| invalid(format!("missing permissible limit for {metal}")))?;
            let ideal = self
                .limits
                .ideal
                .get(metal)
                .ok_or_else(|| invalid(format!("missing ideal limit for {metal}")))?;
            let weight = self
                .limits
                .weight
                .get(metal)
                .ok_or_else(|| invalid(format!("missing weight for {metal}")))?;

            if !(permissible.is_finite() && permissible > 0.0) {
                return Err(invalid(format!(
                    "permissible limit for {metal} must be positive, got {permissible}"
                )));
            }
            if !(0.0..=permissible).contains(&ideal) {
                return Err(invalid(format!(
                    "ideal limit for {metal} must lie in [0, {permissible}], got {ideal}"
                )));
            }
            if !(weight.is_finite() && weight > 0.0) {
                return Err(invalid(format!(
                    "weight for {metal} must be positive, got {weight}"
                )));
            }
        }

        let t = &self.thresholds;
        for (name, value) in [("hpi", t.hpi), ("hei", t.hei), ("cf", t.cf), ("pli", t.pli)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(format!(
                    "{name} threshold must be positive, got {value}"
                )));
            }
        }

        Ok(())
    }
}

/// Collection of standards addressable by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardsRegistry {
    standards: BTreeMap<StandardId, Standard>,
}

impl Default for StandardsRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl StandardsRegistry {
    /// Registry with the shipped WHO and BIS drinking-water standards
    pub fn builtin() -> Self {
        let standards = StandardId::ALL
            .into_iter()
            .map(|id| (id, builtin_standard(id)))
            .collect();
        Self { standards }
    }

    /// Build a registry from explicit standards, validating each one
    pub fn from_standards(
        standards: impl IntoIterator<Item = Standard>,
    ) -> Result<Self, ComputeError> {
        let mut map = BTreeMap::new();
        for standard in standards {
            standard.validate()?;
            map.insert(standard.id, standard);
        }
        Ok(Self { standards: map })
    }

    /// Look up a standard; an absent id is a configuration error
    pub fn resolve(&self, id: StandardId) -> Result<&Standard, ComputeError> {
        self.standards
            .get(&id)
            .ok_or_else(|| ComputeError::UnknownStandard(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Standard> + '_ {
        self.standards.values()
    }

    /// Load a registry from JSON and validate every standard
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let registry: Self = serde_json::from_str(json)?;
        for standard in registry.standards.values() {
            standard.validate()?;
        }
        for (key, standard) in &registry.standards {
            if *key != standard.id {
                return Err(ComputeError::InvalidStandard {
                    standard: key.to_string(),
                    reason: format!("entry is keyed {key} but declares id {}", standard.id),
                });
            }
        }
        Ok(registry)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn builtin_standard(id: StandardId) -> Standard {
    // WHO guideline values for drinking water; BIS IS 10500 currently matches.
    let permissible = match id {
        StandardId::Who => MetalConcentration::from_values([0.01, 0.003, 0.05, 0.01, 5.0]),
        StandardId::Bis => MetalConcentration::from_values([0.01, 0.003, 0.05, 0.01, 5.0]),
    };
    let thresholds = match id {
        StandardId::Who => RiskThresholds {
            hpi: 100.0,
            hei: 20.0,
            cf: 3.0,
            pli: 1.0,
        },
        StandardId::Bis => RiskThresholds {
            hpi: 100.0,
            hei: 20.0,
            cf: 3.0,
            pli: 1.0,
        },
    };

    Standard {
        id,
        limits: StandardLimits {
            permissible,
            ideal: MetalConcentration::from_values([0.001, 0.001, 0.001, 0.001, 0.1]),
            weight: MetalConcentration::from_values([10.0, 30.0, 2.0, 10.0, 1.0]),
        },
        thresholds,
    }
}
