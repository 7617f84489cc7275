//! Pollution index computation
//!
//! This module derives the four pollution indices from one sample's metal
//! concentrations and one standard's limits:
//! - CF: contamination factor per metal (concentration / permissible)
//! - HEI: heavy metal evaluation index (sum of CF)
//! - PLI: pollution load index (geometric mean of CF)
//! - HPI: heavy metal pollution index (weighted deviation from ideal)
//!
//! Computation is pure and performs no validation: NaN or Infinity in the
//! inputs shows up in the outputs.

use crate::standards::StandardLimits;
use crate::types::{ComputedIndices, Metal, MetalConcentration};

/// Index calculator for a single sample
pub struct IndexCalculator;

impl IndexCalculator {
    /// Compute all indices for one set of concentrations
    pub fn compute(concentrations: &MetalConcentration, limits: &StandardLimits) -> ComputedIndices {
        let cf = compute_contamination_factors(concentrations, &limits.permissible);
        let hei = compute_hei(concentrations, &limits.permissible);
        let pli = compute_pli(&cf);
        let hpi = compute_hpi(concentrations, limits);

        ComputedIndices { hpi, hei, cf, pli }
    }
}

/// Compute all indices for one set of concentrations.
///
/// # Example
/// ```ignore
/// let registry = StandardsRegistry::builtin();
/// let who = registry.resolve(StandardId::Who)?;
/// let indices = compute_indices(&sample.concentrations, &who.limits);
/// ```
pub fn compute_indices(
    concentrations: &MetalConcentration,
    limits: &StandardLimits,
) -> ComputedIndices {
    IndexCalculator::compute(concentrations, limits)
}

/// CF for every metal present in both the reading and the permissible limits
fn compute_contamination_factors(
    concentrations: &MetalConcentration,
    permissible: &MetalConcentration,
) -> MetalConcentration {
    Metal::ALL
        .into_iter()
        .filter_map(|metal| {
            let c = concentrations.get(metal)?;
            let limit = permissible.get(metal)?;
            Some((metal, c / limit))
        })
        .collect()
}

/// HEI summed straight from concentrations rather than from stored CF values
fn compute_hei(concentrations: &MetalConcentration, permissible: &MetalConcentration) -> f64 {
    Metal::ALL
        .into_iter()
        .filter_map(|metal| Some(concentrations.get(metal)? / permissible.get(metal)?))
        .sum()
}

/// Geometric mean of CF, averaged in log space so that large or tiny factors
/// cannot overflow the product. A single zero CF collapses PLI to zero and a
/// NaN CF makes it NaN.
fn compute_pli(cf: &MetalConcentration) -> f64 {
    let n = cf.len();
    if n == 0 {
        return 0.0;
    }

    let values = || cf.iter().map(|(_, v)| v);
    if values().any(f64::is_nan) {
        return f64::NAN;
    }
    if values().any(|v| v == 0.0) {
        // 0 * inf has no value
        return if values().any(f64::is_infinite) {
            f64::NAN
        } else {
            0.0
        };
    }

    let mean_ln = values().map(f64::ln).sum::<f64>() / n as f64;
    mean_ln.exp()
}

/// HPI = 100 * sum(w * (c - ideal)) / sum(w)
///
/// Numerator terms with a missing/NaN weight or a NaN deviation (e.g. no
/// ideal limit for the metal) are skipped. The denominator counts every
/// numeric weight of the metals in the reading. A non-positive weight sum
/// yields 0.
fn compute_hpi(concentrations: &MetalConcentration, limits: &StandardLimits) -> f64 {
    let mut numerator = 0.0;
    let mut denominator = 0.0;

    for metal in Metal::ALL {
        let Some(c) = concentrations.get(metal) else {
            continue;
        };
        let weight = limits.weight.get(metal).unwrap_or(0.0);
        if weight.is_nan() {
            continue;
        }
        denominator += weight;

        let deviation = c - limits.ideal.get(metal).unwrap_or(f64::NAN);
        if deviation.is_nan() {
            continue;
        }
        numerator += deviation * weight;
    }

    if denominator > 0.0 {
        (numerator / denominator) * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standards::{StandardId, StandardsRegistry};

    fn who_limits() -> StandardLimits {
        StandardsRegistry::builtin()
            .resolve(StandardId::Who)
            .unwrap()
            .limits
            .clone()
    }

    #[test]
    fn test_at_permissible_limits() {
        let limits = who_limits();
        let concentrations = limits.permissible.clone();
        let indices = IndexCalculator::compute(&concentrations, &limits);

        for (_, cf) in indices.cf.iter() {
            assert!((cf - 1.0).abs() < 1e-12);
        }
        assert_eq!(indices.cf.len(), 5);
        assert!((indices.hei - 5.0).abs() < 1e-12);
        assert!((indices.pli - 1.0).abs() < 1e-12);

        // 100 * (0.009*10 + 0.002*30 + 0.049*2 + 0.009*10 + 4.9*1) / 53
        let expected = 100.0 * 5.238 / 53.0;
        assert!((indices.hpi - expected).abs() < 1e-9);
        assert!((indices.hpi - 9.883).abs() < 0.001);
    }

    #[test]
    fn test_zero_concentration_collapses_pli() {
        let limits = who_limits();
        let concentrations = MetalConcentration::from_values([0.035, 0.01, 0.15, 0.0, 5.0]);
        let indices = compute_indices(&concentrations, &limits);

        assert_eq!(indices.pli, 0.0);
        assert!(indices.hei > 5.0);
    }

    #[test]
    fn test_pli_survives_huge_factors() {
        let mut limits = who_limits();
        limits.permissible = MetalConcentration::from_values([1.0; 5]);
        let concentrations = MetalConcentration::from_values([1e70, 3.3e70, 2e69, 1e70, 2e69]);
        let indices = compute_indices(&concentrations, &limits);

        let expected = 1e70 * (1.0_f64 * 3.3 * 0.2 * 1.0 * 0.2).powf(0.2);
        assert!(indices.pli.is_finite());
        assert!(((indices.pli - expected) / expected).abs() < 1e-12);
    }

    #[test]
    fn test_pli_survives_tiny_factors() {
        let mut limits = who_limits();
        limits.permissible = MetalConcentration::from_values([1.0; 5]);
        let concentrations = MetalConcentration::from_values([1e-80; 5]);
        let indices = compute_indices(&concentrations, &limits);

        assert!(indices.pli > 0.0);
        assert!(((indices.pli - 1e-80) / 1e-80).abs() < 1e-12);
    }

    #[test]
    fn test_zero_weight_sum_guards_hpi() {
        let mut limits = who_limits();
        limits.weight = MetalConcentration::from_values([0.0; 5]);
        let concentrations = MetalConcentration::from_values([0.5, 0.5, 0.5, 0.5, 50.0]);
        let indices = compute_indices(&concentrations, &limits);

        assert_eq!(indices.hpi, 0.0);
    }

    #[test]
    fn test_missing_ideal_contributes_nothing_to_numerator() {
        let mut limits = who_limits();
        limits.ideal = [(Metal::As, 0.001)].into_iter().collect();
        let concentrations = MetalConcentration::from_values([0.011, 0.003, 0.05, 0.01, 5.0]);
        let indices = compute_indices(&concentrations, &limits);

        // Only As enters the numerator; every weight enters the denominator.
        let expected = 100.0 * (0.010 * 10.0) / 53.0;
        assert!((indices.hpi - expected).abs() < 1e-9);
    }

    #[test]
    fn test_zero_permissible_is_visible() {
        let mut limits = who_limits();
        limits.permissible.insert(Metal::Cd, 0.0);
        let concentrations = MetalConcentration::from_values([0.01, 0.003, 0.05, 0.01, 5.0]);
        let indices = compute_indices(&concentrations, &limits);

        assert!(indices.cf.get(Metal::Cd).unwrap().is_infinite());
        assert!(indices.hei.is_infinite());
        assert!(!indices.is_finite());
    }

    #[test]
    fn test_nan_input_propagates() {
        let limits = who_limits();
        let concentrations = MetalConcentration::from_values([0.01, 0.003, 0.05, f64::NAN, 5.0]);
        let indices = compute_indices(&concentrations, &limits);

        assert!(indices.cf.get(Metal::Pb).unwrap().is_nan());
        assert!(indices.hei.is_nan());
        assert!(indices.pli.is_nan());
        assert!(indices.hpi.is_finite());
    }

    #[test]
    fn test_deterministic() {
        let limits = who_limits();
        let concentrations = MetalConcentration::from_values([0.018, 0.006, 0.08, 0.02, 2.1]);
        let a = compute_indices(&concentrations, &limits);
        let b = compute_indices(&concentrations, &limits);

        assert_eq!(a.hpi.to_bits(), b.hpi.to_bits());
        assert_eq!(a.hei.to_bits(), b.hei.to_bits());
        assert_eq!(a.pli.to_bits(), b.pli.to_bits());
        assert_eq!(a.cf, b.cf);
    }

    #[test]
    fn test_partial_reading() {
        let limits = who_limits();
        let concentrations: MetalConcentration =
            [(Metal::As, 0.02), (Metal::Pb, 0.04)].into_iter().collect();
        let indices = compute_indices(&concentrations, &limits);

        assert_eq!(indices.cf.len(), 2);
        assert!((indices.hei - 6.0).abs() < 1e-12);
        // sqrt(2 * 4)
        assert!((indices.pli - 8.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_empty_reading() {
        let limits = who_limits();
        let indices = compute_indices(&MetalConcentration::new(), &limits);
        assert_eq!(indices.hei, 0.0);
        assert_eq!(indices.pli, 0.0);
        assert_eq!(indices.hpi, 0.0);
    }
}
