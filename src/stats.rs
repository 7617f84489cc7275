//! Dataset statistics
//!
//! Aggregates over an assessed batch: risk distribution, mean indices and the
//! worst location by HPI.

use serde::{Deserialize, Serialize};

use crate::types::{AssessmentRecord, RiskLevel};

/// Location with the highest HPI in a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorstLocation {
    pub id: u64,
    pub location: String,
    pub hpi: f64,
}

/// Summary statistics of an assessed batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total: usize,
    pub safe: usize,
    pub moderate: usize,
    pub high_risk: usize,
    pub safe_pct: f64,
    pub moderate_pct: f64,
    pub high_risk_pct: f64,
    pub mean_hpi: f64,
    pub mean_hei: f64,
    pub mean_pli: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_hpi: Option<WorstLocation>,
}

impl DatasetStats {
    pub fn from_records(records: &[AssessmentRecord]) -> Self {
        let total = records.len();
        let count = |risk: RiskLevel| records.iter().filter(|r| r.risk == risk).count();
        let safe = count(RiskLevel::Safe);
        let moderate = count(RiskLevel::Moderate);
        let high_risk = count(RiskLevel::HighRisk);

        let mean = |f: fn(&AssessmentRecord) -> f64| {
            if total == 0 {
                0.0
            } else {
                records.iter().map(f).sum::<f64>() / total as f64
            }
        };

        // NaN HPI never wins the comparison
        let max_hpi = records
            .iter()
            .filter(|r| !r.indices.hpi.is_nan())
            .max_by(|a, b| a.indices.hpi.total_cmp(&b.indices.hpi))
            .map(|r| WorstLocation {
                id: r.id(),
                location: r.location().to_string(),
                hpi: r.indices.hpi,
            });

        Self {
            total,
            safe,
            moderate,
            high_risk,
            safe_pct: percentage(safe, total),
            moderate_pct: percentage(moderate, total),
            high_risk_pct: percentage(high_risk, total),
            mean_hpi: mean(|r| r.indices.hpi),
            mean_hei: mean(|r| r.indices.hei),
            mean_pli: mean(|r| r.indices.pli),
            max_hpi,
        }
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ComputedIndices, MetalConcentration, Sample};
    use pretty_assertions::assert_eq;

    fn record(id: u64, hpi: f64, hei: f64, pli: f64, risk: RiskLevel) -> AssessmentRecord {
        AssessmentRecord {
            sample: Sample::new(id, format!("Site {id}"), MetalConcentration::new()),
            indices: ComputedIndices {
                hpi,
                hei,
                cf: MetalConcentration::new(),
                pli,
            },
            risk,
        }
    }

    #[test]
    fn test_empty_batch() {
        let stats = DatasetStats::from_records(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.safe_pct, 0.0);
        assert_eq!(stats.mean_hpi, 0.0);
        assert_eq!(stats.max_hpi, None);
    }

    #[test]
    fn test_distribution_and_means() {
        let records = vec![
            record(1, 20.0, 4.0, 0.5, RiskLevel::Safe),
            record(2, 180.0, 30.0, 1.8, RiskLevel::HighRisk),
            record(3, 40.0, 8.0, 0.7, RiskLevel::Safe),
            record(4, 120.0, 10.0, 0.9, RiskLevel::Moderate),
        ];
        let stats = DatasetStats::from_records(&records);

        assert_eq!(stats.total, 4);
        assert_eq!((stats.safe, stats.moderate, stats.high_risk), (2, 1, 1));
        assert_eq!(stats.safe_pct, 50.0);
        assert_eq!(stats.high_risk_pct, 25.0);
        assert_eq!(stats.mean_hpi, 90.0);
        assert_eq!(stats.mean_hei, 13.0);
        assert!((stats.mean_pli - 0.975).abs() < 1e-12);
        assert_eq!(
            stats.max_hpi,
            Some(WorstLocation {
                id: 2,
                location: "Site 2".to_string(),
                hpi: 180.0,
            })
        );
    }

    #[test]
    fn test_nan_hpi_skipped_for_worst_location() {
        let records = vec![
            record(1, f64::NAN, 0.0, 0.0, RiskLevel::HighRisk),
            record(2, 12.0, 0.0, 0.0, RiskLevel::Safe),
        ];
        let stats = DatasetStats::from_records(&records);
        assert_eq!(stats.max_hpi.map(|w| w.id), Some(2));
        assert!(stats.mean_hpi.is_nan());
    }
}
