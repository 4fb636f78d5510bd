use std::fmt;

use serde::{Deserialize, Serialize};

use super::super::domain::Prediction;

const MARGIN_WEIGHT: f64 = 0.65;
const CONCENTRATION_WEIGHT: f64 = 0.35;
const HIGH_THRESHOLD: f64 = 0.72;
const MEDIUM_THRESHOLD: f64 = 0.48;
/// Concentration used when the explanation carries no factors at all.
const NEUTRAL_CONCENTRATION: f64 = 0.5;

/// Coarse stability summary for a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
    Unknown,
}

impl ConfidenceBand {
    pub fn label(self) -> &'static str {
        match self {
            ConfidenceBand::High => "High",
            ConfidenceBand::Medium => "Medium",
            ConfidenceBand::Low => "Low",
            ConfidenceBand::Unknown => "Unknown",
        }
    }

    fn rationale(self) -> &'static str {
        match self {
            ConfidenceBand::High => {
                "Prediction is far from the decision boundary and key factors are consistent."
            }
            ConfidenceBand::Medium => {
                "Prediction is reasonably stable but can change with moderate input shifts."
            }
            ConfidenceBand::Low => {
                "Prediction is near the boundary or spread across many competing factors."
            }
            ConfidenceBand::Unknown => "Run an assessment to calculate confidence.",
        }
    }
}

impl fmt::Display for ConfidenceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Derived confidence; recomputed from the prediction, never stored on its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceResult {
    pub band: ConfidenceBand,
    pub score: f64,
    pub rationale: String,
}

impl ConfidenceResult {
    fn unknown() -> Self {
        Self {
            band: ConfidenceBand::Unknown,
            score: 0.0,
            rationale: ConfidenceBand::Unknown.rationale().to_string(),
        }
    }

    /// Score rendered as a whole percentage, e.g. `82%`.
    pub fn percent_label(&self) -> String {
        format!("{}%", (self.score * 100.0).round() as i64)
    }
}

pub fn band_for_score(score: f64) -> ConfidenceBand {
    if score >= HIGH_THRESHOLD {
        ConfidenceBand::High
    } else if score >= MEDIUM_THRESHOLD {
        ConfidenceBand::Medium
    } else {
        ConfidenceBand::Low
    }
}

/// Blend boundary distance with how concentrated the explanation is.
pub fn estimate(prediction: Option<&Prediction>) -> ConfidenceResult {
    let Some(prediction) = prediction.filter(|p| p.has_valid_probability()) else {
        return ConfidenceResult::unknown();
    };

    let pd = prediction.probability_of_default;
    let margin = ((pd - 0.5).abs() * 2.0).min(1.0);

    let mut impacts: Vec<f64> = prediction
        .top_risk_increasing
        .iter()
        .chain(prediction.top_risk_decreasing.iter())
        .map(|factor| factor.impact.abs())
        .filter(|impact| impact.is_finite())
        .collect();
    impacts.sort_by(|a, b| b.total_cmp(a));

    let total: f64 = impacts.iter().sum();
    let top_share = if total > 0.0 {
        let top_two: f64 = impacts.iter().take(2).sum();
        top_two / total
    } else {
        NEUTRAL_CONCENTRATION
    };

    let score = (MARGIN_WEIGHT * margin + CONCENTRATION_WEIGHT * top_share).clamp(0.0, 1.0);
    let band = band_for_score(score);

    ConfidenceResult {
        band,
        score,
        rationale: band.rationale().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::assessment::domain::FactorContribution;

    fn factor(feature: &str, impact: f64) -> FactorContribution {
        FactorContribution {
            feature: feature.to_string(),
            impact,
        }
    }

    fn prediction(pd: f64, increasing: Vec<FactorContribution>) -> Prediction {
        Prediction {
            probability_of_default: pd,
            top_risk_increasing: increasing,
            top_risk_decreasing: Vec::new(),
        }
    }

    #[test]
    fn missing_or_invalid_probability_is_unknown() {
        let unknown = estimate(None);
        assert_eq!(unknown.band, ConfidenceBand::Unknown);
        assert_eq!(unknown.score, 0.0);

        for pd in [f64::NAN, -0.1, 1.5, f64::INFINITY] {
            let result = estimate(Some(&prediction(pd, Vec::new())));
            assert_eq!(result.band, ConfidenceBand::Unknown, "pd {pd}");
            assert_eq!(result.score, 0.0);
        }
    }

    #[test]
    fn thresholds_are_inclusive() {
        assert_eq!(band_for_score(0.72), ConfidenceBand::High);
        assert_eq!(band_for_score(0.7199), ConfidenceBand::Medium);
        assert_eq!(band_for_score(0.48), ConfidenceBand::Medium);
        assert_eq!(band_for_score(0.4799), ConfidenceBand::Low);
    }

    #[test]
    fn saturated_probability_with_two_factors_is_high() {
        let result = estimate(Some(&prediction(
            0.0,
            vec![factor("duration", 0.4), factor("age", -0.2)],
        )));
        assert!((result.score - 1.0).abs() < 1e-12);
        assert_eq!(result.band, ConfidenceBand::High);
    }

    #[test]
    fn no_factors_uses_neutral_concentration() {
        let result = estimate(Some(&prediction(0.5, Vec::new())));
        assert!((result.score - 0.175).abs() < 1e-12);
        assert_eq!(result.band, ConfidenceBand::Low);
    }

    #[test]
    fn diffuse_explanations_lower_the_score() {
        let concentrated = estimate(Some(&prediction(
            0.8,
            vec![factor("credit_amount", 0.5), factor("duration", 0.4)],
        )));
        let diffuse = estimate(Some(&prediction(
            0.8,
            (0..10).map(|i| factor(&format!("f{i}"), 0.1)).collect(),
        )));
        // margin 0.6 -> 0.39 + 0.35 * share
        assert!((concentrated.score - 0.74).abs() < 1e-9);
        assert!((diffuse.score - 0.46).abs() < 1e-9);
        assert_eq!(concentrated.band, ConfidenceBand::High);
        assert_eq!(diffuse.band, ConfidenceBand::Low);
    }

    #[test]
    fn score_stays_in_unit_interval() {
        for step in 0..=20 {
            let pd = step as f64 / 20.0;
            let result = estimate(Some(&prediction(
                pd,
                vec![factor("purpose", 0.3), factor("age", -0.9), factor("job", 0.01)],
            )));
            assert!((0.0..=1.0).contains(&result.score), "pd {pd}");
            assert_eq!(result.band, band_for_score(result.score));
        }
    }

    #[test]
    fn percent_label_rounds() {
        let result = ConfidenceResult {
            band: ConfidenceBand::High,
            score: 0.816,
            rationale: String::new(),
        };
        assert_eq!(result.percent_label(), "82%");
    }
}
