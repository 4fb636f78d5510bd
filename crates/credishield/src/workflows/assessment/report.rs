use chrono::{DateTime, Utc};
use serde::Serialize;

use super::decision::ConfidenceResult;
use super::domain::{FactorContribution, FormInput, Prediction};
use super::features::feature_label;

pub const LINES_PER_PAGE: usize = 40;
const TOP_FACTOR_COUNT: usize = 3;

/// Explanation report split into fixed-height pages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentReport {
    pub generated_at: DateTime<Utc>,
    pub pages: Vec<Vec<String>>,
}

impl AssessmentReport {
    pub fn build(
        form: &FormInput,
        prediction: &Prediction,
        confidence: &ConfidenceResult,
        recommendations: &[String],
        generated_at: DateTime<Utc>,
    ) -> Self {
        let mut lines = vec![
            "CrediShield Credit Risk Explanation Report".to_string(),
            format!("Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S UTC")),
            format!(
                "Risk Score (PD): {:.1}%",
                prediction.probability_of_default * 100.0
            ),
            format!(
                "Confidence: {} ({})",
                confidence.band,
                confidence.percent_label()
            ),
            String::new(),
            "Input Summary:".to_string(),
        ];

        for (field, value) in form.entries() {
            lines.push(format!("- {}: {}", field.display_label(), value));
        }

        lines.push(String::new());
        lines.push("Top SHAP Risk-Increasing Factors:".to_string());
        lines.extend(factor_lines(&prediction.top_risk_increasing, true));

        lines.push(String::new());
        lines.push("Top SHAP Risk-Decreasing Factors:".to_string());
        lines.extend(factor_lines(&prediction.top_risk_decreasing, false));

        lines.push(String::new());
        lines.push("Recommendations:".to_string());
        lines.extend(recommendations.iter().map(|tip| format!("- {tip}")));

        let pages = lines
            .chunks(LINES_PER_PAGE)
            .map(<[String]>::to_vec)
            .collect();

        Self {
            generated_at,
            pages,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Plain-text rendition with a footer on every page.
    pub fn render_text(&self) -> String {
        let total = self.page_count();
        let mut out = String::new();
        for (index, page) in self.pages.iter().enumerate() {
            for line in page {
                out.push_str(line);
                out.push('\n');
            }
            out.push_str(&format!("-- page {} of {} --\n", index + 1, total));
        }
        out
    }
}

fn factor_lines(factors: &[FactorContribution], increasing: bool) -> Vec<String> {
    factors
        .iter()
        .take(TOP_FACTOR_COUNT)
        .map(|factor| {
            let impact = if increasing {
                format!("+{:.4}", factor.impact)
            } else {
                format!("{:.4}", factor.impact)
            };
            format!("- {} ({impact})", feature_label(&factor.feature))
        })
        .collect()
}
