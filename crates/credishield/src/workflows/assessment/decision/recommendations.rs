use std::collections::HashSet;

use super::super::domain::{FormField, FormInput, Prediction};
use super::super::features::canonical_field;

pub const MAX_RECOMMENDATIONS: usize = 5;

const MIN_SUGGESTED_AMOUNT: u32 = 250;
const MIN_SUGGESTED_DURATION: u32 = 6;
const DURATION_STEP: u32 = 6;
const FALLBACK_DURATION: u32 = 24;
const CLOSING_TIP: &str = "Use the What-If Simulator and save scenarios before final submission.";

/// Actionable tips for the fields that push this applicant's risk up.
///
/// Output is deterministic for a given `(input, prediction)`: tips follow a
/// fixed field order, duplicates are dropped, and the closing tip is always
/// appended before truncation.
pub fn recommend(input: &FormInput, prediction: Option<&Prediction>) -> Vec<String> {
    let Some(prediction) = prediction else {
        return Vec::new();
    };

    let raising: HashSet<FormField> = prediction
        .top_risk_increasing
        .iter()
        .filter_map(|factor| canonical_field(&factor.feature))
        .collect();

    let mut tips = Vec::new();

    if raising.contains(&FormField::CreditAmount) {
        let reduced = ((f64::from(input.credit_amount) * 0.9).round() as u32)
            .max(MIN_SUGGESTED_AMOUNT);
        push_unique(
            &mut tips,
            format!(
                "Reduce loan amount closer to ₹{} if possible.",
                format_rupees(reduced)
            ),
        );
    }

    if raising.contains(&FormField::Duration) {
        let current = if input.duration == 0 {
            FALLBACK_DURATION
        } else {
            input.duration
        };
        let shorter = current
            .saturating_sub(DURATION_STEP)
            .max(MIN_SUGGESTED_DURATION);
        push_unique(
            &mut tips,
            format!("Try a shorter repayment time around {shorter} months if affordable."),
        );
    }

    if raising.contains(&FormField::InstallmentCommitment) {
        push_unique(
            &mut tips,
            "Lower monthly payment burden by adjusting loan amount or tenure balance.".to_string(),
        );
    }

    if raising.contains(&FormField::SavingsStatus) {
        push_unique(
            &mut tips,
            "Move to a higher savings bucket before applying to improve trust profile.".to_string(),
        );
    }

    if raising.contains(&FormField::CheckingStatus) {
        push_unique(
            &mut tips,
            "Maintain a healthier checking account balance for a few months before application."
                .to_string(),
        );
    }

    if raising.contains(&FormField::Purpose) {
        push_unique(
            &mut tips,
            "If feasible, choose an essential/low-risk loan purpose category.".to_string(),
        );
    }

    push_unique(&mut tips, CLOSING_TIP.to_string());

    tips.truncate(MAX_RECOMMENDATIONS);
    tips
}

fn push_unique(tips: &mut Vec<String>, tip: String) {
    if !tips.contains(&tip) {
        tips.push(tip);
    }
}

/// Group digits the Indian way: `1234567` -> `12,34,567`.
pub fn format_rupees(amount: u32) -> String {
    let digits = amount.to_string();
    if digits.len() <= 3 {
        return digits;
    }

    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups = Vec::new();
    let mut rest = head;
    while rest.len() > 2 {
        let (left, right) = rest.split_at(rest.len() - 2);
        groups.push(right);
        rest = left;
    }
    if !rest.is_empty() {
        groups.push(rest);
    }
    groups.reverse();

    format!("{},{}", groups.join(","), tail)
}
