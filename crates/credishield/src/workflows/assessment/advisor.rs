use serde::Serialize;

use super::domain::FormInput;

/// Identifies which advisory rule produced a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryRule {
    YoungApplicant,
    LargeAmountShortDuration,
    HighInstallmentBurden,
    UnemployedLargeAmount,
    LowSavingsLargeAmount,
    ManyExistingCredits,
}

/// Non-blocking hint derived from the raw form; never prevents submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationWarning {
    pub rule: AdvisoryRule,
    pub message: &'static str,
}

struct Advisory {
    rule: AdvisoryRule,
    applies: fn(&FormInput) -> bool,
    message: &'static str,
}

const RULES: &[Advisory] = &[
    Advisory {
        rule: AdvisoryRule::YoungApplicant,
        applies: |input| input.age < 21,
        message: "Very young applicant profiles can be considered higher risk by many lenders.",
    },
    Advisory {
        rule: AdvisoryRule::LargeAmountShortDuration,
        applies: |input| input.credit_amount > 15_000 && input.duration < 18,
        message: "High loan amount with short repayment time may create heavy monthly burden.",
    },
    Advisory {
        rule: AdvisoryRule::HighInstallmentBurden,
        applies: |input| input.installment_commitment >= 4,
        message:
            "Monthly installment burden is high; consider reducing amount or extending tenure.",
    },
    Advisory {
        rule: AdvisoryRule::UnemployedLargeAmount,
        applies: |input| input.employment == "unemployed" && input.credit_amount > 6_000,
        message: "Unemployed status with a large loan request may reduce approval confidence.",
    },
    Advisory {
        rule: AdvisoryRule::LowSavingsLargeAmount,
        applies: |input| input.savings_status == "<100" && input.credit_amount > 10_000,
        message: "Low savings plus high loan amount may weaken repayment confidence.",
    },
    Advisory {
        rule: AdvisoryRule::ManyExistingCredits,
        applies: |input| input.existing_credits >= 3,
        message: "Multiple active loans can increase risk; review outstanding obligations.",
    },
];

/// Every matching rule, in declaration order.
pub fn warnings(input: &FormInput) -> Vec<ValidationWarning> {
    RULES
        .iter()
        .filter(|advisory| (advisory.applies)(input))
        .map(|advisory| ValidationWarning {
            rule: advisory.rule,
            message: advisory.message,
        })
        .collect()
}

pub fn hints(input: &FormInput) -> Vec<String> {
    warnings(input)
        .into_iter()
        .map(|warning| warning.message.to_string())
        .collect()
}
