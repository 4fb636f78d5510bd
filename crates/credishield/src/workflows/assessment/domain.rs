use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// The fixed set of applicant fields sent to the scoring endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormField {
    CheckingStatus,
    Duration,
    CreditHistory,
    Purpose,
    CreditAmount,
    SavingsStatus,
    Employment,
    InstallmentCommitment,
    PersonalStatus,
    OtherParties,
    ResidenceSince,
    PropertyMagnitude,
    Age,
    OtherPaymentPlans,
    Housing,
    ExistingCredits,
    Job,
    NumDependents,
    OwnTelephone,
    ForeignWorker,
}

/// Whether a field holds a categorical option or a whole number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Categorical(&'static [&'static str]),
    Numeric(RangeInclusive<u32>),
}

impl FormField {
    pub const ALL: [FormField; 20] = [
        FormField::CheckingStatus,
        FormField::Duration,
        FormField::CreditHistory,
        FormField::Purpose,
        FormField::CreditAmount,
        FormField::SavingsStatus,
        FormField::Employment,
        FormField::InstallmentCommitment,
        FormField::PersonalStatus,
        FormField::OtherParties,
        FormField::ResidenceSince,
        FormField::PropertyMagnitude,
        FormField::Age,
        FormField::OtherPaymentPlans,
        FormField::Housing,
        FormField::ExistingCredits,
        FormField::Job,
        FormField::NumDependents,
        FormField::OwnTelephone,
        FormField::ForeignWorker,
    ];

    /// Wire name used by the scoring endpoint and the explanation payload.
    pub fn key(self) -> &'static str {
        match self {
            FormField::CheckingStatus => "checking_status",
            FormField::Duration => "duration",
            FormField::CreditHistory => "credit_history",
            FormField::Purpose => "purpose",
            FormField::CreditAmount => "credit_amount",
            FormField::SavingsStatus => "savings_status",
            FormField::Employment => "employment",
            FormField::InstallmentCommitment => "installment_commitment",
            FormField::PersonalStatus => "personal_status",
            FormField::OtherParties => "other_parties",
            FormField::ResidenceSince => "residence_since",
            FormField::PropertyMagnitude => "property_magnitude",
            FormField::Age => "age",
            FormField::OtherPaymentPlans => "other_payment_plans",
            FormField::Housing => "housing",
            FormField::ExistingCredits => "existing_credits",
            FormField::Job => "job",
            FormField::NumDependents => "num_dependents",
            FormField::OwnTelephone => "own_telephone",
            FormField::ForeignWorker => "foreign_worker",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.key() == key)
    }

    /// Label shown next to the input control.
    pub fn form_label(self) -> &'static str {
        match self {
            FormField::CheckingStatus => "Checking Status",
            FormField::Duration => "Duration (months)",
            FormField::CreditHistory => "Credit History",
            FormField::Purpose => "Loan Purpose",
            FormField::CreditAmount => "Credit Amount",
            FormField::SavingsStatus => "Savings Status",
            FormField::Employment => "Employment Length",
            FormField::InstallmentCommitment => "Installment Commitment",
            FormField::PersonalStatus => "Personal Status",
            FormField::OtherParties => "Other Parties",
            FormField::ResidenceSince => "Residence Since",
            FormField::PropertyMagnitude => "Property Magnitude",
            FormField::Age => "Age",
            FormField::OtherPaymentPlans => "Other Payment Plans",
            FormField::Housing => "Housing",
            FormField::ExistingCredits => "Existing Credits",
            FormField::Job => "Job",
            FormField::NumDependents => "Dependents",
            FormField::OwnTelephone => "Own Telephone",
            FormField::ForeignWorker => "Foreign Worker",
        }
    }

    /// Plain-language label used when explaining factors and in reports.
    pub fn display_label(self) -> &'static str {
        match self {
            FormField::CheckingStatus => "Money in Checking Account",
            FormField::SavingsStatus => "Money in Savings",
            FormField::Duration => "Repayment Time",
            FormField::CreditAmount => "Loan Amount",
            FormField::InstallmentCommitment => "Monthly Payment Burden",
            FormField::Purpose => "Why You Need the Loan",
            other => other.form_label(),
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            FormField::CheckingStatus => {
                FieldKind::Categorical(&["<0", "0<=X<200", ">=200", "no checking"])
            }
            FormField::CreditHistory => FieldKind::Categorical(&[
                "no credits/all paid",
                "all paid",
                "existing paid",
                "delayed previously",
                "critical/other existing credit",
            ]),
            FormField::Purpose => FieldKind::Categorical(&[
                "new car",
                "used car",
                "furniture/equipment",
                "radio/tv",
                "domestic appliance",
                "repairs",
                "education",
                "vacation",
                "retraining",
                "business",
                "other",
            ]),
            FormField::SavingsStatus => FieldKind::Categorical(&[
                "<100",
                "100<=X<500",
                "500<=X<1000",
                ">=1000",
                "no known savings",
            ]),
            FormField::Employment => {
                FieldKind::Categorical(&["unemployed", "<1", "1<=X<4", "4<=X<7", ">=7"])
            }
            FormField::PersonalStatus => FieldKind::Categorical(&[
                "male div/sep",
                "female div/dep/mar",
                "male single",
                "male mar/wid",
                "female single",
            ]),
            FormField::OtherParties => {
                FieldKind::Categorical(&["none", "co applicant", "guarantor"])
            }
            FormField::PropertyMagnitude => FieldKind::Categorical(&[
                "real estate",
                "life insurance",
                "car",
                "no known property",
            ]),
            FormField::OtherPaymentPlans => FieldKind::Categorical(&["bank", "stores", "none"]),
            FormField::Housing => FieldKind::Categorical(&["rent", "own", "for free"]),
            FormField::Job => FieldKind::Categorical(&[
                "unemp/unskilled non res",
                "unskilled resident",
                "skilled",
                "high qualif/self emp/mgmt",
            ]),
            FormField::OwnTelephone => FieldKind::Categorical(&["none", "yes"]),
            FormField::ForeignWorker => FieldKind::Categorical(&["yes", "no"]),
            FormField::Duration => FieldKind::Numeric(1..=120),
            FormField::CreditAmount => FieldKind::Numeric(1..=1_000_000),
            FormField::InstallmentCommitment => FieldKind::Numeric(1..=4),
            FormField::ResidenceSince => FieldKind::Numeric(1..=4),
            FormField::Age => FieldKind::Numeric(18..=120),
            FormField::ExistingCredits => FieldKind::Numeric(1..=10),
            FormField::NumDependents => FieldKind::Numeric(1..=10),
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self.kind(), FieldKind::Numeric(_))
    }
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A single field value as edited by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(u32),
    Text(String),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(value) => write!(f, "{value}"),
            FieldValue::Text(value) => f.write_str(value),
        }
    }
}

/// Rejected edits. The form is left unchanged when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("unknown form field '{0}'")]
    UnknownField(String),
    #[error("'{value}' is not a valid option for {field}")]
    UnknownOption { field: FormField, value: String },
    #[error("{field} must be between {min} and {max} (got {value})")]
    OutOfRange {
        field: FormField,
        value: u32,
        min: u32,
        max: u32,
    },
    #[error("{field} expects a {expected} value")]
    KindMismatch {
        field: FormField,
        expected: &'static str,
    },
}

/// Applicant inputs in the shape the scoring endpoint expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormInput {
    pub checking_status: String,
    pub duration: u32,
    pub credit_history: String,
    pub purpose: String,
    pub credit_amount: u32,
    pub savings_status: String,
    pub employment: String,
    pub installment_commitment: u32,
    pub personal_status: String,
    pub other_parties: String,
    pub residence_since: u32,
    pub property_magnitude: String,
    pub age: u32,
    pub other_payment_plans: String,
    pub housing: String,
    pub existing_credits: u32,
    pub job: String,
    pub num_dependents: u32,
    pub own_telephone: String,
    pub foreign_worker: String,
}

impl Default for FormInput {
    fn default() -> Self {
        Self {
            checking_status: "0<=X<200".to_string(),
            duration: 24,
            credit_history: "existing paid".to_string(),
            purpose: "radio/tv".to_string(),
            credit_amount: 3000,
            savings_status: "<100".to_string(),
            employment: "1<=X<4".to_string(),
            installment_commitment: 2,
            personal_status: "male single".to_string(),
            other_parties: "none".to_string(),
            residence_since: 2,
            property_magnitude: "car".to_string(),
            age: 35,
            other_payment_plans: "none".to_string(),
            housing: "own".to_string(),
            existing_credits: 1,
            job: "skilled".to_string(),
            num_dependents: 1,
            own_telephone: "none".to_string(),
            foreign_worker: "yes".to_string(),
        }
    }
}

impl FormInput {
    pub fn get(&self, field: FormField) -> FieldValue {
        match field {
            FormField::Duration => FieldValue::Number(self.duration),
            FormField::CreditAmount => FieldValue::Number(self.credit_amount),
            FormField::InstallmentCommitment => FieldValue::Number(self.installment_commitment),
            FormField::ResidenceSince => FieldValue::Number(self.residence_since),
            FormField::Age => FieldValue::Number(self.age),
            FormField::ExistingCredits => FieldValue::Number(self.existing_credits),
            FormField::NumDependents => FieldValue::Number(self.num_dependents),
            FormField::CheckingStatus => FieldValue::text(&self.checking_status),
            FormField::CreditHistory => FieldValue::text(&self.credit_history),
            FormField::Purpose => FieldValue::text(&self.purpose),
            FormField::SavingsStatus => FieldValue::text(&self.savings_status),
            FormField::Employment => FieldValue::text(&self.employment),
            FormField::PersonalStatus => FieldValue::text(&self.personal_status),
            FormField::OtherParties => FieldValue::text(&self.other_parties),
            FormField::PropertyMagnitude => FieldValue::text(&self.property_magnitude),
            FormField::OtherPaymentPlans => FieldValue::text(&self.other_payment_plans),
            FormField::Housing => FieldValue::text(&self.housing),
            FormField::Job => FieldValue::text(&self.job),
            FormField::OwnTelephone => FieldValue::text(&self.own_telephone),
            FormField::ForeignWorker => FieldValue::text(&self.foreign_worker),
        }
    }

    /// Apply a single edit after checking it against the field's domain.
    pub fn set(&mut self, field: FormField, value: FieldValue) -> Result<(), FormError> {
        match (field.kind(), value) {
            (FieldKind::Numeric(range), FieldValue::Number(number)) => {
                if !range.contains(&number) {
                    return Err(FormError::OutOfRange {
                        field,
                        value: number,
                        min: *range.start(),
                        max: *range.end(),
                    });
                }
                if let Some(slot) = self.numeric_slot(field) {
                    *slot = number;
                }
                Ok(())
            }
            (FieldKind::Categorical(options), FieldValue::Text(text)) => {
                if !options.contains(&text.as_str()) {
                    return Err(FormError::UnknownOption { field, value: text });
                }
                if let Some(slot) = self.text_slot(field) {
                    *slot = text;
                }
                Ok(())
            }
            (FieldKind::Numeric(_), FieldValue::Text(_)) => Err(FormError::KindMismatch {
                field,
                expected: "numeric",
            }),
            (FieldKind::Categorical(_), FieldValue::Number(_)) => Err(FormError::KindMismatch {
                field,
                expected: "categorical",
            }),
        }
    }

    /// Check every field; used for payloads that bypass `set`.
    pub fn validate(&self) -> Result<(), FormError> {
        let mut probe = FormInput::default();
        for field in FormField::ALL {
            probe.set(field, self.get(field))?;
        }
        Ok(())
    }

    pub fn entries(&self) -> Vec<(FormField, FieldValue)> {
        FormField::ALL
            .into_iter()
            .map(|field| (field, self.get(field)))
            .collect()
    }

    fn numeric_slot(&mut self, field: FormField) -> Option<&mut u32> {
        match field {
            FormField::Duration => Some(&mut self.duration),
            FormField::CreditAmount => Some(&mut self.credit_amount),
            FormField::InstallmentCommitment => Some(&mut self.installment_commitment),
            FormField::ResidenceSince => Some(&mut self.residence_since),
            FormField::Age => Some(&mut self.age),
            FormField::ExistingCredits => Some(&mut self.existing_credits),
            FormField::NumDependents => Some(&mut self.num_dependents),
            _ => None,
        }
    }

    fn text_slot(&mut self, field: FormField) -> Option<&mut String> {
        match field {
            FormField::CheckingStatus => Some(&mut self.checking_status),
            FormField::CreditHistory => Some(&mut self.credit_history),
            FormField::Purpose => Some(&mut self.purpose),
            FormField::SavingsStatus => Some(&mut self.savings_status),
            FormField::Employment => Some(&mut self.employment),
            FormField::PersonalStatus => Some(&mut self.personal_status),
            FormField::OtherParties => Some(&mut self.other_parties),
            FormField::PropertyMagnitude => Some(&mut self.property_magnitude),
            FormField::OtherPaymentPlans => Some(&mut self.other_payment_plans),
            FormField::Housing => Some(&mut self.housing),
            FormField::Job => Some(&mut self.job),
            FormField::OwnTelephone => Some(&mut self.own_telephone),
            FormField::ForeignWorker => Some(&mut self.foreign_worker),
            _ => None,
        }
    }
}

/// Signed attribution of one feature to the predicted score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorContribution {
    pub feature: String,
    pub impact: f64,
}

/// Scoring response: probability of default plus its explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub probability_of_default: f64,
    #[serde(default)]
    pub top_risk_increasing: Vec<FactorContribution>,
    #[serde(default)]
    pub top_risk_decreasing: Vec<FactorContribution>,
}

impl Prediction {
    pub fn has_valid_probability(&self) -> bool {
        self.probability_of_default.is_finite()
            && (0.0..=1.0).contains(&self.probability_of_default)
    }
}
