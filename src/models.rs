//! User profile models
//!
//! Profiles arrive as JSON from the quiz + form flow, are normalised and
//! validated once, and are read-only afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use validator::{Validate, ValidationError};

use crate::error::AdvisorError;
use crate::Result;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HelpType {
    Investment,
    EmployerRetirement,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EmploymentTenure {
    #[serde(rename = "Less than three months")]
    LessThanThreeMonths,
    #[serde(rename = "3-12 months")]
    ThreeToTwelveMonths,
    #[serde(rename = "1-3 years")]
    OneToThreeYears,
    #[serde(rename = "More than 3 years")]
    MoreThanThreeYears,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MaritalStatus {
    Single,
    Married,
    Separated,
    Divorced,
    Widowed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Concern {
    #[serde(rename = "Understanding my company's benefits (insurance, 401k)")]
    Benefits,
    #[serde(rename = "How to manage my first real paycheck")]
    FirstPaycheck,
    #[serde(rename = "Paying off student loans/debt")]
    Debt,
    #[serde(rename = "Starting an emergency fund")]
    EmergencyFund,
    #[serde(rename = "Saving for a big purchase (car, down payment)")]
    BigPurchase,
    #[serde(rename = "Starting to invest for the future")]
    StartInvesting,
    #[serde(rename = "Budgeting and tracking my spending")]
    Budgeting,
    #[serde(rename = "Understanding taxes and withholdings")]
    Taxes,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PlanOption {
    #[serde(rename = "401k")]
    K401,
    #[serde(rename = "roth_401k")]
    Roth401k,
    #[serde(rename = "hsa")]
    Hsa,
    #[serde(rename = "fsa")]
    Fsa,
    #[serde(rename = "other")]
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HealthEnrollment {
    #[serde(rename = "Yes, I'm enrolled")]
    Enrolled,
    #[serde(rename = "No, not yet")]
    NotYet,
}

impl HelpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HelpType::Investment => "investment",
            HelpType::EmployerRetirement => "employer_retirement",
        }
    }

    /// Employer-sponsored retirement assistance requested
    pub fn is_employer(&self) -> bool {
        self.as_str().starts_with("employer")
    }
}

impl EmploymentTenure {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmploymentTenure::LessThanThreeMonths => "Less than three months",
            EmploymentTenure::ThreeToTwelveMonths => "3-12 months",
            EmploymentTenure::OneToThreeYears => "1-3 years",
            EmploymentTenure::MoreThanThreeYears => "More than 3 years",
        }
    }
}

impl MaritalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaritalStatus::Single => "Single",
            MaritalStatus::Married => "Married",
            MaritalStatus::Separated => "Separated",
            MaritalStatus::Divorced => "Divorced",
            MaritalStatus::Widowed => "Widowed",
        }
    }
}

impl RiskTolerance {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTolerance::Low => "low",
            RiskTolerance::Medium => "medium",
            RiskTolerance::High => "high",
        }
    }
}

impl Concern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Concern::Benefits => "Understanding my company's benefits (insurance, 401k)",
            Concern::FirstPaycheck => "How to manage my first real paycheck",
            Concern::Debt => "Paying off student loans/debt",
            Concern::EmergencyFund => "Starting an emergency fund",
            Concern::BigPurchase => "Saving for a big purchase (car, down payment)",
            Concern::StartInvesting => "Starting to invest for the future",
            Concern::Budgeting => "Budgeting and tracking my spending",
            Concern::Taxes => "Understanding taxes and withholdings",
        }
    }
}

impl PlanOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanOption::K401 => "401k",
            PlanOption::Roth401k => "roth_401k",
            PlanOption::Hsa => "hsa",
            PlanOption::Fsa => "fsa",
            PlanOption::Other => "other",
        }
    }

    /// Health savings / flexible spending account
    pub fn is_health_account(&self) -> bool {
        matches!(self, PlanOption::Hsa | PlanOption::Fsa)
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )*
    };
}

display_as_str!(HelpType, EmploymentTenure, MaritalStatus, RiskTolerance, Concern, PlanOption);

//
// ================= Quiz =================
//

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QuizAnswers {
    pub name: String,
    #[validate(range(min = 16, max = 100))]
    pub age: u32,
    pub employment_tenure: EmploymentTenure,
    #[validate(custom(function = "validate_state_code"))]
    pub state: String,
    #[validate(range(min = 0.0))]
    pub salary: f64,
    pub marital_status: MaritalStatus,
    pub help_type: HelpType,
    #[serde(default)]
    pub top_concerns: Vec<Concern>,
    #[serde(default)]
    pub risk_tolerance: Option<RiskTolerance>,
}

//
// ================= Form =================
//

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct BenefitsDetails {
    #[serde(default)]
    pub employer_offers_health_insurance: Option<bool>,
    #[serde(default)]
    pub enrolled_in_health_insurance: Option<HealthEnrollment>,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub monthly_premium: Option<f64>,
    #[serde(default)]
    pub employer_contributes_hsa_or_fsa: Option<bool>,
    #[serde(default)]
    pub employer_offers_retirement_plan: Option<bool>,
    #[serde(default)]
    pub employer_plan_options: Vec<PlanOption>,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 100.0))]
    pub employer_match_percent: Option<f64>,
    #[serde(default)]
    pub contributing_now: Option<bool>,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub current_monthly_contribution: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct SavingsGoalDetails {
    #[serde(default)]
    pub what_are_you_saving_for: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub target_amount: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 1, max = 600))]
    pub timeline_months: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct HouseholdCashflow {
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub monthly_take_home_pay: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub monthly_expenses: Option<f64>,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub current_savings: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct FormAnswers {
    #[serde(default)]
    #[validate(nested)]
    pub cashflow: HouseholdCashflow,
    #[serde(default)]
    #[validate(nested)]
    pub benefits: BenefitsDetails,
    #[serde(default)]
    #[validate(nested)]
    pub savings_goal: SavingsGoalDetails,
}

//
// ================= Profile =================
//

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UserProfile {
    #[validate(nested)]
    pub quiz: QuizAnswers,
    #[serde(default)]
    #[validate(nested)]
    pub form: FormAnswers,
}

impl UserProfile {
    /// Deserialize, normalise and validate an incoming profile payload
    pub fn from_json_value(value: serde_json::Value) -> Result<Self> {
        let mut profile: UserProfile = serde_json::from_value(value)
            .map_err(|e| AdvisorError::Validation(e.to_string()))?;
        profile.normalize();
        profile.validate()?;
        Ok(profile)
    }

    /// Canonical casing for free-text fields checked by validation
    pub(crate) fn normalize(&mut self) {
        self.quiz.state = self.quiz.state.trim().to_uppercase();
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| AdvisorError::Validation(e.to_string()))?;
        Self::from_json_value(value)
    }

    pub fn name(&self) -> &str {
        &self.quiz.name
    }

    pub fn age(&self) -> u32 {
        self.quiz.age
    }

    pub fn salary(&self) -> f64 {
        self.quiz.salary
    }

    pub fn help_type(&self) -> HelpType {
        self.quiz.help_type
    }

    /// Stated risk tolerance, medium when the quiz left it blank
    pub fn risk_tolerance(&self) -> RiskTolerance {
        self.quiz.risk_tolerance.unwrap_or_default()
    }
}

fn validate_state_code(state: &str) -> std::result::Result<(), ValidationError> {
    if state.len() == 2 && state.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(ValidationError::new("us_state_code"))
    }
}
