//! Investment coach
//!
//! Deterministic allocation and ETF picks, with model-written commentary on
//! top. The deterministic parts survive a failed model call.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use validator::Validate;

use crate::allocation::{
    calculate_allocation, monthly_breakdown, rebalancing_tips, round_to, Allocation, MonthlyInvestment,
};
use crate::catalog::{recommended_etfs, EtfInfo};
use crate::inference::{generate_with_fallback, GenerationParams, InferenceBackend};
use crate::models::{RiskTolerance, UserProfile};
use crate::prompt::format_thousands;
use crate::reconcile::{reconcile_investment, JsonMap};
use crate::Result;

pub const INVESTMENT_SYSTEM_PROMPT: &str =
    "You are an expert investment advisor. Provide clear, actionable advice in JSON format.";

/// ETFs listed in the prompt's market context
const PROMPT_ETF_COUNT: usize = 6;
/// ETFs returned to the caller
const RECOMMENDED_ETF_COUNT: usize = 5;
const DEFAULT_TIMELINE_YEARS: f64 = 5.0;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InvestmentRequest {
    #[validate(nested)]
    pub user_profile: UserProfile,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub monthly_capacity: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub goal_amount: f64,
    #[serde(default)]
    #[validate(range(max = 1200))]
    pub goal_timeline_months: u32,
}

impl InvestmentRequest {
    pub fn from_json_value(value: serde_json::Value) -> Result<Self> {
        let mut request: InvestmentRequest = serde_json::from_value(value)
            .map_err(|e| crate::error::AdvisorError::Validation(e.to_string()))?;
        request.user_profile.normalize();
        request.validate()?;
        Ok(request)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoachTiming {
    pub total_s: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvestmentPlan {
    pub success: bool,
    pub allocation: Allocation,
    pub recommended_etfs: Vec<EtfInfo>,
    pub ai_insights: JsonMap,
    pub monthly_investment_breakdown: Vec<MonthlyInvestment>,
    pub rebalancing_suggestions: Vec<String>,
    pub risk_level: RiskTolerance,
    pub timing: CoachTiming,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvestmentFailure {
    pub success: bool,
    pub error: String,
    pub allocation: Allocation,
    pub recommended_etfs: Vec<EtfInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum InvestmentOutcome {
    Recommended(InvestmentPlan),
    Failed(InvestmentFailure),
}

impl InvestmentOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InvestmentOutcome::Recommended(_))
    }
}

fn market_context(etfs: &[EtfInfo], allocation: &Allocation) -> String {
    let etf_list = etfs
        .iter()
        .take(PROMPT_ETF_COUNT)
        .map(|etf| {
            format!(
                "- {}: {} ({}, expense ratio: {}%)",
                etf.symbol, etf.name, etf.kind, etf.expense_ratio
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "\nAvailable ETFs for consideration:\n{}\n\nSuggested allocation:\n- Stocks: {}%\n- Bonds: {}%\n",
        etf_list, allocation.total_stocks, allocation.total_bonds
    )
}

pub fn create_investment_prompt(request: &InvestmentRequest, allocation: &Allocation, etfs: &[EtfInfo]) -> String {
    let profile = &request.user_profile;

    let timeline_years = if request.goal_timeline_months == 0 {
        DEFAULT_TIMELINE_YEARS
    } else {
        f64::from(request.goal_timeline_months) / 12.0
    };

    let concerns = if profile.quiz.top_concerns.is_empty() {
        "General investing".to_string()
    } else {
        profile
            .quiz
            .top_concerns
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        r#"You are an expert investment advisor. Provide personalized investment recommendations.

USER PROFILE:
- Name: {name}
- Age: {age}
- Risk Tolerance: {risk}
- Monthly Investment Capacity: ${capacity}
- Savings Goal: ${goal} in {years:.1} years
- Current Concerns: {concerns}

{context}

TASK:
Provide specific, actionable investment recommendations in JSON format with these keys:
1. "greeting": A personalized greeting
2. "strategy_overview": Brief overview of the recommended strategy (2-3 sentences)
3. "specific_recommendations": Array of 3-5 specific ETF/fund recommendations with:
   - "symbol": ETF symbol
   - "name": Full name
   - "allocation_percent": What % of monthly investment
   - "reasoning": Why this fits their profile (1-2 sentences)
4. "action_steps": Array of 3-5 immediate action steps
5. "risk_considerations": Array of 2-3 risk warnings
6. "rebalancing_schedule": When and how to rebalance

Focus on:
- Low-cost, diversified ETFs
- Tax efficiency
- Dollar-cost averaging strategy
- Matching their risk tolerance
- Clear explanations for every recommendation

Output ONLY valid JSON, no additional text."#,
        name = profile.name(),
        age = profile.age(),
        risk = profile.risk_tolerance(),
        capacity = format_thousands(request.monthly_capacity, 2),
        goal = format_thousands(request.goal_amount, 2),
        years = timeline_years,
        concerns = concerns,
        context = market_context(etfs, allocation),
    )
}

pub struct InvestmentCoach {
    inference: Arc<dyn InferenceBackend>,
}

impl InvestmentCoach {
    pub fn new(inference: Arc<dyn InferenceBackend>) -> Self {
        Self { inference }
    }

    pub fn model_id(&self) -> &str {
        self.inference.model_id()
    }

    pub async fn recommend(&self, request: &InvestmentRequest) -> InvestmentOutcome {
        let start = Instant::now();
        let profile = &request.user_profile;
        let risk = profile.risk_tolerance();

        let allocation = calculate_allocation(risk, profile.age());
        let etfs = recommended_etfs(risk);
        let top_etfs: Vec<EtfInfo> = etfs.iter().take(RECOMMENDED_ETF_COUNT).copied().collect();

        let prompt = create_investment_prompt(request, &allocation, &etfs);

        let text = match generate_with_fallback(
            self.inference.as_ref(),
            INVESTMENT_SYSTEM_PROMPT,
            &prompt,
            &GenerationParams::investment(),
        )
        .await
        {
            Ok(text) => text,
            Err(e) => {
                error!(model = self.model_id(), "Investment recommendation failed: {}", e);
                return InvestmentOutcome::Failed(InvestmentFailure {
                    success: false,
                    error: format!("Failed to generate recommendations: {}", e),
                    allocation,
                    recommended_etfs: top_etfs,
                });
            }
        };

        let total_s = round_to(start.elapsed().as_secs_f64(), 2);
        info!(model = self.model_id(), risk = %risk, total_s, "Investment recommendations generated");

        InvestmentOutcome::Recommended(InvestmentPlan {
            success: true,
            ai_insights: reconcile_investment(&text),
            monthly_investment_breakdown: monthly_breakdown(request.monthly_capacity, &allocation, &top_etfs),
            rebalancing_suggestions: rebalancing_tips(&allocation, profile.age()),
            allocation,
            recommended_etfs: top_etfs,
            risk_level: risk,
            timing: CoachTiming { total_s },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::tests::ScriptedBackend;
    use crate::models::tests::sample_profile_json;
    use serde_json::json;

    fn request(capacity: f64, months: u32) -> InvestmentRequest {
        InvestmentRequest::from_json_value(json!({
            "user_profile": sample_profile_json(),
            "monthly_capacity": capacity,
            "goal_amount": 40000,
            "goal_timeline_months": months,
        }))
        .unwrap()
    }

    #[test]
    fn test_request_validation() {
        let ok = request(500.0, 36);
        assert_eq!(ok.user_profile.quiz.state, "CA");

        let negative = InvestmentRequest::from_json_value(json!({
            "user_profile": sample_profile_json(),
            "monthly_capacity": -10,
        }));
        assert!(negative.unwrap_err().is_client_error());
    }

    #[test]
    fn test_prompt_contents() {
        let req = request(1500.0, 36);
        let allocation = calculate_allocation(RiskTolerance::Medium, 30);
        let etfs = recommended_etfs(RiskTolerance::Medium);
        let prompt = create_investment_prompt(&req, &allocation, &etfs);

        assert!(prompt.contains("- Monthly Investment Capacity: $1,500.00"));
        assert!(prompt.contains("- Savings Goal: $40,000.00 in 3.0 years"));
        assert!(prompt.contains("- Current Concerns: Starting an emergency fund"));
        assert!(prompt.contains("- VEA: Vanguard FTSE Developed Markets ETF (International, expense ratio: 0.05%)"));
        assert!(prompt.contains("- AGG: "));
        // only the first six ETFs reach the prompt
        assert!(!prompt.contains("- VUG: "));
        assert!(prompt.contains("- Stocks: 80%\n- Bonds: 20%"));
    }

    #[test]
    fn test_zero_timeline_defaults_to_five_years() {
        let req = request(500.0, 0);
        let allocation = calculate_allocation(RiskTolerance::Medium, 30);
        let prompt = create_investment_prompt(&req, &allocation, &recommended_etfs(RiskTolerance::Medium));
        assert!(prompt.contains("in 5.0 years"));
    }

    #[tokio::test]
    async fn test_successful_recommendation() {
        let coach = InvestmentCoach::new(Arc::new(ScriptedBackend::chat_ok(
            r#"Here you go: {"greeting": "Hi Jordan", "action_steps": ["Open a brokerage account"]}"#,
        )));

        let outcome = coach.recommend(&request(500.0, 36)).await;

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["risk_level"], "medium");
        assert_eq!(json["ai_insights"]["greeting"], "Hi Jordan");
        assert_eq!(json["recommended_etfs"].as_array().unwrap().len(), 5);
        assert_eq!(json["monthly_investment_breakdown"][0]["monthly_amount"], 200.0);
        assert_eq!(json["allocation"]["total_stocks"], 80);
        assert!(json["timing"]["total_s"].is_number());
    }

    #[tokio::test]
    async fn test_failure_keeps_deterministic_parts() {
        let coach = InvestmentCoach::new(Arc::new(ScriptedBackend::failing()));

        let outcome = coach.recommend(&request(500.0, 36)).await;

        assert!(!outcome.is_success());
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], false);
        assert!(json["error"]
            .as_str()
            .unwrap()
            .starts_with("Failed to generate recommendations:"));
        assert_eq!(json["allocation"]["total_bonds"], 20);
        assert_eq!(json["recommended_etfs"][0]["symbol"], "VOO");
        assert!(json.get("ai_insights").is_none());
    }
}
