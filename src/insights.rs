//! Market insights feed
//!
//! Portfolio impact is computed from the static market tables; the model
//! only explains it.

use chrono::{Local, NaiveDateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::allocation::round_to;
use crate::inference::{generate_with_fallback, GenerationParams, InferenceBackend};
use crate::market::{
    action_items, calculate_portfolio_impact, market_summary, next_update, EtfImpact, InsightKind,
    MarketSummary, PortfolioImpact, MARKET_DATA,
};
use crate::reconcile::{reconcile_insights, JsonMap};

pub const INSIGHTS_SYSTEM_PROMPT: &str =
    "You are an expert financial analyst who explains markets in simple, clear language.";

const HEADLINES_IN_PROMPT: usize = 3;

fn default_name() -> String {
    "there".to_string()
}

fn default_age() -> u32 {
    25
}

/// Profile fields the feed reads; everything is optional
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightsProfile {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_age")]
    pub age: u32,
    #[serde(default)]
    pub quiz: InsightsQuiz,
}

impl Default for InsightsProfile {
    fn default() -> Self {
        Self {
            name: default_name(),
            age: default_age(),
            quiz: InsightsQuiz::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsightsQuiz {
    #[serde(default)]
    pub risk_tolerance: Option<String>,
}

impl InsightsProfile {
    pub fn risk_tolerance(&self) -> &str {
        self.quiz.risk_tolerance.as_deref().unwrap_or("medium")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsightsRequest {
    #[serde(default)]
    pub user_profile: InsightsProfile,
    /// `{symbol: percent}` in the caller's order
    #[serde(default)]
    pub portfolio_allocation: IndexMap<String, f64>,
    #[serde(default)]
    pub insight_type: InsightKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InsightsTiming {
    pub total_s: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketInsightsReport {
    pub success: bool,
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub timestamp: String,
    pub portfolio_change_percent: f64,
    pub market_summary: MarketSummary,
    pub personalized_insights: JsonMap,
    pub etf_performance: Vec<EtfImpact>,
    pub action_items: Vec<String>,
    pub next_update: String,
    pub timing: InsightsTiming,
}

#[derive(Debug, Clone, Serialize)]
pub struct InsightsFailure {
    pub success: bool,
    pub error: String,
    pub portfolio_change_percent: f64,
    pub market_summary: MarketSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum InsightsOutcome {
    Report(MarketInsightsReport),
    Failed(InsightsFailure),
}

impl InsightsOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InsightsOutcome::Report(_))
    }
}

fn market_context(impact: &PortfolioImpact) -> String {
    let indices = MARKET_DATA
        .indices
        .iter()
        .map(|i| format!("- {}: {:+.1}% ({})", i.name, i.change_percent, i.trend.as_str()))
        .collect::<Vec<_>>()
        .join("\n");

    let sectors = MARKET_DATA
        .sectors
        .iter()
        .map(|s| format!("- {}: {:+.1}% ({})", s.name, s.change_percent, s.trend.as_str()))
        .collect::<Vec<_>>()
        .join("\n");

    let etfs = impact
        .etf_impacts
        .iter()
        .map(|e| {
            format!(
                "- {} ({}): {:+.1}% (your allocation: {:.0}%)",
                e.symbol, e.name, e.change_percent, e.allocation
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let news = MARKET_DATA
        .news_headlines
        .iter()
        .take(HEADLINES_IN_PROMPT)
        .map(|h| format!("- {}", h))
        .collect::<Vec<_>>()
        .join("\n");

    let indicators = &MARKET_DATA.economic_indicators;

    format!(
        "\nCURRENT MARKET DATA:\n\n\
Major Indices Performance:\n{}\n\n\
Sector Performance:\n{}\n\n\
Your Portfolio ETFs:\n{}\n\n\
Economic Indicators:\n\
- Fed Rate: {}%\n\
- Inflation: {}% (trending {})\n\
- Unemployment: {}%\n\n\
Recent News:\n{}\n",
        indices,
        sectors,
        etfs,
        indicators.fed_rate,
        indicators.inflation_cpi,
        indicators.inflation_trend.as_str(),
        indicators.unemployment,
        news,
    )
}

pub fn create_insights_prompt(request: &InsightsRequest, impact: &PortfolioImpact) -> String {
    let profile = &request.user_profile;

    format!(
        r#"You are an expert financial analyst providing personalized market insights. Explain market movements in SIMPLE, EASY-TO-UNDERSTAND language.

USER PROFILE:
- Name: {name}
- Age: {age}
- Risk Tolerance: {risk}
- Portfolio Change Today: {change:+.2}%

{context}

TASK:
Generate a personalized {kind} market update in JSON format with these keys:

1. "greeting": Personalized greeting mentioning their portfolio performance
2. "main_insight": THE most important market movement that affected their portfolio (2-3 sentences, simple language)
3. "portfolio_impact_explanation": Explain WHY their portfolio changed (use specific percentages, relate to their ETFs)
4. "whats_happening": Array of 2-3 key market events explained simply:
   - "event": What happened (e.g., "Tech stocks rallied")
   - "simple_explanation": Why it matters in plain English
   - "impact_on_you": How it affects THEIR portfolio specifically
5. "looking_ahead": What to watch for in the coming days/week
6. "should_i_worry": Boolean + brief explanation if they should be concerned
7. "opportunity": Any actionable insight or opportunity

RULES:
- Use SIMPLE language (explain like they're new to investing)
- Always relate back to THEIR specific portfolio
- Use percentages and numbers for clarity
- Be encouraging, not alarming
- Avoid jargon - if you must use a term, explain it
- Keep each point concise but informative

Output ONLY valid JSON, no additional text."#,
        name = profile.name,
        age = profile.age,
        risk = profile.risk_tolerance(),
        change = impact.total_portfolio_change,
        context = market_context(impact),
        kind = request.insight_type.as_str(),
    )
}

pub struct MarketInsights {
    inference: Arc<dyn InferenceBackend>,
}

impl MarketInsights {
    pub fn new(inference: Arc<dyn InferenceBackend>) -> Self {
        Self { inference }
    }

    pub fn model_id(&self) -> &str {
        self.inference.model_id()
    }

    pub async fn generate(&self, request: &InsightsRequest) -> InsightsOutcome {
        self.generate_at(request, Local::now().naive_local()).await
    }

    /// Same as `generate`, with the wall clock supplied by the caller
    pub async fn generate_at(&self, request: &InsightsRequest, now: NaiveDateTime) -> InsightsOutcome {
        let start = Instant::now();
        let impact = calculate_portfolio_impact(&request.portfolio_allocation);
        let prompt = create_insights_prompt(request, &impact);

        let text = match generate_with_fallback(
            self.inference.as_ref(),
            INSIGHTS_SYSTEM_PROMPT,
            &prompt,
            &GenerationParams::insights(),
        )
        .await
        {
            Ok(text) => text,
            Err(e) => {
                error!(model = self.model_id(), "Market insights failed: {}", e);
                return InsightsOutcome::Failed(InsightsFailure {
                    success: false,
                    error: format!("Failed to generate insights: {}", e),
                    portfolio_change_percent: impact.total_portfolio_change,
                    market_summary: market_summary(),
                });
            }
        };

        let total_s = round_to(start.elapsed().as_secs_f64(), 2);
        info!(
            model = self.model_id(),
            kind = request.insight_type.as_str(),
            portfolio_change = impact.total_portfolio_change,
            total_s,
            "Market insights generated"
        );

        InsightsOutcome::Report(MarketInsightsReport {
            success: true,
            kind: request.insight_type,
            timestamp: now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            portfolio_change_percent: impact.total_portfolio_change,
            market_summary: market_summary(),
            personalized_insights: reconcile_insights(&text),
            action_items: action_items(&impact),
            next_update: next_update(request.insight_type, now),
            etf_performance: impact.etf_impacts,
            timing: InsightsTiming { total_s },
        })
    }
}
