//! Response reconciliation
//!
//! Model output is free text that usually contains a JSON object. The
//! reconcilers salvage that object when they can and otherwise substitute a
//! fixed fallback with the key shape callers expect. They never fail.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::prompt::clip;

/// Characters of raw text kept as the plan fallback summary
pub const PLAN_SUMMARY_CHARS: usize = 1200;
/// Characters of raw text kept as the investment fallback overview
pub const STRATEGY_OVERVIEW_CHARS: usize = 200;

pub type JsonMap = Map<String, Value>;

lazy_static! {
    /// Brace block running to the end of the text
    static ref TRAILING_JSON_BLOCK: Regex =
        Regex::new(r"\{[\s\S]*\}\s*$").expect("trailing JSON pattern is valid");
}

/// Outcome of looking for a JSON object in model output
#[derive(Debug, Clone, PartialEq)]
pub enum Salvage {
    Parsed(JsonMap),
    /// No `{ ... }` span at all
    NoObject,
    /// A brace span was found but is not a JSON object
    Unparseable,
}

/// Locate and parse the outermost JSON object in `text`.
///
/// A brace block anchored at the end of the text wins; otherwise the span
/// from the first `{` to the last `}` is tried, which tolerates prose after
/// the object.
pub fn salvage_json(text: &str) -> Salvage {
    let trimmed = text.trim();
    let candidate = TRAILING_JSON_BLOCK
        .find(trimmed)
        .map(|m| m.as_str())
        .unwrap_or(trimmed);

    let span = match (candidate.find('{'), candidate.rfind('}')) {
        (Some(start), Some(end)) if end > start => &candidate[start..=end],
        _ => return Salvage::NoObject,
    };

    match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(map)) => Salvage::Parsed(map),
        _ => Salvage::Unparseable,
    }
}

pub fn extract_json_object(text: &str) -> Option<JsonMap> {
    match salvage_json(text) {
        Salvage::Parsed(map) => Some(map),
        _ => None,
    }
}

fn into_map(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

//
// ================= Plan =================
//

/// Plan JSON from model output, or the fixed plan fallback
pub fn reconcile_plan(raw: &str, name: &str, sources: &[String]) -> JsonMap {
    extract_json_object(raw).unwrap_or_else(|| plan_fallback(raw, name, sources))
}

pub fn plan_fallback(raw: &str, name: &str, sources: &[String]) -> JsonMap {
    into_map(json!({
        "greeting": format!("Hi {}, here\u{2019}s your personalized plan.", name),
        "recommendations": [{
            "title": "Plan Overview",
            "summary": clip(raw.trim(), PLAN_SUMMARY_CHARS),
            "steps": [],
            "considerations": [],
            "citations": sources,
        }],
        "warnings": [],
        "as_of_year": null,
    }))
}

//
// ================= Investment coach =================
//

pub fn reconcile_investment(raw: &str) -> JsonMap {
    match salvage_json(raw) {
        Salvage::Parsed(map) => map,
        Salvage::NoObject => into_map(json!({
            "greeting": "Welcome to your personalized investment plan!",
            "strategy_overview": clip(raw, STRATEGY_OVERVIEW_CHARS),
            "specific_recommendations": [],
            "action_steps": [
                "Review the recommended ETFs",
                "Start with dollar-cost averaging",
                "Set up automatic investments"
            ],
            "risk_considerations": [
                "Markets can be volatile",
                "Past performance doesn't guarantee future results"
            ],
            "rebalancing_schedule": "Review quarterly, rebalance if allocation drifts 5%+",
        })),
        Salvage::Unparseable => into_map(json!({
            "greeting": "Welcome to your personalized investment plan!",
            "strategy_overview": "Based on your profile, we recommend a diversified portfolio approach.",
            "specific_recommendations": [],
            "action_steps": [
                "Review the recommended ETFs",
                "Start with dollar-cost averaging"
            ],
            "risk_considerations": ["Investing involves risk"],
            "rebalancing_schedule": "Quarterly review recommended",
        })),
    }
}

//
// ================= Market insights =================
//

pub fn reconcile_insights(raw: &str) -> JsonMap {
    match salvage_json(raw) {
        Salvage::Parsed(map) => map,
        Salvage::NoObject => into_map(json!({
            "greeting": "Here's your market update!",
            "main_insight": "Markets showed mixed performance today with technology leading gains.",
            "portfolio_impact_explanation": "Your diversified portfolio benefited from tech sector strength.",
            "whats_happening": [],
            "looking_ahead": "Continue monitoring your portfolio's performance.",
            "should_i_worry": false,
            "opportunity": "Stay the course with your long-term strategy.",
        })),
        Salvage::Unparseable => into_map(json!({
            "greeting": "Here's your market update!",
            "main_insight": "Markets were active today.",
            "portfolio_impact_explanation": "Your portfolio moved with the broader market.",
            "whats_happening": [],
            "looking_ahead": "We'll keep you updated.",
            "should_i_worry": false,
            "opportunity": "Maintain your investment discipline.",
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN_JSON: &str = r#"{"greeting": "Hi Sam", "recommendations": [{"title": "Match", "extra": {"nested": "}"}}], "warnings": [], "as_of_year": 2025, "custom": 1}"#;

    fn expected_plan() -> JsonMap {
        into_map(serde_json::from_str(PLAN_JSON).unwrap())
    }

    #[test]
    fn test_bare_object_passes_through_unchanged() {
        assert_eq!(extract_json_object(PLAN_JSON), Some(expected_plan()));
    }

    #[test]
    fn test_object_with_leading_prose() {
        let text = format!("Sure! Here is your plan:\n{}\n", PLAN_JSON);
        assert_eq!(extract_json_object(&text), Some(expected_plan()));
    }

    #[test]
    fn test_object_with_trailing_prose() {
        let text = format!("Plan:\n{}\nLet me know if you need more.", PLAN_JSON);
        assert_eq!(extract_json_object(&text), Some(expected_plan()));
    }

    #[test]
    fn test_no_braces() {
        assert_eq!(salvage_json("I don't know."), Salvage::NoObject);
        assert_eq!(salvage_json("} backwards {"), Salvage::NoObject);
    }

    #[test]
    fn test_broken_braces() {
        assert_eq!(salvage_json("{greeting: hi}"), Salvage::Unparseable);
    }

    #[test]
    fn test_plan_fallback_shape() {
        let sources = vec!["irs.gov".to_string()];
        let raw = "x".repeat(1500);
        let result = reconcile_plan(&raw, "Sam", &sources);

        assert_eq!(result["greeting"], "Hi Sam, here\u{2019}s your personalized plan.");
        let rec = &result["recommendations"][0];
        assert_eq!(rec["title"], "Plan Overview");
        assert_eq!(rec["summary"].as_str().unwrap().chars().count(), PLAN_SUMMARY_CHARS);
        assert_eq!(rec["citations"], json!(["irs.gov"]));
        assert_eq!(result["warnings"], json!([]));
        assert!(result["as_of_year"].is_null());
    }

    #[test]
    fn test_plan_fallback_for_empty_text() {
        let result = reconcile_plan("", "Sam", &[]);
        assert_eq!(result["recommendations"][0]["summary"], "");
        assert_eq!(result["recommendations"][0]["citations"], json!([]));
    }

    #[test]
    fn test_investment_fallbacks() {
        let no_object = reconcile_investment("Buy index funds and hold.");
        assert_eq!(no_object["strategy_overview"], "Buy index funds and hold.");
        assert_eq!(no_object["action_steps"].as_array().unwrap().len(), 3);

        let broken = reconcile_investment("{not json}");
        assert_eq!(broken["risk_considerations"], json!(["Investing involves risk"]));

        let parsed = reconcile_investment(r#"{"greeting": "Hello"}"#);
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_insights_fallbacks() {
        let no_object = reconcile_insights("Markets are fine.");
        assert_eq!(no_object["should_i_worry"], false);
        assert_eq!(no_object["looking_ahead"], "Continue monitoring your portfolio's performance.");

        let broken = reconcile_insights("{oops");
        assert_eq!(broken["main_insight"], "Markets showed mixed performance today with technology leading gains.");
    }
}
