//! Plan prompt assembly
//!
//! The profile becomes a natural-language question; retrieved passages are
//! joined, hard-cut to a character budget and wrapped in a fixed template
//! that asks for the plan JSON schema.

use crate::models::UserProfile;

const NOT_AVAILABLE: &str = "N/A";

const SYSTEM_PREAMBLE: &str = "You are a question-answering assistant that must use ONLY the provided context.\n\
If the answer cannot be found in the context, reply exactly: \"I don't know.\" \
Do NOT make up facts.\n";

const GUIDELINES: &str = "Guidelines:\n\
1) Keep outputs concise but clear.\n\
2) Cite phrases and include source tags/URLs when helpful.\n\
3) If the question asks for something not in the context, say: I don't know.\n\
4) Output valid JSON with keys: \"greeting\", \"recommendations\", \"warnings\", \"as_of_year\". \
Each recommendation = {\"title\",\"summary\",\"steps\",\"considerations\",\"citations\"}.\n";

/// Longest prefix of `text` holding at most `max_chars` characters
pub fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// `1234567.891` -> `1,234,567.89` with `decimals` fraction digits
pub fn format_thousands(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && formatted.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };

    match frac_part {
        Some(frac) => format!("{}{}.{}", sign, grouped, frac),
        None => format!("{}{}", sign, grouped),
    }
}

/// Optional amount, `N/A` when absent or zero. Whole amounts keep one
/// decimal place (`5200.0`).
fn amount_or_na(value: Option<f64>) -> String {
    match value {
        Some(v) if v != 0.0 && v.fract() == 0.0 && v.abs() < 1e16 => format!("{:.1}", v),
        Some(v) if v != 0.0 => v.to_string(),
        _ => NOT_AVAILABLE.to_string(),
    }
}

fn flag_or_na(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "True",
        Some(false) => "False",
        None => NOT_AVAILABLE,
    }
}

/// Question describing the user for the plan prompt
pub fn build_question(profile: &UserProfile) -> String {
    let benefits = &profile.form.benefits;
    let cashflow = &profile.form.cashflow;
    let goal = &profile.form.savings_goal;

    let options = if benefits.employer_plan_options.is_empty() {
        "none provided".to_string()
    } else {
        benefits
            .employer_plan_options
            .iter()
            .map(|o| o.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let concerns = if profile.quiz.top_concerns.is_empty() {
        "unspecified".to_string()
    } else {
        profile
            .quiz
            .top_concerns
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let goal_name = goal
        .what_are_you_saving_for
        .as_deref()
        .filter(|g| !g.is_empty())
        .unwrap_or(NOT_AVAILABLE);
    let timeline = goal
        .timeline_months
        .map(|m| m.to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    format!(
        "Create a personalized plan based ONLY on the provided context and the user profile:\n\
- Name: {name}\n\
- Age: {age}\n\
- Salary: ${salary}\n\
- State: {state}\n\
- Employment tenure: {tenure}\n\
- Marital status: {marital}\n\
- Help type: {help}\n\
- Top concerns: {concerns}\n\
- Employer plan options: {options}\n\
- Employer match %: {match_pct}\n\
- Contributing now: {contributing}\n\
- Monthly take-home: ${take_home}\n\
- Monthly expenses: ${expenses}\n\
- Current savings: ${savings}\n\
- Savings goal: {goal_name} target ${target} in {timeline} months\n\
Explain options (401k/Roth/HSA if present), contribution limits, match strategy, and actionable steps. \
If facts are not in the context, answer: I don't know.",
        name = profile.name(),
        age = profile.age(),
        salary = format_thousands(profile.salary(), 0),
        state = profile.quiz.state,
        tenure = profile.quiz.employment_tenure,
        marital = profile.quiz.marital_status,
        help = profile.help_type(),
        concerns = concerns,
        options = options,
        match_pct = amount_or_na(benefits.employer_match_percent),
        contributing = flag_or_na(benefits.contributing_now),
        take_home = amount_or_na(cashflow.monthly_take_home_pay),
        expenses = amount_or_na(cashflow.monthly_expenses),
        savings = amount_or_na(cashflow.current_savings),
        goal_name = goal_name,
        target = amount_or_na(goal.target_amount),
        timeline = timeline,
    )
}

/// Full plan prompt; the context block never exceeds `max_ctx_chars`
pub fn create_prompt<S: AsRef<str>>(question: &str, contexts: &[S], max_ctx_chars: usize) -> String {
    let joined = contexts
        .iter()
        .map(|c| c.as_ref())
        .collect::<Vec<_>>()
        .join("\n\n");
    let ctx = clip(&joined, max_ctx_chars);

    format!(
        "{}\n{}\nQuestion:\n{}\n\nContext:\n{}\n\nAnswer (JSON only):",
        SYSTEM_PREAMBLE, GUIDELINES, question, ctx
    )
}
