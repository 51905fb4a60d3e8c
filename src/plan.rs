//! Retirement and benefits plan pipeline
//!
//! RETRIEVE → PROMPT → GENERATE (chat, then text fallback) → RECONCILE

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::allocation::round_to;
use crate::config::{AppConfig, RetrievalConfig, MAX_CONTEXT_CHARS};
use crate::inference::{generate_with_fallback, GenerationParams, InferenceBackend};
use crate::models::UserProfile;
use crate::prompt::{build_question, create_prompt};
use crate::reconcile::{reconcile_plan, JsonMap};
use crate::retrieval::{retrieve_contexts, RetrievedContext, Retriever};

pub const PLAN_SYSTEM_PROMPT: &str = "Follow the user-provided prompt exactly.";

/// Seconds rounded to two decimals
fn seconds_since(start: Instant) -> f64 {
    round_to(start.elapsed().as_secs_f64(), 2)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PlanTiming {
    pub retrieve_s: f64,
    pub llm_s: f64,
    pub total_s: f64,
}

/// Structured payload returned when no text could be generated
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanFailure {
    pub error: String,
    pub timing: PlanTiming,
    pub model: String,
    pub chunks_used: usize,
    pub sources: Vec<String>,
}

/// Exactly what the caller receives
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PlanOutcome {
    Plan(JsonMap),
    Failed(PlanFailure),
}

impl PlanOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PlanOutcome::Plan(_))
    }
}

/// Diagnostics kept alongside the outcome, never sent as part of the plan
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanTrace {
    pub queries: Vec<String>,
    pub sources: Vec<String>,
    pub chunks_used: usize,
    pub timing: PlanTiming,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanRun {
    pub outcome: PlanOutcome,
    pub trace: PlanTrace,
}

pub struct PlanGenerator {
    retriever: Arc<dyn Retriever>,
    inference: Arc<dyn InferenceBackend>,
    retrieval: RetrievalConfig,
    max_context_chars: usize,
}

impl PlanGenerator {
    pub fn new(retriever: Arc<dyn Retriever>, inference: Arc<dyn InferenceBackend>) -> Self {
        Self {
            retriever,
            inference,
            retrieval: RetrievalConfig::default(),
            max_context_chars: MAX_CONTEXT_CHARS,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        retriever: Arc<dyn Retriever>,
        inference: Arc<dyn InferenceBackend>,
    ) -> Self {
        Self {
            retriever,
            inference,
            retrieval: config.retrieval,
            max_context_chars: config.max_context_chars,
        }
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.retrieval = retrieval;
        self
    }

    pub fn model_id(&self) -> &str {
        self.inference.model_id()
    }

    /// Run one plan generation.
    ///
    /// Never fails: collaborator errors come back as `PlanOutcome::Failed`.
    pub async fn generate(&self, profile: &UserProfile) -> PlanRun {
        let start = Instant::now();

        let context = match retrieve_contexts(self.retriever.as_ref(), profile, self.retrieval).await {
            Ok(context) => context,
            Err(e) => {
                error!("Context retrieval failed: {}", e);
                let retrieve_s = seconds_since(start);
                let timing = PlanTiming {
                    retrieve_s,
                    llm_s: 0.0,
                    total_s: retrieve_s,
                };
                return self.failure(format!("Retrieval failed: {}", e), timing, &RetrievedContext::default());
            }
        };
        let retrieve_s = seconds_since(start);
        let sources = context.unique_sources();

        info!(
            chunks_used = context.len(),
            queries = context.queries.len(),
            retrieve_s,
            "Context retrieved"
        );

        let prompt = create_prompt(&build_question(profile), &context.contents(), self.max_context_chars);

        let llm_start = Instant::now();
        let generated = generate_with_fallback(
            self.inference.as_ref(),
            PLAN_SYSTEM_PROMPT,
            &prompt,
            &GenerationParams::plan(),
        )
        .await;
        let llm_s = seconds_since(llm_start);

        let timing = PlanTiming {
            retrieve_s,
            llm_s,
            total_s: seconds_since(start),
        };

        let text = match generated {
            Ok(text) => text,
            Err(e) => {
                error!(model = self.model_id(), "Plan generation failed: {}", e);
                return self.failure(format!("LLM call failed: {}", e), timing, &context);
            }
        };

        if text.is_empty() {
            warn!(model = self.model_id(), "Model returned no text, using fallback plan");
        }

        let plan = reconcile_plan(&text, profile.name(), &sources);
        info!(model = self.model_id(), total_s = timing.total_s, "Plan generated");

        PlanRun {
            outcome: PlanOutcome::Plan(plan),
            trace: PlanTrace {
                queries: context.queries.clone(),
                chunks_used: context.len(),
                sources,
                timing,
            },
        }
    }

    fn failure(&self, error: String, timing: PlanTiming, context: &RetrievedContext) -> PlanRun {
        let sources = context.unique_sources();
        PlanRun {
            outcome: PlanOutcome::Failed(PlanFailure {
                error,
                timing,
                model: self.model_id().to_string(),
                chunks_used: context.len(),
                sources: sources.clone(),
            }),
            trace: PlanTrace {
                queries: context.queries.clone(),
                sources,
                chunks_used: context.len(),
                timing,
            },
        }
    }
}
