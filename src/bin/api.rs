use personal_finance_assistant::{
    api::{start_server, ApiState},
    audit::AuditLog,
    config::AppConfig,
    inference::{HfInferenceClient, InferenceBackend},
    insights::MarketInsights,
    investment::InvestmentCoach,
    plan::PlanGenerator,
    retrieval::retriever_from_config,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;

    if config.inference.api_token.is_none() {
        warn!("HUGGINGFACEHUB_API_TOKEN not set, generation requests will return failure payloads");
    }

    info!("Personal Finance Assistant - API Server");
    info!("Port: {}", config.port);
    info!("Model: {}", config.inference.model_id);

    // Create components
    let retriever = retriever_from_config(&config).await?;
    let inference: Arc<dyn InferenceBackend> = Arc::new(HfInferenceClient::new(config.inference.clone())?);

    let state = ApiState {
        planner: Arc::new(PlanGenerator::from_config(&config, retriever, inference.clone())),
        coach: Arc::new(InvestmentCoach::new(inference.clone())),
        insights: Arc::new(MarketInsights::new(inference)),
        audit: Arc::new(AuditLog::new()),
    };

    info!("Components initialized, starting API server");

    start_server(state, config.port).await?;

    Ok(())
}
