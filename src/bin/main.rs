use personal_finance_assistant::{
    config::AppConfig,
    inference::HfInferenceClient,
    models::UserProfile,
    plan::{PlanGenerator, PlanOutcome},
    retrieval::retriever_from_config,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_PROFILE_PATH: &str = "sample_json";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::from_env()?;
    if config.inference.api_token.is_none() {
        return Err("Set HUGGINGFACEHUB_API_TOKEN in your environment.".into());
    }

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PROFILE_PATH));

    let raw = tokio::fs::read_to_string(&path).await?;
    let profile = UserProfile::from_json_str(&raw)?;

    info!(path = %path.display(), name = profile.name(), "Generating plan");

    let retriever = retriever_from_config(&config).await?;
    let inference = Arc::new(HfInferenceClient::new(config.inference.clone())?);
    let generator = PlanGenerator::from_config(&config, retriever, inference);

    let run = generator.generate(&profile).await;

    info!(
        chunks_used = run.trace.chunks_used,
        queries = ?run.trace.queries,
        total_s = run.trace.timing.total_s,
        "Plan run finished"
    );
    if let PlanOutcome::Failed(failure) = &run.outcome {
        error!("{}", failure.error);
    }

    println!("{}", serde_json::to_string_pretty(&run.outcome)?);

    Ok(())
}
