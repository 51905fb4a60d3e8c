//! REST API server
//!
//! Exposes the plan pipeline, the investment coach and the market insights
//! feed over HTTP. Generation endpoints return their payloads unwrapped;
//! lookups and errors use `ApiResponse`.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::allocation::round_to;
use crate::audit::{compute_profile_hash, AuditLog, GenerationKind, GenerationRecord};
use crate::catalog::find_etf;
use crate::insights::{InsightsRequest, MarketInsights};
use crate::investment::{InvestmentCoach, InvestmentRequest};
use crate::market::market_analysis;
use crate::models::UserProfile;
use crate::plan::PlanGenerator;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

fn reject(status: StatusCode, message: String) -> Response {
    (status, Json(ApiResponse::error(message))).into_response()
}

/// JSON body, or the reason axum could not extract one
type JsonBody = std::result::Result<Json<serde_json::Value>, JsonRejection>;

/// Body extraction failures answer in the same JSON envelope as other errors
fn json_body(body: JsonBody) -> std::result::Result<serde_json::Value, Response> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            warn!("Rejected request body: {}", rejection.body_text());
            Err(reject(rejection.status(), rejection.body_text()))
        }
    }
}

/// Payload with the audit id attached as a header
fn with_request_id<T: Serialize>(request_id: Uuid, payload: &T) -> Response {
    let mut response = Json(payload).into_response();
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub planner: Arc<PlanGenerator>,
    pub coach: Arc<InvestmentCoach>,
    pub insights: Arc<MarketInsights>,
    pub audit: Arc<AuditLog>,
}

impl ApiState {
    async fn audit(&self, record: GenerationRecord) -> Uuid {
        let request_id = record.request_id;
        if let Err(e) = self.audit.record(record).await {
            warn!(%request_id, "Failed to store audit record: {}", e);
        }
        request_id
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Plan Endpoint
/// =============================

async fn generate_plan(
    State(state): State<ApiState>,
    body: JsonBody,
) -> Response {
    let body = match json_body(body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    let profile = match UserProfile::from_json_value(body) {
        Ok(profile) => profile,
        Err(e) => return reject(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    };
    info!(name = profile.name(), help_type = %profile.help_type(), "Received plan request");

    let run = state.planner.generate(&profile).await;

    let mut record = GenerationRecord::new(
        GenerationKind::Plan,
        state.planner.model_id(),
        compute_profile_hash(&profile),
    );
    record.success = run.outcome.is_success();
    record.chunks_used = run.trace.chunks_used;
    record.sources = run.trace.sources.clone();
    record.queries = run.trace.queries.clone();
    record.total_s = run.trace.timing.total_s;
    let request_id = state.audit(record).await;

    with_request_id(request_id, &run.outcome)
}

/// =============================
/// Investment Coach Endpoints
/// =============================

async fn investment_recommendations(
    State(state): State<ApiState>,
    body: JsonBody,
) -> Response {
    let body = match json_body(body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    let request = match InvestmentRequest::from_json_value(body) {
        Ok(request) => request,
        Err(e) => return reject(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    };
    info!(
        name = request.user_profile.name(),
        monthly_capacity = request.monthly_capacity,
        "Received investment coach request"
    );

    let start = Instant::now();
    let outcome = state.coach.recommend(&request).await;

    let mut record = GenerationRecord::new(
        GenerationKind::InvestmentCoach,
        state.coach.model_id(),
        compute_profile_hash(&request.user_profile),
    );
    record.success = outcome.is_success();
    record.total_s = round_to(start.elapsed().as_secs_f64(), 2);
    let request_id = state.audit(record).await;

    with_request_id(request_id, &outcome)
}

async fn etf_info(Path(symbol): Path<String>) -> Response {
    match find_etf(&symbol) {
        Some(details) => Json(details).into_response(),
        None => reject(StatusCode::NOT_FOUND, format!("Unknown ETF symbol: {}", symbol)),
    }
}

async fn get_market_analysis() -> Response {
    Json(market_analysis()).into_response()
}

/// =============================
/// Market Insights Endpoint
/// =============================

async fn generate_market_insights(
    State(state): State<ApiState>,
    body: JsonBody,
) -> Response {
    let body = match json_body(body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    let request: InsightsRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => return reject(StatusCode::UNPROCESSABLE_ENTITY, format!("Invalid request: {}", e)),
    };
    info!(
        kind = request.insight_type.as_str(),
        holdings = request.portfolio_allocation.len(),
        "Received market insights request"
    );

    let start = Instant::now();
    let outcome = state.insights.generate(&request).await;

    let mut record = GenerationRecord::new(
        GenerationKind::MarketInsights,
        state.insights.model_id(),
        compute_profile_hash(&request.user_profile),
    );
    record.success = outcome.is_success();
    record.total_s = round_to(start.elapsed().as_secs_f64(), 2);
    let request_id = state.audit(record).await;

    with_request_id(request_id, &outcome)
}

/// =============================
/// Audit Endpoint
/// =============================

async fn audit_record(State(state): State<ApiState>, Path(request_id): Path<String>) -> Response {
    let Ok(request_id) = Uuid::parse_str(&request_id) else {
        return reject(StatusCode::BAD_REQUEST, format!("Invalid request id: {}", request_id));
    };

    match state.audit.get(request_id).await {
        Some(record) => (StatusCode::OK, Json(ApiResponse::success(record))).into_response(),
        None => reject(StatusCode::NOT_FOUND, format!("No audit record for {}", request_id)),
    }
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    limit: Option<usize>,
}

const DEFAULT_AUDIT_PAGE: usize = 20;

async fn recent_audit_records(
    State(state): State<ApiState>,
    query: std::result::Result<Query<AuditQuery>, QueryRejection>,
) -> Response {
    let limit = match query {
        Ok(Query(query)) => query.limit.unwrap_or(DEFAULT_AUDIT_PAGE),
        Err(rejection) => return reject(rejection.status(), rejection.body_text()),
    };

    let records = state.audit.recent(limit).await;
    let data = serde_json::json!({
        "total": state.audit.len().await,
        "capacity": state.audit.capacity(),
        "records": records,
    });
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/plan", post(generate_plan))
        .route(
            "/api/investment-coach/recommendations",
            post(investment_recommendations),
        )
        .route("/api/investment-coach/etf/:symbol", get(etf_info))
        .route(
            "/api/investment-coach/market-analysis",
            get(get_market_analysis),
        )
        .route("/api/market-insights", post(generate_market_insights))
        .route("/api/audit", get(recent_audit_records))
        .route("/api/audit/:request_id", get(audit_record))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::tests::ScriptedBackend;
    use crate::inference::InferenceBackend;
    use crate::models::tests::sample_profile_json;
    use crate::retrieval::{Passage, StaticRetriever};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn state_with(backend: ScriptedBackend) -> ApiState {
        let backend: Arc<dyn InferenceBackend> = Arc::new(backend);
        let retriever = Arc::new(
            StaticRetriever::new().with_fallback(vec![Passage::new("Match is free money.", "dol.gov")]),
        );
        ApiState {
            planner: Arc::new(PlanGenerator::new(retriever, backend.clone())),
            coach: Arc::new(InvestmentCoach::new(backend.clone())),
            insights: Arc::new(MarketInsights::new(backend)),
            audit: Arc::new(AuditLog::new()),
        }
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, request_id, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_uri(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let router = create_router(state_with(ScriptedBackend::failing()));
        let (status, _, body) = send(router, get_uri("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_plan_round_trip_with_audit() {
        let router = create_router(state_with(ScriptedBackend::chat_ok(
            r#"{"greeting": "Hi Jordan", "warnings": []}"#,
        )));

        let (status, request_id, body) = send(router.clone(), post_json("/api/plan", sample_profile_json())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"greeting": "Hi Jordan", "warnings": []}));

        let request_id = request_id.unwrap();
        let (status, _, audit) = send(router, get_uri(&format!("/api/audit/{}", request_id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(audit["data"]["kind"], "plan");
        assert_eq!(audit["data"]["success"], true);
        assert_eq!(audit["data"]["sources"], json!(["dol.gov"]));
    }

    #[tokio::test]
    async fn test_invalid_profile_is_422() {
        let router = create_router(state_with(ScriptedBackend::failing()));
        let mut profile = sample_profile_json();
        profile["quiz"]["age"] = json!(7);

        let (status, _, body) = send(router, post_json("/api/plan", profile)).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid profile"));
    }

    #[tokio::test]
    async fn test_plan_failure_is_200_with_error_payload() {
        let router = create_router(state_with(ScriptedBackend::failing()));

        let (status, _, body) = send(router, post_json("/api/plan", sample_profile_json())).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["error"].as_str().unwrap().starts_with("LLM call failed"));
        assert_eq!(body["model"], "test/model");
    }

    #[tokio::test]
    async fn test_investment_recommendations() {
        let router = create_router(state_with(ScriptedBackend::chat_ok(r#"{"greeting": "Hello"}"#)));
        let body = json!({
            "user_profile": sample_profile_json(),
            "monthly_capacity": 500,
            "goal_amount": 40000,
            "goal_timeline_months": 36
        });

        let (status, request_id, body) =
            send(router, post_json("/api/investment-coach/recommendations", body)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(request_id.is_some());
        assert_eq!(body["success"], true);
        assert_eq!(body["ai_insights"]["greeting"], "Hello");
    }

    #[tokio::test]
    async fn test_etf_lookup() {
        let router = create_router(state_with(ScriptedBackend::failing()));

        let (status, _, body) = send(router.clone(), get_uri("/api/investment-coach/etf/qqq")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["symbol"], "QQQ");
        assert_eq!(body["performance"]["change_percent"], 2.4);

        let (status, _, body) = send(router, get_uri("/api/investment-coach/etf/ZZZ")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_market_analysis() {
        let router = create_router(state_with(ScriptedBackend::failing()));
        let (status, _, body) = send(router, get_uri("/api/investment-coach/market-analysis")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"]["top_sector"], "Technology");
        assert_eq!(body["data"]["indices"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_market_insights_failure_payload() {
        let router = create_router(state_with(ScriptedBackend::failing()));
        let body = json!({
            "user_profile": {"name": "Jordan"},
            "portfolio_allocation": {"QQQ": 100},
            "insight_type": "daily"
        });

        let (status, _, body) = send(router, post_json("/api/market-insights", body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["portfolio_change_percent"], 2.4);
    }

    #[tokio::test]
    async fn test_market_insights_rejects_bad_type() {
        let router = create_router(state_with(ScriptedBackend::failing()));
        let body = json!({"insight_type": "monthly"});

        let (status, _, body) = send(router, post_json("/api/market-insights", body)).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_malformed_body_is_json_error() {
        let router = create_router(state_with(ScriptedBackend::failing()));
        let request = Request::builder()
            .method("POST")
            .uri("/api/plan")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let (status, request_id, body) = send(router, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(request_id.is_none());
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("JSON"));
    }

    #[tokio::test]
    async fn test_wrong_content_type_is_json_error() {
        let router = create_router(state_with(ScriptedBackend::failing()));
        for uri in [
            "/api/plan",
            "/api/investment-coach/recommendations",
            "/api/market-insights",
        ] {
            let request = Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "text/plain")
                .body(Body::from(sample_profile_json().to_string()))
                .unwrap();

            let (status, _, body) = send(router.clone(), request).await;

            assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE, "{}", uri);
            assert_eq!(body["success"], false);
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_recent_audit_records() {
        let router = create_router(state_with(ScriptedBackend::chat_ok("{}")));
        for _ in 0..3 {
            send(router.clone(), post_json("/api/plan", sample_profile_json())).await;
        }

        let (status, _, body) = send(router.clone(), get_uri("/api/audit?limit=2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 3);
        assert_eq!(body["data"]["records"].as_array().unwrap().len(), 2);

        let (status, _, body) = send(router, get_uri("/api/audit?limit=many")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_unknown_audit_id() {
        let router = create_router(state_with(ScriptedBackend::failing()));

        let (status, _, _) = send(router.clone(), get_uri(&format!("/api/audit/{}", Uuid::new_v4()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) = send(router, get_uri("/api/audit/not-a-uuid")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
