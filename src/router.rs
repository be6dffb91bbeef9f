use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::client::ChatClient;
use crate::features::{
  self, Feature, FeatureError, Generated, MarginNotes, PlanGeneration, QuickInsights, Recommendations,
  RelatedQuestions, StepContentInput,
};
use crate::models::{ChatRequest, FeatureId, FeatureModel, ModelConfig, ModelsResponse};
use crate::slides::split_into_slides;
use crate::storage;

pub struct RouterState {
  pub started_at: Instant,
  pub client: Arc<ChatClient>,
  pub db: Arc<Mutex<rusqlite::Connection>>,
}

pub fn build_router(state: RouterState) -> Router {
  Router::new()
    .route("/health", get(health))
    .route("/v1/models", get(models))
    .route("/v1/models/:feature", put(update_model))
    .route("/v1/chat", post(chat))
    .route("/v1/plan", post(feature_handler::<PlanGeneration>))
    .route("/v1/step-content", post(step_content))
    .route("/v1/questions", post(feature_handler::<RelatedQuestions>))
    .route("/v1/insights", post(feature_handler::<QuickInsights>))
    .route("/v1/margin-notes", post(feature_handler::<MarginNotes>))
    .route("/v1/recommendations", post(feature_handler::<Recommendations>))
    .route("/v1/slides", post(slides))
    .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
    .with_state(Arc::new(state))
}

pub async fn run_router(listener: tokio::net::TcpListener, state: RouterState) -> anyhow::Result<()> {
  let app = build_router(state);
  info!(addr = %listener.local_addr()?, "router listening");
  axum::serve(listener, app).await?;
  Ok(())
}

async fn health(State(state): State<Arc<RouterState>>) -> Json<serde_json::Value> {
  let uptime = state.started_at.elapsed().as_millis();
  Json(serde_json::json!({
    "status": "ok",
    "version": env!("CARGO_PKG_VERSION"),
    "uptime_ms": uptime
  }))
}

async fn models(State(state): State<Arc<RouterState>>) -> Json<ModelsResponse> {
  let features = state
    .client
    .config()
    .snapshot()
    .await
    .into_iter()
    .map(|(feature, config)| FeatureModel { feature, config })
    .collect();
  Json(ModelsResponse { features })
}

async fn update_model(
  State(state): State<Arc<RouterState>>,
  Path(feature): Path<String>,
  Json(config): Json<ModelConfig>,
) -> Response {
  let feature = match feature.parse::<FeatureId>() {
    Ok(f) => f,
    Err(msg) => return error_response(StatusCode::NOT_FOUND, "unknown_feature", &msg),
  };
  if config.model.trim().is_empty() || config.fallback_model.trim().is_empty() {
    return error_response(StatusCode::BAD_REQUEST, "missing_parameter", "model and fallback_model are required");
  }

  if let Err(err) = storage::upsert_model_config(&state.db, feature, &config).await {
    return error_response(StatusCode::INTERNAL_SERVER_ERROR, "store_failed", &err.to_string());
  }
  state.client.config().invalidate().await;
  info!(feature = %feature, model = %config.model, "model config updated");
  (StatusCode::OK, Json(FeatureModel { feature, config })).into_response()
}

async fn chat(State(state): State<Arc<RouterState>>, Json(req): Json<ChatRequest>) -> Response {
  if req.messages.is_empty() {
    return error_response(StatusCode::BAD_REQUEST, "missing_parameter", "messages must not be empty");
  }
  match state.client.chat(req).await {
    Ok(result) => (StatusCode::OK, Json(result)).into_response(),
    Err(err) => error_response(StatusCode::BAD_GATEWAY, "chat_failed", &err.to_string()),
  }
}

async fn feature_handler<F>(State(state): State<Arc<RouterState>>, Json(input): Json<F::Input>) -> Response
where
  F: Feature + 'static,
  F::Input: serde::de::DeserializeOwned + Send,
  F::Output: Send,
{
  let result = features::run_feature::<F>(&state.client, &input).await;
  respond(&state, F::ID, result).await
}

async fn step_content(State(state): State<Arc<RouterState>>, Json(input): Json<StepContentInput>) -> Response {
  let result = features::generate_step_content(&state.client, &state.db, &input).await;
  respond(&state, FeatureId::ContentGeneration, result).await
}

async fn slides(Json(body): Json<serde_json::Value>) -> Response {
  let Some(text) = body.get("content").and_then(|v| v.as_str()) else {
    return error_response(StatusCode::BAD_REQUEST, "missing_parameter", "missing required parameter: content");
  };
  (StatusCode::OK, Json(serde_json::json!({ "slides": split_into_slides(text) }))).into_response()
}

async fn respond<T: Serialize + Send>(
  state: &RouterState,
  feature: FeatureId,
  result: Result<Generated<T>, FeatureError>,
) -> Response {
  match result {
    Ok(generated) => {
      if !generated.cached {
        if let Err(err) = storage::store_generation(
          &state.db,
          feature,
          generated.model.as_deref(),
          generated.provider.as_deref(),
          generated.fallback_used,
          generated.tokens_used,
        )
        .await
        {
          warn!(feature = %feature, error = %err, "failed to record generation");
        }
      }
      (StatusCode::OK, Json(generated)).into_response()
    }
    Err(err @ FeatureError::MissingParameter(_)) => {
      error_response(StatusCode::BAD_REQUEST, "missing_parameter", &err.to_string())
    }
  }
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
  let body = Json(serde_json::json!({ "error": message, "code": code }));
  (status, body).into_response()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::client::testing::{MockProvider, Scripted};
  use crate::model_config::{ConfigService, SqliteConfigStore};

  async fn serve(primary: Arc<MockProvider>, secondary: Arc<MockProvider>) -> (String, tempfile::TempDir, Arc<Mutex<rusqlite::Connection>>) {
    let (dir, db) = storage::test_db();
    let config = ConfigService::new(Arc::new(SqliteConfigStore::new(db.clone())));
    let state = RouterState {
      started_at: Instant::now(),
      client: Arc::new(ChatClient::new(Arc::new(config), primary, secondary)),
      db: db.clone(),
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      let _ = run_router(listener, state).await;
    });
    (format!("http://{addr}"), dir, db)
  }

  #[tokio::test]
  async fn health_reports_ok() {
    let (base, _dir, _db) = serve(MockProvider::failing("openrouter"), MockProvider::failing("openai")).await;
    let body: serde_json::Value = reqwest::get(format!("{base}/health")).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "ok");
  }

  #[tokio::test]
  async fn missing_topic_is_a_client_error() {
    let primary = MockProvider::failing("openrouter");
    let (base, _dir, _db) = serve(primary.clone(), MockProvider::failing("openai")).await;

    let resp = reqwest::Client::new()
      .post(format!("{base}/v1/questions"))
      .json(&serde_json::json!({ "content": "some lesson" }))
      .send()
      .await
      .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "missing_parameter");
    assert!(primary.calls.lock().await.is_empty());
  }

  #[tokio::test]
  async fn exhausted_generation_returns_fallback_and_records_it() {
    let (base, _dir, db) = serve(MockProvider::failing("openrouter"), MockProvider::failing("openai")).await;

    let resp = reqwest::Client::new()
      .post(format!("{base}/v1/insights"))
      .json(&serde_json::json!({ "topic": "Graphs", "content": "Nodes and edges." }))
      .send()
      .await
      .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["fallback_used"], true);
    assert_eq!(body["data"]["nuggets"].as_array().unwrap().len(), 5);

    let conn = db.lock().await;
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM generations WHERE feature = 'quick-insights'", [], |row| row.get(0))
      .unwrap();
    assert_eq!(count, 1);
  }

  #[tokio::test]
  async fn plan_endpoint_returns_generated_plan() {
    let steps: Vec<_> = (1..=10)
      .map(|i| serde_json::json!({ "title": format!("Step {i}"), "description": "d" }))
      .collect();
    let reply = serde_json::json!({ "steps": steps }).to_string();
    let (base, _dir, _db) = serve(
      MockProvider::new("openrouter", vec![Scripted::reply(reply)]),
      MockProvider::failing("openai"),
    )
    .await;

    let body: serde_json::Value = reqwest::Client::new()
      .post(format!("{base}/v1/plan"))
      .json(&serde_json::json!({ "topic": "Rust" }))
      .send()
      .await
      .unwrap()
      .json()
      .await
      .unwrap();
    assert_eq!(body["fallback_used"], false);
    assert_eq!(body["provider"], "openrouter");
    assert_eq!(body["data"]["steps"].as_array().unwrap().len(), 10);
  }

  #[tokio::test]
  async fn chat_exhaustion_is_bad_gateway() {
    let (base, _dir, _db) = serve(MockProvider::failing("openrouter"), MockProvider::failing("openai")).await;

    let resp = reqwest::Client::new()
      .post(format!("{base}/v1/chat"))
      .json(&serde_json::json!({
        "feature": "content-generation",
        "messages": [{ "role": "user", "content": "hi" }]
      }))
      .send()
      .await
      .unwrap();
    assert_eq!(resp.status().as_u16(), 502);
  }

  #[tokio::test]
  async fn updating_a_model_is_visible_immediately() {
    let (base, _dir, _db) = serve(MockProvider::failing("openrouter"), MockProvider::failing("openai")).await;
    let http = reqwest::Client::new();

    let resp = http
      .put(format!("{base}/v1/models/quick-insights"))
      .json(&serde_json::json!({
        "provider": "openrouter",
        "model": "mistralai/mistral-large",
        "max_tokens": 900,
        "fallback_model": "openai/gpt-4o-mini",
        "temperature": null
      }))
      .send()
      .await
      .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let body: serde_json::Value = http.get(format!("{base}/v1/models")).send().await.unwrap().json().await.unwrap();
    let insights = body["features"]
      .as_array()
      .unwrap()
      .iter()
      .find(|f| f["feature"] == "quick-insights")
      .unwrap();
    assert_eq!(insights["model"], "mistralai/mistral-large");
  }

  #[tokio::test]
  async fn slides_endpoint_splits_content() {
    let (base, _dir, _db) = serve(MockProvider::failing("openrouter"), MockProvider::failing("openai")).await;

    let body: serde_json::Value = reqwest::Client::new()
      .post(format!("{base}/v1/slides"))
      .json(&serde_json::json!({ "content": "Intro.\n\n```rust\nfn main() {}\n```" }))
      .send()
      .await
      .unwrap()
      .json()
      .await
      .unwrap();
    let slides = body["slides"].as_array().unwrap();
    assert_eq!(slides.len(), 2);
    assert_eq!(slides[1]["type"], "code");
  }
}
