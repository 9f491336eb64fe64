mod error;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::chat::{APOLOGY, ChatError, ChatModel, ChatService, GeminiClient, SessionId, SessionStore};
use crate::config::ServerConfig;
use crate::core::{Debt, DebtForm, Simulation, debt_context_message, parse_debt_form, simulate};

pub use error::ApiError;

const INDEX_HTML: &str = include_str!("../../web/index.html");
const STYLES_CSS: &str = include_str!("../../web/styles.css");
const APP_JS: &str = include_str!("../../web/app.js");

#[derive(Clone)]
pub struct AppState {
    pub chat: ChatService,
}

impl AppState {
    pub fn new(sessions: SessionStore, model: Option<Arc<dyn ChatModel>>) -> Self {
        Self {
            chat: ChatService::new(sessions, model),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulatePayload {
    session_id: Option<SessionId>,
    #[serde(flatten)]
    form: DebtForm,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    session_id: SessionId,
    #[serde(flatten)]
    simulation: Simulation,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ChatPayload {
    session_id: Option<SessionId>,
    message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatResponse {
    session_id: SessionId,
    reply: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    session_id: SessionId,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/index.html", get(index_handler))
        .route("/styles.css", get(styles_handler))
        .route("/app.js", get(app_js_handler))
        .route("/health", get(health_handler))
        .route("/api/session", post(session_handler))
        .route("/api/simulate", post(simulate_handler))
        .route("/api/chat", post(chat_handler))
        .fallback(not_found_handler)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_http_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let model: Option<Arc<dyn ChatModel>> = match config.model {
        Some(model_config) => {
            info!(model = %model_config.model, "chat model configured");
            Some(Arc::new(GeminiClient::new(model_config)?))
        }
        None => {
            info!("no API key set; chat endpoint will report the model as unavailable");
            None
        }
    };
    let sessions = SessionStore::new(config.session_max_turns)
        .with_max_sessions(config.session_max_count);
    let state = AppState::new(sessions, model);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!("debt planner listening on http://{addr}");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn index_handler() -> impl IntoResponse {
    with_cache_control(Html(INDEX_HTML))
}

async fn styles_handler() -> impl IntoResponse {
    with_cache_control((
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        STYLES_CSS,
    ))
}

async fn app_js_handler() -> impl IntoResponse {
    with_cache_control((
        [(
            header::CONTENT_TYPE,
            "application/javascript; charset=utf-8",
        )],
        APP_JS,
    ))
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, serde_json::json!({ "status": "ok" }))
}

async fn not_found_handler() -> Response {
    ApiError::NotFound.into_response()
}

async fn session_handler(State(state): State<AppState>) -> Response {
    let session_id = state.chat.sessions().create().await;
    json_response(StatusCode::OK, SessionResponse { session_id })
}

async fn simulate_handler(
    State(state): State<AppState>,
    payload: Result<Json<SimulatePayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let response = simulate_impl(&state, payload).await?;
    Ok(json_response(StatusCode::OK, response))
}

/// A batch that fails to parse produces no charts and leaves the
/// conversation untouched.
async fn simulate_impl(
    state: &AppState,
    payload: SimulatePayload,
) -> Result<SimulateResponse, ApiError> {
    let entries = parse_debt_form(&payload.form)?;
    let debts: Vec<Debt> = entries.iter().map(|e| e.debt.clone()).collect();
    let simulation = simulate(&debts);

    let session_id = state.chat.resolve_session(payload.session_id).await;
    if let Some(context) = debt_context_message(&entries) {
        state.chat.record_context(session_id, context).await;
    }

    Ok(SimulateResponse {
        session_id,
        simulation,
    })
}

async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatPayload>, JsonRejection>,
) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(e) => return ApiError::BadRequest(e.body_text()).into_response(),
    };
    chat_impl(&state, payload).await
}

async fn chat_impl(state: &AppState, payload: ChatPayload) -> Response {
    if !state.chat.is_configured() {
        return ApiError::Chat(ChatError::NotConfigured).into_response();
    }
    let Some(message) = payload.message else {
        return ApiError::BadRequest("missing message".to_string()).into_response();
    };

    let session_id = state.chat.resolve_session(payload.session_id).await;
    match state.chat.reply(session_id, &message).await {
        Ok(reply) => json_response(StatusCode::OK, ChatResponse { session_id, reply }),
        Err(err @ (ChatError::NotConfigured | ChatError::EmptyMessage)) => {
            ApiError::Chat(err).into_response()
        }
        Err(err) => {
            error!(%session_id, error = %err, "chat reply failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ChatResponse {
                    session_id,
                    reply: APOLOGY.to_string(),
                },
            )
        }
    }
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::tests::FakeModel;
    use crate::chat::{ChatTurn, Role};
    use serde_json::{Value, json};

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn state(model: Option<Arc<dyn ChatModel>>) -> AppState {
        AppState::new(SessionStore::new(100), model)
    }

    fn simulate_payload(value: Value) -> SimulatePayload {
        serde_json::from_value(value).expect("payload json")
    }

    #[tokio::test]
    async fn simulate_returns_chart_payloads_and_records_context() {
        let state = state(None);
        let response = simulate_impl(
            &state,
            simulate_payload(json!({
                "name": ["Card", "Car"],
                "principal": ["1200", "300"],
                "rate": ["12", "0"],
                "payment": ["103", "100"]
            })),
        )
        .await
        .expect("simulation succeeds");

        let json = serde_json::to_value(&response).expect("serializes");
        assert_eq!(json["lineChart"]["months"].as_array().unwrap().len(), 14);
        let datasets = json["lineChart"]["datasets"].as_array().unwrap();
        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[1]["label"], "Car");
        assert_eq!(datasets[1]["data"].as_array().unwrap().len(), 14);
        assert!(datasets[0]["color"].as_str().unwrap().starts_with("rgb("));
        assert_eq!(json["pieChart"]["labels"], json!(["Card", "Car"]));
        assert_eq!(json["pieChart"]["data"], json!([1200.0, 300.0]));
        assert_eq!(json["notices"], json!([]));

        let history = state.chat.sessions().history(response.session_id).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);
        assert!(history[0].text.contains("- Name: Card, Principal: $1,200.00"));
    }

    #[tokio::test]
    async fn simulate_skips_nan_debt_but_keeps_the_batch() {
        let state = state(None);
        let response = simulate_impl(
            &state,
            simulate_payload(json!({
                "name": ["Card", "Odd", "Car"],
                "principal": [1200, "nan", 5000],
                "rate": [12, 10, 5],
                "payment": [103, 20, 250]
            })),
        )
        .await
        .expect("batch parses");

        let labels: Vec<&str> = response
            .simulation
            .line_chart
            .datasets
            .iter()
            .map(|d| d.label.as_str())
            .collect();
        assert_eq!(labels, vec!["Card", "Car"]);
        assert_eq!(
            response.simulation.pie_chart.expect("pie").labels,
            vec!["Card".to_string(), "Car".to_string()]
        );
    }

    #[tokio::test]
    async fn simulate_rejects_mismatched_batch_without_touching_history() {
        let state = state(None);
        let session_id = state.chat.sessions().create().await;
        let err = simulate_impl(
            &state,
            simulate_payload(json!({
                "sessionId": session_id,
                "name": ["Card", "Car"],
                "principal": [1200],
                "rate": [12, 5],
                "payment": [103, 250]
            })),
        )
        .await
        .expect_err("mismatch must fail");

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let body = body_json(err.into_response()).await;
        assert!(body["error"].as_str().unwrap().contains("form data mismatch"));
        assert!(body.get("lineChart").is_none());
        assert!(state.chat.sessions().history(session_id).await.is_empty());
    }

    #[tokio::test]
    async fn simulate_reuses_session_and_deduplicates_context() {
        let state = state(None);
        let session_id = state.chat.sessions().create().await;
        let payload = json!({
            "sessionId": session_id,
            "name": ["Card"],
            "principal": [1200],
            "rate": [12],
            "payment": [103]
        });

        for _ in 0..2 {
            let response = simulate_impl(&state, simulate_payload(payload.clone()))
                .await
                .expect("ok");
            assert_eq!(response.session_id, session_id);
        }
        assert_eq!(state.chat.sessions().history(session_id).await.len(), 1);
    }

    #[tokio::test]
    async fn anonymous_simulations_do_not_grow_sessions_without_bound() {
        let state = AppState::new(SessionStore::new(100).with_max_sessions(50), None);
        let mut last = None;
        for _ in 0..1000 {
            let response = simulate_impl(
                &state,
                simulate_payload(json!({
                    "name": ["Card"],
                    "principal": [1200],
                    "rate": [12],
                    "payment": [103]
                })),
            )
            .await
            .expect("ok");
            last = Some(response.session_id);
        }

        assert_eq!(state.chat.sessions().session_count().await, 50);
        let latest = last.expect("at least one call");
        assert_eq!(state.chat.sessions().history(latest).await.len(), 1);
    }

    #[tokio::test]
    async fn chat_reports_unconfigured_model() {
        let response = chat_impl(
            &state(None),
            ChatPayload {
                session_id: None,
                message: Some("hi".to_string()),
            },
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "AI model not configured properly.");
    }

    #[tokio::test]
    async fn chat_replies_and_keeps_history_per_session() {
        let state = state(Some(Arc::new(FakeModel::new(false))));
        let response = chat_impl(
            &state,
            ChatPayload {
                session_id: None,
                message: Some("Where do I start?".to_string()),
            },
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["reply"], "seen 3 turns");

        let session_id: SessionId = body["sessionId"].as_str().unwrap().parse().unwrap();
        assert_eq!(
            state.chat.sessions().history(session_id).await,
            vec![
                ChatTurn::user("Where do I start?"),
                ChatTurn::model("seen 3 turns")
            ]
        );
    }

    #[tokio::test]
    async fn chat_failure_returns_apology_with_500() {
        let state = state(Some(Arc::new(FakeModel::new(true))));
        let response = chat_impl(
            &state,
            ChatPayload {
                session_id: None,
                message: Some("hello".to_string()),
            },
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["reply"], APOLOGY);
    }

    #[tokio::test]
    async fn chat_rejects_missing_or_blank_message() {
        let state = state(Some(Arc::new(FakeModel::new(false))));
        let missing = chat_impl(&state, ChatPayload::default()).await;
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let blank = chat_impl(
            &state,
            ChatPayload {
                session_id: None,
                message: Some("  ".to_string()),
            },
        )
        .await;
        assert_eq!(blank.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn static_and_fallback_responses_disable_caching() {
        let index = index_handler().await.into_response();
        assert_eq!(index.headers()[header::CACHE_CONTROL], "no-store");

        let missing = not_found_handler().await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(missing).await["error"], "Not found");
    }
}
