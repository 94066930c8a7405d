use crate::agent::{ AgentError, MentorAgent };
use crate::llm::chat::ChatChunk;
use crate::models::api::{
    ChatRequest,
    ErrorResponse,
    TitleRequest,
    TitleResponse,
    UsageQuery,
};
use crate::usage::DEFAULT_USAGE_LIMIT;
use super::auth::{ self, RequestLimiter };
use std::error::Error;
use std::sync::Arc;
use axum::{
    body::Body,
    extract::{ Query, State },
    http::{ header, StatusCode },
    middleware,
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use futures::StreamExt;
use serde::Serialize;
use tower_http::cors::{ Any, CorsLayer };
use log::{ error, info };

#[derive(Serialize)]
struct ReloadResponse {
    success: bool,
    message: String,
    details: Option<Vec<String>>,
}

#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<MentorAgent>,
    pub api_key: Option<String>,
    pub limiter: Arc<RequestLimiter>,
}

impl AppState {
    pub fn new(agent: Arc<MentorAgent>, api_key: Option<String>, per_second: u32) -> Self {
        Self { agent, api_key, limiter: Arc::new(auth::new_limiter(per_second)) }
    }
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = match &self {
            AgentError::EmptyConversation | AgentError::NothingToTitle => StatusCode::BAD_REQUEST,
            AgentError::Provider(_) => StatusCode::BAD_GATEWAY,
            AgentError::Prompt(_) | AgentError::Guide(_) | AgentError::Usage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let chat_routes = Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/title", post(title_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::rate_limit));

    Router::new()
        .merge(chat_routes)
        .route("/api/usage", get(usage_handler))
        .route("/api/reload-prompts", get(reload_prompts_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_signature))
        .layer(cors)
        .with_state(state)
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>
) -> Result<Response, AgentError> {
    let stream = state.agent.stream_chat(req).await?;
    let body = stream.filter_map(|item| async move {
        match item {
            Ok(ChatChunk::Text(text)) => Some(Ok::<_, Box<dyn Error + Send + Sync>>(text)),
            Ok(ChatChunk::Usage(_)) => None,
            Err(e) => Some(Err(e)),
        }
    });

    Ok(
        (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            Body::from_stream(body),
        ).into_response()
    )
}

async fn title_handler(
    State(state): State<AppState>,
    Json(req): Json<TitleRequest>
) -> Result<Json<TitleResponse>, AgentError> {
    let title = state.agent.generate_title(&req.messages).await?;
    Ok(Json(TitleResponse { title }))
}

async fn usage_handler(
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>
) -> Result<Response, AgentError> {
    let limit = query.limit.unwrap_or(DEFAULT_USAGE_LIMIT);
    let report = state.agent.usage_report(limit).await?;
    Ok(Json(report).into_response())
}

async fn reload_prompts_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (code, response) = match state.agent.reload_prompts_if_changed().await {
        Ok(changed) => {
            let detail = if changed { "Local reloaded" } else { "Local unchanged" };
            info!("Prompt reload requested: {}", detail);
            (StatusCode::OK, ReloadResponse {
                success: true,
                message: "Reload complete".into(),
                details: Some(vec![detail.into()]),
            })
        }
        Err(e) => {
            error!("Prompt reload failed: {}", e);
            (StatusCode::BAD_REQUEST, ReloadResponse {
                success: false,
                message: "Reload errors".into(),
                details: Some(vec![format!("Local error: {}", e)]),
            })
        }
    };
    (code, Json(response)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tests::{ agent_with, catalog, ScriptedClient, PROMPTS };
    use crate::config::prompt::load_prompts_from_str;
    use crate::usage::{ MemoryUsageStore, UsageRecord, UsageStore };
    use crate::llm::chat::TokenUsage;
    use axum::http::Request;
    use chrono::Utc;
    use serde_json::Value as JsonValue;
    use tower::ServiceExt;

    const REPLY: &str = "상품 카드 [[guide:cards]]";

    fn app_with(store: Arc<MemoryUsageStore>, api_key: Option<&str>, per_second: u32) -> Router {
        let agent = agent_with(ScriptedClient::new(REPLY), store);
        build_router(AppState::new(Arc::new(agent), api_key.map(str::to_string), per_second))
    }

    fn app() -> Router {
        app_with(Arc::new(MemoryUsageStore::new(10)), None, 100)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(resp: Response) -> JsonValue {
        serde_json::from_str(&body_text(resp).await).unwrap()
    }

    const CHAT_BODY: &str = r#"{"messages":[{"role":"user","content":"쇼핑몰 만들래요"}],"model":"gpt-4o"}"#;

    #[tokio::test]
    async fn chat_streams_plain_text() {
        let resp = app().oneshot(post_json("/api/chat", CHAT_BODY)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE].to_str().unwrap(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_text(resp).await, REPLY);
    }

    #[tokio::test]
    async fn chat_without_messages_is_bad_request() {
        let resp = app().oneshot(post_json("/api/chat", r#"{"messages":[]}"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "Conversation has no messages");
    }

    #[tokio::test]
    async fn title_returns_json() {
        let body = r#"{"messages":[{"role":"user","parts":[{"type":"text","text":"빈집"}]}]}"#;
        let resp = app().oneshot(post_json("/api/chat/title", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        // titles are capped at 20 chars
        assert_eq!(body_json(resp).await["title"], "상품 카드 [[guide:cards]");
    }

    #[tokio::test]
    async fn usage_reports_records_and_totals() {
        let store = Arc::new(MemoryUsageStore::new(10));
        for n in [1, 2, 3] {
            store
                .record(
                    UsageRecord::new(
                        "gpt-4o",
                        TokenUsage { prompt_tokens: n, completion_tokens: n },
                        1,
                        "lee",
                        vec![]
                    )
                ).await
                .unwrap();
        }
        let app = app_with(store, None, 100);
        let req = Request::builder().uri("/api/usage?limit=2").body(Body::empty()).unwrap();
        let json = body_json(app.oneshot(req).await.unwrap()).await;
        assert_eq!(json["records"].as_array().unwrap().len(), 2);
        assert_eq!(json["totals"]["requests"], 2);
        assert_eq!(json["totals"]["total_tokens"], 10);
    }

    #[tokio::test]
    async fn signed_requests_required_when_key_set() {
        let app = app_with(Arc::new(MemoryUsageStore::new(10)), Some("key"), 100);
        let resp = app.clone().oneshot(post_json("/api/chat", CHAT_BODY)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["error"], "missing ts/sig");

        let ts = Utc::now().timestamp().to_string();
        let mut req = post_json("/api/chat", CHAT_BODY);
        req.headers_mut().insert(auth::TS_HEADER, ts.parse().unwrap());
        req.headers_mut().insert(auth::SIGN_HEADER, auth::sign("key", &ts).unwrap().parse().unwrap());
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn chat_is_rate_limited() {
        let app = app_with(Arc::new(MemoryUsageStore::new(10)), None, 1);
        let first = app.clone().oneshot(post_json("/api/chat", CHAT_BODY)).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = app.clone().oneshot(post_json("/api/chat", CHAT_BODY)).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

        // usage is not behind the limiter
        let req = Request::builder().uri("/api/usage").body(Body::empty()).unwrap();
        assert_eq!(app.oneshot(req).await.unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn reload_reports_missing_prompt_file() {
        let dir = tempfile::tempdir().unwrap();
        let agent = MentorAgent::with_parts(
            ScriptedClient::new(""),
            load_prompts_from_str(PROMPTS).unwrap(),
            catalog(),
            Arc::new(MemoryUsageStore::new(1)),
            dir.path().join("missing.json")
        );
        let app = build_router(AppState::new(Arc::new(agent), None, 100));
        let req = Request::builder().uri("/api/reload-prompts").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["success"], false);
        assert!(json["details"][0].as_str().unwrap().starts_with("Local error:"));
    }
}
