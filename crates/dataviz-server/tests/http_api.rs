use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderValue, Request, StatusCode, header};
use dataviz_ai_harness::{
    HarnessError, ModelRef, Part, PartDelta, ProviderAdapter, ProviderError, ProviderEvent,
    ProviderId, ProviderRequest, ProviderResponseMeta, ProviderStreamHandle,
};
use dataviz_pipeline::{
    EngineError, ProviderFactory, QueryEngine, SessionFactory, SessionSettings,
};
use dataviz_server::handlers::{HealthResponse, RootResponse};
use dataviz_server::{AppState, create_router};
use serde_json::Value;
use tower::ServiceExt;

struct ScriptedProvider {
    events: Mutex<Option<Vec<Result<ProviderEvent, ProviderError>>>>,
}

#[async_trait::async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn id(&self) -> ProviderId {
        ProviderId::new("fake")
    }

    async fn start_stream(
        &self,
        _req: ProviderRequest,
    ) -> Result<ProviderStreamHandle, ProviderError> {
        let events = self.events.lock().unwrap().take().unwrap_or_default();
        Ok(ProviderStreamHandle {
            stream: Box::pin(futures::stream::iter(events)),
            metadata: ProviderResponseMeta::default(),
        })
    }
}

struct UnusedEngine;

#[async_trait::async_trait]
impl QueryEngine for UnusedEngine {
    async fn execute(&self, _sql: &str, _timeout: Duration) -> Result<Value, EngineError> {
        Err(EngineError::Unreachable("not used in HTTP tests".into()))
    }
}

fn answer_with_chart() -> Vec<Result<ProviderEvent, ProviderError>> {
    vec![
        Ok(ProviderEvent::PartStarted {
            index: 0,
            part: Part::Text {
                content: String::new(),
            },
        }),
        Ok(ProviderEvent::PartDelta {
            index: 0,
            delta: PartDelta::Text {
                content: "Here it is.\n```tsx\nexport default function C() { return null; }\n```"
                    .into(),
            },
        }),
        Ok(ProviderEvent::Completed {
            output: None,
            finish_reason: None,
        }),
    ]
}

fn state_with(providers: Arc<dyn ProviderFactory>) -> AppState {
    let sessions = SessionFactory::new(
        providers,
        Arc::new(UnusedEngine),
        SessionSettings::new(ModelRef::new("fake", "model-a")),
    );
    AppState::new(sessions, HeaderValue::from_static("http://localhost:3000"))
}

fn scripted_app() -> axum::Router {
    create_router(state_with(Arc::new(
        || -> Result<Arc<dyn ProviderAdapter>, HarnessError> {
            Ok(Arc::new(ScriptedProvider {
                events: Mutex::new(Some(answer_with_chart())),
            }))
        },
    )))
}

fn chat_request(body: &str) -> Request<Body> {
    Request::post("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn frames(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter(|frame| !frame.is_empty())
        .map(|frame| {
            let mut lines = frame.lines();
            let kind = lines.next().unwrap().trim_start_matches("event: ").to_string();
            let data = lines.next().unwrap().trim_start_matches("data: ");
            (kind, serde_json::from_str(data).unwrap())
        })
        .collect()
}

#[tokio::test]
async fn root_reports_running() {
    let response = scripted_app()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: RootResponse = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body.status, "ok");
    assert_eq!(body.message, "Backend API is running");
}

#[tokio::test]
async fn health_reports_healthy() {
    let response = scripted_app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: HealthResponse = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body.status, "healthy");
}

#[tokio::test]
async fn blank_message_is_rejected() {
    let response = scripted_app()
        .oneshot(chat_request(r#"{"message":"   "}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["error"], "bad_request");
    assert!(body["message"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn chat_streams_cumulative_thoughts_then_code() {
    let response = scripted_app()
        .oneshot(chat_request(r#"{"message":"chart sales by month"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");

    let frames = frames(&body_text(response).await);
    let kinds: Vec<&str> = frames.iter().map(|(kind, _)| kind.as_str()).collect();
    assert_eq!(kinds, vec!["thought", "thought", "code"]);
    assert!(frames[1].1["content"].as_str().unwrap().starts_with("Here it is."));
    assert_eq!(frames[2].1["language"], "tsx");
    assert!(
        frames[2].1["content"]
            .as_str()
            .unwrap()
            .contains("export default function C()")
    );
}

#[tokio::test]
async fn session_start_failure_is_an_in_band_error() {
    let app = create_router(state_with(Arc::new(
        || -> Result<Arc<dyn ProviderAdapter>, HarnessError> {
            Err(HarnessError::Config(
                "missing OPENAI_API_KEY for OpenAI provider".into(),
            ))
        },
    )));

    let response = app
        .oneshot(chat_request(r#"{"message":"hello"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let frames = frames(&body_text(response).await);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].0, "error");
    assert_eq!(frames[0].1["stage"], "session_start");
    assert!(
        frames[0].1["message"]
            .as_str()
            .unwrap()
            .contains("OPENAI_API_KEY")
    );
}

#[tokio::test]
async fn cors_preflight_allows_configured_origin() {
    let response = scripted_app()
        .oneshot(
            Request::options("/chat")
                .header(header::ORIGIN, "http://localhost:3000")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:3000"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
}
