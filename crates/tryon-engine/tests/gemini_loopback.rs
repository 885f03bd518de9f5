use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine as _;
use serde_json::{json, Value};
use tryon_contracts::{
    Credential, ImageSource, MemoryEventLog, RequestLifecycleState, TryOnError,
};
use tryon_engine::{
    GeminiClient, GenerationService, HttpImageFetcher, InferenceRequest, Normalizer,
    OrchestratorOptions, RequestPart, ResultStore, ServiceError, TryOnOrchestrator,
};

const ONE_PIXEL_PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8/5+hHgAHgwKk6ZQJ4wAAAABJRU5ErkJggg==";
const VALID_KEY: &str = "loopback-key";

#[derive(Debug, Clone)]
struct RecordedCall {
    call: String,
    api_key: Option<String>,
    query: Option<String>,
    body: Value,
}

#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl Recorder {
    fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

fn png_bytes() -> Vec<u8> {
    base64::engine::general_purpose::STANDARD
        .decode(ONE_PIXEL_PNG)
        .unwrap_or_default()
}

async fn generate(
    State(recorder): State<Recorder>,
    Path(call): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let api_key = headers
        .get("x-goog-api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    if let Ok(mut calls) = recorder.calls.lock() {
        calls.push(RecordedCall {
            call: call.clone(),
            api_key: api_key.clone(),
            query,
            body,
        });
    }
    if api_key.as_deref() != Some(VALID_KEY) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": {"code": 403, "message": "API key not valid"}})),
        );
    }
    let response = if call.contains("image-generation") {
        json!({"candidates": [{"content": {"parts": [
            {"text": "Here you go"},
            {"inlineData": {"mimeType": "image/png", "data": ONE_PIXEL_PNG}}
        ]}}]})
    } else {
        json!({"candidates": [{"content": {"parts": [{"text": "  Red wool coat \n"}]}}]})
    };
    (StatusCode::OK, Json(response))
}

async fn garment_png() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/png")], png_bytes())
}

async fn html_page() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], "<html></html>")
}

async fn spawn_server(recorder: Recorder) -> anyhow::Result<String> {
    let app = Router::new()
        .route("/v1beta/models/{call}", post(generate))
        .route("/images/garment.png", get(garment_png))
        .route("/page.html", get(html_page))
        .with_state(recorder);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

fn orchestrator(base: &str) -> anyhow::Result<(TryOnOrchestrator, Arc<MemoryEventLog>)> {
    let timeout = Duration::from_secs(10);
    let events = Arc::new(MemoryEventLog::new("loopback"));
    let orchestrator = TryOnOrchestrator::new(
        Arc::new(GeminiClient::new(format!("{base}/v1beta"), timeout)),
        Normalizer::new(Arc::new(HttpImageFetcher::new(timeout)?)),
        ResultStore::new(),
        OrchestratorOptions::default(),
    )
    .with_events(events.clone());
    Ok((orchestrator, events))
}

#[tokio::test]
async fn remote_garment_and_data_url_target_produce_an_object_url() -> anyhow::Result<()> {
    let recorder = Recorder::default();
    let base = spawn_server(recorder.clone()).await?;
    let (orchestrator, events) = orchestrator(&base)?;

    let garment = ImageSource::RemoteUrl(format!("{base}/images/garment.png"));
    let target = ImageSource::DataUrl(format!("data:image/png;base64,{ONE_PIXEL_PNG}"));
    let result = orchestrator
        .run_try_on(&garment, &target, &Credential::new(VALID_KEY))
        .await?;

    assert!(result.display_url.starts_with("blob:tryon/"));
    assert_eq!(result.mime_type, "image/png");
    assert_eq!(result.source_text.as_deref(), Some("Here you go"));
    let blob = orchestrator
        .results()
        .resolve(&result.display_url)
        .ok_or_else(|| anyhow::anyhow!("result was not registered"))?;
    assert_eq!(blob.bytes, png_bytes());
    assert_eq!(orchestrator.state(), RequestLifecycleState::Succeeded);

    let calls = recorder.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].call, "gemini-2.5-flash:generateContent");
    assert_eq!(
        calls[1].call,
        "gemini-2.0-flash-preview-image-generation:generateContent"
    );
    for call in &calls {
        assert_eq!(call.api_key.as_deref(), Some(VALID_KEY));
        assert!(call.query.is_none());
    }

    let edit_parts = calls[1].body["contents"][0]["parts"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    assert_eq!(edit_parts.len(), 5);
    assert_eq!(edit_parts[1]["inlineData"]["mimeType"], "image/png");
    assert_eq!(edit_parts[1]["inlineData"]["data"], ONE_PIXEL_PNG);
    let prompt = edit_parts[4]["text"].as_str().unwrap_or_default();
    assert!(prompt.contains("Red wool coat"));
    assert_eq!(
        calls[1].body["generationConfig"]["responseModalities"],
        json!(["TEXT", "IMAGE"])
    );
    assert!(calls[0].body.get("generationConfig").is_none());

    assert_eq!(
        events.event_types(),
        vec![
            "state_changed",
            "description_ready",
            "try_on_succeeded",
            "state_changed"
        ]
    );
    Ok(())
}

#[tokio::test]
async fn rejected_key_surfaces_the_api_message() -> anyhow::Result<()> {
    let base = spawn_server(Recorder::default()).await?;
    let client = GeminiClient::new(format!("{base}/v1beta/"), Duration::from_secs(10));
    let request = InferenceRequest::new("gemini-2.5-flash", vec![RequestPart::text("hello")]);

    let err = client
        .generate_content(&request, &Credential::new("wrong"))
        .await
        .err();
    match err {
        Some(ServiceError::Api { status, message }) => {
            assert_eq!(status, 403);
            assert_eq!(message, "API key not valid");
        }
        other => anyhow::bail!("expected an API error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn description_failure_is_reported_as_a_description_error() -> anyhow::Result<()> {
    let recorder = Recorder::default();
    let base = spawn_server(recorder.clone()).await?;
    let (orchestrator, events) = orchestrator(&base)?;
    let png = ImageSource::DataUrl(format!("data:image/png;base64,{ONE_PIXEL_PNG}"));

    let err = orchestrator
        .run_try_on(&png, &png, &Credential::new("wrong"))
        .await
        .err();

    assert!(matches!(err, Some(TryOnError::DescriptionService(_))));
    assert_eq!(recorder.calls().len(), 1);
    assert_eq!(orchestrator.state(), RequestLifecycleState::Failed);
    assert!(events.event_types().contains(&"try_on_failed".to_string()));
    Ok(())
}

#[tokio::test]
async fn non_image_and_missing_urls_fail_to_normalize() -> anyhow::Result<()> {
    let base = spawn_server(Recorder::default()).await?;
    let normalizer = Normalizer::new(Arc::new(HttpImageFetcher::new(Duration::from_secs(10))?));

    let html = normalizer.normalize_str(&format!("{base}/page.html")).await;
    assert!(matches!(html, Err(TryOnError::Fetch(_))));

    let missing = normalizer.normalize_str(&format!("{base}/nope.png")).await;
    assert!(matches!(missing, Err(TryOnError::Fetch(_))));

    let fetched = normalizer
        .normalize_str(&format!("{base}/images/garment.png"))
        .await?;
    assert_eq!(fetched.mime_type, "image/png");
    assert_eq!(fetched.bytes, png_bytes());
    Ok(())
}
