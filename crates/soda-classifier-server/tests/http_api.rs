//! HTTP contract tests, driving the router with a stub runtime.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{ImageFormat, Rgb, RgbImage};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tower::ServiceExt;

use soda_classifier_core::{
    ClassLabels, ClassifierError, ClassifierResult, ClassifierService, ForwardPass,
    NormalizedTensor, RawLogits, RuntimeLoader,
};
use soda_classifier_server::{create_router, AppState, ServerConfig};

/// Returns fixed logits, or panics when the red channel is saturated.
struct StubRuntime {
    logits: [f32; 2],
}

impl ForwardPass for StubRuntime {
    fn forward(&self, input: &NormalizedTensor) -> ClassifierResult<RawLogits> {
        if input.channel(0)[0] > 2.0 {
            panic!("stub runtime asked to panic");
        }
        Ok(RawLogits(self.logits))
    }

    fn device_label(&self) -> &str {
        "cpu"
    }
}

/// Fails with a scripted error until cleared.
struct StubLoader {
    failure: Arc<Mutex<Option<ClassifierError>>>,
    loads: Arc<AtomicUsize>,
    logits: [f32; 2],
}

impl RuntimeLoader for StubLoader {
    fn load(&self) -> ClassifierResult<Arc<dyn ForwardPass>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failure.lock().clone() {
            return Err(err);
        }
        Ok(Arc::new(StubRuntime {
            logits: self.logits,
        }))
    }

    fn describe(&self) -> String {
        "stub".into()
    }
}

struct Harness {
    router: Router,
    failure: Arc<Mutex<Option<ClassifierError>>>,
    loads: Arc<AtomicUsize>,
}

fn harness_with(logits: [f32; 2], config: ServerConfig) -> Harness {
    let failure = Arc::new(Mutex::new(None));
    let loads = Arc::new(AtomicUsize::new(0));
    let loader = StubLoader {
        failure: Arc::clone(&failure),
        loads: Arc::clone(&loads),
        logits,
    };
    let service = ClassifierService::with_loader(loader, ClassLabels::default());
    Harness {
        router: create_router(AppState::new(service), &config),
        failure,
        loads,
    }
}

fn harness() -> Harness {
    harness_with([0.2, 1.4], ServerConfig::default())
}

fn png_base64(color: [u8; 3]) -> String {
    let img = RgbImage::from_pixel(40, 60, Rgb(color));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    STANDARD.encode(buf.into_inner())
}

fn predict_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

fn predict_json(value: &Value) -> Request<Body> {
    predict_request(serde_json::to_vec(value).unwrap())
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_does_not_load_model() {
    let h = harness();
    let (status, body) = send(&h.router, get("/")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"status": "Soda Bottle Classifier API ready", "model": "ResNet18"})
    );
    assert_eq!(h.loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_ready_reflects_lifecycle() {
    let h = harness();
    let (status, body) = send(&h.router, get("/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["state"], "uninitialized");

    let (status, _) = send(&h.router, predict_json(&json!({"image": png_base64([1, 2, 3])}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&h.router, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "ready");
    assert_eq!(body["generation"], 1);
    assert_eq!(body["device"], "cpu");
}

#[tokio::test]
async fn test_predict_success_shape() {
    let h = harness();
    let (status, body) =
        send(&h.router, predict_json(&json!({"image": png_base64([10, 200, 30])}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_object().unwrap().len(), 4);
    assert_eq!(body["prediction"], 1);
    assert_eq!(body["classes"], json!(["empty", "full"]));

    let probs: Vec<f64> = body["probabilities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_f64().unwrap())
        .collect();
    assert_eq!(probs.len(), 2);
    assert!((probs[0] + probs[1] - 1.0).abs() < 1e-5);
    assert_eq!(body["confidence"].as_f64().unwrap(), probs[1]);
}

#[tokio::test]
async fn test_predict_accepts_data_url() {
    let h = harness();
    let image = format!("data:image/png;base64,{}", png_base64([0, 0, 0]));
    let (status, _) = send(&h.router, predict_json(&json!({ "image": image }))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_tied_logits_pick_first_class() {
    let h = harness_with([0.7, 0.7], ServerConfig::default());
    let (status, body) =
        send(&h.router, predict_json(&json!({"image": png_base64([9, 9, 9])}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prediction"], 0);
    assert_eq!(body["confidence"].as_f64().unwrap(), 0.5);
}

#[tokio::test]
async fn test_malformed_requests_are_400() {
    let h = harness();

    let (status, body) = send(&h.router, predict_request("{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "InvalidRequest");

    let (status, body) = send(&h.router, predict_json(&json!({"picture": "abc"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "InvalidRequest");

    let (status, body) = send(&h.router, predict_json(&json!({"image": "%%%"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "InvalidRequest");
    assert!(body["error"].as_str().unwrap().contains("base64"));
}

#[tokio::test]
async fn test_undecodable_image_is_400_and_service_stays_healthy() {
    let h = harness();

    let (status, body) = send(&h.router, predict_json(&json!({"image": ""}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "DecodeError");

    let garbage = STANDARD.encode(b"definitely not an image");
    let (status, body) = send(&h.router, predict_json(&json!({ "image": garbage }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "DecodeError");

    let (status, _) = send(&h.router, predict_json(&json!({"image": png_base64([5, 5, 5])}))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_weights_is_503_then_recovers() {
    let h = harness();
    *h.failure.lock() = Some(ClassifierError::WeightsNotFound {
        path: PathBuf::from("/models/soda_bottle_classifier_resnet18.pth"),
    });

    let request = || predict_json(&json!({"image": png_base64([1, 1, 1])}));

    let (status, body) = send(&h.router, request()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["type"], "WeightsNotFoundError");
    assert!(body["error"].as_str().unwrap().contains("soda_bottle_classifier_resnet18.pth"));

    let (status, body) = send(&h.router, get("/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["state"], "failed");
    assert_eq!(body["last_error_type"], "WeightsNotFoundError");

    *h.failure.lock() = None;
    let (status, _) = send(&h.router, request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_inference_panic_is_generic_500() {
    let h = harness();

    // Pure red normalizes above 2.0 in the red channel.
    let (status, body) =
        send(&h.router, predict_json(&json!({"image": png_base64([255, 0, 0])}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({"error": "internal server error", "type": "InternalError"})
    );

    let (status, _) = send(&h.router, predict_json(&json!({"image": png_base64([0, 0, 255])}))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let config = ServerConfig {
        max_payload_size: 1024,
        ..ServerConfig::default()
    };
    let h = harness_with([0.0, 1.0], config);
    let big = "A".repeat(4096);

    let (status, body) = send(&h.router, predict_json(&json!({ "image": big }))).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["type"], "PayloadTooLarge");
    assert_eq!(h.loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cors_preflight_allowed() {
    let h = harness();
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/predict")
        .header(header::ORIGIN, "http://example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let response = h.router.clone().oneshot(request).await.unwrap();
    assert!(response.status().is_success());
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}
