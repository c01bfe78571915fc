use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use url::Url;

use cvlab_backend_core::pipeline::catalog::{FilterCatalogSource, HttpFilterCatalog};
use cvlab_backend_core::pipeline::image_data::{EncodedImage, OriginalImage};
use cvlab_backend_core::pipeline::parameters::{update, ParameterValues};
use cvlab_backend_core::pipeline::processing::{
    HttpImageProcessing, ImageProcessingOps, ImageSource, ProcessImageRequest, ProcessingError,
};

#[derive(Debug, Clone)]
struct RecordedRequest {
    path: String,
    accept: Option<String>,
    body: String,
}

type Recorder = Arc<Mutex<Vec<RecordedRequest>>>;

async fn record_and_respond(
    State(recorder): State<Recorder>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let path = uri.path().to_string();
    recorder
        .lock()
        .expect("recorder mutex poisoned")
        .push(RecordedRequest {
            path: path.clone(),
            accept: headers
                .get("accept")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body: String::from_utf8_lossy(body.as_ref()).into_owned(),
        });
    Json(json!({
        "image": BASE64_STANDARD.encode(format!("processed by {path}")),
        "code": "image = cv2.GaussianBlur(image, (5, 5), 0)",
    }))
}

async fn catalog_handler() -> Json<Value> {
    Json(json!({"categories": [
        {"name": "Edge Detection", "filters": [
            {"name": "canny", "display_name": "Canny", "parameters": [
                {"name": "threshold1", "type": "int", "default": 100, "min": 0, "max": 500, "step": 1},
                {"name": "threshold2", "type": "int", "default": 200, "min": 0, "max": 500, "step": 1}
            ]}
        ]}
    ]}))
}

async fn failing_handler() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

async fn spawn_fake_backend(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("fake backend should bind");
    let addr = listener.local_addr().expect("fake backend should have an address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

fn base_url(addr: SocketAddr, prefix: &str) -> Url {
    Url::parse(&format!("http://{addr}{prefix}")).expect("base URL should parse")
}

fn original() -> OriginalImage {
    OriginalImage::new(
        vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x01],
        "cat.png",
    )
    .expect("image should build")
}

#[tokio::test(flavor = "multi_thread")]
async fn first_step_posts_file_part_and_chained_step_posts_data_url() {
    let recorder = Recorder::default();
    let router = Router::new()
        .route("/v1/process-image", post(record_and_respond))
        .route("/v1/process-workflow-image", post(record_and_respond))
        .with_state(recorder.clone());
    let addr = spawn_fake_backend(router).await;
    let client = HttpImageProcessing::new(base_url(addr, "/v1"), Duration::from_secs(5));

    let prior = EncodedImage::from_base64(BASE64_STANDARD.encode("previous").as_str())
        .expect("prior image should be valid");
    let first = ProcessImageRequest {
        source: ImageSource::Original(original()),
        filter_name: String::from("gaussian_blur"),
        params: update(ParameterValues::new(), "kernel_size", 5),
    };
    let chained = ProcessImageRequest {
        source: ImageSource::PriorResult(prior.clone()),
        filter_name: String::from("canny"),
        params: ParameterValues::new(),
    };

    let (first_result, chained_result) = tokio::task::spawn_blocking(move || {
        (client.process(&first), client.process(&chained))
    })
    .await
    .expect("blocking task should finish");
    let first_result = first_result.expect("first call should succeed");
    let chained_result = chained_result.expect("chained call should succeed");

    assert_eq!(
        first_result.image.decode_bytes().expect("result should decode"),
        b"processed by /v1/process-image".to_vec()
    );
    assert_eq!(
        first_result.code,
        "image = cv2.GaussianBlur(image, (5, 5), 0)"
    );
    assert_eq!(
        chained_result.image.decode_bytes().expect("result should decode"),
        b"processed by /v1/process-workflow-image".to_vec()
    );

    let recorded = recorder.lock().expect("recorder mutex poisoned").clone();
    assert_eq!(recorded.len(), 2);

    let upload = &recorded[0];
    assert_eq!(upload.path, "/v1/process-image");
    assert_eq!(upload.accept.as_deref(), Some("application/json"));
    assert!(upload.body.contains("name=\"filter_name\""));
    assert!(upload.body.contains("gaussian_blur"));
    assert!(upload.body.contains("name=\"params\""));
    assert!(upload.body.contains(r#"{"kernel_size":5}"#));
    assert!(upload.body.contains("name=\"file\"; filename=\"cat.png\""));
    assert!(upload.body.to_ascii_lowercase().contains("content-type: image/png"));
    assert!(!upload.body.contains("previous_image"));

    let workflow = &recorded[1];
    assert_eq!(workflow.path, "/v1/process-workflow-image");
    assert!(workflow.body.contains("name=\"previous_image\""));
    assert!(workflow.body.contains(prior.to_data_url().as_str()));
    assert!(workflow.body.contains(r#"{}"#));
    assert!(!workflow.body.contains("name=\"file\""));
}

#[tokio::test(flavor = "multi_thread")]
async fn non_success_status_surfaces_code_and_body() {
    let router = Router::new().route("/process-image", post(failing_handler));
    let addr = spawn_fake_backend(router).await;
    let client = HttpImageProcessing::new(base_url(addr, ""), Duration::from_secs(5));
    let request = ProcessImageRequest {
        source: ImageSource::Original(original()),
        filter_name: String::from("grayscale"),
        params: ParameterValues::new(),
    };

    let err = tokio::task::spawn_blocking(move || client.process(&request))
        .await
        .expect("blocking task should finish")
        .expect_err("500 should fail");
    assert_eq!(
        err,
        ProcessingError::Status {
            status: 500,
            body: String::from("boom"),
        }
    );
    assert_eq!(err.to_string(), "HTTP 500: boom");
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_service_is_a_request_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("port should bind");
    let addr = listener.local_addr().expect("port should have an address");
    drop(listener);

    let client = HttpImageProcessing::new(base_url(addr, ""), Duration::from_secs(2));
    let request = ProcessImageRequest {
        source: ImageSource::Original(original()),
        filter_name: String::from("grayscale"),
        params: ParameterValues::new(),
    };
    let err = tokio::task::spawn_blocking(move || client.process(&request))
        .await
        .expect("blocking task should finish")
        .expect_err("closed port should fail");
    assert!(matches!(err, ProcessingError::Request(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn catalog_client_fetches_and_stamps_categories() {
    let router = Router::new().route("/api/filters", get(catalog_handler));
    let addr = spawn_fake_backend(router).await;
    let source = HttpFilterCatalog::new(base_url(addr, "/api"), Duration::from_secs(5));

    let catalog = tokio::task::spawn_blocking(move || source.fetch_catalog())
        .await
        .expect("blocking task should finish")
        .expect("catalog should load");
    let canny = catalog.find("canny").expect("canny should be listed");
    assert_eq!(canny.category, "Edge Detection");
    assert_eq!(canny.parameters.len(), 2);
    assert_eq!(
        catalog.filter_counts(),
        vec![(String::from("Edge Detection"), 1)]
    );
}
