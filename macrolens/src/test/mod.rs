use crate::test_utils::{create_test_app, create_test_config};
use axum_test::multipart::{MultipartForm, Part};
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/v1beta/models/gemini-1.5-flash-latest:generateContent";

/// Minimal JPEG-ish payload; the relay never inspects image contents
fn jpeg_bytes() -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
    bytes.extend_from_slice(b"not-a-real-jpeg-but-nobody-checks");
    bytes
}

fn jpeg_upload() -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(jpeg_bytes()).file_name("apple.jpg").mime_type("image/jpeg"),
    )
}

fn candidate_response(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{ "content": { "parts": [{ "text": text }] } }]
    })
}

fn assert_upload_dir_empty(dir: &Path) {
    let leftover: Vec<_> = std::fs::read_dir(dir).unwrap().map(|e| e.unwrap().path()).collect();
    assert!(leftover.is_empty(), "upload dir should be empty after the request, found {leftover:?}");
}

#[test_log::test(tokio::test)]
async fn missing_file_returns_400_without_calling_inference() {
    let mock_server = MockServer::start().await;

    // Verified on drop: the handler must not reach the inference service
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let upload_dir = tempfile::tempdir().unwrap();
    let server = create_test_app(create_test_config(&mock_server.uri(), upload_dir.path())).await;

    let response = server
        .post("/analyze")
        .multipart(MultipartForm::new().add_text("note", "no file here"))
        .await;

    assert_eq!(response.status_code().as_u16(), 400);
    let body: serde_json::Value = response.json();
    assert_eq!(body, json!({ "error": "No file uploaded" }));
    assert_upload_dir_empty(upload_dir.path());
}

#[test_log::test(tokio::test)]
async fn valid_upload_passes_estimate_through_verbatim() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(body_partial_json(json!({
            "contents": [{ "parts": [{ "inlineData": { "mimeType": "image/jpeg" } }] }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(candidate_response(
            r#"{"name":"Apple","calories":95,"protein":0.5,"carbs":25,"fat":0.3,"fiber":4.4,"sodium":2}"#,
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    let upload_dir = tempfile::tempdir().unwrap();
    let server = create_test_app(create_test_config(&mock_server.uri(), upload_dir.path())).await;

    let response = server.post("/analyze").multipart(jpeg_upload()).await;

    assert_eq!(response.status_code().as_u16(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(
        body,
        json!({
            "name": "Apple",
            "calories": 95.0,
            "protein": 0.5,
            "carbs": 25.0,
            "fat": 0.3,
            "fiber": 4.4,
            "sodium": 2.0
        })
    );
    assert_upload_dir_empty(upload_dir.path());
}

#[test_log::test(tokio::test)]
async fn structured_output_requests_the_declared_schema() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(body_partial_json(json!({
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": { "type": "OBJECT" }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(candidate_response(
            r#"{"name":"Toast","calories":80,"protein":3,"carbs":14,"fat":1,"fiber":1.2,"sodium":140}"#,
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    let upload_dir = tempfile::tempdir().unwrap();
    let server = create_test_app(create_test_config(&mock_server.uri(), upload_dir.path())).await;

    let response = server.post("/analyze").multipart(jpeg_upload()).await;
    assert_eq!(response.status_code().as_u16(), 200);
}

#[test_log::test(tokio::test)]
async fn prose_candidate_text_is_a_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(candidate_response("This looks like an apple.")))
        .mount(&mock_server)
        .await;

    let upload_dir = tempfile::tempdir().unwrap();
    let server = create_test_app(create_test_config(&mock_server.uri(), upload_dir.path())).await;

    let response = server.post("/analyze").multipart(jpeg_upload()).await;

    assert_eq!(response.status_code().as_u16(), 500);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "Error processing image");
    assert!(body["details"].as_str().unwrap().contains("not a valid nutrition estimate"));
    assert_upload_dir_empty(upload_dir.path());
}

#[test_log::test(tokio::test)]
async fn schema_violating_candidate_is_a_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(candidate_response(r#"{"name":"Apple"}"#)))
        .mount(&mock_server)
        .await;

    let upload_dir = tempfile::tempdir().unwrap();
    let server = create_test_app(create_test_config(&mock_server.uri(), upload_dir.path())).await;

    let response = server.post("/analyze").multipart(jpeg_upload()).await;

    assert_eq!(response.status_code().as_u16(), 500);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "Error processing image");
    assert!(body["details"].is_string());
    assert_upload_dir_empty(upload_dir.path());
}

#[test_log::test(tokio::test)]
async fn upstream_failure_still_cleans_up_the_temp_file() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&mock_server)
        .await;

    let upload_dir = tempfile::tempdir().unwrap();
    let server = create_test_app(create_test_config(&mock_server.uri(), upload_dir.path())).await;

    let response = server.post("/analyze").multipart(jpeg_upload()).await;

    assert_eq!(response.status_code().as_u16(), 500);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "Error processing image");
    assert!(body["details"].as_str().unwrap().contains("500"));
    assert_upload_dir_empty(upload_dir.path());
}

#[test_log::test(tokio::test)]
async fn hung_upstream_is_bounded_by_the_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(candidate_response("{}"))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&mock_server)
        .await;

    let upload_dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&mock_server.uri(), upload_dir.path());
    config.inference.timeout = Duration::from_millis(250);
    let server = create_test_app(config).await;

    let response = server.post("/analyze").multipart(jpeg_upload()).await;

    assert_eq!(response.status_code().as_u16(), 500);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "Error processing image");
    assert_upload_dir_empty(upload_dir.path());
}

#[test_log::test(tokio::test)]
async fn oversized_upload_is_rejected_and_cleaned_up() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let upload_dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&mock_server.uri(), upload_dir.path());
    config.uploads.max_file_size = 16;
    let server = create_test_app(config).await;

    let response = server.post("/analyze").multipart(jpeg_upload()).await;

    assert_eq!(response.status_code().as_u16(), 413);
    assert_upload_dir_empty(upload_dir.path());
}

#[test_log::test(tokio::test)]
async fn extra_fields_before_the_file_are_ignored() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(candidate_response(
            r#"{"name":"Pear","calories":101,"protein":0.6,"carbs":27,"fat":0.2,"fiber":5.5,"sodium":2}"#,
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    let upload_dir = tempfile::tempdir().unwrap();
    let server = create_test_app(create_test_config(&mock_server.uri(), upload_dir.path())).await;

    let form = MultipartForm::new().add_text("note", "lunch").add_part(
        "file",
        Part::bytes(jpeg_bytes()).file_name("pear.jpg").mime_type("image/jpeg"),
    );
    let response = server.post("/analyze").multipart(form).await;
    assert_eq!(response.status_code().as_u16(), 200);
    assert_upload_dir_empty(upload_dir.path());
}

#[tokio::test]
async fn healthz_reports_ok() {
    let mock_server = MockServer::start().await;
    let upload_dir = tempfile::tempdir().unwrap();
    let server = create_test_app(create_test_config(&mock_server.uri(), upload_dir.path())).await;

    let response = server.get("/healthz").await;
    assert_eq!(response.status_code().as_u16(), 200);
    assert_eq!(response.text(), "OK");
}

#[tokio::test]
async fn openapi_spec_documents_the_analyze_route() {
    let mock_server = MockServer::start().await;
    let upload_dir = tempfile::tempdir().unwrap();
    let server = create_test_app(create_test_config(&mock_server.uri(), upload_dir.path())).await;

    let response = server.get("/openapi.json").await;
    assert_eq!(response.status_code().as_u16(), 200);
    let content = response.text();
    assert!(content.contains("\"openapi\""));
    assert!(content.contains("/analyze"));
    assert!(content.contains("NutritionEstimate"));
}

#[tokio::test]
async fn startup_fails_without_a_credential() {
    let upload_dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config("http://localhost:9", upload_dir.path());
    config.inference.api_key = None;

    let err = crate::Application::new(config)
        .await
        .expect_err("startup should fail without credential");
    assert!(err.to_string().contains("GEMINI_API_KEY"));
}
