//! Web服务器

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::audio::{get_recording, speech_to_text};
use crate::handlers::{
    analyze_data, analyze_patient, api_root, create_patient, get_patient, get_report, health,
    list_files, list_patients, metrics, not_found, submit_feedback,
};
use crate::state::AppState;
use crate::uploads::{upload_medical_report, upload_xray};

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState, body_limit: usize) -> Self {
        let app = create_app(state, body_limit);
        Self { addr, app }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start web server: {}", e))?;

        Ok(())
    }
}

/// 构建完整路由
pub fn create_app(state: AppState, body_limit: usize) -> Router {
    Router::new()
        // 根路径
        .route("/", get(api_root))

        // 健康检查与指标
        .route("/health", get(health))
        .route("/metrics", get(metrics))

        // API路由
        .nest("/api", api_routes())

        // 录音回放
        .route("/recordings/:file", get(get_recording))
        .fallback(not_found)

        .layer(middleware::from_fn_with_state(state.clone(), track_rejections))
        .layer(DefaultBodyLimit::max(body_limit))

        // 全局中间件
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

/// API 路由
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/uploads/medical-report", post(upload_medical_report))
        .route("/uploads/xray", post(upload_xray))
        .route("/patients", get(list_patients).post(create_patient))
        .route("/patients/:id", get(get_patient))
        .route("/patients/:id/report", get(get_report))
        .route("/patients/:id/analyze", post(analyze_patient))
        .route("/patients/:id/files", get(list_files))
        .route("/speech-to-text", post(speech_to_text))
        .route("/analyze-data", post(analyze_data))
        .route("/feedback", post(submit_feedback))
}

/// 统计4xx/5xx响应
async fn track_rejections(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        state.monitor.record_rejection(status.as_u16());
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Services;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Method, StatusCode};
    use base64::Engine as _;
    use dental_admin::PipelineMonitor;
    use dental_core::{
        AnalysisResult, DentalError, FeedbackRecord, Result, UploadedFile,
    };
    use dental_integration::{AnalysisGateway, FeedbackClient, MemoryPatientStore, TranscriptionBackend};
    use dental_storage::{BlobStore, MemoryBlobStore};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;

    struct FakeGateway {
        symptom_calls: AtomicUsize,
    }

    #[async_trait]
    impl AnalysisGateway for FakeGateway {
        async fn analyze_document(&self, _file: &UploadedFile) -> Result<String> {
            Ok("Line1\nLine2\n".to_string())
        }

        async fn analyze_image(&self, file: &UploadedFile) -> Result<Vec<String>> {
            if file.file_name.contains("broken") {
                return Err(DentalError::Analysis("X-ray analysis failed: Bad Gateway".to_string()));
            }
            Ok(vec!["caries".to_string(), "gingivitis".to_string()])
        }

        async fn detect_symptoms(&self, report: &Value) -> Result<AnalysisResult> {
            self.symptom_calls.fetch_add(1, Ordering::SeqCst);
            Ok(AnalysisResult(json!({
                "detected_symptoms": ["toothache"],
                "treatment_suggestions": "Schedule a filling",
                "echo": report
            })))
        }
    }

    struct FakeTranscriber;

    #[async_trait]
    impl TranscriptionBackend for FakeTranscriber {
        fn name(&self) -> &str {
            "fake"
        }

        async fn transcribe(&self, _audio: &[u8]) -> Result<Option<String>> {
            Ok(Some("pain in lower molar".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingFeedback {
        sent: Mutex<Vec<FeedbackRecord>>,
    }

    #[async_trait]
    impl FeedbackClient for RecordingFeedback {
        async fn send(&self, record: &FeedbackRecord) -> Result<()> {
            self.sent.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    struct Harness {
        app: Router,
        uploads: Arc<MemoryBlobStore>,
        gateway: Arc<FakeGateway>,
        feedback: Arc<RecordingFeedback>,
    }

    fn harness() -> Harness {
        let uploads = Arc::new(MemoryBlobStore::new());
        let gateway = Arc::new(FakeGateway {
            symptom_calls: AtomicUsize::new(0),
        });
        let feedback = Arc::new(RecordingFeedback::default());

        let state = AppState::assemble(
            Services {
                uploads: uploads.clone(),
                recordings: Arc::new(MemoryBlobStore::new()),
                gateway: gateway.clone(),
                transcriber: Arc::new(FakeTranscriber),
                feedback: feedback.clone(),
                patients: Arc::new(MemoryPatientStore::new()),
                public_base_url: "http://localhost:5000".to_string(),
            },
            Arc::new(PipelineMonitor::new().unwrap()),
        );

        Harness {
            app: create_app(state, 50 * 1024 * 1024),
            uploads,
            gateway,
            feedback,
        }
    }

    async fn send(app: &Router, request: axum::http::Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, body)
    }

    async fn send_json(app: &Router, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, bytes) = send(app, request).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let request = axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, bytes) = send(app, request).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn multipart_request(uri: &str, patient_id: Option<&str>, file: Option<(&str, &[u8])>) -> axum::http::Request<Body> {
        let boundary = "dental-test-boundary";
        let mut body = Vec::new();
        if let Some(id) = patient_id {
            body.extend_from_slice(
                format!("--{boundary}\r\nContent-Disposition: form-data; name=\"patientId\"\r\n\r\n{id}\r\n").as_bytes(),
            );
        }
        if let Some((name, data)) = file {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        axum::http::Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let h = harness();
        let (status, body) = get_json(&h.app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "running");

        let (status, body) = get_json(&h.app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_xray_upload_builds_report() {
        let h = harness();
        let request = multipart_request("/api/uploads/xray", Some("p1"), Some(("scan.png", b"png-bytes")));
        let (status, bytes) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);

        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["analysisText"], "caries, gingivitis");
        assert!(body["filePath"].as_str().unwrap().starts_with("p1/xrays/"));

        let (status, report) = get_json(&h.app, "/api/patients/p1/report").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["medical_reports"], json!([]));
        assert_eq!(report["xray_analyses"][0]["detected_diseases"], json!(["caries", "gingivitis"]));
        assert!(h.uploads.exists("p1/report.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_medical_upload_splits_lines() {
        let h = harness();
        let request = multipart_request("/api/uploads/medical-report", Some("p2"), Some(("notes.pdf", b"%PDF")));
        let (status, _) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);

        let (_, report) = get_json(&h.app, "/api/patients/p2/report").await;
        assert_eq!(report["medical_reports"][0]["summary"], json!(["Line1", "Line2"]));

        let (status, listing) = get_json(&h.app, "/api/patients/p2/files?category=medical-report").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listing["files"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_missing_fields() {
        let h = harness();

        let request = multipart_request("/api/uploads/xray", Some("p1"), None);
        let (status, bytes) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], true);
        assert_eq!(body["status"], 400);

        let request = multipart_request("/api/uploads/xray", None, Some(("scan.png", b"png")));
        let (status, _) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = multipart_request("/api/uploads/xray", Some("../etc"), Some(("scan.png", b"png")));
        let (status, _) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upstream_failure_maps_to_bad_gateway() {
        let h = harness();
        let request = multipart_request("/api/uploads/xray", Some("p3"), Some(("broken.png", b"png")));
        let (status, bytes) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["message"], "X-ray analysis failed: Bad Gateway");
    }

    #[tokio::test]
    async fn test_report_and_analysis_not_found() {
        let h = harness();
        let (status, _) = get_json(&h.app, "/api/patients/nobody/report").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send_json(&h.app, Method::POST, "/api/patients/nobody/analyze", json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(h.gateway.symptom_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_analyze_data_forwards_verbatim() {
        let h = harness();
        let report = json!({"medical_reports": [], "xray_analyses": []});
        let (status, body) = send_json(&h.app, Method::POST, "/api/analyze-data", report.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["detected_symptoms"], json!(["toothache"]));
        assert_eq!(body["echo"], report);
    }

    #[tokio::test]
    async fn test_feedback_validation() {
        let h = harness();
        let (status, _) = send_json(
            &h.app,
            Method::POST,
            "/api/feedback",
            json!({"original_text": "pain", "correct_symptom": "caries"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(h.feedback.sent.lock().unwrap().is_empty());

        let (status, body) = send_json(
            &h.app,
            Method::POST,
            "/api/feedback",
            json!({"original_text": "pain", "correct_symptom": "caries", "correct_treatment": "filling"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Feedback submitted successfully!");
        assert_eq!(h.feedback.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_speech_to_text_and_playback() {
        let h = harness();
        let audio = base64::engine::general_purpose::STANDARD.encode(vec![1u8; 4096]);
        let (status, body) = send_json(&h.app, Method::POST, "/api/speech-to-text", json!({"audioContent": audio})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transcript"], "pain in lower molar");

        let recording_id = body["recordingId"].as_str().unwrap().to_string();
        assert_eq!(
            body["audioUrl"],
            format!("http://localhost:5000/recordings/{}.wav", recording_id)
        );

        let request = axum::http::Request::builder()
            .uri(format!("/recordings/{}.wav", recording_id))
            .body(Body::empty())
            .unwrap();
        let (status, bytes) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes.len(), 4096);

        let (status, _) = get_json(&h.app, "/recordings/unknown.wav").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_speech_to_text_rejects_small_audio() {
        let h = harness();
        let audio = base64::engine::general_purpose::STANDARD.encode(vec![1u8; 100]);
        let (status, body) = send_json(&h.app, Method::POST, "/api/speech-to-text", json!({"audioContent": audio})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Audio file is too small, possibly silent.");

        let (status, _) = send_json(&h.app, Method::POST, "/api/speech-to-text", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_patient_directory() {
        let h = harness();
        let (status, created) = send_json(
            &h.app,
            Method::POST,
            "/api/patients",
            json!({"name": "Ana Ruiz", "age": 34, "condition": "Root canal", "status": "Critical"}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_string();

        let (status, fetched) = get_json(&h.app, &format!("/api/patients/{}", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["name"], "Ana Ruiz");

        let (_, listing) = get_json(&h.app, "/api/patients?q=root&filter=critical").await;
        assert_eq!(listing["total"], 1);

        let (_, listing) = get_json(&h.app, "/api/patients?filter=stable").await;
        assert_eq!(listing["total"], 0);
    }

    #[tokio::test]
    async fn test_metrics_count_rejections() {
        let h = harness();
        let _ = get_json(&h.app, "/api/patients/nobody/report").await;

        let request = axum::http::Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let (status, bytes) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("dental_rejected_requests_total{status=\"404\"} 1"));
    }
}
