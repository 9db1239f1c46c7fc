//! HTTP surface: upload form, upload, report generation and download.

pub mod handlers;
pub mod storage;

use crate::config::Settings;
use crate::error::ReportError;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use storage::ReportStore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Debug)]
pub struct AppState {
    pub settings: Settings,
    pub store: ReportStore,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let store = ReportStore::new(settings.storage_dir.clone());
        Self { settings, store }
    }
}

/// Error body returned to clients: `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn from_report_error(err: ReportError, context: &str) -> Self {
        match err {
            ReportError::NotFound(name) => {
                tracing::warn!(file = %name, "requested file not found");
                ApiError {
                    status: StatusCode::NOT_FOUND,
                    detail: "File not found".to_string(),
                }
            }
            ReportError::MissingField(_) => ApiError {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                detail: err.to_string(),
            },
            other => {
                tracing::error!("{}: {}", context, other);
                ApiError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    detail: format!("{}: {}", context, other),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "detail": self.detail }))).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.settings.max_upload_bytes;

    Router::new()
        .route("/index", get(handlers::index))
        .route("/uploadfile/", post(handlers::upload_file))
        .route("/generate-report/", post(handlers::generate_report))
        .route("/download-report/:report_file", get(handlers::download_report))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::handlers::{UploadResponse, XLSX_MIME};
    use super::*;
    use crate::types::{CellValue, SheetData};
    use crate::writer::write_sheet_to_bytes;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use tower::ServiceExt;

    const BOUNDARY: &str = "xlreport-test-boundary";

    fn app(dir: &std::path::Path) -> Router {
        let settings = Settings {
            storage_dir: dir.to_path_buf(),
            ..Default::default()
        };
        router(Arc::new(AppState::new(settings)))
    }

    fn multipart_body(file: Option<(&str, &[u8])>, month: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some((name, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n\
Content-Type: {XLSX_MIME}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        if let Some(month) = month {
            body.extend_from_slice(
                format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"month\"\r\n\r\n{month}\r\n")
                    .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn post(uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn sales_workbook() -> Vec<u8> {
        write_sheet_to_bytes(&SheetData {
            name: "Sheet1".to_string(),
            columns: vec![
                (
                    "Product".to_string(),
                    vec![CellValue::String("A".into()), CellValue::String("B".into())],
                ),
                ("Jan".to_string(), vec![CellValue::Number(10.0), CellValue::Number(5.0)]),
                ("Feb".to_string(), vec![CellValue::Number(20.0), CellValue::Number(15.0)]),
            ],
            formulas: Vec::new(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_index_page() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path()).oneshot(get("/index")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&html).contains("action=\"/generate-report/\""));
    }

    #[tokio::test]
    async fn test_upload_stores_file() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(post("/uploadfile/", multipart_body(Some(("../q1 sales.xlsx", b"raw")), None)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let upload: UploadResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(upload.message, "File uploaded successfully");
        assert!(upload.filename.ends_with("_q1_sales.xlsx"));
        assert_eq!(std::fs::read(dir.path().join(&upload.filename)).unwrap(), b"raw");
    }

    #[tokio::test]
    async fn test_missing_file_field() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(post("/generate-report/", multipart_body(None, Some("May"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json_body(response).await["detail"].as_str().unwrap().contains("file"));
    }

    #[tokio::test]
    async fn test_generate_then_download() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        let input = sales_workbook();

        let response = app
            .clone()
            .oneshot(post(
                "/generate-report/?month=Ignored",
                multipart_body(Some(("sales.xlsx", &input)), Some("March 2024")),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], XLSX_MIME);

        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment; filename=\"report_March_2024_"));
        let name = disposition
            .trim_start_matches("attachment; filename=\"")
            .trim_end_matches('"')
            .to_string();
        let generated = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        let response = app
            .oneshot(get(&format!("/download-report/{}", name)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let downloaded = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(generated, downloaded);
    }

    #[tokio::test]
    async fn test_month_from_query() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(post(
                "/generate-report/?month=July",
                multipart_body(Some(("sales.xlsx", &sales_workbook())), None),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.contains("report_July_"));
    }

    #[tokio::test]
    async fn test_blank_month_field_falls_back_to_query() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(post(
                "/generate-report/?month=July",
                multipart_body(Some(("sales.xlsx", &sales_workbook())), Some("  ")),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.contains("report_July_"));
    }

    #[tokio::test]
    async fn test_unreadable_upload_is_500() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(post(
                "/generate-report/",
                multipart_body(Some(("notes.xlsx", b"not a workbook")), None),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = json_body(response).await["detail"].as_str().unwrap().to_string();
        assert!(detail.starts_with("Error generating report: "));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_download_unknown_is_404() {
        let dir = tempfile::tempdir().unwrap();
        for uri in ["/download-report/missing.xlsx", "/download-report/..%2Fsecret"] {
            let response = app(dir.path()).oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(json_body(response).await["detail"], "File not found");
        }
    }
}
