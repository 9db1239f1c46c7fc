use super::{ApiError, AppState};
use crate::error::ReportError;
use crate::report;
use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct MonthQuery {
    pub month: Option<String>,
}

struct UploadForm {
    file_name: String,
    bytes: Bytes,
    month: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, ReportError> {
    let mut file = None;
    let mut month = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload.xlsx").to_string();
                file = Some((file_name, field.bytes().await?));
            }
            Some("month") => month = Some(field.text().await?),
            _ => {}
        }
    }

    let (file_name, bytes) = file.ok_or(ReportError::MissingField("file"))?;
    Ok(UploadForm { file_name, bytes, month })
}

fn attachment(file_name: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, XLSX_MIME.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
        .into_response()
}

pub async fn index() -> Html<&'static str> {
    tracing::debug!("GET /index");
    Html(include_str!("index.html"))
}

pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    tracing::debug!("POST /uploadfile/");
    let fail = |e: ReportError| ApiError::from_report_error(e, "Error uploading file");

    let form = read_form(multipart).await.map_err(fail)?;
    let filename = state
        .store
        .store_upload(&form.file_name, &form.bytes)
        .await
        .map_err(fail)?;

    Ok(Json(UploadResponse {
        message: "File uploaded successfully".to_string(),
        filename,
    }))
}

pub async fn generate_report(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MonthQuery>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    tracing::debug!("POST /generate-report/");
    let fail = |e: ReportError| ApiError::from_report_error(e, "Error generating report");

    let form = read_form(multipart).await.map_err(fail)?;
    tracing::debug!(upload = %form.file_name, size = form.bytes.len(), "generating report");

    // A non-blank form field wins over the query parameter.
    let month = form
        .month
        .filter(|m| !m.trim().is_empty())
        .or(query.month);
    let options = state.settings.report.clone();
    let out_dir = state.store.root().to_path_buf();
    let threads = state.settings.render_threads;

    let generated = tokio::task::spawn_blocking(move || {
        report::generate_report(&form.bytes, month.as_deref(), &options, &out_dir, threads)
    })
    .await
    .map_err(|e| fail(e.into()))?
    .map_err(fail)?;

    let body = tokio::fs::read(&generated.path)
        .await
        .map_err(|e| fail(e.into()))?;
    Ok(attachment(&generated.file_name, body))
}

pub async fn download_report(
    State(state): State<Arc<AppState>>,
    Path(report_file): Path<String>,
) -> Result<Response, ApiError> {
    tracing::debug!(file = %report_file, "GET /download-report");

    let body = state
        .store
        .read(&report_file)
        .await
        .map_err(|e| ApiError::from_report_error(e, "Error downloading report"))?;
    Ok(attachment(&report_file, body))
}
