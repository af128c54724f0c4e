//! HTTP处理器

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::Utc;
use dental_core::{DentalError, FeedbackEntry, FileCategory, NewPatient};
use dental_integration::PatientFilter;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "Dental AI Assistant API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health",
            "metrics": "/metrics",
            "api": "/api",
            "recordings": "/recordings"
        }
    }))
}

/// 健康检查处理器
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "uptime_seconds": state.monitor.uptime().as_secs(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Prometheus指标
pub async fn metrics(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let body = state
        .monitor
        .get_prometheus_metrics()
        .map_err(|e| DentalError::Internal(e.to_string()))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

/// 患者列表
pub async fn list_patients(
    State(state): State<AppState>,
    Query(filter): Query<PatientFilter>,
) -> ApiResult<impl IntoResponse> {
    debug!("Listing patients with filter: {:?}", filter);

    let patients = state.patients.list().await?;
    let patients = filter.apply(patients, Utc::now().date_naive());

    Ok(Json(json!({
        "patients": patients,
        "total": patients.len()
    })))
}

/// 新建患者
pub async fn create_patient(
    State(state): State<AppState>,
    payload: Result<Json<NewPatient>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(new_patient) = payload?;
    let patient = state.patients.create(new_patient).await?;
    Ok((StatusCode::CREATED, Json(patient)))
}

pub async fn get_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.patients.get(&patient_id).await?))
}

/// 患者累积报告
pub async fn get_report(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.reports.load_raw(&patient_id).await?))
}

/// 读取患者报告并提交症状分析
pub async fn analyze_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let result = state.orchestrator.analyze(&patient_id).await?;
    Ok(Json(result.into_inner()))
}

#[derive(Debug, Deserialize)]
pub struct FilesQuery {
    pub category: Option<String>,
}

/// 已保存文件列表
pub async fn list_files(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
    Query(query): Query<FilesQuery>,
) -> ApiResult<impl IntoResponse> {
    let category: FileCategory = query
        .category
        .filter(|c| !c.is_empty())
        .ok_or_else(|| DentalError::MissingField("category".to_string()))?
        .parse()?;

    let files = state.pipeline.list_files(&patient_id, category).await?;

    Ok(Json(json!({
        "patientId": patient_id,
        "category": category,
        "files": files
    })))
}

/// 报告直接转发给症状分析服务
pub async fn analyze_data(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(report) = payload?;
    let result = state.orchestrator.forward(&report).await?;
    Ok(Json(result.into_inner()))
}

/// 提交反馈
pub async fn submit_feedback(
    State(state): State<AppState>,
    payload: Result<Json<FeedbackEntry>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(entry) = payload?;
    let ack = state.feedback.submit(entry).await?;

    state.monitor.record_feedback();
    Ok(Json(ack))
}

/// 未匹配的路由
pub async fn not_found() -> ApiError {
    ApiError(DentalError::NotFound("Route not found".to_string()))
}
