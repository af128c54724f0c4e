//! 文件上传处理器
//!
//! multipart字段：`file` 与 `patientId`

use axum::{
    extract::{Multipart, State},
    response::{IntoResponse, Json},
};
use dental_core::{DentalError, FileCategory, UploadedFile};
use tracing::debug;

use crate::error::ApiResult;
use crate::state::AppState;

/// 解析后的上传表单
struct UploadForm {
    patient_id: Option<String>,
    file: Option<UploadedFile>,
}

async fn read_form(mut multipart: Multipart) -> ApiResult<UploadForm> {
    let mut form = UploadForm {
        patient_id: None,
        file: None,
    };

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await?.to_vec();
                debug!("Received upload {} ({} bytes)", file_name, data.len());

                form.file = Some(UploadedFile {
                    file_name,
                    content_type,
                    data,
                });
            }
            Some("patientId") => {
                form.patient_id = Some(field.text().await?.trim().to_string());
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn handle_upload(
    state: AppState,
    multipart: Multipart,
    category: FileCategory,
) -> ApiResult<impl IntoResponse> {
    let form = read_form(multipart).await?;

    let file = form
        .file
        .ok_or_else(|| DentalError::MissingField("file".to_string()))?;
    let patient_id = form
        .patient_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| DentalError::MissingField("patientId".to_string()))?;

    let result = match category {
        FileCategory::MedicalReport => state.pipeline.upload_medical_report(&patient_id, file).await?,
        FileCategory::Xray => state.pipeline.upload_xray(&patient_id, file).await?,
    };

    state.monitor.record_upload(&category.to_string());
    Ok(Json(result))
}

/// 上传病历报告
pub async fn upload_medical_report(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    handle_upload(state, multipart, FileCategory::MedicalReport).await
}

/// 上传X光影像
pub async fn upload_xray(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    handle_upload(state, multipart, FileCategory::Xray).await
}
