//! 语音转写与录音回放

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::header,
    response::{IntoResponse, Json},
};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRequest {
    #[serde(default)]
    pub audio_content: Option<String>,
}

/// Base64录音转文字
pub async fn speech_to_text(
    State(state): State<AppState>,
    payload: Result<Json<SpeechRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let transcription = state
        .audio
        .transcribe(request.audio_content.as_deref())
        .await?;

    state.monitor.record_transcription();
    Ok(Json(transcription))
}

/// 按文件名回放录音
pub async fn get_recording(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let audio = state.audio.recording(&file_name).await?;
    Ok(([(header::CONTENT_TYPE, "audio/wav")], audio))
}
