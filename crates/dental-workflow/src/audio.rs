//! 音频桥接
//!
//! 接收浏览器上传的Base64录音，校验大小后按录音ID保存，再交给转写后端。

use base64::Engine as _;
use dental_core::{DentalError, Result, Transcription, NO_SPEECH_DETECTED};
use dental_integration::TranscriptionBackend;
use dental_storage::RecordingStore;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 录音最小字节数，低于此值视为静音
pub const MIN_AUDIO_BYTES: usize = 1000;

/// 录音回放路径前缀
pub const RECORDINGS_ROUTE: &str = "/recordings";

/// 解码Base64录音，兼容带 `data:*;base64,` 前缀的数据URL
pub fn decode_audio(audio_base64: &str) -> Result<Vec<u8>> {
    let payload = match audio_base64.split_once("base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => audio_base64,
    };
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    let audio = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| DentalError::InvalidInput(format!("Audio content is not valid Base64: {}", e)))?;

    if audio.len() < MIN_AUDIO_BYTES {
        return Err(DentalError::InvalidInput(
            "Audio file is too small, possibly silent.".to_string(),
        ));
    }
    Ok(audio)
}

/// 音频桥接器
pub struct AudioBridge {
    recordings: Arc<RecordingStore>,
    backend: Arc<dyn TranscriptionBackend>,
    public_base_url: String,
}

impl AudioBridge {
    pub fn new(
        recordings: Arc<RecordingStore>,
        backend: Arc<dyn TranscriptionBackend>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            recordings,
            backend,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// 录音回放地址
    pub fn audio_url(&self, file_name: &str) -> String {
        format!("{}{}/{}", self.public_base_url, RECORDINGS_ROUTE, file_name)
    }

    /// 转写一段录音；没有识别结果时返回固定提示而不是错误
    pub async fn transcribe(&self, audio_base64: Option<&str>) -> Result<Transcription> {
        let audio_base64 = audio_base64
            .filter(|a| !a.is_empty())
            .ok_or_else(|| DentalError::MissingField("audioContent".to_string()))?;

        // 1. 解码并校验，过小的录音不发起任何外部调用
        let audio = decode_audio(audio_base64)?;

        // 2. 按新ID保存
        let recording_id = self.recordings.save(&audio).await?;

        // 3. 转写；失败时录音不会被引用，随即删除
        let transcript = match self.backend.transcribe(&audio).await {
            Ok(transcript) => transcript,
            Err(e) => {
                error!("Speech-to-text error ({}): {}", self.backend.name(), e);
                if let Err(cleanup) = self.recordings.remove(&recording_id).await {
                    warn!("Failed to remove recording {}: {}", recording_id, cleanup);
                }
                return Err(e);
            }
        };

        let transcript = transcript.unwrap_or_else(|| NO_SPEECH_DETECTED.to_string());
        info!(
            "Transcribed recording {} via {} ({} bytes)",
            recording_id,
            self.backend.name(),
            audio.len()
        );

        Ok(Transcription {
            transcript,
            audio_url: self.audio_url(&RecordingStore::file_name(&recording_id)),
            recording_id: recording_id.to_string(),
        })
    }

    /// 读取录音用于回放
    pub async fn recording(&self, file_name: &str) -> Result<Vec<u8>> {
        self.recordings.load_by_file_name(file_name).await
    }
}
