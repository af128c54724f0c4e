//! 语音识别后端
//!
//! 两种可插拔实现，由配置选择：
//! - 通用HTTP代理：`{audioContent}` → `{transcript}`
//! - 识别服务REST接口：`{config, audio: {content}}` → `{results: [{alternatives: [{transcript}]}]}`

use async_trait::async_trait;
use base64::Engine as _;
use dental_core::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error};

use crate::{build_http_client, status_error, transport_error};

/// 语音转写后端接口
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// 后端名称
    fn name(&self) -> &str;

    /// 转写音频，没有识别出语音时返回 `None`
    async fn transcribe(&self, audio: &[u8]) -> Result<Option<String>>;
}

fn encode_audio(audio: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(audio)
}

async fn read_json(service: &str, response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        error!("{} returned status {}", service, status);
        return Err(status_error(service, status));
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| dental_core::DentalError::Analysis(format!("{} returned invalid JSON: {}", service, e)))
}

/// 通用HTTP代理后端
pub struct HttpProxyTranscriber {
    client: reqwest::Client,
    url: String,
}

impl HttpProxyTranscriber {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            url: url.into(),
        })
    }
}

/// 代理响应中的转写文本，空字符串视为无结果
pub fn parse_proxy_response(body: &Value) -> Option<String> {
    body.get("transcript")
        .and_then(|v| v.as_str())
        .filter(|t| !t.trim().is_empty())
        .map(str::to_string)
}

#[async_trait]
impl TranscriptionBackend for HttpProxyTranscriber {
    fn name(&self) -> &str {
        "proxy"
    }

    async fn transcribe(&self, audio: &[u8]) -> Result<Option<String>> {
        debug!("Sending {} bytes of audio to speech proxy {}", audio.len(), self.url);
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "audioContent": encode_audio(audio) }))
            .send()
            .await
            .map_err(|e| transport_error("Speech proxy", e))?;

        let body = read_json("Speech proxy", response).await?;
        Ok(parse_proxy_response(&body))
    }
}

/// 识别服务参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionSettings {
    pub encoding: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate_hertz: Option<u32>,
    pub language_code: String,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            encoding: "WEBM_OPUS".to_string(),
            sample_rate_hertz: Some(48000),
            language_code: "en-US".to_string(),
        }
    }
}

/// 识别服务后端
pub struct RecognitionTranscriber {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    settings: RecognitionSettings,
}

impl RecognitionTranscriber {
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        settings: RecognitionSettings,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            url: url.into(),
            api_key,
            settings,
        })
    }

    /// 识别请求体
    pub fn request_body(&self, audio: &[u8]) -> Value {
        json!({
            "config": self.settings,
            "audio": { "content": encode_audio(audio) },
        })
    }
}

/// 取每个结果的首选候选并按行拼接，结果列表为空时返回 `None`
pub fn parse_recognition_response(body: &Value) -> Option<String> {
    let lines: Vec<&str> = body
        .get("results")
        .and_then(|v| v.as_array())
        .map(|results| {
            results
                .iter()
                .filter_map(|r| r.pointer("/alternatives/0/transcript").and_then(|t| t.as_str()))
                .filter(|t| !t.trim().is_empty())
                .collect()
        })
        .unwrap_or_default();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

#[async_trait]
impl TranscriptionBackend for RecognitionTranscriber {
    fn name(&self) -> &str {
        "recognition"
    }

    async fn transcribe(&self, audio: &[u8]) -> Result<Option<String>> {
        debug!(
            "Sending {} bytes of audio to recognition service ({})",
            audio.len(),
            self.settings.language_code
        );
        let mut request = self.client.post(&self.url).json(&self.request_body(audio));
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error("Speech recognition", e))?;
        let body = read_json("Speech recognition", response).await?;
        Ok(parse_recognition_response(&body))
    }
}
