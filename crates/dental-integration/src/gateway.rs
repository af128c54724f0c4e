//! 外部分析网关
//!
//! 单次同步HTTP调用，不重试：
//! - 病历文档 → 文本提取服务，返回 `extracted_text`
//! - X光影像 → 疾病检测服务，返回 `detected_diseases`
//! - 患者报告 → 症状分析服务，原样返回响应JSON

use async_trait::async_trait;
use dental_core::{AnalysisResult, DentalError, FileCategory, Result, UploadedFile};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::{build_http_client, status_error, transport_error};

/// 分析网关接口
#[async_trait]
pub trait AnalysisGateway: Send + Sync {
    /// 提取病历文档中的文本
    async fn analyze_document(&self, file: &UploadedFile) -> Result<String>;

    /// 检测X光影像中的疾病
    async fn analyze_image(&self, file: &UploadedFile) -> Result<Vec<String>>;

    /// 提交完整患者报告做症状与治疗建议分析
    async fn detect_symptoms(&self, report: &serde_json::Value) -> Result<AnalysisResult>;
}

/// 分析服务地址
#[derive(Debug, Clone)]
pub struct AnalysisEndpoints {
    pub extract_text_url: String,
    pub xray_detect_url: String,
    pub symptom_analysis_url: String,
}

#[derive(Debug, Deserialize)]
struct ExtractTextResponse {
    extracted_text: String,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    detected_diseases: Vec<String>,
}

/// 基于HTTP的分析网关
pub struct HttpAnalysisGateway {
    client: reqwest::Client,
    endpoints: AnalysisEndpoints,
}

impl HttpAnalysisGateway {
    pub fn new(endpoints: AnalysisEndpoints, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            endpoints,
        })
    }

    pub fn with_client(client: reqwest::Client, endpoints: AnalysisEndpoints) -> Self {
        Self { client, endpoints }
    }

    fn file_form(file: &UploadedFile, category: FileCategory) -> Result<Form> {
        // 浏览器无法识别类型时会给出通用二进制类型，按类别补上具体类型
        let content_type = file
            .content_type
            .as_deref()
            .filter(|ct| !is_generic_content_type(ct))
            .unwrap_or(category.default_content_type());
        let part = Part::bytes(file.data.clone())
            .file_name(file.file_name.clone())
            .mime_str(content_type)
            .map_err(|e| DentalError::InvalidInput(format!("Invalid content type {}: {}", content_type, e)))?;
        Ok(Form::new().part("file", part))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        service: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let started = Instant::now();
        let response = request.send().await.map_err(|e| {
            error!("{} request failed: {}", service, e);
            transport_error(service, e)
        })?;

        let status = response.status();
        if !status.is_success() {
            error!("{} returned status {}", service, status);
            return Err(status_error(service, status));
        }

        let body = response.json::<T>().await.map_err(|e| {
            error!("{} returned an unexpected response: {}", service, e);
            DentalError::Analysis(format!("{} returned an unexpected response: {}", service, e))
        })?;

        debug!("{} completed in {:?}", service, started.elapsed());
        Ok(body)
    }
}

#[async_trait]
impl AnalysisGateway for HttpAnalysisGateway {
    async fn analyze_document(&self, file: &UploadedFile) -> Result<String> {
        let form = Self::file_form(file, FileCategory::MedicalReport)?;
        let request = self.client.post(&self.endpoints.extract_text_url).multipart(form);
        let body: ExtractTextResponse = self.send_json("Text extraction", request).await?;

        info!("Extracted {} characters from {}", body.extracted_text.len(), file.file_name);
        Ok(body.extracted_text)
    }

    async fn analyze_image(&self, file: &UploadedFile) -> Result<Vec<String>> {
        let form = Self::file_form(file, FileCategory::Xray)?;
        let request = self.client.post(&self.endpoints.xray_detect_url).multipart(form);
        let body: DetectResponse = self.send_json("X-ray detection", request).await?;

        info!("Detected {} findings in {}", body.detected_diseases.len(), file.file_name);
        Ok(body.detected_diseases)
    }

    async fn detect_symptoms(&self, report: &serde_json::Value) -> Result<AnalysisResult> {
        let request = self.client.post(&self.endpoints.symptom_analysis_url).json(report);
        let body: serde_json::Value = self.send_json("Symptom analysis", request).await?;
        Ok(AnalysisResult(body))
    }
}

/// 空类型或不携带格式信息的二进制类型
fn is_generic_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    matches!(
        essence.as_str(),
        "" | "application/octet-stream" | "binary/octet-stream" | "application/unknown"
    )
}
