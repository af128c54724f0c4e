//! # 外部服务集成模块
//!
//! 封装所有对外HTTP调用：
//! - 文本提取、X光检测和症状分析服务
//! - 语音识别后端（通用代理或识别服务）
//! - 反馈收集服务
//! - 患者文档库

pub mod feedback;
pub mod gateway;
pub mod patients;
pub mod speech;

pub use feedback::{FeedbackClient, HttpFeedbackClient};
pub use gateway::{AnalysisEndpoints, AnalysisGateway, HttpAnalysisGateway};
pub use patients::{DocumentPatientStore, MemoryPatientStore, PatientFilter, PatientStore, StatusFilter};
pub use speech::{HttpProxyTranscriber, RecognitionSettings, RecognitionTranscriber, TranscriptionBackend};

use dental_core::{DentalError, Result};
use std::time::Duration;

/// 构建带超时的HTTP客户端
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DentalError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// 上游非成功状态的错误文本
pub(crate) fn status_error(service: &str, status: reqwest::StatusCode) -> DentalError {
    DentalError::Analysis(format!(
        "{} failed: {}",
        service,
        status.canonical_reason().unwrap_or(status.as_str())
    ))
}

/// 请求发送失败（不可达、超时等）
pub(crate) fn transport_error(service: &str, err: reqwest::Error) -> DentalError {
    DentalError::Analysis(format!("{} unreachable: {}", service, err))
}
