//! 反馈收集服务客户端

use async_trait::async_trait;
use dental_core::{FeedbackRecord, Result};
use std::time::Duration;
use tracing::info;

use crate::{build_http_client, status_error, transport_error};

/// 反馈发送接口
#[async_trait]
pub trait FeedbackClient: Send + Sync {
    /// 转发一条反馈，调用未出错即视为成功
    async fn send(&self, record: &FeedbackRecord) -> Result<()>;
}

/// 基于HTTP的反馈客户端
pub struct HttpFeedbackClient {
    client: reqwest::Client,
    url: String,
}

impl HttpFeedbackClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl FeedbackClient for HttpFeedbackClient {
    async fn send(&self, record: &FeedbackRecord) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(record)
            .send()
            .await
            .map_err(|e| transport_error("Feedback service", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error("Feedback service", status));
        }

        info!("Feedback forwarded to {} ({})", self.url, status);
        Ok(())
    }
}
