//! 带指标记录的分析网关

use async_trait::async_trait;
use dental_admin::PipelineMonitor;
use dental_core::{AnalysisResult, Result, UploadedFile};
use dental_integration::AnalysisGateway;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

pub struct MeteredGateway {
    inner: Arc<dyn AnalysisGateway>,
    monitor: Arc<PipelineMonitor>,
}

impl MeteredGateway {
    pub fn new(inner: Arc<dyn AnalysisGateway>, monitor: Arc<PipelineMonitor>) -> Self {
        Self { inner, monitor }
    }

    fn observe<T>(&self, service: &str, started: Instant, result: &Result<T>) {
        self.monitor
            .record_upstream_call(service, started.elapsed(), result.is_ok());
    }
}

#[async_trait]
impl AnalysisGateway for MeteredGateway {
    async fn analyze_document(&self, file: &UploadedFile) -> Result<String> {
        let started = Instant::now();
        let result = self.inner.analyze_document(file).await;
        self.observe("extract-text", started, &result);
        result
    }

    async fn analyze_image(&self, file: &UploadedFile) -> Result<Vec<String>> {
        let started = Instant::now();
        let result = self.inner.analyze_image(file).await;
        self.observe("xray-detect", started, &result);
        result
    }

    async fn detect_symptoms(&self, report: &Value) -> Result<AnalysisResult> {
        let started = Instant::now();
        let result = self.inner.detect_symptoms(report).await;
        self.observe("symptom-analysis", started, &result);
        result
    }
}
