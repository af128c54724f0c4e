//! 分析编排
//!
//! 读取患者累积报告，整体提交给症状分析服务，结果不缓存。

use dental_core::{AnalysisResult, Result};
use dental_integration::AnalysisGateway;
use dental_storage::ReportAggregator;
use std::sync::Arc;
use tracing::{error, info};

/// 分析编排器
pub struct AnalysisOrchestrator {
    reports: Arc<ReportAggregator>,
    gateway: Arc<dyn AnalysisGateway>,
}

impl AnalysisOrchestrator {
    pub fn new(reports: Arc<ReportAggregator>, gateway: Arc<dyn AnalysisGateway>) -> Self {
        Self { reports, gateway }
    }

    /// 分析指定患者，报告不存在时返回 `NotFound`
    pub async fn analyze(&self, patient_id: &str) -> Result<AnalysisResult> {
        let report = self.reports.load_raw(patient_id).await?;
        let result = self.forward(&report).await?;
        info!(
            "Analysis for patient {} returned {} symptoms",
            patient_id,
            result.detected_symptoms().len()
        );
        Ok(result)
    }

    /// 直接转发调用方提供的报告
    pub async fn forward(&self, report: &serde_json::Value) -> Result<AnalysisResult> {
        self.gateway.detect_symptoms(report).await.map_err(|e| {
            error!("Error analyzing data: {}", e);
            e
        })
    }
}
