//! 上传流水线
//!
//! 保存上传文件、调用外部分析服务、把结果追加到患者报告。
//! 三步相互独立，后一步失败不回滚前一步已保存的文件。

use dental_core::{FileCategory, Result, StoredFile, UploadResult, UploadedFile};
use dental_integration::AnalysisGateway;
use dental_storage::{FileIntake, ReportAggregator};
use std::sync::Arc;
use tracing::{error, info};

/// 上传流水线
pub struct UploadPipeline {
    intake: Arc<FileIntake>,
    gateway: Arc<dyn AnalysisGateway>,
    reports: Arc<ReportAggregator>,
}

impl UploadPipeline {
    pub fn new(
        intake: Arc<FileIntake>,
        gateway: Arc<dyn AnalysisGateway>,
        reports: Arc<ReportAggregator>,
    ) -> Self {
        Self {
            intake,
            gateway,
            reports,
        }
    }

    /// 上传病历报告：提取文本并按行追加到报告
    pub async fn upload_medical_report(&self, patient_id: &str, file: UploadedFile) -> Result<UploadResult> {
        // 1. 保存文件
        let stored = self.intake.store(patient_id, FileCategory::MedicalReport, &file).await?;

        // 2. 文本提取
        let analysis_text = self
            .gateway
            .analyze_document(&Self::forwarded(&stored, file))
            .await
            .map_err(|e| {
                error!("Error analyzing medical report {}: {}", stored.path, e);
                e
            })?;

        // 3. 追加到报告
        self.reports.append_entry(&stored.patient_id, &analysis_text, &[]).await?;

        info!("Processed medical report {} for patient {}", stored.path, stored.patient_id);
        Ok(UploadResult {
            file_path: stored.path,
            analysis_text,
        })
    }

    /// 上传X光影像：检测疾病并追加到报告
    pub async fn upload_xray(&self, patient_id: &str, file: UploadedFile) -> Result<UploadResult> {
        // 1. 保存文件
        let stored = self.intake.store(patient_id, FileCategory::Xray, &file).await?;

        // 2. 疾病检测
        let diseases = self
            .gateway
            .analyze_image(&Self::forwarded(&stored, file))
            .await
            .map_err(|e| {
                error!("Error analyzing X-ray {}: {}", stored.path, e);
                e
            })?;

        // 3. 追加到报告
        self.reports.append_entry(&stored.patient_id, "", &diseases).await?;

        info!(
            "Processed X-ray {} for patient {}: {} findings",
            stored.path,
            stored.patient_id,
            diseases.len()
        );
        Ok(UploadResult {
            file_path: stored.path,
            analysis_text: diseases.join(", "),
        })
    }

    /// 列出患者已上传的文件
    pub async fn list_files(&self, patient_id: &str, category: FileCategory) -> Result<Vec<String>> {
        self.intake.list(patient_id, category).await
    }

    /// 转发给分析服务的文件使用落盘后的规范文件名
    fn forwarded(stored: &StoredFile, file: UploadedFile) -> UploadedFile {
        UploadedFile {
            file_name: stored.original_name.clone(),
            ..file
        }
    }
}
