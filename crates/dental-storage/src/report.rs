//! 患者累积报告
//!
//! 每个患者一份 `report.json`，按患者串行化读改写，保证并发追加不丢条目。

use chrono::Utc;
use dental_core::utils::validate_patient_id;
use dental_core::{AnalysisReport, DentalError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::storage::BlobStore;

/// 报告文件的存储键
pub fn report_key(patient_id: &str) -> String {
    format!("{}/report.json", patient_id)
}

/// 按患者ID分配的异步互斥锁
#[derive(Default)]
pub struct PatientLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PatientLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取患者锁，持有期间同一患者的其他写入方等待
    pub async fn acquire(&self, patient_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // 只剩表内引用的锁无人使用，可以回收
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(patient_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// 当前登记的锁数量
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// 报告聚合器
pub struct ReportAggregator {
    store: Arc<dyn BlobStore>,
    locks: PatientLocks,
}

impl ReportAggregator {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            locks: PatientLocks::new(),
        }
    }

    /// 追加一次分析结果并整体重写报告
    ///
    /// `medical_text` 为空时不追加病历条目，`xray_diseases` 为空时不追加X光条目。
    /// 已有条目和未知字段原样保留；只有文件不是合法JSON对象时才按空报告处理。
    /// 读取失败（非 `NotFound`）时直接返回错误，不覆盖原文件。
    pub async fn append_entry(
        &self,
        patient_id: &str,
        medical_text: &str,
        xray_diseases: &[String],
    ) -> Result<AnalysisReport> {
        let patient_id = validate_patient_id(patient_id)?;
        let key = report_key(patient_id);
        let _guard = self.locks.acquire(patient_id).await;

        let mut report = self.read_existing(&key).await?;

        let now = Utc::now();
        let added_medical = report.push_medical_report(medical_text, now)?;
        let added_xray = report.push_xray_analysis(xray_diseases, now)?;
        report.stamp(patient_id, now)?;

        let body = serde_json::to_vec_pretty(&report)?;
        self.store.put(&key, &body).await?;

        info!(
            "Updated report for patient {} (medical: {}, xray: {}, totals: {}/{})",
            patient_id,
            added_medical,
            added_xray,
            report.medical_reports().len(),
            report.xray_analyses().len()
        );
        Ok(report)
    }

    /// 读取患者报告，不存在时返回 `NotFound`
    pub async fn load(&self, patient_id: &str) -> Result<AnalysisReport> {
        let raw = self.load_raw(patient_id).await?;
        AnalysisReport::from_value(raw).ok_or_else(|| {
            DentalError::Storage(format!("Report for patient {} is not a JSON object", patient_id))
        })
    }

    /// 读取报告的原始JSON，原样转发给分析服务
    pub async fn load_raw(&self, patient_id: &str) -> Result<serde_json::Value> {
        let patient_id = validate_patient_id(patient_id)?;
        let data = match self.store.get(&report_key(patient_id)).await {
            Ok(data) => data,
            Err(DentalError::NotFound(_)) => {
                return Err(DentalError::NotFound(format!(
                    "No report found for patient {}",
                    patient_id
                )))
            }
            Err(e) => return Err(e),
        };
        Ok(serde_json::from_slice(&data)?)
    }

    async fn read_existing(&self, key: &str) -> Result<AnalysisReport> {
        let data = match self.store.get(key).await {
            Ok(data) => data,
            Err(DentalError::NotFound(_)) => {
                info!("No existing report at {}, creating new one", key);
                return Ok(AnalysisReport::new());
            }
            Err(e) => return Err(e),
        };

        let parsed = match serde_json::from_slice::<serde_json::Value>(&data) {
            Ok(value) => AnalysisReport::from_value(value),
            Err(e) => {
                warn!("Existing report at {} is not valid JSON, starting fresh: {}", key, e);
                return Ok(AnalysisReport::new());
            }
        };
        Ok(parsed.unwrap_or_else(|| {
            warn!("Existing report at {} is not a JSON object, starting fresh", key);
            AnalysisReport::new()
        }))
    }
}
