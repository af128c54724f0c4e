//! 上传文件接收
//!
//! 按 `患者ID/分类目录/时间戳-原始文件名` 保存上传的病历报告和X光影像。

use chrono::Utc;
use dental_core::utils::{file_timestamp, sanitize_file_name, validate_patient_id};
use dental_core::{DentalError, FileCategory, Result, StoredFile, UploadedFile};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::info;

use crate::storage::BlobStore;

/// 文件接收器
pub struct FileIntake {
    store: Arc<dyn BlobStore>,
}

impl FileIntake {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// 保存上传文件，不覆盖已有文件
    pub async fn store(
        &self,
        patient_id: &str,
        category: FileCategory,
        file: &UploadedFile,
    ) -> Result<StoredFile> {
        if file.data.is_empty() {
            return Err(DentalError::MissingField("file".to_string()));
        }
        let patient_id = validate_patient_id(patient_id)?;

        let created_at = Utc::now();
        let original_name = sanitize_file_name(&file.file_name);
        let path = format!(
            "{}/{}/{}-{}",
            patient_id,
            category.dir_name(),
            file_timestamp(created_at),
            original_name
        );

        self.store.put(&path, &file.data).await?;

        let stored = StoredFile {
            patient_id: patient_id.to_string(),
            category,
            original_name,
            created_at,
            path,
            size: file.data.len() as u64,
            sha256: format!("{:x}", Sha256::digest(&file.data)),
        };

        info!(
            "Stored {} upload for patient {}: {} ({} bytes)",
            category, stored.patient_id, stored.path, stored.size
        );
        Ok(stored)
    }

    /// 读取已保存的文件
    pub async fn read(&self, stored: &StoredFile) -> Result<Vec<u8>> {
        self.store.get(&stored.path).await
    }

    /// 列出患者某分类下的文件，按上传时间先后排列
    pub async fn list(&self, patient_id: &str, category: FileCategory) -> Result<Vec<String>> {
        let patient_id = validate_patient_id(patient_id)?;
        self.store
            .list(&format!("{}/{}", patient_id, category.dir_name()))
            .await
    }
}
