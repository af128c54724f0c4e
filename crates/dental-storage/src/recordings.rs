//! 录音存储
//!
//! 每段录音分配独立ID，按 `<id>.wav` 保存，并发录音互不覆盖。

use dental_core::{DentalError, Result};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::storage::BlobStore;

/// 录音文件扩展名
pub const RECORDING_EXTENSION: &str = "wav";

/// 录音存储
pub struct RecordingStore {
    store: Arc<dyn BlobStore>,
}

impl RecordingStore {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// 录音ID对应的文件名
    pub fn file_name(recording_id: &Uuid) -> String {
        format!("{}.{}", recording_id, RECORDING_EXTENSION)
    }

    /// 保存一段录音并返回新分配的ID
    pub async fn save(&self, audio: &[u8]) -> Result<Uuid> {
        let recording_id = Uuid::new_v4();
        let location = self.store.put(&Self::file_name(&recording_id), audio).await?;
        debug!("Audio saved: {} (Size: {} bytes)", location, audio.len());
        Ok(recording_id)
    }

    /// 按ID读取录音
    pub async fn load(&self, recording_id: &Uuid) -> Result<Vec<u8>> {
        match self.store.get(&Self::file_name(recording_id)).await {
            Err(DentalError::NotFound(_)) => Err(DentalError::NotFound(format!(
                "Audio file not found: {}",
                recording_id
            ))),
            other => other,
        }
    }

    /// 删除录音，返回录音此前是否存在
    pub async fn remove(&self, recording_id: &Uuid) -> Result<bool> {
        let removed = self.store.delete(&Self::file_name(recording_id)).await?;
        if removed {
            debug!("Audio removed: {}", recording_id);
        }
        Ok(removed)
    }

    /// 按文件名（`<id>.wav`）读取录音，文件名不合法时视为不存在
    pub async fn load_by_file_name(&self, file_name: &str) -> Result<Vec<u8>> {
        let recording_id = file_name
            .strip_suffix(&format!(".{}", RECORDING_EXTENSION))
            .and_then(|stem| Uuid::parse_str(stem).ok())
            .ok_or_else(|| DentalError::NotFound(format!("Audio file not found: {}", file_name)))?;
        self.load(&recording_id).await
    }
}
