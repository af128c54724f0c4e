//! 反馈转发

use dental_core::{DentalError, FeedbackAck, FeedbackEntry, FeedbackRecord, Result};
use dental_integration::FeedbackClient;
use std::sync::Arc;
use tracing::{error, info};

/// 反馈成功时的确认文本
pub const FEEDBACK_ACCEPTED: &str = "Feedback submitted successfully!";

/// 反馈转发器
pub struct FeedbackRelay {
    client: Arc<dyn FeedbackClient>,
}

impl FeedbackRelay {
    pub fn new(client: Arc<dyn FeedbackClient>) -> Self {
        Self { client }
    }

    /// 校验必填字段，空字符串视为缺失
    pub fn validate(entry: FeedbackEntry) -> Result<FeedbackRecord> {
        fn required(value: Option<String>, field: &str) -> Result<String> {
            value
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| DentalError::MissingField(field.to_string()))
        }

        Ok(FeedbackRecord {
            correct_symptom: required(entry.correct_symptom, "correct_symptom")?,
            correct_treatment: required(entry.correct_treatment, "correct_treatment")?,
            original_text: entry.original_text,
        })
    }

    /// 校验并转发反馈
    pub async fn submit(&self, entry: FeedbackEntry) -> Result<FeedbackAck> {
        let record = Self::validate(entry)?;

        self.client.send(&record).await.map_err(|e| {
            error!("Feedback submission error: {}", e);
            e
        })?;

        info!("Feedback recorded for symptom '{}'", record.correct_symptom);
        Ok(FeedbackAck {
            message: FEEDBACK_ACCEPTED.to_string(),
        })
    }
}
