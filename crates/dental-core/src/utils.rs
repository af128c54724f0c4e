//! 通用工具函数

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{DentalError, Result};

/// 患者ID最大长度
pub const MAX_PATIENT_ID_LEN: usize = 128;

/// ISO-8601 时间戳（毫秒精度，UTC，`Z` 结尾）
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 文件名前缀用的时间戳，冒号和点替换为连字符
pub fn file_timestamp(at: DateTime<Utc>) -> String {
    iso_timestamp(at).replace([':', '.'], "-")
}

/// 将文本拆分为非空行
pub fn summary_lines(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// 校验患者ID可以安全地作为单级目录名
pub fn validate_patient_id(patient_id: &str) -> Result<&str> {
    if patient_id.is_empty() {
        return Err(DentalError::MissingField("patientId".to_string()));
    }
    let unsafe_id = patient_id.len() > MAX_PATIENT_ID_LEN
        || patient_id == "."
        || patient_id.starts_with('.')
        || patient_id
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control());
    if unsafe_id {
        return Err(DentalError::InvalidInput(format!(
            "Invalid patient id: {}",
            patient_id
        )));
    }
    Ok(patient_id)
}

/// 只保留原始文件名的最后一段，并替换不安全字符
pub fn sanitize_file_name(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|') {
                '_'
            } else {
                c
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `DateTime<Utc>` 的 ISO-8601 序列化（毫秒精度）
pub mod iso8601 {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::iso_timestamp(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
