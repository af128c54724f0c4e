//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{utils, Result};

/// 报告固定免责声明
pub const REPORT_DISCLAIMER: &str = "This report is generated for informational purposes only. Consult a licensed dentist for a comprehensive diagnosis and treatment plan.";

/// 转写结果为空时返回的文本
pub const NO_SPEECH_DETECTED: &str = "No speech detected.";

/// 患者基本信息（由外部文档库持有）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub name: String,
    pub age: u32,
    pub last_visit: String,              // YYYY-MM-DD
    pub condition: String,
    #[serde(default)]
    pub status: PatientStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// 患者状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum PatientStatus {
    Critical,
    #[default]
    Stable,
}

/// 新建患者表单
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPatient {
    pub name: String,
    pub age: u32,
    #[serde(default)]
    pub last_visit: Option<String>,
    pub condition: String,
    #[serde(default)]
    pub status: Option<PatientStatus>,
    #[serde(default)]
    pub image: Option<String>,
}

/// 上传文件分类
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum FileCategory {
    MedicalReport,
    Xray,
}

impl FileCategory {
    /// 患者目录下的子目录名
    pub fn dir_name(&self) -> &'static str {
        match self {
            FileCategory::MedicalReport => "medical-reports",
            FileCategory::Xray => "xrays",
        }
    }

    /// 转发给分析服务时的默认MIME类型
    pub fn default_content_type(&self) -> &'static str {
        match self {
            FileCategory::MedicalReport => "application/pdf",
            FileCategory::Xray => "image/png",
        }
    }
}

impl std::fmt::Display for FileCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileCategory::MedicalReport => write!(f, "medical-report"),
            FileCategory::Xray => write!(f, "xray"),
        }
    }
}

impl std::str::FromStr for FileCategory {
    type Err = crate::DentalError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "medical-report" | "medical-reports" => Ok(FileCategory::MedicalReport),
            "xray" | "xrays" => Ok(FileCategory::Xray),
            other => Err(crate::DentalError::InvalidInput(format!(
                "Unknown file category: {}",
                other
            ))),
        }
    }
}

/// 客户端上传的原始文件
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// 已落盘的上传文件，写入后不可变
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredFile {
    pub patient_id: String,
    pub category: FileCategory,
    pub original_name: String,
    #[serde(with = "utils::iso8601")]
    pub created_at: DateTime<Utc>,
    pub path: String,                    // patientId/category/timestamp-filename
    pub size: u64,
    pub sha256: String,
}

/// 上传处理结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub file_path: String,
    pub analysis_text: String,
}

/// 报告中的患者标识块
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportPatient {
    pub id: String,
    #[serde(with = "utils::iso8601")]
    pub date: DateTime<Utc>,
}

/// 病历报告摘要条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicalReportEntry {
    pub summary: Vec<String>,
    #[serde(with = "utils::iso8601")]
    pub date: DateTime<Utc>,
}

/// X光分析条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct XrayAnalysisEntry {
    pub detected_diseases: Vec<String>,
    #[serde(with = "utils::iso8601")]
    pub date: DateTime<Utc>,
}

/// 病历摘要序列字段
pub const MEDICAL_REPORTS: &str = "medical_reports";
/// X光分析序列字段
pub const XRAY_ANALYSES: &str = "xray_analyses";

/// 患者累积分析报告（每个患者一份 report.json）
///
/// 以JSON对象原样保存：已有条目（包括格式不规范的条目）和未知字段都保留。
/// 两个序列只追加不删除；缺失或为 null 的序列按空序列处理，
/// 其他非数组值作为序列的第一个元素保留。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct AnalysisReport(Map<String, Value>);

impl AnalysisReport {
    /// 空报告，两个序列均为空
    pub fn new() -> Self {
        let mut report = Self::default();
        report.normalize();
        report
    }

    /// 从已解析的JSON构建报告，根节点不是对象时返回 `None`
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => {
                let mut report = Self(map);
                report.normalize();
                Some(report)
            }
            _ => None,
        }
    }

    pub fn medical_reports(&self) -> &[Value] {
        self.sequence(MEDICAL_REPORTS)
    }

    pub fn xray_analyses(&self) -> &[Value] {
        self.sequence(XRAY_ANALYSES)
    }

    /// 报告中的患者标识块
    pub fn patient(&self) -> Option<&Value> {
        self.0.get("patient")
    }

    /// 追加病历摘要，文本为空时跳过
    pub fn push_medical_report(&mut self, text: &str, now: DateTime<Utc>) -> Result<bool> {
        if text.is_empty() {
            return Ok(false);
        }
        let entry = serde_json::to_value(MedicalReportEntry {
            summary: utils::summary_lines(text),
            date: now,
        })?;
        self.append(MEDICAL_REPORTS, entry);
        Ok(true)
    }

    /// 追加X光检出结果，列表为空时跳过
    pub fn push_xray_analysis(&mut self, diseases: &[String], now: DateTime<Utc>) -> Result<bool> {
        if diseases.is_empty() {
            return Ok(false);
        }
        let entry = serde_json::to_value(XrayAnalysisEntry {
            detected_diseases: diseases.to_vec(),
            date: now,
        })?;
        self.append(XRAY_ANALYSES, entry);
        Ok(true)
    }

    /// 刷新患者块并补上免责声明
    pub fn stamp(&mut self, patient_id: &str, now: DateTime<Utc>) -> Result<()> {
        let patient = serde_json::to_value(ReportPatient {
            id: patient_id.to_string(),
            date: now,
        })?;
        self.0.insert("patient".to_string(), patient);
        self.0.insert(
            "disclaimer".to_string(),
            Value::String(REPORT_DISCLAIMER.to_string()),
        );
        self.normalize();
        Ok(())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    fn sequence(&self, key: &str) -> &[Value] {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn normalize(&mut self) {
        for key in [MEDICAL_REPORTS, XRAY_ANALYSES] {
            let slot = self.0.entry(key).or_insert(Value::Null);
            if !slot.is_array() {
                let kept = std::mem::take(slot);
                *slot = Value::Array(if kept.is_null() { Vec::new() } else { vec![kept] });
            }
        }
    }

    fn append(&mut self, key: &str, entry: Value) {
        self.normalize();
        if let Some(Value::Array(items)) = self.0.get_mut(key) {
            items.push(entry);
        }
    }
}

/// 症状分析结果，原样保留上游返回的JSON
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct AnalysisResult(pub serde_json::Value);

impl AnalysisResult {
    pub fn detected_symptoms(&self) -> Vec<String> {
        self.0
            .get("detected_symptoms")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn treatment_suggestions(&self) -> Option<&str> {
        self.0.get("treatment_suggestions").and_then(|v| v.as_str())
    }

    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }
}

/// 用户提交的反馈请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedbackEntry {
    #[serde(default)]
    pub original_text: Option<String>,
    #[serde(default)]
    pub correct_symptom: Option<String>,
    #[serde(default)]
    pub correct_treatment: Option<String>,
}

/// 校验通过后转发给外部的反馈记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackRecord {
    pub original_text: Option<String>,
    pub correct_symptom: String,
    pub correct_treatment: String,
}

/// 反馈确认
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackAck {
    pub message: String,
}

/// 语音转写结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcription {
    pub transcript: String,
    pub audio_url: String,
    pub recording_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_report_defaults_missing_and_null_sequences() {
        let report = AnalysisReport::from_value(serde_json::json!({"medical_reports": null})).unwrap();
        assert!(report.medical_reports().is_empty());
        assert!(report.xray_analyses().is_empty());
        assert!(report.patient().is_none());

        assert!(AnalysisReport::from_value(serde_json::json!([1, 2])).is_none());
    }

    #[test]
    fn test_report_push_skips_empty_inputs() {
        let mut report = AnalysisReport::new();
        assert!(!report.push_medical_report("", at(0)).unwrap());
        assert!(!report.push_xray_analysis(&[], at(0)).unwrap());
        assert!(report.medical_reports().is_empty());
        assert!(report.xray_analyses().is_empty());
    }

    #[test]
    fn test_report_serialized_shape() {
        let mut report = AnalysisReport::new();
        report.push_xray_analysis(&["caries".to_string()], at(1_700_000_000)).unwrap();
        report.stamp("p1", at(1_700_000_000)).unwrap();

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["patient"]["id"], "p1");
        assert_eq!(value["patient"]["date"], "2023-11-14T22:13:20.000Z");
        assert_eq!(value["medical_reports"], serde_json::json!([]));
        assert_eq!(value["xray_analyses"][0]["detected_diseases"][0], "caries");
        assert_eq!(value["disclaimer"], REPORT_DISCLAIMER);
    }

    #[test]
    fn test_report_keeps_out_of_schema_content() {
        let mut report = AnalysisReport::from_value(serde_json::json!({
            "medical_reports": [
                {"summary": ["a"], "date": "2024-03-15T10:00:00.000Z", "source": "scan"},
                {"summary": ["b"], "date": "2024-03-16"}
            ],
            "xray_analyses": {"detected_diseases": ["caries"]},
            "notes": "referred by Dr. Lee"
        }))
        .unwrap();

        report.push_medical_report("c", at(1_700_000_000)).unwrap();
        report.stamp("p1", at(1_700_000_000)).unwrap();

        let value = report.into_value();
        assert_eq!(value["medical_reports"].as_array().unwrap().len(), 3);
        assert_eq!(value["medical_reports"][0]["source"], "scan");
        assert_eq!(value["medical_reports"][1]["date"], "2024-03-16");
        assert_eq!(value["medical_reports"][2]["summary"], serde_json::json!(["c"]));
        assert_eq!(value["xray_analyses"][0]["detected_diseases"], serde_json::json!(["caries"]));
        assert_eq!(value["notes"], "referred by Dr. Lee");
    }

    #[test]
    fn test_file_category_parsing() {
        assert_eq!("xray".parse::<FileCategory>().unwrap(), FileCategory::Xray);
        assert_eq!(
            "medical-report".parse::<FileCategory>().unwrap(),
            FileCategory::MedicalReport
        );
        assert!("mri".parse::<FileCategory>().is_err());
        assert_eq!(FileCategory::MedicalReport.dir_name(), "medical-reports");
    }

    #[test]
    fn test_analysis_result_accessors() {
        let result = AnalysisResult(serde_json::json!({
            "detected_symptoms": ["toothache", 3, "swelling"],
            "treatment_suggestions": "Root canal"
        }));
        assert_eq!(result.detected_symptoms(), vec!["toothache", "swelling"]);
        assert_eq!(result.treatment_suggestions(), Some("Root canal"));

        let odd = AnalysisResult(serde_json::json!([1, 2]));
        assert!(odd.detected_symptoms().is_empty());
        assert!(odd.treatment_suggestions().is_none());
    }

    #[test]
    fn test_patient_wire_format() {
        let patient: Patient = serde_json::from_str(
            r#"{"id":"a1","name":"Sarah Johnson","age":34,"lastVisit":"2024-03-15","condition":"Root Canal Treatment","status":"Critical"}"#,
        )
        .unwrap();
        assert_eq!(patient.status, PatientStatus::Critical);
        assert!(patient.image.is_none());
        let value = serde_json::to_value(&patient).unwrap();
        assert_eq!(value["lastVisit"], "2024-03-15");
    }
}
