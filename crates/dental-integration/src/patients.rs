//! 患者文档库
//!
//! 患者记录由外部文档库持有，这里只做创建、列表和单条读取。

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use dental_core::utils::validate_patient_id;
use dental_core::{DentalError, NewPatient, Patient, PatientStatus, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{build_http_client, status_error, transport_error};

/// "最近就诊"的天数窗口
pub const RECENT_VISIT_DAYS: i64 = 7;

/// 患者存储接口
#[async_trait]
pub trait PatientStore: Send + Sync {
    async fn create(&self, patient: NewPatient) -> Result<Patient>;

    async fn list(&self) -> Result<Vec<Patient>>;

    /// 不存在时返回 `NotFound`
    async fn get(&self, id: &str) -> Result<Patient>;
}

/// 由表单构造患者记录，缺省就诊日期为今天、状态为 Stable
pub fn build_patient(id: String, new: NewPatient, today: NaiveDate) -> Result<Patient> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(DentalError::MissingField("name".to_string()));
    }
    let last_visit = match new.last_visit.as_deref().map(str::trim) {
        Some(date) if !date.is_empty() => parse_visit_date(date)
            .ok_or_else(|| DentalError::InvalidInput(format!("Invalid lastVisit date: {}", date)))?,
        _ => today,
    };

    Ok(Patient {
        id,
        name: name.to_string(),
        age: new.age,
        last_visit: last_visit.format("%Y-%m-%d").to_string(),
        condition: new.condition.trim().to_string(),
        status: new.status.unwrap_or_default(),
        image: new.image.filter(|url| !url.is_empty()),
    })
}

/// 解析就诊日期，支持 `YYYY-MM-DD` 和 RFC 3339 时间戳
pub fn parse_visit_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive()))
}

/// 列表状态过滤
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Critical,
    Stable,
    Recent,
}

/// 患者列表查询条件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientFilter {
    /// 按姓名或病情做不区分大小写的包含匹配
    #[serde(default, rename = "q")]
    pub query: Option<String>,
    #[serde(default)]
    pub filter: StatusFilter,
}

impl PatientFilter {
    pub fn matches(&self, patient: &Patient, today: NaiveDate) -> bool {
        let matches_search = match self.query.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => {
                let q = q.to_lowercase();
                patient.name.to_lowercase().contains(&q)
                    || patient.condition.to_lowercase().contains(&q)
            }
            _ => true,
        };

        let matches_filter = match self.filter {
            StatusFilter::All => true,
            StatusFilter::Critical => patient.status == PatientStatus::Critical,
            StatusFilter::Stable => patient.status == PatientStatus::Stable,
            StatusFilter::Recent => parse_visit_date(&patient.last_visit)
                .map(|visit| visit >= today - ChronoDuration::days(RECENT_VISIT_DAYS))
                .unwrap_or(false),
        };

        matches_search && matches_filter
    }

    pub fn apply(&self, patients: Vec<Patient>, today: NaiveDate) -> Vec<Patient> {
        patients.into_iter().filter(|p| self.matches(p, today)).collect()
    }
}

/// 内存患者存储
#[derive(Default)]
pub struct MemoryPatientStore {
    patients: RwLock<Vec<Patient>>,
}

impl MemoryPatientStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_patients(patients: Vec<Patient>) -> Self {
        Self {
            patients: RwLock::new(patients),
        }
    }
}

#[async_trait]
impl PatientStore for MemoryPatientStore {
    async fn create(&self, patient: NewPatient) -> Result<Patient> {
        let patient = build_patient(Uuid::new_v4().simple().to_string(), patient, Utc::now().date_naive())?;
        self.patients.write().await.push(patient.clone());
        info!("Created patient {}", patient.id);
        Ok(patient)
    }

    async fn list(&self) -> Result<Vec<Patient>> {
        Ok(self.patients.read().await.clone())
    }

    async fn get(&self, id: &str) -> Result<Patient> {
        self.patients
            .read()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| DentalError::NotFound(format!("Patient not found: {}", id)))
    }
}

/// 外部文档库（REST集合接口）
///
/// - `GET {base}/{collection}` 返回文档数组
/// - `GET {base}/{collection}/{id}` 返回单个文档
/// - `POST {base}/{collection}` 创建文档并返回带 `id` 的结果
pub struct DocumentPatientStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
}

impl DocumentPatientStore {
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/{}", self.base_url, self.collection)
    }

    async fn fetch(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| transport_error("Document store", e))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DentalError::NotFound("Document not found".to_string()));
        }
        if !status.is_success() {
            return Err(status_error("Document store", status));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| DentalError::Analysis(format!("Document store returned invalid JSON: {}", e)))
    }
}

/// 将文档库返回的文档规整为患者记录
///
/// `lastVisit` 可能是日期字符串，也可能是 `{seconds, nanoseconds}` 形式的时间戳对象。
pub fn document_to_patient(mut doc: Value) -> Result<Patient> {
    if let Some(last_visit) = doc.get("lastVisit") {
        let seconds = last_visit
            .get("seconds")
            .or_else(|| last_visit.get("_seconds"))
            .and_then(|v| v.as_i64());
        if let Some(seconds) = seconds {
            let date = DateTime::<Utc>::from_timestamp(seconds, 0)
                .map(|dt| dt.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            doc["lastVisit"] = Value::String(date);
        }
    }
    serde_json::from_value(doc).map_err(|e| DentalError::Analysis(format!("Malformed patient document: {}", e)))
}

#[async_trait]
impl PatientStore for DocumentPatientStore {
    async fn create(&self, patient: NewPatient) -> Result<Patient> {
        // id 由文档库分配，先占位
        let draft = build_patient(String::new(), patient, Utc::now().date_naive())?;
        let mut body = serde_json::to_value(&draft)?;
        if let Value::Object(map) = &mut body {
            map.remove("id");
        }

        let created = self
            .fetch(self.client.post(self.collection_url()).json(&body))
            .await?;
        let id = created
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DentalError::Analysis("Document store did not return an id".to_string()))?;

        info!("Created patient document {}", id);
        Ok(Patient {
            id: id.to_string(),
            ..draft
        })
    }

    async fn list(&self) -> Result<Vec<Patient>> {
        let docs = self.fetch(self.client.get(self.collection_url())).await?;
        let docs = match docs {
            Value::Array(docs) => docs,
            Value::Object(mut map) => match map.remove("documents") {
                Some(Value::Array(docs)) => docs,
                _ => return Err(DentalError::Analysis("Unexpected patient list shape".to_string())),
            },
            _ => return Err(DentalError::Analysis("Unexpected patient list shape".to_string())),
        };

        let mut patients = Vec::with_capacity(docs.len());
        for doc in docs {
            match document_to_patient(doc) {
                Ok(patient) => patients.push(patient),
                Err(e) => warn!("Skipping patient document: {}", e),
            }
        }
        debug!("Loaded {} patients from document store", patients.len());
        Ok(patients)
    }

    async fn get(&self, id: &str) -> Result<Patient> {
        // ID 直接拼进路径，必须是单个安全的路径段
        let id = validate_patient_id(id)?;
        let mut url = reqwest::Url::parse(&self.collection_url())
            .map_err(|e| DentalError::Config(format!("Invalid document store URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| DentalError::Config(format!("Invalid document store URL: {}", self.base_url)))?
            .push(id);
        match self.fetch(self.client.get(url)).await {
            Ok(doc) => document_to_patient(doc),
            Err(DentalError::NotFound(_)) => Err(DentalError::NotFound(format!("Patient not found: {}", id))),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode, routing::get, Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn patient(id: &str, name: &str, condition: &str, status: PatientStatus, last_visit: &str) -> Patient {
        Patient {
            id: id.to_string(),
            name: name.to_string(),
            age: 30,
            last_visit: last_visit.to_string(),
            condition: condition.to_string(),
            status,
            image: None,
        }
    }

    fn roster() -> Vec<Patient> {
        vec![
            patient("1", "Sarah Johnson", "Root Canal Treatment", PatientStatus::Critical, "2024-03-15"),
            patient("2", "Michael Chen", "Regular Checkup", PatientStatus::Stable, "2024-03-10"),
            patient("3", "Emily Davis", "Dental Crown", PatientStatus::Critical, "2024-03-18"),
            patient("4", "David Wilson", "Teeth Cleaning", PatientStatus::Stable, "2024-03-12"),
        ]
    }

    fn ids(patients: &[Patient]) -> Vec<&str> {
        patients.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn test_filter_by_search_and_status() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 19).unwrap();

        let search = PatientFilter { query: Some("CROWN".to_string()), filter: StatusFilter::All };
        assert_eq!(ids(&search.apply(roster(), today)), vec!["3"]);

        let critical = PatientFilter { query: None, filter: StatusFilter::Critical };
        assert_eq!(ids(&critical.apply(roster(), today)), vec!["1", "3"]);

        let stable_named = PatientFilter { query: Some("chen".to_string()), filter: StatusFilter::Stable };
        assert_eq!(ids(&stable_named.apply(roster(), today)), vec!["2"]);
    }

    #[test]
    fn test_recent_filter_uses_seven_day_window() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 19).unwrap();
        let recent = PatientFilter { query: None, filter: StatusFilter::Recent };
        assert_eq!(ids(&recent.apply(roster(), today)), vec!["1", "3", "4"]);
    }

    #[test]
    fn test_build_patient_defaults() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 19).unwrap();
        let new = NewPatient {
            name: " Ada ".to_string(),
            age: 40,
            last_visit: None,
            condition: "Filling".to_string(),
            status: None,
            image: Some(String::new()),
        };
        let built = build_patient("x".to_string(), new, today).unwrap();
        assert_eq!(built.name, "Ada");
        assert_eq!(built.last_visit, "2024-03-19");
        assert_eq!(built.status, PatientStatus::Stable);
        assert!(built.image.is_none());

        let nameless = NewPatient {
            name: "  ".to_string(),
            age: 1,
            last_visit: None,
            condition: String::new(),
            status: None,
            image: None,
        };
        assert!(matches!(build_patient("y".to_string(), nameless, today), Err(DentalError::MissingField(_))));
    }

    #[test]
    fn test_document_timestamp_normalized() {
        let doc = json!({
            "id": "abc",
            "name": "Sarah",
            "age": 34,
            "lastVisit": {"seconds": 1710460800, "nanoseconds": 0},
            "condition": "Crown",
            "status": "Critical"
        });
        let patient = document_to_patient(doc).unwrap();
        assert_eq!(patient.last_visit, "2024-03-15");
    }

    #[tokio::test]
    async fn test_memory_store_create_list_get() {
        let store = MemoryPatientStore::new();
        let created = store
            .create(NewPatient {
                name: "Ada".to_string(),
                age: 40,
                last_visit: Some("2024-03-01".to_string()),
                condition: "Filling".to_string(),
                status: Some(PatientStatus::Critical),
                image: None,
            })
            .await
            .unwrap();

        assert_eq!(store.list().await.unwrap().len(), 1);
        assert_eq!(store.get(&created.id).await.unwrap(), created);
        assert!(matches!(store.get("missing").await, Err(DentalError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_document_store_list_and_get() {
        let router = Router::new()
            .route(
                "/users",
                get(|| async {
                    Json(json!([
                        {"id": "a", "name": "Sarah", "age": 34, "lastVisit": "2024-03-15", "condition": "Crown", "status": "Critical"},
                        {"id": "b", "name": "broken"}
                    ]))
                }),
            )
            .route(
                "/users/:id",
                get(|Path(id): Path<String>| async move {
                    if id == "a" {
                        Ok(Json(json!({"id": "a", "name": "Sarah", "age": 34, "lastVisit": "2024-03-15", "condition": "Crown"})))
                    } else {
                        Err(StatusCode::NOT_FOUND)
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let store = DocumentPatientStore::new(format!("http://{}/", addr), "users", Duration::from_secs(5)).unwrap();
        let patients = store.list().await.unwrap();
        assert_eq!(ids(&patients), vec!["a"]);
        assert_eq!(store.get("a").await.unwrap().status, PatientStatus::Stable);
        assert!(matches!(store.get("zzz").await, Err(DentalError::NotFound(_))));
        // 查询字符等特殊字符被编码进路径段
        assert!(matches!(store.get("a?x=1").await, Err(DentalError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_document_store_rejects_path_like_ids() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().fallback(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Json(json!({"id": "admin", "name": "Root", "age": 1, "condition": ""}))
            }
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let store = DocumentPatientStore::new(format!("http://{}/db", addr), "users", Duration::from_secs(5)).unwrap();
        for id in ["../admin/secrets", "a/b", "..", ".env", "a\\b"] {
            assert!(
                matches!(store.get(id).await, Err(DentalError::InvalidInput(_))),
                "id {:?} should be rejected",
                id
            );
        }
        assert!(matches!(store.get("").await, Err(DentalError::MissingField(_))));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
