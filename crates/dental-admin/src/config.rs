//! 配置管理
//!
//! 默认值 → TOML文件 → `DENTAL__` 环境变量，逐层覆盖；支持校验、保存与重新加载

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info};

/// 环境变量前缀
pub const ENV_PREFIX: &str = "DENTAL";
/// 环境变量层级分隔符
pub const ENV_SEPARATOR: &str = "__";
/// 请求体下限，不得小于最小录音长度
pub const MIN_BODY_LIMIT: usize = 1000;

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    /// 配置数据
    config: Arc<RwLock<DentalConfig>>,
    /// 配置文件路径
    config_path: Option<PathBuf>,
    /// 配置验证器
    validator: ConfigValidator,
}

/// 完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DentalConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 存储配置
    pub storage: StorageConfig,
    /// 外部分析服务地址
    pub endpoints: EndpointsConfig,
    /// 语音转写配置
    pub speech: SpeechConfig,
    /// 患者目录配置
    pub patients: PatientsConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 对外访问地址，用于拼接录音回放URL
    pub public_base_url: String,
    /// 请求体上限（字节）
    pub body_limit_bytes: usize,
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// 上传文件与报告根目录
    pub uploads_dir: String,
    /// 录音根目录
    pub recordings_dir: String,
}

/// 外部服务地址
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EndpointsConfig {
    pub extract_text_url: String,
    pub xray_detect_url: String,
    pub symptom_analysis_url: String,
    pub feedback_url: String,
    /// 请求超时（秒）
    pub timeout_secs: u64,
}

/// 语音转写后端
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SpeechBackendKind {
    /// 通用JSON代理
    Proxy,
    /// 语音识别服务
    Recognition,
}

/// 语音转写配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpeechConfig {
    pub backend: SpeechBackendKind,
    pub proxy_url: String,
    pub recognition_url: Option<String>,
    pub api_key: Option<String>,
    pub language_code: String,
    pub encoding: String,
    pub sample_rate_hertz: Option<u32>,
}

/// 患者目录后端
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PatientBackendKind {
    Memory,
    Document,
}

/// 患者目录配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PatientsConfig {
    pub backend: PatientBackendKind,
    /// 文档数据库地址
    pub document_url: Option<String>,
    /// 集合名称
    pub collection: String,
}

/// 日志格式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 日志格式
    pub format: LogFormat,
}

impl EndpointsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    /// 验证规则
    validation_rules: Vec<ValidationRule>,
}

/// 验证规则
#[derive(Debug)]
struct ValidationRule {
    /// 字段路径
    field_path: &'static str,
    /// 验证函数
    validator: fn(&DentalConfig) -> Result<()>,
    /// 错误消息
    error_message: &'static str,
}

impl ConfigManager {
    /// 创建配置管理器；未给出文件时只使用默认值与环境变量
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let validator = ConfigValidator::new();
        let config = Self::load_config(config_path)?;
        validator.validate(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path: config_path.map(Path::to_path_buf),
            validator,
        })
    }

    /// 逐层加载配置
    fn load_config(config_path: Option<&Path>) -> Result<DentalConfig> {
        let defaults = Config::try_from(&DentalConfig::default())
            .context("Failed to build default configuration")?;

        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration sources")?;

        let config: DentalConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(config)
    }

    /// 配置来源说明
    pub fn source(&self) -> String {
        match &self.config_path {
            Some(path) => path.display().to_string(),
            None => "defaults and environment".to_string(),
        }
    }

    /// 记录配置来源；加载发生在日志初始化之前，由调用方在订阅器就绪后调用
    pub fn log_loaded(&self) {
        info!("Configuration loaded successfully from: {}", self.source());
    }

    /// 获取配置
    pub async fn get_config(&self) -> DentalConfig {
        self.config.read().await.clone()
    }

    /// 校验后替换当前配置
    pub async fn update_config(&self, new_config: DentalConfig) -> Result<()> {
        self.validator.validate(&new_config)?;

        {
            let mut config = self.config.write().await;
            *config = new_config;
        }

        info!("Configuration updated successfully");
        Ok(())
    }

    /// 保存配置到文件
    pub async fn save_config(&self) -> Result<()> {
        let path = self
            .config_path
            .as_ref()
            .context("No configuration file to save to")?;

        let config = self.config.read().await;
        let config_str =
            toml::to_string_pretty(&*config).context("Failed to serialize configuration")?;

        tokio::fs::write(path, config_str)
            .await
            .context("Failed to write configuration file")?;

        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    /// 重新加载配置
    pub async fn reload_config(&self) -> Result<()> {
        let new_config = Self::load_config(self.config_path.as_deref())?;
        self.update_config(new_config).await?;
        self.log_loaded();
        Ok(())
    }
}

impl ConfigValidator {
    /// 创建配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "server.port",
                validator: |config| {
                    if config.server.port == 0 {
                        anyhow::bail!("Server port cannot be 0");
                    }
                    Ok(())
                },
                error_message: "Invalid server port",
            },
            ValidationRule {
                field_path: "server.body_limit_bytes",
                validator: |config| {
                    if config.server.body_limit_bytes < MIN_BODY_LIMIT {
                        anyhow::bail!(
                            "Body limit {} is below {} bytes",
                            config.server.body_limit_bytes,
                            MIN_BODY_LIMIT
                        );
                    }
                    Ok(())
                },
                error_message: "Invalid body limit",
            },
            ValidationRule {
                field_path: "storage",
                validator: |config| {
                    if config.storage.uploads_dir.trim().is_empty() {
                        anyhow::bail!("Uploads directory cannot be empty");
                    }
                    if config.storage.recordings_dir.trim().is_empty() {
                        anyhow::bail!("Recordings directory cannot be empty");
                    }
                    Ok(())
                },
                error_message: "Invalid storage directories",
            },
            ValidationRule {
                field_path: "endpoints",
                validator: |config| {
                    let endpoints = &config.endpoints;
                    for url in [
                        &endpoints.extract_text_url,
                        &endpoints.xray_detect_url,
                        &endpoints.symptom_analysis_url,
                        &endpoints.feedback_url,
                        &config.server.public_base_url,
                    ] {
                        check_url(url)?;
                    }
                    if endpoints.timeout_secs == 0 {
                        anyhow::bail!("Request timeout cannot be 0");
                    }
                    Ok(())
                },
                error_message: "Invalid endpoint configuration",
            },
            ValidationRule {
                field_path: "speech",
                validator: |config| match config.speech.backend {
                    SpeechBackendKind::Proxy => check_url(&config.speech.proxy_url),
                    SpeechBackendKind::Recognition => match &config.speech.recognition_url {
                        Some(url) => check_url(url),
                        None => anyhow::bail!("Recognition backend requires recognition_url"),
                    },
                },
                error_message: "Invalid speech configuration",
            },
            ValidationRule {
                field_path: "patients",
                validator: |config| match (config.patients.backend, &config.patients.document_url) {
                    (PatientBackendKind::Memory, _) => Ok(()),
                    (PatientBackendKind::Document, Some(url)) => check_url(url),
                    (PatientBackendKind::Document, None) => {
                        anyhow::bail!("Document backend requires document_url")
                    }
                },
                error_message: "Invalid patient store configuration",
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &DentalConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(anyhow::anyhow!("{}: {}", rule.error_message, e));
            }
        }

        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn check_url(url: &str) -> Result<()> {
    reqwest::Url::parse(url).with_context(|| format!("Unparsable URL: {}", url))?;
    Ok(())
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            public_base_url: "http://localhost:5000".to_string(),
            body_limit_bytes: 50 * 1024 * 1024,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: "./uploads".to_string(),
            recordings_dir: "./recordings".to_string(),
        }
    }
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            extract_text_url: "http://localhost:8001/extract_text".to_string(),
            xray_detect_url: "http://localhost:8002/detect".to_string(),
            symptom_analysis_url: "http://localhost:8003/detect-symptoms".to_string(),
            feedback_url: "http://localhost:8003/feedback".to_string(),
            timeout_secs: 60,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            backend: SpeechBackendKind::Proxy,
            proxy_url: "http://localhost:5001/api/speech-to-text".to_string(),
            recognition_url: None,
            api_key: None,
            language_code: "en-US".to_string(),
            encoding: "WEBM_OPUS".to_string(),
            sample_rate_hertz: Some(48000),
        }
    }
}

impl Default for PatientsConfig {
    fn default() -> Self {
        Self {
            backend: PatientBackendKind::Memory,
            document_url: None,
            collection: "users".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
