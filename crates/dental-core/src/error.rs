//! 错误定义模块

use thiserror::Error;

/// 系统统一错误类型
#[derive(Error, Debug)]
pub enum DentalError {
    #[error("缺少必填字段: {0}")]
    MissingField(String),

    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("分析服务错误: {0}")]
    Analysis(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl DentalError {
    /// 返回不带分类前缀的错误文本，用于对外响应
    pub fn message(&self) -> String {
        match self {
            DentalError::MissingField(msg)
            | DentalError::InvalidInput(msg)
            | DentalError::Storage(msg)
            | DentalError::Analysis(msg)
            | DentalError::NotFound(msg)
            | DentalError::Config(msg)
            | DentalError::Internal(msg) => msg.clone(),
            DentalError::Serialization(e) => e.to_string(),
        }
    }
}

impl From<std::io::Error> for DentalError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => DentalError::NotFound(err.to_string()),
            _ => DentalError::Storage(err.to_string()),
        }
    }
}

/// 系统统一结果类型
pub type Result<T> = std::result::Result<T, DentalError>;
