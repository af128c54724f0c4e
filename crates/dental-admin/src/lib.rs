//! # 运维模块
//!
//! 配置加载与校验、日志初始化、Prometheus指标

pub mod config;
pub mod logging;
pub mod monitoring;

pub use config::{
    ConfigManager, ConfigValidator, DentalConfig, LogFormat, PatientBackendKind,
    SpeechBackendKind,
};
pub use logging::init_logging;
pub use monitoring::PipelineMonitor;
