//! 日志初始化

use crate::config::{LogFormat, LoggingConfig};
use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// 解析日志过滤器：`RUST_LOG` 优先，其次命令行级别，最后配置级别
pub fn resolve_filter(config: &LoggingConfig, override_level: Option<&str>) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let level = override_level.unwrap_or(&config.level);
    EnvFilter::try_new(level).with_context(|| format!("Invalid log level: {}", level))
}

/// 初始化全局日志订阅器，进程内只应调用一次
pub fn init_logging(config: &LoggingConfig, override_level: Option<&str>) -> Result<()> {
    let filter = resolve_filter(config, override_level)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialise logging: {}", e))
}
