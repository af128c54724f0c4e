//! 牙科诊所AI助手服务器主程序

use anyhow::Context;
use clap::Parser;
use dental_admin::{init_logging, ConfigManager, PipelineMonitor};
use dental_web::{AppState, WebServer};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// 服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "dental-server")]
#[command(about = "牙科诊所AI助手后端服务")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 监听主机
    #[arg(long)]
    host: Option<String>,

    /// 服务器端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 上传文件存储目录
    #[arg(short, long)]
    uploads_dir: Option<String>,

    /// 日志级别
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 加载配置，命令行参数优先
    let manager = ConfigManager::new(args.config.as_deref())?;
    let mut config = manager.get_config().await;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(uploads_dir) = args.uploads_dir {
        config.storage.uploads_dir = uploads_dir;
    }

    // 初始化日志，之后配置相关的日志才可见
    init_logging(&config.logging, args.log_level.as_deref())?;
    manager.log_loaded();
    manager.update_config(config.clone()).await?;

    info!("启动牙科AI助手服务器...");
    info!("  监听地址: {}:{}", config.server.host, config.server.port);
    info!("  上传目录: {}", config.storage.uploads_dir);
    info!("  录音目录: {}", config.storage.recordings_dir);

    let monitor = Arc::new(PipelineMonitor::new()?);
    let state = AppState::from_config(&config, monitor)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address: {}:{}", config.server.host, config.server.port))?;

    let server = WebServer::new(addr, state, config.server.body_limit_bytes);
    if let Err(e) = server.run().await {
        error!("服务器启动失败: {}", e);
        return Err(e);
    }

    Ok(())
}
