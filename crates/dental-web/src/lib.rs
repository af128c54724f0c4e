//! # Web服务模块
//!
//! 对外HTTP接口：文件上传、患者报告、症状分析、语音转写、反馈与患者目录

pub mod audio;
pub mod error;
pub mod handlers;
pub mod metered;
pub mod server;
pub mod state;
pub mod uploads;

pub use error::{ApiError, ApiResult};
pub use server::{create_app, WebServer};
pub use state::{AppState, Services};
