//! # 工作流模块
//!
//! 串联存储与外部服务，提供面向请求的完整流程：
//! - 上传流水线：文件接收 → 外部分析 → 报告累积
//! - 分析编排：读取患者报告并提交症状分析
//! - 反馈转发：校验后转发用户修正
//! - 音频桥接：解码录音、按ID保存并转写

pub mod audio;
pub mod feedback;
pub mod orchestrator;
pub mod pipeline;

pub use audio::{decode_audio, AudioBridge, MIN_AUDIO_BYTES, RECORDINGS_ROUTE};
pub use feedback::FeedbackRelay;
pub use orchestrator::AnalysisOrchestrator;
pub use pipeline::UploadPipeline;
