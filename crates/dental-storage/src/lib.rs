//! # 存储模块
//!
//! 负责上传文件、患者累积报告和录音的持久化。

pub mod intake;
pub mod recordings;
pub mod report;
pub mod storage;

pub use intake::FileIntake;
pub use recordings::RecordingStore;
pub use report::{PatientLocks, ReportAggregator};
pub use storage::{BlobStore, LocalBlobStore, MemoryBlobStore};
