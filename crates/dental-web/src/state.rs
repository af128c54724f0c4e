//! 应用状态与组件装配

use dental_admin::{DentalConfig, PatientBackendKind, PipelineMonitor, SpeechBackendKind};
use dental_core::{DentalError, Result};
use dental_integration::{
    AnalysisEndpoints, AnalysisGateway, DocumentPatientStore, FeedbackClient,
    HttpAnalysisGateway, HttpFeedbackClient, HttpProxyTranscriber, MemoryPatientStore,
    PatientStore, RecognitionSettings, RecognitionTranscriber, TranscriptionBackend,
};
use dental_storage::{BlobStore, FileIntake, LocalBlobStore, RecordingStore, ReportAggregator};
use dental_workflow::{AnalysisOrchestrator, AudioBridge, FeedbackRelay, UploadPipeline};
use std::sync::Arc;
use tracing::info;

use crate::metered::MeteredGateway;

/// 请求处理器共享的状态
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<UploadPipeline>,
    pub orchestrator: Arc<AnalysisOrchestrator>,
    pub reports: Arc<ReportAggregator>,
    pub feedback: Arc<FeedbackRelay>,
    pub audio: Arc<AudioBridge>,
    pub patients: Arc<dyn PatientStore>,
    pub monitor: Arc<PipelineMonitor>,
}

/// 外部协作方，装配时注入
pub struct Services {
    pub uploads: Arc<dyn BlobStore>,
    pub recordings: Arc<dyn BlobStore>,
    pub gateway: Arc<dyn AnalysisGateway>,
    pub transcriber: Arc<dyn TranscriptionBackend>,
    pub feedback: Arc<dyn FeedbackClient>,
    pub patients: Arc<dyn PatientStore>,
    /// 录音回放URL前缀
    pub public_base_url: String,
}

impl AppState {
    /// 用给定协作方装配全部工作流组件
    pub fn assemble(services: Services, monitor: Arc<PipelineMonitor>) -> Self {
        let gateway: Arc<dyn AnalysisGateway> =
            Arc::new(MeteredGateway::new(services.gateway, monitor.clone()));

        let intake = Arc::new(FileIntake::new(services.uploads.clone()));
        let reports = Arc::new(ReportAggregator::new(services.uploads));
        let recordings = Arc::new(RecordingStore::new(services.recordings));

        Self {
            pipeline: Arc::new(UploadPipeline::new(intake, gateway.clone(), reports.clone())),
            orchestrator: Arc::new(AnalysisOrchestrator::new(reports.clone(), gateway)),
            reports,
            feedback: Arc::new(FeedbackRelay::new(services.feedback)),
            audio: Arc::new(AudioBridge::new(
                recordings,
                services.transcriber,
                services.public_base_url,
            )),
            patients: services.patients,
            monitor,
        }
    }

    /// 按配置创建本地存储与HTTP客户端
    pub fn from_config(config: &DentalConfig, monitor: Arc<PipelineMonitor>) -> Result<Self> {
        let timeout = config.endpoints.timeout();

        let gateway = HttpAnalysisGateway::new(
            AnalysisEndpoints {
                extract_text_url: config.endpoints.extract_text_url.clone(),
                xray_detect_url: config.endpoints.xray_detect_url.clone(),
                symptom_analysis_url: config.endpoints.symptom_analysis_url.clone(),
            },
            timeout,
        )?;

        let speech = &config.speech;
        let transcriber: Arc<dyn TranscriptionBackend> = match speech.backend {
            SpeechBackendKind::Proxy => Arc::new(HttpProxyTranscriber::new(&speech.proxy_url, timeout)?),
            SpeechBackendKind::Recognition => {
                let url = speech.recognition_url.as_deref().ok_or_else(|| {
                    DentalError::Config("speech.recognition_url is required".to_string())
                })?;
                Arc::new(RecognitionTranscriber::new(
                    url,
                    speech.api_key.clone(),
                    RecognitionSettings {
                        encoding: speech.encoding.clone(),
                        sample_rate_hertz: speech.sample_rate_hertz,
                        language_code: speech.language_code.clone(),
                    },
                    timeout,
                )?)
            }
        };

        let patients: Arc<dyn PatientStore> = match config.patients.backend {
            PatientBackendKind::Memory => Arc::new(MemoryPatientStore::new()),
            PatientBackendKind::Document => {
                let url = config.patients.document_url.as_deref().ok_or_else(|| {
                    DentalError::Config("patients.document_url is required".to_string())
                })?;
                Arc::new(DocumentPatientStore::new(url, &config.patients.collection, timeout)?)
            }
        };

        info!(
            "Using {} speech backend and {:?} patient store",
            transcriber.name(),
            config.patients.backend
        );

        Ok(Self::assemble(
            Services {
                uploads: Arc::new(LocalBlobStore::new(&config.storage.uploads_dir)),
                recordings: Arc::new(LocalBlobStore::new(&config.storage.recordings_dir)),
                gateway: Arc::new(gateway),
                transcriber,
                feedback: Arc::new(HttpFeedbackClient::new(&config.endpoints.feedback_url, timeout)?),
                patients,
                public_base_url: config.server.public_base_url.clone(),
            },
            monitor,
        ))
    }
}
