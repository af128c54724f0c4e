//! 流水线监控
//!
//! Prometheus指标：上传、外部分析调用、转写、反馈与被拒请求

use anyhow::Result;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::time::{Duration, Instant};
use tracing::debug;

/// 流水线指标收集器
#[derive(Debug)]
pub struct PipelineMonitor {
    /// Prometheus指标注册表
    registry: Registry,
    /// 上传计数，按文件类别
    uploads_total: IntCounterVec,
    /// 外部分析调用计数，按服务
    upstream_calls_total: IntCounterVec,
    /// 外部分析失败计数，按服务
    upstream_failures_total: IntCounterVec,
    /// 外部调用延迟
    upstream_duration: Histogram,
    /// 转写次数
    transcriptions_total: IntCounter,
    /// 反馈提交次数
    feedback_total: IntCounter,
    /// 被拒请求，按状态码
    rejected_requests_total: IntCounterVec,
    /// 启动时间
    start_time: Instant,
}

impl PipelineMonitor {
    /// 创建监控器并注册全部指标
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let uploads_total = IntCounterVec::new(
            Opts::new("dental_uploads_total", "Total number of stored uploads"),
            &["category"],
        )?;

        let upstream_calls_total = IntCounterVec::new(
            Opts::new("dental_upstream_calls_total", "Total number of external analysis calls"),
            &["service"],
        )?;

        let upstream_failures_total = IntCounterVec::new(
            Opts::new("dental_upstream_failures_total", "Total number of failed external calls"),
            &["service"],
        )?;

        let upstream_duration = Histogram::with_opts(HistogramOpts::new(
            "dental_upstream_duration_seconds",
            "External call duration in seconds",
        ))?;

        let transcriptions_total = IntCounter::with_opts(Opts::new(
            "dental_transcriptions_total",
            "Total number of transcribed recordings",
        ))?;

        let feedback_total = IntCounter::with_opts(Opts::new(
            "dental_feedback_total",
            "Total number of forwarded feedback submissions",
        ))?;

        let rejected_requests_total = IntCounterVec::new(
            Opts::new("dental_rejected_requests_total", "Total number of rejected requests"),
            &["status"],
        )?;

        // 注册所有指标
        registry.register(Box::new(uploads_total.clone()))?;
        registry.register(Box::new(upstream_calls_total.clone()))?;
        registry.register(Box::new(upstream_failures_total.clone()))?;
        registry.register(Box::new(upstream_duration.clone()))?;
        registry.register(Box::new(transcriptions_total.clone()))?;
        registry.register(Box::new(feedback_total.clone()))?;
        registry.register(Box::new(rejected_requests_total.clone()))?;

        Ok(Self {
            registry,
            uploads_total,
            upstream_calls_total,
            upstream_failures_total,
            upstream_duration,
            transcriptions_total,
            feedback_total,
            rejected_requests_total,
            start_time: Instant::now(),
        })
    }

    pub fn record_upload(&self, category: &str) {
        self.uploads_total.with_label_values(&[category]).inc();
    }

    /// 记录一次外部调用
    pub fn record_upstream_call(&self, service: &str, duration: Duration, success: bool) {
        debug!("Upstream call: {} in {:?} (success: {})", service, duration, success);

        self.upstream_calls_total.with_label_values(&[service]).inc();
        self.upstream_duration.observe(duration.as_secs_f64());
        if !success {
            self.upstream_failures_total.with_label_values(&[service]).inc();
        }
    }

    pub fn record_transcription(&self) {
        self.transcriptions_total.inc();
    }

    pub fn record_feedback(&self) {
        self.feedback_total.inc();
    }

    pub fn record_rejection(&self, status: u16) {
        self.rejected_requests_total
            .with_label_values(&[&status.to_string()])
            .inc();
    }

    /// 导出Prometheus文本格式
    pub fn get_prometheus_metrics(&self) -> Result<String> {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }

    /// 运行时间
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}
