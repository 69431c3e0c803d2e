//! Prometheus 指标
//!
//! 记录端统一走 `metrics` 宏；进程内安装 Prometheus recorder，
//! 并在 `metrics_port` 上用 axum 暴露 `/metrics` 与 `/health`。

use std::net::SocketAddr;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::ObservabilityConfig;

pub const EVENTS_PUBLISHED: &str = "feed_events_published_total";
pub const REPUTATION_MESSAGES: &str = "reputation_messages_total";
pub const REPUTATION_MESSAGE_DURATION: &str = "reputation_message_duration_seconds";

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// 指标 HTTP 服务的任务句柄
pub struct MetricsHandle {
    _server: JoinHandle<()>,
}

pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("安装 Prometheus recorder 失败")?;
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    describe_metrics();
    metrics::counter!("service_starts_total", "service" => config.service_name.clone())
        .increment(1);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server = serve(addr, handle).await?;

    Ok(MetricsHandle { _server: server })
}

fn describe_metrics() {
    metrics::describe_counter!(
        EVENTS_PUBLISHED,
        "Outbound event publish attempts by topic and outcome"
    );
    metrics::describe_counter!(
        REPUTATION_MESSAGES,
        "Upvote-cancellation messages handled by the reputation worker"
    );
    metrics::describe_histogram!(
        REPUTATION_MESSAGE_DURATION,
        metrics::Unit::Seconds,
        "Reputation worker message handling duration"
    );
}

async fn serve(addr: SocketAddr, handle: PrometheusHandle) -> Result<JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("绑定指标端口 {addr} 失败"))?;
    info!(%addr, "指标服务已启动");

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "指标服务异常退出");
        }
    }))
}

/// 已安装的 Prometheus handle，未调用 [`init`] 时为 `None`
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// 事件发布结果：`sent` / `suppressed` / `dropped`
pub fn record_event_publish(topic: &str, outcome: &'static str) {
    metrics::counter!(EVENTS_PUBLISHED, "topic" => topic.to_string(), "outcome" => outcome)
        .increment(1);
}

/// 信誉 worker 单条消息的处理结果与耗时
pub fn record_reputation_message(outcome: &'static str, duration_secs: f64) {
    metrics::counter!(REPUTATION_MESSAGES, "outcome" => outcome).increment(1);
    metrics::histogram!(REPUTATION_MESSAGE_DURATION, "outcome" => outcome).record(duration_secs);
}
