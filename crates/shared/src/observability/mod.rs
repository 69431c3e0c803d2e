//! 日志、追踪与指标的统一入口
//!
//! worker 启动时调用一次 [`init`]，持有返回的 [`ObservabilityGuard`] 直到进程退出。

pub mod metrics;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;

pub use crate::config::ObservabilityConfig;

/// 持有追踪 provider 与指标服务，drop 时刷新未导出的 span
pub struct ObservabilityGuard {
    _metrics: Option<metrics::MetricsHandle>,
    tracing: Option<tracing::TracingGuard>,
}

impl ObservabilityGuard {
    /// 不持有任何资源，测试中使用
    pub fn empty() -> Self {
        Self {
            _metrics: None,
            tracing: None,
        }
    }
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        if self.tracing.is_some() {
            info!("正在关闭可观测性组件");
        }
    }
}

/// 初始化 tracing 订阅器，按配置启动 `/metrics` 端点
///
/// ```ignore
/// let config = AppConfig::load("reputation-worker")?;
/// let obs = config.observability.clone().with_service_name(&config.service_name);
/// let _guard = feed_shared::observability::init(&obs).await?;
/// ```
pub async fn init(config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    let tracing_guard = tracing::init(config)?;

    let metrics_handle = if config.metrics_enabled {
        Some(metrics::init(config).await?)
    } else {
        None
    };

    info!(
        service = %config.service_name,
        log_level = %config.log_level,
        metrics_port = config.metrics_enabled.then_some(config.metrics_port),
        otlp_endpoint = config.otlp_endpoint.as_deref().unwrap_or("-"),
        "可观测性已初始化"
    );

    Ok(ObservabilityGuard {
        _metrics: metrics_handle,
        tracing: Some(tracing_guard),
    })
}
