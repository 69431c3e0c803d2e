//! 信誉 worker 入口
//!
//! 订阅 `post-upvote-canceled`，为被取消点赞的帖子作者扣减信誉。

use std::sync::Arc;

use anyhow::Result;
use feed_shared::{
    config::AppConfig,
    database::Database,
    kafka::KafkaProducer,
    observability,
    publisher::{EventPublisher, PublisherConfig, TopicRegistry},
};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use reputation_worker::{
    consumer::ReputationConsumer, processor::ReputationProcessor,
    repository::PgReputationRepository,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // 1. 加载配置：config/default.toml → config/{env}.toml → config/reputation-worker.toml → FEED_*
    let config = AppConfig::load("reputation-worker")?;

    // 2. 可观测性
    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!(environment = %config.environment, "Starting reputation-worker...");

    // 3. 数据库
    let db = Database::connect(&config.database).await?;
    db.health_check().await?;
    info!("Database connection established");

    // 4. 事件发布器，非生产环境只记录不发送
    let publisher_config = PublisherConfig::from_app_config(&config);
    if !publisher_config.live {
        warn!(environment = %config.environment, "非生产环境，事件发布已关闭");
    }
    let producer = KafkaProducer::new(&config.kafka)?;
    let publisher = EventPublisher::new(
        Arc::new(producer.clone()),
        TopicRegistry::resolve(&config.kafka.topic_prefix),
        publisher_config,
    );

    // 5. 处理器与消费者
    let repo = Arc::new(PgReputationRepository::new(db.pool().clone()));
    let processor = ReputationProcessor::new(repo, publisher);
    // 死信始终写入，与事件发布是否开启无关
    let consumer = ReputationConsumer::new(&config.kafka, processor, producer)?;

    // 6. Ctrl-C 触发优雅关闭
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => info!("收到 Ctrl-C，开始关闭"),
            Err(e) => warn!(error = %e, "监听 Ctrl-C 失败，立即关闭"),
        }
        let _ = shutdown_tx.send(true);
    });

    consumer.run(shutdown_rx).await?;

    db.close().await;
    info!("reputation-worker stopped");
    Ok(())
}
