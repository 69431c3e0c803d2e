//! 取消点赞订阅的消费者
//!
//! 订阅 `post-upvote-canceled` topic，消费组为 `{consumer_group}.post-upvote-canceled-rep`，
//! 每条消息交给 [`ReputationProcessor`] 处理。处理失败的消息按错误类型重投递或转入
//! `post-upvote-canceled-rep.dlq`。

use feed_shared::config::KafkaConfig;
use feed_shared::error::FeedError;
use feed_shared::events::EventKind;
use feed_shared::kafka::{InboundMessage, KafkaConsumer, KafkaProducer, topics};
use tokio::sync::watch;
use tracing::{error, info};

use crate::processor::ReputationProcessor;
use crate::repository::ReputationRepository;

pub struct ReputationConsumer<R> {
    consumer: KafkaConsumer,
    processor: ReputationProcessor<R>,
    dead_letters: KafkaProducer,
    topic: String,
}

impl<R: ReputationRepository> ReputationConsumer<R> {
    /// 入站 topic 与发布器共用同一份 topic 注册表，保证前缀一致
    pub fn new(
        config: &KafkaConfig,
        processor: ReputationProcessor<R>,
        dead_letters: KafkaProducer,
    ) -> Result<Self, FeedError> {
        let consumer = KafkaConsumer::new(config, topics::POST_UPVOTE_CANCELED_REP)?;
        let topic = processor
            .publisher()
            .topics()
            .get(EventKind::PostUpvoteCanceled)
            .name()
            .to_string();

        Ok(Self {
            consumer,
            processor,
            dead_letters,
            topic,
        })
    }

    /// 启动消费循环，直到收到 shutdown 信号或失败消息无法重投递
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), FeedError> {
        self.consumer.subscribe(&[self.topic.as_str()])?;

        info!(
            topic = %self.topic,
            group_id = %self.consumer.group_id(),
            dead_letter_topic = %self.consumer.dead_letter_topic(),
            "信誉消费者已启动"
        );

        let processor = self.processor;

        self.consumer
            .start(shutdown, self.dead_letters, |msg| on_message(&processor, msg))
            .await?;

        info!("信誉消费者已停止");
        Ok(())
    }
}

/// 消费循环的 handler：失败时记录日志并把错误交还给消费循环处置
pub async fn on_message<R: ReputationRepository>(
    processor: &ReputationProcessor<R>,
    msg: InboundMessage,
) -> Result<(), FeedError> {
    if let Err(e) = processor.handle(&msg).await {
        let m = msg.message();
        error!(
            error = %e,
            kind = e.kind(),
            topic = %m.topic,
            partition = m.partition,
            offset = m.offset,
            "处理取消点赞消息失败"
        );
        return Err(e.into());
    }
    Ok(())
}
