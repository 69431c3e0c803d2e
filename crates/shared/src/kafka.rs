//! Kafka 基础设施封装
//!
//! 将 rdkafka 的底层 API 封装为业务友好的 Producer/Consumer 抽象，
//! 统一消息序列化、错误映射、确认（ack）和优雅关闭语义。
//!
//! 消费端关闭了自动提交：一条消息只有在处理函数显式 ack 后才提交 offset。
//! offset 提交是累积的，失败消息不能靠"不提交"保留下来，
//! 消费循环会把位置退回到失败消息或把它转入死信 topic，见 [`crate::delivery`]。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{Offset, TopicPartitionList};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::KafkaConfig;
use crate::delivery::{self, DeadLetter, FailureHandler};
use crate::error::FeedError;
use crate::observability::tracing::{inject_to_headers, set_span_parent_from_headers};

// ---------------------------------------------------------------------------
// 订阅名常量
// ---------------------------------------------------------------------------

/// 集中管理 worker 的订阅名（即消费组后缀），防止字符串散落在各服务中
pub mod topics {
    /// 信誉 worker 对 `post-upvote-canceled` 的订阅
    pub const POST_UPVOTE_CANCELED_REP: &str = "post-upvote-canceled-rep";
}

// ---------------------------------------------------------------------------
// ConsumerMessage
// ---------------------------------------------------------------------------

/// 消费到的 Kafka 消息的统一表示
///
/// 将 rdkafka 的 `BorrowedMessage`（带生命周期约束）转换为拥有所有权的结构体，
/// 使消息可以安全地跨 await 点传递给异步处理函数。
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub timestamp: Option<i64>,
    pub headers: HashMap<String, String>,
}

impl ConsumerMessage {
    /// 从 rdkafka 的借用消息构造，提取并拥有所有字段
    fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        let key = msg
            .key()
            .and_then(|k| std::str::from_utf8(k).ok())
            .map(String::from);

        let payload = msg.payload().map(|p| p.to_vec()).unwrap_or_default();

        let timestamp = msg.timestamp().to_millis();

        let mut headers = HashMap::new();
        if let Some(h) = msg.headers() {
            for idx in 0..h.count() {
                let header = h.get(idx);
                if let Some(raw) = header.value
                    && let Ok(value) = std::str::from_utf8(raw)
                {
                    headers.insert(header.key.to_string(), value.to_string());
                }
            }
        }

        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key,
            payload,
            timestamp,
            headers,
        }
    }

    /// 消息在日志中的标识：`topic/partition@offset`
    pub fn id(&self) -> String {
        format!("{}/{}@{}", self.topic, self.partition, self.offset)
    }

    /// 将 JSON 格式负载反序列化为目标类型，失败属于不可重试错误
    pub fn deserialize_payload<T: DeserializeOwned>(&self) -> Result<T, FeedError> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| FeedError::InvalidMessage(format!("{}: {e}", self.id())))
    }
}

// ---------------------------------------------------------------------------
// 消息确认
// ---------------------------------------------------------------------------

/// 消息确认接口
///
/// 生产实现提交 offset；测试中可替换为计数实现，验证每条消息恰好确认一次。
pub trait MessageAck: Send + Sync {
    fn ack(&self, msg: &ConsumerMessage) -> Result<(), FeedError>;
}

/// 带确认能力的入站消息
#[derive(Clone)]
pub struct InboundMessage {
    message: ConsumerMessage,
    acker: Arc<dyn MessageAck>,
}

impl InboundMessage {
    pub fn new(message: ConsumerMessage, acker: Arc<dyn MessageAck>) -> Self {
        Self { message, acker }
    }

    pub fn message(&self) -> &ConsumerMessage {
        &self.message
    }

    /// 确认消息已处理完毕，之后该消息不会再被投递给本订阅
    pub fn ack(&self) -> Result<(), FeedError> {
        self.acker.ack(&self.message)?;
        debug!(message_id = %self.message.id(), "消息已确认");
        Ok(())
    }
}

/// 基于 offset 提交的确认实现
struct OffsetCommitter {
    consumer: Arc<StreamConsumer>,
}

impl MessageAck for OffsetCommitter {
    fn ack(&self, msg: &ConsumerMessage) -> Result<(), FeedError> {
        // 提交的是"下一条待消费"的位置
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&msg.topic, msg.partition, Offset::Offset(msg.offset + 1))
            .map_err(|e| FeedError::Kafka(format!("构造提交位置失败: {e}")))?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| FeedError::Kafka(format!("提交 offset 失败: {e}")))
    }
}

/// 基于 seek 与死信 topic 的失败处置
struct KafkaFailureHandler {
    consumer: Arc<StreamConsumer>,
    producer: KafkaProducer,
    subscription: String,
    dead_letter_topic: String,
    backoff: Duration,
}

#[async_trait]
impl FailureHandler for KafkaFailureHandler {
    async fn redeliver(&self, msg: &ConsumerMessage) -> Result<(), FeedError> {
        self.consumer
            .seek(
                &msg.topic,
                msg.partition,
                Offset::Offset(msg.offset),
                Duration::from_secs(5),
            )
            .map_err(|e| FeedError::Kafka(format!("退回消费位置 {} 失败: {e}", msg.id())))?;

        // 下游故障期间按固定间隔重试
        tokio::time::sleep(self.backoff).await;
        Ok(())
    }

    async fn dead_letter(&self, msg: &ConsumerMessage, err: &FeedError) -> Result<(), FeedError> {
        let letter = DeadLetter::new(msg, err, &self.subscription);
        let key = msg.key.clone().unwrap_or_else(|| msg.id());
        self.producer
            .send_json(&self.dead_letter_topic, &key, &letter)
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// KafkaProducer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 生产者
///
/// 封装 `FutureProducer` 并提供类型安全的 JSON 发送方法，
/// 内部已派生 Clone（`FutureProducer` 本身是 Arc 包装的）。
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
}

impl KafkaProducer {
    /// 根据配置创建生产者
    ///
    /// `message.timeout.ms` 为 5 秒，超时即视为投递失败，不做无限等待。
    pub fn new(config: &KafkaConfig) -> Result<Self, FeedError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| FeedError::Kafka(format!("创建生产者失败: {e}")))?;

        info!(brokers = %config.brokers, "Kafka 生产者已初始化");
        Ok(Self { producer })
    }

    /// 发送原始字节消息
    ///
    /// 当前追踪上下文会以 W3C `traceparent` 头注入消息，
    /// 消费端据此把处理 span 串到上游链路上。
    pub async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<(i32, i64), FeedError> {
        let mut trace_headers = HashMap::new();
        inject_to_headers(&mut trace_headers);

        let mut headers = OwnedHeaders::new();
        for (name, value) in &trace_headers {
            headers = headers.insert(Header {
                key: name,
                value: Some(value.as_str()),
            });
        }

        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload)
            .headers(headers);

        let delivery = self
            .producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| FeedError::Kafka(format!("发送消息失败: {e}")))?;

        debug!(
            topic,
            key,
            partition = delivery.partition,
            offset = delivery.offset,
            "消息已发送"
        );
        Ok((delivery.partition, delivery.offset))
    }

    /// 将值序列化为 JSON 后发送
    pub async fn send_json<T: Serialize>(
        &self,
        topic: &str,
        key: &str,
        value: &T,
    ) -> Result<(i32, i64), FeedError> {
        let payload = serde_json::to_vec(value)?;
        self.send(topic, key, &payload).await
    }
}

// ---------------------------------------------------------------------------
// KafkaConsumer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 消费者
///
/// 每个消费者对应一个订阅（消费组），消息逐条串行处理，
/// 基于 `watch` channel 实现优雅关闭。
pub struct KafkaConsumer {
    consumer: Arc<StreamConsumer>,
    subscription: String,
    group_id: String,
    dead_letter_topic: String,
    retry_backoff: Duration,
}

impl KafkaConsumer {
    /// 创建消费者
    ///
    /// 消费组为 `{consumer_group}.{subscription}`，不同订阅互不影响各自的 offset；
    /// 死信 topic 为 `{topic_prefix}{subscription}.dlq`。
    pub fn new(config: &KafkaConfig, subscription: &str) -> Result<Self, FeedError> {
        let group_id = format!("{}.{}", config.consumer_group, subscription);
        let dead_letter_topic = format!("{}{}.dlq", config.topic_prefix, subscription);

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "false")
            .create()
            .map_err(|e| FeedError::Kafka(format!("创建消费者失败: {e}")))?;

        info!(brokers = %config.brokers, group_id, "Kafka 消费者已初始化");
        Ok(Self {
            consumer: Arc::new(consumer),
            subscription: subscription.to_string(),
            group_id,
            dead_letter_topic,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn dead_letter_topic(&self) -> &str {
        &self.dead_letter_topic
    }

    /// 订阅指定的 topic 列表
    pub fn subscribe(&self, topics: &[&str]) -> Result<(), FeedError> {
        self.consumer
            .subscribe(topics)
            .map_err(|e| FeedError::Kafka(format!("订阅 topic 失败: {e}")))?;

        info!(?topics, group_id = %self.group_id, "已订阅 Kafka topics");
        Ok(())
    }

    /// 启动消费循环
    ///
    /// 使用 `tokio::select!` 同时监听消息流和关闭信号：
    /// - 收到消息时调用 handler，等待其完成后才拉取下一条。handler 返回错误时，
    ///   可重试的消息退回消费位置重新投递，其余写入 `dead_letters` 生产者的死信 topic 后确认。
    /// - 失败消息既无法退回也无法转入死信时返回错误，循环停止，避免后续确认越过它。
    /// - 关闭信号变为 `true` 时退出循环，正在执行的 handler 会先自然完成。
    pub async fn start<F, Fut>(
        self,
        mut shutdown: watch::Receiver<bool>,
        dead_letters: KafkaProducer,
        handler: F,
    ) -> Result<(), FeedError>
    where
        F: Fn(InboundMessage) -> Fut,
        Fut: std::future::Future<Output = Result<(), FeedError>>,
    {
        use futures::StreamExt;

        let acker: Arc<dyn MessageAck> = Arc::new(OffsetCommitter {
            consumer: Arc::clone(&self.consumer),
        });
        let failures = KafkaFailureHandler {
            consumer: Arc::clone(&self.consumer),
            producer: dead_letters,
            subscription: self.subscription.clone(),
            dead_letter_topic: self.dead_letter_topic.clone(),
            backoff: self.retry_backoff,
        };

        let stream = self.consumer.stream();
        futures::pin_mut!(stream);

        info!(group_id = %self.group_id, "Kafka 消费循环已启动");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("收到关闭信号，Kafka 消费循环退出");
                        break;
                    }
                }

                msg_result = stream.next() => {
                    let Some(msg_result) = msg_result else {
                        warn!("Kafka 消息流意外结束");
                        break;
                    };

                    match msg_result {
                        Ok(borrowed_msg) => {
                            let msg = ConsumerMessage::from_borrowed(&borrowed_msg);
                            let span = info_span!(
                                "consume_message",
                                topic = %msg.topic,
                                partition = msg.partition,
                                offset = msg.offset,
                            );
                            set_span_parent_from_headers(&span, &msg.headers);

                            let inbound = InboundMessage::new(msg, Arc::clone(&acker));
                            if let Err(e) = delivery::dispatch(inbound, &handler, &failures)
                                .instrument(span)
                                .await
                            {
                                error!(error = %e, group_id = %self.group_id, "失败消息无法重投递，消费循环停止");
                                return Err(e);
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "接收 Kafka 消息出错");
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------
