//! 消费失败后的投递语义
//!
//! Kafka 的 offset 提交是累积的：提交 N+2 即意味着 N 及之前的消息全部处理完毕。
//! 因此一条消息处理失败后，消费循环不能直接去拉下一条，否则后续的确认会越过它。
//! 失败消息按错误类型二选一：
//! - 可重试错误（数据库、broker）：把消费位置退回到该消息，退避后重新投递
//! - 不可重试错误（实体不存在、格式错误）：写入死信 topic 后确认，分区继续前进
//!
//! 两条路都走不通时 [`dispatch`] 返回错误，消费循环随之停止，
//! 重启后从最后一次提交的位置继续，失败消息仍会被再次投递。

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::FeedError;
use crate::kafka::{ConsumerMessage, InboundMessage};

/// 失败消息的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Redeliver,
    DeadLetter,
}

impl Disposition {
    pub fn of(err: &FeedError) -> Self {
        if err.is_retryable() {
            Self::Redeliver
        } else {
            Self::DeadLetter
        }
    }
}

/// 失败消息的处置接口，生产实现基于 Kafka seek 与死信 topic
#[async_trait]
pub trait FailureHandler: Send + Sync {
    /// 退回到该消息的位置，下一次拉取会再次得到它
    async fn redeliver(&self, msg: &ConsumerMessage) -> Result<(), FeedError>;

    /// 把消息连同失败原因写入死信 topic
    async fn dead_letter(&self, msg: &ConsumerMessage, err: &FeedError) -> Result<(), FeedError>;
}

/// 把一条入站消息交给 handler，并按错误类型处置失败
///
/// 返回 `Ok` 表示分区可以继续拉取下一条；返回 `Err` 表示无法保证失败消息不被越过，
/// 调用方必须停止消费。
pub async fn dispatch<F, Fut>(
    inbound: InboundMessage,
    handler: &F,
    failures: &dyn FailureHandler,
) -> Result<(), FeedError>
where
    F: Fn(InboundMessage) -> Fut,
    Fut: Future<Output = Result<(), FeedError>>,
{
    let Err(err) = handler(inbound.clone()).await else {
        return Ok(());
    };

    let msg = inbound.message();
    match Disposition::of(&err) {
        Disposition::Redeliver => {
            warn!(message_id = %msg.id(), code = err.code(), error = %err, "处理失败，退回消费位置等待重投递");
            failures.redeliver(msg).await
        }
        Disposition::DeadLetter => {
            if let Err(e) = failures.dead_letter(msg, &err).await {
                warn!(message_id = %msg.id(), error = %e, "写入死信失败，改为重投递");
                return failures.redeliver(msg).await;
            }
            warn!(message_id = %msg.id(), code = err.code(), error = %err, "消息已转入死信 topic");
            inbound.ack()
        }
    }
}

/// 死信 topic 中的消息信封
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub message_id: String,
    pub subscription: String,
    pub source_topic: String,
    pub source_partition: i32,
    pub source_offset: i64,
    pub key: Option<String>,
    /// 原始负载，非 UTF-8 字节按替换字符处理
    pub payload: String,
    pub error: String,
    pub error_code: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(msg: &ConsumerMessage, err: &FeedError, subscription: &str) -> Self {
        Self {
            message_id: msg.id(),
            subscription: subscription.to_string(),
            source_topic: msg.topic.clone(),
            source_partition: msg.partition,
            source_offset: msg.offset,
            key: msg.key.clone(),
            payload: String::from_utf8_lossy(&msg.payload).into_owned(),
            error: err.to_string(),
            error_code: err.code().to_string(),
            failed_at: Utc::now(),
        }
    }
}
