//! 取消点赞的信誉扣减处理器
//!
//! 处理流程：
//! 1. 解码入站消息 `{ userId, postId }`
//! 2. 查询帖子作者
//! 3. 作者就是取消点赞的用户（或帖子没有作者）时不做任何变更
//! 4. 否则原子地把作者信誉值减 1，并发布 `user-reputation-updated` 事件
//! 5. 确认消息
//!
//! 数据库变更先于通知发布，通知发布先于消息确认。
//! 同一消息被重复投递时会重复扣减，当前不做去重。

use std::sync::Arc;
use std::time::Instant;

use feed_shared::events::PostUpvoteCanceled;
use feed_shared::kafka::InboundMessage;
use feed_shared::observability::metrics::record_reputation_message;
use feed_shared::publisher::EventPublisher;
use tracing::{debug, info, warn};

use crate::error::ReputationError;
use crate::repository::ReputationRepository;

/// 每次取消点赞扣减的信誉值
pub const REPUTATION_DECREMENT: i64 = 1;

/// 单条消息的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 已扣减，携带扣减后的信誉值
    Decremented { reputation: i64 },
    /// 作者取消了自己帖子上的点赞
    SelfVote,
    /// 帖子没有关联作者
    NoAuthor,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decremented { .. } => "decremented",
            Self::SelfVote => "self_vote",
            Self::NoAuthor => "no_author",
        }
    }
}

pub struct ReputationProcessor<R> {
    repo: Arc<R>,
    publisher: EventPublisher,
}

impl<R: ReputationRepository> ReputationProcessor<R> {
    pub fn new(repo: Arc<R>, publisher: EventPublisher) -> Self {
        Self { repo, publisher }
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    /// 处理一条入站消息
    ///
    /// 成功时消息已确认；返回错误时消息未确认，由调用方决定如何处理。
    pub async fn handle(&self, message: &InboundMessage) -> Result<Outcome, ReputationError> {
        let start = Instant::now();
        let result = self.process(message).await;

        let label = match &result {
            Ok(outcome) => outcome.as_str(),
            Err(e) => e.kind(),
        };
        record_reputation_message(label, start.elapsed().as_secs_f64());

        result
    }

    async fn process(&self, message: &InboundMessage) -> Result<Outcome, ReputationError> {
        let msg = message.message();
        let data: PostUpvoteCanceled = msg
            .deserialize_payload()
            .map_err(|e| ReputationError::Decode(e.to_string()))?;

        debug!(
            message_id = %msg.id(),
            post_id = %data.post_id,
            user_id = %data.user_id,
            "收到取消点赞消息"
        );

        let outcome = self.apply(&data).await?;

        message.ack()?;

        info!(
            message_id = %msg.id(),
            post_id = %data.post_id,
            user_id = %data.user_id,
            outcome = outcome.as_str(),
            "取消点赞消息处理完成"
        );

        Ok(outcome)
    }

    /// 对一次取消点赞执行信誉扣减与通知，不涉及消息确认
    pub async fn apply(&self, data: &PostUpvoteCanceled) -> Result<Outcome, ReputationError> {
        let post = self
            .repo
            .find_post_author(&data.post_id)
            .await?
            .ok_or_else(|| ReputationError::PostNotFound {
                post_id: data.post_id.clone(),
            })?;

        let Some(author_id) = post.author_id else {
            warn!(post_id = %data.post_id, "帖子没有关联作者，跳过信誉扣减");
            return Ok(Outcome::NoAuthor);
        };

        if author_id == data.user_id {
            debug!(post_id = %data.post_id, user_id = %data.user_id, "作者取消自己的点赞，不扣减信誉");
            return Ok(Outcome::SelfVote);
        }

        let reputation = self
            .repo
            .decrement_reputation(&author_id, REPUTATION_DECREMENT)
            .await?
            .ok_or_else(|| ReputationError::UserNotFound {
                user_id: author_id.clone(),
            })?;

        info!(
            post_id = %data.post_id,
            author_id = %author_id,
            reputation,
            "因取消点赞扣减作者信誉"
        );

        self.publisher
            .notify_user_reputation_updated(&author_id, reputation)
            .await;

        Ok(Outcome::Decremented { reputation })
    }
}
