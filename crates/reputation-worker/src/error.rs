//! 信誉 worker 错误类型
//!
//! 这里的错误都属于"致命处理失败"：消息不确认，转换为 [`FeedError`] 交给消费循环。
//! 帖子或用户不存在、消息格式错误重投递也不会成功，转入死信 topic；
//! 基础设施错误退回消费位置重新投递。发布通知的失败不在此列，
//! 已由发布器内部记录并丢弃。

use feed_shared::error::FeedError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReputationError {
    /// 消息引用的帖子不存在，说明上游数据不一致
    #[error("帖子不存在: post_id={post_id}")]
    PostNotFound { post_id: String },

    /// 帖子作者在用户表中不存在
    #[error("用户不存在: user_id={user_id}")]
    UserNotFound { user_id: String },

    #[error("消息解码失败: {0}")]
    Decode(String),

    #[error(transparent)]
    Shared(#[from] FeedError),
}

impl ReputationError {
    /// 指标中使用的错误分类
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PostNotFound { .. } => "post_not_found",
            Self::UserNotFound { .. } => "user_not_found",
            Self::Decode(_) => "decode_failed",
            Self::Shared(_) => "infrastructure",
        }
    }
}

impl From<ReputationError> for FeedError {
    fn from(err: ReputationError) -> Self {
        match err {
            ReputationError::PostNotFound { post_id } => FeedError::NotFound {
                entity: "post".to_string(),
                id: post_id,
            },
            ReputationError::UserNotFound { user_id } => FeedError::NotFound {
                entity: "user".to_string(),
                id: user_id,
            },
            ReputationError::Decode(reason) => FeedError::InvalidMessage(reason),
            ReputationError::Shared(e) => e,
        }
    }
}
