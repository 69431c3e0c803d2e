//! 领域事件模型
//!
//! 定义对外发布的全部事件类型及其负载结构。每种事件对应一个固定的 topic
//! 和固定的字段集合，负载序列化为扁平的 camelCase JSON 对象。
//! 事件在每次调用时新建，发布后即丢弃，本系统不做持久化。

use serde::{Deserialize, Serialize};

use crate::compat::LegacySourceRequest;

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// 对外发布的事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SourceRequest,
    PostUpvoted,
    PostUpvoteCanceled,
    CommentUpvoted,
    CommentUpvoteCanceled,
    PostCommented,
    CommentCommented,
    CommentFeatured,
    UserReputationUpdated,
    PostAuthorMatched,
    SendAnalyticsReport,
    PostReachedViewsThreshold,
}

impl EventKind {
    /// 全部事件类型，启动时据此一次性解析所有 topic
    pub const ALL: [EventKind; 12] = [
        Self::SourceRequest,
        Self::PostUpvoted,
        Self::PostUpvoteCanceled,
        Self::CommentUpvoted,
        Self::CommentUpvoteCanceled,
        Self::PostCommented,
        Self::CommentCommented,
        Self::CommentFeatured,
        Self::UserReputationUpdated,
        Self::PostAuthorMatched,
        Self::SendAnalyticsReport,
        Self::PostReachedViewsThreshold,
    ];

    /// 不带部署前缀的 topic 名称
    pub fn base_topic(&self) -> &'static str {
        match self {
            Self::SourceRequest => "pub-request",
            Self::PostUpvoted => "post-upvoted",
            Self::PostUpvoteCanceled => "post-upvote-canceled",
            Self::CommentUpvoted => "comment-upvoted",
            Self::CommentUpvoteCanceled => "comment-upvote-canceled",
            Self::PostCommented => "post-commented",
            Self::CommentCommented => "comment-commented",
            Self::CommentFeatured => "comment-featured",
            Self::UserReputationUpdated => "user-reputation-updated",
            Self::PostAuthorMatched => "post-author-matched",
            Self::SendAnalyticsReport => "send-analytics-report",
            Self::PostReachedViewsThreshold => "post-reached-views-threshold",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.base_topic())
    }
}

// ---------------------------------------------------------------------------
// FeedEvent
// ---------------------------------------------------------------------------

/// 可发布的事件负载
///
/// `KIND` 在编译期把负载类型绑定到唯一的 topic，调用方无法把负载发错 topic。
pub trait FeedEvent: Serialize + std::fmt::Debug + Send + Sync {
    const KIND: EventKind;

    /// Kafka 消息 key，同一实体的事件落在同一分区
    fn partition_key(&self) -> &str;
}

/// 来源申请的通知原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceRequestReason {
    New,
    Publish,
    Approve,
    Decline,
}

// ---------------------------------------------------------------------------
// 事件负载
// ---------------------------------------------------------------------------

/// 来源申请状态变更
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRequestEvent {
    #[serde(rename = "type")]
    pub reason: SourceRequestReason,
    pub pub_request: LegacySourceRequest,
}

impl FeedEvent for SourceRequestEvent {
    const KIND: EventKind = EventKind::SourceRequest;

    fn partition_key(&self) -> &str {
        &self.pub_request.id
    }
}

/// 帖子被点赞
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostUpvoted {
    pub post_id: String,
    pub user_id: String,
}

impl FeedEvent for PostUpvoted {
    const KIND: EventKind = EventKind::PostUpvoted;

    fn partition_key(&self) -> &str {
        &self.post_id
    }
}

/// 帖子点赞被取消
///
/// 同时也是信誉 worker 消费的入站消息格式。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostUpvoteCanceled {
    pub post_id: String,
    pub user_id: String,
}

impl FeedEvent for PostUpvoteCanceled {
    const KIND: EventKind = EventKind::PostUpvoteCanceled;

    fn partition_key(&self) -> &str {
        &self.post_id
    }
}

/// 评论被点赞
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentUpvoted {
    pub comment_id: String,
    pub user_id: String,
}

impl FeedEvent for CommentUpvoted {
    const KIND: EventKind = EventKind::CommentUpvoted;

    fn partition_key(&self) -> &str {
        &self.comment_id
    }
}

/// 评论点赞被取消
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentUpvoteCanceled {
    pub comment_id: String,
    pub user_id: String,
}

impl FeedEvent for CommentUpvoteCanceled {
    const KIND: EventKind = EventKind::CommentUpvoteCanceled;

    fn partition_key(&self) -> &str {
        &self.comment_id
    }
}

/// 帖子收到新评论
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCommented {
    pub post_id: String,
    pub user_id: String,
    pub comment_id: String,
}

impl FeedEvent for PostCommented {
    const KIND: EventKind = EventKind::PostCommented;

    fn partition_key(&self) -> &str {
        &self.post_id
    }
}

/// 评论收到回复
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentCommented {
    pub post_id: String,
    pub user_id: String,
    pub parent_comment_id: String,
    pub child_comment_id: String,
}

impl FeedEvent for CommentCommented {
    const KIND: EventKind = EventKind::CommentCommented;

    fn partition_key(&self) -> &str {
        &self.parent_comment_id
    }
}

/// 评论被设为精选
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentFeatured {
    pub comment_id: String,
}

impl FeedEvent for CommentFeatured {
    const KIND: EventKind = EventKind::CommentFeatured;

    fn partition_key(&self) -> &str {
        &self.comment_id
    }
}

/// 用户信誉值已更新，携带更新后的值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserReputationUpdated {
    pub user_id: String,
    pub reputation: i64,
}

impl FeedEvent for UserReputationUpdated {
    const KIND: EventKind = EventKind::UserReputationUpdated;

    fn partition_key(&self) -> &str {
        &self.user_id
    }
}

/// 帖子匹配到作者
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostAuthorMatched {
    pub post_id: String,
    pub author_id: String,
}

impl FeedEvent for PostAuthorMatched {
    const KIND: EventKind = EventKind::PostAuthorMatched;

    fn partition_key(&self) -> &str {
        &self.post_id
    }
}

/// 请求生成帖子分析报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendAnalyticsReport {
    pub post_id: String,
}

impl FeedEvent for SendAnalyticsReport {
    const KIND: EventKind = EventKind::SendAnalyticsReport;

    fn partition_key(&self) -> &str {
        &self.post_id
    }
}

/// 帖子浏览量达到阈值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostReachedViewsThreshold {
    pub post_id: String,
    pub threshold: i64,
}

impl FeedEvent for PostReachedViewsThreshold {
    const KIND: EventKind = EventKind::PostReachedViewsThreshold;

    fn partition_key(&self) -> &str {
        &self.post_id
    }
}
