//! 领域事件发布器
//!
//! 把强类型的领域事件翻译成一次 broker 发布调用。发布是尽力而为的：
//! - 非生产环境下所有发布都是空操作，避免开发/测试环境产生真实事件；
//! - 生产环境下投递失败只记录结构化错误日志后丢弃，不重试，也不向调用方传播。
//!
//! 调用方必须先提交自己的主数据变更再发布通知，丢失一条通知只影响下游消费者，
//! 不会破坏主数据的一致性。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::compat::{SourceRequest, to_legacy_source_request};
use crate::config::AppConfig;
use crate::error::FeedError;
use crate::events::{
    CommentCommented, CommentFeatured, CommentUpvoteCanceled, CommentUpvoted, EventKind,
    FeedEvent, PostAuthorMatched, PostCommented, PostReachedViewsThreshold, PostUpvoteCanceled,
    PostUpvoted, SendAnalyticsReport, SourceRequestEvent, SourceRequestReason,
    UserReputationUpdated,
};
use crate::kafka::KafkaProducer;
use crate::observability::metrics::record_event_publish;

// ---------------------------------------------------------------------------
// 配置
// ---------------------------------------------------------------------------

/// 发布器配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublisherConfig {
    /// 为 `true` 时真正投递事件，否则所有发布均为空操作
    pub live: bool,
}

impl PublisherConfig {
    pub fn live() -> Self {
        Self { live: true }
    }

    pub fn suppressed() -> Self {
        Self { live: false }
    }

    /// 仅生产环境开启投递
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            live: config.is_production(),
        }
    }
}

// ---------------------------------------------------------------------------
// Topic 句柄
// ---------------------------------------------------------------------------

/// 已解析的 broker 目的地
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    name: String,
}

impl Topic {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// 进程级 topic 注册表
///
/// 启动时一次性解析全部事件类型的 topic，之后在进程生命周期内复用，不再重新解析。
#[derive(Debug, Clone)]
pub struct TopicRegistry {
    // 按 EventKind 声明顺序存放，与 EventKind::ALL 一一对应
    topics: Vec<Topic>,
}

impl TopicRegistry {
    /// 以给定前缀解析全部 topic
    pub fn resolve(prefix: &str) -> Self {
        let topics = EventKind::ALL
            .iter()
            .map(|kind| Topic {
                name: format!("{prefix}{}", kind.base_topic()),
            })
            .collect();
        Self { topics }
    }

    pub fn get(&self, kind: EventKind) -> &Topic {
        &self.topics[kind as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (EventKind, &Topic)> {
        EventKind::ALL.iter().copied().zip(self.topics.iter())
    }
}

// ---------------------------------------------------------------------------
// 发布传输
// ---------------------------------------------------------------------------

/// 发布传输抽象
///
/// 生产环境由 `KafkaProducer` 实现；测试中替换为记录型或失败型实现。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PublishTransport: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), FeedError>;
}

#[async_trait]
impl PublishTransport for KafkaProducer {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), FeedError> {
        self.send(topic, key, payload).await.map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// EventPublisher
// ---------------------------------------------------------------------------

/// 领域事件发布器
///
/// 持有传输、topic 注册表和投递开关，克隆成本低，可在所有调用点共享。
#[derive(Clone)]
pub struct EventPublisher {
    transport: Arc<dyn PublishTransport>,
    topics: Arc<TopicRegistry>,
    config: PublisherConfig,
}

impl EventPublisher {
    pub fn new(
        transport: Arc<dyn PublishTransport>,
        topics: TopicRegistry,
        config: PublisherConfig,
    ) -> Self {
        Self {
            transport,
            topics: Arc::new(topics),
            config,
        }
    }

    pub fn is_live(&self) -> bool {
        self.config.live
    }

    pub fn topics(&self) -> &TopicRegistry {
        &self.topics
    }

    /// 尽力发布一个事件
    ///
    /// 返回时发布尝试（或空操作）已结束。调用方观察不到投递结果，
    /// 失败只体现在错误日志和 `feed_events_published_total` 指标中。
    pub async fn publish<E: FeedEvent>(&self, event: &E) {
        let topic = self.topics.get(E::KIND);

        if !self.config.live {
            debug!(topic = %topic.name(), "非生产环境，跳过事件发布");
            record_event_publish(topic.name(), "suppressed");
            return;
        }

        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, topic = %topic.name(), payload = ?event, "事件序列化失败");
                record_event_publish(topic.name(), "dropped");
                return;
            }
        };

        match self
            .transport
            .publish(topic.name(), event.partition_key(), &payload)
            .await
        {
            Ok(()) => {
                debug!(topic = %topic.name(), key = event.partition_key(), "事件已发布");
                record_event_publish(topic.name(), "sent");
            }
            Err(e) => {
                error!(
                    error = %e,
                    topic = %topic.name(),
                    payload = %String::from_utf8_lossy(&payload),
                    "发布消息失败"
                );
                record_event_publish(topic.name(), "dropped");
            }
        }
    }

    // ==================== 各事件的便捷入口 ====================

    pub async fn notify_source_request(&self, reason: SourceRequestReason, req: &SourceRequest) {
        self.publish(&SourceRequestEvent {
            reason,
            pub_request: to_legacy_source_request(req),
        })
        .await
    }

    pub async fn notify_post_upvoted(&self, post_id: &str, user_id: &str) {
        self.publish(&PostUpvoted {
            post_id: post_id.to_string(),
            user_id: user_id.to_string(),
        })
        .await
    }

    pub async fn notify_post_upvote_canceled(&self, post_id: &str, user_id: &str) {
        self.publish(&PostUpvoteCanceled {
            post_id: post_id.to_string(),
            user_id: user_id.to_string(),
        })
        .await
    }

    pub async fn notify_comment_upvoted(&self, comment_id: &str, user_id: &str) {
        self.publish(&CommentUpvoted {
            comment_id: comment_id.to_string(),
            user_id: user_id.to_string(),
        })
        .await
    }

    pub async fn notify_comment_upvote_canceled(&self, comment_id: &str, user_id: &str) {
        self.publish(&CommentUpvoteCanceled {
            comment_id: comment_id.to_string(),
            user_id: user_id.to_string(),
        })
        .await
    }

    pub async fn notify_post_commented(&self, post_id: &str, user_id: &str, comment_id: &str) {
        self.publish(&PostCommented {
            post_id: post_id.to_string(),
            user_id: user_id.to_string(),
            comment_id: comment_id.to_string(),
        })
        .await
    }

    pub async fn notify_comment_commented(
        &self,
        post_id: &str,
        user_id: &str,
        parent_comment_id: &str,
        child_comment_id: &str,
    ) {
        self.publish(&CommentCommented {
            post_id: post_id.to_string(),
            user_id: user_id.to_string(),
            parent_comment_id: parent_comment_id.to_string(),
            child_comment_id: child_comment_id.to_string(),
        })
        .await
    }

    pub async fn notify_comment_featured(&self, comment_id: &str) {
        self.publish(&CommentFeatured {
            comment_id: comment_id.to_string(),
        })
        .await
    }

    pub async fn notify_user_reputation_updated(&self, user_id: &str, reputation: i64) {
        self.publish(&UserReputationUpdated {
            user_id: user_id.to_string(),
            reputation,
        })
        .await
    }

    pub async fn notify_post_author_matched(&self, post_id: &str, author_id: &str) {
        self.publish(&PostAuthorMatched {
            post_id: post_id.to_string(),
            author_id: author_id.to_string(),
        })
        .await
    }

    pub async fn notify_send_analytics_report(&self, post_id: &str) {
        self.publish(&SendAnalyticsReport {
            post_id: post_id.to_string(),
        })
        .await
    }

    pub async fn notify_post_reached_views_threshold(&self, post_id: &str, threshold: i64) {
        self.publish(&PostReachedViewsThreshold {
            post_id: post_id.to_string(),
            threshold,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::EVENTS_PUBLISHED;
    use crate::test_utils::{
        FailingTransport, RecordingTransport, prometheus_sample, sample_source_request,
    };
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::json;

    fn publisher_with(transport: Arc<dyn PublishTransport>, config: PublisherConfig) -> EventPublisher {
        EventPublisher::new(transport, TopicRegistry::resolve(""), config)
    }

    /// 依次触发全部 12 种事件
    async fn notify_all(publisher: &EventPublisher) {
        publisher
            .notify_source_request(SourceRequestReason::New, &sample_source_request())
            .await;
        publisher.notify_post_upvoted("p1", "u1").await;
        publisher.notify_post_upvote_canceled("p1", "u1").await;
        publisher.notify_comment_upvoted("c1", "u1").await;
        publisher.notify_comment_upvote_canceled("c1", "u1").await;
        publisher.notify_post_commented("p1", "u1", "c1").await;
        publisher.notify_comment_commented("p1", "u1", "c1", "c2").await;
        publisher.notify_comment_featured("c1").await;
        publisher.notify_user_reputation_updated("u1", 10).await;
        publisher.notify_post_author_matched("p1", "u2").await;
        publisher.notify_send_analytics_report("p1").await;
        publisher.notify_post_reached_views_threshold("p1", 250).await;
    }

    #[test]
    fn test_topic_registry_resolves_every_kind() {
        let registry = TopicRegistry::resolve("");
        for kind in EventKind::ALL {
            assert_eq!(registry.get(kind).name(), kind.base_topic());
        }
        assert_eq!(registry.iter().count(), 12);
    }

    #[test]
    fn test_topic_registry_prefix() {
        let registry = TopicRegistry::resolve("staging.");
        assert_eq!(
            registry.get(EventKind::UserReputationUpdated).name(),
            "staging.user-reputation-updated"
        );
    }

    #[test]
    fn test_publisher_config_from_app_config() {
        let mut config = AppConfig::default();
        assert_eq!(PublisherConfig::from_app_config(&config), PublisherConfig::suppressed());

        config.environment = "production".to_string();
        assert_eq!(PublisherConfig::from_app_config(&config), PublisherConfig::live());
    }

    #[tokio::test]
    async fn test_suppressed_mode_never_touches_transport() {
        let mut transport = MockPublishTransport::new();
        transport.expect_publish().times(0);

        let publisher = publisher_with(Arc::new(transport), PublisherConfig::suppressed());
        assert!(!publisher.is_live());

        notify_all(&publisher).await;
    }

    #[tokio::test]
    async fn test_live_mode_sends_each_event_to_its_topic() {
        let transport = Arc::new(RecordingTransport::default());
        let publisher = publisher_with(transport.clone(), PublisherConfig::live());

        notify_all(&publisher).await;

        let records = transport.records();
        assert_eq!(records.len(), 12);
        for (record, kind) in records.iter().zip(EventKind::ALL) {
            assert_eq!(record.topic, kind.base_topic());
        }
    }

    #[tokio::test]
    async fn test_live_mode_payload_shapes() {
        let transport = Arc::new(RecordingTransport::default());
        let publisher = publisher_with(transport.clone(), PublisherConfig::live());

        publisher.notify_post_upvoted("p1", "u1").await;
        publisher.notify_user_reputation_updated("1", 2).await;
        publisher.notify_post_reached_views_threshold("p9", 500).await;

        let records = transport.records();
        assert_eq!(records[0].payload, json!({"postId": "p1", "userId": "u1"}));
        assert_eq!(records[0].key, "p1");
        assert_eq!(records[1].payload, json!({"userId": "1", "reputation": 2}));
        assert_eq!(records[1].key, "1");
        assert_eq!(records[2].payload, json!({"postId": "p9", "threshold": 500}));
    }

    #[tokio::test]
    async fn test_source_request_uses_legacy_shape() {
        let transport = Arc::new(RecordingTransport::default());
        let publisher = publisher_with(transport.clone(), PublisherConfig::live());

        publisher
            .notify_source_request(SourceRequestReason::Approve, &sample_source_request())
            .await;

        let records = transport.records_for("pub-request");
        assert_eq!(records.len(), 1);
        let payload = &records[0].payload;
        assert_eq!(payload["type"], "approve");
        assert_eq!(payload["pubRequest"]["url"], "https://blog.example.com");
        assert_eq!(payload["pubRequest"]["pubId"], "example");
        assert!(payload["pubRequest"].get("sourceUrl").is_none());
    }

    #[tokio::test]
    async fn test_transport_failure_is_swallowed() {
        let mut transport = MockPublishTransport::new();
        transport
            .expect_publish()
            .times(1)
            .returning(|_, _, _| Err(FeedError::Kafka("broker 不可达".to_string())));

        let publisher = publisher_with(Arc::new(transport), PublisherConfig::live());

        // 失败不会以任何形式传播给调用方
        publisher.notify_comment_featured("c1").await;
    }

    #[tokio::test]
    async fn test_prefixed_registry_is_used_for_publish() {
        let transport = Arc::new(RecordingTransport::default());
        let publisher = EventPublisher::new(
            transport.clone(),
            TopicRegistry::resolve("prod."),
            PublisherConfig::live(),
        );

        publisher.notify_send_analytics_report("p1").await;

        assert_eq!(transport.records()[0].topic, "prod.send-analytics-report");
    }

    #[test]
    fn test_publish_outcomes_are_counted() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        // 本地 recorder 只对当前线程生效，block_on 在当前线程上驱动 future
        metrics::with_local_recorder(&recorder, || {
            tokio_test::block_on(async {
                let live = publisher_with(
                    Arc::new(RecordingTransport::default()),
                    PublisherConfig::live(),
                );
                live.notify_post_upvoted("p1", "u1").await;
                live.notify_post_upvoted("p2", "u1").await;

                let suppressed = publisher_with(
                    Arc::new(RecordingTransport::default()),
                    PublisherConfig::suppressed(),
                );
                suppressed.notify_post_upvoted("p1", "u1").await;

                let failing = Arc::new(FailingTransport::default());
                let broken = publisher_with(failing.clone(), PublisherConfig::live());
                broken.notify_comment_featured("c1").await;
                assert_eq!(failing.attempts(), 1);
            })
        });

        let rendered = handle.render();
        let count = |topic: &str, outcome: &str| {
            prometheus_sample(
                &rendered,
                EVENTS_PUBLISHED,
                &[("topic", topic), ("outcome", outcome)],
            )
        };
        assert_eq!(count("post-upvoted", "sent"), Some(2.0));
        assert_eq!(count("post-upvoted", "suppressed"), Some(1.0));
        assert_eq!(count("comment-featured", "dropped"), Some(1.0));
        assert_eq!(count("comment-featured", "sent"), None);
    }
}
