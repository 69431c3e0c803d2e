//! 事件发布器集成测试
//!
//! 通过公开 API 驱动发布器，校验每种事件的 topic 与分区键。

use std::sync::Arc;

use feed_shared::events::SourceRequestReason;
use feed_shared::publisher::{EventPublisher, PublisherConfig, TopicRegistry};
use feed_shared::test_utils::{FailingTransport, RecordingTransport, sample_source_request};

fn live(prefix: &str) -> (Arc<RecordingTransport>, EventPublisher) {
    let transport = Arc::new(RecordingTransport::default());
    let publisher = EventPublisher::new(
        transport.clone(),
        TopicRegistry::resolve(prefix),
        PublisherConfig::live(),
    );
    (transport, publisher)
}

#[tokio::test]
async fn test_partition_keys_follow_primary_entity() {
    let (transport, publisher) = live("");

    publisher
        .notify_source_request(SourceRequestReason::Approve, &sample_source_request())
        .await;
    publisher.notify_post_upvoted("p1", "u1").await;
    publisher.notify_comment_upvote_canceled("c1", "u1").await;
    publisher.notify_comment_commented("p1", "u1", "c1", "c2").await;
    publisher.notify_user_reputation_updated("u1", 7).await;
    publisher.notify_post_reached_views_threshold("p1", 1000).await;

    let keys: Vec<(String, String)> = transport
        .records()
        .into_iter()
        .map(|r| (r.topic, r.key))
        .collect();

    assert_eq!(
        keys,
        vec![
            ("pub-request".to_string(), "sr-1".to_string()),
            ("post-upvoted".to_string(), "p1".to_string()),
            ("comment-upvote-canceled".to_string(), "c1".to_string()),
            ("comment-commented".to_string(), "c1".to_string()),
            ("user-reputation-updated".to_string(), "u1".to_string()),
            ("post-reached-views-threshold".to_string(), "p1".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_source_request_reason_and_legacy_body() {
    let (transport, publisher) = live("");

    publisher
        .notify_source_request(SourceRequestReason::Publish, &sample_source_request())
        .await;

    let records = transport.records_for("pub-request");
    assert_eq!(records.len(), 1);

    let payload = &records[0].payload;
    assert_eq!(payload["type"], "publish");
    assert_eq!(payload["pubRequest"]["url"], "https://blog.example.com");
    assert_eq!(payload["pubRequest"]["pubId"], "example");
    assert!(payload["pubRequest"].get("sourceUrl").is_none());
}

#[tokio::test]
async fn test_prefix_applies_to_every_topic() {
    let (transport, publisher) = live("dev.");

    publisher.notify_comment_featured("c9").await;
    publisher.notify_send_analytics_report("p9").await;

    assert!(
        transport
            .records()
            .iter()
            .all(|r| r.topic.starts_with("dev."))
    );
    assert_eq!(transport.records_for("dev.comment-featured").len(), 1);
    assert_eq!(transport.records_for("dev.send-analytics-report").len(), 1);
}

#[tokio::test]
async fn test_failed_sends_do_not_retry() {
    let transport = Arc::new(FailingTransport::default());
    let publisher = EventPublisher::new(
        transport.clone(),
        TopicRegistry::resolve(""),
        PublisherConfig::live(),
    );

    publisher.notify_post_author_matched("p1", "u2").await;
    publisher.notify_post_upvote_canceled("p1", "u1").await;

    assert_eq!(transport.attempts(), 2);
}
