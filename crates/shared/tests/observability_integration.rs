//! 可观测性模块集成测试
//!
//! 覆盖指标记录函数、W3C 追踪上下文的提取与注入，以及配置默认值。

use std::collections::HashMap;

mod metrics_tests {
    use feed_shared::observability::metrics::{
        EVENTS_PUBLISHED, REPUTATION_MESSAGE_DURATION, REPUTATION_MESSAGES,
        record_event_publish, record_reputation_message,
    };
    use feed_shared::test_utils::prometheus_sample;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn test_record_event_publish_outcomes() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            for outcome in ["sent", "suppressed", "dropped"] {
                record_event_publish("user-reputation-updated", outcome);
            }
            record_event_publish("staging.post-upvoted", "sent");
        });

        let rendered = handle.render();
        for outcome in ["sent", "suppressed", "dropped"] {
            assert_eq!(
                prometheus_sample(
                    &rendered,
                    EVENTS_PUBLISHED,
                    &[("topic", "user-reputation-updated"), ("outcome", outcome)]
                ),
                Some(1.0),
                "outcome {outcome}"
            );
        }
        assert_eq!(
            prometheus_sample(
                &rendered,
                EVENTS_PUBLISHED,
                &[("topic", "staging.post-upvoted"), ("outcome", "sent")]
            ),
            Some(1.0)
        );
    }

    #[test]
    fn test_record_reputation_message_outcomes() {
        let outcomes = [
            "decremented",
            "self_vote",
            "no_author",
            "post_not_found",
            "user_not_found",
            "infrastructure",
        ];
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            for outcome in outcomes {
                record_reputation_message(outcome, 0.004);
            }
            record_reputation_message("infrastructure", 30.0);
        });

        let rendered = handle.render();
        for outcome in outcomes.into_iter().take(5) {
            assert_eq!(
                prometheus_sample(&rendered, REPUTATION_MESSAGES, &[("outcome", outcome)]),
                Some(1.0),
                "outcome {outcome}"
            );
        }
        assert_eq!(
            prometheus_sample(&rendered, REPUTATION_MESSAGES, &[("outcome", "infrastructure")]),
            Some(2.0)
        );
        let slow_sum = prometheus_sample(
            &rendered,
            &format!("{REPUTATION_MESSAGE_DURATION}_sum"),
            &[("outcome", "infrastructure")],
        )
        .unwrap();
        assert!((slow_sum - 30.004).abs() < 1e-6);
    }
}

mod tracing_tests {
    use super::*;
    use feed_shared::observability::tracing::{
        extract_from_headers, inject_to_headers, set_span_parent_from_headers,
    };
    use opentelemetry::trace::TraceContextExt;

    #[test]
    fn test_extract_with_tracestate() {
        let mut headers = HashMap::new();
        headers.insert(
            "traceparent".to_string(),
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
        );
        headers.insert("tracestate".to_string(), "congo=t61rcWkgMzE".to_string());

        let context = extract_from_headers(&headers);
        let span_context = context.span().span_context().clone();

        assert!(span_context.is_valid());
        assert_eq!(
            span_context.trace_id().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
        assert_eq!(span_context.span_id().to_string(), "00f067aa0ba902b7");
    }

    #[test]
    fn test_extract_from_malformed_traceparent() {
        let cases = [
            "",
            "invalid-format",
            "00-0af7651916cd43dd8448eb211c80319c",
            "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331",
            "00-invalid-b7ad6b7169203331-01",
            "00-0af7651916cd43dd8448eb211c80319c-invalid-01",
        ];

        for value in cases {
            let mut headers = HashMap::new();
            headers.insert("traceparent".to_string(), value.to_string());

            let context = extract_from_headers(&headers);
            assert!(
                !context.span().span_context().is_valid(),
                "traceparent {value:?} 不应被接受"
            );
        }
    }

    #[test]
    fn test_inject_leaves_unrelated_headers() {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());

        inject_to_headers(&mut headers);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers["content-type"], "application/json");
    }

    #[test]
    fn test_set_span_parent_tolerates_any_headers() {
        let span = tracing::info_span!("consume_message");
        set_span_parent_from_headers(&span, &HashMap::new());

        let mut headers = HashMap::new();
        headers.insert("traceparent".to_string(), "garbage".to_string());
        set_span_parent_from_headers(&span, &headers);
    }
}

mod config_tests {
    use feed_shared::observability::ObservabilityConfig;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs);
        assert!(config.metrics_enabled);
        assert_eq!(config.metrics_port, 9090);
        assert!(config.otlp_endpoint.is_none());
    }

    #[test]
    fn test_with_service_name() {
        let config = ObservabilityConfig::default().with_service_name("reputation-worker");
        assert_eq!(config.service_name, "reputation-worker");
    }
}

mod guard_tests {
    use feed_shared::observability::ObservabilityGuard;

    #[test]
    fn test_empty_guard_drop() {
        let guard = ObservabilityGuard::empty();
        drop(guard);
    }
}
