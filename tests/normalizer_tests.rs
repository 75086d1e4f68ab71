//! # 流规范化器集成测试
//!
//! 直接检视调度队列里的更新：分类、指纹、每流有序与畸形事件处理

use flowscribe::config::{CaptureConfig, ClassifierConfig};
use flowscribe::dispatch::{DispatchQueue, FlowUpdate};
use flowscribe::intercept::FlowObserver;
use flowscribe::metrics::PipelineMetrics;
use flowscribe::normalizer::FlowNormalizer;
use flowscribe::testing::{
    error_event, init_test_env, llm_request, llm_response, plain_request, plain_response,
    test_flow_id,
};
use std::sync::Arc;

struct NormalizerHarness {
    queue: Arc<DispatchQueue>,
    normalizer: FlowNormalizer,
    metrics: Arc<PipelineMetrics>,
}

impl NormalizerHarness {
    fn new() -> Self {
        init_test_env();
        let metrics = Arc::new(PipelineMetrics::new());
        // 单分区，便于按序取出
        let queue = Arc::new(DispatchQueue::new(1, 64, Arc::clone(&metrics)));
        let normalizer = FlowNormalizer::new(
            Arc::clone(&queue),
            &ClassifierConfig::default(),
            CaptureConfig::default(),
            Arc::clone(&metrics),
        );
        Self {
            queue,
            normalizer,
            metrics,
        }
    }

    fn pop(&self) -> FlowUpdate {
        self.queue.try_pop(0).expect("队列中应当有更新")
    }
}

#[tokio::test]
async fn request_then_response_yields_ordered_updates() {
    let h = NormalizerHarness::new();
    let flow_id = test_flow_id();

    h.normalizer
        .on_request(llm_request(&flow_id, "api.anthropic.com", "/v1/messages"));
    h.normalizer.on_response(llm_response(&flow_id, 200));

    // pending 先于 complete
    let first = h.pop();
    assert!(first.is_pending());
    assert_eq!(first.flow_id(), flow_id);

    let second = h.pop();
    assert!(!second.is_pending());
    let record = second.record();
    assert_eq!(record.status_code, Some(200));
    assert!(record.is_llm_call);
    assert!(record.completed_at.unwrap() >= record.started_at);
    // 响应到达后挂起状态被回收
    assert_eq!(h.normalizer.pending_len(), 0);
}

#[tokio::test]
async fn bodies_are_digested_not_copied() {
    let h = NormalizerHarness::new();
    let flow_id = test_flow_id();

    h.normalizer
        .on_request(llm_request(&flow_id, "api.anthropic.com", "/v1/messages"));
    let update = h.pop();
    let record = update.record();

    let digest = record.request_body_digest.as_deref().expect("非空体应有指纹");
    assert_eq!(digest.len(), 64);
    assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn llm_flow_carries_captured_bodies() {
    let h = NormalizerHarness::new();
    let flow_id = test_flow_id();

    h.normalizer
        .on_request(llm_request(&flow_id, "api.anthropic.com", "/v1/messages"));
    match h.pop() {
        FlowUpdate::Pending {
            llm_request_body, ..
        } => assert!(llm_request_body.is_some(), "LLM 请求体应随更新携带"),
        FlowUpdate::Complete { .. } => panic!("第一条更新应为 pending"),
    }

    h.normalizer.on_response(llm_response(&flow_id, 200));
    match h.pop() {
        FlowUpdate::Complete {
            llm_response_body, ..
        } => assert!(llm_response_body.is_some(), "LLM 响应体应随更新携带"),
        FlowUpdate::Pending { .. } => panic!("第二条更新应为 complete"),
    }
}

#[tokio::test]
async fn plain_flow_carries_no_bodies() {
    let h = NormalizerHarness::new();
    let flow_id = test_flow_id();

    h.normalizer.on_request(plain_request(&flow_id));
    match h.pop() {
        FlowUpdate::Pending {
            record,
            llm_request_body,
        } => {
            assert!(!record.is_llm_call);
            assert!(llm_request_body.is_none());
        }
        FlowUpdate::Complete { .. } => panic!("应为 pending"),
    }
}

#[tokio::test]
async fn oversized_llm_body_is_not_captured() {
    init_test_env();
    let metrics = Arc::new(PipelineMetrics::new());
    let queue = Arc::new(DispatchQueue::new(1, 64, Arc::clone(&metrics)));
    let capture = CaptureConfig {
        max_body_bytes: 16,
        ..CaptureConfig::default()
    };
    let normalizer = FlowNormalizer::new(
        Arc::clone(&queue),
        &ClassifierConfig::default(),
        capture,
        metrics,
    );

    let flow_id = test_flow_id();
    normalizer.on_request(llm_request(&flow_id, "api.anthropic.com", "/v1/messages"));

    match queue.try_pop(0).unwrap() {
        FlowUpdate::Pending {
            record,
            llm_request_body,
        } => {
            // 超限的体不随队列传递，但指纹仍然计算
            assert!(llm_request_body.is_none());
            assert!(record.request_body_digest.is_some());
        }
        FlowUpdate::Complete { .. } => panic!("应为 pending"),
    }
}

#[tokio::test]
async fn orphan_response_still_completes() {
    let h = NormalizerHarness::new();
    let flow_id = test_flow_id();

    // 没有对应请求的响应
    h.normalizer.on_response(plain_response(&flow_id, 502));

    let update = h.pop();
    assert!(!update.is_pending());
    let record = update.record();
    assert_eq!(record.status_code, Some(502));
    assert_eq!(record.method, "-");
}

#[tokio::test]
async fn malformed_events_never_reach_queue() {
    let h = NormalizerHarness::new();

    h.normalizer.on_request(plain_request(""));
    h.normalizer.on_response(plain_response("", 200));
    h.normalizer.on_error(error_event("", "boom"));

    assert!(h.queue.is_empty());
    assert_eq!(h.metrics.snapshot().malformed_events, 3);
}

#[tokio::test]
async fn stale_pending_state_is_pruned() {
    let h = NormalizerHarness::new();

    h.normalizer
        .on_request(llm_request(&test_flow_id(), "api.anthropic.com", "/v1/messages"));
    assert_eq!(h.normalizer.pending_len(), 1);

    // 零秒阈值下所有条目都算超龄
    let removed = h.normalizer.prune_stale(chrono::Duration::zero());
    assert_eq!(removed, 1);
    assert_eq!(h.normalizer.pending_len(), 0);
}
