//! # 实体辅助方法测试

use crate::{flow_records, llm_spans};
use chrono::NaiveDate;

fn sample_flow(completed: bool) -> flow_records::Model {
    let started = NaiveDate::from_ymd_opt(2026, 7, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    flow_records::Model {
        id: 1,
        flow_id: "flow-0001".to_string(),
        method: "POST".to_string(),
        host: "api.anthropic.com".to_string(),
        path: "/v1/messages".to_string(),
        request_headers: Some(r#"[["content-type","application/json"]]"#.to_string()),
        request_body_digest: Some("ab".repeat(32)),
        status_code: completed.then_some(200),
        response_headers: None,
        response_body_digest: None,
        is_llm_call: true,
        error_message: None,
        rate_limit_snapshot: None,
        started_at: started,
        completed_at: completed.then(|| started + chrono::Duration::milliseconds(1500)),
        created_at: started,
    }
}

#[test]
fn flow_record_lifecycle_helpers() {
    let pending = sample_flow(false);
    assert!(!pending.is_complete());
    assert_eq!(pending.duration_ms(), None);

    let complete = sample_flow(true);
    assert!(complete.is_complete());
    assert_eq!(complete.duration_ms(), Some(1500));
}

#[test]
fn flow_record_header_parsing() {
    let record = sample_flow(false);
    let headers = record.get_request_headers().unwrap();
    assert_eq!(headers.len(), 1);
    assert_eq!(headers[0].0, "content-type");

    // 缺省字段解析为空序列
    assert!(record.get_response_headers().unwrap().is_empty());
}

#[test]
fn export_status_round_trip() {
    use llm_spans::ExportStatus;

    assert_eq!(ExportStatus::from("sent"), ExportStatus::Sent);
    assert_eq!(ExportStatus::from("failed"), ExportStatus::Failed);
    // 未知字符串回落到 pending
    assert_eq!(ExportStatus::from("bogus"), ExportStatus::Pending);
    assert_eq!(ExportStatus::Pending.as_str(), "pending");
}
