//! `/api/view` 响应解析的测试

use tilt_monitor::{parse_status_payload, ResourceLabel, RuntimeStatus, UpdateStatus};

/// 一份接近真实 Tilt 的 /api/view 响应（只保留相关字段）
const VIEW_FIXTURE: &str = r#"{
  "view": {},
  "uiResources": [
    {
      "metadata": {"name": "(Tiltfile)"},
      "status": {"updateStatus": "ok", "runtimeStatus": "not_applicable"}
    },
    {
      "metadata": {"name": "postgres", "labels": {"db": "storage"}},
      "status": {"updateStatus": "ok", "runtimeStatus": "ok"}
    },
    {
      "metadata": {"name": "frontend", "labels": {"app": "web"}},
      "status": {"updateStatus": "in_progress", "runtimeStatus": "pending"}
    },
    {
      "metadata": {"name": "background-job"},
      "status": {"updateStatus": "ok", "runtimeStatus": "ok"}
    },
    {
      "metadata": {"name": "not-started-yet"},
      "status": {"updateStatus": "none", "runtimeStatus": "not_applicable"}
    },
    {
      "metadata": {"name": "turned-off"},
      "status": {
        "updateStatus": "ok",
        "runtimeStatus": "ok",
        "disableStatus": {"state": "Disabled"}
      }
    },
    {
      "metadata": {"name": "noisy", "labels": {"app": "web"}},
      "status": {
        "updateStatus": "ok",
        "runtimeStatus": "ok",
        "warnings": ["deprecated base image"]
      }
    }
  ]
}"#;

#[test]
fn test_parse_filters_none_entries() {
    let resources = parse_status_payload(VIEW_FIXTURE).unwrap();
    // updateStatus == none 的条目被丢弃
    assert!(resources.iter().all(|r| r.name != "not-started-yet"));
    assert_eq!(resources.len(), 6);
}

#[test]
fn test_parse_label_derivation() {
    let resources = parse_status_payload(VIEW_FIXTURE).unwrap();

    let tiltfile = resources.iter().find(|r| r.name == "(Tiltfile)").unwrap();
    assert_eq!(tiltfile.label, ResourceLabel::Tiltfile);

    let postgres = resources.iter().find(|r| r.name == "postgres").unwrap();
    assert_eq!(postgres.label, ResourceLabel::Named("storage".to_string()));

    let job = resources.iter().find(|r| r.name == "background-job").unwrap();
    assert_eq!(job.label, ResourceLabel::Unlabeled);
}

#[test]
fn test_parse_sort_order() {
    // 具名标签 A->Z >> unlabeled >> Tiltfile；同标签保持发现顺序
    let resources = parse_status_payload(VIEW_FIXTURE).unwrap();
    let names: Vec<&str> = resources.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "postgres",       // label "storage"... 见下
            "frontend",       // label "web"
            "noisy",          // label "web"，发现顺序在 frontend 之后
            "background-job", // unlabeled
            "turned-off",     // unlabeled
            "(Tiltfile)",     // 固定最后
        ]
    );
}

#[test]
fn test_parse_disable_and_warnings() {
    let resources = parse_status_payload(VIEW_FIXTURE).unwrap();

    let disabled = resources.iter().find(|r| r.name == "turned-off").unwrap();
    assert!(disabled.disabled);

    let noisy = resources.iter().find(|r| r.name == "noisy").unwrap();
    assert!(!noisy.disabled);
    assert_eq!(noisy.warnings, vec!["deprecated base image".to_string()]);
    // warningCount 缺失时退化为 warnings 长度
    assert_eq!(noisy.warning_count, 1);
}

#[test]
fn test_parse_unrecognized_status_maps_to_unknown() {
    let body = r#"{
      "uiResources": [
        {
          "metadata": {"name": "future-thing"},
          "status": {"updateStatus": "galloping", "runtimeStatus": "sideways"}
        }
      ]
    }"#;
    let resources = parse_status_payload(body).unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].update_status, UpdateStatus::Unknown);
    assert_eq!(resources[0].runtime_status, RuntimeStatus::Unknown);
}

#[test]
fn test_parse_missing_resources_key_is_empty() {
    assert!(parse_status_payload("{}").unwrap().is_empty());
    assert!(parse_status_payload(r#"{"uiResources": []}"#).unwrap().is_empty());
}

#[test]
fn test_parse_malformed_body_is_an_error() {
    assert!(parse_status_payload("<html>502 Bad Gateway</html>").is_err());
    assert!(parse_status_payload("").is_err());
}
