//! Breakpoint queueing, batch replacement and verification

mod common;

use common::{Harness, WAIT};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use stepwise_core::{Error, ErrorCode, SessionId};
use stepwise_testing::Rule;

const FILE: &str = "/src/app.py";

/// Lines of every `setBreakpoints` request for `path`, in send order
fn sent_batches(h: &Harness, path: &str) -> Vec<Vec<i64>> {
    h.backend
        .requests_for("setBreakpoints")
        .into_iter()
        .filter_map(|r| r.arguments)
        .filter(|args| args["source"]["path"] == json!(path))
        .map(|args| {
            args["breakpoints"]
                .as_array()
                .map(|list| list.iter().filter_map(|bp| bp["line"].as_i64()).collect())
                .unwrap_or_default()
        })
        .collect()
}

#[tokio::test]
async fn test_breakpoints_on_created_session_are_queued() {
    let h = Harness::new();
    let session = h.create();

    for line in [12, 4] {
        let bp = h
            .manager
            .set_breakpoint(&session.id, FILE, line, None)
            .await
            .unwrap();
        assert!(bp.success);
        assert!(!bp.data.unwrap().verified);
    }

    let listed = h.manager.list_breakpoints(&session.id).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed.iter().map(|bp| bp.line).collect::<Vec<_>>(), vec![4, 12]);
    assert!(h.backend.commands().is_empty());
}

#[tokio::test]
async fn test_start_flushes_one_batch_per_file() {
    let h = Harness::new();
    let session = h.create();
    for (file, line) in [(FILE, 7), (FILE, 3), ("/src/util.py", 20)] {
        h.manager
            .set_breakpoint(&session.id, file, line, None)
            .await
            .unwrap();
    }

    let started = h.start(&session.id, h.request()).await;
    assert!(started.success, "{:?}", started.error);

    assert_eq!(sent_batches(&h, FILE), vec![vec![3, 7]]);
    assert_eq!(sent_batches(&h, "/src/util.py"), vec![vec![20]]);
    let commands = h.backend.commands();
    let done = commands.iter().position(|c| c == "configurationDone").unwrap();
    let last_batch = commands.iter().rposition(|c| c == "setBreakpoints").unwrap();
    assert!(last_batch < done);

    let listed = h.manager.list_breakpoints(&session.id).await.unwrap();
    assert!(listed.iter().all(|bp| bp.verified));
}

#[tokio::test]
async fn test_breakpoint_set_during_start_is_flushed_after_configuration() {
    let h = Harness::new();
    let session = h.create();
    h.manager
        .set_breakpoint(&session.id, FILE, 10, None)
        .await
        .unwrap();
    // Hold the handshake after launch until the test emits `initialized`
    h.backend.once(
        "initialize",
        Rule::success_with(json!({"supportsConfigurationDoneRequest": true})),
    );

    let (started, late) = tokio::join!(h.start(&session.id, h.request()), async {
        assert!(h.backend.wait_for_count("launch", 1, WAIT).await);
        let late = h
            .manager
            .set_breakpoint(&session.id, FILE, 20, None)
            .await
            .unwrap();
        assert!(sent_batches(&h, FILE).is_empty());
        h.backend.emit("initialized", None).await;
        late
    });
    assert!(started.success, "{:?}", started.error);
    assert!(late.success);
    assert!(!late.data.unwrap().verified);

    assert_eq!(sent_batches(&h, FILE), vec![vec![10], vec![10, 20]]);
    let commands = h.backend.commands();
    let done = commands.iter().position(|c| c == "configurationDone").unwrap();
    let last_batch = commands.iter().rposition(|c| c == "setBreakpoints").unwrap();
    assert!(last_batch > done);

    let listed = h.manager.list_breakpoints(&session.id).await.unwrap();
    assert_eq!(listed.iter().map(|bp| bp.line).collect::<Vec<_>>(), vec![10, 20]);
    assert!(listed.iter().all(|bp| bp.verified));
}

#[tokio::test]
async fn test_short_backend_response_leaves_breakpoint_unverified() {
    let h = Harness::new();
    let session = h.running_session().await;
    h.manager
        .set_breakpoint(&session.id, FILE, 1, None)
        .await
        .unwrap();
    h.backend.once(
        "setBreakpoints",
        Rule::success_with(json!({"breakpoints": [{"verified": true, "line": 1}]})),
    );

    let bp = h
        .manager
        .set_breakpoint(&session.id, FILE, 8, None)
        .await
        .unwrap()
        .into_data()
        .unwrap();
    assert!(!bp.verified);
    assert!(bp.message.is_some());

    let listed = h.manager.list_breakpoints(&session.id).await.unwrap();
    assert!(listed[0].verified);
    assert!(!listed[1].verified);
}

#[tokio::test]
async fn test_active_breakpoint_replaces_whole_file_set() {
    let h = Harness::new();
    let session = h.running_session().await;

    for line in [9, 2] {
        let bp = h
            .manager
            .set_breakpoint(&session.id, FILE, line, None)
            .await
            .unwrap();
        assert!(bp.data.unwrap().verified);
    }
    assert_eq!(sent_batches(&h, FILE), vec![vec![9], vec![2, 9]]);
}

#[tokio::test]
async fn test_concurrent_breakpoints_in_one_file_are_serialized() {
    let h = Harness::new();
    let session = h.running_session().await;

    let (a, b) = tokio::join!(
        h.manager.set_breakpoint(&session.id, FILE, 10, None),
        h.manager.set_breakpoint(&session.id, FILE, 20, None),
    );
    assert!(a.unwrap().success);
    assert!(b.unwrap().success);

    let batches = sent_batches(&h, FILE);
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[1], vec![10, 20]);
    assert_eq!(h.manager.list_breakpoints(&session.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_rejected_conditional_batch_removes_breakpoint() {
    let h = Harness::new();
    let session = h.running_session().await;
    h.backend
        .once("setBreakpoints", Rule::failure("invalid syntax in condition"));

    let bp = h
        .manager
        .set_breakpoint(&session.id, FILE, 5, Some("x >".to_string()))
        .await
        .unwrap();
    assert!(!bp.success);
    assert_eq!(bp.error_code, Some(ErrorCode::ConditionSyntaxInvalid));
    assert!(bp.error.unwrap().contains("invalid syntax"));
    assert!(h.manager.list_breakpoints(&session.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_plain_batch_is_debugger_error() {
    let h = Harness::new();
    let session = h.running_session().await;
    h.manager
        .set_breakpoint(&session.id, FILE, 1, None)
        .await
        .unwrap();
    h.backend.once("setBreakpoints", Rule::failure("file not loaded"));

    let bp = h
        .manager
        .set_breakpoint(&session.id, FILE, 8, None)
        .await
        .unwrap();
    assert_eq!(bp.error_code, Some(ErrorCode::DebuggerError));

    let listed = h.manager.list_breakpoints(&session.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].line, 1);
}

#[tokio::test]
async fn test_condition_validation_comes_from_backend_message() {
    let h = Harness::new();
    let session = h.running_session().await;
    h.backend.once(
        "setBreakpoints",
        Rule::success_with(json!({
            "breakpoints": [{"verified": false, "message": "name 'y' is not defined"}]
        })),
    );

    let bp = h
        .manager
        .set_breakpoint(&session.id, FILE, 5, Some("y > 1".to_string()))
        .await
        .unwrap()
        .into_data()
        .unwrap();
    assert!(!bp.verified);
    assert_eq!(bp.condition_verified, Some(false));
    assert_eq!(bp.condition_error.as_deref(), Some("name 'y' is not defined"));

    // Verified without a message: condition fields stay unset
    let plain = h
        .manager
        .set_breakpoint(&session.id, "/src/other.py", 3, Some("z".to_string()))
        .await
        .unwrap()
        .into_data()
        .unwrap();
    assert!(plain.verified);
    assert_eq!(plain.condition_verified, None);
    assert_eq!(plain.condition_error, None);
}

#[tokio::test]
async fn test_condition_is_sent_with_batch() {
    let h = Harness::new();
    let session = h.running_session().await;
    h.manager
        .set_breakpoint(&session.id, FILE, 4, Some("i == 3".to_string()))
        .await
        .unwrap();

    let requests = h.backend.requests_for("setBreakpoints");
    let args: &Value = requests[0].arguments.as_ref().unwrap();
    assert_eq!(args["breakpoints"][0]["condition"], json!("i == 3"));
}

#[tokio::test]
async fn test_invalid_arguments_are_failure_payloads() {
    let h = Harness::new();
    let session = h.create();

    let zero = h
        .manager
        .set_breakpoint(&session.id, FILE, 0, None)
        .await
        .unwrap();
    assert_eq!(zero.error_code, Some(ErrorCode::InvalidArgument));
    let empty = h
        .manager
        .set_breakpoint(&session.id, "  ", 3, None)
        .await
        .unwrap();
    assert_eq!(empty.error_code, Some(ErrorCode::InvalidArgument));
    assert!(h.manager.list_breakpoints(&session.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_session() {
    let h = Harness::new();
    let result = h
        .manager
        .set_breakpoint(&SessionId::new("nope"), FILE, 1, None)
        .await;
    assert!(matches!(result, Err(Error::SessionNotFound(_))));
}
