//! Session lifecycle: create, start, dry run, termination and close

mod common;

use common::{next_event, Harness};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use stepwise_config::Config;
use stepwise_core::{
    CloseOutcome, Error, ErrorCode, ExecutionState, SessionLifecycle, SourceLocation,
    StartOutcome,
};
use stepwise_dap::{AdapterRegistry, EnvironmentReport};
use stepwise_session::{SessionEvent, SessionManager};
use stepwise_testing::{
    FakeBackend, InMemoryConnector, MockAdapterFactory, Rule, DEFAULT_SOURCE_PATH,
};

#[tokio::test]
async fn test_start_runs_handshake_and_settles_running() {
    let h = Harness::new();
    let session = h.create();

    let started = h.start(&session.id, h.request()).await;
    assert!(started.success, "{:?}", started.error);
    assert_eq!(
        started.data,
        Some(StartOutcome::Started {
            state: ExecutionState::Running,
            location: None,
        })
    );
    assert_eq!(
        h.backend.commands(),
        vec!["initialize", "launch", "configurationDone"]
    );

    let snapshot = h.manager.get_session(&session.id).await.unwrap();
    assert_eq!(snapshot.lifecycle(), SessionLifecycle::Active);
    assert_eq!(h.connector.spawns().len(), 1);
}

#[tokio::test]
async fn test_stop_on_entry_reports_paused_with_location() {
    let h = Harness::new();
    let session = h.create();

    let started = h.start(&session.id, h.request().stop_on_entry()).await;
    let expected = SourceLocation {
        file: DEFAULT_SOURCE_PATH.to_string(),
        line: 10,
    };
    assert_eq!(
        started.data,
        Some(StartOutcome::Started {
            state: ExecutionState::Paused,
            location: Some(expected.clone()),
        })
    );
    let snapshot = h.manager.get_session(&session.id).await.unwrap();
    assert!(snapshot.is_paused());
    assert_eq!(snapshot.current_location, Some(expected));
}

#[tokio::test]
async fn test_deferred_launch_response_handshake() {
    let h = Harness::deferred();
    let session = h.create();

    let started = h.start(&session.id, h.request()).await;
    assert!(started.success, "{:?}", started.error);
    assert_eq!(
        h.backend.commands(),
        vec!["initialize", "launch", "configurationDone"]
    );
}

#[tokio::test]
async fn test_dry_run_spawns_nothing() {
    let h = Harness::new();
    let session = h.create();

    let started = h.start(&session.id, h.request().dry_run()).await;
    match started.data {
        Some(StartOutcome::DryRun {
            command_line,
            transport,
        }) => {
            assert!(command_line.starts_with("/usr/local/bin/mock-dap --port "));
            assert_eq!(transport, "stdio");
        }
        other => panic!("expected a dry run, got {:?}", other),
    }
    assert!(h.connector.spawns().is_empty());
    assert!(h.backend.commands().is_empty());

    let snapshot = h.manager.get_session(&session.id).await.unwrap();
    assert_eq!(snapshot.lifecycle(), SessionLifecycle::Created);
}

#[tokio::test]
async fn test_missing_target_is_a_failure_payload() {
    let h = Harness::new();
    let session = h.create();

    let started = h
        .start(
            &session.id,
            stepwise_session::StartRequest::new("/nonexistent/stepwise/app.py"),
        )
        .await;
    assert!(!started.success);
    assert_eq!(started.error_code, Some(ErrorCode::TargetNotFound));
    let snapshot = h.manager.get_session(&session.id).await.unwrap();
    assert_eq!(snapshot.lifecycle(), SessionLifecycle::Created);
}

#[tokio::test]
async fn test_second_start_is_rejected() {
    let h = Harness::new();
    let session = h.running_session().await;

    let again = h.start(&session.id, h.request()).await;
    assert_eq!(again.error_code, Some(ErrorCode::SessionAlreadyStarted));
    assert_eq!(h.connector.spawns().len(), 1);
}

#[tokio::test]
async fn test_invalid_environment_blocks_start_but_not_dry_run() {
    let mut report = EnvironmentReport::default();
    report.error("mock-dap is not on PATH");
    let h = Harness::with_factory(MockAdapterFactory::new().with_report(report));
    let session = h.create();

    let started = h.start(&session.id, h.request()).await;
    assert_eq!(started.error_code, Some(ErrorCode::EnvironmentInvalid));
    assert!(started.error.unwrap().contains("mock-dap is not on PATH"));

    let dry = h.start(&session.id, h.request().dry_run()).await;
    assert!(dry.success);
    assert!(h.connector.spawns().is_empty());
}

#[tokio::test]
async fn test_unregistered_language_is_not_installed() {
    let backend = FakeBackend::new();
    let manager = SessionManager::with_parts(
        Arc::new(AdapterRegistry::new()),
        Arc::new(InMemoryConnector::new(backend)),
        &Config::default(),
    );
    let session = manager
        .create_session("mock", None, None)
        .into_data()
        .unwrap();
    let target = tempfile::NamedTempFile::new().unwrap();

    let started = manager
        .start_debugging(&session.id, stepwise_session::StartRequest::new(target.path()))
        .await
        .unwrap();
    assert_eq!(started.error_code, Some(ErrorCode::AdapterNotInstalled));
}

#[tokio::test]
async fn test_spawn_failure_moves_to_error() {
    let h = Harness::new();
    h.connector
        .fail_next(stepwise_dap::Error::Communication("spawn failed".into()));
    let session = h.create();

    let started = h.start(&session.id, h.request()).await;
    assert!(!started.success);
    let snapshot = h.manager.get_session(&session.id).await.unwrap();
    assert_eq!(snapshot.execution_state(), Some(ExecutionState::Error));

    // Error sessions answer with payloads and still close
    let step = h.manager.step_over(&session.id).await.unwrap();
    assert_eq!(step.error_code, Some(ErrorCode::NotPaused));
    let closed = h.manager.close_session(&session.id).await;
    assert_eq!(closed.data, Some(CloseOutcome { closed: true }));
}

#[tokio::test]
async fn test_handshake_failure_moves_to_error() {
    let h = Harness::new();
    h.backend.once("initialize", Rule::failure("adapter crashed"));
    let session = h.create();

    let started = h.start(&session.id, h.request()).await;
    assert!(!started.success);
    assert_eq!(started.error_code, Some(ErrorCode::DebuggerError));
    let snapshot = h.manager.get_session(&session.id).await.unwrap();
    assert_eq!(snapshot.execution_state(), Some(ExecutionState::Error));
}

#[tokio::test]
async fn test_terminated_event_makes_session_inert() {
    let h = Harness::new();
    let session = h.running_session().await;
    let mut events = h.manager.subscribe(&session.id).await.unwrap();

    h.backend.emit("exited", Some(json!({"exitCode": 3}))).await;
    let event = next_event(&mut events, |e| matches!(e, SessionEvent::Terminated { .. })).await;
    assert_eq!(event, SessionEvent::Terminated { exit_code: Some(3) });

    let snapshot = h.manager.get_session(&session.id).await.unwrap();
    assert_eq!(snapshot.lifecycle(), SessionLifecycle::Terminated);
    assert_eq!(snapshot.execution_state(), None);

    let step = h.manager.step_over(&session.id).await;
    assert!(matches!(step, Err(Error::SessionTerminated(_))));
    let bp = h
        .manager
        .set_breakpoint(&session.id, "/src/app.py", 3, None)
        .await;
    assert!(matches!(bp, Err(Error::SessionTerminated(_))));
    assert!(h.manager.list_breakpoints(&session.id).await.unwrap().is_empty());

    let closed = h.manager.close_session(&session.id).await;
    assert_eq!(closed.data, Some(CloseOutcome { closed: true }));
}

#[tokio::test]
async fn test_transport_close_moves_to_error() {
    let h = Harness::new();
    let session = h.paused_session().await;
    let mut events = h.manager.subscribe(&session.id).await.unwrap();
    h.backend
        .once("evaluate", Rule::failure("adapter exiting").then_close());

    let evaluated = h
        .manager
        .evaluate_expression(&session.id, "x", None)
        .await
        .unwrap();
    assert!(!evaluated.success);

    next_event(&mut events, |e| *e == SessionEvent::TransportClosed).await;
    let snapshot = h.manager.get_session(&session.id).await.unwrap();
    assert_eq!(snapshot.execution_state(), Some(ExecutionState::Error));

    let frames = h.manager.get_stack_trace(&session.id, false).await.unwrap();
    assert_eq!(frames.data, Some(Vec::new()));
}

#[tokio::test]
async fn test_output_is_buffered_and_published() {
    let h = Harness::new();
    let session = h.running_session().await;
    let mut events = h.manager.subscribe(&session.id).await.unwrap();

    h.backend
        .emit("output", Some(json!({"category": "telemetry", "output": "{}"})))
        .await;
    h.backend
        .emit("output", Some(json!({"category": "stdout", "output": "hello\n"})))
        .await;
    next_event(&mut events, |e| matches!(e, SessionEvent::Output(_))).await;

    let output = h.manager.get_output(&session.id).await.unwrap();
    assert_eq!(output.len(), 1);
    assert_eq!(output[0].category, "stdout");
    assert_eq!(output[0].text, "hello\n");
}

#[tokio::test]
async fn test_close_disconnects_and_removes() {
    let h = Harness::new();
    let session = h.running_session().await;
    let mut events = h.manager.subscribe(&session.id).await.unwrap();

    let closed = h.manager.close_session(&session.id).await;
    assert_eq!(closed.data, Some(CloseOutcome { closed: true }));
    assert_eq!(h.backend.count("disconnect"), 1);
    let disconnect = &h.backend.requests_for("disconnect")[0];
    assert_eq!(
        disconnect.arguments.as_ref().unwrap()["terminateDebuggee"],
        json!(true)
    );

    next_event(&mut events, |e| matches!(e, SessionEvent::Terminated { .. })).await;
    assert!(matches!(
        h.manager.get_session(&session.id).await,
        Err(Error::SessionNotFound(_))
    ));
    let again = h.manager.close_session(&session.id).await;
    assert_eq!(again.data, Some(CloseOutcome { closed: false }));
}

#[tokio::test]
async fn test_close_all_sessions_closes_concurrently() {
    let h = Harness::new();
    let first = h.running_session().await;
    let second = h.create();

    assert_eq!(h.manager.close_all_sessions().await, 2);
    for id in [&first.id, &second.id] {
        assert!(h.manager.get_session(id).await.is_err());
    }
    assert_eq!(h.manager.close_all_sessions().await, 0);
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let h = Harness::new();
    let paused = h.paused_session().await;
    let created = h.create();

    let stepped = h.manager.step_over(&paused.id).await.unwrap();
    assert!(stepped.success, "{:?}", stepped.error);

    let untouched = h.manager.get_session(&created.id).await.unwrap();
    assert_eq!(untouched.lifecycle(), SessionLifecycle::Created);
    let listed = h.manager.list_sessions().await;
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().any(|s| s.id == paused.id && s.execution_state.is_some()));
}

#[tokio::test]
async fn test_unknown_session_is_a_usage_error() {
    let h = Harness::new();
    let missing = stepwise_core::SessionId::new("missing");
    let err = h.manager.step_over(&missing).await.unwrap_err();
    assert!(err.is_usage_error());
    assert_eq!(err.code(), ErrorCode::SessionNotFound);
}
