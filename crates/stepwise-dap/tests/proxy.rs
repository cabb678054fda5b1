//! Proxy lifecycle against a scripted backend

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use stepwise_config::AdapterConnectionConfig;
use stepwise_dap::constants::{events, requests};
use stepwise_dap::policy::JavaScriptPolicy;
use stepwise_dap::{
    BackendPolicy, Error, HandshakeOrder, HandshakePlan, Proxy, ProxyEvent, ProxyState,
    SetBreakpointsArguments, SourceBreakpoint, SpawnConfig, TransportKind,
};
use stepwise_testing::{FakeBackend, InMemoryConnector, MockPolicy, Rule};
use tokio::sync::broadcast;

const WAIT: Duration = Duration::from_secs(5);

fn config() -> AdapterConnectionConfig {
    AdapterConnectionConfig {
        request_timeout_ms: 2_000,
        ready_timeout_ms: 2_000,
        shutdown_timeout_ms: 500,
        ..Default::default()
    }
}

fn proxy_with(
    policy: Arc<dyn BackendPolicy>,
    backend: &FakeBackend,
) -> (Arc<Proxy>, Arc<InMemoryConnector>) {
    let connector = Arc::new(InMemoryConnector::new(backend.clone()));
    let proxy = Proxy::new(policy, connector.clone(), config());
    (proxy, connector)
}

fn stdio_spawn() -> SpawnConfig {
    SpawnConfig::new("mock-dap", TransportKind::Stdio)
}

fn batch(path: &str, lines: &[u32]) -> SetBreakpointsArguments {
    SetBreakpointsArguments::for_file(
        path,
        lines.iter().map(|l| SourceBreakpoint::at_line(*l)).collect(),
    )
}

async fn next_matching<F>(events: &mut broadcast::Receiver<ProxyEvent>, mut pred: F) -> ProxyEvent
where
    F: FnMut(&ProxyEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event channel failed: {}", e),
            }
        }
    })
    .await
    .expect("event not observed")
}

#[tokio::test]
async fn test_handshake_launch_then_configure_order() {
    let backend = FakeBackend::new();
    let (proxy, _) = proxy_with(Arc::new(MockPolicy::default()), &backend);

    proxy.start(&stdio_spawn()).await.unwrap();
    assert_eq!(proxy.state().await, ProxyState::Ready);

    let plan = HandshakePlan::launch(json!({"program": "/tmp/app"}))
        .with_breakpoints(vec![batch("/tmp/a.py", &[3, 7]), batch("/tmp/b.py", &[1])]);
    let outcome = proxy.handshake(plan).await.unwrap();

    assert_eq!(
        backend.commands(),
        vec![
            requests::INITIALIZE,
            requests::LAUNCH,
            requests::SET_BREAKPOINTS,
            requests::SET_BREAKPOINTS,
            requests::CONFIGURATION_DONE,
        ]
    );
    assert_eq!(outcome.breakpoint_results.len(), 2);
    assert_eq!(outcome.breakpoint_results[0].path, "/tmp/a.py");
    let first = outcome.breakpoint_results[0].result.as_ref().unwrap();
    assert_eq!(first.len(), 2);
    assert!(first.iter().all(|bp| bp.verified));
    assert_eq!(outcome.capabilities.supports_configuration_done_request, Some(true));
    assert!(proxy.capabilities().await.is_some());
    assert!(outcome.initial_stop.is_none());
}

#[tokio::test]
async fn test_deferred_handshake_configures_before_launch_completes() {
    let backend = FakeBackend::new();
    let (proxy, _) = proxy_with(
        Arc::new(MockPolicy::new(HandshakeOrder::DeferredLaunchResponse)),
        &backend,
    );
    proxy.start(&stdio_spawn()).await.unwrap();

    let plan = HandshakePlan::launch(json!({"program": "/tmp/app", "stopOnEntry": true}))
        .with_breakpoints(vec![batch("/tmp/a.py", &[4])]);
    let outcome = proxy.handshake(plan).await.unwrap();

    let commands = backend.commands();
    assert_eq!(commands[0], requests::INITIALIZE);
    assert_eq!(commands[1], requests::LAUNCH);
    assert_eq!(commands.last().map(String::as_str), Some(requests::CONFIGURATION_DONE));
    assert_eq!(outcome.initial_stop.map(|s| s.reason), Some("entry".to_string()));
}

#[tokio::test]
async fn test_rejected_batch_does_not_fail_handshake() {
    let backend = FakeBackend::new();
    backend.once(requests::SET_BREAKPOINTS, Rule::failure("invalid condition"));
    let (proxy, _) = proxy_with(Arc::new(MockPolicy::default()), &backend);
    proxy.start(&stdio_spawn()).await.unwrap();

    let plan = HandshakePlan::launch(json!({}))
        .with_breakpoints(vec![batch("/tmp/a.py", &[1]), batch("/tmp/b.py", &[2])]);
    let outcome = proxy.handshake(plan).await.unwrap();

    match &outcome.breakpoint_results[0].result {
        Err(Error::RequestFailed { message, .. }) => assert!(message.contains("invalid condition")),
        other => panic!("unexpected {:?}", other),
    }
    assert!(outcome.breakpoint_results[1].result.is_ok());
}

#[tokio::test]
async fn test_initialize_failure_is_reported() {
    let backend = FakeBackend::new();
    backend.on(requests::INITIALIZE, Rule::failure("unsupported client"));
    let (proxy, _) = proxy_with(Arc::new(MockPolicy::default()), &backend);
    proxy.start(&stdio_spawn()).await.unwrap();

    let err = proxy.handshake(HandshakePlan::launch(json!({}))).await.unwrap_err();
    assert!(matches!(err, Error::InitializationFailed(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_start_failure_leaves_proxy_restartable() {
    let backend = FakeBackend::new();
    let (proxy, connector) = proxy_with(Arc::new(MockPolicy::default()), &backend);
    connector.fail_next(Error::ExecutableNotFound("mock-dap".to_string()));

    let err = proxy.start(&stdio_spawn()).await.unwrap_err();
    assert!(matches!(err, Error::ExecutableNotFound(_)));
    assert_eq!(proxy.state().await, ProxyState::Failed);

    proxy.start(&stdio_spawn()).await.unwrap();
    assert!(proxy.is_running().await);
    assert_eq!(connector.spawns().len(), 2);
}

#[tokio::test]
async fn test_request_before_start_is_not_running() {
    let backend = FakeBackend::new();
    let (proxy, _) = proxy_with(Arc::new(MockPolicy::default()), &backend);
    let err = proxy.threads().await.unwrap_err();
    assert!(matches!(err, Error::NotRunning(_)));
}

#[tokio::test]
async fn test_stop_event_caches_thread_and_is_relayed() {
    let backend = FakeBackend::new();
    let (proxy, _) = proxy_with(Arc::new(MockPolicy::default()), &backend);
    proxy.start(&stdio_spawn()).await.unwrap();
    let mut events = proxy.subscribe();

    backend
        .emit(events::STOPPED, Some(json!({"reason": "breakpoint", "threadId": 7})))
        .await;

    let event = next_matching(&mut events, |e| matches!(e, ProxyEvent::Stopped(_))).await;
    match event {
        ProxyEvent::Stopped(body) => assert_eq!(body.reason, "breakpoint"),
        _ => unreachable!(),
    }
    assert_eq!(proxy.current_thread_id().await, Some(7));
}

#[tokio::test]
async fn test_transport_close_is_published() {
    let backend = FakeBackend::new();
    backend.on(requests::EVALUATE, Rule::success().then_close());
    let (proxy, _) = proxy_with(Arc::new(MockPolicy::default()), &backend);
    proxy.start(&stdio_spawn()).await.unwrap();
    let mut events = proxy.subscribe();

    let _ = proxy.send_request(requests::EVALUATE, None).await;
    next_matching(&mut events, |e| *e == ProxyEvent::Closed).await;

    assert!(!proxy.is_running().await);
    let err = proxy.threads().await.unwrap_err();
    assert!(matches!(err, Error::NotRunning(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_commands_queue_until_ready() {
    let backend = FakeBackend::new();
    let (proxy, _) = proxy_with(Arc::new(JavaScriptPolicy), &backend);
    proxy.start(&stdio_spawn()).await.unwrap();

    let queued = {
        let proxy = proxy.clone();
        tokio::spawn(async move { proxy.threads().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.count(requests::THREADS), 0);

    backend.emit(events::INITIALIZED, None).await;
    let threads = tokio::time::timeout(WAIT, queued).await.unwrap().unwrap().unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(backend.count(requests::THREADS), 1);
    assert!(proxy.adapter_state().await.initialized);
}

#[tokio::test]
async fn test_unsupported_reverse_request_is_rejected() {
    let backend = FakeBackend::new();
    let (proxy, _) = proxy_with(Arc::new(MockPolicy::default()), &backend);
    proxy.start(&stdio_spawn()).await.unwrap();

    backend
        .send_reverse_request(
            "startDebugging",
            Some(json!({"configuration": {}, "request": "launch"})),
        )
        .await;

    let deadline = tokio::time::Instant::now() + WAIT;
    while backend.reverse_responses().is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let responses = backend.reverse_responses();
    assert_eq!(responses.len(), 1);
    assert!(!responses[0].success);
    assert!(!proxy.has_child_session().await);
}

#[cfg(unix)]
#[tokio::test]
async fn test_run_in_terminal_spawns_and_answers_with_pid() {
    let backend = FakeBackend::new();
    let (proxy, _) = proxy_with(Arc::new(MockPolicy::default()), &backend);
    proxy.start(&stdio_spawn()).await.unwrap();

    backend
        .send_reverse_request(
            "runInTerminal",
            Some(json!({"kind": "integrated", "cwd": "", "args": ["sleep", "30"]})),
        )
        .await;

    let deadline = tokio::time::Instant::now() + WAIT;
    while backend.reverse_responses().is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let responses = backend.reverse_responses();
    assert!(responses[0].success);
    assert!(responses[0].body.as_ref().unwrap()["processId"].as_u64().is_some());

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_child_session_receives_routed_commands() {
    let parent = FakeBackend::new();
    let child = FakeBackend::new();
    let connector = Arc::new(InMemoryConnector::new(parent.clone()).with_child(child.clone()));
    let proxy = Proxy::new(Arc::new(JavaScriptPolicy), connector.clone(), config());

    let spawn = SpawnConfig::new(
        "node",
        TransportKind::TcpConnect {
            host: "127.0.0.1".to_string(),
            port: 38123,
        },
    );
    proxy.start(&spawn).await.unwrap();
    proxy
        .handshake(HandshakePlan::launch(json!({"program": "/app/index.js"})))
        .await
        .unwrap();
    proxy.set_breakpoints(&batch("/app/index.js", &[5])).await.unwrap();

    parent
        .send_reverse_request(
            "startDebugging",
            Some(json!({
                "configuration": {"type": "pwa-node", "__pendingTargetId": "t1"},
                "request": "launch"
            })),
        )
        .await;

    // The reverse request is answered once the child is attached
    let deadline = tokio::time::Instant::now() + WAIT;
    while parent.reverse_responses().is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(parent.reverse_responses()[0].success);
    assert!(proxy.has_child_session().await);
    assert!(proxy.adapter_state().await.child_active);
    assert_eq!(connector.child_connects(), vec![("127.0.0.1".to_string(), 38123)]);

    // Mirrored breakpoints were replayed before configurationDone
    let child_commands = child.commands();
    let replay = child_commands
        .iter()
        .position(|c| c == requests::SET_BREAKPOINTS)
        .unwrap();
    let done = child_commands
        .iter()
        .position(|c| c == requests::CONFIGURATION_DONE)
        .unwrap();
    assert!(replay < done);
    assert_eq!(
        child.requests_for(requests::LAUNCH)[0].arguments.as_ref().unwrap()["__pendingTargetId"],
        json!("t1")
    );

    let threads_before = parent.count(requests::THREADS);
    proxy.threads().await.unwrap();
    assert_eq!(child.count(requests::THREADS), 1);
    assert_eq!(parent.count(requests::THREADS), threads_before);
}

#[tokio::test]
async fn test_shutdown_disconnects_and_is_idempotent() {
    let backend = FakeBackend::new();
    let (proxy, _) = proxy_with(Arc::new(MockPolicy::default()), &backend);
    proxy.start(&stdio_spawn()).await.unwrap();

    proxy.shutdown().await.unwrap();
    proxy.shutdown().await.unwrap();

    assert_eq!(proxy.state().await, ProxyState::Stopped);
    let disconnects = backend.requests_for(requests::DISCONNECT);
    assert_eq!(disconnects.len(), 1);
    assert_eq!(
        disconnects[0].arguments.as_ref().unwrap()["terminateDebuggee"],
        json!(true)
    );
    assert!(!proxy.is_running().await);
}
