//! Scripted fake DAP backend
//!
//! Answers every request with a plausible default (capabilities, one thread,
//! a two-frame stack, a `Locals` scope, verified breakpoints, a stop after
//! each step) unless a [`Rule`] overrides the command. Rules registered with
//! [`FakeBackend::once`] are consumed first, then those from
//! [`FakeBackend::on`].

use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use stepwise_dap::constants::{events, requests};
use stepwise_dap::transport::{BoxedReader, BoxedWriter};
use stepwise_dap::{read_message, write_message, Event, ProtocolMessage, Request, Response};
use tokio::io::{AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tracing::trace;

pub const DEFAULT_SOURCE_PATH: &str = "/tmp/stepwise/main.py";
pub const DEFAULT_SOURCE_LINE: i64 = 10;

const PIPE_CAPACITY: usize = 64 * 1024;

type ServerWriter = Arc<tokio::sync::Mutex<WriteHalf<DuplexStream>>>;

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Success(Option<Value>),
    Failure(String),
    /// Never answer
    Silent,
}

/// Scripted answer to one command
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub reply: Reply,
    /// Events sent after the reply, in order
    pub events: Vec<(String, Option<Value>)>,
    /// Close the connection after the events
    pub close: bool,
}

impl Rule {
    pub fn success() -> Self {
        Self::reply(Reply::Success(None))
    }

    pub fn success_with(body: Value) -> Self {
        Self::reply(Reply::Success(Some(body)))
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::reply(Reply::Failure(message.into()))
    }

    pub fn silent() -> Self {
        Self::reply(Reply::Silent)
    }

    fn reply(reply: Reply) -> Self {
        Self {
            reply,
            events: Vec::new(),
            close: false,
        }
    }

    pub fn then_event(mut self, name: impl Into<String>, body: Option<Value>) -> Self {
        self.events.push((name.into(), body));
        self
    }

    pub fn then_stopped(self, reason: &str, thread_id: i64) -> Self {
        self.then_event(
            events::STOPPED,
            Some(json!({"reason": reason, "threadId": thread_id, "allThreadsStopped": true})),
        )
    }

    pub fn then_close(mut self) -> Self {
        self.close = true;
        self
    }
}

#[derive(Default)]
struct Inner {
    once: Mutex<HashMap<String, VecDeque<Rule>>>,
    rules: Mutex<HashMap<String, Rule>>,
    requests: Mutex<Vec<Request>>,
    reverse_responses: Mutex<Vec<Response>>,
    location: Mutex<Option<(String, i64)>>,
    writers: Mutex<Vec<ServerWriter>>,
    seq: AtomicI64,
    breakpoint_ids: AtomicI64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A DAP server living in this process. Cloning shares the script and the
/// request log.
#[derive(Clone, Default)]
pub struct FakeBackend {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for FakeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeBackend")
            .field("requests", &lock(&self.inner.requests).len())
            .finish_non_exhaustive()
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `command` with `rule` from now on
    pub fn on(&self, command: &str, rule: Rule) -> &Self {
        lock(&self.inner.rules).insert(command.to_string(), rule);
        self
    }

    /// Answer the next `command` with `rule`, ahead of persistent rules
    pub fn once(&self, command: &str, rule: Rule) -> &Self {
        lock(&self.inner.once)
            .entry(command.to_string())
            .or_default()
            .push_back(rule);
        self
    }

    /// Location reported by default stack traces
    pub fn set_location(&self, path: impl Into<String>, line: i64) {
        *lock(&self.inner.location) = Some((path.into(), line));
    }

    /// Open a client connection served by this backend
    pub fn connect(&self) -> (BoxedReader, BoxedWriter) {
        let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
        let (server_read, server_write) = tokio::io::split(server);
        let writer: ServerWriter = Arc::new(tokio::sync::Mutex::new(server_write));

        lock(&self.inner.writers).push(writer.clone());
        let inner = self.inner.clone();
        tokio::spawn(serve(inner, BufReader::new(server_read), writer));

        let (client_read, client_write) = tokio::io::split(client);
        (Box::new(client_read), Box::new(client_write))
    }

    /// Send an event on every open connection
    pub async fn emit(&self, name: &str, body: Option<Value>) {
        let writers = lock(&self.inner.writers).clone();
        for writer in writers {
            let _ = send_event(&self.inner, &writer, name, body.clone()).await;
        }
    }

    /// Send a reverse request on every open connection
    pub async fn send_reverse_request(&self, command: &str, arguments: Option<Value>) {
        let writers = lock(&self.inner.writers).clone();
        for writer in writers {
            let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst) + 1;
            let mut request = Request::new(seq, command);
            if let Some(arguments) = arguments.clone() {
                request = request.with_arguments(arguments);
            }
            let mut guard = writer.lock().await;
            let _ = write_message(&mut *guard, &ProtocolMessage::Request(request)).await;
        }
    }

    pub fn requests(&self) -> Vec<Request> {
        lock(&self.inner.requests).clone()
    }

    pub fn commands(&self) -> Vec<String> {
        lock(&self.inner.requests)
            .iter()
            .map(|r| r.command.clone())
            .collect()
    }

    pub fn requests_for(&self, command: &str) -> Vec<Request> {
        lock(&self.inner.requests)
            .iter()
            .filter(|r| r.command == command)
            .cloned()
            .collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.requests_for(command).len()
    }

    /// Responses the client sent to reverse requests
    pub fn reverse_responses(&self) -> Vec<Response> {
        lock(&self.inner.reverse_responses).clone()
    }

    /// Poll until `command` has been received `n` times
    pub async fn wait_for_count(&self, command: &str, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.count(command) >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.count(command) >= n
    }
}

async fn serve(
    inner: Arc<Inner>,
    mut reader: BufReader<ReadHalf<DuplexStream>>,
    writer: ServerWriter,
) {
    loop {
        match read_message(&mut reader).await {
            Ok(Some(ProtocolMessage::Request(request))) => {
                trace!(command = %request.command, "Fake backend received request");
                lock(&inner.requests).push(request.clone());
                let rule = next_rule(&inner, &request);
                if !answer(&inner, &writer, &request, rule).await {
                    break;
                }
            }
            Ok(Some(ProtocolMessage::Response(response))) => {
                lock(&inner.reverse_responses).push(response);
            }
            Ok(Some(ProtocolMessage::Event(_))) => {}
            Ok(None) | Err(_) => break,
        }
    }
    lock(&inner.writers).retain(|w| !Arc::ptr_eq(w, &writer));
}

/// Write the reply and events; false when the connection should close
async fn answer(inner: &Inner, writer: &ServerWriter, request: &Request, rule: Rule) -> bool {
    let response = match rule.reply {
        Reply::Success(body) => Some(Response {
            seq: inner.seq.fetch_add(1, Ordering::SeqCst) + 1,
            request_seq: request.seq,
            command: request.command.clone(),
            success: true,
            message: None,
            body,
        }),
        Reply::Failure(message) => Some(Response {
            seq: inner.seq.fetch_add(1, Ordering::SeqCst) + 1,
            request_seq: request.seq,
            command: request.command.clone(),
            success: false,
            message: Some(message),
            body: None,
        }),
        Reply::Silent => None,
    };

    if let Some(response) = response {
        let mut guard = writer.lock().await;
        if write_message(&mut *guard, &ProtocolMessage::Response(response))
            .await
            .is_err()
        {
            return false;
        }
    }
    for (name, body) in rule.events {
        if send_event(inner, writer, &name, body).await.is_err() {
            return false;
        }
    }
    if rule.close {
        let _ = writer.lock().await.shutdown().await;
        return false;
    }
    true
}

async fn send_event(
    inner: &Inner,
    writer: &ServerWriter,
    name: &str,
    body: Option<Value>,
) -> stepwise_dap::Result<()> {
    let mut event = Event::new(inner.seq.fetch_add(1, Ordering::SeqCst) + 1, name);
    if let Some(body) = body {
        event = event.with_body(body);
    }
    let mut guard = writer.lock().await;
    write_message(&mut *guard, &ProtocolMessage::Event(event)).await
}

fn next_rule(inner: &Inner, request: &Request) -> Rule {
    if let Some(rule) = lock(&inner.once)
        .get_mut(&request.command)
        .and_then(VecDeque::pop_front)
    {
        return rule;
    }
    if let Some(rule) = lock(&inner.rules).get(&request.command) {
        return rule.clone();
    }
    default_rule(inner, request)
}

fn default_rule(inner: &Inner, request: &Request) -> Rule {
    let (path, line) = lock(&inner.location)
        .clone()
        .unwrap_or_else(|| (DEFAULT_SOURCE_PATH.to_string(), DEFAULT_SOURCE_LINE));
    let arguments = request.arguments.clone().unwrap_or(Value::Null);

    match request.command.as_str() {
        requests::INITIALIZE => Rule::success_with(json!({
            "supportsConfigurationDoneRequest": true,
            "supportsConditionalBreakpoints": true,
            "supportsTerminateRequest": true,
        }))
        .then_event(events::INITIALIZED, None),
        requests::LAUNCH | requests::ATTACH => {
            let rule = Rule::success();
            if arguments["stopOnEntry"].as_bool() == Some(true) {
                rule.then_stopped("entry", 1)
            } else {
                rule
            }
        }
        requests::SET_BREAKPOINTS => {
            let breakpoints: Vec<Value> = arguments["breakpoints"]
                .as_array()
                .map(|list| {
                    list.iter()
                        .map(|bp| {
                            json!({
                                "id": inner.breakpoint_ids.fetch_add(1, Ordering::SeqCst) + 1,
                                "verified": true,
                                "line": bp["line"],
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            Rule::success_with(json!({ "breakpoints": breakpoints }))
        }
        requests::THREADS => Rule::success_with(json!({
            "threads": [{"id": 1, "name": "main"}]
        })),
        requests::STACK_TRACE => Rule::success_with(json!({
            "stackFrames": [
                {"id": 1000, "name": "main", "source": {"path": path}, "line": line, "column": 1},
                {"id": 1001, "name": "<module>", "source": {"path": path}, "line": 1, "column": 1},
            ],
            "totalFrames": 2,
        })),
        requests::SCOPES => Rule::success_with(json!({
            "scopes": [
                {"name": "Locals", "variablesReference": 1, "expensive": false},
                {"name": "Globals", "variablesReference": 2, "expensive": true},
            ]
        })),
        requests::VARIABLES => {
            let variables = if arguments["variablesReference"] == json!(1) {
                json!([
                    {"name": "x", "value": "1", "type": "int", "variablesReference": 0},
                    {"name": "items", "value": "[1, 2]", "type": "list", "variablesReference": 3},
                    {"name": "__hidden__", "value": "0", "variablesReference": 0},
                ])
            } else {
                json!([])
            };
            Rule::success_with(json!({ "variables": variables }))
        }
        requests::EVALUATE => Rule::success_with(json!({
            "result": "42",
            "type": "int",
            "variablesReference": 0,
        })),
        requests::CONTINUE => Rule::success_with(json!({"allThreadsContinued": true})),
        requests::NEXT | requests::STEP_IN | requests::STEP_OUT => Rule::success().then_stopped(
            "step",
            arguments["threadId"].as_i64().unwrap_or(1),
        ),
        requests::PAUSE => {
            Rule::success().then_stopped("pause", arguments["threadId"].as_i64().unwrap_or(1))
        }
        requests::DISCONNECT | requests::TERMINATE => Rule::success().then_close(),
        _ => Rule::success(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_dap::DapBroker;

    #[tokio::test]
    async fn test_default_initialize_emits_initialized() {
        let backend = FakeBackend::new();
        let (reader, writer) = backend.connect();
        let broker = DapBroker::new(reader, writer);
        let mut events = broker.subscribe_events().await;

        let response = broker.send_request("initialize", None).await.unwrap();
        assert!(response.success);
        let event = events.recv().await.unwrap();
        assert_eq!(event.event, "initialized");
        assert_eq!(backend.commands(), vec!["initialize"]);
    }

    #[tokio::test]
    async fn test_once_rule_precedes_persistent_rule() {
        let backend = FakeBackend::new();
        backend.on("evaluate", Rule::failure("always"));
        backend.once("evaluate", Rule::success());
        let (reader, writer) = backend.connect();
        let broker = DapBroker::new(reader, writer);

        assert!(broker.send_request("evaluate", None).await.unwrap().success);
        assert!(!broker.send_request("evaluate", None).await.unwrap().success);
        assert!(!broker.send_request("evaluate", None).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_breakpoints_echo_lines() {
        let backend = FakeBackend::new();
        let (reader, writer) = backend.connect();
        let broker = DapBroker::new(reader, writer);

        let response = broker
            .send_request(
                "setBreakpoints",
                Some(json!({"source": {"path": "/a.py"}, "breakpoints": [{"line": 3}, {"line": 9}]})),
            )
            .await
            .unwrap();
        let body = response.body.unwrap();
        assert_eq!(body["breakpoints"][1]["line"], json!(9));
        assert_eq!(body["breakpoints"][0]["verified"], json!(true));
    }
}
