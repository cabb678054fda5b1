//! DAP Broker - request/response correlation over one byte channel
//!
//! The broker handles:
//! - Message framing (Content-Length headers)
//! - Sequence number generation
//! - Request/response correlation with per-request timeouts
//! - Event fan-out to subscribers
//! - Forwarding reverse requests to a single handler

use crate::{Error, Event, ProtocolMessage, Request, Response, Result};
use stepwise_config::AdapterConnectionConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{debug, info, trace, warn};

type ResponseSender = oneshot::Sender<Result<Response>>;
type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// Capacity of the reverse-request channel
const REVERSE_REQUEST_CAPACITY: usize = 16;

/// Requests awaiting a response.
///
/// Once `closed` is set the reader has drained the table and no new entry
/// may be registered.
#[derive(Default)]
struct PendingTable {
    closed: bool,
    entries: HashMap<i64, ResponseSender>,
}

/// A request that has been written but whose response is awaited later.
#[must_use = "a dispatched request leaks its pending entry until timeout if never awaited"]
pub struct PendingResponse {
    seq: i64,
    command: String,
    rx: oneshot::Receiver<Result<Response>>,
    timeout_ms: u64,
    pending: Arc<Mutex<PendingTable>>,
}

impl std::fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResponse")
            .field("seq", &self.seq)
            .field("command", &self.command)
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

impl PendingResponse {
    pub fn seq(&self) -> i64 {
        self.seq
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Wait for the response, bounded by the broker's request timeout.
    /// On timeout the pending entry is removed.
    pub async fn wait(self) -> Result<Response> {
        match tokio::time::timeout(Duration::from_millis(self.timeout_ms), self.rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => Err(Error::Communication("Response channel closed".to_string())),
            Err(_) => {
                self.pending.lock().await.entries.remove(&self.seq);
                warn!(
                    command = %self.command,
                    seq = self.seq,
                    timeout_ms = self.timeout_ms,
                    "DAP request timed out"
                );
                Err(Error::Timeout(self.timeout_ms))
            }
        }
    }
}

/// Manages one DAP conversation with a backend
pub struct DapBroker {
    next_seq: Arc<AtomicI64>,
    pending: Arc<Mutex<PendingTable>>,
    event_subscribers: Arc<RwLock<Vec<mpsc::Sender<Event>>>>,
    reverse_handler: Arc<RwLock<Option<mpsc::Sender<Request>>>>,
    writer: SharedWriter,
    reader_task: Option<tokio::task::JoinHandle<()>>,
    config: AdapterConnectionConfig,
}

impl DapBroker {
    pub fn new_with_config<R, W>(reader: R, writer: W, config: AdapterConnectionConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let next_seq = Arc::new(AtomicI64::new(1));
        let pending = Arc::new(Mutex::new(PendingTable::default()));
        let event_subscribers = Arc::new(RwLock::new(Vec::new()));
        let reverse_handler = Arc::new(RwLock::new(None));
        let writer: SharedWriter = Arc::new(Mutex::new(
            Box::new(writer) as Box<dyn AsyncWrite + Send + Unpin>
        ));

        let reader_task = Self::spawn_reader_task(
            reader,
            ReaderShared {
                next_seq: next_seq.clone(),
                pending: pending.clone(),
                event_subscribers: event_subscribers.clone(),
                reverse_handler: reverse_handler.clone(),
                writer: writer.clone(),
            },
        );

        Self {
            next_seq,
            pending,
            event_subscribers,
            reverse_handler,
            writer,
            reader_task: Some(reader_task),
            config,
        }
    }

    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::new_with_config(reader, writer, AdapterConnectionConfig::default())
    }

    /// Allocate the next outgoing sequence number
    pub fn next_sequence(&self) -> i64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Write a request and return a handle to await its response.
    ///
    /// Fails with `NotRunning` once the reader has drained the pending table.
    #[tracing::instrument(skip(self, arguments), fields(seq))]
    pub async fn dispatch(
        &self,
        command: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<PendingResponse> {
        let seq = self.next_sequence();
        tracing::Span::current().record("seq", seq);

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err(Error::NotRunning(format!(
                    "cannot send '{}': adapter connection closed",
                    command
                )));
            }
            pending.entries.insert(seq, tx);
        }

        let request = Request {
            seq,
            command: command.to_string(),
            arguments,
        };
        debug!(command = %command, "Sending DAP request");

        if let Err(e) = write_to(&self.writer, &ProtocolMessage::Request(request)).await {
            self.pending.lock().await.entries.remove(&seq);
            return Err(e);
        }

        Ok(PendingResponse {
            seq,
            command: command.to_string(),
            rx,
            timeout_ms: self.config.request_timeout_ms,
            pending: self.pending.clone(),
        })
    }

    /// Send a request and wait for its response
    pub async fn send_request(
        &self,
        command: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<Response> {
        self.dispatch(command, arguments).await?.wait().await
    }

    /// Answer a reverse request from the backend
    pub async fn send_response(
        &self,
        request: &Request,
        success: bool,
        body: Option<serde_json::Value>,
        message: Option<String>,
    ) -> Result<()> {
        let response = Response {
            seq: self.next_sequence(),
            request_seq: request.seq,
            command: request.command.clone(),
            success,
            message,
            body,
        };
        write_to(&self.writer, &ProtocolMessage::Response(response)).await
    }

    /// Subscribe to events (bounded; events are dropped for a full subscriber)
    pub async fn subscribe_events(&self) -> mpsc::Receiver<Event> {
        let capacity = self.config.event_channel_capacity;
        let (tx, rx) = mpsc::channel(capacity);
        let mut subscribers = self.event_subscribers.write().await;
        if self.pending.lock().await.closed {
            // Sender dropped here, so the receiver reports closed immediately
            return rx;
        }

        let before = subscribers.len();
        subscribers.retain(|existing| !existing.is_closed());
        let removed = before - subscribers.len();
        if removed > 0 {
            debug!("Removed {} closed event subscriber(s)", removed);
        }

        subscribers.push(tx);
        rx
    }

    /// Register the single reverse-request handler, replacing any previous one.
    /// Without a handler, reverse requests are answered with a failure.
    pub async fn take_reverse_requests(&self) -> mpsc::Receiver<Request> {
        let (tx, rx) = mpsc::channel(REVERSE_REQUEST_CAPACITY);
        let mut handler = self.reverse_handler.write().await;
        if !self.pending.lock().await.closed {
            *handler = Some(tx);
        }
        rx
    }

    pub async fn subscriber_count(&self) -> usize {
        self.event_subscribers.read().await.len()
    }

    pub async fn pending_request_count(&self) -> usize {
        self.pending.lock().await.entries.len()
    }

    /// Remove pending entries whose caller dropped the response handle
    pub async fn cleanup_orphaned_requests(&self) -> usize {
        let mut pending = self.pending.lock().await;
        let before = pending.entries.len();
        pending.entries.retain(|_, tx| !tx.is_closed());
        let removed = before - pending.entries.len();
        if removed > 0 {
            debug!("Cleaned up {} orphaned pending request(s)", removed);
        }
        removed
    }

    /// False once the reader task has exited
    pub fn is_alive(&self) -> bool {
        match &self.reader_task {
            Some(handle) => !handle.is_finished(),
            None => false,
        }
    }

    /// True once the pending table has been drained and closed
    pub async fn is_closed(&self) -> bool {
        self.pending.lock().await.closed
    }

    fn spawn_reader_task<R>(reader: R, shared: ReaderShared) -> tokio::task::JoinHandle<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        tokio::spawn(async move {
            debug!("Reader task started");
            let mut buf_reader = BufReader::new(reader);

            loop {
                match read_message(&mut buf_reader).await {
                    Ok(Some(message)) => {
                        let terminated = matches!(
                            &message,
                            ProtocolMessage::Event(e) if e.event == crate::constants::events::TERMINATED
                        );
                        shared.handle_message(message).await;
                        if terminated {
                            info!("Received 'terminated' event - closing adapter connection");
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Adapter connection closed (EOF)");
                        break;
                    }
                    Err(e) => {
                        info!("Adapter connection error: {}", e);
                        break;
                    }
                }
            }

            shared.close().await;
        })
    }
}

impl Drop for DapBroker {
    fn drop(&mut self) {
        if let Some(handle) = self.reader_task.take() {
            handle.abort();
        }
    }
}

/// State the reader task shares with the broker
struct ReaderShared {
    next_seq: Arc<AtomicI64>,
    pending: Arc<Mutex<PendingTable>>,
    event_subscribers: Arc<RwLock<Vec<mpsc::Sender<Event>>>>,
    reverse_handler: Arc<RwLock<Option<mpsc::Sender<Request>>>>,
    writer: SharedWriter,
}

impl ReaderShared {
    async fn handle_message(&self, message: ProtocolMessage) {
        match message {
            ProtocolMessage::Response(response) => {
                let tx = self.pending.lock().await.entries.remove(&response.request_seq);
                match tx {
                    Some(tx) => {
                        if tx.send(Ok(response)).is_err() {
                            debug!("Response arrived after caller gave up");
                        }
                    }
                    None => warn!(
                        "Received response for unknown request seq: {}",
                        response.request_seq
                    ),
                }
            }
            ProtocolMessage::Event(event) => {
                let mut subscribers = self.event_subscribers.write().await;
                let mut dropped = 0;
                subscribers.retain(|tx| match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        dropped += 1;
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                });
                if dropped > 0 {
                    warn!(
                        "Dropped event '{}' for {} slow subscriber(s)",
                        event.event, dropped
                    );
                }
            }
            ProtocolMessage::Request(request) => self.forward_reverse_request(request).await,
        }
    }

    async fn forward_reverse_request(&self, request: Request) {
        let handler = self.reverse_handler.read().await.clone();
        let request = match handler {
            Some(tx) => match tx.send(request).await {
                Ok(()) => return,
                Err(mpsc::error::SendError(request)) => request,
            },
            None => request,
        };

        debug!(command = %request.command, "No reverse-request handler, rejecting");
        let response = Response::error(
            self.next_seq.fetch_add(1, Ordering::SeqCst),
            request.seq,
            request.command.clone(),
            format!("'{}' is not supported by this client", request.command),
        );
        if let Err(e) = write_to(&self.writer, &ProtocolMessage::Response(response)).await {
            debug!("Failed to reject reverse request: {}", e);
        }
    }

    async fn close(&self) {
        {
            let mut pending = self.pending.lock().await;
            pending.closed = true;
            for (_, tx) in pending.entries.drain() {
                let _ = tx.send(Err(Error::Communication(
                    "Adapter disconnected".to_string(),
                )));
            }
        }

        let mut subscribers = self.event_subscribers.write().await;
        let count = subscribers.len();
        subscribers.clear();
        *self.reverse_handler.write().await = None;
        debug!("Closed {} event subscriber(s) on disconnect", count);
    }
}

async fn write_to(writer: &SharedWriter, message: &ProtocolMessage) -> Result<()> {
    let mut writer = writer.lock().await;
    write_message(&mut *writer, message).await
}

/// Frame and write one message
pub async fn write_message<W>(writer: &mut W, message: &ProtocolMessage) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let json = serde_json::to_string(message)?;
    let content = format!("Content-Length: {}\r\n\r\n{}", json.len(), json);
    writer.write_all(content.as_bytes()).await?;
    writer.flush().await?;
    trace!("Sent message: {}", json);
    Ok(())
}

/// Read one framed message. `Ok(None)` on a clean EOF.
pub async fn read_message<R>(reader: &mut BufReader<R>) -> Result<Option<ProtocolMessage>>
where
    R: AsyncRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            return Ok(None);
        }

        let line = line.trim();
        if line.is_empty() {
            if content_length.is_some() {
                break;
            }
            // Tolerate stray blank lines between messages
            continue;
        }

        if let Some(length_str) = line.strip_prefix("Content-Length:") {
            let length_str = length_str.trim();
            content_length = Some(length_str.parse().map_err(|_| {
                Error::Protocol(format!("Invalid Content-Length: {}", length_str))
            })?);
        }
    }

    let length = content_length
        .ok_or_else(|| Error::Protocol("Missing Content-Length header".to_string()))?;

    let mut buffer = vec![0u8; length];
    reader.read_exact(&mut buffer).await?;
    let content = String::from_utf8(buffer)?;
    trace!("Received message: {}", content);

    let message: ProtocolMessage = serde_json::from_str(&content)?;
    Ok(Some(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokio::io::DuplexStream;

    fn create_test_streams() -> (DuplexStream, DuplexStream) {
        tokio::io::duplex(8192)
    }

    fn quick_config() -> AdapterConnectionConfig {
        AdapterConnectionConfig {
            request_timeout_ms: 100,
            ..Default::default()
        }
    }

    async fn respond<W: AsyncWrite + Unpin>(writer: &mut W, req: &Request, success: bool) {
        let mut response = Response::success(100 + req.seq, req.seq, req.command.clone());
        response.success = success;
        response.body = Some(serde_json::json!({"echo": req.seq}));
        write_message(writer, &ProtocolMessage::Response(response))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_broker_creation() {
        let (client_stream, _server_stream) = create_test_streams();
        let (client_read, client_write) = tokio::io::split(client_stream);

        let broker = DapBroker::new(client_read, client_write);
        assert_eq!(broker.next_sequence(), 1);
        assert_eq!(broker.next_sequence(), 2);
        assert!(broker.is_alive());
    }

    #[tokio::test]
    async fn test_sequence_numbers_unique_under_concurrency() {
        let (client_stream, _server_stream) = create_test_streams();
        let (client_read, client_write) = tokio::io::split(client_stream);
        let broker = Arc::new(DapBroker::new(client_read, client_write));

        let mut handles = vec![];
        for _ in 0..10 {
            let broker = broker.clone();
            handles.push(tokio::spawn(async move { broker.next_sequence() }));
        }
        let mut seqs = vec![];
        for handle in handles {
            seqs.push(handle.await.unwrap());
        }
        seqs.sort();
        assert_eq!(seqs, (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_message_framing_decode() {
        let json = r#"{"seq":1,"type":"request","command":"initialize"}"#;
        let framed = format!("Content-Length: {}\r\n\r\n{}", json.len(), json);

        let mut reader = BufReader::new(framed.as_bytes());
        let message = read_message(&mut reader).await.unwrap().unwrap();
        match message {
            ProtocolMessage::Request(req) => {
                assert_eq!(req.seq, 1);
                assert_eq!(req.command, "initialize");
            }
            other => panic!("Expected Request message, got {:?}", other),
        }
        assert!(read_message(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_content_length_is_protocol_error() {
        let framed = "X-Other: 3\r\n\r\n{}";
        let mut reader = BufReader::new(framed.as_bytes());
        let err = read_message(&mut reader).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_request_response_correlation() {
        let (client_stream, server_stream) = create_test_streams();
        let (client_read, client_write) = tokio::io::split(client_stream);
        let (server_read, mut server_write) = tokio::io::split(server_stream);
        let broker = DapBroker::new(client_read, client_write);

        tokio::spawn(async move {
            let mut reader = BufReader::new(server_read);
            if let Some(ProtocolMessage::Request(req)) = read_message(&mut reader).await.unwrap() {
                respond(&mut server_write, &req, true).await;
            }
        });

        let response = broker.send_request("initialize", None).await.unwrap();
        assert_eq!(response.command, "initialize");
        assert!(response.success);
        assert_eq!(response.body.unwrap()["echo"], 1);
    }

    #[tokio::test]
    async fn test_dispatch_then_wait_out_of_order() {
        let (client_stream, server_stream) = create_test_streams();
        let (client_read, client_write) = tokio::io::split(client_stream);
        let (server_read, mut server_write) = tokio::io::split(server_stream);
        let broker = DapBroker::new(client_read, client_write);

        tokio::spawn(async move {
            let mut reader = BufReader::new(server_read);
            let mut requests = vec![];
            for _ in 0..2 {
                if let Some(ProtocolMessage::Request(req)) =
                    read_message(&mut reader).await.unwrap()
                {
                    requests.push(req);
                }
            }
            // Answer the second request first
            for req in requests.iter().rev() {
                respond(&mut server_write, req, true).await;
            }
        });

        let launch = broker.dispatch("launch", None).await.unwrap();
        let config_done = broker.send_request("configurationDone", None).await.unwrap();
        assert_eq!(config_done.command, "configurationDone");
        let launch = launch.wait().await.unwrap();
        assert_eq!(launch.command, "launch");
        assert_eq!(launch.request_seq, 1);
    }

    #[tokio::test]
    async fn test_failed_response_is_delivered() {
        let (client_stream, server_stream) = create_test_streams();
        let (client_read, client_write) = tokio::io::split(client_stream);
        let (server_read, mut server_write) = tokio::io::split(server_stream);
        let broker = DapBroker::new(client_read, client_write);

        tokio::spawn(async move {
            let mut reader = BufReader::new(server_read);
            if let Some(ProtocolMessage::Request(req)) = read_message(&mut reader).await.unwrap() {
                respond(&mut server_write, &req, false).await;
            }
        });

        let response = broker.send_request("next", None).await.unwrap();
        assert!(!response.success);
        assert!(matches!(
            response.into_success(),
            Err(Error::RequestFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_event_broadcasting() {
        let (client_stream, mut server_stream) = create_test_streams();
        let (client_read, client_write) = tokio::io::split(client_stream);
        let broker = DapBroker::new(client_read, client_write);

        let mut sub1 = broker.subscribe_events().await;
        let mut sub2 = broker.subscribe_events().await;

        tokio::spawn(async move {
            let event = Event::new(1, "output").with_body(serde_json::json!({"output": "hi"}));
            write_message(&mut server_stream, &ProtocolMessage::Event(event))
                .await
                .unwrap();
            std::future::pending::<()>().await;
        });

        let evt1 = tokio::time::timeout(Duration::from_secs(1), sub1.recv())
            .await
            .unwrap()
            .unwrap();
        let evt2 = tokio::time::timeout(Duration::from_secs(1), sub2.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(evt1.event, "output");
        assert_eq!(evt2.body.unwrap()["output"], "hi");
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_uses_config_default() {
        let (client_stream, _server_stream) = create_test_streams();
        let (client_read, client_write) = tokio::io::split(client_stream);
        let broker = DapBroker::new(client_read, client_write);

        match broker.send_request("initialize", None).await {
            Err(Error::Timeout(ms)) => assert_eq!(ms, 30000),
            other => panic!("Expected Timeout error, got: {:?}", other),
        }
        assert_eq!(broker.pending_request_count().await, 0);
    }

    #[tokio::test]
    async fn test_multiple_pending_requests() {
        let (client_stream, server_stream) = create_test_streams();
        let (client_read, client_write) = tokio::io::split(client_stream);
        let (server_read, mut server_write) = tokio::io::split(server_stream);
        let broker = Arc::new(DapBroker::new(client_read, client_write));

        tokio::spawn(async move {
            let mut reader = BufReader::new(server_read);
            for _ in 0..3 {
                if let Some(ProtocolMessage::Request(req)) =
                    read_message(&mut reader).await.unwrap()
                {
                    respond(&mut server_write, &req, true).await;
                }
            }
        });

        let (r1, r2, r3) = tokio::join!(
            broker.send_request("threads", None),
            broker.send_request("stackTrace", None),
            broker.send_request("scopes", None),
        );
        assert_eq!(r1.unwrap().command, "threads");
        assert_eq!(r2.unwrap().command, "stackTrace");
        assert_eq!(r3.unwrap().command, "scopes");
    }

    #[tokio::test]
    async fn test_eof_fails_pending_and_rejects_new_requests() {
        let (client_stream, server_stream) = create_test_streams();
        let (client_read, client_write) = tokio::io::split(client_stream);
        let broker = DapBroker::new_with_config(client_read, client_write, quick_config());

        let pending = broker.dispatch("launch", None).await.unwrap();
        drop(server_stream);

        match pending.wait().await {
            Err(Error::Communication(msg)) => assert_eq!(msg, "Adapter disconnected"),
            other => panic!("expected disconnect, got {:?}", other),
        }

        // Reader has drained; nothing may register any more
        assert!(broker.is_closed().await);
        let err = broker.dispatch("threads", None).await.unwrap_err();
        assert!(matches!(err, Error::NotRunning(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_terminated_event_closes_reader() {
        let (client_stream, mut server_stream) = create_test_streams();
        let (client_read, client_write) = tokio::io::split(client_stream);
        let broker = DapBroker::new_with_config(client_read, client_write, quick_config());
        let mut events = broker.subscribe_events().await;

        tokio::spawn(async move {
            let event = Event::new(9, "terminated");
            write_message(&mut server_stream, &ProtocolMessage::Event(event))
                .await
                .unwrap();
            std::future::pending::<()>().await;
        });

        let event = events.recv().await.unwrap();
        assert_eq!(event.event, "terminated");
        // Channel closes after the terminated event was delivered
        assert!(events.recv().await.is_none());
        assert!(broker.is_closed().await);
    }

    #[tokio::test]
    async fn test_reverse_request_without_handler_gets_failure() {
        let (client_stream, server_stream) = create_test_streams();
        let (client_read, client_write) = tokio::io::split(client_stream);
        let (server_read, mut server_write) = tokio::io::split(server_stream);
        let _broker = DapBroker::new(client_read, client_write);

        let reverse = Request::new(3, "runInTerminal");
        write_message(&mut server_write, &ProtocolMessage::Request(reverse))
            .await
            .unwrap();

        let mut reader = BufReader::new(server_read);
        let reply = tokio::time::timeout(Duration::from_secs(1), read_message(&mut reader))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        match reply {
            ProtocolMessage::Response(resp) => {
                assert_eq!(resp.request_seq, 3);
                assert!(!resp.success);
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reverse_request_forwarded_to_handler() {
        let (client_stream, server_stream) = create_test_streams();
        let (client_read, client_write) = tokio::io::split(client_stream);
        let (server_read, mut server_write) = tokio::io::split(server_stream);
        let broker = DapBroker::new(client_read, client_write);
        let mut reverse = broker.take_reverse_requests().await;

        let request = Request::new(4, "startDebugging")
            .with_arguments(serde_json::json!({"request": "launch", "configuration": {}}));
        write_message(&mut server_write, &ProtocolMessage::Request(request))
            .await
            .unwrap();

        let received = reverse.recv().await.unwrap();
        assert_eq!(received.command, "startDebugging");
        broker
            .send_response(&received, true, None, None)
            .await
            .unwrap();

        let mut reader = BufReader::new(server_read);
        match read_message(&mut reader).await.unwrap().unwrap() {
            ProtocolMessage::Response(resp) => {
                assert_eq!(resp.request_seq, 4);
                assert!(resp.success);
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscribe_events_cleans_up_closed_subscribers() {
        let (client_stream, _server_stream) = create_test_streams();
        let (client_read, client_write) = tokio::io::split(client_stream);
        let broker = DapBroker::new(client_read, client_write);

        let sub1 = broker.subscribe_events().await;
        let _sub2 = broker.subscribe_events().await;
        drop(sub1);
        let _sub3 = broker.subscribe_events().await;
        assert_eq!(broker.subscriber_count().await, 2);
    }

    #[tokio::test]
    async fn test_orphaned_request_cleanup() {
        let (client_stream, _server_stream) = create_test_streams();
        let (client_read, client_write) = tokio::io::split(client_stream);
        let broker = DapBroker::new(client_read, client_write);

        let pending = broker.dispatch("evaluate", None).await.unwrap();
        assert_eq!(broker.pending_request_count().await, 1);
        drop(pending);

        assert_eq!(broker.cleanup_orphaned_requests().await, 1);
        assert_eq!(broker.pending_request_count().await, 0);
    }

    proptest! {
        #![proptest_config(stepwise_testing::proptest_config::auto_config())]

        #[test]
        fn prop_framing_preserves_event_body(text in "\\PC{0,200}", seq in 1i64..1_000_000) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let event = Event::new(seq, "output")
                    .with_body(serde_json::json!({"output": text.clone()}));
                let mut buffer = Vec::new();
                write_message(&mut buffer, &ProtocolMessage::Event(event.clone())).await.unwrap();

                let mut reader = BufReader::new(buffer.as_slice());
                let decoded = read_message(&mut reader).await.unwrap().unwrap();
                prop_assert_eq!(decoded, ProtocolMessage::Event(event));
                Ok(())
            })?;
        }
    }
}
