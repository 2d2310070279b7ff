//! The reconnecting channel and its connection task.

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use {
    futures::{SinkExt, StreamExt},
    livefeed_protocol::Envelope,
    serde_json::Value,
    tokio::sync::{mpsc, watch},
    tokio_tungstenite::tungstenite::Message,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    config::ChannelConfig,
    endpoint::Endpoint,
    error::{Error, Result},
    handlers::{Callback, HandlerId, HandlerRegistry, Payload, events},
    transport::{Connector, FrameSink, FrameStream, WsConnector},
};

/// Connectivity of a channel, suitable for a status indicator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// One logical server-push subscription with bounded-retry reconnect.
///
/// Cloning yields another handle to the same channel. All methods return
/// immediately; the connection lives in a background task started by
/// [`connect`](Self::connect) and torn down by
/// [`disconnect`](Self::disconnect).
#[derive(Clone)]
pub struct RealtimeChannel {
    shared: Arc<Shared>,
}

struct Shared {
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    link: Mutex<LinkState>,
    handlers: Mutex<HandlerRegistry>,
    status_tx: watch::Sender<ConnectionStatus>,
}

#[derive(Default)]
struct LinkState {
    status: ConnectionStatus,
    retry_count: u32,
    /// Bumped by every `connect()`/`disconnect()`; a task whose generation
    /// no longer matches must not touch this state.
    generation: u64,
    writer: Option<mpsc::UnboundedSender<String>>,
    cancel: Option<CancellationToken>,
}

enum SessionEnd {
    Cancelled,
    Closed,
    Failed(Error),
}

impl RealtimeChannel {
    pub fn new(config: ChannelConfig) -> Self {
        Self::with_connector(config, Arc::new(WsConnector::new()))
    }

    pub fn with_connector(config: ChannelConfig, connector: Arc<dyn Connector>) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                link: Mutex::new(LinkState::default()),
                handlers: Mutex::new(HandlerRegistry::default()),
                status_tx,
            }),
        }
    }

    /// Start connecting. Does nothing while connecting or connected.
    ///
    /// Resets the retry counter and supersedes a pending reconnect timer.
    /// Failures are reported through the `error` event, never returned.
    pub fn connect(&self) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(endpoint = %self.shared.config.endpoint, error = %e, "cannot connect outside a tokio runtime");
                self.shared
                    .emit_error(&format!("cannot connect outside a tokio runtime: {e}"));
                return;
            },
        };

        let (generation, cancel) = {
            let mut link = self.shared.link();
            if link.status != ConnectionStatus::Disconnected {
                debug!(status = %link.status, "connect ignored, channel already active");
                return;
            }
            if let Some(pending) = link.cancel.take() {
                pending.cancel();
            }
            link.generation += 1;
            link.retry_count = 0;
            link.writer = None;
            let cancel = CancellationToken::new();
            link.cancel = Some(cancel.clone());
            self.shared.set_status(&mut link, ConnectionStatus::Connecting);
            (link.generation, cancel)
        };

        runtime.spawn(connection_loop(Arc::clone(&self.shared), generation, cancel));
    }

    /// Close the connection and cancel any pending reconnect. Idempotent.
    pub fn disconnect(&self) {
        let was_connected = {
            let mut link = self.shared.link();
            link.generation += 1;
            if let Some(cancel) = link.cancel.take() {
                cancel.cancel();
            }
            link.writer = None;
            link.retry_count = 0;
            let was_connected = link.status == ConnectionStatus::Connected;
            self.shared
                .set_status(&mut link, ConnectionStatus::Disconnected);
            was_connected
        };

        if was_connected {
            info!(endpoint = %self.shared.config.endpoint, "disconnected by caller");
            self.shared.emit(events::DISCONNECT, &Payload::new());
        }
    }

    /// Hand `envelope` to the live connection.
    ///
    /// Returns `false` without side effects when not connected; nothing is
    /// queued for later.
    pub fn send(&self, envelope: &Envelope) -> bool {
        let link = self.shared.link();
        if link.status != ConnectionStatus::Connected {
            debug!(kind = %envelope.kind, status = %link.status, "not connected, envelope dropped");
            return false;
        }
        link.writer
            .as_ref()
            .is_some_and(|writer| writer.send(envelope.to_json()).is_ok())
    }

    /// Register `callback` for `kind`. See [`events`] for the lifecycle kinds;
    /// any other kind matches the `type` of inbound envelopes.
    pub fn on<F>(&self, kind: &str, callback: F) -> HandlerId
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.on_shared(kind, Arc::new(callback))
    }

    /// Register an already shared callback. The same callback may be
    /// registered several times; each registration gets its own id.
    pub fn on_shared(&self, kind: &str, callback: Callback) -> HandlerId {
        self.shared.handlers().add(kind, callback)
    }

    /// Remove one registration. Returns whether anything was removed.
    pub fn off(&self, kind: &str, id: HandlerId) -> bool {
        self.shared.handlers().remove(kind, id)
    }

    pub fn handler_count(&self, kind: &str) -> usize {
        self.shared.handlers().count(kind)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.link().status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Disconnected with no connection task pending: before the first
    /// `connect()`, after `disconnect()`, or once retries are exhausted.
    pub fn is_idle(&self) -> bool {
        let link = self.shared.link();
        link.status == ConnectionStatus::Disconnected && link.cancel.is_none()
    }

    /// Consecutive failed or closed attempts since the last success.
    pub fn retry_count(&self) -> u32 {
        self.shared.link().retry_count
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.config.endpoint
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    /// Receiver that observes every status transition.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status_tx.subscribe()
    }
}

impl fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let link = self.shared.link();
        f.debug_struct("RealtimeChannel")
            .field("endpoint", &self.shared.config.endpoint.as_str())
            .field("status", &link.status)
            .field("retry_count", &link.retry_count)
            .finish()
    }
}

impl Shared {
    fn link(&self) -> MutexGuard<'_, LinkState> {
        self.link.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handlers(&self) -> MutexGuard<'_, HandlerRegistry> {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_status(&self, link: &mut LinkState, status: ConnectionStatus) {
        link.status = status;
        self.status_tx.send_replace(status);
    }

    /// Run the callbacks for `kind` with no lock held.
    fn emit(&self, kind: &str, payload: &Payload) {
        let callbacks = self.handlers().snapshot(kind);
        for callback in &callbacks {
            invoke(kind, callback, payload);
        }
    }

    fn emit_error(&self, message: &str) {
        let mut payload = Payload::new();
        payload.insert("message".into(), Value::String(message.to_string()));
        self.emit(events::ERROR, &payload);
    }

    async fn open(&self) -> Result<(FrameSink, FrameStream)> {
        let timeout = self.config.connect_timeout;
        match tokio::time::timeout(timeout, self.connector.connect(&self.config.endpoint)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }

    fn mark_connected(&self, generation: u64, writer: mpsc::UnboundedSender<String>) -> bool {
        let mut link = self.link();
        if link.generation != generation {
            return false;
        }
        link.retry_count = 0;
        link.writer = Some(writer);
        self.set_status(&mut link, ConnectionStatus::Connected);
        true
    }

    fn mark_disconnected(&self, generation: u64) -> bool {
        let mut link = self.link();
        if link.generation != generation {
            return false;
        }
        link.writer = None;
        self.set_status(&mut link, ConnectionStatus::Disconnected);
        true
    }

    fn mark_connecting(&self, generation: u64) -> bool {
        let mut link = self.link();
        if link.generation != generation {
            return false;
        }
        self.set_status(&mut link, ConnectionStatus::Connecting);
        true
    }

    /// Count one more failure and return the delay before the next attempt,
    /// or `None` once the policy is exhausted.
    fn schedule_retry(&self, generation: u64) -> Option<Duration> {
        let mut link = self.link();
        if link.generation != generation {
            return None;
        }
        let policy = &self.config.retry;
        if !policy.allows(link.retry_count) {
            warn!(
                endpoint = %self.config.endpoint,
                retries = link.retry_count,
                "max reconnection attempts reached, channel is idle"
            );
            link.cancel = None;
            return None;
        }
        link.retry_count += 1;
        let delay = policy.delay_for_attempt(link.retry_count);
        info!(
            endpoint = %self.config.endpoint,
            attempt = link.retry_count,
            max_retries = ?policy.max_retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "reconnecting after delay"
        );
        Some(delay)
    }

    /// Parse one inbound text frame and fan it out.
    fn deliver(&self, text: &str) {
        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return;
            },
        };
        if events::is_reserved(&envelope.kind) {
            warn!(kind = %envelope.kind, "dropping envelope with reserved type");
            return;
        }

        let (typed, catch_all) = {
            let handlers = self.handlers();
            (
                handlers.snapshot(&envelope.kind),
                handlers.snapshot(events::MESSAGE),
            )
        };
        if typed.is_empty() && catch_all.is_empty() {
            debug!(kind = %envelope.kind, "no handler for message type, dropping");
            return;
        }

        for callback in &typed {
            invoke(&envelope.kind, callback, &envelope.data);
        }
        if !catch_all.is_empty() {
            let full = envelope.to_object();
            for callback in &catch_all {
                invoke(events::MESSAGE, callback, &full);
            }
        }
    }
}

/// Run one callback. A panic is logged and swallowed so the connection task
/// keeps its state consistent and later callbacks still run.
fn invoke(kind: &str, callback: &Callback, payload: &Payload) {
    if let Err(cause) = panic::catch_unwind(AssertUnwindSafe(|| callback(payload))) {
        let reason = cause
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| cause.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".into());
        warn!(kind, reason = %reason, "callback panicked");
    }
}

/// Connect, run the session, and reconnect per the retry policy until the
/// policy is exhausted or `cancel` fires.
async fn connection_loop(shared: Arc<Shared>, generation: u64, cancel: CancellationToken) {
    let endpoint = shared.config.endpoint.clone();

    loop {
        info!(endpoint = %endpoint, "connecting");

        let attempt = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            result = shared.open() => result,
        };

        match attempt {
            Ok((sink, stream)) => {
                let (writer_tx, writer_rx) = mpsc::unbounded_channel();
                for envelope in &shared.config.on_open {
                    let _ = writer_tx.send(envelope.to_json());
                }
                if !shared.mark_connected(generation, writer_tx) {
                    return;
                }
                info!(endpoint = %endpoint, "connected");
                shared.emit(events::CONNECT, &Payload::new());

                let failure = match run_session(&shared, sink, stream, writer_rx, &cancel).await {
                    SessionEnd::Cancelled => return,
                    SessionEnd::Closed => {
                        info!(endpoint = %endpoint, "connection closed by server");
                        None
                    },
                    SessionEnd::Failed(e) => {
                        warn!(endpoint = %endpoint, error = %e, "connection lost");
                        Some(e)
                    },
                };

                if !shared.mark_disconnected(generation) {
                    return;
                }
                if let Some(e) = failure {
                    shared.emit_error(&e.to_string());
                }
                shared.emit(events::DISCONNECT, &Payload::new());
            },
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "connection attempt failed");
                if !shared.mark_disconnected(generation) {
                    return;
                }
                shared.emit_error(&e.to_string());
            },
        }

        let Some(delay) = shared.schedule_retry(generation) else {
            return;
        };
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {},
        }
        if !shared.mark_connecting(generation) {
            return;
        }
    }
}

/// Forward frames both ways until the connection ends.
async fn run_session(
    shared: &Shared,
    mut sink: FrameSink,
    mut stream: FrameStream,
    mut writer_rx: mpsc::UnboundedReceiver<String>,
    cancel: &CancellationToken,
) -> SessionEnd {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return SessionEnd::Cancelled;
            },
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => shared.deliver(text.as_str()),
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Closed,
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sink.send(Message::Pong(data)).await {
                            return SessionEnd::Failed(Error::WebSocket(e));
                        }
                    },
                    Some(Ok(_)) => {}, // binary, pong
                    Some(Err(e)) => return SessionEnd::Failed(Error::WebSocket(e)),
                }
            },
            outbound = writer_rx.recv() => {
                match outbound {
                    Some(text) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            return SessionEnd::Failed(Error::WebSocket(e));
                        }
                    },
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionEnd::Cancelled;
                    },
                }
            },
        }
    }
}
