//! Reconnecting stream client.
//!
//! One task per `open` owns the connection state machine (connect, pump,
//! backoff) and its cancellation token. Lines flow into a bounded sink in
//! receipt order; nothing is replayed across a reconnect gap.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use panel_bridge_core::config::{PanelConfig, StreamConfig};
use panel_bridge_core::traits::CredentialProvider;
use panel_bridge_core::types::{LogLine, ServerStatus};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use crate::backoff::{backoff_delay, with_jitter};
use crate::protocol::{Frame, parse_frame, socket_url};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Stream error.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("invalid stream endpoint: {0}")]
    Endpoint(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("authentication rejected: {0}")]
    AuthRejected(String),
    #[error("reconnect ceiling exceeded after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

/// Event delivered to the sink.
#[derive(Debug)]
pub enum StreamEvent {
    /// One console line.
    Line(LogLine),
    /// Status update observed on the stream.
    Status(ServerStatus),
    /// The client gave up reconnecting; no further events follow.
    Fatal(StreamError),
}

/// Handle to one logical stream subscription.
pub struct StreamHandle {
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamHandle {
    /// Wrap a running stream task and its cancellation token.
    #[must_use]
    pub fn new(cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Terminate delivery and release the connection.
    ///
    /// Idempotent; cancels any in-flight connect or backoff sleep and waits
    /// for the task to finish, so no event is delivered after return.
    pub async fn close(&self) {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "stream task panicked during close");
            }
        }
    }
}

/// Seam over stream opening so the lifecycle manager can be driven by a
/// scripted source in tests.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Begin delivering events to `sink` until the handle is closed or the
    /// reconnect ceiling is hit.
    async fn open(&self, sink: mpsc::Sender<StreamEvent>) -> Result<StreamHandle, StreamError>;
}

/// The real websocket-backed log source.
pub struct LogStreamClient {
    panel: PanelConfig,
    config: StreamConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl LogStreamClient {
    /// Create a client for the configured panel server.
    #[must_use]
    pub fn new(
        panel: PanelConfig,
        config: StreamConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            panel,
            config,
            credentials,
        }
    }
}

#[async_trait]
impl LogSource for LogStreamClient {
    async fn open(&self, sink: mpsc::Sender<StreamEvent>) -> Result<StreamHandle, StreamError> {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_stream(
            self.panel.clone(),
            self.config.clone(),
            Arc::clone(&self.credentials),
            sink,
            cancel.clone(),
        ));
        Ok(StreamHandle::new(cancel, task))
    }
}

enum ConnectOutcome {
    Connected(Box<WsStream>),
    Failed(StreamError),
    Cancelled,
}

enum Dial {
    Ok(Box<WsStream>),
    AuthRejected,
    Cancelled,
    Err(StreamError),
}

enum PumpEnd {
    Cancelled,
    Lost,
}

async fn run_stream(
    panel: PanelConfig,
    config: StreamConfig,
    credentials: Arc<dyn CredentialProvider>,
    sink: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) {
    // Consecutive failed attempts; a successful connection resets it.
    let mut failures: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return;
        }

        match connect_once(&panel, &config, credentials.as_ref(), &cancel).await {
            ConnectOutcome::Cancelled => return,
            ConnectOutcome::Connected(ws) => {
                failures = 0;
                tracing::info!(server = %panel.server_id, "console stream connected");
                match pump(ws, &config, &sink, &cancel).await {
                    PumpEnd::Cancelled => return,
                    PumpEnd::Lost => {
                        tracing::warn!(server = %panel.server_id, "console stream lost");
                    }
                }
            }
            ConnectOutcome::Failed(err) => {
                failures += 1;
                tracing::warn!(error = %err, attempt = failures, "console stream connect failed");
                if failures >= config.max_attempts {
                    let fatal = StreamError::RetriesExhausted { attempts: failures };
                    tracing::error!(%fatal, "giving up on console stream");
                    let _ = sink.send(StreamEvent::Fatal(fatal)).await;
                    return;
                }
            }
        }

        let delay = with_jitter(
            backoff_delay(failures.max(1), config.base_backoff(), config.max_backoff()),
            &mut rand::rng(),
        );
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }
    }
}

async fn connect_once(
    panel: &PanelConfig,
    config: &StreamConfig,
    credentials: &dyn CredentialProvider,
    cancel: &CancellationToken,
) -> ConnectOutcome {
    let token = match credentials.token().await {
        Ok(token) => token,
        Err(e) => return ConnectOutcome::Failed(StreamError::Connect(format!("token: {e}"))),
    };

    match dial(panel, config, &token.access_token, cancel).await {
        Dial::Ok(ws) => ConnectOutcome::Connected(ws),
        Dial::Cancelled => ConnectOutcome::Cancelled,
        Dial::Err(err) => ConnectOutcome::Failed(err),
        Dial::AuthRejected => {
            // One refresh per reconnect attempt before giving up on it.
            tracing::debug!("stream token rejected, refreshing once");
            let fresh = match credentials.refresh().await {
                Ok(token) => token,
                Err(e) => return ConnectOutcome::Failed(StreamError::AuthRejected(e.to_string())),
            };
            match dial(panel, config, &fresh.access_token, cancel).await {
                Dial::Ok(ws) => ConnectOutcome::Connected(ws),
                Dial::Cancelled => ConnectOutcome::Cancelled,
                Dial::Err(err) => ConnectOutcome::Failed(err),
                Dial::AuthRejected => ConnectOutcome::Failed(StreamError::AuthRejected(
                    "token rejected after refresh".into(),
                )),
            }
        }
    }
}

async fn dial(
    panel: &PanelConfig,
    config: &StreamConfig,
    token: &str,
    cancel: &CancellationToken,
) -> Dial {
    let url = match socket_url(panel, token) {
        Ok(url) => url,
        Err(err) => return Dial::Err(err),
    };

    let mut request = match url.as_str().into_client_request() {
        Ok(request) => request,
        Err(e) => return Dial::Err(StreamError::Endpoint(e.to_string())),
    };
    // Bearer header as a backup to the query-parameter token.
    if let Ok(value) = format!("Bearer {token}").parse() {
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    tokio::select! {
        () = cancel.cancelled() => Dial::Cancelled,
        result = timeout(config.connect_timeout(), connect_async(request)) => match result {
            Err(_) => Dial::Err(StreamError::Connect("handshake timed out".into())),
            Ok(Ok((ws, _response))) => Dial::Ok(Box::new(ws)),
            Ok(Err(tungstenite::Error::Http(response)))
                if matches!(response.status().as_u16(), 401 | 403) =>
            {
                Dial::AuthRejected
            }
            Ok(Err(e)) => Dial::Err(StreamError::Connect(e.to_string())),
        },
    }
}

async fn pump(
    ws: Box<WsStream>,
    config: &StreamConfig,
    sink: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
) -> PumpEnd {
    let (mut write, mut read) = (*ws).split();
    let heartbeat = Duration::from_secs(config.heartbeat_secs.max(1));
    let mut ping = tokio::time::interval(heartbeat);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_rx = tokio::time::Instant::now();

    loop {
        tokio::select! {
            () = cancel.cancelled() => return PumpEnd::Cancelled,
            _ = ping.tick() => {
                if last_rx.elapsed() > heartbeat * 2 {
                    tracing::warn!("heartbeat timeout on console stream");
                    return PumpEnd::Lost;
                }
                if write.send(Message::Ping(Vec::new())).await.is_err() {
                    return PumpEnd::Lost;
                }
            }
            frame = read.next() => {
                let Some(frame) = frame else { return PumpEnd::Lost };
                last_rx = tokio::time::Instant::now();
                match frame {
                    Ok(Message::Text(text)) => {
                        if deliver(&text, sink).await.is_err() {
                            // Receiver gone: a disable() raced in-flight
                            // delivery. Drop silently.
                            return PumpEnd::Cancelled;
                        }
                    }
                    Ok(Message::Close(_)) => return PumpEnd::Lost,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "websocket receive error");
                        return PumpEnd::Lost;
                    }
                }
            }
        }
    }
}

/// Route one parsed frame into the sink. `Err` means the receiver is gone.
async fn deliver(text: &str, sink: &mpsc::Sender<StreamEvent>) -> Result<(), ()> {
    match parse_frame(text) {
        Frame::Lines(lines) => {
            for line in lines {
                let line = LogLine::new(line, Utc::now());
                if line.is_blank() {
                    continue;
                }
                sink.send(StreamEvent::Line(line)).await.map_err(|_| ())?;
            }
        }
        Frame::Status(status) => {
            sink.send(StreamEvent::Status(status)).await.map_err(|_| ())?;
        }
        Frame::Error(message) => {
            tracing::warn!(message, "panel reported stream error");
        }
        Frame::Ignored => {}
    }
    Ok(())
}
