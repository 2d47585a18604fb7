//! Audio proxy: one browser socket paired with one recognition socket.
//!
//! Session lifecycle: Connecting → AwaitingConfig → Relaying → Closed.
//! Whichever way a session ends, both sockets are closed before
//! `run_session` returns.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message as ClientMessage, WebSocket};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as UpstreamMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::SpeechConfig;
use crate::speech::config::AudioSessionConfig;
use crate::speech::token::{jwt_token, SpeechClient, SpeechError};

/// Cap on audio held back while waiting for the configuration frame.
pub const MAX_PRECONFIG_BYTES: usize = 1024 * 1024;
/// Largest frame the legacy heuristic accepts as configuration.
pub const MAX_CONFIG_FRAME_BYTES: usize = 4 * 1024;
/// Cap on frames queued from one socket while the other is not accepting.
pub const MAX_BACKLOG_BYTES: usize = 1024 * 1024;
/// How long a close may take before the socket is abandoned.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// How frames are treated before the configuration frame is seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigPolicy {
    /// The first JSON-object frame is the configuration. Earlier frames wait.
    Strict,
    /// Small JSON objects are configuration. Anything else first triggers
    /// a default configuration frame.
    SynthesizeDefault,
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("Speech token error: {0}")]
    Token(#[from] SpeechError),
}

/// A data or close frame as seen by the proxy. Ping/pong never surface here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

impl Frame {
    fn len(&self) -> usize {
        match self {
            Frame::Text(t) => t.len(),
            Frame::Binary(b) => b.len(),
            Frame::Close => 0,
        }
    }

    /// True for a text frame, or UTF-8 binary frame, holding a JSON object.
    fn is_json_object(&self) -> bool {
        let bytes = match self {
            Frame::Text(t) => t.as_bytes(),
            Frame::Binary(b) => b.as_slice(),
            Frame::Close => return false,
        };
        serde_json::from_slice::<serde_json::Value>(bytes)
            .map(|v| v.is_object())
            .unwrap_or(false)
    }
}

/// One end of a session.
#[async_trait]
pub trait FrameSocket: Send {
    /// Next frame. `Ok(None)` means the peer went away without a close frame.
    async fn recv(&mut self) -> Result<Option<Frame>, ProxyError>;

    async fn send(&mut self, frame: Frame) -> Result<(), ProxyError>;

    /// Closes the socket. Closing twice is harmless.
    async fn close(&mut self);
}

/// Opens the recognition socket for a new session.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn FrameSocket>, ProxyError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    ClientClosed,
    UpstreamClosed,
    ClientError(String),
    UpstreamError(String),
    UpstreamUnavailable(String),
    BufferOverflow,
    IdleTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub client_to_upstream: usize,
    pub upstream_to_client: usize,
    pub reason: CloseReason,
}

enum Phase {
    AwaitingConfig { held: Vec<Frame>, held_bytes: usize },
    Relaying,
}

enum Event {
    Client(Result<Option<Frame>, ProxyError>),
    Upstream(Result<Option<Frame>, ProxyError>),
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Client,
    Upstream,
}

impl Side {
    fn peer(self) -> Side {
        match self {
            Side::Client => Side::Upstream,
            Side::Upstream => Side::Client,
        }
    }

    fn closed(self) -> CloseReason {
        match self {
            Side::Client => CloseReason::ClientClosed,
            Side::Upstream => CloseReason::UpstreamClosed,
        }
    }

    fn failed(self, e: impl ToString) -> CloseReason {
        match self {
            Side::Client => CloseReason::ClientError(e.to_string()),
            Side::Upstream => CloseReason::UpstreamError(e.to_string()),
        }
    }
}

/// Frames read from one socket while a send to the other was in flight.
#[derive(Default)]
struct Backlog {
    frames: VecDeque<Frame>,
    bytes: usize,
}

impl Backlog {
    fn push(&mut self, frame: Frame) -> Result<(), CloseReason> {
        self.bytes += frame.len();
        if self.bytes > MAX_BACKLOG_BYTES {
            warn!("Frames queued behind a stalled send exceeded {MAX_BACKLOG_BYTES} bytes");
            return Err(CloseReason::BufferOverflow);
        }
        self.frames.push_back(frame);
        Ok(())
    }

    fn pop(&mut self) -> Option<Frame> {
        let frame = self.frames.pop_front()?;
        self.bytes -= frame.len();
        Some(frame)
    }
}

async fn idle(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

/// Sends `frame` to `dst` while still reading `src` and the idle timer.
/// A close or error on `src` ends the send; data frames from `src` are queued
/// on `backlog`. The idle timer restarts whenever `src` delivers a frame.
async fn send_watching(
    dst: &mut dyn FrameSocket,
    src: &mut dyn FrameSocket,
    side: Side,
    frame: Frame,
    backlog: &mut Backlog,
    idle_timeout: Option<Duration>,
) -> Result<(), CloseReason> {
    let peer = side.peer();
    let send = dst.send(frame);
    tokio::pin!(send);
    loop {
        tokio::select! {
            biased;
            sent = &mut send => return sent.map_err(|e| side.failed(e)),
            frame = src.recv() => match frame {
                Ok(Some(Frame::Close)) | Ok(None) => return Err(peer.closed()),
                Ok(Some(frame)) => backlog.push(frame)?,
                Err(e) => return Err(peer.failed(e)),
            },
            _ = idle(idle_timeout) => {
                warn!("{side:?} socket stopped accepting frames");
                return Err(CloseReason::IdleTimeout);
            }
        }
    }
}

async fn close_socket(socket: &mut dyn FrameSocket, side: Side) {
    if tokio::time::timeout(CLOSE_TIMEOUT, socket.close()).await.is_err() {
        warn!("{side:?} socket did not close within {CLOSE_TIMEOUT:?}");
    }
}

struct Session<'a> {
    client: &'a mut dyn FrameSocket,
    upstream: &'a mut dyn FrameSocket,
    policy: ConfigPolicy,
    idle_timeout: Option<Duration>,
    phase: Phase,
    client_backlog: Backlog,
    upstream_backlog: Backlog,
    client_to_upstream: usize,
    upstream_to_client: usize,
}

impl Session<'_> {
    async fn send_to(&mut self, side: Side, frame: Frame) -> Result<(), CloseReason> {
        let (dst, src, backlog) = match side {
            Side::Upstream => (&mut *self.upstream, &mut *self.client, &mut self.client_backlog),
            Side::Client => (&mut *self.client, &mut *self.upstream, &mut self.upstream_backlog),
        };
        send_watching(dst, src, side, frame, backlog, self.idle_timeout).await
    }

    async fn forward_client_frame(&mut self, frame: Frame) -> Result<(), CloseReason> {
        self.send_to(Side::Upstream, frame).await?;
        self.client_to_upstream += 1;
        Ok(())
    }

    async fn on_client_frame(&mut self, frame: Frame) -> Result<(), CloseReason> {
        let Phase::AwaitingConfig { held, held_bytes } = &mut self.phase else {
            return self.forward_client_frame(frame).await;
        };

        match self.policy {
            ConfigPolicy::Strict => {
                if !frame.is_json_object() {
                    *held_bytes += frame.len();
                    if *held_bytes > MAX_PRECONFIG_BYTES {
                        warn!("Audio before configuration exceeded {MAX_PRECONFIG_BYTES} bytes");
                        return Err(CloseReason::BufferOverflow);
                    }
                    held.push(frame);
                    return Ok(());
                }
                let held = std::mem::take(held);
                self.phase = Phase::Relaying;
                self.forward_client_frame(frame).await?;
                if !held.is_empty() {
                    debug!("Flushing {} frames held before configuration", held.len());
                }
                for frame in held {
                    self.forward_client_frame(frame).await?;
                }
                Ok(())
            }
            ConfigPolicy::SynthesizeDefault => {
                self.phase = Phase::Relaying;
                if !(frame.len() <= MAX_CONFIG_FRAME_BYTES && frame.is_json_object()) {
                    let default = AudioSessionConfig::default()
                        .to_vendor_frame()
                        .map_err(|e| Side::Upstream.failed(e))?;
                    debug!("No configuration from client, sending default");
                    self.send_to(Side::Upstream, Frame::Text(default)).await?;
                }
                self.forward_client_frame(frame).await
            }
        }
    }

    async fn on_upstream_frame(&mut self, frame: Frame) -> Result<(), CloseReason> {
        self.send_to(Side::Client, frame).await?;
        self.upstream_to_client += 1;
        Ok(())
    }

    async fn next_event(&mut self) -> Event {
        tokio::select! {
            frame = self.client.recv() => Event::Client(frame),
            frame = self.upstream.recv() => Event::Upstream(frame),
            _ = idle(self.idle_timeout) => Event::Idle,
        }
    }

    async fn relay(&mut self) -> CloseReason {
        loop {
            // frames queued behind a stalled send go first, in arrival order
            let step = if let Some(frame) = self.client_backlog.pop() {
                self.on_client_frame(frame).await
            } else if let Some(frame) = self.upstream_backlog.pop() {
                self.on_upstream_frame(frame).await
            } else {
                match self.next_event().await {
                    Event::Client(Ok(Some(Frame::Close)) | Ok(None)) => {
                        Err(CloseReason::ClientClosed)
                    }
                    Event::Client(Ok(Some(frame))) => self.on_client_frame(frame).await,
                    Event::Client(Err(e)) => Err(Side::Client.failed(e)),
                    Event::Upstream(Ok(Some(Frame::Close)) | Ok(None)) => {
                        Err(CloseReason::UpstreamClosed)
                    }
                    Event::Upstream(Ok(Some(frame))) => self.on_upstream_frame(frame).await,
                    Event::Upstream(Err(e)) => Err(Side::Upstream.failed(e)),
                    Event::Idle => Err(CloseReason::IdleTimeout),
                }
            };
            if let Err(reason) = step {
                return reason;
            }
        }
    }
}

/// Relays frames between an already-connected pair until either side ends,
/// then closes both.
pub async fn run_session(
    id: Uuid,
    client: &mut dyn FrameSocket,
    upstream: &mut dyn FrameSocket,
    policy: ConfigPolicy,
    idle_timeout: Option<Duration>,
) -> SessionSummary {
    let started_at = Utc::now();
    let mut session = Session {
        client,
        upstream,
        policy,
        idle_timeout,
        phase: Phase::AwaitingConfig {
            held: Vec::new(),
            held_bytes: 0,
        },
        client_backlog: Backlog::default(),
        upstream_backlog: Backlog::default(),
        client_to_upstream: 0,
        upstream_to_client: 0,
    };

    let reason = session.relay().await;
    close_socket(&mut *session.upstream, Side::Upstream).await;
    close_socket(&mut *session.client, Side::Client).await;

    SessionSummary {
        id,
        started_at,
        client_to_upstream: session.client_to_upstream,
        upstream_to_client: session.upstream_to_client,
        reason,
    }
}

/// Full session for a freshly accepted browser socket: connect upstream,
/// relay, log the summary.
pub async fn serve_connection(
    client: &mut dyn FrameSocket,
    connector: &dyn UpstreamConnector,
    policy: ConfigPolicy,
    idle_timeout: Option<Duration>,
) -> SessionSummary {
    let id = Uuid::new_v4();
    let span = info_span!("audio_session", %id);

    async move {
        let summary = match connector.connect().await {
            Ok(mut upstream) => {
                info!("Upstream recognition socket connected");
                run_session(id, client, upstream.as_mut(), policy, idle_timeout).await
            }
            Err(e) => {
                error!("Failed to open upstream recognition socket: {e}");
                close_socket(client, Side::Client).await;
                SessionSummary {
                    id,
                    started_at: Utc::now(),
                    client_to_upstream: 0,
                    upstream_to_client: 0,
                    reason: CloseReason::UpstreamUnavailable(e.to_string()),
                }
            }
        };
        info!(
            duration_ms = (Utc::now() - summary.started_at).num_milliseconds(),
            client_to_upstream = summary.client_to_upstream,
            upstream_to_client = summary.upstream_to_client,
            reason = ?summary.reason,
            "Audio session closed"
        );
        summary
    }
    .instrument(span)
    .await
}

// ────────────────────────────────────────────────────────────────────────────
// Socket adapters
// ────────────────────────────────────────────────────────────────────────────

/// Browser side, accepted through axum's upgrade.
pub struct ClientSocket(WebSocket);

impl ClientSocket {
    pub fn new(socket: WebSocket) -> Self {
        Self(socket)
    }
}

#[async_trait]
impl FrameSocket for ClientSocket {
    async fn recv(&mut self) -> Result<Option<Frame>, ProxyError> {
        loop {
            let frame = match self.0.recv().await {
                None => return Ok(None),
                Some(Err(e)) => return Err(ProxyError::Socket(e.to_string())),
                Some(Ok(ClientMessage::Text(t))) => Frame::Text(t),
                Some(Ok(ClientMessage::Binary(b))) => Frame::Binary(b),
                Some(Ok(ClientMessage::Close(_))) => Frame::Close,
                Some(Ok(ClientMessage::Ping(_) | ClientMessage::Pong(_))) => continue,
            };
            return Ok(Some(frame));
        }
    }

    async fn send(&mut self, frame: Frame) -> Result<(), ProxyError> {
        let message = match frame {
            Frame::Text(t) => ClientMessage::Text(t),
            Frame::Binary(b) => ClientMessage::Binary(b),
            Frame::Close => ClientMessage::Close(None),
        };
        self.0
            .send(message)
            .await
            .map_err(|e| ProxyError::Socket(e.to_string()))
    }

    async fn close(&mut self) {
        // fails harmlessly when the browser already closed
        let _ = self.0.send(ClientMessage::Close(None)).await;
    }
}

/// Recognition side, a client connection made with tokio-tungstenite.
pub struct UpstreamSocket(WebSocketStream<MaybeTlsStream<TcpStream>>);

#[async_trait]
impl FrameSocket for UpstreamSocket {
    async fn recv(&mut self) -> Result<Option<Frame>, ProxyError> {
        loop {
            let frame = match self.0.next().await {
                None => return Ok(None),
                Some(Err(e)) => return Err(ProxyError::Socket(e.to_string())),
                Some(Ok(UpstreamMessage::Text(t))) => Frame::Text(t),
                Some(Ok(UpstreamMessage::Binary(b))) => Frame::Binary(b),
                Some(Ok(UpstreamMessage::Close(_))) => Frame::Close,
                Some(Ok(
                    UpstreamMessage::Ping(_) | UpstreamMessage::Pong(_) | UpstreamMessage::Frame(_),
                )) => continue,
            };
            return Ok(Some(frame));
        }
    }

    async fn send(&mut self, frame: Frame) -> Result<(), ProxyError> {
        let message = match frame {
            Frame::Text(t) => UpstreamMessage::Text(t),
            Frame::Binary(b) => UpstreamMessage::Binary(b),
            Frame::Close => UpstreamMessage::Close(None),
        };
        self.0
            .send(message)
            .await
            .map_err(|e| ProxyError::Socket(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.0.close(None).await;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Vendor connector
// ────────────────────────────────────────────────────────────────────────────

/// Connects to the vendor's recognition socket with a freshly issued token.
pub struct VendorConnector {
    speech: SpeechClient,
    config: SpeechConfig,
}

impl VendorConnector {
    pub fn new(speech: SpeechClient, config: SpeechConfig) -> Self {
        Self { speech, config }
    }
}

/// Recognition socket URL carrying the vendor's auth query parameters.
pub fn vendor_url(config: &SpeechConfig, app_id: &str, token: &str) -> Result<Url, ProxyError> {
    let access_key = format!("Jwt; {token}");
    Url::parse_with_params(
        &config.asr_url,
        &[
            ("api_resource_id", config.resource_id.as_str()),
            ("api_app_key", app_id),
            ("api_access_key", access_key.as_str()),
        ],
    )
    .map_err(|e| ProxyError::UpstreamUnavailable(format!("invalid recognition URL: {e}")))
}

#[async_trait]
impl UpstreamConnector for VendorConnector {
    async fn connect(&self) -> Result<Box<dyn FrameSocket>, ProxyError> {
        let (Some(app_id), Some(access_key)) =
            (self.config.app_id.as_deref(), self.config.access_key.as_deref())
        else {
            return Err(SpeechError::MissingCredentials.into());
        };

        let body = self.speech.issue_token(app_id, access_key).await?;
        let token = jwt_token(&body)?;
        let url = vendor_url(&self.config, app_id, &token)?;

        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ProxyError::UpstreamUnavailable(e.to_string()))?;
        Ok(Box::new(UpstreamSocket(stream)))
    }
}
