//! Realtime session: one websocket, a read pump, a write pump.
//!
//! The read pump turns frames into [`InboundEvent`]s. The write pump drains
//! the [`OutboundQueue`] and also feeds it a keepalive ping on every tick, so
//! pings share the same identifier sequence as user messages.

use crate::api::SlackApi;
use crate::config::BotConfig;
use crate::error::{Result, SlackError};
use crate::frame::classify;
use crate::queue::{OutboundQueue, OutboundReceiver};
use crate::types::{ChannelId, Identity, InboundEvent, OutboundMessage};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message, Utf8Bytes};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;
type InboundSlot = Arc<Mutex<Option<mpsc::Sender<InboundEvent>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum SessionState {
    Disconnected = 0,
    Connecting = 1,
    Open = 2,
    Running = 3,
    Closing = 4,
    Closed = 5,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Disconnected,
            1 => Self::Connecting,
            2 => Self::Open,
            3 => Self::Running,
            4 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Running => "running",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Forward-only state cell.
#[derive(Debug)]
pub(crate) struct Lifecycle(AtomicU8);

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(SessionState::Disconnected as u8))
    }

    pub(crate) fn current(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Exact `from -> to` step. Fails if another path already moved the state.
    pub(crate) fn transition(&self, from: SessionState, to: SessionState) -> Result<()> {
        if to <= from {
            return Err(SlackError::InvalidTransition { from, to });
        }
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| SlackError::InvalidTransition {
                from: SessionState::from_u8(actual),
                to,
            })
    }

    /// Moves to `to` unless the state is already there or beyond.
    pub(crate) fn advance_to(&self, to: SessionState) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if current >= to as u8 {
                return false;
            }
            match self.0.compare_exchange_weak(
                current,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

pub struct Session {
    lifecycle: Arc<Lifecycle>,
    stopped: AtomicBool,
    keepalive_interval: Duration,
    close_grace: Duration,
    sink: Arc<Mutex<WsSink>>,
    source: Mutex<Option<WsSource>>,
    outbound: OutboundQueue,
    outbound_rx: Mutex<Option<OutboundReceiver>>,
    inbound_tx: InboundSlot,
    inbound_rx: Mutex<Option<mpsc::Receiver<InboundEvent>>>,
    shutdown: CancellationToken,
}

impl Session {
    /// Identity check, connect handshake, then dial. Nothing is retried.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn connect(config: &BotConfig) -> Result<(Self, Identity)> {
        config.validate()?;
        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.transition(SessionState::Disconnected, SessionState::Connecting)?;

        let api = SlackApi::new(config.token(), config.api_base_url(), config.http_timeout())?;
        let identity = api.auth_test().await?;
        let endpoint = api.rtm_connect().await?;
        let (socket, _response) = tokio_tungstenite::connect_async(endpoint.url.as_str()).await?;
        let (sink, source) = socket.split();

        let (outbound, outbound_rx) = OutboundQueue::bounded(config.outbound_capacity());
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity());
        lifecycle.transition(SessionState::Connecting, SessionState::Open)?;
        tracing::info!(
            user_id = %identity.user_id,
            display_name = %identity.display_name,
            "realtime session open"
        );

        let session = Self {
            lifecycle,
            stopped: AtomicBool::new(false),
            keepalive_interval: config.keepalive_interval(),
            close_grace: config.close_grace(),
            sink: Arc::new(Mutex::new(sink)),
            source: Mutex::new(Some(source)),
            outbound,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            inbound_tx: Arc::new(Mutex::new(Some(inbound_tx))),
            inbound_rx: Mutex::new(Some(inbound_rx)),
            shutdown: CancellationToken::new(),
        };
        Ok((session, identity))
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.current()
    }

    /// The inbound event stream. There is a single consumer; later calls fail.
    pub async fn events(&self) -> Result<mpsc::Receiver<InboundEvent>> {
        self.inbound_rx
            .lock()
            .await
            .take()
            .ok_or(SlackError::AlreadyStarted)
    }

    pub async fn say(&self, channel: impl Into<ChannelId>, text: impl Into<String>) -> Result<()> {
        self.outbound.push(OutboundMessage::say(channel, text)).await
    }

    /// Runs both pumps until each has exited, then stops the session.
    ///
    /// A session that is already stopping or stopped has nothing to run, so
    /// `start` returns `Ok(())` without touching it.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn start(&self) -> Result<()> {
        match self
            .lifecycle
            .transition(SessionState::Open, SessionState::Running)
        {
            Ok(()) => {}
            Err(SlackError::InvalidTransition {
                from: SessionState::Closing | SessionState::Closed,
                ..
            }) => {
                tracing::debug!("session already stopped; nothing to start");
                return Ok(());
            }
            Err(error) => return Err(error),
        }
        let source = self.source.lock().await.take();
        let outbound_rx = self.outbound_rx.lock().await.take();
        let (Some(source), Some(outbound_rx)) = (source, outbound_rx) else {
            return Err(SlackError::AlreadyStarted);
        };

        let read = {
            let inbound = self.inbound_tx.clone();
            let shutdown = self.shutdown.clone();
            let lifecycle = self.lifecycle.clone();
            tokio::spawn(async move {
                let result = read_pump(source, inbound, shutdown.clone()).await;
                lifecycle.advance_to(SessionState::Closing);
                shutdown.cancel();
                result
            })
        };
        let write = {
            let sink = self.sink.clone();
            let keepalive = self.outbound.clone();
            let interval = self.keepalive_interval;
            let shutdown = self.shutdown.clone();
            let lifecycle = self.lifecycle.clone();
            tokio::spawn(async move {
                let result =
                    write_pump(sink, outbound_rx, keepalive, interval, shutdown.clone()).await;
                if result.is_err() {
                    lifecycle.advance_to(SessionState::Closing);
                    shutdown.cancel();
                }
                result
            })
        };
        tracing::info!("realtime session running");

        let (read_exit, write_exit) = tokio::join!(read, write);
        log_pump_exit("read", read_exit);
        log_pump_exit("write", write_exit);

        self.stop().await
    }

    /// Idempotent. Only the first call tears anything down.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.lifecycle.advance_to(SessionState::Closing);
        self.outbound.close().await;

        let result = close_transport(&*self.sink, &self.inbound_tx, self.close_grace).await;
        self.shutdown.cancel();
        self.lifecycle.advance_to(SessionState::Closed);
        tracing::info!("realtime session closed");
        result
    }
}

/// Close frame, grace period, inbound close, transport close, in that order.
/// Teardown runs to the end even when the close frame cannot be sent; that
/// send error is what gets returned.
pub(crate) async fn close_transport<S>(
    sink: &Mutex<S>,
    inbound: &InboundSlot,
    grace: Duration,
) -> Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    let close_frame = CloseFrame {
        code: CloseCode::Normal,
        reason: Utf8Bytes::from_static(""),
    };
    let close_result = sink
        .lock()
        .await
        .send(Message::Close(Some(close_frame)))
        .await
        .map_err(|error| SlackError::Transport(error.to_string()));
    if let Err(error) = &close_result {
        tracing::warn!(%error, "failed to send close frame");
    }

    tokio::time::sleep(grace).await;
    inbound.lock().await.take();
    if let Err(error) = sink.lock().await.close().await {
        tracing::debug!(%error, "transport close");
    }
    close_result
}

fn log_pump_exit(
    pump: &'static str,
    exit: std::result::Result<Result<()>, tokio::task::JoinError>,
) {
    match exit {
        Ok(Ok(())) => tracing::debug!(pump, "pump exited"),
        Ok(Err(error)) => tracing::warn!(pump, %error, "pump exited with error"),
        Err(error) => tracing::error!(pump, %error, "pump task failed"),
    }
}

/// Reads until the transport ends, fails, or delivers a frame that cannot be
/// classified. A bad frame ends the pump rather than being skipped.
#[tracing::instrument(level = "info", skip_all)]
pub(crate) async fn read_pump<S>(
    mut source: S,
    inbound: InboundSlot,
    shutdown: CancellationToken,
) -> Result<()>
where
    S: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            frame = source.next() => frame,
        };
        let classified = match frame {
            Some(Ok(Message::Text(text))) => classify(text.as_bytes()),
            Some(Ok(Message::Binary(data))) => classify(&data),
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(?frame, "hub closed the transport");
                return Ok(());
            }
            Some(Ok(_)) => continue,
            Some(Err(error)) => {
                tracing::warn!(%error, "transport read error");
                return Err(error.into());
            }
            None => {
                tracing::info!("transport stream ended");
                return Ok(());
            }
        };
        let event = match classified {
            Ok(event) => event,
            Err(error) => {
                tracing::error!(%error, "unclassifiable frame; stopping read pump");
                return Err(error);
            }
        };

        let tx = inbound.lock().await.clone();
        let Some(tx) = tx else {
            return Ok(());
        };
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            sent = tx.send(event) => {
                if sent.is_err() {
                    tracing::debug!("inbound channel closed");
                    return Ok(());
                }
            }
        }
    }
}

/// Sole consumer of the outbound queue. Exits when the queue is closed and
/// drained, on a write failure, or on shutdown.
#[tracing::instrument(level = "info", skip_all)]
pub(crate) async fn write_pump<S>(
    sink: Arc<Mutex<S>>,
    mut outbound: OutboundReceiver,
    keepalive: OutboundQueue,
    interval: Duration,
    shutdown: CancellationToken,
) -> Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            message = outbound.next() => {
                let Some(message) = message else {
                    tracing::debug!(last_id = outbound.last_id(), "outbound queue closed");
                    return Ok(());
                };
                let payload = serde_json::to_string(&message)?;
                if let Err(error) = sink.lock().await.send(Message::Text(payload.into())).await {
                    tracing::warn!(%error, id = message.id(), "transport write error");
                    return Err(SlackError::Transport(error.to_string()));
                }
                tracing::debug!(id = message.id(), "frame written");
            }
            _ = ticker.tick() => {
                match keepalive.try_push(OutboundMessage::ping()).await {
                    Ok(()) => tracing::debug!("keepalive ping queued"),
                    Err(SlackError::QueueClosed) => {}
                    Err(error) => tracing::warn!(%error, "keepalive ping dropped"),
                }
            }
        }
    }
}
