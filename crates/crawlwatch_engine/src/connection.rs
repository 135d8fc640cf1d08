use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crawlwatch_logging::{crawl_debug, crawl_error, crawl_info, crawl_warn};
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::stomp::{self, Command, Inbound, StompFrame};
use crate::{ConnectionError, EngineEvent, EventSink};

/// Missed incoming heartbeats tolerated before the link counts as dead.
const SILENCE_FACTOR: u32 = 2;

/// Callback invoked with the body of every message on a subscribed destination.
pub type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

impl SubscriptionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    fn parse(raw: &str) -> Option<Self> {
        raw.strip_prefix("sub-")?.parse().ok().map(SubscriptionId)
    }
}

#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Constant pause between a failure and the next handshake attempt.
    pub reconnect_delay: Duration,
    /// Heartbeat interval offered in both directions; the server may slow it down.
    pub heartbeat: Duration,
    pub handshake_timeout: Duration,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            heartbeat: Duration::from_secs(4),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// The single persistent push connection to the server.
///
/// `connect` returns immediately and keeps (re)connecting in the background
/// until `disconnect` is called. Subscriptions do not survive a reconnect:
/// `subscribe` fails fast while disconnected and callers re-subscribe after
/// the next [`EngineEvent::Connected`].
pub trait ChannelConnection: Send + Sync {
    fn connect(&self, sink: Arc<dyn EventSink>);
    fn disconnect(&self);
    fn is_connected(&self) -> bool;
    fn subscribe(&self, destination: &str, handler: MessageHandler) -> Option<SubscriptionId>;
    fn unsubscribe(&self, id: SubscriptionId);
}

struct Route {
    destination: String,
    handler: MessageHandler,
}

#[derive(Default)]
struct LinkState {
    cancel: Option<CancellationToken>,
    outbound: Option<mpsc::UnboundedSender<StompFrame>>,
    routes: HashMap<SubscriptionId, Route>,
}

struct Inner {
    url: String,
    host: String,
    settings: ChannelSettings,
    connected: AtomicBool,
    next_id: AtomicU64,
    link: Mutex<LinkState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes a fresh session unless `token` was cancelled meanwhile.
    fn mark_connected(
        &self,
        token: &CancellationToken,
        outbound: mpsc::UnboundedSender<StompFrame>,
    ) -> bool {
        let mut link = self.lock();
        if token.is_cancelled() {
            return false;
        }
        link.outbound = Some(outbound);
        link.routes.clear();
        self.connected.store(true, Ordering::SeqCst);
        true
    }

    /// Drops session state; returns whether a session had been live.
    fn mark_disconnected(&self, token: &CancellationToken) -> bool {
        let mut link = self.lock();
        if token.is_cancelled() {
            // `disconnect` already cleaned up and may have started a new loop.
            return false;
        }
        link.outbound = None;
        link.routes.clear();
        self.connected.swap(false, Ordering::SeqCst)
    }

    fn dispatch(&self, text: &str) -> Result<(), ConnectionError> {
        let frame = match stomp::decode_frame(text) {
            Ok(Inbound::Heartbeat) => return Ok(()),
            Ok(Inbound::Frame(frame)) => frame,
            Err(err) => {
                crawl_warn!("Ignoring undecodable STOMP frame: {}", err);
                return Ok(());
            }
        };

        match frame.command {
            Command::Message => {
                let handler = {
                    let link = self.lock();
                    let by_id = frame
                        .get("subscription")
                        .and_then(SubscriptionId::parse)
                        .and_then(|id| link.routes.get(&id));
                    let route = by_id.or_else(|| {
                        let destination = frame.get("destination")?;
                        link.routes
                            .values()
                            .find(|route| route.destination == destination)
                    });
                    route.map(|route| route.handler.clone())
                };
                match handler {
                    Some(handler) => handler(&frame.body),
                    None => crawl_debug!(
                        "MESSAGE for unknown subscription {:?}",
                        frame.get("subscription")
                    ),
                }
                Ok(())
            }
            Command::Error => Err(ConnectionError::Stomp {
                message: frame
                    .get("message")
                    .map(str::to_string)
                    .unwrap_or_else(|| frame.body.clone()),
            }),
            other => {
                crawl_debug!("Ignoring {} frame", other);
                Ok(())
            }
        }
    }
}

/// STOMP-over-WebSocket implementation of [`ChannelConnection`].
pub struct StompConnection {
    inner: Arc<Inner>,
}

impl StompConnection {
    pub fn new(url: &str, settings: ChannelSettings) -> Result<Self, ConnectionError> {
        let parsed = Url::parse(url).map_err(|err| ConnectionError::InvalidUrl(err.to_string()))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(ConnectionError::InvalidUrl(format!(
                "unsupported scheme {}",
                parsed.scheme()
            )));
        }
        let host = parsed.host_str().unwrap_or("localhost").to_string();
        Ok(Self {
            inner: Arc::new(Inner {
                url: parsed.to_string(),
                host,
                settings,
                connected: AtomicBool::new(false),
                next_id: AtomicU64::new(0),
                link: Mutex::new(LinkState::default()),
            }),
        })
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }
}

impl ChannelConnection for StompConnection {
    fn connect(&self, sink: Arc<dyn EventSink>) {
        let Ok(runtime) = Handle::try_current() else {
            crawl_error!("Push channel needs a tokio runtime; not connecting");
            return;
        };
        let token = {
            let mut link = self.inner.lock();
            if link.cancel.is_some() {
                crawl_debug!("Push channel already active");
                return;
            }
            let token = CancellationToken::new();
            link.cancel = Some(token.clone());
            token
        };
        runtime.spawn(run_link(self.inner.clone(), token, sink));
    }

    fn disconnect(&self) {
        let mut link = self.inner.lock();
        let Some(token) = link.cancel.take() else {
            return;
        };
        token.cancel();
        link.outbound = None;
        link.routes.clear();
        self.inner.connected.store(false, Ordering::SeqCst);
        crawl_info!("Push channel disconnected");
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self, destination: &str, handler: MessageHandler) -> Option<SubscriptionId> {
        if !self.is_connected() {
            return None;
        }
        let mut link = self.inner.lock();
        let outbound = link.outbound.clone()?;
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let frame = StompFrame::new(Command::Subscribe)
            .header("id", id.to_string())
            .header("destination", destination)
            .header("ack", "auto");
        outbound.send(frame).ok()?;
        link.routes.insert(
            id,
            Route {
                destination: destination.to_string(),
                handler,
            },
        );
        crawl_debug!("Subscribed {} to {}", id, destination);
        Some(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut link = self.inner.lock();
        if link.routes.remove(&id).is_none() {
            return;
        }
        if let Some(outbound) = &link.outbound {
            let _ = outbound.send(StompFrame::new(Command::Unsubscribe).header("id", id.to_string()));
        }
        crawl_debug!("Unsubscribed {}", id);
    }
}

impl Drop for StompConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn run_link(inner: Arc<Inner>, token: CancellationToken, sink: Arc<dyn EventSink>) {
    let delay = inner.settings.reconnect_delay;
    loop {
        let outcome = run_session(&inner, &token, sink.as_ref()).await;
        if inner.mark_disconnected(&token) {
            sink.emit(EngineEvent::Disconnected);
        }
        match outcome {
            Ok(()) => break,
            Err(err) => {
                crawl_warn!(
                    "Push channel to {} failed: {}; retrying in {:?}",
                    inner.url,
                    err,
                    delay
                );
                sink.emit(EngineEvent::ConnectionFailed {
                    message: err.to_string(),
                });
            }
        }
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    crawl_debug!("Push channel loop for {} stopped", inner.url);
}

/// Runs one connection from handshake to teardown. `Ok` means cancelled.
async fn run_session(
    inner: &Inner,
    token: &CancellationToken,
    sink: &dyn EventSink,
) -> Result<(), ConnectionError> {
    let timeout = inner.settings.handshake_timeout;
    let socket = tokio::select! {
        _ = token.cancelled() => return Ok(()),
        result = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(inner.url.as_str())) => {
            let (socket, _response) = result
                .map_err(|_| ConnectionError::Timeout)?
                .map_err(|err| ConnectionError::Handshake(err.to_string()))?;
            socket
        }
    };
    let (mut write, mut read) = socket.split();

    let heartbeat_ms = inner.settings.heartbeat.as_millis();
    let connect = StompFrame::new(Command::Connect)
        .header("accept-version", "1.2")
        .header("host", inner.host.as_str())
        .header("heart-beat", format!("{heartbeat_ms},{heartbeat_ms}"));
    write
        .send(Message::Text(connect.encode()))
        .await
        .map_err(transport)?;

    let connected = tokio::select! {
        _ = token.cancelled() => return Ok(()),
        result = tokio::time::timeout(timeout, await_connected(&mut read)) => {
            result.map_err(|_| ConnectionError::Timeout)??
        }
    };

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    if !inner.mark_connected(token, outbound_tx) {
        return Ok(());
    }
    crawl_info!(
        "Push channel connected to {} (server {})",
        inner.url,
        connected.get("server").unwrap_or("unknown")
    );
    sink.emit(EngineEvent::Connected);

    let heartbeats =
        stomp::negotiate_heartbeats(inner.settings.heartbeat, connected.get("heart-beat"));
    crawl_debug!("Heartbeats for {}: {:?}", inner.url, heartbeats);
    let mut beat = heartbeats.outgoing.map(|period| {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.reset();
        interval
    });
    let silence_limit = heartbeats.incoming.map(|period| period * SILENCE_FACTOR);
    let mut last_inbound = Instant::now();

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                let farewell = StompFrame::new(Command::Disconnect).encode();
                let _ = write.send(Message::Text(farewell)).await;
                let _ = write.close().await;
                return Ok(());
            }
            Some(frame) = outbound_rx.recv() => {
                write.send(Message::Text(frame.encode())).await.map_err(transport)?;
            }
            _ = next_beat(&mut beat) => {
                write.send(Message::Text("\n".to_string())).await.map_err(transport)?;
            }
            _ = silence(last_inbound, silence_limit) => {
                let limit = silence_limit.unwrap_or_default();
                crawl_warn!("No data from {} for {:?}; dropping the link", inner.url, limit);
                return Err(ConnectionError::HeartbeatTimeout(limit));
            }
            incoming = read.next() => {
                let message = match incoming {
                    None => return Err(ConnectionError::Closed),
                    Some(Err(err)) => return Err(transport(err)),
                    Some(Ok(message)) => message,
                };
                last_inbound = Instant::now();
                match message {
                    Message::Close(_) => return Err(ConnectionError::Closed),
                    Message::Text(text) => inner.dispatch(&text)?,
                    Message::Binary(bytes) => match String::from_utf8(bytes) {
                        Ok(text) => inner.dispatch(&text)?,
                        Err(_) => crawl_warn!("Ignoring non-UTF-8 binary message"),
                    },
                    _ => {}
                }
            }
        }
    }
}

async fn next_beat(beat: &mut Option<Interval>) {
    match beat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Resolves once nothing has arrived for `limit` since `last_inbound`.
async fn silence(last_inbound: Instant, limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep_until(last_inbound + limit).await,
        None => std::future::pending().await,
    }
}

async fn await_connected<S>(read: &mut S) -> Result<StompFrame, ConnectionError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(incoming) = read.next().await {
        let text = match incoming.map_err(transport)? {
            Message::Text(text) => text,
            Message::Close(_) => return Err(ConnectionError::Closed),
            _ => continue,
        };
        match stomp::decode_frame(&text) {
            Ok(Inbound::Frame(frame)) if frame.command == Command::Connected => return Ok(frame),
            Ok(Inbound::Frame(frame)) if frame.command == Command::Error => {
                return Err(ConnectionError::Stomp {
                    message: frame
                        .get("message")
                        .map(str::to_string)
                        .unwrap_or(frame.body),
                });
            }
            Ok(_) => {}
            Err(err) => crawl_warn!("Ignoring undecodable frame during handshake: {}", err),
        }
    }
    Err(ConnectionError::Closed)
}

fn transport(err: tungstenite::Error) -> ConnectionError {
    ConnectionError::Transport(err.to_string())
}
