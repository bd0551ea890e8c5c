//! Shared connection manager.
//!
//! Owns the single physical WebSocket for a client session. A supervisor
//! task connects, pumps frames to the registered [`FrameSink`], sends
//! heartbeats, closes stale sockets and reconnects with backoff. The
//! logical connection survives socket replacement; each successful open
//! increments the epoch.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::backoff::Backoff;
use super::config::WsConfig;
use super::error::WsError;
use super::messages::{ClientFrame, FrameAction, ServerFrame};
use super::metrics::StreamMetrics;
use super::network::NetworkMonitor;
use super::transport::{FrameSink, Transport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close codes the server uses to reject a listen key.
const AUTH_CLOSE_CODES: [u16; 2] = [4001, 4401];

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Opening a socket or waiting to retry.
    Connecting,
    /// Socket open.
    Open,
    /// Closing on request.
    Closing,
    /// No socket and no retry scheduled.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Observable connection status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Consecutive failed attempts since the last successful open.
    pub attempt: u32,
    /// Epoch of the current or last open socket, 0 before the first open.
    pub epoch: u64,
    /// Time the last inbound frame arrived.
    pub last_frame_at: Option<Instant>,
    /// Last failure. Persists in `Closed` once attempts are exhausted.
    pub error: Option<String>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Closed,
            attempt: 0,
            epoch: 0,
            last_frame_at: None,
            error: None,
        }
    }
}

impl ConnectionStatus {
    /// Returns true if the socket is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }
}

enum Control {
    Reconnect,
    Disconnect,
}

enum SocketEnd {
    Lost(String),
    Reconnect,
    Disconnect,
}

struct Outbound {
    epoch: u64,
    tx: mpsc::Sender<Message>,
}

struct Supervisor {
    id: u64,
    control: mpsc::UnboundedSender<Control>,
    handle: JoinHandle<()>,
}

struct Shared {
    sink: Option<Weak<dyn FrameSink>>,
    outbound: Option<Outbound>,
    supervisor: Option<Supervisor>,
    next_supervisor_id: u64,
    listen_key: Option<String>,
    epoch: u64,
    last_frame_at: Option<Instant>,
}

struct Inner {
    config: WsConfig,
    backoff: Backoff,
    metrics: Arc<StreamMetrics>,
    network: NetworkMonitor,
    status: watch::Sender<ConnectionStatus>,
    auth_rejected: Notify,
    shared: Mutex<Shared>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, state: ConnectionState, attempt: u32, error: Option<String>) {
        let epoch = self.lock().epoch;
        self.status.send_modify(|status| {
            status.state = state;
            status.attempt = attempt;
            status.epoch = epoch;
            status.error = error;
        });
    }

    /// Marks the connection closed, keeping any recorded failure.
    fn settle_closed(&self) {
        self.status.send_if_modified(|status| {
            if status.state == ConnectionState::Closed {
                return false;
            }
            status.state = ConnectionState::Closed;
            status.attempt = 0;
            true
        });
    }

    fn connection_url(&self) -> String {
        let shared = self.lock();
        self.config.url_with_listen_key(shared.listen_key.as_deref())
    }

    fn sink(&self) -> Option<Arc<dyn FrameSink>> {
        self.lock().sink.as_ref().and_then(Weak::upgrade)
    }

    fn touch(&self) {
        self.lock().last_frame_at = Some(Instant::now());
    }

    fn dispatch(&self, text: &str) {
        if text.contains("error") {
            if let Ok(frame) = ServerFrame::parse(text) {
                if frame.action == FrameAction::Error && frame.error_code().as_deref() == Some("401")
                {
                    warn!("server rejected the listen key");
                    self.auth_rejected.notify_one();
                }
            }
        }
        match self.sink() {
            Some(sink) => sink.on_frame(text),
            None => debug!("no frame sink registered, dropping frame"),
        }
    }

    fn release_supervisor(&self, id: u64) {
        let mut shared = self.lock();
        if shared.supervisor.as_ref().map(|s| s.id) == Some(id) {
            shared.supervisor = None;
        }
    }
}

/// The shared, multiplexed streaming connection.
///
/// Dropping the manager disconnects it.
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.inner.config.url)
            .field("status", &*self.inner.status.borrow())
            .finish()
    }
}

impl ConnectionManager {
    /// Creates a manager. No socket is opened until
    /// [`ensure_connected`](Transport::ensure_connected) is called.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: WsConfig,
        metrics: Arc<StreamMetrics>,
        network: NetworkMonitor,
    ) -> Result<Self, WsError> {
        config.validate()?;
        let (status, _rx) = watch::channel(ConnectionStatus::default());
        let listen_key = config.listen_key.clone();
        Ok(Self {
            inner: Arc::new(Inner {
                backoff: Backoff::from_config(&config),
                config,
                metrics,
                network,
                status,
                auth_rejected: Notify::new(),
                shared: Mutex::new(Shared {
                    sink: None,
                    outbound: None,
                    supervisor: None,
                    next_supervisor_id: 0,
                    listen_key,
                    epoch: 0,
                    last_frame_at: None,
                }),
            }),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &WsConfig {
        &self.inner.config
    }

    /// Registers the consumer of inbound frames and open events.
    ///
    /// The sink is held weakly and replaces any previous one.
    pub fn set_frame_sink(&self, sink: Weak<dyn FrameSink>) {
        self.inner.lock().sink = Some(sink);
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        let mut status = self.inner.status.borrow().clone();
        status.last_frame_at = self.inner.lock().last_frame_at;
        status
    }

    /// Returns a receiver for state changes.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Returns true if a socket is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.status.borrow().is_open()
    }

    /// Sets the listen key used in the connection URL for the next socket.
    pub fn set_listen_key(&self, listen_key: Option<String>) {
        self.inner.lock().listen_key = listen_key;
    }

    /// Returns the listen key used in the connection URL.
    #[must_use]
    pub fn listen_key(&self) -> Option<String> {
        self.inner.lock().listen_key.clone()
    }

    /// Replaces the socket now, without backoff.
    pub fn reconnect_now(&self) {
        let control = self
            .inner
            .lock()
            .supervisor
            .as_ref()
            .filter(|s| !s.handle.is_finished())
            .map(|s| s.control.clone());
        match control {
            Some(control) => {
                debug!("forcing reconnect");
                let _ = control.send(Control::Reconnect);
            }
            None => self.ensure_connected(),
        }
    }

    /// Waits until the server rejects the listen key.
    pub async fn auth_rejected(&self) {
        self.inner.auth_rejected.notified().await;
    }

    /// Closes the socket and stops reconnecting. The state ends `Closed`;
    /// an exhausted-attempts error stays visible.
    pub fn disconnect(&self) {
        let supervisor = self.inner.lock().supervisor.take();
        match supervisor {
            Some(supervisor) => {
                info!("disconnecting");
                let _ = supervisor.control.send(Control::Disconnect);
            }
            None => self.inner.settle_closed(),
        }
    }

    /// Disconnects and waits for the supervisor to finish.
    pub async fn close(&self) {
        let supervisor = self.inner.lock().supervisor.take();
        if let Some(supervisor) = supervisor {
            let _ = supervisor.control.send(Control::Disconnect);
            let _ = supervisor.handle.await;
        } else {
            self.inner.settle_closed();
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(supervisor) = self.inner.lock().supervisor.take() {
            let _ = supervisor.control.send(Control::Disconnect);
        }
    }
}

impl Transport for ConnectionManager {
    fn ensure_connected(&self) {
        let mut shared = self.inner.lock();
        if shared
            .supervisor
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
        {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!("no tokio runtime, cannot open the stream connection");
            return;
        };

        let id = shared.next_supervisor_id;
        shared.next_supervisor_id += 1;
        let (control, control_rx) = mpsc::unbounded_channel();
        let handle = runtime.spawn(supervise(Arc::clone(&self.inner), id, control_rx));
        shared.supervisor = Some(Supervisor {
            id,
            control,
            handle,
        });
        drop(shared);

        debug!(url = %self.inner.config.url, "connection supervisor started");
    }

    fn send(&self, frame: &ClientFrame) -> Result<u64, WsError> {
        let json = frame.to_json()?;
        let shared = self.inner.lock();
        let outbound = shared.outbound.as_ref().ok_or(WsError::NotConnected)?;
        outbound
            .tx
            .try_send(Message::Text(json.into()))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    WsError::SendFailed("outbound queue full".to_string())
                }
                mpsc::error::TrySendError::Closed(_) => WsError::NotConnected,
            })?;
        Ok(outbound.epoch)
    }
}

async fn supervise(inner: Arc<Inner>, id: u64, mut control: mpsc::UnboundedReceiver<Control>) {
    let mut attempt: u32 = 0;

    loop {
        if !inner.network.is_online() {
            inner.set_status(
                ConnectionState::Connecting,
                attempt,
                Some("offline".to_string()),
            );
            info!("network offline, waiting before connecting");
            tokio::select! {
                _ = inner.network.wait_online() => {}
                cmd = control.recv() => {
                    if !matches!(cmd, Some(Control::Reconnect)) {
                        break;
                    }
                }
            }
            continue;
        }

        inner.set_status(ConnectionState::Connecting, attempt, None);
        let url = inner.connection_url();
        debug!(attempt, "connecting");

        let connected = tokio::select! {
            res = tokio_tungstenite::connect_async(url.as_str()) => res,
            cmd = control.recv() => match cmd {
                Some(Control::Reconnect) => continue,
                _ => break,
            },
        };

        let reason = match connected {
            Ok((ws, _response)) => {
                attempt = 0;
                match run_socket(&inner, ws, &mut control).await {
                    SocketEnd::Disconnect => break,
                    SocketEnd::Reconnect => continue,
                    SocketEnd::Lost(reason) => reason,
                }
            }
            Err(e) => e.to_string(),
        };

        if inner.config.max_reconnect_attempts.is_some_and(|max| attempt >= max) {
            error!(attempt, reason = %reason, "reconnect attempts exhausted");
            inner.set_status(
                ConnectionState::Closed,
                attempt,
                Some(format!("disconnected: {}", reason)),
            );
            inner.release_supervisor(id);
            return;
        }

        let delay = inner.backoff.delay(attempt);
        attempt += 1;
        inner.metrics.record_reconnect();
        warn!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            reason = %reason,
            "connection lost, scheduling reconnect"
        );
        inner.set_status(ConnectionState::Connecting, attempt, Some(reason));

        tokio::select! {
            _ = sleep(delay) => {}
            cmd = control.recv() => {
                if !matches!(cmd, Some(Control::Reconnect)) {
                    break;
                }
            }
        }
    }

    inner.set_status(ConnectionState::Closed, 0, None);
    inner.release_supervisor(id);
    info!("connection closed");
}

async fn run_socket(
    inner: &Arc<Inner>,
    ws: WsStream,
    control: &mut mpsc::UnboundedReceiver<Control>,
) -> SocketEnd {
    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::channel::<Message>(inner.config.outbound_buffer);

    let epoch = {
        let mut shared = inner.lock();
        shared.epoch += 1;
        shared.last_frame_at = Some(Instant::now());
        shared.outbound = Some(Outbound {
            epoch: shared.epoch,
            tx,
        });
        shared.epoch
    };
    inner.metrics.record_connection_opened();
    inner.set_status(ConnectionState::Open, 0, None);
    info!(epoch, "connection open");

    if let Some(frame_sink) = inner.sink() {
        frame_sink.on_open(epoch, epoch > 1);
    }

    let config = &inner.config;
    let now = tokio::time::Instant::now();
    let mut heartbeat = interval_at(now + config.heartbeat_interval, config.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stale_check = interval_at(
        now + config.stale_check_interval,
        config.stale_check_interval,
    );
    stale_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_frame = tokio::time::Instant::now();

    let end = loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    last_frame = tokio::time::Instant::now();
                    inner.touch();
                    inner.dispatch(text.as_str());
                }
                Some(Ok(Message::Binary(bytes))) => {
                    last_frame = tokio::time::Instant::now();
                    inner.touch();
                    match std::str::from_utf8(&bytes) {
                        Ok(text) => inner.dispatch(text),
                        Err(_) => warn!(len = bytes.len(), "dropping non-UTF-8 binary frame"),
                    }
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    last_frame = tokio::time::Instant::now();
                    inner.touch();
                }
                Some(Ok(Message::Close(frame))) => {
                    break SocketEnd::Lost(close_reason(inner, frame.as_ref()));
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => break SocketEnd::Lost(e.to_string()),
                None => break SocketEnd::Lost("stream ended".to_string()),
            },
            Some(outgoing) = rx.recv() => {
                if let Err(e) = sink.send(outgoing).await {
                    break SocketEnd::Lost(format!("write failed: {}", e));
                }
            }
            _ = heartbeat.tick() => {
                match ClientFrame::Ping.to_json() {
                    Ok(json) => {
                        if let Err(e) = sink.send(Message::Text(json.into())).await {
                            break SocketEnd::Lost(format!("heartbeat failed: {}", e));
                        }
                        inner.metrics.record_heartbeat();
                    }
                    Err(e) => warn!(error = %e, "failed to encode heartbeat"),
                }
            }
            _ = stale_check.tick() => {
                let silent = last_frame.elapsed();
                if silent > config.stale_timeout {
                    warn!(silent_ms = u64::try_from(silent.as_millis()).unwrap_or(u64::MAX), "connection stale, closing");
                    inner.metrics.record_stale_close();
                    break SocketEnd::Lost("stale connection".to_string());
                }
            }
            cmd = control.recv() => match cmd {
                Some(Control::Reconnect) => break SocketEnd::Reconnect,
                Some(Control::Disconnect) | None => break SocketEnd::Disconnect,
            },
        }
    };

    {
        let mut shared = inner.lock();
        if shared.outbound.as_ref().map(|o| o.epoch) == Some(epoch) {
            shared.outbound = None;
        }
    }
    if matches!(end, SocketEnd::Disconnect) {
        inner.set_status(ConnectionState::Closing, 0, None);
    }
    if !matches!(end, SocketEnd::Lost(_)) {
        let _ = sink.send(Message::Close(None)).await;
    }
    let _ = sink.close().await;
    inner.metrics.record_connection_closed();
    debug!(epoch, "socket closed");

    end
}

fn close_reason(inner: &Inner, frame: Option<&CloseFrame>) -> String {
    match frame {
        Some(frame) => {
            let code = u16::from(frame.code);
            if AUTH_CLOSE_CODES.contains(&code) {
                warn!(code, "server closed the connection rejecting the listen key");
                inner.auth_rejected.notify_one();
            }
            format!("closed by server ({}): {}", code, frame.reason.as_str())
        }
        None => "closed by server".to_string(),
    }
}
