use super::state::{ChannelCommand, ChannelEvent, ChannelState, ChannelStateMachine};
use crate::cancel::{CancelHandle, CancelReason};
use crate::config::RealtimeConfig;
use crate::credentials::CredentialStore;
use crate::error::{Error, ErrorContext};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use url::Url;

const EVENT_BUFFER: usize = 256;
const PING_EVENT: &str = "ping";
const PONG_EVENT: &str = "pong";

/// Opens duplex text connections. Injected so the driver runs without a real socket.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<Box<dyn ChannelConnection>>;
}

#[async_trait]
pub trait ChannelConnection: Send {
    async fn send(&mut self, frame: String) -> Result<()>;
    /// Next inbound frame; `None` once the peer closed the connection.
    async fn recv(&mut self) -> Option<Result<String>>;
    async fn close(&mut self);
}

/// A push event: `{"event": "...", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeMessage {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl RealtimeMessage {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Persistent channel with heartbeat and backoff reconnection.
///
/// `run` (or `spawn`) drives the connection until [`disconnect`](Self::disconnect)
/// is called or reconnect attempts are exhausted. A client runs once; build a
/// new one to connect again after it stops.
pub struct RealtimeClient {
    config: RealtimeConfig,
    url: Url,
    transport: Arc<dyn ChannelTransport>,
    credentials: Option<Arc<CredentialStore>>,
    state_tx: watch::Sender<ChannelState>,
    events_tx: broadcast::Sender<RealtimeMessage>,
    outbound_tx: mpsc::UnboundedSender<String>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    shutdown: CancelHandle,
}

enum Wake {
    Shutdown,
    Inbound(Option<Result<String>>),
    Heartbeat,
    Outbound(String),
    ReconnectDue,
}

impl RealtimeClient {
    pub fn new(config: RealtimeConfig, transport: Arc<dyn ChannelTransport>) -> Result<Self> {
        let raw = config.url.clone().ok_or_else(|| {
            Error::configuration(
                "realtime URL is not configured",
                ErrorContext::new()
                    .with_field_path("realtime.url")
                    .with_source("realtime_client"),
            )
        })?;
        let url = Url::parse(&raw).map_err(|e| {
            Error::configuration(
                "invalid realtime URL",
                ErrorContext::new()
                    .with_field_path("realtime.url")
                    .with_details(e.to_string())
                    .with_source("realtime_client"),
            )
        })?;

        let (state_tx, _) = watch::channel(ChannelState::Disconnected);
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            url,
            transport,
            credentials: None,
            state_tx,
            events_tx,
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            shutdown: CancelHandle::new(),
        })
    }

    /// Send the stored access token as the `token` query parameter on connect.
    pub fn with_credentials(mut self, store: Arc<CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    pub fn state(&self) -> ChannelState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state_tx.subscribe()
    }

    /// Inbound events. `pong` replies are not delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeMessage> {
        self.events_tx.subscribe()
    }

    /// Queue an outbound event. Fails unless the channel is connected.
    pub fn emit(&self, event: impl Into<String>, data: Value) -> Result<()> {
        if self.state() != ChannelState::Connected {
            return Err(Error::network("realtime channel is not connected"));
        }
        let frame = encode(&RealtimeMessage::new(event, data))?;
        self.outbound_tx
            .send(frame)
            .map_err(|_| Error::network("realtime channel has stopped"))
    }

    /// Stop the channel. No reconnect follows.
    pub fn disconnect(&self) {
        self.shutdown.cancel_with(CancelReason::Shutdown);
    }

    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.run().await })
    }

    pub async fn run(&self) {
        let taken = self
            .outbound_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(mut outbound) = taken else {
            warn!("realtime client already running");
            return;
        };

        let mut machine = ChannelStateMachine::new(&self.config);
        let mut conn: Option<Box<dyn ChannelConnection>> = None;
        let mut heartbeat: Option<Interval> = None;
        let mut reconnect_at: Option<Instant> = None;
        let mut commands: VecDeque<ChannelCommand> = machine.handle(ChannelEvent::Connect).into();

        loop {
            while let Some(cmd) = commands.pop_front() {
                let follow_up = match cmd {
                    ChannelCommand::Open => Some(self.open(&mut conn).await),
                    ChannelCommand::StartHeartbeat => {
                        heartbeat = Some(heartbeat_interval(&self.config));
                        None
                    }
                    ChannelCommand::StopHeartbeat => {
                        heartbeat = None;
                        None
                    }
                    ChannelCommand::ScheduleReconnect(delay) => {
                        info!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = machine.attempts(),
                            "realtime reconnect scheduled"
                        );
                        reconnect_at = Some(Instant::now() + delay);
                        None
                    }
                    ChannelCommand::Close => {
                        reconnect_at = None;
                        if let Some(mut c) = conn.take() {
                            c.close().await;
                        }
                        None
                    }
                    ChannelCommand::GiveUp => {
                        warn!(
                            max_attempts = self.config.max_reconnect_attempts,
                            "realtime reconnect attempts exhausted"
                        );
                        None
                    }
                };
                self.publish(machine.state());
                if let Some(event) = follow_up {
                    commands.extend(machine.handle(event));
                }
            }
            self.publish(machine.state());

            if machine.state() == ChannelState::Disconnected {
                break;
            }

            let wake = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => Wake::Shutdown,
                frame = recv_opt(&mut conn) => Wake::Inbound(frame),
                _ = tick_opt(&mut heartbeat) => Wake::Heartbeat,
                Some(frame) = outbound.recv() => Wake::Outbound(frame),
                _ = sleep_opt(reconnect_at) => Wake::ReconnectDue,
            };

            match wake {
                Wake::Shutdown => commands.extend(machine.handle(ChannelEvent::Disconnect)),
                Wake::Inbound(Some(Ok(frame))) => self.dispatch_frame(&frame),
                Wake::Inbound(Some(Err(e))) => {
                    warn!("realtime receive failed: {}", e);
                    conn = None;
                    commands.extend(machine.handle(ChannelEvent::Closed));
                }
                Wake::Inbound(None) => {
                    info!("realtime connection closed by peer");
                    conn = None;
                    commands.extend(machine.handle(ChannelEvent::Closed));
                }
                Wake::Heartbeat => {
                    let ping = encode(&RealtimeMessage::new(PING_EVENT, Value::Null));
                    if let (Some(c), Ok(ping)) = (conn.as_mut(), ping) {
                        // Only the transport's close event ends a connection.
                        if let Err(e) = c.send(ping).await {
                            debug!("heartbeat send failed: {}", e);
                        }
                    }
                }
                Wake::Outbound(frame) => match conn.as_mut() {
                    Some(c) => {
                        if let Err(e) = c.send(frame).await {
                            warn!("realtime send failed: {}", e);
                        }
                    }
                    None => debug!("dropping outbound frame while disconnected"),
                },
                Wake::ReconnectDue => {
                    reconnect_at = None;
                    commands.extend(machine.handle(ChannelEvent::ReconnectTimerFired));
                }
            }
        }
        debug!("realtime driver stopped");
    }

    async fn open(&self, conn: &mut Option<Box<dyn ChannelConnection>>) -> ChannelEvent {
        let url = self.connect_url().await;
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => ChannelEvent::Disconnect,
            res = self.transport.connect(&url) => match res {
                Ok(c) => {
                    *conn = Some(c);
                    ChannelEvent::Opened
                }
                Err(e) => {
                    warn!("realtime connect failed: {}", e);
                    ChannelEvent::ConnectFailed
                }
            },
        }
    }

    async fn connect_url(&self) -> Url {
        let mut url = self.url.clone();
        if let Some(store) = &self.credentials {
            match store.access_token().await {
                Ok(Some(token)) => {
                    url.query_pairs_mut().append_pair("token", &token);
                }
                Ok(None) => {}
                Err(e) => warn!("realtime connect without token: {}", e),
            }
        }
        url
    }

    fn dispatch_frame(&self, frame: &str) {
        match serde_json::from_str::<RealtimeMessage>(frame) {
            Ok(msg) if msg.event == PONG_EVENT => {}
            Ok(msg) => {
                // No subscribers is fine.
                let _ = self.events_tx.send(msg);
            }
            Err(e) => debug!("ignoring malformed realtime frame: {}", e),
        }
    }

    fn publish(&self, next: ChannelState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            info!(state = ?next, "realtime state changed");
        }
    }
}

fn encode(msg: &RealtimeMessage) -> Result<String> {
    serde_json::to_string(msg)
        .map_err(|e| Error::validation(format!("unserializable realtime frame: {}", e)))
}

fn heartbeat_interval(config: &RealtimeConfig) -> Interval {
    let period = config.heartbeat_interval.max(std::time::Duration::from_millis(1));
    let mut iv = tokio::time::interval_at(Instant::now() + period, period);
    iv.set_missed_tick_behavior(MissedTickBehavior::Delay);
    iv
}

async fn recv_opt(conn: &mut Option<Box<dyn ChannelConnection>>) -> Option<Result<String>> {
    match conn {
        Some(c) => c.recv().await,
        None => std::future::pending().await,
    }
}

async fn tick_opt(iv: &mut Option<Interval>) {
    match iv {
        Some(iv) => {
            iv.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
