//! Managed WebSocket connection to one remote display
//!
//! Owns the socket lifecycle: connect, announce, heartbeat supervision,
//! reconnect with backoff, offline buffering and delivery acks. Background
//! tasks carry the generation counter they were spawned under; `destroy`,
//! `suspend` and disconnect handling bump it, so a stale task can never
//! touch a connection it no longer owns.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use signstream_types::{
    now_ms, ConnectionMetrics, ConnectionQuality, ConnectionState, LatencyHistory,
};

use crate::backoff;
use crate::config::ConnectionConfig;
use crate::error::{RelayError, Result};
use crate::events::{ConnectionEvent, ConnectionEventBus};
use crate::protocol::{AckPayload, ConfigPayload, MessagePayload, PingPayload, WireMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Heartbeat misses that force the socket closed.
const MAX_MISSED_HEARTBEATS: u32 = 3;

#[derive(Default)]
struct Counters {
    messages_sent: u64,
    messages_received: u64,
    bytes_sent: u64,
    bytes_received: u64,
    reconnect_count: u64,
}

#[derive(Default)]
struct ConnTasks {
    sender: Option<JoinHandle<()>>,
    receiver: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

impl ConnTasks {
    fn abort_all(&mut self) {
        for handle in [
            self.sender.take(),
            self.receiver.take(),
            self.heartbeat.take(),
            self.reconnect.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

struct ConnInner {
    config: ConnectionConfig,
    events: ConnectionEventBus,

    state: RwLock<ConnectionState>,
    quality: Mutex<ConnectionQuality>,
    counters: Mutex<Counters>,
    latency: Mutex<LatencyHistory>,
    buffer: Mutex<VecDeque<WireMessage>>,
    pending_acks: Mutex<HashMap<String, oneshot::Sender<()>>>,
    pending_pings: Mutex<HashMap<String, Instant>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    tasks: Mutex<ConnTasks>,

    reconnect_attempts: AtomicU32,
    missed_heartbeats: AtomicU32,
    probes_sent: AtomicU64,
    probes_answered: AtomicU64,
    destroyed: AtomicBool,

    /// Bumped on disconnect, suspend and destroy; stale continuations
    /// compare and bail.
    generation: AtomicU64,
}

/// One managed display connection.
///
/// Cheap to clone; all clones share the same underlying connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ConnInner>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        let inner = ConnInner {
            config,
            events: ConnectionEventBus::new(),
            state: RwLock::new(ConnectionState::Disconnected),
            quality: Mutex::new(ConnectionQuality::Excellent),
            counters: Mutex::new(Counters::default()),
            latency: Mutex::new(LatencyHistory::new()),
            buffer: Mutex::new(VecDeque::new()),
            pending_acks: Mutex::new(HashMap::new()),
            pending_pings: Mutex::new(HashMap::new()),
            outbound: Mutex::new(None),
            tasks: Mutex::new(ConnTasks::default()),
            reconnect_attempts: AtomicU32::new(0),
            missed_heartbeats: AtomicU32::new(0),
            probes_sent: AtomicU64::new(0),
            probes_answered: AtomicU64::new(0),
            destroyed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read().unwrap()
    }

    pub fn quality(&self) -> ConnectionQuality {
        *self.inner.quality.lock().unwrap()
    }

    pub fn url(&self) -> &str {
        &self.inner.config.url
    }

    pub fn buffered_count(&self) -> usize {
        self.inner.buffer.lock().unwrap().len()
    }

    pub fn metrics(&self) -> ConnectionMetrics {
        let counters = self.inner.counters.lock().unwrap();
        let latency = self.inner.latency.lock().unwrap();
        ConnectionMetrics {
            messages_sent: counters.messages_sent,
            messages_received: counters.messages_received,
            bytes_sent: counters.bytes_sent,
            bytes_received: counters.bytes_received,
            reconnect_count: counters.reconnect_count,
            latency: latency.stats(),
            jitter_ms: latency.jitter(),
            packet_loss: ConnInner::packet_loss(&self.inner),
            missed_heartbeats: self.inner.missed_heartbeats.load(Ordering::Relaxed),
            quality: *self.inner.quality.lock().unwrap(),
        }
    }

    /// Open the connection. A no-op when already open or opening.
    pub async fn connect(&self) -> Result<()> {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return Err(RelayError::NotConnected);
        }
        match self.state() {
            ConnectionState::Connected | ConnectionState::Connecting => {
                debug!(url = %self.inner.config.url, "connect ignored, already underway");
                return Ok(());
            }
            _ => {}
        }

        // A caller-driven connect restarts the retry cycle, including after
        // the attempt budget was exhausted.
        self.inner.reconnect_attempts.store(0, Ordering::SeqCst);
        ConnInner::set_state(&self.inner, ConnectionState::Connecting);
        let generation = self.inner.generation.load(Ordering::SeqCst);
        ConnInner::establish(&self.inner, generation).await
    }

    /// Queue a message for delivery.
    ///
    /// While disconnected, messages are held in FIFO order (when buffering
    /// is enabled) and flushed on the next successful connect. A full
    /// buffer rejects the new message; nothing already queued is dropped.
    pub fn send(&self, message: WireMessage) -> Result<()> {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return Err(RelayError::NotConnected);
        }
        if self.state() == ConnectionState::Connected {
            return ConnInner::send_raw(&self.inner, &message);
        }

        if !self.inner.config.buffer_messages {
            return Err(RelayError::NotConnected);
        }
        let mut buffer = self.inner.buffer.lock().unwrap();
        if buffer.len() >= self.inner.config.max_buffer_size {
            warn!(
                capacity = self.inner.config.max_buffer_size,
                "offline buffer full, rejecting message"
            );
            return Err(RelayError::BufferFull);
        }
        buffer.push_back(message);
        Ok(())
    }

    /// Send a message and wait for the display's delivery acknowledgement.
    ///
    /// An ack arriving after the deadline is ignored.
    pub async fn send_with_ack(&self, message: WireMessage, timeout: Duration) -> Result<()> {
        let message = message.with_ack();
        let message_id = message.id.clone();

        let (tx, rx) = oneshot::channel();
        self.inner
            .pending_acks
            .lock()
            .unwrap()
            .insert(message_id.clone(), tx);

        if let Err(e) = self.send(message) {
            self.inner.pending_acks.lock().unwrap().remove(&message_id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(())) => Ok(()),
            _ => {
                self.inner.pending_acks.lock().unwrap().remove(&message_id);
                Err(RelayError::AckTimeout { message_id })
            }
        }
    }

    /// Close the socket and stop reconnecting until [`resume`].
    ///
    /// [`resume`]: ConnectionManager::resume
    pub fn suspend(&self) {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return;
        }
        info!(url = %self.inner.config.url, "suspending connection");
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        ConnInner::teardown_io(&self.inner);
        ConnInner::set_state(&self.inner, ConnectionState::Suspended);
    }

    /// Reopen a suspended connection.
    pub async fn resume(&self) -> Result<()> {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return Err(RelayError::NotConnected);
        }
        if self.state() != ConnectionState::Suspended {
            return Ok(());
        }
        info!(url = %self.inner.config.url, "resuming connection");
        self.inner.reconnect_attempts.store(0, Ordering::SeqCst);
        ConnInner::set_state(&self.inner, ConnectionState::Connecting);
        let generation = self.inner.generation.load(Ordering::SeqCst);
        ConnInner::establish(&self.inner, generation).await
    }

    /// Tear down permanently. Idempotent; the manager refuses all further
    /// operations.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(url = %self.inner.config.url, "destroying connection");
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        ConnInner::teardown_io(&self.inner);
        self.inner.buffer.lock().unwrap().clear();
        ConnInner::set_state(&self.inner, ConnectionState::Disconnected);
    }
}

impl ConnInner {
    fn set_state(inner: &Arc<ConnInner>, to: ConnectionState) {
        let mut state = inner.state.write().unwrap();
        let from = *state;
        if from == to {
            return;
        }
        *state = to;
        drop(state);
        debug!(%from, %to, url = %inner.config.url, "connection state change");
        inner.events.emit(ConnectionEvent::StateChange { from, to });
    }

    /// Abort background tasks, drop the socket channel and fail pending
    /// waiters. Callers have already bumped the generation.
    fn teardown_io(inner: &Arc<ConnInner>) {
        inner.tasks.lock().unwrap().abort_all();
        *inner.outbound.lock().unwrap() = None;
        inner.pending_acks.lock().unwrap().clear();
        inner.pending_pings.lock().unwrap().clear();
        inner.missed_heartbeats.store(0, Ordering::SeqCst);
    }

    fn packet_loss(inner: &Arc<ConnInner>) -> f64 {
        let sent = inner.probes_sent.load(Ordering::Relaxed);
        if sent == 0 {
            return 0.0;
        }
        let answered = inner.probes_answered.load(Ordering::Relaxed);
        1.0 - (answered as f64 / sent as f64)
    }

    /// Dial the endpoint and bring the connection fully up: split tasks,
    /// attempt-counter reset, config announcement, heartbeats, buffer flush.
    async fn establish(inner: &Arc<ConnInner>, generation: u64) -> Result<()> {
        info!(url = %inner.config.url, "connecting");
        let ws = match connect_async(&inner.config.url).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                let message = format!("connect to {} failed: {}", inner.config.url, e);
                warn!("{}", message);
                inner.events.emit(ConnectionEvent::Error {
                    message: message.clone(),
                });
                if inner.generation.load(Ordering::SeqCst) == generation {
                    ConnInner::schedule_reconnect(inner, generation);
                }
                return Err(RelayError::Connect(message));
            }
        };
        if inner.generation.load(Ordering::SeqCst) != generation {
            return Err(RelayError::NotConnected);
        }

        let (write, read) = ws.split();
        let (tx, rx) = mpsc::unbounded_channel();
        *inner.outbound.lock().unwrap() = Some(tx);

        {
            let mut tasks = inner.tasks.lock().unwrap();
            tasks.sender = Some(tokio::spawn(ConnInner::sender_task(write, rx)));
            tasks.receiver = Some(tokio::spawn(ConnInner::receiver_task(
                Arc::clone(inner),
                generation,
                read,
            )));
            tasks.heartbeat = Some(tokio::spawn(ConnInner::heartbeat_task(
                Arc::clone(inner),
                generation,
            )));
        }

        inner.reconnect_attempts.store(0, Ordering::SeqCst);
        ConnInner::set_state(inner, ConnectionState::Connected);
        inner.events.emit(ConnectionEvent::Connected);

        let announcement = WireMessage::new(MessagePayload::Config(ConfigPayload {
            client_id: inner.config.client_id.clone(),
            client_type: inner.config.client_type.clone(),
            capabilities: inner.config.capabilities.clone(),
        }));
        if let Err(e) = ConnInner::send_raw(inner, &announcement) {
            warn!("config announcement failed: {}", e);
        }

        ConnInner::flush_buffer(inner);
        Ok(())
    }

    /// Replay buffered messages in arrival order.
    fn flush_buffer(inner: &Arc<ConnInner>) {
        let queued: Vec<WireMessage> = inner.buffer.lock().unwrap().drain(..).collect();
        if queued.is_empty() {
            return;
        }
        info!(count = queued.len(), "flushing offline buffer");
        for message in queued {
            if let Err(e) = ConnInner::send_raw(inner, &message) {
                warn!("buffered message dropped during flush: {}", e);
            }
        }
    }

    /// Serialize and hand a frame to the sender task.
    fn send_raw(inner: &Arc<ConnInner>, message: &WireMessage) -> Result<()> {
        let json = message.to_json()?;
        let outbound = inner.outbound.lock().unwrap();
        let tx = outbound.as_ref().ok_or(RelayError::NotConnected)?;
        let len = json.len() as u64;
        tx.send(Message::Text(json))
            .map_err(|_| RelayError::NotConnected)?;
        let mut counters = inner.counters.lock().unwrap();
        counters.messages_sent += 1;
        counters.bytes_sent += len;
        Ok(())
    }

    async fn sender_task(
        mut write: SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = write.send(msg).await {
                error!("websocket send failed: {}", e);
                break;
            }
        }
        debug!("sender task finished");
    }

    async fn receiver_task(inner: Arc<ConnInner>, generation: u64, mut read: SplitStream<WsStream>) {
        while let Some(result) = read.next().await {
            if inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            match result {
                Ok(Message::Text(text)) => ConnInner::handle_frame(&inner, &text),
                Ok(Message::Close(_)) => {
                    ConnInner::handle_disconnect(&inner, generation, "closed by remote");
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    ConnInner::handle_disconnect(&inner, generation, &format!("socket error: {}", e));
                    return;
                }
            }
        }
        ConnInner::handle_disconnect(&inner, generation, "stream ended");
    }

    fn handle_frame(inner: &Arc<ConnInner>, text: &str) {
        {
            let mut counters = inner.counters.lock().unwrap();
            counters.messages_received += 1;
            counters.bytes_received += text.len() as u64;
        }

        let message = match WireMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("discarding malformed frame: {}", e);
                return;
            }
        };

        if message.needs_ack() {
            let ack = WireMessage::new(MessagePayload::Ack(AckPayload {
                message_id: message.id.clone(),
            }));
            if let Err(e) = ConnInner::send_raw(inner, &ack) {
                warn!("ack send failed: {}", e);
            }
        }

        match message.payload {
            MessagePayload::Ack(ref ack) => {
                match inner.pending_acks.lock().unwrap().remove(&ack.message_id) {
                    Some(waiter) => {
                        let _ = waiter.send(());
                    }
                    None => debug!(id = %ack.message_id, "late ack ignored"),
                }
            }
            MessagePayload::Pong(ref pong) => {
                let sent_at = inner.pending_pings.lock().unwrap().remove(&pong.request_id);
                match sent_at {
                    Some(sent_at) => {
                        inner.probes_answered.fetch_add(1, Ordering::Relaxed);
                        inner.missed_heartbeats.store(0, Ordering::SeqCst);
                        let rtt_ms = sent_at.elapsed().as_secs_f64() * 1000.0;
                        inner.latency.lock().unwrap().record(rtt_ms);
                        ConnInner::update_quality(inner);
                    }
                    None => debug!(id = %pong.request_id, "unsolicited pong ignored"),
                }
            }
            MessagePayload::Ping(ref ping) => {
                let pong = WireMessage::new(MessagePayload::Pong(PingPayload {
                    request_id: ping.request_id.clone(),
                    timestamp: ping.timestamp,
                }));
                if let Err(e) = ConnInner::send_raw(inner, &pong) {
                    warn!("pong send failed: {}", e);
                }
            }
            MessagePayload::Heartbeat(ref beat) => {
                // One-way estimate; clock skew can push it negative
                let one_way_ms = (now_ms() - beat.timestamp).max(0) as f64;
                inner.latency.lock().unwrap().record(one_way_ms);
                ConnInner::update_quality(inner);
            }
            _ => inner.events.emit(ConnectionEvent::Message(message)),
        }
    }

    /// Periodic liveness probe on a fixed `heartbeat_interval` cadence.
    ///
    /// Each tick first expires probes that went unanswered for longer than
    /// `heartbeat_timeout`, then sends the next ping. Expiry rides the
    /// interval tick rather than its own sleep, so the cadence stays at the
    /// interval and a dead connection is caught after
    /// [`MAX_MISSED_HEARTBEATS`] intervals, not intervals plus timeouts.
    async fn heartbeat_task(inner: Arc<ConnInner>, generation: u64) {
        let timeout = inner.config.heartbeat_timeout();
        loop {
            tokio::time::sleep(inner.config.heartbeat_interval()).await;
            if inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }

            let expired: u32 = {
                let mut pending = inner.pending_pings.lock().unwrap();
                let overdue: Vec<String> = pending
                    .iter()
                    .filter(|(_, sent_at)| sent_at.elapsed() >= timeout)
                    .map(|(id, _)| id.clone())
                    .collect();
                for id in &overdue {
                    pending.remove(id);
                }
                overdue.len() as u32
            };
            if expired > 0 {
                let missed = inner.missed_heartbeats.fetch_add(expired, Ordering::SeqCst) + expired;
                warn!(missed, url = %inner.config.url, "heartbeat unanswered");
                ConnInner::update_quality(&inner);
                if missed >= MAX_MISSED_HEARTBEATS {
                    ConnInner::handle_disconnect(&inner, generation, "heartbeat timeout");
                    return;
                }
            }

            let request_id = uuid::Uuid::new_v4().to_string();
            inner
                .pending_pings
                .lock()
                .unwrap()
                .insert(request_id.clone(), Instant::now());
            inner.probes_sent.fetch_add(1, Ordering::Relaxed);

            let ping = WireMessage::new(MessagePayload::Ping(PingPayload {
                request_id,
                timestamp: now_ms(),
            }));
            if ConnInner::send_raw(&inner, &ping).is_err() {
                return;
            }
        }
    }

    fn update_quality(inner: &Arc<ConnInner>) {
        let (average_ms, jitter_ms) = {
            let latency = inner.latency.lock().unwrap();
            (latency.average(), latency.jitter())
        };
        let next = ConnectionQuality::classify(
            average_ms,
            jitter_ms,
            ConnInner::packet_loss(inner),
            inner.missed_heartbeats.load(Ordering::SeqCst),
        );
        let mut quality = inner.quality.lock().unwrap();
        if *quality != next {
            let from = *quality;
            *quality = next;
            drop(quality);
            info!(%from, to = %next, url = %inner.config.url, "connection quality change");
            inner
                .events
                .emit(ConnectionEvent::QualityChange { from, to: next });
        }
    }

    /// Unexpected disconnect. The generation CAS makes this first-caller-
    /// wins when the receiver and the heartbeat both observe the failure.
    fn handle_disconnect(inner: &Arc<ConnInner>, generation: u64, reason: &str) {
        if inner
            .generation
            .compare_exchange(generation, generation + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        warn!(url = %inner.config.url, reason, "disconnected");
        ConnInner::teardown_io(inner);
        ConnInner::set_state(inner, ConnectionState::Disconnected);
        inner.events.emit(ConnectionEvent::Disconnected {
            reason: reason.to_string(),
        });

        if inner.config.reconnect && !inner.destroyed.load(Ordering::SeqCst) {
            ConnInner::schedule_reconnect(inner, generation + 1);
        }
    }

    /// Arm the next reconnect attempt, or give up terminally once the
    /// attempt budget is spent.
    fn schedule_reconnect(inner: &Arc<ConnInner>, generation: u64) {
        if !inner.config.reconnect {
            ConnInner::set_state(inner, ConnectionState::Disconnected);
            return;
        }

        let attempt = inner.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt > inner.config.max_reconnect_attempts {
            error!(
                attempts = inner.config.max_reconnect_attempts,
                url = %inner.config.url,
                "reconnect attempts exhausted"
            );
            ConnInner::set_state(inner, ConnectionState::Error);
            inner.events.emit(ConnectionEvent::Error {
                message: format!(
                    "reconnect attempts exhausted after {}",
                    inner.config.max_reconnect_attempts
                ),
            });
            return;
        }

        ConnInner::set_state(inner, ConnectionState::Reconnecting);
        inner.counters.lock().unwrap().reconnect_count += 1;
        let delay = backoff::reconnect_delay(
            attempt,
            inner.config.reconnect_base_delay_ms,
            inner.config.max_reconnect_delay_ms,
        );
        info!(attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");

        let worker = Arc::clone(inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if worker.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            ConnInner::set_state(&worker, ConnectionState::Connecting);
            let _ = ConnInner::establish(&worker, generation).await;
        });

        let mut tasks = inner.tasks.lock().unwrap();
        if let Some(old) = tasks.reconnect.replace(handle) {
            old.abort();
        }
    }
}
