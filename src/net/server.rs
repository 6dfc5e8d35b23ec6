//! Connection lifecycle state machine for the control server.
//!
//! ```text
//!  INVALID ──[radio ready]──▶ DISCONNECTED ──[join initiated]──▶ CONNECTING
//!                                   ▲  ▲                            │
//!                       [wait over] │  └────[initiation failed]──┐  │[link up]
//!                                   │                            ▼  ▼
//!                               WAITING ◀──[association lost]── CONNECTED
//!                                   ▲                               │[bound]
//!                                   │                               ▼
//!                                   │        PRE-IDLE ──[announced]─┘──▶ IDLE
//!                                   │                                     │▲
//!                  [verify failed]  │    ┌──[data pending]─▶ PROCESS ─────┘│
//!                                   └── VERIFY ◀──[cadence elapsed]────────┘
//! ```
//!
//! `work` runs exactly one state handler per call and never sleeps; every
//! would-block operation is initiated and its completion observed on a later
//! tick through link-status polls, session flags, or an armed
//! [`DeferredWait`].  The cooperative loop is the only writer of the state;
//! transport callbacks reach the server exclusively through its
//! [`SocketEventSink`] impl, which touches nothing but the session pool.

use log::{debug, info, warn};

use crate::adapters::device_id::DeviceIdentity;
use crate::adapters::mdns::DiscoveryPort;
use crate::adapters::wifi::{LinkPort, LinkStatus};
use crate::net::protocol::{self, Reply, Request, SystemInfo, WriteRequestSink};
use crate::net::session::SessionPool;
use crate::net::timer::{DeferredWait, Millis};
use crate::net::transport::{
    AcceptDecision, ReceiveDisposition, ServerSocketPort, SocketEventSink, SocketHandle,
    TransportError,
};
use crate::net::{BUFFER_SIZE, VERIFY_CONNECTION_EVERY_MS, WIFI_CONNECT_RETRY_MS};
use crate::state::{SharedStateData, StateData};

/// Where a deferred wait resumes.  Carried inside [`ServerState::Waiting`]
/// so an undefined resume target cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeState {
    Disconnected,
}

impl From<ResumeState> for ServerState {
    fn from(resume: ResumeState) -> Self {
        match resume {
            ResumeState::Disconnected => ServerState::Disconnected,
        }
    }
}

/// Lifecycle state, written only by the cooperative loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Before the radio driver reports ready.
    Invalid,
    /// No association; a join attempt may be initiated.
    Disconnected,
    /// Join initiated, outcome pending.
    Connecting,
    /// Associated; the listener is not bound yet.
    Connected,
    /// Listening; discovery identifiers not registered yet.
    PreIdle,
    /// Steady state: waiting for client data or the verify cadence.
    Idle,
    /// Draining one session's pending inbound data.
    ProcessClientData,
    /// Association watchdog check.
    VerifyConnected,
    /// Timed pause; resumes into the carried target once the wait expires.
    Waiting { resume: ResumeState },
}

/// The network control server: session pool, timers, identity, and the
/// lifecycle state machine stepped by the outer cooperative loop.
pub struct ControlServer {
    state: ServerState,
    pool: SessionPool,
    retry_wait: DeferredWait,
    verify_wait: DeferredWait,
    identity: DeviceIdentity,
    port: u16,
    state_data: &'static SharedStateData,
    scratch: [u8; BUFFER_SIZE],
}

impl ControlServer {
    pub fn new(identity: DeviceIdentity, port: u16, state_data: &'static SharedStateData) -> Self {
        Self {
            state: ServerState::Invalid,
            pool: SessionPool::new(),
            retry_wait: DeferredWait::new(),
            verify_wait: DeferredWait::new(),
            identity,
            port,
            state_data,
            scratch: [0; BUFFER_SIZE],
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Read-only view of the session pool.
    pub fn sessions(&self) -> &SessionPool {
        &self.pool
    }

    /// Snapshot of the shared device state.
    pub fn state_data(&self) -> StateData {
        self.state_data.snapshot()
    }

    /// Scoped mutable access to the shared device state for other firmware
    /// components; runs inside the transport-stack critical section.
    pub fn update_state_data(&self, update: impl FnOnce(&mut StateData)) {
        self.state_data.update(update);
    }

    /// Pump transport events into the session pool.  Called by the outer
    /// loop every tick, independent of [`Self::has_work`] — it stands in
    /// for the stack's asynchronous callbacks.
    pub fn poll_transport(&mut self, io: &mut dyn ServerSocketPort) {
        io.poll(self);
    }

    /// Whether [`Self::work`] has anything to do right now.
    ///
    /// False only mid-wait and in a fully quiescent `Idle`: no inbound data,
    /// no deferred closes, no unflushed replies, verify cadence not due.
    pub fn has_work(&self, now: Millis) -> bool {
        match self.state {
            ServerState::Idle => {
                self.pool.any_data_pending()
                    || self.pool.any_close_pending()
                    || self.pool.any_send_pending()
                    || self.verify_wait.expired(now)
            }
            ServerState::Waiting { .. } => self.retry_wait.expired(now),
            _ => true,
        }
    }

    /// Execute exactly one non-blocking state handler.
    pub fn work(
        &mut self,
        now: Millis,
        io: &mut dyn ServerSocketPort,
        link: &mut dyn LinkPort,
        discovery: &mut dyn DiscoveryPort,
        writes: &mut dyn WriteRequestSink,
    ) {
        match self.state {
            ServerState::Invalid => self.invalid_state(link),
            ServerState::Disconnected => self.disconnected_state(now, link),
            ServerState::Connecting => self.connecting_state(now, link),
            ServerState::Connected => self.connected_state(now, io),
            ServerState::PreIdle => self.pre_idle_state(now, discovery),
            ServerState::Idle => self.idle_state(now, io),
            ServerState::ProcessClientData => self.process_client_data_state(io, writes),
            ServerState::VerifyConnected => self.verify_connected_state(now, io, link, discovery),
            ServerState::Waiting { resume } => self.waiting_state(now, resume),
        }
    }

    // ── State handlers ────────────────────────────────────────

    fn invalid_state(&mut self, link: &mut dyn LinkPort) {
        if link.driver_ready() {
            info!("radio driver ready");
            self.state = ServerState::Disconnected;
        }
    }

    fn disconnected_state(&mut self, now: Millis, link: &mut dyn LinkPort) {
        match link.begin_join() {
            Ok(()) => {
                self.state = ServerState::Connecting;
            }
            Err(err) => {
                warn!("join initiation failed ({err}), retrying in {WIFI_CONNECT_RETRY_MS}ms");
                self.begin_retry_wait(now);
            }
        }
    }

    fn connecting_state(&mut self, now: Millis, link: &mut dyn LinkPort) {
        match link.status() {
            LinkStatus::Up => {
                info!("link up (rssi {:?})", link.rssi());
                self.state = ServerState::Connected;
            }
            LinkStatus::Joining => {}
            LinkStatus::Down | LinkStatus::Failed => {
                warn!("association failed, retrying in {WIFI_CONNECT_RETRY_MS}ms");
                self.begin_retry_wait(now);
            }
        }
    }

    fn connected_state(&mut self, now: Millis, io: &mut dyn ServerSocketPort) {
        match io.listen(self.port) {
            Ok(()) => {
                self.state = ServerState::PreIdle;
            }
            Err(err) => {
                warn!("listener bind failed ({err}), retrying in {WIFI_CONNECT_RETRY_MS}ms");
                self.begin_retry_wait(now);
            }
        }
    }

    fn pre_idle_state(&mut self, now: Millis, discovery: &mut dyn DiscoveryPort) {
        if !discovery.announce(
            self.identity.hostname.as_str(),
            self.identity.id_string.as_str(),
        ) {
            warn!("discovery announce failed, continuing without it");
        }
        self.verify_wait.arm(now, VERIFY_CONNECTION_EVERY_MS);
        info!("control server ready as {}", self.identity.hostname);
        self.state = ServerState::Idle;
    }

    fn idle_state(&mut self, now: Millis, io: &mut dyn ServerSocketPort) {
        self.pool.reap_deferred(io);
        self.flush_pending(io);

        if self.pool.any_data_pending() {
            self.state = ServerState::ProcessClientData;
        } else if self.verify_wait.expired(now) {
            self.state = ServerState::VerifyConnected;
        }
    }

    fn process_client_data_state(
        &mut self,
        io: &mut dyn ServerSocketPort,
        writes: &mut dyn WriteRequestSink,
    ) {
        // Bounded work: one pending session per tick.  Idle re-enters here
        // while more remain.
        if let Some(idx) = self.pool.first_data_pending() {
            self.process_client_data(idx, io, writes);
        }
        self.state = ServerState::Idle;
    }

    fn verify_connected_state(
        &mut self,
        now: Millis,
        io: &mut dyn ServerSocketPort,
        link: &mut dyn LinkPort,
        discovery: &mut dyn DiscoveryPort,
    ) {
        if link.status() == LinkStatus::Up {
            self.verify_wait.arm(now, VERIFY_CONNECTION_EVERY_MS);
            self.state = ServerState::Idle;
        } else {
            warn!(
                "association lost, closing {} active sessions",
                self.pool.active_count()
            );
            self.pool.close_all(io);
            io.unbind();
            discovery.withdraw();
            self.begin_retry_wait(now);
        }
    }

    fn waiting_state(&mut self, now: Millis, resume: ResumeState) {
        if self.retry_wait.expired(now) {
            debug!("wait complete, resuming {resume:?}");
            self.state = resume.into();
        }
    }

    // ── Helpers ───────────────────────────────────────────────

    fn begin_retry_wait(&mut self, now: Millis) {
        self.retry_wait.arm(now, WIFI_CONNECT_RETRY_MS);
        self.state = ServerState::Waiting {
            resume: ResumeState::Disconnected,
        };
    }

    fn flush_pending(&mut self, io: &mut dyn ServerSocketPort) {
        for idx in 0..crate::net::MAX_CONNECTIONS {
            self.pool.flush(idx, io);
        }
    }

    /// Decode and handle exactly one request from a session's fill, then
    /// flush the queued reply.  A malformed fill costs the client its
    /// session; the pool invariants do the cleanup.
    fn process_client_data(
        &mut self,
        idx: usize,
        io: &mut dyn ServerSocketPort,
        writes: &mut dyn WriteRequestSink,
    ) {
        match protocol::decode_request(self.pool.slot(idx).received()) {
            Ok(Request::Write(request)) => {
                debug!("session {idx}: write request");
                writes.on_write_request(&request);
                self.pool.slot_mut(idx).finish_receive();
                let reply = Reply::State(self.state_data.snapshot());
                self.queue_reply_frame(idx, &reply);
                self.pool.flush(idx, io);
            }
            Err(err) => {
                warn!("session {idx}: bad request ({err}), closing");
                self.pool.close_session(idx, io);
            }
        }
    }

    fn queue_reply_frame(&mut self, idx: usize, reply: &Reply) {
        match protocol::encode_reply(reply, &mut self.scratch) {
            Ok(len) => {
                if !self.pool.slot_mut(idx).queue_reply(&self.scratch[..len]) {
                    warn!("session {idx}: reply dropped (send buffer full)");
                }
            }
            Err(err) => warn!("session {idx}: reply encode failed ({err})"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Transport event sink
// ───────────────────────────────────────────────────────────────

impl SocketEventSink for ControlServer {
    fn on_accept(&mut self, result: Result<SocketHandle, TransportError>) -> AcceptDecision {
        let handle = match result {
            Ok(handle) => handle,
            Err(err) => {
                warn!("accept failed ({err})");
                return AcceptDecision::Reject;
            }
        };
        match self.pool.acquire(handle) {
            Some(idx) => {
                info!(
                    "client connected (slot {idx}, {} active)",
                    self.pool.active_count()
                );
                // Greet every new session with the device identity; flushed
                // on the next idle tick.
                let greeting = Reply::SystemInfo(SystemInfo::current(self.identity.hardware_id));
                self.queue_reply_frame(idx, &greeting);
                AcceptDecision::Accept
            }
            None => {
                warn!("session pool full, rejecting connection");
                AcceptDecision::Reject
            }
        }
    }

    fn on_receive(
        &mut self,
        handle: SocketHandle,
        result: Result<&[u8], TransportError>,
    ) -> ReceiveDisposition {
        let Some(idx) = self.pool.index_of(handle) else {
            debug!("receive for unknown handle {}", handle.0);
            return ReceiveDisposition::Close;
        };
        match result {
            Err(err) => {
                debug!("session {idx}: receive error ({err}), close deferred");
                self.pool.slot(idx).mark_close_pending();
                ReceiveDisposition::Continue
            }
            Ok([]) => {
                debug!("session {idx}: peer closed, close deferred");
                self.pool.slot(idx).mark_close_pending();
                ReceiveDisposition::Continue
            }
            Ok(bytes) => {
                if self.pool.slot(idx).is_close_pending() {
                    return ReceiveDisposition::Continue;
                }
                if self.pool.slot_mut(idx).append(bytes).is_err() {
                    // Overflow is a framing error: nothing is salvaged and
                    // the binding closes the socket in stack context.
                    warn!("session {idx}: receive overflow, closing");
                    self.pool.discard(idx);
                    return ReceiveDisposition::Close;
                }
                ReceiveDisposition::Continue
            }
        }
    }
}
