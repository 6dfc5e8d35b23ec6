//! Mock network adapters for integration tests.
//!
//! Records every transport interaction so tests can assert on the full
//! history without opening real sockets or touching a radio.

use std::collections::{HashMap, VecDeque};

use kilight::adapters::mdns::DiscoveryPort;
use kilight::adapters::wifi::{LinkError, LinkPort, LinkStatus};
use kilight::net::protocol::{WriteRequest, WriteRequestSink};
use kilight::net::transport::{
    AcceptDecision, ReceiveDisposition, ServerSocketPort, SocketEventSink, SocketHandle,
    TransportError,
};

// ── Scripted transport ────────────────────────────────────────

enum WireEvent {
    Accept(Result<SocketHandle, TransportError>),
    Receive(SocketHandle, Result<Vec<u8>, TransportError>),
}

/// Scripted [`ServerSocketPort`]: tests enqueue wire events, `poll` replays
/// them into the sink, and every send/close/unbind is recorded.
pub struct MockSocketPort {
    queue: VecDeque<WireEvent>,
    pub listening: Option<u16>,
    pub listen_results: VecDeque<Result<(), TransportError>>,
    /// Bytes the server pushed per connection token.
    pub sent: HashMap<u32, Vec<u8>>,
    /// Tokens closed — via `close` or a `Close` disposition.
    pub closed: Vec<u32>,
    /// Tokens the sink rejected at accept.
    pub rejected: Vec<u32>,
    /// Cap on bytes accepted per `send` call (partial-send simulation).
    pub send_limit: Option<usize>,
    pub fail_send: bool,
    pub unbound: usize,
}

impl MockSocketPort {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            listening: None,
            listen_results: VecDeque::new(),
            sent: HashMap::new(),
            closed: Vec::new(),
            rejected: Vec::new(),
            send_limit: None,
            fail_send: false,
            unbound: 0,
        }
    }

    pub fn connect(&mut self, token: u32) {
        self.queue
            .push_back(WireEvent::Accept(Ok(SocketHandle(token))));
    }

    pub fn accept_error(&mut self) {
        self.queue
            .push_back(WireEvent::Accept(Err(TransportError::Io)));
    }

    pub fn receive(&mut self, token: u32, bytes: &[u8]) {
        self.queue
            .push_back(WireEvent::Receive(SocketHandle(token), Ok(bytes.to_vec())));
    }

    pub fn receive_error(&mut self, token: u32) {
        self.queue.push_back(WireEvent::Receive(
            SocketHandle(token),
            Err(TransportError::Io),
        ));
    }

    pub fn eof(&mut self, token: u32) {
        self.queue
            .push_back(WireEvent::Receive(SocketHandle(token), Ok(Vec::new())));
    }

    /// Drain and return everything sent to `token` so far.
    pub fn take_sent(&mut self, token: u32) -> Vec<u8> {
        self.sent.remove(&token).unwrap_or_default()
    }
}

impl ServerSocketPort for MockSocketPort {
    fn listen(&mut self, port: u16) -> Result<(), TransportError> {
        let result = self.listen_results.pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            self.listening = Some(port);
        }
        result
    }

    fn poll(&mut self, sink: &mut dyn SocketEventSink) {
        while let Some(event) = self.queue.pop_front() {
            match event {
                WireEvent::Accept(result) => {
                    let token = result.as_ref().ok().map(|handle| handle.0);
                    if sink.on_accept(result) == AcceptDecision::Reject {
                        if let Some(token) = token {
                            self.rejected.push(token);
                        }
                    }
                }
                WireEvent::Receive(handle, result) => {
                    let borrowed = match &result {
                        Ok(bytes) => Ok(bytes.as_slice()),
                        Err(err) => Err(*err),
                    };
                    if sink.on_receive(handle, borrowed) == ReceiveDisposition::Close {
                        self.closed.push(handle.0);
                    }
                }
            }
        }
    }

    fn send(&mut self, handle: SocketHandle, data: &[u8]) -> Result<usize, TransportError> {
        if self.fail_send {
            return Err(TransportError::Io);
        }
        let accepted = self.send_limit.unwrap_or(data.len()).min(data.len());
        self.sent
            .entry(handle.0)
            .or_default()
            .extend_from_slice(&data[..accepted]);
        Ok(accepted)
    }

    fn close(&mut self, handle: SocketHandle) {
        self.closed.push(handle.0);
    }

    fn unbind(&mut self) {
        self.listening = None;
        self.unbound += 1;
    }
}

// ── Scripted link ─────────────────────────────────────────────

/// Scripted [`LinkPort`]: join results and status polls pop from queues,
/// falling back to `steady_status`.
pub struct MockLink {
    pub ready: bool,
    pub join_results: VecDeque<Result<(), LinkError>>,
    pub statuses: VecDeque<LinkStatus>,
    pub steady_status: LinkStatus,
    pub join_calls: usize,
}

impl MockLink {
    pub fn new() -> Self {
        Self {
            ready: true,
            join_results: VecDeque::new(),
            statuses: VecDeque::new(),
            steady_status: LinkStatus::Up,
            join_calls: 0,
        }
    }
}

impl LinkPort for MockLink {
    fn driver_ready(&self) -> bool {
        self.ready
    }

    fn set_credentials(&mut self, _ssid: &str, _password: &str) -> Result<(), LinkError> {
        Ok(())
    }

    fn begin_join(&mut self) -> Result<(), LinkError> {
        self.join_calls += 1;
        self.join_results.pop_front().unwrap_or(Ok(()))
    }

    fn status(&mut self) -> LinkStatus {
        self.statuses.pop_front().unwrap_or(self.steady_status)
    }

    fn rssi(&self) -> Option<i8> {
        Some(-55)
    }
}

// ── Recording discovery + write sink ──────────────────────────

pub struct MockDiscovery {
    pub announced: Vec<(String, String)>,
    pub withdrawn: usize,
}

impl MockDiscovery {
    pub fn new() -> Self {
        Self {
            announced: Vec::new(),
            withdrawn: 0,
        }
    }
}

impl DiscoveryPort for MockDiscovery {
    fn announce(&mut self, hostname: &str, hardware_id: &str) -> bool {
        self.announced
            .push((hostname.to_string(), hardware_id.to_string()));
        true
    }

    fn withdraw(&mut self) {
        self.withdrawn += 1;
    }
}

pub struct RecordingWrites {
    pub requests: Vec<WriteRequest>,
}

impl RecordingWrites {
    pub fn new() -> Self {
        Self {
            requests: Vec::new(),
        }
    }
}

impl WriteRequestSink for RecordingWrites {
    fn on_write_request(&mut self, request: &WriteRequest) {
        self.requests.push(*request);
    }
}
