//! Lifecycle scenarios for the control server, driven tick-by-tick against
//! the scripted mocks in [`crate::mock_net`].

use kilight::adapters::device_id::DeviceIdentity;
use kilight::net::protocol::{self, Reply, Request, WriteRequest};
use kilight::net::{
    ControlServer, MAX_CONNECTIONS, ResumeState, ServerState, VERIFY_CONNECTION_EVERY_MS,
    WIFI_CONNECT_RETRY_MS,
};
use kilight::adapters::wifi::{LinkError, LinkStatus};
use kilight::state::{Color, LightState, SharedStateData, StateData};

use crate::mock_net::{MockDiscovery, MockLink, MockSocketPort, RecordingWrites};

const PORT: u16 = 4617;

fn test_mac() -> [u8; 6] {
    [0x84, 0x1F, 0xE8, 0x2B, 0x90, 0x5D]
}

fn sample_light() -> LightState {
    LightState {
        on: true,
        brightness: 200,
        color: Color {
            red: 255,
            green: 32,
            blue: 0,
            cold_white: 0,
            warm_white: 30,
        },
    }
}

fn write_frame(light: LightState) -> Vec<u8> {
    let mut buf = [0u8; 128];
    let n = protocol::encode_request(&Request::Write(WriteRequest { light }), &mut buf).unwrap();
    buf[..n].to_vec()
}

struct Harness {
    server: ControlServer,
    io: MockSocketPort,
    link: MockLink,
    discovery: MockDiscovery,
    writes: RecordingWrites,
    now: u64,
}

impl Harness {
    fn new() -> Self {
        let state: &'static SharedStateData =
            Box::leak(Box::new(SharedStateData::new(StateData::INIT)));
        Self {
            server: ControlServer::new(DeviceIdentity::from_mac(&test_mac()), PORT, state),
            io: MockSocketPort::new(),
            link: MockLink::new(),
            discovery: MockDiscovery::new(),
            writes: RecordingWrites::new(),
            now: 10,
        }
    }

    /// One cooperative tick: pump transport events, then step the state
    /// machine if it reports work.
    fn step(&mut self) {
        self.server.poll_transport(&mut self.io);
        if self.server.has_work(self.now) {
            self.server.work(
                self.now,
                &mut self.io,
                &mut self.link,
                &mut self.discovery,
                &mut self.writes,
            );
        }
    }

    fn advance(&mut self, ms: u64) {
        self.now += ms;
    }

    fn bring_to_idle(&mut self) {
        for _ in 0..8 {
            if self.server.state() == ServerState::Idle {
                return;
            }
            self.step();
        }
        assert_eq!(
            self.server.state(),
            ServerState::Idle,
            "startup did not reach Idle"
        );
    }
}

// ── Startup ───────────────────────────────────────────────────

#[test]
fn startup_reaches_idle_and_announces_identity() {
    let mut h = Harness::new();
    h.bring_to_idle();

    assert_eq!(h.io.listening, Some(PORT));
    assert_eq!(h.link.join_calls, 1);
    assert_eq!(h.discovery.announced.len(), 1);
    let (hostname, hwid) = &h.discovery.announced[0];
    assert_eq!(hostname, "KiLightMono_0000841FE82B905D");
    assert_eq!(hwid, "0000841FE82B905D");
}

#[test]
fn has_work_is_false_in_quiescent_idle() {
    let mut h = Harness::new();
    h.bring_to_idle();

    assert!(!h.server.has_work(h.now));
    assert!(!h.server.has_work(h.now + u64::from(VERIFY_CONNECTION_EVERY_MS) - 1));
    assert!(h.server.has_work(h.now + u64::from(VERIFY_CONNECTION_EVERY_MS)));
}

#[test]
fn verify_cadence_rearms_after_each_check() {
    let mut h = Harness::new();
    h.bring_to_idle();

    h.advance(u64::from(VERIFY_CONNECTION_EVERY_MS));
    h.step();
    assert_eq!(h.server.state(), ServerState::VerifyConnected);
    h.step();
    assert_eq!(h.server.state(), ServerState::Idle);

    assert!(!h.server.has_work(h.now + u64::from(VERIFY_CONNECTION_EVERY_MS) - 1));
    assert!(h.server.has_work(h.now + u64::from(VERIFY_CONNECTION_EVERY_MS)));
}

// ── Retry backoff ─────────────────────────────────────────────

#[test]
fn failed_join_initiation_backs_off_for_retry_interval() {
    let mut h = Harness::new();
    h.link.join_results.push_back(Err(LinkError::JoinFailed));

    h.step(); // Invalid -> Disconnected
    h.step(); // Disconnected -> Waiting (initiation failed)
    assert_eq!(
        h.server.state(),
        ServerState::Waiting {
            resume: ResumeState::Disconnected
        }
    );
    assert_eq!(h.link.join_calls, 1);

    // Not a single new attempt before the backoff elapses.
    h.advance(u64::from(WIFI_CONNECT_RETRY_MS) - 1);
    h.step();
    assert_eq!(h.link.join_calls, 1);

    h.advance(1);
    h.step(); // Waiting -> Disconnected
    assert_eq!(h.server.state(), ServerState::Disconnected);
    h.step(); // Disconnected -> Connecting (second attempt)
    assert_eq!(h.link.join_calls, 2);
    assert_eq!(h.server.state(), ServerState::Connecting);
}

#[test]
fn failed_association_takes_retry_path() {
    let mut h = Harness::new();
    h.link.statuses.push_back(LinkStatus::Joining);
    h.link.statuses.push_back(LinkStatus::Failed);

    h.step(); // Invalid -> Disconnected
    h.step(); // Disconnected -> Connecting
    h.step(); // Connecting (still joining)
    assert_eq!(h.server.state(), ServerState::Connecting);
    h.step(); // Connecting -> Waiting (failed)
    assert_eq!(
        h.server.state(),
        ServerState::Waiting {
            resume: ResumeState::Disconnected
        }
    );
}

#[test]
fn listener_bind_failure_takes_retry_path() {
    let mut h = Harness::new();
    h.io.listen_results
        .push_back(Err(kilight::net::transport::TransportError::Io));

    h.step(); // Invalid -> Disconnected
    h.step(); // Disconnected -> Connecting
    h.step(); // Connecting -> Connected
    h.step(); // Connected: bind fails -> Waiting
    assert_eq!(
        h.server.state(),
        ServerState::Waiting {
            resume: ResumeState::Disconnected
        }
    );
    assert_eq!(h.io.listening, None);

    h.advance(u64::from(WIFI_CONNECT_RETRY_MS));
    h.bring_to_idle();
    assert_eq!(h.io.listening, Some(PORT));
}

// ── Sessions ──────────────────────────────────────────────────

#[test]
fn accepted_client_is_greeted_with_system_info() {
    let mut h = Harness::new();
    h.bring_to_idle();

    h.io.connect(1);
    h.step();
    assert_eq!(h.server.sessions().active_count(), 1);

    let greeting = h.io.take_sent(1);
    match protocol::decode_reply(&greeting).unwrap() {
        Reply::SystemInfo(info) => {
            assert_eq!(info.hardware_id, 0x0000_841F_E82B_905D);
            assert_eq!(info.model.as_str(), protocol::MODEL_NAME);
        }
        other => panic!("expected system info greeting, got {other:?}"),
    }
}

#[test]
fn write_request_round_trip() {
    let mut h = Harness::new();
    h.bring_to_idle();

    h.io.connect(1);
    h.step();
    let _greeting = h.io.take_sent(1);

    h.io.receive(1, &write_frame(sample_light()));
    h.step(); // append + Idle -> ProcessClientData
    h.step(); // decode, callback, reply, flush

    // Callback fired exactly once with the decoded request.
    assert_eq!(h.writes.requests.len(), 1);
    assert_eq!(h.writes.requests[0].light, sample_light());

    // A state reply went out, and the session is still open with its
    // receive side drained.
    match protocol::decode_reply(&h.io.take_sent(1)).unwrap() {
        Reply::State(state) => assert_eq!(state, StateData::INIT),
        other => panic!("expected state reply, got {other:?}"),
    }
    assert_eq!(h.server.sessions().active_count(), 1);
    assert!(!h.server.sessions().slot(0).has_data_pending());
    assert!(h.server.sessions().slot(0).received().is_empty());
}

#[test]
fn one_pending_session_is_drained_per_tick() {
    let mut h = Harness::new();
    h.bring_to_idle();
    h.io.connect(1);
    h.io.connect(2);
    h.step();

    h.io.receive(1, &write_frame(sample_light()));
    h.io.receive(2, &write_frame(sample_light()));
    h.step(); // both appended; Idle -> ProcessClientData
    h.step(); // first session drained
    assert_eq!(h.writes.requests.len(), 1);
    h.step(); // Idle -> ProcessClientData (one remains)
    h.step(); // second session drained
    assert_eq!(h.writes.requests.len(), 2);
}

#[test]
fn fifth_connection_is_rejected_until_a_slot_frees() {
    let mut h = Harness::new();
    h.bring_to_idle();

    for token in 1..=MAX_CONNECTIONS as u32 {
        h.io.connect(token);
    }
    h.step();
    assert_eq!(h.server.sessions().active_count(), MAX_CONNECTIONS);

    // Hard cap: the 5th accept is rejected, existing sessions stay open.
    h.io.connect(5);
    h.step();
    assert_eq!(h.io.rejected, vec![5]);
    assert_eq!(h.server.sessions().active_count(), MAX_CONNECTIONS);

    // Closing one frees a slot for the next accept.
    h.io.eof(2);
    h.step();
    assert_eq!(h.server.sessions().active_count(), MAX_CONNECTIONS - 1);

    h.io.connect(6);
    h.step();
    assert_eq!(h.server.sessions().active_count(), MAX_CONNECTIONS);
    assert_eq!(h.io.rejected, vec![5]);
}

#[test]
fn peer_eof_close_is_deferred_to_the_next_tick() {
    let mut h = Harness::new();
    h.bring_to_idle();
    h.io.connect(1);
    h.step();

    h.io.eof(1);
    // Callback context only: the session must survive the poll itself.
    h.server.poll_transport(&mut h.io);
    assert_eq!(h.server.sessions().active_count(), 1);
    assert!(h.server.sessions().slot(0).is_close_pending());
    assert!(h.server.has_work(h.now));

    h.step();
    assert_eq!(h.server.sessions().active_count(), 0);
    assert!(h.io.closed.contains(&1));
}

#[test]
fn receive_error_closes_only_that_session() {
    let mut h = Harness::new();
    h.bring_to_idle();
    h.io.connect(1);
    h.io.connect(2);
    h.step();

    h.io.receive_error(1);
    h.step();
    assert_eq!(h.server.sessions().active_count(), 1);
    assert!(h.io.closed.contains(&1));
    assert!(!h.io.closed.contains(&2));
}

#[test]
fn accept_error_is_rejected_without_side_effects() {
    let mut h = Harness::new();
    h.bring_to_idle();
    h.io.accept_error();
    h.step();
    assert_eq!(h.server.sessions().active_count(), 0);
    assert_eq!(h.server.state(), ServerState::Idle);
}

// ── Protocol errors ───────────────────────────────────────────

#[test]
fn malformed_request_closes_the_session() {
    let mut h = Harness::new();
    h.bring_to_idle();
    h.io.connect(1);
    h.step();

    // Valid header, garbage payload.
    h.io.receive(1, &[3, 0, 0, 0, 0x6A, 0x6B, 0x6C]);
    h.step();
    h.step();
    assert!(h.writes.requests.is_empty());
    assert!(h.io.closed.contains(&1));
    assert_eq!(h.server.sessions().active_count(), 0);
}

#[test]
fn receive_overflow_closes_immediately_with_nothing_salvaged() {
    let mut h = Harness::new();
    h.bring_to_idle();
    h.io.connect(1);
    h.step();

    h.io.receive(1, &[0u8; 2048]);
    h.io.receive(1, &[0u8; 1]);
    h.server.poll_transport(&mut h.io);

    // Torn down in callback context via the Close disposition.
    assert!(h.io.closed.contains(&1));
    assert_eq!(h.server.sessions().active_count(), 0);
    h.step();
    assert!(h.writes.requests.is_empty());
}

// ── Link loss ─────────────────────────────────────────────────

#[test]
fn link_loss_closes_all_sessions_before_disconnecting() {
    let mut h = Harness::new();
    h.bring_to_idle();
    h.io.connect(1);
    h.io.connect(2);
    h.step();
    assert_eq!(h.server.sessions().active_count(), 2);

    h.link.steady_status = LinkStatus::Down;
    h.advance(u64::from(VERIFY_CONNECTION_EVERY_MS));
    h.step(); // Idle -> VerifyConnected
    h.step(); // VerifyConnected: association lost
    assert_eq!(
        h.server.state(),
        ServerState::Waiting {
            resume: ResumeState::Disconnected
        }
    );
    assert_eq!(h.server.sessions().active_count(), 0);
    assert!(h.io.closed.contains(&1));
    assert!(h.io.closed.contains(&2));
    assert_eq!(h.io.unbound, 1);
    assert_eq!(h.discovery.withdrawn, 1);

    // After the backoff a fresh join attempt is made.
    h.link.steady_status = LinkStatus::Up;
    h.advance(u64::from(WIFI_CONNECT_RETRY_MS) - 1);
    h.step();
    assert_eq!(h.link.join_calls, 1);
    h.advance(1);
    h.step(); // Waiting -> Disconnected
    h.step(); // Disconnected -> Connecting
    assert_eq!(h.link.join_calls, 2);
    assert_eq!(h.server.state(), ServerState::Connecting);
}
