//! Network control-and-telemetry server.
//!
//! A cooperative, non-blocking subsystem that owns WiFi association, a
//! bounded pool of TCP client sessions, and the binary request/reply
//! protocol bridging clients to the light-output logic.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  ServerSocketPort ──▶ SessionPool ──▶ protocol ──▶ WriteSink  │
//! │   (accept/receive)    (slots+bufs)    (decode)    (light out) │
//! │         ▲                                  │                  │
//! │         │        ControlServer             ▼                  │
//! │         └── send/close ◀── (state machine, timers, identity)  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! The state machine is stepped once per scheduler tick (`work`), never
//! blocks, and recovers every failure class locally: session errors close
//! one session, link errors take the fixed-backoff retry path, and nothing
//! escalates to process termination.

pub mod codec;
pub mod protocol;
pub mod server;
pub mod session;
pub mod timer;
pub mod transport;

pub use server::{ControlServer, ResumeState, ServerState};
pub use timer::Millis;

/// Hard cap on concurrently active client sessions.
pub const MAX_CONNECTIONS: usize = 4;

/// Per-direction buffer capacity of one session, in bytes.
pub const BUFFER_SIZE: usize = 2048;

/// Backoff between WiFi connection attempts.
pub const WIFI_CONNECT_RETRY_MS: u32 = 5_000;

/// Cadence of the association watchdog while idle.
pub const VERIFY_CONNECTION_EVERY_MS: u32 = 1_000;

/// Default control-server TCP port.
pub const DEFAULT_PORT: u16 = 4617;
