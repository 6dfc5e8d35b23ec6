//! Transport binding seam — the boundary to the platform TCP/IP stack.
//!
//! The control server never touches sockets directly.  A platform adapter
//! implements [`ServerSocketPort`] and delivers accept/receive events through
//! a [`SocketEventSink`] passed explicitly into [`ServerSocketPort::poll`].
//! The sink receives the events the way the stack raises them (accept with a
//! possible error, receive with data / error / EOF) and answers with a
//! decision the binding acts on while still inside its own context.
//!
//! Concurrency contract: implementations run sink callbacks only from inside
//! `poll`, within the platform's stack lock, never concurrently with the
//! cooperative loop.  `send`/`close`/`unbind` take the same lock.  `close` is
//! always safe to call repeatedly on the same handle.

use core::fmt;

/// Opaque token identifying one accepted connection.
///
/// Bindings mint a fresh token per accepted socket; tokens are never reused
/// while the connection is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketHandle(pub u32);

/// Errors surfaced by the transport binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Socket or stack I/O failure.
    Io,
    /// Operation referenced a handle that is no longer connected.
    NotConnected,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "socket I/O error"),
            Self::NotConnected => write!(f, "handle not connected"),
        }
    }
}

impl core::error::Error for TransportError {}

/// Answer to an accept event: keep the connection or have the binding
/// close it before it is ever stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptDecision {
    Accept,
    Reject,
}

/// Answer to a receive event.  `Close` tells the binding to tear the socket
/// down while still in stack context (used for framing violations where
/// nothing is salvageable); `Continue` leaves the connection to the
/// cooperative loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveDisposition {
    Continue,
    Close,
}

/// Receiver of transport events, passed into [`ServerSocketPort::poll`].
///
/// Replaces a process-wide singleton for free-standing stack callbacks: the
/// sink *is* the registration context.
pub trait SocketEventSink {
    /// A connection attempt completed.  `Err` means the stack reported a
    /// failed accept; `Ok` carries the new handle.
    fn on_accept(&mut self, result: Result<SocketHandle, TransportError>) -> AcceptDecision;

    /// Bytes (or an error) arrived on an accepted connection.
    ///
    /// `Ok` with an empty slice signals an orderly peer close (EOF).
    fn on_receive(
        &mut self,
        handle: SocketHandle,
        result: Result<&[u8], TransportError>,
    ) -> ReceiveDisposition;
}

/// Platform TCP server primitives consumed by the control server.
pub trait ServerSocketPort {
    /// Bind the listening socket.  Rebinding an already-listening port is
    /// allowed and replaces the previous listener.
    fn listen(&mut self, port: u16) -> Result<(), TransportError>;

    /// Pump pending stack events into `sink`.  Non-blocking; delivers at
    /// most one receive event per connection per call.
    fn poll(&mut self, sink: &mut dyn SocketEventSink);

    /// Send bytes on a connection.  Returns the number of bytes the stack
    /// accepted — possibly zero (would-block) or fewer than `data.len()`.
    fn send(&mut self, handle: SocketHandle, data: &[u8]) -> Result<usize, TransportError>;

    /// Close one connection.  Idempotent.
    fn close(&mut self, handle: SocketHandle);

    /// Drop the listener and every connection (used on link loss).
    fn unbind(&mut self);
}
