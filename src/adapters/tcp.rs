//! TCP server transport adapter.
//!
//! Implements [`ServerSocketPort`] — a multi-client, non-blocking TCP
//! listener delivering accept/receive events through the sink passed to
//! `poll`.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: raw lwIP sockets (`lwip_socket` /
//!   `lwip_accept` / `lwip_recv` / `lwip_send`), all in non-blocking mode.
//!   lwIP serialises socket calls against its own stack internals, which
//!   provides the mutual-exclusion scope the sink contract requires.
//! - **all other targets**: non-blocking `std::net` for host-side testing.
//!   Pass port `0` to let the OS pick (see [`TcpServerAdapter::local_addr`]).
//!
//! The adapter stores up to [`MAX_CONNECTIONS`] accepted sockets; the
//! session pool enforces the same cap, so a sink that accepts always has a
//! slot here.  Rejected connections are torn down before they are stored.

use log::{debug, info, warn};

use crate::net::MAX_CONNECTIONS;
use crate::net::transport::{
    AcceptDecision, ReceiveDisposition, ServerSocketPort, SocketEventSink, SocketHandle,
    TransportError,
};

#[cfg(not(target_os = "espidf"))]
use std::io::{Read, Write};
#[cfg(not(target_os = "espidf"))]
use std::net::{TcpListener, TcpStream};

/// Bytes pulled off a socket per poll, per connection.
const READ_CHUNK: usize = 512;

#[cfg(not(target_os = "espidf"))]
type Connection = (SocketHandle, TcpStream);
#[cfg(target_os = "espidf")]
type Connection = (SocketHandle, core::ffi::c_int);

pub struct TcpServerAdapter {
    next_token: u32,
    connections: [Option<Connection>; MAX_CONNECTIONS],
    #[cfg(not(target_os = "espidf"))]
    listener: Option<TcpListener>,
    #[cfg(target_os = "espidf")]
    listener_fd: Option<core::ffi::c_int>,
}

impl Default for TcpServerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpServerAdapter {
    pub fn new() -> Self {
        Self {
            next_token: 1,
            connections: core::array::from_fn(|_| None),
            #[cfg(not(target_os = "espidf"))]
            listener: None,
            #[cfg(target_os = "espidf")]
            listener_fd: None,
        }
    }

    fn mint_handle(&mut self) -> SocketHandle {
        let handle = SocketHandle(self.next_token);
        self.next_token = self.next_token.wrapping_add(1);
        handle
    }

    fn store(&mut self, connection: Connection) {
        match self.connections.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => *slot = Some(connection),
            None => {
                // The sink accepted more than the pool cap — drop it.
                warn!("tcp: no connection slot free, dropping accepted client");
                Self::teardown(connection);
            }
        }
    }

    /// The actual bound address (simulation only).
    ///
    /// Useful when port `0` was passed to `listen`.
    #[cfg(not(target_os = "espidf"))]
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    // ── Platform helpers: simulation ──────────────────────────

    #[cfg(not(target_os = "espidf"))]
    fn teardown(connection: Connection) {
        drop(connection);
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_listen(&mut self, port: u16) -> Result<(), TransportError> {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).map_err(|_| TransportError::Io)?;
        listener
            .set_nonblocking(true)
            .map_err(|_| TransportError::Io)?;
        info!("tcp(sim): listening on port {port}");
        self.listener = Some(listener);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn poll_accept(&mut self, sink: &mut dyn SocketEventSink) {
        loop {
            let accepted = match self.listener.as_ref() {
                Some(listener) => listener.accept(),
                None => return,
            };
            match accepted {
                Ok((stream, peer)) => {
                    if stream.set_nonblocking(true).is_err() {
                        warn!("tcp(sim): failed to set non-blocking on client socket");
                        continue;
                    }
                    let handle = self.mint_handle();
                    match sink.on_accept(Ok(handle)) {
                        AcceptDecision::Accept => {
                            debug!("tcp(sim): client {} connected from {peer}", handle.0);
                            self.store((handle, stream));
                        }
                        AcceptDecision::Reject => {
                            debug!("tcp(sim): rejected client from {peer}");
                        }
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    warn!("tcp(sim): accept error: {e}");
                    let _ = sink.on_accept(Err(TransportError::Io));
                    return;
                }
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn poll_receive(&mut self, sink: &mut dyn SocketEventSink) {
        let mut buf = [0u8; READ_CHUNK];
        for slot in &mut self.connections {
            let Some((handle, stream)) = slot.as_mut() else {
                continue;
            };
            let handle = *handle;
            let event: Option<Result<&[u8], TransportError>> = match stream.read(&mut buf) {
                Ok(0) => Some(Ok(&[][..])),
                Ok(n) => Some(Ok(&buf[..n])),
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => None,
                Err(_) => Some(Err(TransportError::Io)),
            };
            if let Some(result) = event {
                if sink.on_receive(handle, result) == ReceiveDisposition::Close {
                    debug!("tcp(sim): client {} closed by sink", handle.0);
                    *slot = None;
                }
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_send(stream: &mut TcpStream, data: &[u8]) -> Result<usize, TransportError> {
        match stream.write(data) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(_) => Err(TransportError::Io),
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_unbind(&mut self) {
        self.listener = None;
    }

    // ── Platform helpers: ESP-IDF / lwIP ──────────────────────

    #[cfg(target_os = "espidf")]
    fn teardown(connection: Connection) {
        unsafe {
            esp_idf_svc::sys::lwip_close(connection.1);
        }
    }

    #[cfg(target_os = "espidf")]
    fn last_errno() -> i32 {
        // SAFETY: __errno() returns the current task's errno pointer, valid
        // to read in any task context.
        unsafe { *esp_idf_svc::sys::__errno() }
    }

    #[cfg(target_os = "espidf")]
    fn set_nonblocking(fd: core::ffi::c_int) -> bool {
        use esp_idf_svc::sys::{F_SETFL, O_NONBLOCK, lwip_fcntl};
        // SAFETY: F_SETFL + O_NONBLOCK is a valid fcntl for lwIP sockets.
        (unsafe { lwip_fcntl(fd, F_SETFL as _, O_NONBLOCK as _) }) >= 0
    }

    #[cfg(target_os = "espidf")]
    fn platform_listen(&mut self, port: u16) -> Result<(), TransportError> {
        use esp_idf_svc::sys::{
            AF_INET, SOCK_STREAM, in_addr, lwip_bind, lwip_close, lwip_htons, lwip_listen,
            lwip_socket, sockaddr_in,
        };

        if let Some(old) = self.listener_fd.take() {
            // SAFETY: old is a valid listener fd, closed exactly once.
            unsafe { lwip_close(old) };
        }

        // SAFETY: plain socket creation; errors are checked.
        let fd = unsafe { lwip_socket(AF_INET as _, SOCK_STREAM as _, 0) };
        if fd < 0 {
            warn!("tcp: lwip_socket failed ({fd})");
            return Err(TransportError::Io);
        }

        let addr = sockaddr_in {
            sin_len: 0,
            sin_family: AF_INET as _,
            // SAFETY: lwip_htons converts a u16 to network byte order.
            sin_port: unsafe { lwip_htons(port) },
            sin_addr: in_addr { s_addr: 0 }, // INADDR_ANY
            sin_zero: [0u8; 8],
        };

        // SAFETY: addr is valid for the duration of the call.
        let rc = unsafe {
            lwip_bind(
                fd,
                core::ptr::addr_of!(addr).cast(),
                core::mem::size_of::<sockaddr_in>() as _,
            )
        };
        if rc < 0 {
            // SAFETY: fd is valid, closed exactly once on this error path.
            unsafe { lwip_close(fd) };
            warn!("tcp: lwip_bind failed ({rc})");
            return Err(TransportError::Io);
        }

        // SAFETY: listen on a bound socket; backlog covers the session cap.
        let rc = unsafe { lwip_listen(fd, MAX_CONNECTIONS as _) };
        if rc < 0 {
            // SAFETY: as above.
            unsafe { lwip_close(fd) };
            warn!("tcp: lwip_listen failed ({rc})");
            return Err(TransportError::Io);
        }

        if !Self::set_nonblocking(fd) {
            // SAFETY: as above.
            unsafe { lwip_close(fd) };
            warn!("tcp: O_NONBLOCK on listener failed");
            return Err(TransportError::Io);
        }

        info!("tcp: listening on port {port}");
        self.listener_fd = Some(fd);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn poll_accept(&mut self, sink: &mut dyn SocketEventSink) {
        use esp_idf_svc::sys::{EAGAIN, lwip_accept, lwip_close};

        loop {
            let Some(listener_fd) = self.listener_fd else {
                return;
            };
            // SAFETY: non-blocking accept on a valid listener fd.
            let fd = unsafe { lwip_accept(listener_fd, core::ptr::null_mut(), core::ptr::null_mut()) };
            if fd < 0 {
                if Self::last_errno() != EAGAIN as i32 {
                    warn!("tcp: accept error (errno {})", Self::last_errno());
                    let _ = sink.on_accept(Err(TransportError::Io));
                }
                return;
            }
            if !Self::set_nonblocking(fd) {
                // SAFETY: fd is valid, closed exactly once.
                unsafe { lwip_close(fd) };
                warn!("tcp: O_NONBLOCK on client failed");
                continue;
            }
            let handle = self.mint_handle();
            match sink.on_accept(Ok(handle)) {
                AcceptDecision::Accept => {
                    debug!("tcp: client {} connected (fd {fd})", handle.0);
                    self.store((handle, fd));
                }
                AcceptDecision::Reject => {
                    debug!("tcp: rejected client (fd {fd})");
                    // SAFETY: fd is valid and never stored.
                    unsafe { lwip_close(fd) };
                }
            }
        }
    }

    #[cfg(target_os = "espidf")]
    fn poll_receive(&mut self, sink: &mut dyn SocketEventSink) {
        use esp_idf_svc::sys::{EAGAIN, lwip_recv};

        let mut buf = [0u8; READ_CHUNK];
        for slot in &mut self.connections {
            let Some((handle, fd)) = *slot else {
                continue;
            };
            // SAFETY: buf is a valid mutable buffer; fd is a connected socket.
            let rc = unsafe { lwip_recv(fd, buf.as_mut_ptr().cast(), buf.len(), 0) };
            let event: Option<Result<&[u8], TransportError>> = if rc > 0 {
                Some(Ok(&buf[..rc as usize]))
            } else if rc == 0 {
                Some(Ok(&[][..]))
            } else if Self::last_errno() == EAGAIN as i32 {
                None
            } else {
                Some(Err(TransportError::Io))
            };
            if let Some(result) = event {
                if sink.on_receive(handle, result) == ReceiveDisposition::Close {
                    debug!("tcp: client {} closed by sink", handle.0);
                    // SAFETY: fd is valid, closed exactly once (slot cleared).
                    unsafe { esp_idf_svc::sys::lwip_close(fd) };
                    *slot = None;
                }
            }
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_send(fd: &mut core::ffi::c_int, data: &[u8]) -> Result<usize, TransportError> {
        use esp_idf_svc::sys::{EAGAIN, lwip_send};
        // SAFETY: data is a valid slice; fd is a connected socket.
        let rc = unsafe { lwip_send(*fd, data.as_ptr().cast(), data.len(), 0) };
        if rc >= 0 {
            Ok(rc as usize)
        } else if Self::last_errno() == EAGAIN as i32 {
            Ok(0)
        } else {
            Err(TransportError::Io)
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_unbind(&mut self) {
        if let Some(fd) = self.listener_fd.take() {
            // SAFETY: fd is a valid listener, closed exactly once.
            unsafe { esp_idf_svc::sys::lwip_close(fd) };
        }
    }
}

// ───────────────────────────────────────────────────────────────
// ServerSocketPort
// ───────────────────────────────────────────────────────────────

impl ServerSocketPort for TcpServerAdapter {
    fn listen(&mut self, port: u16) -> Result<(), TransportError> {
        self.platform_listen(port)
    }

    fn poll(&mut self, sink: &mut dyn SocketEventSink) {
        self.poll_accept(sink);
        self.poll_receive(sink);
    }

    fn send(&mut self, handle: SocketHandle, data: &[u8]) -> Result<usize, TransportError> {
        let connection = self
            .connections
            .iter_mut()
            .flatten()
            .find(|(stored, _)| *stored == handle);
        match connection {
            Some((_, transport)) => Self::platform_send(transport, data),
            None => Err(TransportError::NotConnected),
        }
    }

    fn close(&mut self, handle: SocketHandle) {
        for slot in &mut self.connections {
            if matches!(slot, Some((stored, _)) if *stored == handle) {
                if let Some(connection) = slot.take() {
                    debug!("tcp: client {} closed", handle.0);
                    Self::teardown(connection);
                }
            }
        }
    }

    fn unbind(&mut self) {
        for slot in &mut self.connections {
            if let Some(connection) = slot.take() {
                Self::teardown(connection);
            }
        }
        self.platform_unbind();
        info!("tcp: listener unbound");
    }
}

// ───────────────────────────────────────────────────────────────
// Tests (host / simulation path only)
// ───────────────────────────────────────────────────────────────
