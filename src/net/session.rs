//! Session pool — a fixed arena of client connection slots.
//!
//! Each [`Session`] owns its transport handle exclusively while connected,
//! plus one 2 KiB buffer per direction.  Slots are claimed from accept
//! callbacks and released by the cooperative loop; the hand-off between
//! those two contexts happens through three atomic flags, one writer per
//! field per context:
//!
//! - `in_use` — set on claim (callback), cleared on release (loop)
//! - `data_pending` — set on append (callback), cleared after decode (loop)
//! - `close_pending` — set on receive error/EOF (callback), consumed by the
//!   loop's deferred-close reap on a later tick
//!
//! Nothing here allocates, and nothing here blocks.

use core::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};

use crate::net::transport::{ServerSocketPort, SocketHandle};
use crate::net::{BUFFER_SIZE, MAX_CONNECTIONS};

/// One accepted client connection and its buffers.
pub struct Session {
    handle: Option<SocketHandle>,
    send_buf: [u8; BUFFER_SIZE],
    send_len: usize,
    recv_buf: [u8; BUFFER_SIZE],
    recv_len: usize,
    in_use: AtomicBool,
    data_pending: AtomicBool,
    close_pending: AtomicBool,
}

impl Session {
    fn new() -> Self {
        Self {
            handle: None,
            send_buf: [0; BUFFER_SIZE],
            send_len: 0,
            recv_buf: [0; BUFFER_SIZE],
            recv_len: 0,
            in_use: AtomicBool::new(false),
            data_pending: AtomicBool::new(false),
            close_pending: AtomicBool::new(false),
        }
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    pub fn has_data_pending(&self) -> bool {
        self.data_pending.load(Ordering::Acquire)
    }

    pub fn is_close_pending(&self) -> bool {
        self.close_pending.load(Ordering::Acquire)
    }

    pub fn has_send_pending(&self) -> bool {
        self.is_in_use() && self.send_len > 0
    }

    pub fn handle(&self) -> Option<SocketHandle> {
        self.handle
    }

    /// Unconsumed inbound bytes.
    pub fn received(&self) -> &[u8] {
        &self.recv_buf[..self.recv_len]
    }

    /// Bytes queued for transmission and not yet accepted by the stack.
    pub fn pending_send(&self) -> &[u8] {
        &self.send_buf[..self.send_len]
    }

    fn claim(&mut self, handle: SocketHandle) {
        self.handle = Some(handle);
        self.send_len = 0;
        self.recv_len = 0;
        self.data_pending.store(false, Ordering::Release);
        self.close_pending.store(false, Ordering::Release);
        self.in_use.store(true, Ordering::Release);
    }

    /// Return the slot to its free state.  Invariant: a free slot has no
    /// handle and zero lengths.
    fn release(&mut self) {
        self.handle = None;
        self.send_len = 0;
        self.recv_len = 0;
        self.data_pending.store(false, Ordering::Release);
        self.close_pending.store(false, Ordering::Release);
        self.in_use.store(false, Ordering::Release);
    }

    /// Request a close on a later cooperative tick (callback context).
    pub fn mark_close_pending(&self) {
        self.close_pending.store(true, Ordering::Release);
    }

    /// Append inbound bytes (callback context) and flag them for the loop.
    /// A fill that would overflow the buffer is refused whole.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), ()> {
        if self.recv_len + bytes.len() > BUFFER_SIZE {
            return Err(());
        }
        self.recv_buf[self.recv_len..self.recv_len + bytes.len()].copy_from_slice(bytes);
        self.recv_len += bytes.len();
        self.data_pending.store(true, Ordering::Release);
        Ok(())
    }

    /// Consume the inbound fill after decode: single-message-per-fill.
    pub fn finish_receive(&mut self) {
        self.recv_len = 0;
        self.data_pending.store(false, Ordering::Release);
    }

    /// Queue a complete reply frame.  Returns `false` (queueing nothing)
    /// if the send buffer cannot hold it whole — never a partial write.
    pub fn queue_reply(&mut self, frame: &[u8]) -> bool {
        if self.send_len + frame.len() > BUFFER_SIZE {
            return false;
        }
        self.send_buf[self.send_len..self.send_len + frame.len()].copy_from_slice(frame);
        self.send_len += frame.len();
        true
    }

    /// Drop `sent` bytes off the front of the send buffer, keeping the
    /// unsent remainder for a later flush.
    fn consume_sent(&mut self, sent: usize) {
        let sent = sent.min(self.send_len);
        self.send_buf.copy_within(sent..self.send_len, 0);
        self.send_len -= sent;
    }
}

/// Fixed arena of [`MAX_CONNECTIONS`] session slots.
pub struct SessionPool {
    slots: [Session; MAX_CONNECTIONS],
}

impl SessionPool {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Session::new()),
        }
    }

    pub fn slot(&self, idx: usize) -> &Session {
        &self.slots[idx]
    }

    pub fn slot_mut(&mut self, idx: usize) -> &mut Session {
        &mut self.slots[idx]
    }

    /// Claim a free slot for a freshly accepted handle.  `None` means the
    /// pool is at its hard cap and the connection must be rejected —
    /// no queueing, existing sessions are untouched.
    pub fn acquire(&mut self, handle: SocketHandle) -> Option<usize> {
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if !slot.is_in_use() {
                slot.claim(handle);
                return Some(idx);
            }
        }
        None
    }

    /// Release a slot without touching the transport — for connections the
    /// binding is tearing down itself (framing violations).
    pub fn discard(&mut self, idx: usize) {
        self.slots[idx].release();
    }

    /// Slot index currently owning `handle`.
    pub fn index_of(&self, handle: SocketHandle) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.is_in_use() && slot.handle() == Some(handle))
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_in_use()).count()
    }

    pub fn any_data_pending(&self) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.is_in_use() && slot.has_data_pending())
    }

    pub fn any_close_pending(&self) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.is_in_use() && slot.is_close_pending())
    }

    pub fn any_send_pending(&self) -> bool {
        self.slots.iter().any(Session::has_send_pending)
    }

    pub fn first_data_pending(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.is_in_use() && slot.has_data_pending())
    }

    /// Close one session: release the transport handle, zero lengths, clear
    /// flags.  Idempotent — closing a free slot is a no-op.
    pub fn close_session(&mut self, idx: usize, io: &mut dyn ServerSocketPort) {
        let slot = &mut self.slots[idx];
        if !slot.is_in_use() {
            return;
        }
        if let Some(handle) = slot.handle() {
            io.close(handle);
        }
        slot.release();
        debug!("session {idx}: closed");
    }

    /// Perform the closes deferred from callback context.
    pub fn reap_deferred(&mut self, io: &mut dyn ServerSocketPort) {
        for idx in 0..MAX_CONNECTIONS {
            if self.slots[idx].is_in_use() && self.slots[idx].is_close_pending() {
                self.close_session(idx, io);
            }
        }
    }

    /// Force-close every active session (link loss).
    pub fn close_all(&mut self, io: &mut dyn ServerSocketPort) {
        for idx in 0..MAX_CONNECTIONS {
            self.close_session(idx, io);
        }
    }

    /// Push queued reply bytes to the stack.  Partial acceptance keeps the
    /// remainder queued; a hard send error closes the session.
    pub fn flush(&mut self, idx: usize, io: &mut dyn ServerSocketPort) {
        let slot = &mut self.slots[idx];
        if !slot.is_in_use() || slot.send_len == 0 {
            return;
        }
        let handle = match slot.handle() {
            Some(handle) => handle,
            None => return,
        };
        match io.send(handle, slot.pending_send()) {
            Ok(sent) => {
                slot.consume_sent(sent);
            }
            Err(err) => {
                warn!("session {idx}: send failed ({err}), closing");
                self.close_session(idx, io);
            }
        }
    }
}
