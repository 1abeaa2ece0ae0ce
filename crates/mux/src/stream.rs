//! The per-stream reader/writer exposing a bidirectional byte-stream API with
//! half-close, per spec.md §4.3.
//!
//! A [`SubStream`] never owns its [`crate::manager::Manager`] back-reference as
//! a raw cycle: it holds an `Arc` to the manager's shared inner state and its
//! own stable integer id, per the arena design in the Design Notes.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::frame::{Frame, INITIAL_WINDOW, MAX_PAYLOAD};
use crate::manager::Inner;

/// Half-close state for one direction of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Open,
    HalfClosed,
    Closed,
}

/// Stream state shared between the `Manager`'s reader task and the
/// `SubStream` handle(s) held by callers. Guarded by a single `parking_lot`
/// mutex, never held across an `.await`.
#[derive(Debug)]
pub(crate) struct State {
    pub(crate) local: Side,
    pub(crate) peer: Side,
    pub(crate) recv_buffer: VecDeque<u8>,
    pub(crate) consumed_since_update: u32,
    pub(crate) send_window: i64,
    pub(crate) broken: Option<Error>,
    pub(crate) close_write_sent: bool,
    pub(crate) close_both_sent: bool,
}

impl State {
    fn new() -> Self {
        Self {
            local: Side::Open,
            peer: Side::Open,
            recv_buffer: VecDeque::new(),
            consumed_since_update: 0,
            send_window: i64::from(INITIAL_WINDOW),
            broken: None,
            close_write_sent: false,
            close_both_sent: false,
        }
    }
}

/// Shared per-stream state plus the parking slots (`waitersRead`,
/// `waiterWrite` in spec.md §3) implemented as `Notify`.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) stream_id: u32,
    pub(crate) state: Mutex<State>,
    pub(crate) read_ready: Notify,
    pub(crate) write_ready: Notify,
}

impl Shared {
    pub(crate) fn new(stream_id: u32) -> Arc<Self> {
        Arc::new(Self {
            stream_id,
            state: Mutex::new(State::new()),
            read_ready: Notify::new(),
            write_ready: Notify::new(),
        })
    }

    /// Called by the Manager's reader on DATA: true if the data fit, false if
    /// accepting it would overflow `recvBuffer`'s capacity (a peer flow-control
    /// violation, fatal to the carrier per spec.md §4.2).
    pub(crate) fn push_data(&self, payload: &[u8]) -> bool {
        let mut state = self.state.lock();
        if state.recv_buffer.len() + payload.len() > INITIAL_WINDOW as usize {
            return false;
        }
        state.recv_buffer.extend(payload.iter().copied());
        drop(state);
        self.read_ready.notify_waiters();
        true
    }

    pub(crate) fn on_window_update(&self, delta: u32) {
        let mut state = self.state.lock();
        state.send_window += i64::from(delta);
        drop(state);
        self.write_ready.notify_waiters();
    }

    pub(crate) fn on_close_write_from_peer(&self) {
        let mut state = self.state.lock();
        state.peer = Side::HalfClosed;
        drop(state);
        self.read_ready.notify_waiters();
    }

    pub(crate) fn on_close_both_from_peer(&self) {
        let mut state = self.state.lock();
        state.peer = Side::Closed;
        state.local = Side::Closed;
        drop(state);
        self.read_ready.notify_waiters();
        self.write_ready.notify_waiters();
    }

    pub(crate) fn on_manager_closed(&self, reason: Error) {
        let mut state = self.state.lock();
        if state.broken.is_none() {
            state.broken = Some(reason);
        }
        drop(state);
        self.read_ready.notify_waiters();
        self.write_ready.notify_waiters();
    }

    pub(crate) fn fully_closed(&self) -> bool {
        let state = self.state.lock();
        state.local == Side::Closed && state.peer == Side::Closed
    }
}

/// A logical bidirectional byte-stream multiplexed over a single
/// [`crate::manager::Manager`]. See spec.md §3 and §4.3.
#[derive(Debug)]
pub struct SubStream {
    pub(crate) shared: Arc<Shared>,
    pub(crate) outbound: mpsc::Sender<Frame>,
    pub(crate) manager: Arc<Inner>,
}

impl SubStream {
    pub(crate) fn new(shared: Arc<Shared>, outbound: mpsc::Sender<Frame>, manager: Arc<Inner>) -> Self {
        Self { shared, outbound, manager }
    }

    /// Identity of this stream: `(managerId, streamId)` per spec.md §3. The
    /// manager id is stable for the lifetime of the process; callers that
    /// need it can compare `Arc` pointer identity of the owning manager.
    #[must_use]
    pub fn stream_id(&self) -> u32 {
        self.shared.stream_id
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.manager.local_addr()
    }

    #[must_use]
    pub fn remote_addr(&self) -> SocketAddr {
        self.manager.remote_addr()
    }

    /// Reads into `buf`, parking while `recvBuffer` is empty and the peer
    /// direction is still open, per spec.md §4.3.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            // Create the `Notified` future before inspecting the state so a
            // `push_data`/close that lands between the check below and the
            // `.await` still wakes this waiter, matching `Manager::accept`'s
            // ordering (manager.rs) rather than racing `notify_waiters()`.
            let notified = self.shared.read_ready.notified();
            {
                let mut state = self.shared.state.lock();
                if let Some(err) = &state.broken {
                    return Err(clone_err(err));
                }
                if !state.recv_buffer.is_empty() {
                    let n = buf.len().min(state.recv_buffer.len());
                    for slot in buf.iter_mut().take(n) {
                        *slot = state.recv_buffer.pop_front().expect("checked len");
                    }
                    state.consumed_since_update += n as u32;
                    let delta = if state.consumed_since_update >= INITIAL_WINDOW / 2 {
                        let d = state.consumed_since_update;
                        state.consumed_since_update = 0;
                        Some(d)
                    } else {
                        None
                    };
                    drop(state);
                    if let Some(delta) = delta {
                        let _ = self.outbound.send(Frame::window_update(self.shared.stream_id, delta)).await;
                    }
                    return Ok(n);
                }
                if state.peer != Side::Open {
                    // Peer half-closed (or fully closed) and buffer drained: EOF.
                    return Ok(0);
                }
            }
            notified.await;
        }
    }

    /// Writes `buf`, splitting into frames no larger than
    /// [`crate::frame::MAX_PAYLOAD`] and blocking while `sendWindow` is
    /// exhausted, per spec.md §4.1/§4.3. Returns bytes actually delivered.
    pub async fn write(&self, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut written = 0usize;
        while written < buf.len() {
            let credit = loop {
                // Same ordering fix as `read`: bind the `Notified` future
                // before checking `send_window` so a concurrent
                // `on_window_update` (which uses `notify_waiters()`, storing
                // no permit) cannot land in the gap between the check and the
                // `.await` and be lost.
                let notified = self.shared.write_ready.notified();
                let state = self.shared.state.lock();
                if let Some(err) = &state.broken {
                    return Err(clone_err(err));
                }
                if state.local == Side::Closed || state.local == Side::HalfClosed {
                    return Err(Error::BrokenPipe);
                }
                if state.send_window > 0 {
                    break state.send_window as usize;
                }
                drop(state);
                notified.await;
            };
            let chunk_len = (buf.len() - written).min(credit).min(MAX_PAYLOAD);
            let chunk = Bytes::copy_from_slice(&buf[written..written + chunk_len]);
            {
                let mut state = self.shared.state.lock();
                state.send_window -= chunk_len as i64;
            }
            self.outbound
                .send(Frame::data(self.shared.stream_id, chunk))
                .await
                .map_err(|_| Error::BrokenPipe)?;
            written += chunk_len;
        }
        Ok(written)
    }

    /// Emits CLOSE_WRITE exactly once (idempotent, per P6).
    pub async fn close_write(&self) -> Result<()> {
        let should_send = {
            let mut state = self.shared.state.lock();
            let send = !state.close_write_sent && state.local == Side::Open;
            state.close_write_sent = true;
            if state.local == Side::Open {
                state.local = Side::HalfClosed;
            }
            send
        };
        if should_send {
            let _ = self.outbound.send(Frame::close_write(self.shared.stream_id)).await;
        }
        Ok(())
    }

    /// Emits CLOSE_BOTH if not already emitted and releases the stream id
    /// from the manager's table once both directions are closed.
    pub async fn close(&self) -> Result<()> {
        let should_send = {
            let mut state = self.shared.state.lock();
            let send = !state.close_both_sent;
            state.close_both_sent = true;
            state.local = Side::Closed;
            state.peer = Side::Closed;
            send
        };
        if should_send {
            let _ = self.outbound.send(Frame::close_both(self.shared.stream_id)).await;
        }
        self.shared.read_ready.notify_waiters();
        self.shared.write_ready.notify_waiters();
        self.manager.remove_stream(self.shared.stream_id);
        Ok(())
    }
}

fn clone_err(err: &Error) -> Error {
    match err {
        Error::Protocol(s) => Error::Protocol(s.clone()),
        Error::ManagerClosed => Error::ManagerClosed,
        Error::Timeout => Error::Timeout,
        Error::BrokenPipe => Error::BrokenPipe,
        Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), e.to_string())),
        Error::Cancelled => Error::Cancelled,
    }
}
