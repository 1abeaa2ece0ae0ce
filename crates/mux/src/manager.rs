//! The mux engine: sub-stream table, flow control, keepalive, open/close
//! protocol. See spec.md §4.2.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::carrier::{Carrier, FrameReader, FrameWriter};
use crate::error::{Error, Result};
use crate::frame::{Frame, Kind, MAX_PAYLOAD};
use crate::stream::{Shared, SubStream};

/// Default keepalive ping interval, per spec.md §4.2.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);
/// 3x the keepalive interval: no frame received within this window is fatal.
pub const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(15);
/// Bound on the writer's outbound queue, providing backpressure to stream writes.
pub const OUTBOUND_QUEUE_LEN: usize = 64;
/// How long `open()`/`openWithData()` wait for the peer's ACK before giving up.
pub const OPEN_ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Which side of the carrier this Manager sits on; determines stream id parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    fn first_id(self) -> u32 {
        match self {
            Self::Client => 1,
            Self::Server => 2,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Inner {
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    outbound: mpsc::Sender<Frame>,
    streams: Mutex<HashMap<u32, Arc<Shared>>>,
    next_local_id: Mutex<u32>,
    pending_opens: Mutex<HashMap<u32, oneshot::Sender<Result<()>>>>,
    accept_queue: Mutex<VecDeque<Arc<Shared>>>,
    accept_notify: Notify,
    closed: AtomicBool,
    close_reason: Mutex<Option<Error>>,
    last_rx: Mutex<Instant>,
    last_tx: Mutex<Instant>,
    reader_abort: Mutex<Option<AbortHandle>>,
    writer_abort: Mutex<Option<AbortHandle>>,
    keepalive_abort: Mutex<Option<AbortHandle>>,
}

impl Inner {
    pub(crate) fn remove_stream(&self, id: u32) {
        let fully_closed = self.streams.lock().get(&id).map(|s| s.fully_closed()).unwrap_or(true);
        if fully_closed {
            self.streams.lock().remove(&id);
        }
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub(crate) fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

/// Owns a [`Carrier`] and the table of [`SubStream`]s multiplexed over it.
/// Cheaply cloneable; every clone refers to the same underlying engine.
#[derive(Debug, Clone)]
pub struct Manager(pub(crate) Arc<Inner>);

impl Manager {
    /// Takes ownership of `carrier` and starts the reader, writer and
    /// keepalive tasks. Returns immediately; the tasks run until `close()`.
    #[must_use]
    pub fn spawn(carrier: Box<dyn Carrier>, role: Role) -> Self {
        let local_addr = carrier.local_addr();
        let remote_addr = carrier.remote_addr();
        let (reader_half, writer_half) = carrier.split();
        let (outbound, rx) = mpsc::channel(OUTBOUND_QUEUE_LEN);

        let now = Instant::now();
        let inner = Arc::new(Inner {
            local_addr,
            remote_addr,
            outbound,
            streams: Mutex::new(HashMap::new()),
            next_local_id: Mutex::new(role.first_id()),
            pending_opens: Mutex::new(HashMap::new()),
            accept_queue: Mutex::new(VecDeque::new()),
            accept_notify: Notify::new(),
            closed: AtomicBool::new(false),
            close_reason: Mutex::new(None),
            last_rx: Mutex::new(now),
            last_tx: Mutex::new(now),
            reader_abort: Mutex::new(None),
            writer_abort: Mutex::new(None),
            keepalive_abort: Mutex::new(None),
        });

        let reader_handle = tokio::spawn(reader_task(inner.clone(), reader_half));
        *inner.reader_abort.lock() = Some(reader_handle.abort_handle());

        let writer_handle = tokio::spawn(writer_task(inner.clone(), writer_half, rx));
        *inner.writer_abort.lock() = Some(writer_handle.abort_handle());

        let keepalive_handle = tokio::spawn(keepalive_task(inner.clone()));
        *inner.keepalive_abort.lock() = Some(keepalive_handle.abort_handle());

        Self(inner)
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.0.local_addr()
    }

    #[must_use]
    pub fn remote_addr(&self) -> SocketAddr {
        self.0.remote_addr()
    }

    /// Opens a new sub-stream, parking until the peer's ACK arrives, the
    /// manager closes, or [`OPEN_ACK_TIMEOUT`] elapses.
    pub async fn open(&self) -> Result<SubStream> {
        self.open_inner(None).await
    }

    /// Opens a new sub-stream with pre-data already queued for send, per the
    /// OPEN_WITH_DATA frame kind.
    pub async fn open_with_data(&self, data: Bytes) -> Result<SubStream> {
        if data.len() > MAX_PAYLOAD {
            return Err(Error::Protocol("open-with-data payload exceeds max frame payload".into()));
        }
        self.open_inner(Some(data)).await
    }

    async fn open_inner(&self, data: Option<Bytes>) -> Result<SubStream> {
        if self.0.closed.load(Ordering::Acquire) {
            return Err(Error::ManagerClosed);
        }
        let id = {
            let mut next = self.0.next_local_id.lock();
            let id = *next;
            *next += 2;
            id
        };
        let shared = Shared::new(id);
        self.0.streams.lock().insert(id, shared.clone());
        let (ack_tx, ack_rx) = oneshot::channel();
        self.0.pending_opens.lock().insert(id, ack_tx);

        let frame = match data {
            Some(d) => Frame::open_with_data(id, d),
            None => Frame::open(id),
        };
        if self.0.outbound.send(frame).await.is_err() {
            self.0.pending_opens.lock().remove(&id);
            self.0.streams.lock().remove(&id);
            return Err(Error::ManagerClosed);
        }

        match tokio::time::timeout(OPEN_ACK_TIMEOUT, ack_rx).await {
            Ok(Ok(Ok(()))) => Ok(SubStream::new(shared, self.0.outbound.clone(), self.0.clone())),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_recv_dropped)) => {
                self.0.streams.lock().remove(&id);
                Err(Error::ManagerClosed)
            }
            Err(_elapsed) => {
                self.0.pending_opens.lock().remove(&id);
                self.0.streams.lock().remove(&id);
                Err(Error::Timeout)
            }
        }
    }

    /// Waits for a sub-stream opened by the peer. FIFO with respect to
    /// arrival order on `acceptQueue`.
    pub async fn accept(&self) -> Result<SubStream> {
        loop {
            let notified = self.0.accept_notify.notified();
            if let Some(shared) = self.0.accept_queue.lock().pop_front() {
                return Ok(SubStream::new(shared, self.0.outbound.clone(), self.0.clone()));
            }
            if self.0.closed.load(Ordering::Acquire) {
                return Err(Error::ManagerClosed);
            }
            notified.await;
        }
    }

    /// Idempotent. Tears down the reader/writer/keepalive tasks and wakes
    /// every parked waiter with [`Error::ManagerClosed`] or the stored
    /// `closeReason`.
    pub fn close(&self) {
        self.close_with_reason(None);
    }

    pub(crate) fn close_with_reason(&self, reason: Option<Error>) {
        if self.0.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.0.close_reason.lock() = Some(reason.unwrap_or(Error::ManagerClosed));

        let streams: Vec<Arc<Shared>> = self.0.streams.lock().drain().map(|(_, v)| v).collect();
        for s in streams {
            s.on_manager_closed(Error::BrokenPipe);
        }
        for (_, tx) in self.0.pending_opens.lock().drain() {
            let _ = tx.send(Err(Error::ManagerClosed));
        }
        self.0.accept_notify.notify_waiters();

        if let Some(h) = self.0.reader_abort.lock().take() {
            h.abort();
        }
        if let Some(h) = self.0.writer_abort.lock().take() {
            h.abort();
        }
        if let Some(h) = self.0.keepalive_abort.lock().take() {
            h.abort();
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::Acquire)
    }

    /// Number of live sub-streams, used by the client pool's min-heap key.
    #[must_use]
    pub fn active_streams(&self) -> usize {
        self.0.streams.lock().len()
    }
}

fn manager_close(inner: &Arc<Inner>, reason: Error) {
    Manager(inner.clone()).close_with_reason(Some(reason));
}

async fn reader_task(inner: Arc<Inner>, mut reader: Box<dyn FrameReader>) {
    loop {
        match reader.read_frame().await {
            Ok(frame) => {
                *inner.last_rx.lock() = Instant::now();
                if let Err(e) = handle_frame(&inner, frame).await {
                    warn!(error = %e, "mux protocol violation, closing manager");
                    manager_close(&inner, e);
                    return;
                }
            }
            Err(e) => {
                debug!(error = %e, "mux carrier read failed, closing manager");
                manager_close(&inner, e);
                return;
            }
        }
    }
}

async fn handle_frame(inner: &Arc<Inner>, frame: Frame) -> Result<()> {
    match frame.kind {
        Kind::Open | Kind::OpenWithData => {
            let shared = Shared::new(frame.stream_id);
            if matches!(frame.kind, Kind::OpenWithData) && !shared.push_data(&frame.payload) {
                return Err(Error::Protocol("OPEN_WITH_DATA payload overflowed initial window".into()));
            }
            inner.streams.lock().insert(frame.stream_id, shared.clone());
            inner.accept_queue.lock().push_back(shared);
            inner.accept_notify.notify_waiters();
            let _ = inner.outbound.send(Frame::ack(frame.stream_id)).await;
        }
        Kind::Ack => {
            // An ACK for an id not in *opening* is silently dropped.
            if let Some(tx) = inner.pending_opens.lock().remove(&frame.stream_id) {
                let _ = tx.send(Ok(()));
            }
        }
        Kind::Data => {
            let shared = inner.streams.lock().get(&frame.stream_id).cloned();
            match shared {
                Some(s) => {
                    if !s.push_data(&frame.payload) {
                        return Err(Error::Protocol(format!(
                            "stream {} exceeded flow-control window",
                            frame.stream_id
                        )));
                    }
                }
                None => {
                    let _ = inner.outbound.send(Frame::close_both(frame.stream_id)).await;
                }
            }
        }
        Kind::WindowUpdate => {
            let delta = frame.window_update_delta()?;
            if let Some(s) = inner.streams.lock().get(&frame.stream_id) {
                s.on_window_update(delta);
            }
        }
        Kind::CloseWrite => {
            if let Some(s) = inner.streams.lock().get(&frame.stream_id) {
                s.on_close_write_from_peer();
            }
        }
        Kind::CloseBoth => {
            if let Some(s) = inner.streams.lock().remove(&frame.stream_id) {
                s.on_close_both_from_peer();
            }
        }
        Kind::Ping => {
            let _ = inner.outbound.send(Frame::pong(frame.payload)).await;
        }
        Kind::Pong => {
            // lastRx already stamped by the caller.
        }
    }
    Ok(())
}

async fn writer_task(inner: Arc<Inner>, mut writer: Box<dyn FrameWriter>, mut rx: mpsc::Receiver<Frame>) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = writer.write_frame(frame).await {
            manager_close(&inner, e);
            return;
        }
        *inner.last_tx.lock() = Instant::now();
    }
}

async fn keepalive_task(inner: Arc<Inner>) {
    let mut ticker = tokio::time::interval(KEEPALIVE_INTERVAL);
    ticker.tick().await; // first tick fires immediately
    loop {
        ticker.tick().await;
        if inner.closed.load(Ordering::Acquire) {
            return;
        }
        if inner.last_tx.lock().elapsed() >= KEEPALIVE_INTERVAL {
            let _ = inner.outbound.send(Frame::ping(Bytes::from_static(b"ka"))).await;
        }
        if inner.last_rx.lock().elapsed() >= KEEPALIVE_TIMEOUT {
            manager_close(&inner, Error::Timeout);
            return;
        }
    }
}
