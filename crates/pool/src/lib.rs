//! The client-side min-heap pool of live carrier [`Manager`](duskmux_mux::Manager)s,
//! keyed by current sub-stream count. See spec.md §4.5.
//!
//! `acquireStream` and `release` follow the algorithm in spec.md §4.5 exactly:
//! the heap is guarded by a single lock held only across heap mutation and
//! `active_count` bookkeeping, never across carrier I/O (`open()`, `close()`,
//! dialing a fresh carrier).

mod error;
mod heap;

pub use error::{Error, Result};

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use duskmux_mux::AnyManager;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use heap::Heap;

/// At most this many sub-streams may be live on a single carrier before the
/// pool dials a fresh one, per spec.md §4.5.
pub const DEFAULT_MAX_STREAMS_PER_MANAGER: u32 = 100;
/// `acquireStream` gives up with [`Error::Exhausted`] after this many retries.
pub const MAX_RETRY: u32 = 10;
/// Entries with `active_count == 0` are pruned once the pool holds more than
/// this many carriers.
pub const CACHE_FLOOR: usize = 1;

/// The outcome of a failed [`Dialer::dial`] attempt, distinguishing a
/// non-retryable rejection (the carrier's auth boundary refused the
/// handshake, e.g. a bad TOTP code after the transport's own retry) from a
/// transient failure (network blip, handshake timeout) that `acquireStream`
/// should retry per spec.md §4.5. Folding both into one error, as a bare
/// `String` does, is what let spec.md §8 scenario 4 regress: a persistent
/// auth rejection would otherwise be retried up to [`MAX_RETRY`] times before
/// surfacing as a generic [`Error::Exhausted`] instead of the `REP=0x03`
/// scenario 4 mandates.
#[derive(Debug)]
pub enum DialFailure {
    /// The carrier's auth gate rejected the handshake; retrying the same
    /// secret will not help. Surfaced as [`Error::Dial`], never retried.
    Auth(String),
    /// Anything else: dial timeout, TCP/TLS failure, QUIC handshake error.
    /// `acquireStream` retries up to [`MAX_RETRY`] times.
    Transient(String),
}

impl std::fmt::Display for DialFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth(msg) | Self::Transient(msg) => write!(f, "{msg}"),
        }
    }
}

/// Dials a fresh carrier-backed [`AnyManager`] on demand. Implemented by the
/// `duskmux` binary crate for the WebSocket and QUIC carriers; kept generic
/// here so the pool has no direct dependency on either transport.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    async fn dial(&self) -> std::result::Result<Arc<dyn AnyManager>, DialFailure>;
}

/// A handle to the carrier a sub-stream was opened on. Held by the caller
/// (the SOCKS front-end) for the sub-stream's lifetime and passed back to
/// [`Pool::release`] exactly once the splice finishes, per spec.md §4.6.
#[derive(Debug, Clone, Copy)]
pub struct EntryHandle(u64);

struct Config {
    max_streams_per_manager: u32,
    max_retry: u32,
    cache_floor: usize,
}

/// Opens a sub-stream on `manager`, with or without `OPEN_WITH_DATA` pre-data,
/// factored out so both the reused-entry and freshly-dialed paths can race
/// the same call against the caller's cancellation handle.
async fn open_on(manager: &Arc<dyn AnyManager>, data: &Option<Bytes>) -> duskmux_mux::Result<Box<dyn duskmux_mux::AnyStream>> {
    match data {
        Some(d) => manager.open_with_data(d.clone()).await,
        None => manager.open().await,
    }
}

/// The min-heap of carrier entries described in spec.md §3/§4.5.
pub struct Pool<D: Dialer> {
    dialer: D,
    heap: Mutex<Heap>,
    config: Config,
}

impl<D: Dialer> Pool<D> {
    #[must_use]
    pub fn new(dialer: D) -> Self {
        Self::with_limits(dialer, DEFAULT_MAX_STREAMS_PER_MANAGER, MAX_RETRY, CACHE_FLOOR)
    }

    #[must_use]
    pub fn with_limits(dialer: D, max_streams_per_manager: u32, max_retry: u32, cache_floor: usize) -> Self {
        Self {
            dialer,
            heap: Mutex::new(Heap::new()),
            config: Config { max_streams_per_manager, max_retry, cache_floor },
        }
    }

    /// Number of carriers currently pooled (closed entries still pending
    /// eviction are included).
    #[must_use]
    pub fn size(&self) -> usize {
        self.heap.lock().len()
    }

    /// spec.md §4.5 `acquireStream`: open a sub-stream, preferring the
    /// least-loaded live carrier, expanding the pool only when every carrier
    /// is saturated or closed. `cancel` is the per-call cancellation handle
    /// spec.md §5 requires of every public suspending operation
    /// ("`acquireStream(ctx)`"); firing it at any suspension point abandons
    /// the attempt with [`Error::Cancelled`].
    pub async fn acquire_stream(&self, cancel: &CancellationToken) -> Result<(Box<dyn duskmux_mux::AnyStream>, EntryHandle)> {
        self.acquire_inner(None, cancel).await
    }

    /// As [`Pool::acquire_stream`], but the sub-stream's first frame carries
    /// `data` (`OPEN_WITH_DATA`), matching the SOCKS front-end's use of the
    /// destination bytes as pre-data.
    pub async fn acquire_stream_with_data(
        &self,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> Result<(Box<dyn duskmux_mux::AnyStream>, EntryHandle)> {
        self.acquire_inner(Some(data), cancel).await
    }

    async fn acquire_inner(
        &self,
        data: Option<Bytes>,
        cancel: &CancellationToken,
    ) -> Result<(Box<dyn duskmux_mux::AnyStream>, EntryHandle)> {
        let mut retries = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if retries >= self.config.max_retry {
                return Err(Error::Exhausted { retries });
            }

            let selected = {
                let mut heap = self.heap.lock();
                heap.pop_usable(self.config.max_streams_per_manager).map(|id| {
                    if let Some(slot) = heap.get_mut(id) {
                        slot.active_count += 1;
                    }
                    heap.fix(id);
                    id
                })
            };

            if let Some(id) = selected {
                let manager = {
                    let heap = self.heap.lock();
                    heap.get(id).map(|s| s.manager.clone())
                };
                let Some(manager) = manager else {
                    retries += 1;
                    continue;
                };

                let opened = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(Error::Cancelled),
                    res = open_on(&manager, &data) => res,
                };

                match opened {
                    Ok(stream) => return Ok((stream, EntryHandle(id))),
                    Err(e) => {
                        warn!(error = %e, "open() failed on pooled carrier, marking closed and retrying");
                        self.mark_closed_and_evict(id);
                        manager.close();
                        retries += 1;
                        continue;
                    }
                }
            }

            // No usable entry: dial a fresh carrier outside the lock.
            let dialed = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                res = self.dialer.dial() => res,
            };
            match dialed {
                Ok(manager) => {
                    let opened = tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(Error::Cancelled),
                        res = open_on(&manager, &data) => res,
                    };
                    match opened {
                        Ok(stream) => {
                            let id = self.heap.lock().push(manager, 1);
                            return Ok((stream, EntryHandle(id)));
                        }
                        Err(e) => {
                            warn!(error = %e, "open() failed on freshly dialed carrier");
                            manager.close();
                            retries += 1;
                            continue;
                        }
                    }
                }
                // A non-retryable auth rejection is surfaced immediately as
                // `Error::Dial` (REP=0x03 at the SOCKS front-end), per
                // spec.md §8 scenario 4: exactly the transport's own
                // retry-once has already happened inside `Dialer::dial`;
                // looping here would just repeat the same rejected secret.
                Err(DialFailure::Auth(msg)) => return Err(Error::Dial(msg)),
                Err(DialFailure::Transient(msg)) => {
                    debug!(error = %msg, "carrier dial failed, retrying");
                    retries += 1;
                }
            }
        }
    }

    fn mark_closed_and_evict(&self, id: u64) {
        let mut heap = self.heap.lock();
        if let Some(slot) = heap.get_mut(id) {
            slot.closed = true;
        }
        heap.remove(id);
    }

    /// spec.md §4.5 `release`: decrements `activeCount`, pruning the entry if
    /// its carrier closed meanwhile or if it is now idle and the pool is
    /// above [`CACHE_FLOOR`].
    pub fn release(&self, entry: EntryHandle) {
        let mut heap = self.heap.lock();
        let EntryHandle(id) = entry;
        let Some(slot) = heap.get_mut(id) else { return };

        if slot.manager.is_closed() {
            heap.remove(id);
            return;
        }

        slot.active_count = slot.active_count.saturating_sub(1);
        let idle_and_above_floor = slot.active_count == 0 && heap.len() > self.config.cache_floor;
        if idle_and_above_floor {
            let manager = slot.manager.clone();
            heap.remove(id);
            manager.close();
        } else {
            heap.fix(id);
        }
    }
}

impl<D: Dialer> std::fmt::Debug for Pool<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool").field("size", &self.size()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{SocketAddr, IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicU32, Ordering};
    use duskmux_mux::AnyStream;

    #[derive(Debug)]
    struct FakeStream {
        id: u32,
    }

    #[async_trait]
    impl AnyStream for FakeStream {
        async fn read(&self, _buf: &mut [u8]) -> duskmux_mux::Result<usize> {
            Ok(0)
        }
        async fn write(&self, buf: &[u8]) -> duskmux_mux::Result<usize> {
            Ok(buf.len())
        }
        async fn close_write(&self) -> duskmux_mux::Result<()> {
            Ok(())
        }
        async fn close(&self) -> duskmux_mux::Result<()> {
            Ok(())
        }
        fn local_addr(&self) -> SocketAddr {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
        }
        fn remote_addr(&self) -> SocketAddr {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
        }
    }

    #[derive(Debug)]
    struct FakeManager {
        closed: std::sync::atomic::AtomicBool,
        next_id: AtomicU32,
        opened: AtomicU32,
    }

    impl FakeManager {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                closed: std::sync::atomic::AtomicBool::new(false),
                next_id: AtomicU32::new(1),
                opened: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl AnyManager for FakeManager {
        async fn open(&self) -> duskmux_mux::Result<Box<dyn AnyStream>> {
            if self.closed.load(Ordering::Acquire) {
                return Err(duskmux_mux::Error::ManagerClosed);
            }
            self.opened.fetch_add(1, Ordering::Relaxed);
            Ok(Box::new(FakeStream { id: self.next_id.fetch_add(1, Ordering::Relaxed) }))
        }
        async fn open_with_data(&self, _data: Bytes) -> duskmux_mux::Result<Box<dyn AnyStream>> {
            self.open().await
        }
        async fn accept(&self) -> duskmux_mux::Result<Box<dyn AnyStream>> {
            unimplemented!("not exercised by the pool")
        }
        fn close(&self) {
            self.closed.store(true, Ordering::Release);
        }
        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::Acquire)
        }
        fn active_streams(&self) -> usize {
            self.opened.load(Ordering::Relaxed) as usize
        }
        fn local_addr(&self) -> SocketAddr {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
        }
        fn remote_addr(&self) -> SocketAddr {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
        }
    }

    struct FakeDialer {
        dialed: AtomicU32,
        /// When `true`, every dial fails with a non-retryable auth rejection
        /// instead of succeeding, simulating a persistently wrong TOTP secret.
        always_reject_auth: bool,
    }

    impl FakeDialer {
        fn new() -> Self {
            Self { dialed: AtomicU32::new(0), always_reject_auth: false }
        }
    }

    #[async_trait]
    impl Dialer for FakeDialer {
        async fn dial(&self) -> std::result::Result<Arc<dyn AnyManager>, DialFailure> {
            self.dialed.fetch_add(1, Ordering::Relaxed);
            if self.always_reject_auth {
                return Err(DialFailure::Auth("totp handshake rejected twice in a row".to_string()));
            }
            Ok(FakeManager::new())
        }
    }

    fn no_cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn first_acquire_dials_a_fresh_carrier() {
        let pool = Pool::new(FakeDialer::new());
        let (_stream, entry) = pool.acquire_stream(&no_cancel()).await.expect("acquire");
        assert_eq!(pool.size(), 1);
        pool.release(entry);
    }

    #[tokio::test]
    async fn second_acquire_reuses_the_same_carrier() {
        let pool = Pool::new(FakeDialer::new());
        let (_s1, e1) = pool.acquire_stream(&no_cancel()).await.expect("acquire 1");
        let (_s2, e2) = pool.acquire_stream(&no_cancel()).await.expect("acquire 2");
        assert_eq!(pool.size(), 1, "scenario 2: pool.size()=1 throughout");
        pool.release(e1);
        pool.release(e2);
    }

    #[tokio::test]
    async fn saturated_carrier_forces_expansion() {
        let pool = Pool::with_limits(FakeDialer::new(), 2, MAX_RETRY, CACHE_FLOOR);
        let (_s1, e1) = pool.acquire_stream(&no_cancel()).await.expect("acquire 1");
        let (_s2, e2) = pool.acquire_stream(&no_cancel()).await.expect("acquire 2");
        let (_s3, e3) = pool.acquire_stream(&no_cancel()).await.expect("acquire 3");
        assert_eq!(pool.size(), 2, "scenario 3: MAX_STREAMS_PER_MANAGER=2 forces a second carrier");
        pool.release(e1);
        pool.release(e2);
        pool.release(e3);
    }

    #[tokio::test]
    async fn idle_entry_above_cache_floor_is_pruned_on_release() {
        let pool = Pool::with_limits(FakeDialer::new(), 1, MAX_RETRY, CACHE_FLOOR);
        let (_s1, e1) = pool.acquire_stream(&no_cancel()).await.expect("acquire 1");
        let (_s2, e2) = pool.acquire_stream(&no_cancel()).await.expect("acquire 2");
        assert_eq!(pool.size(), 2);
        pool.release(e1);
        assert_eq!(pool.size(), 1, "idle entry above CACHE_FLOOR=1 is pruned");
        pool.release(e2);
    }

    #[tokio::test]
    async fn closed_manager_is_never_returned_h4() {
        let pool = Pool::new(FakeDialer::new());
        let (_s1, e1) = pool.acquire_stream(&no_cancel()).await.expect("acquire 1");
        // Simulate the carrier dying underneath the pool.
        {
            let heap = pool.heap.lock();
            heap.get(0).expect("entry").manager.close();
        }
        pool.release(e1);
        let (_s2, _e2) = pool.acquire_stream(&no_cancel()).await.expect("acquire 2 dials fresh");
        assert_eq!(pool.size(), 1, "the closed entry was evicted, not reused (H4)");
    }

    #[tokio::test]
    async fn persistent_auth_rejection_fails_fast_as_dial_error() {
        // spec.md §8 scenario 4: a wrong TOTP secret must not burn the pool's
        // MAX_RETRY budget — `acquire_inner` gives up on the first
        // non-retryable `DialFailure::Auth` instead of looping.
        let dialer = FakeDialer { always_reject_auth: true, ..FakeDialer::new() };
        let pool = Pool::new(dialer);
        let err = pool.acquire_stream(&no_cancel()).await.unwrap_err();
        assert!(matches!(err, Error::Dial(_)), "got {err:?}");
        assert_eq!(
            pool.dialer.dialed.load(Ordering::Relaxed),
            1,
            "exactly one dial attempt, not MAX_RETRY"
        );
    }

    #[tokio::test]
    async fn cancelled_token_aborts_acquire_without_dialing() {
        let dialer = FakeDialer::new();
        let pool = Pool::new(dialer);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = pool.acquire_stream(&cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled), "got {err:?}");
        assert_eq!(pool.dialer.dialed.load(Ordering::Relaxed), 0, "cancellation pre-empts the dial");
    }
}
