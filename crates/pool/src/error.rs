use thiserror::Error;

/// Pool-level failures, surfaced by `socks::front_end::reply_for_pool_error`
/// as the corresponding SOCKS5 `REP` code (spec.md §7/§8).
#[derive(Debug, Error)]
pub enum Error {
    /// `acquireStream` ran out of retries (`MAX_RETRY`) without producing a
    /// usable sub-stream. Maps to `REP=0x01` (general failure).
    #[error("pool exhausted after {retries} attempts")]
    Exhausted { retries: u32 },

    /// The caller's cancellation handle (`cancel: &CancellationToken`) fired
    /// before a sub-stream could be produced. Maps to `REP=0x06` (TTL
    /// expired).
    #[error("acquireStream cancelled")]
    Cancelled,

    /// A non-retryable dial failure: either the carrier's transport-level
    /// dial itself failed, or (spec.md §8 scenario 4) the carrier's auth
    /// gate rejected the handshake after its own single retry and
    /// `acquireStream` gave up immediately rather than spending the pool's
    /// own `MAX_RETRY` budget on a secret that will not start working. Maps
    /// to `REP=0x03` (network unreachable).
    #[error("carrier dial failed: {0}")]
    Dial(String),
}

pub type Result<T> = std::result::Result<T, Error>;
