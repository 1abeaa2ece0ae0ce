use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("socks protocol error: {0}")]
    Protocol(String),

    /// `CMD` other than `0x01` (CONNECT); spec.md §1 Non-goals excludes
    /// BIND and UDP ASSOCIATE.
    #[error("socks command not supported")]
    CommandUnsupported,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pool error: {0}")]
    Pool(#[from] duskmux_pool::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
