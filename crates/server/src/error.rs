use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls configuration: {0}")]
    Tls(#[from] duskmux_carrier::tls::Error),

    #[error("quic carrier: {0}")]
    Quic(#[from] duskmux_carrier::quic::Error),

    #[error("dns resolution failed for {host}: {source}")]
    Dns { host: String, source: hickory_resolver::ResolveError },

    #[error("host {0} resolved to no usable address")]
    NoAddress(String),

    #[error("malformed destination bytes: {0}")]
    Destination(String),
}

pub type Result<T> = std::result::Result<T, Error>;
