//! SOCKS5 Front-End (K): the client-side local listener that speaks SOCKS5
//! CONNECT and splices accepted sockets onto sub-streams pulled from the
//! carrier pool. See spec.md §4.6.

pub mod error;
pub mod front_end;
pub mod splice;
pub mod wire;

pub use error::{Error, Result};
pub use front_end::{serve, DEFAULT_HANDSHAKE_TIMEOUT};
pub use wire::{Destination, Reply};
