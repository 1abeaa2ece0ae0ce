//! Frame codec, mux engine and sub-stream abstraction for duskmux.
//!
//! A [`Manager`] owns one [`Carrier`] — a reliable byte-stream transport
//! (WebSocket-over-TLS or QUIC) — and multiplexes many logical
//! [`SubStream`]s over it, each a bidirectional byte-stream with flow
//! control and half-close. See `SPEC_FULL.md` §4.1-§4.3 for the protocol.

pub mod any;
pub mod carrier;
pub mod error;
pub mod frame;
pub mod manager;
pub mod stream;

pub use any::{AnyManager, AnyStream};
pub use carrier::{Carrier, FrameReader, FrameWriter};
pub use error::{Error, Result};
pub use frame::{Frame, Kind, INITIAL_WINDOW, MAX_PAYLOAD};
pub use manager::{Manager, Role};
pub use stream::SubStream;
