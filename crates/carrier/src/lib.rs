//! Carrier (C): adapters wrapping a WebSocket-over-TLS connection, or a QUIC
//! session, as the byte-frame transport [`duskmux_mux::Manager`] consumes.
//! See spec.md §4.4.

pub mod quic;
pub mod tls;
pub mod websocket;

pub use websocket::WsCarrier;
