//! The remote endpoint of a duskmux tunnel: the HTTP Router (R), the Auth
//! Gate (A), the Dispatcher (D), and the QUIC accept loop. See spec.md §4.7,
//! §4.8, §4.9.

pub mod auth;
pub mod dispatcher;
pub mod error;
pub mod quic_listener;
pub mod registry;
pub mod router;
pub mod ws_carrier;

pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use registry::ManagerRegistry;
pub use router::{build as build_router, ReverseProxyConfig, RouterConfig, WebConfig};
