//! Server-side QUIC accept loop: one [`duskmux_carrier::quic::QuicCarrier`]
//! per incoming connection, each driven by its own TOTP handshake and
//! dispatcher loop. See spec.md §4.4/§4.7/§4.9.

use std::net::SocketAddr;
use std::sync::Arc;

use duskmux_carrier::quic;
use duskmux_mux::AnyManager;
use quinn::Endpoint;
use tracing::{debug, warn};

use crate::auth;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::registry::ManagerRegistry;

/// Binds the QUIC endpoint and runs the accept loop forever, spawning one
/// task per connection. Each connection gets its own handshake and its own
/// dispatch loop; a rejected handshake never affects another connection.
pub async fn serve(
    bind_addr: SocketAddr,
    server_config: quinn::ServerConfig,
    verifier: duskmux_totp::Verifier,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<ManagerRegistry>,
) -> Result<()> {
    let endpoint = Endpoint::server(server_config, bind_addr)?;

    while let Some(incoming) = endpoint.accept().await {
        let endpoint = endpoint.clone();
        let verifier = verifier.clone();
        let dispatcher = dispatcher.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            let connection = match incoming.await {
                Ok(conn) => conn,
                Err(e) => {
                    debug!(error = %e, "quic handshake failed");
                    return;
                }
            };
            let verify = auth::quic_verify(verifier);
            match quic::accept_with_auth(connection, endpoint, verify).await {
                Ok(carrier) => serve_connection(carrier, dispatcher, registry).await,
                Err(e) => warn!(error = %e, "quic carrier rejected during totp handshake"),
            }
        });
    }
    Ok(())
}

async fn serve_connection(carrier: quic::QuicCarrier, dispatcher: Arc<Dispatcher>, registry: Arc<ManagerRegistry>) {
    let carrier: Arc<dyn AnyManager> = Arc::new(carrier);
    let manager_id = registry.register(carrier.clone());
    loop {
        match carrier.accept().await {
            Ok(sub_stream) => {
                let dispatcher = dispatcher.clone();
                let sub_stream: Arc<dyn duskmux_mux::AnyStream> = Arc::from(sub_stream);
                tokio::spawn(async move { dispatcher.dispatch(sub_stream).await });
            }
            Err(_closed) => {
                registry.unregister(manager_id);
                return;
            }
        }
    }
}
