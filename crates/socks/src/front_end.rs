//! SOCKS5 Front-End (K): accepts local TCP connections, parses the greeting
//! and CONNECT request, acquires a sub-stream from the client [`Pool`], and
//! splices bytes between the two. See spec.md §4.6.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use duskmux_pool::{Dialer, Pool};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Result;
use crate::splice::splice;
use crate::wire::{self, Reply};

/// Bounds the greeting+request read, distinct from the carrier/open timeout,
/// per the SUPPLEMENT note in `SPEC_FULL.md` §4.6 (guards against a
/// slow-loris client pinning an acceptor task forever).
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs the SOCKS5 accept loop on `listener` forever, spawning one task per
/// connection. `pool` is shared across every connection (spec.md scenario 2:
/// concurrent SOCKS connections share carriers through the same pool).
pub async fn serve<D: Dialer>(listener: TcpListener, pool: Arc<Pool<D>>, handshake_timeout: Duration) -> ! {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                let pool = pool.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(socket, peer, &pool, handshake_timeout).await {
                        debug!(peer = %peer, error = %e, "socks connection ended with an error");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "socks accept failed");
            }
        }
    }
}

async fn handle_connection<D: Dialer>(
    mut socket: TcpStream,
    peer: SocketAddr,
    pool: &Pool<D>,
    handshake_timeout: Duration,
) -> Result<()> {
    let bound = socket.local_addr()?;

    let handshake = async {
        if !wire::read_greeting(&mut socket).await? {
            return Ok(None);
        }
        match wire::read_request(&mut socket).await {
            Ok(dest) => Ok(Some(dest)),
            Err(e) => Err(e),
        }
    };

    let destination = match tokio::time::timeout(handshake_timeout, handshake).await {
        Ok(Ok(Some(dest))) => dest,
        Ok(Ok(None)) => return Ok(()), // no acceptable auth method; socket already closed by the reply
        Ok(Err(crate::error::Error::CommandUnsupported)) => {
            wire::write_reply(&mut socket, Reply::CommandNotSupported, bound).await?;
            return Ok(());
        }
        Ok(Err(e)) => return Err(e),
        Err(_elapsed) => {
            debug!(peer = %peer, "socks handshake timed out");
            return Ok(());
        }
    };

    let cancel = CancellationToken::new();
    match pool.acquire_stream_with_data(destination.as_bytes(), &cancel).await {
        Ok((stream, entry)) => {
            wire::write_reply(&mut socket, Reply::Success, bound).await?;
            splice(socket, Arc::from(stream)).await;
            pool.release(entry);
            Ok(())
        }
        Err(e) => {
            let rep = reply_for_pool_error(&e);
            let _ = wire::write_reply(&mut socket, rep, bound).await;
            Err(e.into())
        }
    }
}

fn reply_for_pool_error(e: &duskmux_pool::Error) -> Reply {
    match e {
        duskmux_pool::Error::Exhausted { .. } => Reply::GeneralFailure,
        duskmux_pool::Error::Cancelled => Reply::TtlExpired,
        duskmux_pool::Error::Dial(_) => Reply::NetworkUnreachable,
    }
}
