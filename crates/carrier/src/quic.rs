//! QUIC carrier: a single `quinn` connection per [`duskmux_mux::Manager`]-like
//! entity. Per the Open Question resolution in spec.md §9/§4.4, this carrier
//! bypasses the mux frame layer entirely: each native QUIC bidirectional
//! stream is exposed directly as an [`AnyStream`], and `open`/`accept`/`close`
//! are implemented straight against the `quinn::Connection`.
//!
//! The TOTP handshake (§4.7) rides its own dedicated bidirectional stream,
//! opened by the client immediately after the connection completes and
//! answered by the server before any other stream is accepted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use quinn::{ClientConfig, Connection, Endpoint, RecvStream, SendStream, ServerConfig};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use duskmux_mux::{AnyManager, AnyStream, Error as MuxError, Result as MuxResult};

use crate::tls;

/// Clean-close application error code, carried forward from
/// `original_source/session/quic/proto.go`'s `ErrorNoError`.
pub const ERROR_NO_ERROR: u32 = 0x100;

const HANDSHAKE_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum Error {
    #[error("tls configuration: {0}")]
    Tls(#[from] tls::Error),
    #[error("quic connect failed: {0}")]
    Connect(#[from] quinn::ConnectError),
    #[error("quic connection failed: {0}")]
    Connection(#[from] quinn::ConnectionError),
    #[error("quic endpoint io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("totp handshake rejected by server")]
    AuthRejected,
    #[error("totp handshake timed out")]
    HandshakeTimeout,
    #[error("totp code too long to fit the 1-byte length prefix")]
    CodeTooLong,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Dials the server's QUIC endpoint and completes the TOTP handshake stream
/// before returning. `totp_code` is the already-generated current code.
pub async fn dial(host: &str, totp_code: &str, custom_ca_pem: Option<&[u8]>) -> Result<QuicCarrier> {
    let remote: SocketAddr = tokio::net::lookup_host(host)
        .await?
        .next()
        .ok_or_else(|| Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "host did not resolve")))?;
    let server_name = host.rsplit_once(':').map_or(host, |(h, _)| h).to_string();

    let client_crypto = tls::client_config(custom_ca_pem, &[tls::ALPN_QUIC])?;
    let client_config = ClientConfig::new(Arc::new(
        quinn::crypto::rustls::QuicClientConfig::try_from((*client_crypto).clone())
            .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?,
    ));

    let bind_addr: SocketAddr = if remote.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" }.parse().expect("valid wildcard addr");
    let mut endpoint = Endpoint::client(bind_addr)?;
    endpoint.set_default_client_config(client_config);

    let connection = endpoint.connect(remote, &server_name)?.await?;

    let (mut send, mut recv) = tokio::time::timeout(HANDSHAKE_DEADLINE, connection.open_bi())
        .await
        .map_err(|_| Error::HandshakeTimeout)??;

    let code_bytes = totp_code.as_bytes();
    if code_bytes.len() > u8::MAX as usize {
        return Err(Error::CodeTooLong);
    }
    let mut payload = Vec::with_capacity(1 + code_bytes.len());
    payload.push(code_bytes.len() as u8);
    payload.extend_from_slice(code_bytes);
    tokio::time::timeout(HANDSHAKE_DEADLINE, send.write_all(&payload))
        .await
        .map_err(|_| Error::HandshakeTimeout)??;

    let mut reply = [0u8; 1];
    tokio::time::timeout(HANDSHAKE_DEADLINE, recv.read_exact(&mut reply))
        .await
        .map_err(|_| Error::HandshakeTimeout)??;
    if reply[0] != 0x01 {
        connection.close(ERROR_NO_ERROR.into(), b"auth rejected");
        return Err(Error::AuthRejected);
    }

    Ok(QuicCarrier::new(endpoint, connection))
}

/// Server-side counterpart: reads the handshake stream's `len|code` payload
/// and hands it to `verify`, replying `0x01`/`0x02` and closing the
/// connection with [`ERROR_NO_ERROR`] on rejection. Returns the verified
/// [`QuicCarrier`] on success.
pub async fn accept_with_auth<F>(connection: Connection, endpoint: Endpoint, verify: F) -> Result<QuicCarrier>
where
    F: FnOnce(&str) -> bool,
{
    let (mut send, mut recv) = tokio::time::timeout(HANDSHAKE_DEADLINE, connection.accept_bi())
        .await
        .map_err(|_| Error::HandshakeTimeout)??;

    let mut len_buf = [0u8; 1];
    tokio::time::timeout(HANDSHAKE_DEADLINE, recv.read_exact(&mut len_buf))
        .await
        .map_err(|_| Error::HandshakeTimeout)??;
    let mut code_buf = vec![0u8; len_buf[0] as usize];
    tokio::time::timeout(HANDSHAKE_DEADLINE, recv.read_exact(&mut code_buf))
        .await
        .map_err(|_| Error::HandshakeTimeout)??;
    let code = String::from_utf8_lossy(&code_buf);

    if verify(&code) {
        send.write_all(&[0x01]).await?;
        Ok(QuicCarrier::new(endpoint, connection))
    } else {
        let _ = send.write_all(&[0x02]).await;
        connection.close(ERROR_NO_ERROR.into(), b"auth rejected");
        Err(Error::AuthRejected)
    }
}

/// Builds the `quinn::ServerConfig` for the QUIC listener (ALPN `quic`).
pub fn server_config(cert_pem: &[u8], key_pem: &[u8]) -> Result<ServerConfig> {
    let rustls_config = tls::server_config(cert_pem, key_pem, &[tls::ALPN_QUIC])?;
    let crypto = quinn::crypto::rustls::QuicServerConfig::try_from((*rustls_config).clone())
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
    Ok(ServerConfig::with_crypto(Arc::new(crypto)))
}

/// A live QUIC connection, exposed as an [`AnyManager`]. The `endpoint` is
/// kept alive alongside the connection so a client-side carrier does not
/// tear down its local UDP socket while in use; server-side carriers are
/// constructed with a clone of the listener's shared endpoint.
#[derive(Debug)]
pub struct QuicCarrier {
    _endpoint: Endpoint,
    connection: Connection,
    active: Arc<AtomicUsize>,
}

impl QuicCarrier {
    fn new(endpoint: Endpoint, connection: Connection) -> Self {
        Self { _endpoint: endpoint, connection, active: Arc::new(AtomicUsize::new(0)) }
    }
}

#[async_trait]
impl AnyManager for QuicCarrier {
    async fn open(&self) -> MuxResult<Box<dyn AnyStream>> {
        let (send, recv) = self.connection.open_bi().await.map_err(quic_to_mux)?;
        self.active.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(QuicStream::new(send, recv, self.local_addr(), self.remote_addr(), self.active.clone())))
    }

    async fn open_with_data(&self, data: Bytes) -> MuxResult<Box<dyn AnyStream>> {
        let (mut send, recv) = self.connection.open_bi().await.map_err(quic_to_mux)?;
        send.write_all(&data).await.map_err(|e| MuxError::Io(std::io::Error::other(e.to_string())))?;
        self.active.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(QuicStream::new(send, recv, self.local_addr(), self.remote_addr(), self.active.clone())))
    }

    async fn accept(&self) -> MuxResult<Box<dyn AnyStream>> {
        let (send, recv) = self.connection.accept_bi().await.map_err(quic_to_mux)?;
        self.active.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(QuicStream::new(send, recv, self.local_addr(), self.remote_addr(), self.active.clone())))
    }

    fn close(&self) {
        self.connection.close(ERROR_NO_ERROR.into(), b"");
    }

    fn is_closed(&self) -> bool {
        self.connection.close_reason().is_some()
    }

    fn active_streams(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    fn local_addr(&self) -> SocketAddr {
        self._endpoint.local_addr().unwrap_or_else(|_| "0.0.0.0:0".parse().expect("valid fallback addr"))
    }

    fn remote_addr(&self) -> SocketAddr {
        self.connection.remote_address()
    }
}

fn quic_to_mux(e: quinn::ConnectionError) -> MuxError {
    MuxError::Io(std::io::Error::other(e.to_string()))
}

/// A native QUIC bidirectional stream, mapped straight onto [`AnyStream`]
/// without going through the mux frame codec.
#[derive(Debug)]
struct QuicStream {
    send: tokio::sync::Mutex<SendStream>,
    recv: tokio::sync::Mutex<RecvStream>,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    active: Arc<AtomicUsize>,
}

impl QuicStream {
    fn new(send: SendStream, recv: RecvStream, local_addr: SocketAddr, remote_addr: SocketAddr, active: Arc<AtomicUsize>) -> Self {
        Self {
            send: tokio::sync::Mutex::new(send),
            recv: tokio::sync::Mutex::new(recv),
            local_addr,
            remote_addr,
            active,
        }
    }
}

#[async_trait]
impl AnyStream for QuicStream {
    async fn read(&self, buf: &mut [u8]) -> MuxResult<usize> {
        let mut recv = self.recv.lock().await;
        match recv.read(buf).await {
            Ok(Some(n)) => Ok(n),
            Ok(None) => Ok(0), // peer finished its write side: EOF
            Err(e) => Err(MuxError::Io(std::io::Error::other(e.to_string()))),
        }
    }

    async fn write(&self, buf: &[u8]) -> MuxResult<usize> {
        let mut send = self.send.lock().await;
        send.write(buf).await.map_err(|e| MuxError::Io(std::io::Error::other(e.to_string())))
    }

    async fn close_write(&self) -> MuxResult<()> {
        let mut send = self.send.lock().await;
        send.finish().map_err(|e| MuxError::Io(std::io::Error::other(e.to_string())))
    }

    async fn close(&self) -> MuxResult<()> {
        let _ = self.close_write().await;
        self.active.fetch_sub(1, Ordering::AcqRel);
        Ok(())
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}
