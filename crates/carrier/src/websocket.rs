//! Client-side WebSocket-over-TLS carrier: dials `wss://host/path` with a
//! `totp-code` upgrade header and exposes the resulting binary-message
//! stream as a [`duskmux_mux::Carrier`], one mux frame per WebSocket message,
//! per spec.md §4.4/§6.
//!
//! The server-side terminator lives in `duskmux-server`, which already holds
//! a `salvo_core::Request`/TLS listener; this module only needs the half of
//! the handshake the client drives.

use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};

use duskmux_mux::{Carrier, Error as MuxError, Frame, FrameReader, FrameWriter, Result as MuxResult};

use crate::tls;

#[derive(Debug, Error)]
pub enum Error {
    #[error("tls configuration: {0}")]
    Tls(#[from] tls::Error),
    #[error("invalid websocket url: {0}")]
    Url(String),
    #[error("websocket handshake failed: {0}")]
    Handshake(String),
    #[error("websocket handshake rejected: 403 Forbidden (bad TOTP code)")]
    Forbidden,
}

pub type Result<T> = std::result::Result<T, Error>;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Dials `wss://host[:port]/path`, attaching the current TOTP code as the
/// `totp-code` upgrade header. On `403 Forbidden` the caller (the pool's
/// dialer) is expected to regenerate a code and retry once, per spec.md §4.7.
pub async fn dial(host: &str, path: &str, totp_code: &str, custom_ca_pem: Option<&[u8]>) -> Result<WsCarrier> {
    let url = format!("wss://{host}{}{path}", if path.starts_with('/') { "" } else { "/" });
    let mut request = url
        .clone()
        .into_client_request()
        .map_err(|e| Error::Url(format!("{url}: {e}")))?;
    request
        .headers_mut()
        .insert("totp-code", HeaderValue::from_str(totp_code).map_err(|e| Error::Url(e.to_string()))?);

    let client_config = tls::client_config(custom_ca_pem, &[b"http/1.1"])?;
    let connector = Connector::Rustls(client_config);

    let (stream, response) =
        tokio_tungstenite::connect_async_tls_with_config(request, None, false, Some(connector))
            .await
            .map_err(|e| match &e {
                tokio_tungstenite::tungstenite::Error::Http(resp) if resp.status().as_u16() == 403 => {
                    Error::Forbidden
                }
                other => Error::Handshake(other.to_string()),
            })?;

    if response.status().as_u16() == 403 {
        return Err(Error::Forbidden);
    }

    let local_addr = match stream.get_ref() {
        MaybeTlsStream::Plain(s) => s.local_addr(),
        MaybeTlsStream::Rustls(s) => s.get_ref().0.local_addr(),
        _ => Err(std::io::Error::other("unsupported stream variant")),
    }
    .map_err(|e| Error::Handshake(e.to_string()))?;
    let remote_addr = match stream.get_ref() {
        MaybeTlsStream::Plain(s) => s.peer_addr(),
        MaybeTlsStream::Rustls(s) => s.get_ref().0.peer_addr(),
        _ => Err(std::io::Error::other("unsupported stream variant")),
    }
    .map_err(|e| Error::Handshake(e.to_string()))?;

    Ok(WsCarrier { stream, local_addr, remote_addr })
}

/// A dialed client-side WebSocket carrier, ready to hand to
/// [`duskmux_mux::Manager::spawn`].
pub struct WsCarrier {
    stream: WsStream,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
}

impl Carrier for WsCarrier {
    fn split(self: Box<Self>) -> (Box<dyn FrameReader>, Box<dyn FrameWriter>) {
        let (sink, stream) = self.stream.split();
        (Box::new(WsFrameReader { stream }), Box::new(WsFrameWriter { sink }))
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

struct WsFrameReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameReader for WsFrameReader {
    async fn read_frame(&mut self) -> MuxResult<Frame> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => {
                    let mut buf = BytesMut::from(&data[..]);
                    return Frame::decode(&mut buf);
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(MuxError::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "websocket closed")));
                }
                Some(Ok(_non_binary)) => continue, // ping/pong/text are handled by tungstenite itself
                Some(Err(e)) => return Err(MuxError::Io(std::io::Error::other(e.to_string()))),
            }
        }
    }
}

struct WsFrameWriter {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameWriter for WsFrameWriter {
    async fn write_frame(&mut self, frame: Frame) -> MuxResult<()> {
        let encoded: Bytes = frame.encoded();
        self.sink
            .send(Message::Binary(encoded.to_vec().into()))
            .await
            .map_err(|e| MuxError::Io(std::io::Error::other(e.to_string())))
    }

    async fn close(&mut self) -> MuxResult<()> {
        self.sink.close().await.map_err(|e| MuxError::Io(std::io::Error::other(e.to_string())))
    }
}
