//! Wraps the HTTP router's already-upgraded `salvo_extra::websocket::WebSocket`
//! as a [`duskmux_mux::Carrier`], so the server side of a WebSocket connection
//! is driven by the same `Manager` engine as the client. See spec.md §4.4/§4.8.

use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::BytesMut;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use salvo_extra::websocket::{Message, WebSocket};

use duskmux_mux::{Carrier, Error as MuxError, Frame, FrameReader, FrameWriter, Result as MuxResult};

/// The accepted side of a WebSocket upgrade, paired with the addresses the
/// HTTP router observed on the originating [`salvo_core::Request`] (the
/// upgraded socket itself no longer exposes them once wrapped).
pub struct ServerWsCarrier {
    socket: WebSocket,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
}

impl ServerWsCarrier {
    pub fn new(socket: WebSocket, local_addr: SocketAddr, remote_addr: SocketAddr) -> Self {
        Self { socket, local_addr, remote_addr }
    }
}

impl Carrier for ServerWsCarrier {
    fn split(self: Box<Self>) -> (Box<dyn FrameReader>, Box<dyn FrameWriter>) {
        let (sink, stream) = self.socket.split();
        (Box::new(ServerWsReader { stream }), Box::new(ServerWsWriter { sink }))
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

struct ServerWsReader {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl FrameReader for ServerWsReader {
    async fn read_frame(&mut self) -> MuxResult<Frame> {
        loop {
            match self.stream.next().await {
                Some(Ok(msg)) if msg.is_binary() => {
                    let mut buf = BytesMut::from(msg.as_bytes());
                    return Frame::decode(&mut buf);
                }
                Some(Ok(msg)) if msg.is_close() => {
                    return Err(MuxError::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "websocket closed")));
                }
                Some(Ok(_non_binary)) => continue, // ping/pong/text handled by tungstenite itself
                Some(Err(e)) => return Err(MuxError::Io(std::io::Error::other(e.to_string()))),
                None => return Err(MuxError::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "websocket closed"))),
            }
        }
    }
}

struct ServerWsWriter {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl FrameWriter for ServerWsWriter {
    async fn write_frame(&mut self, frame: Frame) -> MuxResult<()> {
        let encoded = frame.encoded();
        self.sink
            .send(Message::binary(encoded.to_vec()))
            .await
            .map_err(|e| MuxError::Io(std::io::Error::other(e.to_string())))
    }

    async fn close(&mut self) -> MuxResult<()> {
        self.sink
            .send(Message::close())
            .await
            .map_err(|e| MuxError::Io(std::io::Error::other(e.to_string())))
    }
}
