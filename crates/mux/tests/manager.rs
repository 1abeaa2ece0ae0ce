//! Cross-module behavior: Manager open/accept/close over an in-memory duplex
//! carrier, matching the teacher's `crates/core/tests/hello_world.rs` placement
//! convention for integration tests that exercise more than one module.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use duskmux_mux::{Carrier, Frame, FrameReader, FrameWriter, Manager, Role};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

struct DuplexReader(ReadHalf<DuplexStream>);
struct DuplexWriter(WriteHalf<DuplexStream>);

#[async_trait]
impl FrameReader for DuplexReader {
    async fn read_frame(&mut self) -> duskmux_mux::Result<Frame> {
        let mut header = [0u8; 7];
        self.0.read_exact(&mut header).await.map_err(duskmux_mux::Error::Io)?;
        let length = u16::from_le_bytes([header[5], header[6]]) as usize;
        let mut buf = BytesMut::with_capacity(7 + length);
        buf.extend_from_slice(&header);
        if length > 0 {
            let mut payload = vec![0u8; length];
            self.0.read_exact(&mut payload).await.map_err(duskmux_mux::Error::Io)?;
            buf.extend_from_slice(&payload);
        }
        Frame::decode(&mut buf)
    }
}

#[async_trait]
impl FrameWriter for DuplexWriter {
    async fn write_frame(&mut self, frame: Frame) -> duskmux_mux::Result<()> {
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        self.0.write_all(&buf).await.map_err(duskmux_mux::Error::Io)?;
        Ok(())
    }

    async fn close(&mut self) -> duskmux_mux::Result<()> {
        let _ = self.0.shutdown().await;
        Ok(())
    }
}

struct DuplexCarrier {
    stream: DuplexStream,
    local: SocketAddr,
    remote: SocketAddr,
}

impl Carrier for DuplexCarrier {
    fn split(self: Box<Self>) -> (Box<dyn FrameReader>, Box<dyn FrameWriter>) {
        let (r, w) = tokio::io::split(self.stream);
        (Box::new(DuplexReader(r)), Box::new(DuplexWriter(w)))
    }

    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

fn manager_pair() -> (Manager, Manager) {
    let (a, b) = tokio::io::duplex(1024 * 1024);
    let client_addr: SocketAddr = "127.0.0.1:10800".parse().expect("valid addr");
    let server_addr: SocketAddr = "127.0.0.1:8443".parse().expect("valid addr");
    let client = Manager::spawn(
        Box::new(DuplexCarrier { stream: a, local: client_addr, remote: server_addr }),
        Role::Client,
    );
    let server = Manager::spawn(
        Box::new(DuplexCarrier { stream: b, local: server_addr, remote: client_addr }),
        Role::Server,
    );
    (client, server)
}

#[tokio::test]
async fn open_accept_and_echo_data() {
    let (client, server) = manager_pair();

    let accept_server = server.clone();
    let acceptor = tokio::spawn(async move { accept_server.accept().await.expect("accept") });

    let stream = client.open().await.expect("open");
    assert_eq!(stream.stream_id(), 1, "client stream ids are odd, starting at 1");

    let accepted = acceptor.await.expect("join");
    assert_eq!(accepted.stream_id(), 1);

    stream.write(b"hello mux").await.expect("write");
    let mut buf = [0u8; 64];
    let n = accepted.read(&mut buf).await.expect("read");
    assert_eq!(&buf[..n], b"hello mux");

    stream.close().await.expect("close");
    client.close();
    server.close();
}

#[tokio::test]
async fn open_with_data_delivers_predata_with_open() {
    let (client, server) = manager_pair();
    let accept_server = server.clone();
    let acceptor = tokio::spawn(async move { accept_server.accept().await.expect("accept") });

    let stream = client
        .open_with_data(Bytes::from_static(b"\x03\x0bexample.com\x00\x50"))
        .await
        .expect("open_with_data");

    let accepted = acceptor.await.expect("join");
    let mut buf = [0u8; 32];
    let n = accepted.read(&mut buf).await.expect("read predata");
    assert_eq!(&buf[..n], b"\x03\x0bexample.com\x00\x50");

    stream.close().await.expect("close");
    client.close();
    server.close();
}

#[tokio::test]
async fn half_close_lets_reverse_direction_keep_flowing() {
    let (client, server) = manager_pair();
    let accept_server = server.clone();
    let acceptor = tokio::spawn(async move { accept_server.accept().await.expect("accept") });

    let stream = client.open().await.expect("open");
    let accepted = acceptor.await.expect("join");

    stream.write(b"last words").await.expect("write");
    stream.close_write().await.expect("close_write");

    let mut buf = [0u8; 32];
    let n = accepted.read(&mut buf).await.expect("read before eof");
    assert_eq!(&buf[..n], b"last words");
    let n = accepted.read(&mut buf).await.expect("eof");
    assert_eq!(n, 0, "reader observes EOF after peer CLOSE_WRITE drains");

    // Reverse direction still flows: the accepted side only saw the client
    // half-close its write side, not both.
    accepted.write(b"reply").await.expect("reverse write");
    let n = stream.read(&mut buf).await.expect("client reads reply");
    assert_eq!(&buf[..n], b"reply");

    stream.close().await.expect("close");
    accepted.close().await.expect("close");
    client.close();
    server.close();
}

#[tokio::test]
async fn no_stream_leak_after_mutual_close() {
    let (client, server) = manager_pair();
    let accept_server = server.clone();
    let acceptor = tokio::spawn(async move { accept_server.accept().await.expect("accept") });

    let stream = client.open().await.expect("open");
    let accepted = acceptor.await.expect("join");

    stream.close().await.expect("close");
    accepted.close().await.expect("close");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.active_streams(), 0);
    assert_eq!(server.active_streams(), 0);

    client.close();
    server.close();
}

#[tokio::test]
async fn manager_close_wakes_pending_operations() {
    let (client, server) = manager_pair();
    client.close();

    let err = client.open().await.expect_err("closed manager rejects open");
    assert!(matches!(err, duskmux_mux::Error::ManagerClosed));
    assert!(client.is_closed());
    server.close();
}
