//! Links an accepted SOCKS `TcpStream` to a pooled [`AnyStream`] with two
//! concurrent unidirectional copies, half-closing each side in turn as its
//! peer finishes. See spec.md §4.6.

use std::sync::Arc;

use duskmux_mux::AnyStream;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

const COPY_BUFFER: usize = 16 * 1024;

/// Runs until both directions have drained, then closes both ends. Matches
/// scenario 6 in spec.md §8: exactly one `CLOSE_WRITE` is observed per
/// direction and the reverse direction keeps flowing after only one side
/// half-closes.
pub async fn splice(socket: TcpStream, sub_stream: Arc<dyn AnyStream>) {
    let (socket_read, socket_write) = tokio::io::split(socket);

    let upload = tokio::spawn(copy_socket_to_stream(socket_read, sub_stream.clone()));
    let download = tokio::spawn(copy_stream_to_socket(sub_stream.clone(), socket_write));

    let _ = tokio::join!(upload, download);
    let _ = sub_stream.close().await;
}

async fn copy_socket_to_stream(mut socket_read: ReadHalf<TcpStream>, sub_stream: Arc<dyn AnyStream>) {
    let mut buf = vec![0u8; COPY_BUFFER];
    loop {
        match socket_read.read(&mut buf).await {
            Ok(0) => {
                let _ = sub_stream.close_write().await;
                return;
            }
            Ok(n) => {
                let mut written = 0;
                while written < n {
                    match sub_stream.write(&buf[written..n]).await {
                        Ok(0) => return,
                        Ok(w) => written += w,
                        Err(e) => {
                            debug!(error = %e, "socks upload: sub-stream write failed");
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, "socks upload: socket read failed");
                let _ = sub_stream.close_write().await;
                return;
            }
        }
    }
}

async fn copy_stream_to_socket(sub_stream: Arc<dyn AnyStream>, mut socket_write: WriteHalf<TcpStream>) {
    let mut buf = vec![0u8; COPY_BUFFER];
    loop {
        match sub_stream.read(&mut buf).await {
            Ok(0) => {
                let _ = socket_write.shutdown().await;
                return;
            }
            Ok(n) => {
                if socket_write.write_all(&buf[..n]).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!(error = %e, "socks download: sub-stream read failed");
                let _ = socket_write.shutdown().await;
                return;
            }
        }
    }
}
