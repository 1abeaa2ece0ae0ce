//! The capability set a byte-stream carrier exposes to a [`crate::manager::Manager`].
//!
//! A carrier is split into an owned reader half and an owned writer half so
//! that the Manager's reader task and writer task can each hold exclusive,
//! non-overlapping access to the transport, per the one-reader/one-writer
//! invariant.

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::error::Result;
use crate::frame::Frame;

/// The read half of a carrier. Exactly one task ever calls `read_frame`.
#[async_trait]
pub trait FrameReader: Send + 'static {
    async fn read_frame(&mut self) -> Result<Frame>;
}

/// The write half of a carrier. Exactly one task ever calls `write_frame`.
#[async_trait]
pub trait FrameWriter: Send + 'static {
    async fn write_frame(&mut self, frame: Frame) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// A reliable, bidirectional, frame-oriented transport: WebSocket-over-TLS or
/// a length-prefixed byte stream. Owned exclusively by one Manager for its
/// whole lifetime.
pub trait Carrier: Send + 'static {
    fn split(self: Box<Self>) -> (Box<dyn FrameReader>, Box<dyn FrameWriter>);
    fn local_addr(&self) -> SocketAddr;
    fn remote_addr(&self) -> SocketAddr;
}
