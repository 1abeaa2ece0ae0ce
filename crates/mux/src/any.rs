//! Object-safe front for [`Manager`]/[`SubStream`], so that callers (the
//! pool, the SOCKS front-end, the dispatcher) can hold either the
//! frame-multiplexed WebSocket carrier or the QUIC carrier's
//! stream-per-substream mapping behind one type.
//!
//! QUIC elides the OPEN/ACK/WINDOW_UPDATE dance entirely (see
//! `SPEC_FULL.md` §9) and maps a native bidirectional QUIC stream straight
//! onto [`AnyStream`], so `duskmux-carrier` implements these traits itself
//! for its QUIC adapter rather than going through [`Manager`].

use std::fmt;
use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::manager::Manager;
use crate::stream::SubStream;

/// A bidirectional byte stream with half-close, regardless of which carrier
/// produced it.
#[async_trait]
pub trait AnyStream: Send + Sync + fmt::Debug {
    async fn read(&self, buf: &mut [u8]) -> Result<usize>;
    async fn write(&self, buf: &[u8]) -> Result<usize>;
    async fn close_write(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;
    fn local_addr(&self) -> SocketAddr;
    fn remote_addr(&self) -> SocketAddr;
}

#[async_trait]
impl AnyStream for SubStream {
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        SubStream::read(self, buf).await
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        SubStream::write(self, buf).await
    }

    async fn close_write(&self) -> Result<()> {
        SubStream::close_write(self).await
    }

    async fn close(&self) -> Result<()> {
        SubStream::close(self).await
    }

    fn local_addr(&self) -> SocketAddr {
        SubStream::local_addr(self)
    }

    fn remote_addr(&self) -> SocketAddr {
        SubStream::remote_addr(self)
    }
}

/// A live carrier connection capable of opening and accepting [`AnyStream`]s.
#[async_trait]
pub trait AnyManager: Send + Sync + fmt::Debug {
    async fn open(&self) -> Result<Box<dyn AnyStream>>;
    async fn open_with_data(&self, data: Bytes) -> Result<Box<dyn AnyStream>>;
    async fn accept(&self) -> Result<Box<dyn AnyStream>>;
    fn close(&self);
    fn is_closed(&self) -> bool;
    fn active_streams(&self) -> usize;
    fn local_addr(&self) -> SocketAddr;
    fn remote_addr(&self) -> SocketAddr;
}

#[async_trait]
impl AnyManager for Manager {
    async fn open(&self) -> Result<Box<dyn AnyStream>> {
        Ok(Box::new(Manager::open(self).await?))
    }

    async fn open_with_data(&self, data: Bytes) -> Result<Box<dyn AnyStream>> {
        Ok(Box::new(Manager::open_with_data(self, data).await?))
    }

    async fn accept(&self) -> Result<Box<dyn AnyStream>> {
        Ok(Box::new(Manager::accept(self).await?))
    }

    fn close(&self) {
        Manager::close(self);
    }

    fn is_closed(&self) -> bool {
        Manager::is_closed(self)
    }

    fn active_streams(&self) -> usize {
        Manager::active_streams(self)
    }

    fn local_addr(&self) -> SocketAddr {
        Manager::local_addr(self)
    }

    fn remote_addr(&self) -> SocketAddr {
        Manager::remote_addr(self)
    }
}
