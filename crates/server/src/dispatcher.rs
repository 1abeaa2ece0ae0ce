//! Dispatcher (D): turns an accepted sub-stream's pre-data destination bytes
//! into a dialed TCP connection and splices the two. See spec.md §4.9.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use duskmux_mux::AnyStream;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::Resolver;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Error, Result};

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// Hard deadline on reading a sub-stream's DestinationBytes prefix, per
/// spec.md §4.9.
pub const DESTINATION_READ_DEADLINE: Duration = Duration::from_secs(10);

/// Resolves `ATYP=DOMAIN` names and remembers, at startup, whether any local
/// interface carries a public IPv6 address — grounded on
/// `original_source/dns/dns.go`'s concurrent A/AAAA `Query`, collapsed into
/// one `hickory-resolver` lookup that already races both record types.
pub struct Dispatcher {
    resolver: Resolver<TokioConnectionProvider>,
    prefer_ipv6: bool,
}

impl Dispatcher {
    /// Builds a resolver from the platform's `/etc/resolv.conf` (or
    /// equivalent) and probes local interfaces once, per the Design Notes in
    /// `SPEC_FULL.md` §4.9 (no process-global resolver state; one value
    /// owned by the server for its lifetime).
    pub fn from_system_conf() -> Result<Self> {
        let resolver = Resolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        let prefer_ipv6 = if_addrs::get_if_addrs()
            .unwrap_or_default()
            .iter()
            .any(|iface| !iface.is_loopback() && iface.ip().is_ipv6());
        Ok(Self { resolver, prefer_ipv6 })
    }

    /// Runs the full per-sub-stream lifecycle: read destination, resolve,
    /// dial, splice. Errors are logged and the sub-stream is simply dropped —
    /// no reply frame crosses the carrier on failure, per spec.md §4.9.
    pub async fn dispatch(&self, sub_stream: Arc<dyn AnyStream>) {
        match self.handle(&sub_stream).await {
            Ok(()) => {}
            Err(e) => {
                debug!(error = %e, "dispatcher dropped sub-stream");
                let _ = sub_stream.close().await;
            }
        }
    }

    async fn handle(&self, sub_stream: &Arc<dyn AnyStream>) -> Result<()> {
        let (addr, display) = tokio::time::timeout(DESTINATION_READ_DEADLINE, self.read_destination(sub_stream))
            .await
            .map_err(|_elapsed| Error::Destination("timed out reading destination bytes".into()))??;

        let socket = TcpStream::connect(addr).await.map_err(Error::Io)?;
        debug!(destination = %display, remote = %addr, "dispatcher dialed upstream");
        duskmux_socks::splice(socket, sub_stream.clone()).await;
        Ok(())
    }

    async fn read_destination(&self, sub_stream: &Arc<dyn AnyStream>) -> Result<(SocketAddr, String)> {
        let atyp = read_u8(sub_stream).await?;
        let (ip, display) = match atyp {
            ATYP_IPV4 => {
                let mut buf = [0u8; 4];
                read_exact(sub_stream, &mut buf).await?;
                let ip = IpAddr::from(buf);
                (ip, ip.to_string())
            }
            ATYP_DOMAIN => {
                let len = read_u8(sub_stream).await? as usize;
                let mut name_buf = vec![0u8; len];
                read_exact(sub_stream, &mut name_buf).await?;
                let name = String::from_utf8(name_buf).map_err(|e| Error::Destination(e.to_string()))?;
                let ip = self.resolve(&name).await?;
                (ip, name)
            }
            ATYP_IPV6 => {
                let mut buf = [0u8; 16];
                read_exact(sub_stream, &mut buf).await?;
                let ip = IpAddr::from(buf);
                (ip, ip.to_string())
            }
            other => return Err(Error::Destination(format!("unknown ATYP {other}"))),
        };
        let mut port_buf = [0u8; 2];
        read_exact(sub_stream, &mut port_buf).await?;
        let port = u16::from_be_bytes(port_buf);
        Ok((SocketAddr::new(ip, port), display))
    }

    /// Prefers A records unless a local interface carries a public IPv6
    /// address, in which case one address is picked uniformly at random
    /// across both families, per spec.md §4.9.
    async fn resolve(&self, host: &str) -> Result<IpAddr> {
        let response = self
            .resolver
            .lookup_ip(host)
            .await
            .map_err(|source| Error::Dns { host: host.to_string(), source })?;
        let mut v4: Vec<IpAddr> = Vec::new();
        let mut v6: Vec<IpAddr> = Vec::new();
        for ip in response.iter() {
            match ip {
                IpAddr::V4(_) => v4.push(ip),
                IpAddr::V6(_) => v6.push(ip),
            }
        }
        if !self.prefer_ipv6 || v6.is_empty() {
            v4.into_iter().next().or_else(|| v6.into_iter().next())
        } else {
            let mut all = v4;
            all.extend(v6);
            let idx = fastrand::usize(..all.len());
            Some(all.swap_remove(idx))
        }
        .ok_or_else(|| Error::NoAddress(host.to_string()))
    }
}

async fn read_u8(sub_stream: &Arc<dyn AnyStream>) -> Result<u8> {
    let mut buf = [0u8; 1];
    read_exact(sub_stream, &mut buf).await?;
    Ok(buf[0])
}

async fn read_exact(sub_stream: &Arc<dyn AnyStream>, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = sub_stream
            .read(&mut buf[filled..])
            .await
            .map_err(|e| Error::Destination(e.to_string()))?;
        if n == 0 {
            return Err(Error::Destination("sub-stream closed before destination bytes arrived".into()));
        }
        filled += n;
    }
    Ok(())
}
