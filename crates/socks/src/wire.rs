//! SOCKS5 greeting/request parsing and reply/destination-bytes encoding.
//! See spec.md §4.6. No user/password auth, no UDP ASSOCIATE, no BIND — only
//! the no-auth method and the CONNECT command, per spec.md §1's Non-goals.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};

const VERSION: u8 = 5;
const METHOD_NO_AUTH: u8 = 0x00;
const METHOD_NO_ACCEPTABLE: u8 = 0xFF;
const CMD_CONNECT: u8 = 0x01;

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// SOCKS5 reply codes used by this implementation, per spec.md §4.6/§7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Success = 0x00,
    GeneralFailure = 0x01,
    NetworkUnreachable = 0x03,
    CommandNotSupported = 0x07,
    TtlExpired = 0x06,
}

/// The parsed destination of a CONNECT request, already laid out exactly as
/// the wire's DestinationBytes: `ATYP(1) | ADDR | PORT(2,BE)`.
#[derive(Debug, Clone)]
pub struct Destination {
    bytes: Bytes,
}

impl Destination {
    /// The exact byte sequence sent as the sub-stream's `OPEN_WITH_DATA`
    /// pre-data payload, per spec.md §4.6.
    #[must_use]
    pub fn as_bytes(&self) -> Bytes {
        self.bytes.clone()
    }
}

/// Reads the greeting (`VER, NMETHODS, METHODS[..]`) and replies `5,0` if
/// no-auth is offered, else `5,0xFF` (caller must then close the socket).
pub async fn read_greeting<S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin>(stream: &mut S) -> Result<bool> {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;
    if header[0] != VERSION {
        return Err(Error::Protocol(format!("unsupported SOCKS version {}", header[0])));
    }
    let nmethods = header[1] as usize;
    let mut methods = vec![0u8; nmethods];
    stream.read_exact(&mut methods).await?;

    if methods.contains(&METHOD_NO_AUTH) {
        stream.write_all(&[VERSION, METHOD_NO_AUTH]).await?;
        Ok(true)
    } else {
        stream.write_all(&[VERSION, METHOD_NO_ACCEPTABLE]).await?;
        Ok(false)
    }
}

/// Reads `VER, CMD, RSV, ATYP, DSTADDR, DSTPORT` and returns the destination
/// bytes. Only `CMD=1` (CONNECT) is accepted; anything else is reported as
/// `Err(Error::CommandUnsupported)` so the caller can reply `0x07` and close.
pub async fn read_request<S: tokio::io::AsyncRead + Unpin>(stream: &mut S) -> Result<Destination> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    let (version, cmd, _rsv, atyp) = (header[0], header[1], header[2], header[3]);
    if version != VERSION {
        return Err(Error::Protocol(format!("unsupported SOCKS version {version}")));
    }
    if cmd != CMD_CONNECT {
        return Err(Error::CommandUnsupported);
    }

    let mut out = BytesMut::new();
    out.put_u8(atyp);
    match atyp {
        ATYP_IPV4 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            out.extend_from_slice(&addr);
        }
        ATYP_DOMAIN => {
            let mut len_buf = [0u8; 1];
            stream.read_exact(&mut len_buf).await?;
            let len = len_buf[0];
            out.put_u8(len);
            let mut name = vec![0u8; len as usize];
            stream.read_exact(&mut name).await?;
            out.extend_from_slice(&name);
        }
        ATYP_IPV6 => {
            let mut addr = [0u8; 16];
            stream.read_exact(&mut addr).await?;
            out.extend_from_slice(&addr);
        }
        other => return Err(Error::Protocol(format!("unknown ATYP {other}"))),
    }
    let mut port = [0u8; 2];
    stream.read_exact(&mut port).await?;
    out.extend_from_slice(&port);

    Ok(Destination { bytes: out.freeze() })
}

/// Encodes `5, REP, 0, ATYP, BND.ADDR, BND.PORT` reporting the local accept
/// address, per spec.md §4.6.
pub async fn write_reply<S: tokio::io::AsyncWrite + Unpin>(stream: &mut S, rep: Reply, bound: std::net::SocketAddr) -> Result<()> {
    let mut out = BytesMut::new();
    out.put_u8(VERSION);
    out.put_u8(rep as u8);
    out.put_u8(0); // RSV
    match bound {
        std::net::SocketAddr::V4(v4) => {
            out.put_u8(ATYP_IPV4);
            out.extend_from_slice(&v4.ip().octets());
            out.put_u16(v4.port());
        }
        std::net::SocketAddr::V6(v6) => {
            out.put_u8(ATYP_IPV6);
            out.extend_from_slice(&v6.ip().octets());
            out.put_u16(v6.port());
        }
    }
    stream.write_all(&out).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn greeting_accepts_no_auth() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[5, 1, 0x00]).await.expect("write greeting");
        let accepted = read_greeting(&mut server).await.expect("read greeting");
        assert!(accepted);
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.expect("read reply");
        assert_eq!(reply, [5, 0]);
    }

    #[tokio::test]
    async fn greeting_rejects_when_no_auth_absent() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[5, 1, 0x02]).await.expect("write greeting"); // user/password only
        let accepted = read_greeting(&mut server).await.expect("read greeting");
        assert!(!accepted);
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.expect("read reply");
        assert_eq!(reply, [5, 0xFF]);
    }

    #[tokio::test]
    async fn request_encodes_domain_destination_bytes() {
        let (mut client, mut server) = duplex(128);
        let mut req = vec![5, 1, 0, 3, 11];
        req.extend_from_slice(b"example.com");
        req.extend_from_slice(&80u16.to_be_bytes());
        client.write_all(&req).await.expect("write request");
        let dest = read_request(&mut server).await.expect("read request");
        assert_eq!(&dest.as_bytes()[..], b"\x03\x0bexample.com\x00\x50");
    }

    #[tokio::test]
    async fn request_rejects_non_connect_commands() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[5, 2 /* BIND */, 0, 1, 127, 0, 0, 1, 0, 80]).await.expect("write");
        let err = read_request(&mut server).await.unwrap_err();
        assert!(matches!(err, Error::CommandUnsupported));
    }

    #[tokio::test]
    async fn reply_encodes_bound_ipv4_address() {
        let (mut client, mut server) = duplex(64);
        let bound: std::net::SocketAddr = "127.0.0.1:1080".parse().expect("valid addr");
        write_reply(&mut server, Reply::Success, bound).await.expect("write reply");
        let mut buf = [0u8; 10];
        client.read_exact(&mut buf).await.expect("read reply");
        assert_eq!(buf, [5, 0, 0, 1, 127, 0, 0, 1, 0x04, 0x38]);
    }
}
