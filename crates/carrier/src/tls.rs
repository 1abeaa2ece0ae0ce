//! TLS configuration shared by the WebSocket and QUIC client carriers.
//!
//! Certificate/key file I/O is out of the specified core (spec.md §1); what
//! lives here is the *construction* of `rustls` client/server configs from
//! already-loaded PEM bytes, grounded on the teacher's
//! `crates/core/src/conn/rustls/config.rs` (certificate parsing, private-key
//! format sniffing across PKCS#8/EC/RSA).

use std::io::Cursor;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid certificate: {0}")]
    InvalidCert(String),
    #[error("invalid private key: {0}")]
    InvalidKey(String),
    #[error("rustls error: {0}")]
    Rustls(#[from] rustls::Error),
    #[error("failed to load system trust roots: {0}")]
    NativeRoots(String),
    #[error("invalid server name: {0}")]
    InvalidServerName(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Parses the `ALPN` list carried by the mux's carrier-level handshakes.
pub const ALPN_QUIC: &[u8] = b"quic";

fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    rustls_pemfile::certs(&mut Cursor::new(pem))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::InvalidCert(e.to_string()))
}

fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut Cursor::new(pem))
        .map_err(|e| Error::InvalidKey(e.to_string()))?
        .ok_or_else(|| Error::InvalidKey("no private key found in PEM".into()))
}

/// Builds the `rustls::ClientConfig` used to dial the server's carrier.
/// `custom_ca_pem`, when present, pins trust to that CA alone (the `debug_ca`
/// TOML field, per spec.md §6) instead of the system root store.
pub fn client_config(custom_ca_pem: Option<&[u8]>, alpn_protocols: &[&[u8]]) -> Result<Arc<ClientConfig>> {
    let mut roots = RootCertStore::empty();
    match custom_ca_pem {
        Some(pem) => {
            for cert in parse_certs(pem)? {
                roots.add(cert)?;
            }
        }
        None => {
            let native = rustls_native_certs::load_native_certs();
            for err in &native.errors {
                tracing::warn!(error = %err, "failed to load a native root certificate");
            }
            for cert in native.certs {
                roots.add(cert)?;
            }
        }
    }

    let mut config = ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();
    config.alpn_protocols = alpn_protocols.iter().map(|p| p.to_vec()).collect();
    Ok(Arc::new(config))
}

/// Builds the `rustls::ServerConfig` for the QUIC carrier's own TLS
/// termination (the WebSocket carrier terminates TLS inside the HTTP
/// Router instead, see `duskmux-server`).
pub fn server_config(cert_pem: &[u8], key_pem: &[u8], alpn_protocols: &[&[u8]]) -> Result<Arc<ServerConfig>> {
    let certs = parse_certs(cert_pem)?;
    let key = parse_private_key(key_pem)?;
    let mut config = ServerConfig::builder().with_no_client_auth().with_single_cert(certs, key)?;
    config.alpn_protocols = alpn_protocols.iter().map(|p| p.to_vec()).collect();
    Ok(Arc::new(config))
}

pub fn server_name(host: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(host.to_string()).map_err(|e| Error::InvalidServerName(e.to_string()))
}
