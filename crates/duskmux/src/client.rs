//! Wires the client-side carrier pool, SOCKS5 front-end and diagnostic
//! endpoint together from a loaded [`ClientConfig`]. See spec.md §2's data
//! flow and §4.5/§4.6.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use duskmux_mux::{AnyManager, Manager, Role};
use duskmux_pool::{DialFailure, Dialer, Pool};
use duskmux_totp::Verifier;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::{CarrierType, ClientConfig};
use crate::pprof;

/// Dials a fresh carrier for the pool, generating a current TOTP code per
/// attempt and retrying exactly once on an auth rejection with a freshly
/// generated code, per spec.md §4.7: "the client retries once on 403 ... to
/// handle boundary ticks; after two failures it surfaces 'maybe TOTP secret
/// is wrong'".
struct CarrierDialer {
    carrier_type: CarrierType,
    host: String,
    ws_path: String,
    debug_ca_pem: Option<Vec<u8>>,
    verifier: Verifier,
    handshake_timeout: Duration,
}

#[async_trait]
impl Dialer for CarrierDialer {
    async fn dial(&self) -> std::result::Result<Arc<dyn AnyManager>, DialFailure> {
        tokio::time::timeout(self.handshake_timeout, self.dial_with_retry())
            .await
            .map_err(|_elapsed| DialFailure::Transient("carrier dial timed out".to_string()))?
    }
}

impl CarrierDialer {
    async fn dial_with_retry(&self) -> std::result::Result<Arc<dyn AnyManager>, DialFailure> {
        match self.dial_once().await {
            Ok(manager) => Ok(manager),
            Err(first_err) if first_err.is_auth_rejection() => {
                warn!("carrier handshake rejected (bad TOTP code?), retrying once with a fresh code");
                match self.dial_once().await {
                    Ok(manager) => Ok(manager),
                    Err(second_err) => {
                        if second_err.is_auth_rejection() {
                            error!("totp handshake rejected twice in a row; maybe TOTP secret is wrong");
                            Err(DialFailure::Auth(second_err.to_string()))
                        } else {
                            Err(DialFailure::Transient(second_err.to_string()))
                        }
                    }
                }
            }
            Err(e) => Err(DialFailure::Transient(e.to_string())),
        }
    }

    async fn dial_once(&self) -> std::result::Result<Arc<dyn AnyManager>, DialError> {
        let code = self.verifier.current_code().map_err(|e| DialError::Other(e.to_string()))?;
        match self.carrier_type {
            CarrierType::Websocket => {
                match duskmux_carrier::websocket::dial(&self.host, &self.ws_path, &code, self.debug_ca_pem.as_deref()).await {
                    Ok(carrier) => Ok(Arc::new(Manager::spawn(Box::new(carrier), Role::Client))),
                    Err(duskmux_carrier::websocket::Error::Forbidden) => Err(DialError::AuthRejected),
                    Err(e) => Err(DialError::Other(e.to_string())),
                }
            }
            CarrierType::Quic => match duskmux_carrier::quic::dial(&self.host, &code, self.debug_ca_pem.as_deref()).await {
                Ok(carrier) => Ok(Arc::new(carrier)),
                Err(duskmux_carrier::quic::Error::AuthRejected) => Err(DialError::AuthRejected),
                Err(e) => Err(DialError::Other(e.to_string())),
            },
        }
    }
}

#[derive(Debug)]
enum DialError {
    AuthRejected,
    Other(String),
}

impl DialError {
    fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::AuthRejected)
    }
}

impl std::fmt::Display for DialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AuthRejected => write!(f, "carrier handshake rejected (totp auth failed)"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

/// Default QUIC port when `host` carries no explicit port, per spec.md §6.
fn host_with_default_quic_port(host: &str) -> String {
    if host.contains(':') { host.to_string() } else { format!("{host}:443") }
}

pub async fn run(config: ClientConfig) -> Result<()> {
    let verifier = Verifier::new(&config.secret, config.period).context("invalid TOTP secret in client config")?;
    let handshake_timeout = config.handshake_timeout().context("invalid timeout in client config")?;
    let debug_ca_pem = config.debug_ca_pem().context("failed to read debug_ca")?;

    let host = match config.carrier_type {
        CarrierType::Quic => host_with_default_quic_port(&config.host),
        CarrierType::Websocket => config.host.clone(),
    };

    let dialer = CarrierDialer {
        carrier_type: config.carrier_type,
        host,
        ws_path: config.ws_path().to_string(),
        debug_ca_pem,
        verifier,
        handshake_timeout,
    };

    let max_streams = config.max_streams_per_manager.unwrap_or(duskmux_pool::DEFAULT_MAX_STREAMS_PER_MANAGER);
    let pool = Arc::new(Pool::with_limits(dialer, max_streams, duskmux_pool::MAX_RETRY, duskmux_pool::CACHE_FLOOR));

    if let Some(addr) = &config.pprof {
        tokio::spawn(pprof::serve(addr.clone(), pprof::Stats::Pool(pool.clone())));
    }

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind socks listener on {}", config.listen_addr))?;
    info!(listen_addr = %config.listen_addr, carrier = ?config.carrier_type, "duskmux client listening for SOCKS5 connections");

    duskmux_socks::serve(listener, pool, duskmux_socks::DEFAULT_HANDSHAKE_TIMEOUT).await;
}
