//! Wires the remote endpoint together from a loaded [`ServerConfig`]: the
//! TOTP verifier, the DNS-aware dispatcher, the manager registry and, behind
//! a single TLS listener keyed by SNI, the HTTP router. See spec.md §4.7,
//! §4.8, §4.9.

use std::sync::Arc;

use anyhow::{Context, Result};
use salvo_core::conn::rustls::{Keycert, RustlsConfig, RustlsListener};
use salvo_core::Server;
use tracing::info;

use duskmux_server::{Dispatcher, ManagerRegistry, ReverseProxyConfig, RouterConfig, WebConfig};
use duskmux_totp::Verifier;

use crate::config::{CarrierType, ServerConfig};
use crate::pprof;

pub async fn run(config: ServerConfig) -> Result<()> {
    let verifier = Verifier::new(&config.secret, config.period).context("invalid TOTP secret in server config")?;
    let dispatcher = Arc::new(Dispatcher::from_system_conf().context("failed to build dispatcher")?);
    let registry = ManagerRegistry::new();

    if let Some(addr) = &config.pprof {
        tokio::spawn(pprof::serve(addr.clone(), pprof::Stats::Registry(registry.clone())));
    }

    match config.carrier_type {
        CarrierType::Websocket => {
            let router_config = RouterConfig {
                ws_host: config.host.clone(),
                ws_path: config.ws_path().to_string(),
                web: config.web_enabled().then(|| WebConfig {
                    host: config.web_host.clone().expect("checked by web_enabled"),
                    root: config.web_root.clone().expect("checked by web_enabled"),
                }),
                reverse_proxy: config.reverse_proxy_enabled().then(|| ReverseProxyConfig {
                    host: config.reverse_proxy_host.clone().expect("checked by reverse_proxy_enabled"),
                    upstream: config.reverse_proxy_addr.clone().expect("checked by reverse_proxy_enabled"),
                }),
            };
            let router = duskmux_server::build_router(router_config, verifier.clone(), dispatcher.clone(), registry.clone());

            let cert_pem = config.cert_pem().context("failed to read server certificate")?;
            let key_pem = config.key_pem().context("failed to read server key")?;
            let mut rustls_config = RustlsConfig::new(Keycert::new().cert(cert_pem).key(key_pem));

            if config.web_enabled() {
                let web_cert = std::fs::read(config.web_crt.as_ref().expect("checked by web_enabled")).context("failed to read web certificate")?;
                let web_key = std::fs::read(config.web_key.as_ref().expect("checked by web_enabled")).context("failed to read web key")?;
                rustls_config = rustls_config.keycert(config.web_host.clone().expect("checked by web_enabled"), Keycert::new().cert(web_cert).key(web_key));
            }
            if config.reverse_proxy_enabled() {
                let rp_cert = std::fs::read(config.reverse_proxy_crt.as_ref().expect("checked by reverse_proxy_enabled"))
                    .context("failed to read reverse proxy certificate")?;
                let rp_key = std::fs::read(config.reverse_proxy_key.as_ref().expect("checked by reverse_proxy_enabled"))
                    .context("failed to read reverse proxy key")?;
                rustls_config = rustls_config.keycert(
                    config.reverse_proxy_host.clone().expect("checked by reverse_proxy_enabled"),
                    Keycert::new().cert(rp_cert).key(rp_key),
                );
            }

            let acceptor = RustlsListener::bind(rustls_config, &config.listen_addr).await;
            info!(listen_addr = %config.listen_addr, host = %config.host, "duskmux server listening for WebSocket carriers");
            Server::new(acceptor).serve(router).await;
            Ok(())
        }
        CarrierType::Quic => {
            let cert_pem = config.cert_pem().context("failed to read server certificate")?;
            let key_pem = config.key_pem().context("failed to read server key")?;
            let quinn_config = duskmux_carrier::quic::server_config(&cert_pem, &key_pem).context("failed to build quic server config")?;
            let bind_addr = config.listen_addr.parse().with_context(|| format!("invalid listen_addr {}", config.listen_addr))?;

            info!(listen_addr = %config.listen_addr, host = %config.host, "duskmux server listening for QUIC carriers");
            duskmux_server::quic_listener::serve(bind_addr, quinn_config, verifier, dispatcher, registry).await?;
            Ok(())
        }
    }
}
