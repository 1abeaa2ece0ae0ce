//! HTTP Router (R): Host+Path handler matching, per spec.md §4.8. Three
//! handlers share one TLS listener, told apart by the `Host` header: the
//! WebSocket carrier behind the Auth Gate, static+gzip web serving, and a
//! single-host reverse proxy.

use std::sync::Arc;

use salvo_core::http::header::{CONNECTION, UPGRADE};
use salvo_core::{async_trait, handler, Depot, FlowCtrl, Handler, Request, Response, Router};
use salvo_extra::compression::{Compression, CompressionAlgo};
use salvo_extra::websocket::WebSocketUpgrade;
use salvo_proxy::Proxy;
use salvo_serve_static::StaticDir;
use tracing::warn;

use duskmux_mux::{Manager, Role};
use duskmux_totp::Verifier;

use crate::auth;
use crate::dispatcher::Dispatcher;
use crate::registry::ManagerRegistry;
use crate::ws_carrier::ServerWsCarrier;

/// `host + wsPath` → Auth Gate → WebSocket upgrade → Manager, accepting
/// sub-streams onto the dispatcher for the lifetime of the connection.
struct WebSocketHandler {
    verifier: Verifier,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<ManagerRegistry>,
}

#[async_trait]
impl Handler for WebSocketHandler {
    async fn handle(&self, req: &mut Request, _depot: &mut Depot, res: &mut Response, _ctrl: &mut FlowCtrl) {
        if let Err(status) = auth::check_websocket_upgrade(req, &self.verifier) {
            res.status_code(status.code);
            return;
        }

        let local_addr = *req.local_addr();
        let remote_addr = *req.remote_addr();
        let dispatcher = self.dispatcher.clone();
        let registry = self.registry.clone();

        let upgraded = WebSocketUpgrade::new()
            .upgrade(req, res, move |socket| async move {
                let carrier = ServerWsCarrier::new(socket, local_addr, remote_addr);
                let manager: Arc<dyn duskmux_mux::AnyManager> = Arc::new(Manager::spawn(Box::new(carrier), Role::Server));
                let manager_id = registry.register(manager.clone());
                loop {
                    match manager.accept().await {
                        Ok(sub_stream) => {
                            let dispatcher = dispatcher.clone();
                            let sub_stream: Arc<dyn duskmux_mux::AnyStream> = Arc::from(sub_stream);
                            tokio::spawn(async move { dispatcher.dispatch(sub_stream).await });
                        }
                        Err(_closed) => {
                            registry.unregister(manager_id);
                            return;
                        }
                    }
                }
            })
            .await;

        if let Err(status) = upgraded {
            warn!(error = %status, "websocket upgrade failed");
            res.status_code(status.code);
        }
    }
}

/// Strips `Origin` from the forwarded request so that, if the configured
/// upstream is itself a WebSocket server, its own upgrade check does not
/// reject the proxied request. See spec.md §4.8 item 3.
#[handler]
async fn strip_origin(req: &mut Request) {
    req.headers_mut().remove(salvo_core::http::header::ORIGIN);
}

fn is_connection_upgrade(req: &Request, _depot: &Depot) -> bool {
    !req.headers()
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_lowercase().contains("upgrade"))
        .unwrap_or(false)
        && req.headers().get(UPGRADE).is_none()
}

/// `Content-Type`s eligible for gzip, per spec.md §4.8: everything the
/// teacher's default list covers except `text/event-stream`, which must stay
/// uncompressed so Server-Sent Events keep streaming live.
fn compressible_content_types() -> Vec<String> {
    vec![
        "text/html".into(),
        "text/css".into(),
        "text/plain".into(),
        "text/javascript".into(),
        "application/javascript".into(),
        "application/json".into(),
        "application/xml".into(),
        "application/rss+xml".into(),
        "image/svg+xml".into(),
    ]
}

/// Parameters carried over from the server TOML config needed to assemble
/// the router; kept separate from `config::ServerConfig` so this module does
/// not need to know about TOML deserialization.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub ws_host: String,
    pub ws_path: String,
    pub web: Option<WebConfig>,
    pub reverse_proxy: Option<ReverseProxyConfig>,
}

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub host: String,
    pub root: std::path::PathBuf,
}

#[derive(Debug, Clone)]
pub struct ReverseProxyConfig {
    pub host: String,
    pub upstream: String,
}

pub fn build(config: RouterConfig, verifier: Verifier, dispatcher: Arc<Dispatcher>, registry: Arc<ManagerRegistry>) -> Router {
    let mut root = Router::new().push(
        Router::new()
            .host(config.ws_host)
            .path(config.ws_path)
            .goal(WebSocketHandler { verifier, dispatcher, registry }),
    );

    if let Some(proxy) = config.reverse_proxy {
        root = root.push(
            Router::new()
                .host(proxy.host)
                .path("{**rest}")
                .hoop(strip_origin)
                .goal(Proxy::use_hyper_client(proxy.upstream)),
        );
    }

    if let Some(web) = config.web {
        // No `.host(..)` filter here: per spec.md §4.8, any request whose
        // `Host` matches none of the handlers above falls through to the web
        // handler when one is configured, not just requests for `web.host`
        // itself (`web.host` is still the name operators set in the TOML
        // schema; it is not used as a router filter).
        let compression = Compression::new().with_algos(&[CompressionAlgo::Gzip]).with_content_types(&compressible_content_types());
        root = root.push(
            Router::new()
                .path("{**rest}")
                .hoop_when(compression, is_connection_upgrade)
                .goal(StaticDir::new([web.root]).auto_list(true).defaults(vec!["index.html".to_owned()])),
        );
    }

    root
}
