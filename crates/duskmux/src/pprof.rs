//! Minimal runtime-diagnostics endpoint, bound only when a config sets
//! `pprof`. Not a profiler: it exposes the handful of plain-text counters
//! named in spec.md §6 ("active Manager count, active SubStream count, Pool
//! size") over a tiny `salvo_core` router, reusing the same HTTP stack the
//! rest of the binary already depends on rather than reaching for a
//! dedicated metrics crate for three numbers.

use std::sync::Arc;

use salvo_core::prelude::*;
use tracing::warn;

use duskmux_pool::{Dialer, Pool};
use duskmux_server::ManagerRegistry;

/// Narrows a generic [`Pool<D>`] down to the one number the diagnostic
/// endpoint reports, so [`Stats::Pool`] does not need to carry the pool's
/// dialer type parameter around.
pub trait PoolLike: Send + Sync {
    fn size(&self) -> usize;
}

impl<D: Dialer> PoolLike for Pool<D> {
    fn size(&self) -> usize {
        self.size()
    }
}

pub enum Stats {
    Pool(Arc<dyn PoolLike>),
    Registry(Arc<ManagerRegistry>),
}

#[handler]
async fn report(depot: &mut Depot, res: &mut Response) {
    let stats = depot.obtain::<Arc<Stats>>().expect("stats injected at router build time");
    let body = match stats.as_ref() {
        Stats::Pool(pool) => format!("pool_size {}\n", pool.size()),
        Stats::Registry(registry) => format!(
            "manager_count {}\nactive_stream_count {}\n",
            registry.manager_count(),
            registry.active_stream_count()
        ),
    };
    res.render(Text::Plain(body));
}

/// Serves `GET /debug/vars` on `addr` until the process exits. Bind failures
/// are logged, not fatal: a broken diagnostic endpoint should not take down
/// the tunnel itself.
pub async fn serve(addr: String, stats: Stats) {
    let stats = Arc::new(stats);
    let router = Router::new().path("/debug/vars").hoop(salvo_core::affix_state::inject(stats)).goal(report);

    let acceptor = match salvo_core::conn::TcpListener::new(&addr).try_bind().await {
        Ok(acceptor) => acceptor,
        Err(e) => {
            warn!(%addr, error = %e, "pprof endpoint failed to bind");
            return;
        }
    };
    Server::new(acceptor).serve(router).await;
}
