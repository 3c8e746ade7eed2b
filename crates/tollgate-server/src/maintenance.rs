//! Background sweeps: expired cache entries and expired sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tollgate_core::invoker::ModelInvoker;
use tollgate_core::repository::Pagination;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::state::AppState;

const TENANT_PAGE: u64 = 100;

/// Run one sweep. Returns `(cache entries evicted, sessions removed)`.
pub async fn sweep<B: Backend, I: ModelInvoker>(state: &AppState<B, I>) -> (u64, u64) {
    let evicted = match state.gateway.cache().evict_expired().await {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "Cache sweep failed");
            0
        }
    };

    let mut removed = 0;
    let mut offset = 0;
    loop {
        let page = match state
            .auth
            .directory()
            .list(Pagination {
                offset,
                limit: TENANT_PAGE,
            })
            .await
        {
            Ok(page) => page,
            Err(e) => {
                warn!(error = %e, "Session sweep could not list tenants");
                break;
            }
        };
        for tenant in &page.items {
            match state.auth.sessions().cleanup_expired(tenant.id).await {
                Ok(n) => removed += n,
                Err(e) => warn!(tenant_id = %tenant.id, error = %e, "Session sweep failed"),
            }
        }
        offset += page.items.len() as u64;
        if page.items.is_empty() || offset >= page.total {
            break;
        }
    }

    if evicted > 0 || removed > 0 {
        info!(cache_evicted = evicted, sessions_removed = removed, "Maintenance sweep");
    } else {
        debug!("Maintenance sweep found nothing to remove");
    }
    (evicted, removed)
}

/// Sweep every `interval` until the task is aborted.
pub fn spawn_sweeper<B, I>(state: Arc<AppState<B, I>>, interval: Duration) -> JoinHandle<()>
where
    B: Backend,
    I: ModelInvoker + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep(&state).await;
        }
    })
}
