//! Shared application state handed to every handler.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tollgate_auth::{AuthError, AuthService, TenantGuard};
use tollgate_budget::BudgetGovernor;
use tollgate_cache::ResponseCache;
use tollgate_core::invoker::ModelInvoker;

use crate::audit_sink::{ServerEvents, server_events};
use crate::backend::{Backend, Repositories};
use crate::config::ServerConfig;
use crate::gateway::CompletionGateway;

pub type Events<B> = ServerEvents<<B as Backend>::Audit>;

pub type Auth<B> = AuthService<
    <B as Backend>::Tenants,
    <B as Backend>::Accounts,
    <B as Backend>::ApiKeys,
    <B as Backend>::Sessions,
    Events<B>,
>;

pub type Gateway<B, I> =
    CompletionGateway<<B as Backend>::Cache, <B as Backend>::Ledger, Events<B>, I>;

pub struct AppState<B: Backend, I> {
    pub auth: Auth<B>,
    pub guard: TenantGuard<Events<B>>,
    pub gateway: Gateway<B, I>,
    /// Read side of the audit log.
    pub audit: B::Audit,
    pub store_timeout: Duration,
    /// Peers allowed to report the client address via `X-Forwarded-For`.
    pub trusted_proxies: Vec<IpAddr>,
}

impl<B: Backend, I: ModelInvoker> AppState<B, I> {
    pub fn new(
        repos: Repositories<B>,
        invoker: I,
        config: &ServerConfig,
    ) -> Result<Self, AuthError> {
        let store_timeout = config.auth.store_timeout();
        let events = Arc::new(server_events(repos.audit.clone(), store_timeout));

        let auth = AuthService::new(
            repos.tenants,
            repos.accounts,
            repos.api_keys,
            repos.sessions,
            Arc::clone(&events),
            config.auth.clone(),
        )?;
        let governor =
            BudgetGovernor::new(repos.ledger, Arc::clone(&events), config.budget.clone());
        let cache = ResponseCache::new(repos.cache, config.cache.clone());

        Ok(Self {
            auth,
            guard: TenantGuard::new(events),
            gateway: CompletionGateway::new(cache, governor, invoker),
            audit: repos.audit,
            store_timeout,
            trusted_proxies: config.trusted_proxies.clone(),
        })
    }
}
