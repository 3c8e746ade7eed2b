//! First-run provisioning of a tenant and its administrator.

use tollgate_auth::RegisterInput;
use tollgate_core::error::{TollgateError, TollgateResult};
use tollgate_core::invoker::ModelInvoker;
use tollgate_core::models::account::AccountKind;
use tollgate_core::models::tenant::{CreateTenant, Tenant};
use tollgate_core::scope;
use tracing::info;

use crate::backend::Backend;
use crate::config::BootstrapConfig;
use crate::state::AppState;

const ADMIN_SCOPES: &[&str] = &[
    scope::CONVERSATIONS_READ,
    scope::CONVERSATIONS_WRITE,
    scope::COMPLETIONS_CREATE,
    scope::BUDGET_READ,
    scope::ADMIN_READ,
    scope::ADMIN_WRITE,
];

/// Create the configured tenant and administrator unless they already
/// exist. Safe to run on every start.
pub async fn ensure_bootstrap<B: Backend, I: ModelInvoker>(
    state: &AppState<B, I>,
    config: &BootstrapConfig,
) -> TollgateResult<Tenant> {
    let directory = state.auth.directory();
    let all_scopes: Vec<String> = ADMIN_SCOPES.iter().map(|s| s.to_string()).collect();

    let tenant = match directory.get_by_slug(&config.tenant_slug).await {
        Ok(tenant) => tenant,
        Err(TollgateError::NotFound { .. }) => {
            directory
                .create(CreateTenant {
                    name: config.tenant_slug.clone(),
                    slug: config.tenant_slug.clone(),
                    allowed_scopes: all_scopes.clone(),
                    budget_limit: config.budget_limit,
                })
                .await?
        }
        Err(e) => return Err(e),
    };

    let registered = state
        .auth
        .register(RegisterInput {
            tenant_id: tenant.id,
            username: config.admin_username.clone(),
            email: config.admin_email.clone(),
            password: config.admin_password.clone(),
            kind: AccountKind::Human,
            scopes: Some(all_scopes),
        })
        .await;
    match registered {
        Ok(account) => info!(
            tenant_id = %tenant.id,
            account_id = %account.id,
            "Bootstrap administrator created"
        ),
        Err(TollgateError::AlreadyExists { .. }) => {
            info!(tenant_id = %tenant.id, "Bootstrap administrator already present")
        }
        Err(e) => return Err(e),
    }
    Ok(tenant)
}
