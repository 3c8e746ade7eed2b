//! Tenant directory: read-mostly lookup of tenant records.

use std::time::Duration;

use tollgate_core::deadline::with_deadline;
use tollgate_core::error::{TollgateError, TollgateResult};
use tollgate_core::models::tenant::{CreateTenant, Tenant, UpdateTenant};
use tollgate_core::repository::{PaginatedResult, Pagination, TenantRepository};
use tollgate_core::scope;
use tracing::info;
use uuid::Uuid;

/// Lookup and administration of tenants, with a deadline on every store
/// call.
#[derive(Clone)]
pub struct TenantDirectory<T> {
    repo: T,
    timeout: Duration,
}

impl<T: TenantRepository> TenantDirectory<T> {
    pub fn new(repo: T, timeout: Duration) -> Self {
        Self { repo, timeout }
    }

    pub async fn get(&self, tenant_id: Uuid) -> TollgateResult<Tenant> {
        with_deadline("tenant.get", self.timeout, self.repo.get_by_id(tenant_id)).await
    }

    pub async fn get_by_slug(&self, slug: &str) -> TollgateResult<Tenant> {
        with_deadline(
            "tenant.get_by_slug",
            self.timeout,
            self.repo.get_by_slug(slug),
        )
        .await
    }

    pub async fn create(&self, input: CreateTenant) -> TollgateResult<Tenant> {
        validate_scopes(&input.allowed_scopes)?;
        if input.budget_limit.is_negative() {
            return Err(TollgateError::Validation {
                message: "budget limit must not be negative".into(),
            });
        }
        let tenant = with_deadline("tenant.create", self.timeout, self.repo.create(input)).await?;
        info!(
            tenant_id = %tenant.id,
            slug = %tenant.slug,
            limit = %tenant.budget_limit,
            "Tenant created"
        );
        Ok(tenant)
    }

    pub async fn update(&self, tenant_id: Uuid, input: UpdateTenant) -> TollgateResult<Tenant> {
        if let Some(scopes) = &input.allowed_scopes {
            validate_scopes(scopes)?;
        }
        with_deadline(
            "tenant.update",
            self.timeout,
            self.repo.update(tenant_id, input),
        )
        .await
    }

    pub async fn list(&self, pagination: Pagination) -> TollgateResult<PaginatedResult<Tenant>> {
        with_deadline("tenant.list", self.timeout, self.repo.list(pagination)).await
    }
}

fn validate_scopes(scopes: &[String]) -> TollgateResult<()> {
    match scopes.iter().find(|s| !scope::is_well_formed(s)) {
        Some(bad) => Err(TollgateError::Validation {
            message: format!("malformed scope: {bad}"),
        }),
        None => Ok(()),
    }
}
