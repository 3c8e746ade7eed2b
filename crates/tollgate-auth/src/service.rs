//! Authentication service: registration, login, refresh, credential
//! rotation and inbound credential resolution.

use std::sync::Arc;

use serde::Deserialize;
use tollgate_core::deadline::with_deadline;
use tollgate_core::error::{TollgateError, TollgateResult};
use tollgate_core::events::EventSink;
use tollgate_core::models::account::{Account, AccountKind, CreateAccount, UpdateAccount};
use tollgate_core::models::auth_context::AuthContext;
use tollgate_core::models::session::ClientOrigin;
use tollgate_core::repository::{
    AccountRepository, ApiKeyRepository, SessionRepository, TenantRepository,
};
use tollgate_core::scope;
use tracing::info;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::credentials::{self, CredentialVerifier};
use crate::directory::TenantDirectory;
use crate::error::AuthError;
use crate::password;
use crate::session::{IssuedSession, SessionManager, TokenPair};
use crate::token::JwtKeys;

/// Input for a password login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    /// Tenant slug the account belongs to.
    pub tenant: String,
    /// Username or email.
    pub login: String,
    pub password: String,
    #[serde(skip)]
    pub origin: ClientOrigin,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub tenant_id: Uuid,
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default = "default_kind")]
    pub kind: AccountKind,
    /// Requested scopes; defaults to the member set. Always narrowed to
    /// the tenant's allowed scopes.
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
}

fn default_kind() -> AccountKind {
    AccountKind::Human
}

pub struct AuthService<T, A, K, S, E> {
    directory: TenantDirectory<T>,
    accounts: A,
    credentials: CredentialVerifier<A, K, E>,
    sessions: SessionManager<S, E>,
    config: AuthConfig,
}

impl<T, A, K, S, E> AuthService<T, A, K, S, E>
where
    T: TenantRepository,
    A: AccountRepository + Clone,
    K: ApiKeyRepository,
    S: SessionRepository,
    E: EventSink,
{
    pub fn new(
        tenants: T,
        accounts: A,
        api_keys: K,
        sessions: S,
        events: Arc<E>,
        config: AuthConfig,
    ) -> Result<Self, AuthError> {
        let keys = JwtKeys::from_config(&config)?;
        Ok(Self {
            directory: TenantDirectory::new(tenants, config.store_timeout()),
            credentials: CredentialVerifier::new(
                accounts.clone(),
                api_keys,
                Arc::clone(&events),
                config.clone(),
            ),
            sessions: SessionManager::new(sessions, keys, events, config.clone()),
            accounts,
            config,
        })
    }

    pub fn directory(&self) -> &TenantDirectory<T> {
        &self.directory
    }

    pub fn credentials(&self) -> &CredentialVerifier<A, K, E> {
        &self.credentials
    }

    pub fn sessions(&self) -> &SessionManager<S, E> {
        &self.sessions
    }

    /// Create an account in an existing tenant.
    pub async fn register(&self, input: RegisterInput) -> TollgateResult<Account> {
        if input.password.chars().count() < self.config.min_password_length {
            return Err(AuthError::WeakPassword {
                min: self.config.min_password_length,
            }
            .into());
        }
        let tenant = self.directory.get(input.tenant_id).await?;

        let requested = input.scopes.unwrap_or_else(|| {
            scope::DEFAULT_MEMBER_SCOPES
                .iter()
                .map(|s| s.to_string())
                .collect()
        });
        if let Some(bad) = requested.iter().find(|s| !scope::is_well_formed(s)) {
            return Err(TollgateError::Validation {
                message: format!("malformed scope: {bad}"),
            });
        }

        let credential_hash =
            password::hash_password(&input.password, self.config.pepper.as_deref())?;
        let account = with_deadline(
            "account.create",
            self.config.store_timeout(),
            self.accounts.create(CreateAccount {
                tenant_id: tenant.id,
                username: input.username,
                email: input.email,
                credential_hash,
                kind: input.kind,
                scopes: scope::intersect(&requested, &tenant.allowed_scopes),
            }),
        )
        .await?;
        info!(tenant_id = %tenant.id, account_id = %account.id, "Account registered");
        Ok(account)
    }

    /// Verify a password login and open a session.
    pub async fn login(&self, input: LoginInput) -> TollgateResult<IssuedSession> {
        // Unknown tenants look exactly like bad credentials.
        let tenant = self
            .directory
            .get_by_slug(&input.tenant)
            .await
            .map_err(|e| match e {
                TollgateError::NotFound { .. } => {
                    self.credentials.verify_decoy(&input.password);
                    TollgateError::InvalidCredentials
                }
                other => other,
            })?;

        let account = self
            .credentials
            .verify_password_login(tenant.id, &input.login, &input.password, &input.origin)
            .await?;

        let issued = self.sessions.issue(&account, &tenant, input.origin).await?;
        info!(
            tenant_id = %tenant.id,
            account_id = %account.id,
            session_id = %issued.session.id,
            "Login succeeded"
        );
        Ok(issued)
    }

    pub async fn refresh(
        &self,
        refresh_token: &str,
        origin: ClientOrigin,
    ) -> TollgateResult<TokenPair> {
        self.sessions.refresh(refresh_token, origin).await
    }

    /// Resolve an inbound bearer credential: an API key (`tg_` prefix) or
    /// an access token.
    pub async fn authenticate(&self, credential: &str) -> TollgateResult<AuthContext> {
        if credentials::looks_like_api_key(credential) {
            self.credentials.verify_api_key(credential).await
        } else {
            self.sessions.validate(credential)
        }
    }

    /// Revoke the caller's current session. API-key callers have none.
    pub async fn logout(&self, ctx: &AuthContext) -> TollgateResult<()> {
        match ctx.session_id {
            Some(session_id) => {
                self.sessions.revoke(ctx.tenant_id, session_id).await?;
                Ok(())
            }
            None => Err(TollgateError::Validation {
                message: "credential is not session-backed".into(),
            }),
        }
    }

    /// Replace an account's password after verifying the current one, then
    /// sign out every other session.
    pub async fn rotate_password(
        &self,
        ctx: &AuthContext,
        current: &str,
        new_password: &str,
    ) -> TollgateResult<u64> {
        if new_password.chars().count() < self.config.min_password_length {
            return Err(AuthError::WeakPassword {
                min: self.config.min_password_length,
            }
            .into());
        }
        let timeout = self.config.store_timeout();
        let account = with_deadline(
            "account.get",
            timeout,
            self.accounts.get_by_id(ctx.tenant_id, ctx.account_id),
        )
        .await?;
        let pepper = self.config.pepper.as_deref();
        if !password::verify_password(current, &account.credential_hash, pepper)? {
            return Err(AuthError::InvalidCredentials.into());
        }

        let credential_hash = password::hash_password(new_password, pepper)?;
        with_deadline(
            "account.update",
            timeout,
            self.accounts.update(
                ctx.tenant_id,
                ctx.account_id,
                UpdateAccount {
                    credential_hash: Some(credential_hash),
                    ..Default::default()
                },
            ),
        )
        .await?;
        self.sessions
            .revoke_all(ctx.tenant_id, ctx.account_id, ctx.session_id)
            .await
    }
}
