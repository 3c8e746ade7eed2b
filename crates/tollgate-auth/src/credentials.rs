//! Credential verification: password logins with lockout backoff, and
//! API keys.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};
use tollgate_core::deadline::with_deadline;
use tollgate_core::error::{TollgateError, TollgateResult};
use tollgate_core::events::{ControlPlaneEvent, EventSink};
use tollgate_core::models::account::{Account, AccountStatus, UpdateAccount};
use tollgate_core::models::api_key::{ApiKey, CreateApiKey};
use tollgate_core::models::audit::{AuditEventKind, CreateAuditEvent};
use tollgate_core::models::auth_context::{AuthContext, AuthMethod};
use tollgate_core::models::session::ClientOrigin;
use tollgate_core::repository::{AccountRepository, ApiKeyRepository};
use tollgate_core::scope;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::password;

/// Prefix identifying Tollgate API keys on the wire.
pub const API_KEY_PREFIX: &str = "tg_";

/// Characters of the raw key kept for display.
const DISPLAY_PREFIX_LEN: usize = 11;

/// Generate a raw API key: `tg_` followed by 64 hex chars.
fn generate_api_key() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    format!("{API_KEY_PREFIX}{}", hex::encode(bytes))
}

/// SHA-256 of a raw API key, hex-encoded.
pub fn hash_api_key(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn looks_like_api_key(credential: &str) -> bool {
    credential.starts_with(API_KEY_PREFIX)
}

/// Validates login secrets against stored hashes. Stateless apart from
/// the lockout counters kept on each account.
pub struct CredentialVerifier<A, K, E> {
    accounts: A,
    api_keys: K,
    events: Arc<E>,
    config: AuthConfig,
}

impl<A, K, E> CredentialVerifier<A, K, E>
where
    A: AccountRepository,
    K: ApiKeyRepository,
    E: EventSink,
{
    pub fn new(accounts: A, api_keys: K, events: Arc<E>, config: AuthConfig) -> Self {
        Self {
            accounts,
            api_keys,
            events,
            config,
        }
    }

    async fn find_account(&self, tenant_id: Uuid, login: &str) -> TollgateResult<Account> {
        let timeout = self.config.store_timeout();
        match with_deadline(
            "account.get_by_username",
            timeout,
            self.accounts.get_by_username(tenant_id, login),
        )
        .await
        {
            Ok(account) => Ok(account),
            Err(TollgateError::NotFound { .. }) => with_deadline(
                "account.get_by_email",
                timeout,
                self.accounts.get_by_email(tenant_id, login),
            )
            .await
            .map_err(|e| match e {
                TollgateError::NotFound { .. } => AuthError::InvalidCredentials.into(),
                other => other,
            }),
            Err(e) => Err(e),
        }
    }

    async fn update_account(
        &self,
        account: &Account,
        update: UpdateAccount,
    ) -> TollgateResult<Account> {
        with_deadline(
            "account.update",
            self.config.store_timeout(),
            self.accounts.update(account.tenant_id, account.id, update),
        )
        .await
    }

    /// Run a password verification against a decoy hash and discard the
    /// result.
    pub fn verify_decoy(&self, secret: &str) {
        password::verify_decoy(secret, self.config.pepper.as_deref());
    }

    /// Verify a username-or-email plus password login within one tenant.
    ///
    /// Consecutive failures lock the account for a duration that grows
    /// with every lockout. Unknown and disabled accounts both report
    /// `InvalidCredentials` after the same hashing work as a wrong
    /// password.
    pub async fn verify_password_login(
        &self,
        tenant_id: Uuid,
        login: &str,
        secret: &str,
        origin: &ClientOrigin,
    ) -> TollgateResult<Account> {
        let account = match self.find_account(tenant_id, login).await {
            Ok(account) => account,
            Err(TollgateError::InvalidCredentials) => {
                self.verify_decoy(secret);
                return Err(TollgateError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        };
        let now = Utc::now();

        if account.status == AccountStatus::Disabled {
            self.verify_decoy(secret);
            return Err(AuthError::AccountDisabled.into());
        }
        if account.is_locked_at(now) {
            return Err(AuthError::AccountLocked {
                until: account.locked_until,
            }
            .into());
        }

        let valid = password::verify_password(
            secret,
            &account.credential_hash,
            self.config.pepper.as_deref(),
        )?;

        if !valid {
            return Err(self.record_failure(account, origin).await);
        }

        if account.failed_login_attempts > 0 || account.status == AccountStatus::Locked {
            let update = UpdateAccount {
                failed_login_attempts: Some(0),
                status: Some(AccountStatus::Active),
                locked_until: Some(None),
                ..Default::default()
            };
            return self.update_account(&account, update).await;
        }
        Ok(account)
    }

    /// Count a failed attempt, locking the account once the threshold is
    /// reached. Returns the error to surface.
    async fn record_failure(&self, account: Account, origin: &ClientOrigin) -> TollgateError {
        let attempts = account.failed_login_attempts + 1;
        let now = Utc::now();

        if attempts >= self.config.max_failed_login_attempts {
            let lockout_count = account.lockout_count + 1;
            let until = now + self.config.lockout_duration(lockout_count);
            let update = UpdateAccount {
                failed_login_attempts: Some(0),
                lockout_count: Some(lockout_count),
                status: Some(AccountStatus::Locked),
                locked_until: Some(Some(until)),
                ..Default::default()
            };
            if let Err(e) = self.update_account(&account, update).await {
                return e;
            }
            warn!(
                tenant_id = %account.tenant_id,
                account_id = %account.id,
                lockout_count,
                %until,
                "Account locked after repeated failed logins"
            );
            self.emit_audit(&account, AuditEventKind::AccountLocked, origin)
                .await;
            return AuthError::AccountLocked { until: Some(until) }.into();
        }

        let update = UpdateAccount {
            failed_login_attempts: Some(attempts),
            ..Default::default()
        };
        if let Err(e) = self.update_account(&account, update).await {
            return e;
        }
        self.emit_audit(&account, AuditEventKind::LoginFailed, origin)
            .await;
        AuthError::InvalidCredentials.into()
    }

    async fn emit_audit(&self, account: &Account, kind: AuditEventKind, origin: &ClientOrigin) {
        self.events
            .emit(ControlPlaneEvent::Security(
                CreateAuditEvent::new(account.tenant_id, kind)
                    .actor(account.id)
                    .origin(origin.clone()),
            ))
            .await;
    }

    /// Create an API key for an account. The raw key is returned once and
    /// never stored; requested scopes are narrowed to the account's.
    pub async fn create_api_key(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        name: String,
        scopes: Vec<String>,
    ) -> TollgateResult<(ApiKey, String)> {
        let timeout = self.config.store_timeout();
        let account = with_deadline(
            "account.get",
            timeout,
            self.accounts.get_by_id(tenant_id, account_id),
        )
        .await?;
        if account.status == AccountStatus::Disabled {
            return Err(TollgateError::Validation {
                message: "account is disabled".into(),
            });
        }

        let raw = generate_api_key();
        let input = CreateApiKey {
            tenant_id,
            account_id,
            name,
            prefix: raw[..DISPLAY_PREFIX_LEN].to_string(),
            key_hash: hash_api_key(&raw),
            scopes: scope::intersect(&scopes, &account.scopes),
        };
        let key = with_deadline("api_key.create", timeout, self.api_keys.create(input)).await?;
        debug!(
            tenant_id = %tenant_id,
            account_id = %account_id,
            key_id = %key.id,
            "API key created"
        );
        Ok((key, raw))
    }

    /// Verify a raw API key and build the request context. The key alone
    /// determines the tenant.
    pub async fn verify_api_key(&self, raw: &str) -> TollgateResult<AuthContext> {
        if !looks_like_api_key(raw) {
            return Err(AuthError::InvalidCredentials.into());
        }
        let timeout = self.config.store_timeout();
        let key = with_deadline(
            "api_key.get_by_hash",
            timeout,
            self.api_keys.get_by_hash(&hash_api_key(raw)),
        )
        .await
        .map_err(|e| match e {
            TollgateError::NotFound { .. } => AuthError::InvalidCredentials.into(),
            other => other,
        })?;
        if key.revoked {
            return Err(AuthError::InvalidCredentials.into());
        }

        let account = with_deadline(
            "account.get",
            timeout,
            self.accounts.get_by_id(key.tenant_id, key.account_id),
        )
        .await
        .map_err(|e| match e {
            TollgateError::NotFound { .. } => AuthError::InvalidCredentials.into(),
            other => other,
        })?;
        if account.status == AccountStatus::Disabled {
            return Err(AuthError::AccountDisabled.into());
        }

        if let Err(e) = with_deadline(
            "api_key.touch",
            timeout,
            self.api_keys.touch(key.tenant_id, key.id, Utc::now()),
        )
        .await
        {
            debug!(key_id = %key.id, error = %e, "Failed to record API key use");
        }

        // A key never grants more than its account currently holds.
        let scopes: BTreeSet<String> = scope::intersect(&key.scopes, &account.scopes)
            .into_iter()
            .collect();

        Ok(AuthContext {
            account_id: account.id,
            tenant_id: key.tenant_id,
            session_id: None,
            api_key_id: Some(key.id),
            scopes,
            method: AuthMethod::ApiKey,
        })
    }

    pub async fn list_api_keys(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
    ) -> TollgateResult<Vec<ApiKey>> {
        with_deadline(
            "api_key.list",
            self.config.store_timeout(),
            self.api_keys.list_by_account(tenant_id, account_id),
        )
        .await
    }

    pub async fn revoke_api_key(&self, tenant_id: Uuid, key_id: Uuid) -> TollgateResult<()> {
        with_deadline(
            "api_key.revoke",
            self.config.store_timeout(),
            self.api_keys.revoke(tenant_id, key_id),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_keys_have_prefix_and_hash_deterministically() {
        let raw = generate_api_key();
        assert!(looks_like_api_key(&raw));
        assert_eq!(raw.len(), API_KEY_PREFIX.len() + 64);
        assert_eq!(hash_api_key(&raw), hash_api_key(&raw));
        assert!(!looks_like_api_key("eyJhbGciOi"));
    }
}
