//! Integration tests for registration, login and the session lifecycle.

mod common;

use common::{Fixture, PASSWORD, browser, test_config};
use surrealdb::Surreal;
use surrealdb::engine::local::Mem;
use tollgate_auth::token::JwtKeys;
use tollgate_auth::{AuthConfig, SessionManager};
use tollgate_core::error::TollgateError;
use tollgate_core::events::TracingEventSink;
use tollgate_core::models::account::{AccountKind, AccountStatus, CreateAccount};
use tollgate_core::models::audit::AuditEventKind;
use tollgate_core::models::auth_context::AuthMethod;
use tollgate_core::models::session::{ClientOrigin, RevocationReason};
use tollgate_core::models::tenant::CreateTenant;
use tollgate_core::money::Money;
use tollgate_core::repository::{AccountRepository, SessionRepository, TenantRepository};
use tollgate_core::scope;
use tollgate_db::repository::{
    SurrealAccountRepository, SurrealSessionRepository, SurrealTenantRepository,
};

#[tokio::test]
async fn login_issues_tokens_bound_to_tenant() {
    let fx = Fixture::new().await;
    let issued = fx
        .auth
        .login(fx.login_input(PASSWORD, browser()))
        .await
        .unwrap();

    assert_eq!(issued.tokens.token_type, "Bearer");
    assert_eq!(issued.session.tenant_id, fx.tenant.id);

    let ctx = fx
        .auth
        .authenticate(&issued.tokens.access_token)
        .await
        .unwrap();
    assert_eq!(ctx.tenant_id, fx.tenant.id);
    assert_eq!(ctx.account_id, fx.account.id);
    assert_eq!(ctx.method, AuthMethod::AccessToken);
    assert!(ctx.has_scope(scope::COMPLETIONS_CREATE));
}

#[tokio::test]
async fn login_by_email_works() {
    let fx = Fixture::new().await;
    let mut input = fx.login_input(PASSWORD, browser());
    input.login = "alice@example.com".into();
    assert!(fx.auth.login(input).await.is_ok());
}

#[tokio::test]
async fn unknown_tenant_and_wrong_password_look_alike() {
    let fx = Fixture::new().await;

    let mut input = fx.login_input(PASSWORD, browser());
    input.tenant = "no-such-tenant".into();
    let err = fx.auth.login(input).await.unwrap_err();
    assert!(matches!(err, TollgateError::InvalidCredentials));

    let err = fx
        .auth
        .login(fx.login_input("wrong-password-entirely", browser()))
        .await
        .unwrap_err();
    assert!(matches!(err, TollgateError::InvalidCredentials));
}

#[tokio::test]
async fn unknown_account_is_rejected_without_touching_real_accounts() {
    let mut fx = Fixture::new().await;
    let mut input = fx.login_input(PASSWORD, browser());
    input.login = "mallory".into();
    let err = fx.auth.login(input).await.unwrap_err();
    assert!(matches!(err, TollgateError::InvalidCredentials));

    fx.auth.credentials().verify_decoy(PASSWORD);

    let account = AccountRepository::get_by_id(&fx.store, fx.tenant.id, fx.account.id)
        .await
        .unwrap();
    assert_eq!(account.failed_login_attempts, 0);
    assert!(fx.drain_security_events().is_empty());
}

#[tokio::test]
async fn short_password_is_rejected_at_registration() {
    let fx = Fixture::new().await;
    let err = fx
        .auth
        .register(tollgate_auth::RegisterInput {
            tenant_id: fx.tenant.id,
            username: "bob".into(),
            email: "bob@example.com".into(),
            password: "short".into(),
            kind: AccountKind::Human,
            scopes: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, TollgateError::Validation { .. }));
}

#[tokio::test]
async fn refresh_rotates_and_old_token_is_single_use() {
    let mut fx = Fixture::new().await;
    let issued = fx
        .auth
        .login(fx.login_input(PASSWORD, browser()))
        .await
        .unwrap();
    let first = issued.tokens.refresh_token;

    let rotated = fx.auth.refresh(&first, browser()).await.unwrap();
    assert_ne!(rotated.refresh_token, first);

    // Replaying the redeemed token kills the session.
    let err = fx.auth.refresh(&first, browser()).await.unwrap_err();
    assert!(matches!(err, TollgateError::InvalidToken { .. }));

    let session = SessionRepository::get_by_id(&fx.store, fx.tenant.id, issued.session.id)
        .await
        .unwrap();
    assert!(session.revoked);
    assert_eq!(session.revoked_reason, Some(RevocationReason::ReplayDetected));

    // Even the legitimately rotated token is now dead.
    let err = fx
        .auth
        .refresh(&rotated.refresh_token, browser())
        .await
        .unwrap_err();
    assert!(matches!(err, TollgateError::SessionRevoked));

    assert!(
        fx.drain_security_events()
            .contains(&AuditEventKind::RefreshReplay)
    );
}

#[tokio::test]
async fn concurrent_refreshes_yield_one_success() {
    let fx = Fixture::new().await;
    let issued = fx
        .auth
        .login(fx.login_input(PASSWORD, browser()))
        .await
        .unwrap();
    let token = issued.tokens.refresh_token;

    let (a, b) = tokio::join!(
        fx.auth.refresh(&token, browser()),
        fx.auth.refresh(&token, browser())
    );
    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn third_login_evicts_oldest_session() {
    let mut fx = Fixture::with_config(AuthConfig {
        max_concurrent_sessions: 2,
        ..test_config()
    })
    .await;

    let oldest = fx
        .auth
        .login(fx.login_input(PASSWORD, browser()))
        .await
        .unwrap();
    let second = fx
        .auth
        .login(fx.login_input(PASSWORD, browser()))
        .await
        .unwrap();
    let third = fx
        .auth
        .login(fx.login_input(PASSWORD, browser()))
        .await
        .unwrap();
    assert_eq!(third.evicted, vec![oldest.session.id]);

    let err = fx
        .auth
        .refresh(&oldest.tokens.refresh_token, browser())
        .await
        .unwrap_err();
    assert!(matches!(err, TollgateError::SessionRevoked));
    assert!(
        fx.auth
            .refresh(&second.tokens.refresh_token, browser())
            .await
            .is_ok()
    );

    let active = fx
        .auth
        .sessions()
        .list_active(fx.tenant.id, fx.account.id)
        .await
        .unwrap();
    assert_eq!(active.len(), 2);
    assert!(
        fx.drain_security_events()
            .contains(&AuditEventKind::SessionEvicted)
    );
}

#[tokio::test]
async fn refresh_from_different_origin_revokes_session() {
    let mut fx = Fixture::new().await;
    let issued = fx
        .auth
        .login(fx.login_input(PASSWORD, browser()))
        .await
        .unwrap();

    let elsewhere = ClientOrigin::new("198.51.100.99", "curl/8.4.0");
    let err = fx
        .auth
        .refresh(&issued.tokens.refresh_token, elsewhere)
        .await
        .unwrap_err();
    assert!(matches!(err, TollgateError::SessionRevoked));

    let session = SessionRepository::get_by_id(&fx.store, fx.tenant.id, issued.session.id)
        .await
        .unwrap();
    assert_eq!(session.revoked_reason, Some(RevocationReason::SuspiciousOrigin));
    assert_eq!(
        fx.drain_security_events(),
        vec![AuditEventKind::SuspiciousOrigin]
    );

    // Re-authentication is required; the same token stays dead.
    let err = fx
        .auth
        .refresh(&issued.tokens.refresh_token, browser())
        .await
        .unwrap_err();
    assert!(matches!(err, TollgateError::SessionRevoked));
}

#[tokio::test]
async fn withholding_the_client_signature_does_not_bypass_the_origin_check() {
    let mut fx = Fixture::new().await;
    let issued = fx
        .auth
        .login(fx.login_input(PASSWORD, browser()))
        .await
        .unwrap();

    let no_agent = ClientOrigin {
        ip_address: Some("198.51.100.99".into()),
        user_agent: None,
    };
    let err = fx
        .auth
        .refresh(&issued.tokens.refresh_token, no_agent)
        .await
        .unwrap_err();
    assert!(matches!(err, TollgateError::SessionRevoked));
    assert_eq!(
        fx.drain_security_events(),
        vec![AuditEventKind::SuspiciousOrigin]
    );
}

#[tokio::test]
async fn rotation_keeps_the_recorded_client_signature() {
    let fx = Fixture::new().await;
    let issued = fx
        .auth
        .login(fx.login_input(PASSWORD, browser()))
        .await
        .unwrap();

    // Same address, no user agent: tolerated, but the recorded agent stays.
    let same_ip = ClientOrigin {
        ip_address: browser().ip_address,
        user_agent: None,
    };
    let pair = fx
        .auth
        .refresh(&issued.tokens.refresh_token, same_ip)
        .await
        .unwrap();
    let session = SessionRepository::get_by_id(&fx.store, fx.tenant.id, issued.session.id)
        .await
        .unwrap();
    assert_eq!(session.origin, browser());

    // Both fields now differ from what was recorded at login.
    let err = fx
        .auth
        .refresh(
            &pair.refresh_token,
            ClientOrigin::new("192.0.2.50", "curl/8.4.0"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TollgateError::SessionRevoked));
}

#[tokio::test]
async fn rotation_timeout_fails_closed_and_keeps_the_token() {
    let config = AuthConfig {
        store_timeout_ms: 50,
        ..test_config()
    };
    let fx = Fixture::with_config(config).await;
    let issued = fx
        .auth
        .login(fx.login_input(PASSWORD, browser()))
        .await
        .unwrap();
    let before = SessionRepository::get_by_id(&fx.store, fx.tenant.id, issued.session.id)
        .await
        .unwrap();

    fx.store.set_operation_latency(
        "session.rotate_refresh_token",
        std::time::Duration::from_secs(2),
    );
    let err = fx
        .auth
        .refresh(&issued.tokens.refresh_token, browser())
        .await
        .unwrap_err();
    assert!(matches!(err, TollgateError::ServiceUnavailable(_)));

    let after = SessionRepository::get_by_id(&fx.store, fx.tenant.id, issued.session.id)
        .await
        .unwrap();
    assert!(!after.revoked);
    assert_eq!(after.refresh_token_id, before.refresh_token_id);

    // Once the store recovers the same token is still redeemable, once.
    fx.store.set_operation_latency(
        "session.rotate_refresh_token",
        std::time::Duration::ZERO,
    );
    fx.auth
        .refresh(&issued.tokens.refresh_token, browser())
        .await
        .unwrap();
    let err = fx
        .auth
        .refresh(&issued.tokens.refresh_token, browser())
        .await
        .unwrap_err();
    assert!(matches!(err, TollgateError::InvalidToken { .. }));
}

#[tokio::test]
async fn address_change_alone_is_tolerated() {
    let fx = Fixture::new().await;
    let issued = fx
        .auth
        .login(fx.login_input(PASSWORD, browser()))
        .await
        .unwrap();
    let mut roaming = browser();
    roaming.ip_address = Some("192.0.2.200".into());
    assert!(
        fx.auth
            .refresh(&issued.tokens.refresh_token, roaming)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn repeated_failures_lock_the_account() {
    let mut fx = Fixture::with_config(AuthConfig {
        max_failed_login_attempts: 3,
        ..test_config()
    })
    .await;

    for _ in 0..2 {
        let err = fx
            .auth
            .login(fx.login_input("not-the-password", browser()))
            .await
            .unwrap_err();
        assert!(matches!(err, TollgateError::InvalidCredentials));
    }
    let err = fx
        .auth
        .login(fx.login_input("not-the-password", browser()))
        .await
        .unwrap_err();
    assert!(matches!(err, TollgateError::AccountLocked { until: Some(_) }));

    // The correct password does not get through while locked.
    let err = fx
        .auth
        .login(fx.login_input(PASSWORD, browser()))
        .await
        .unwrap_err();
    assert!(matches!(err, TollgateError::AccountLocked { .. }));

    let account = AccountRepository::get_by_id(&fx.store, fx.tenant.id, fx.account.id)
        .await
        .unwrap();
    assert_eq!(account.status, AccountStatus::Locked);
    assert_eq!(account.lockout_count, 1);
    assert_eq!(
        fx.drain_security_events(),
        vec![
            AuditEventKind::LoginFailed,
            AuditEventKind::LoginFailed,
            AuditEventKind::AccountLocked
        ]
    );
}

#[tokio::test]
async fn api_key_authenticates_and_can_be_revoked() {
    let fx = Fixture::new().await;
    let (key, raw) = fx
        .auth
        .credentials()
        .create_api_key(
            fx.tenant.id,
            fx.account.id,
            "ci".into(),
            vec![scope::COMPLETIONS_CREATE.into(), scope::ADMIN_WRITE.into()],
        )
        .await
        .unwrap();
    assert!(raw.starts_with("tg_"));
    assert!(raw.starts_with(&key.prefix));
    // Not held by the account, so not granted.
    assert_eq!(key.scopes, vec![scope::COMPLETIONS_CREATE]);

    let ctx = fx.auth.authenticate(&raw).await.unwrap();
    assert_eq!(ctx.method, AuthMethod::ApiKey);
    assert_eq!(ctx.tenant_id, fx.tenant.id);
    assert_eq!(ctx.api_key_id, Some(key.id));
    assert!(ctx.session_id.is_none());

    fx.auth
        .credentials()
        .revoke_api_key(fx.tenant.id, key.id)
        .await
        .unwrap();
    let err = fx.auth.authenticate(&raw).await.unwrap_err();
    assert!(matches!(err, TollgateError::InvalidCredentials));
}

#[tokio::test]
async fn password_rotation_signs_out_other_sessions() {
    let fx = Fixture::new().await;
    let keep = fx
        .auth
        .login(fx.login_input(PASSWORD, browser()))
        .await
        .unwrap();
    let other = fx
        .auth
        .login(fx.login_input(PASSWORD, browser()))
        .await
        .unwrap();

    let ctx = fx.auth.authenticate(&keep.tokens.access_token).await.unwrap();
    let revoked = fx
        .auth
        .rotate_password(&ctx, PASSWORD, "an-even-better-passphrase")
        .await
        .unwrap();
    assert_eq!(revoked, 1);

    let err = fx
        .auth
        .refresh(&other.tokens.refresh_token, browser())
        .await
        .unwrap_err();
    assert!(matches!(err, TollgateError::SessionRevoked));
    assert!(
        fx.auth
            .login(fx.login_input("an-even-better-passphrase", browser()))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn surreal_backed_replay_detection() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    tollgate_db::run_migrations(&db).await.unwrap();

    let tenant = SurrealTenantRepository::new(db.clone())
        .create(CreateTenant {
            name: "Acme".into(),
            slug: "acme".into(),
            allowed_scopes: vec![scope::CONVERSATIONS_READ.into()],
            budget_limit: Money::from_units(100),
        })
        .await
        .unwrap();
    let account = SurrealAccountRepository::new(db.clone())
        .create(CreateAccount {
            tenant_id: tenant.id,
            username: "alice".into(),
            email: "alice@example.com".into(),
            credential_hash: "unused".into(),
            kind: AccountKind::Human,
            scopes: vec![scope::CONVERSATIONS_READ.into()],
        })
        .await
        .unwrap();

    let config = test_config();
    let keys = JwtKeys::from_config(&config).unwrap();
    let sessions = SurrealSessionRepository::new(db.clone());
    let manager = SessionManager::new(
        sessions.clone(),
        keys,
        std::sync::Arc::new(TracingEventSink),
        config,
    );

    let issued = manager.issue(&account, &tenant, browser()).await.unwrap();
    let rotated = manager
        .refresh(&issued.tokens.refresh_token, browser())
        .await
        .unwrap();
    assert!(manager.validate(&rotated.access_token).is_ok());

    let err = manager
        .refresh(&issued.tokens.refresh_token, browser())
        .await
        .unwrap_err();
    assert!(matches!(err, TollgateError::InvalidToken { .. }));

    let stored = sessions.get_by_id(tenant.id, issued.session.id).await.unwrap();
    assert_eq!(stored.revoked_reason, Some(RevocationReason::ReplayDetected));
}
