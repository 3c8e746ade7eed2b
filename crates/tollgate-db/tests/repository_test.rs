//! Integration tests for the SurrealDB repositories.

use chrono::{Duration, Utc};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use tollgate_core::error::TollgateError;
use tollgate_core::models::account::{AccountKind, AccountStatus, CreateAccount, UpdateAccount};
use tollgate_core::models::audit::{AuditEventKind, CreateAuditEvent};
use tollgate_core::models::budget::{CommitReservation, CreateBudgetAlert, CreateSpendRecord};
use tollgate_core::models::cache_entry::{CacheKey, StoreCacheEntry, TokenUsage};
use tollgate_core::models::session::{
    ClientOrigin, CreateSession, RevocationReason, RotateRefreshToken,
};
use tollgate_core::models::tenant::{CreateTenant, TenantStatus};
use tollgate_core::money::Money;
use tollgate_core::repository::{
    AccountRepository, AuditEventFilter, AuditLogRepository, BudgetLedgerRepository,
    CacheRepository, Pagination, SessionRepository, TenantRepository,
};
use tollgate_db::repository::{
    SurrealAccountRepository, SurrealAuditLogRepository, SurrealBudgetLedgerRepository,
    SurrealCacheRepository, SurrealSessionRepository, SurrealTenantRepository,
};
use uuid::Uuid;

async fn setup() -> (Surreal<Db>, Uuid) {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    tollgate_db::run_migrations(&db).await.unwrap();

    let tenant = SurrealTenantRepository::new(db.clone())
        .create(CreateTenant {
            name: "Acme".into(),
            slug: "acme".into(),
            allowed_scopes: vec!["conversations:read".into()],
            budget_limit: Money::from_units(100),
        })
        .await
        .unwrap();

    (db, tenant.id)
}

fn new_session(tenant_id: Uuid, account_id: Uuid, token_id: &str) -> CreateSession {
    CreateSession {
        id: Uuid::new_v4(),
        tenant_id,
        account_id,
        scopes: vec!["conversations:read".into()],
        refresh_token_id: token_id.into(),
        origin: ClientOrigin::new("10.0.0.1", "cli/1.0"),
        expires_at: Utc::now() + Duration::days(14),
    }
}

// ---------------------------------------------------------------------------
// Tenants and accounts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tenant_slug_is_unique() {
    let (db, _) = setup().await;
    let repo = SurrealTenantRepository::new(db);

    let err = repo
        .create(CreateTenant {
            name: "Acme again".into(),
            slug: "acme".into(),
            allowed_scopes: vec![],
            budget_limit: Money::from_units(1),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, TollgateError::AlreadyExists { .. }));

    let found = repo.get_by_slug("acme").await.unwrap();
    assert_eq!(found.name, "Acme");
    assert_eq!(found.status, TenantStatus::Active);
}

#[tokio::test]
async fn accounts_are_invisible_across_tenants() {
    let (db, tenant_id) = setup().await;
    let repo = SurrealAccountRepository::new(db);

    let account = repo
        .create(CreateAccount {
            tenant_id,
            username: "alice".into(),
            email: "alice@example.com".into(),
            credential_hash: "$argon2id$stub".into(),
            kind: AccountKind::Human,
            scopes: vec![],
        })
        .await
        .unwrap();

    let other_tenant = Uuid::new_v4();
    assert!(
        repo.get_by_id(other_tenant, account.id)
            .await
            .unwrap_err()
            .is_not_found()
    );
    assert!(
        repo.get_by_username(other_tenant, "alice")
            .await
            .unwrap_err()
            .is_not_found()
    );

    let updated = repo
        .update(
            tenant_id,
            account.id,
            UpdateAccount {
                failed_login_attempts: Some(3),
                locked_until: Some(Some(Utc::now() + Duration::minutes(5))),
                status: Some(AccountStatus::Locked),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.failed_login_attempts, 3);
    assert!(updated.locked_until.is_some());

    let cleared = repo
        .update(
            tenant_id,
            account.id,
            UpdateAccount {
                locked_until: Some(None),
                status: Some(AccountStatus::Active),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(cleared.locked_until.is_none());
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn refresh_rotation_succeeds_once() {
    let (db, tenant_id) = setup().await;
    let repo = SurrealSessionRepository::new(db);
    let session = repo
        .create(new_session(tenant_id, Uuid::new_v4(), "rti-1"))
        .await
        .unwrap();

    let rotate = || RotateRefreshToken {
        expected_token_id: "rti-1".into(),
        new_token_id: "rti-2".into(),
        origin: ClientOrigin::new("10.0.0.1", "cli/1.0"),
        expires_at: Utc::now() + Duration::days(14),
        now: Utc::now(),
    };

    let first = repo
        .rotate_refresh_token(tenant_id, session.id, rotate())
        .await
        .unwrap();
    assert_eq!(first.unwrap().refresh_token_id, "rti-2");

    let second = repo
        .rotate_refresh_token(tenant_id, session.id, rotate())
        .await
        .unwrap();
    assert!(second.is_none());
}

#[tokio::test]
async fn revoked_session_cannot_rotate() {
    let (db, tenant_id) = setup().await;
    let repo = SurrealSessionRepository::new(db);
    let session = repo
        .create(new_session(tenant_id, Uuid::new_v4(), "rti-1"))
        .await
        .unwrap();

    assert!(
        repo.revoke(tenant_id, session.id, RevocationReason::Logout)
            .await
            .unwrap()
    );
    // Second revoke is a no-op.
    assert!(
        !repo
            .revoke(tenant_id, session.id, RevocationReason::Logout)
            .await
            .unwrap()
    );

    let rotated = repo
        .rotate_refresh_token(
            tenant_id,
            session.id,
            RotateRefreshToken {
                expected_token_id: "rti-1".into(),
                new_token_id: "rti-2".into(),
                origin: ClientOrigin::default(),
                expires_at: Utc::now() + Duration::days(1),
                now: Utc::now(),
            },
        )
        .await
        .unwrap();
    assert!(rotated.is_none());

    let stored = repo.get_by_id(tenant_id, session.id).await.unwrap();
    assert_eq!(stored.revoked_reason, Some(RevocationReason::Logout));
}

#[tokio::test]
async fn revoke_all_spares_the_current_session() {
    let (db, tenant_id) = setup().await;
    let repo = SurrealSessionRepository::new(db);
    let account_id = Uuid::new_v4();

    let keep = repo
        .create(new_session(tenant_id, account_id, "a"))
        .await
        .unwrap();
    repo.create(new_session(tenant_id, account_id, "b"))
        .await
        .unwrap();
    repo.create(new_session(tenant_id, account_id, "c"))
        .await
        .unwrap();

    let revoked = repo
        .revoke_account_sessions(
            tenant_id,
            account_id,
            Some(keep.id),
            RevocationReason::SignOutEverywhere,
        )
        .await
        .unwrap();
    assert_eq!(revoked, 2);

    let active = repo
        .list_active(tenant_id, account_id, Utc::now())
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, keep.id);
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cache_hits_are_tenant_scoped_and_counted() {
    let (db, tenant_id) = setup().await;
    let repo = SurrealCacheRepository::new(db);
    let key = CacheKey::new("f00d");

    repo.upsert(StoreCacheEntry {
        key: key.clone(),
        tenant_id,
        model: "gpt-x".into(),
        payload: serde_json::json!({"text": "hello"}),
        usage: TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
        },
        cost: Money::from_micros(1_500),
        expires_at: Utc::now() + Duration::hours(1),
    })
    .await
    .unwrap();

    assert!(
        repo.record_hit(Uuid::new_v4(), &key, Utc::now())
            .await
            .unwrap()
            .is_none()
    );

    repo.record_hit(tenant_id, &key, Utc::now()).await.unwrap();
    let hit = repo
        .record_hit(tenant_id, &key, Utc::now())
        .await
        .unwrap()
        .expect("entry should be live");
    assert_eq!(hit.hit_count, 2);
    assert_eq!(hit.cost, Money::from_micros(1_500));

    assert_eq!(repo.delete_tenant(tenant_id).await.unwrap(), 1);
    assert!(
        repo.record_hit(tenant_id, &key, Utc::now())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn expired_cache_entries_are_swept() {
    let (db, tenant_id) = setup().await;
    let repo = SurrealCacheRepository::new(db);
    let key = CacheKey::new("stale");

    repo.upsert(StoreCacheEntry {
        key: key.clone(),
        tenant_id,
        model: "gpt-x".into(),
        payload: serde_json::json!("old"),
        usage: TokenUsage::default(),
        cost: Money::ZERO,
        expires_at: Utc::now() - Duration::seconds(1),
    })
    .await
    .unwrap();

    assert!(
        repo.record_hit(tenant_id, &key, Utc::now())
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(repo.delete_expired(Utc::now()).await.unwrap(), 1);
}

// ---------------------------------------------------------------------------
// Budget ledger
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reservation_respects_the_limit() {
    let (db, tenant_id) = setup().await;
    let ledger = SurrealBudgetLedgerRepository::new(db);

    let state = ledger
        .try_reserve(tenant_id, Money::from_units(95))
        .await
        .unwrap()
        .expect("95 of 100 fits");
    assert_eq!(state.reserved, Money::from_units(95));

    assert!(
        ledger
            .try_reserve(tenant_id, Money::from_units(10))
            .await
            .unwrap()
            .is_none()
    );

    let settled = ledger
        .settle(tenant_id, Money::from_units(95), Money::from_units(90))
        .await
        .unwrap();
    assert_eq!(settled.reserved, Money::ZERO);
    assert_eq!(settled.committed, Money::from_units(90));
}

#[tokio::test]
async fn reservation_for_unknown_tenant_is_not_found() {
    let (db, _) = setup().await;
    let ledger = SurrealBudgetLedgerRepository::new(db);
    let err = ledger
        .try_reserve(Uuid::new_v4(), Money::from_units(1))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn suspension_blocks_reservations_until_period_reset() {
    let (db, tenant_id) = setup().await;
    let ledger = SurrealBudgetLedgerRepository::new(db);

    ledger
        .set_status(tenant_id, TenantStatus::Suspended, 100)
        .await
        .unwrap();
    assert!(
        ledger
            .try_reserve(tenant_id, Money::from_units(1))
            .await
            .unwrap()
            .is_none()
    );

    let reset = ledger.reset_period(tenant_id, Utc::now()).await.unwrap();
    assert_eq!(reset.status, TenantStatus::Active);
    assert_eq!(reset.alert_level, 0);
    assert!(
        ledger
            .try_reserve(tenant_id, Money::from_units(1))
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn spend_and_alert_ledgers() {
    let (db, tenant_id) = setup().await;
    let ledger = SurrealBudgetLedgerRepository::new(db);
    let since = Utc::now() - Duration::seconds(5);

    ledger
        .append_spend(CreateSpendRecord {
            tenant_id,
            account_id: Uuid::new_v4(),
            amount: Money::from_units(3),
            cache_served: false,
            reservation_id: Some(Uuid::new_v4()),
            model: Some("gpt-x".into()),
        })
        .await
        .unwrap();
    let spend = ledger
        .list_spend(tenant_id, since, Pagination::default())
        .await
        .unwrap();
    assert_eq!(spend.total, 1);
    assert_eq!(spend.items[0].amount, Money::from_units(3));

    let alert = ledger
        .append_alert(CreateBudgetAlert {
            tenant_id,
            threshold_pct: 75,
            spend_at_alert: Money::from_units(75),
            limit: Money::from_units(100),
        })
        .await
        .unwrap();
    assert!(!alert.acknowledged);

    let acked = ledger.acknowledge_alert(tenant_id, alert.id).await.unwrap();
    assert!(acked.acknowledged);

    // Another tenant cannot acknowledge it.
    assert!(
        ledger
            .acknowledge_alert(Uuid::new_v4(), alert.id)
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn reservation_commit_is_atomic_and_applied_once() {
    let (db, tenant_id) = setup().await;
    let ledger = SurrealBudgetLedgerRepository::new(db);
    let since = Utc::now() - Duration::seconds(5);

    ledger
        .try_reserve(tenant_id, Money::from_units(10))
        .await
        .unwrap()
        .unwrap();
    let commit = CommitReservation {
        tenant_id,
        account_id: Uuid::new_v4(),
        reservation_id: Uuid::new_v4(),
        estimated: Money::from_units(10),
        actual: Money::from_units(7),
        model: Some("gpt-x".into()),
    };

    let state = ledger
        .commit_reservation(commit.clone())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.committed, Money::from_units(7));
    assert_eq!(state.reserved, Money::ZERO);

    assert!(ledger.commit_reservation(commit.clone()).await.unwrap().is_none());
    let state = ledger.get_state(tenant_id).await.unwrap();
    assert_eq!(state.committed, Money::from_units(7));

    let spend = ledger
        .list_spend(tenant_id, since, Pagination::default())
        .await
        .unwrap();
    assert_eq!(spend.total, 1);
    assert_eq!(spend.items[0].id, commit.reservation_id);
    assert_eq!(spend.items[0].reservation_id, Some(commit.reservation_id));
}

// ---------------------------------------------------------------------------
// Audit log
// ---------------------------------------------------------------------------

#[tokio::test]
async fn audit_events_filter_by_kind() {
    let (db, tenant_id) = setup().await;
    let repo = SurrealAuditLogRepository::new(db);
    let actor = Uuid::new_v4();

    repo.append(CreateAuditEvent::new(tenant_id, AuditEventKind::LoginFailed).actor(actor))
        .await
        .unwrap();
    repo.append(
        CreateAuditEvent::new(tenant_id, AuditEventKind::RefreshReplay)
            .actor(actor)
            .session(Uuid::new_v4())
            .metadata(serde_json::json!({"reason": "rotated token reused"})),
    )
    .await
    .unwrap();

    let replays = repo
        .list(
            tenant_id,
            AuditEventFilter {
                kind: Some(AuditEventKind::RefreshReplay),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(replays.total, 1);
    assert_eq!(replays.items[0].actor_id, Some(actor));

    let other = repo
        .list(
            Uuid::new_v4(),
            AuditEventFilter::default(),
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(other.total, 0);
}
