//! Integration tests for the response cache over the in-memory store.

use std::time::Duration;

use serde_json::json;
use tollgate_cache::{CacheConfig, CacheLookup, ResponseCache, fingerprint};
use tollgate_core::models::cache_entry::{CacheKey, TokenUsage};
use tollgate_core::models::completion::{
    CachePolicy, CompletionRequest, CompletionResponse, SamplingParams,
};
use tollgate_core::money::Money;
use tollgate_db::MemoryStore;
use uuid::Uuid;

fn request(question: &str) -> CompletionRequest {
    CompletionRequest {
        model: "m-small".into(),
        input: json!([{ "role": "user", "content": question }]),
        params: SamplingParams::default(),
        cache_policy: CachePolicy::Cacheable,
        estimated_cost: Money::from_units(1),
    }
}

fn response(text: &str) -> CompletionResponse {
    CompletionResponse {
        payload: json!({ "text": text }),
        usage: TokenUsage {
            prompt_tokens: 12,
            completion_tokens: 40,
        },
        cost: Money::from_micros(4_200),
    }
}

fn cache() -> (ResponseCache<MemoryStore>, MemoryStore) {
    let store = MemoryStore::new();
    (ResponseCache::new(store.clone(), CacheConfig::default()), store)
}

#[tokio::test]
async fn store_then_lookup_hits_and_counts() {
    let (cache, _) = cache();
    let tenant = Uuid::new_v4();
    let key = fingerprint(tenant, &request("What is VAT?"));

    assert!(!cache.lookup(tenant, &key).await.is_hit());
    cache
        .store(tenant, key.clone(), "m-small", &response("A tax."), None)
        .await;

    for expected_hits in 1..=3 {
        match cache.lookup(tenant, &key).await {
            CacheLookup::Hit(entry) => {
                assert_eq!(entry.payload, json!({ "text": "A tax." }));
                assert_eq!(entry.cost, Money::from_micros(4_200));
                assert_eq!(entry.hit_count, expected_hits);
                assert!(entry.last_hit_at.is_some());
            }
            CacheLookup::Miss => panic!("expected a hit"),
        }
    }
}

#[tokio::test]
async fn other_tenants_never_see_the_entry() {
    let (cache, _) = cache();
    let (owner, stranger) = (Uuid::new_v4(), Uuid::new_v4());
    let key = fingerprint(owner, &request("secret plan"));
    cache
        .store(owner, key.clone(), "m-small", &response("42"), None)
        .await;

    // Even presenting the owner's exact key from another tenant misses.
    assert!(!cache.lookup(stranger, &key).await.is_hit());
    assert!(cache.lookup(owner, &key).await.is_hit());
}

#[tokio::test]
async fn last_writer_wins() {
    let (cache, _) = cache();
    let tenant = Uuid::new_v4();
    let key = fingerprint(tenant, &request("q"));
    cache
        .store(tenant, key.clone(), "m-small", &response("first"), None)
        .await;
    cache
        .store(tenant, key.clone(), "m-small", &response("second"), None)
        .await;

    let CacheLookup::Hit(entry) = cache.lookup(tenant, &key).await else {
        panic!("expected a hit");
    };
    assert_eq!(entry.payload, json!({ "text": "second" }));
}

#[tokio::test]
async fn expired_entries_miss_and_are_evicted() {
    let (cache, _) = cache();
    let tenant = Uuid::new_v4();
    let key = fingerprint(tenant, &request("stale"));
    cache
        .store(tenant, key.clone(), "m-small", &response("old"), Some(Duration::ZERO))
        .await;

    assert!(!cache.lookup(tenant, &key).await.is_hit());
    assert_eq!(cache.evict_expired().await.unwrap(), 1);
    assert_eq!(cache.evict_expired().await.unwrap(), 0);
}

#[tokio::test]
async fn purge_removes_only_that_tenant() {
    let (cache, _) = cache();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let key_a1 = fingerprint(a, &request("one"));
    let key_a2 = fingerprint(a, &request("two"));
    let key_b = fingerprint(b, &request("one"));
    for (tenant, key) in [(a, &key_a1), (a, &key_a2), (b, &key_b)] {
        cache
            .store(tenant, key.clone(), "m-small", &response("x"), None)
            .await;
    }

    assert!(cache.purge_key(a, &key_a1).await.unwrap());
    assert!(!cache.purge_key(a, &CacheKey::new("0".repeat(64))).await.unwrap());
    assert_eq!(cache.purge(a).await.unwrap(), 1);
    assert!(!cache.lookup(a, &key_a2).await.is_hit());
    assert!(cache.lookup(b, &key_b).await.is_hit());
}

#[tokio::test(start_paused = true)]
async fn slow_store_is_a_miss_not_an_error() {
    let (cache, store) = cache();
    let tenant = Uuid::new_v4();
    let key = fingerprint(tenant, &request("slow"));
    cache
        .store(tenant, key.clone(), "m-small", &response("x"), None)
        .await;

    store.set_latency(Duration::from_secs(10));
    assert!(!cache.lookup(tenant, &key).await.is_hit());

    // Writes time out quietly too.
    cache
        .store(tenant, key.clone(), "m-small", &response("y"), None)
        .await;
}
