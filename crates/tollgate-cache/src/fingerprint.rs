//! Request fingerprinting.
//!
//! A key is the SHA-256 of a versioned, domain-separated encoding of the
//! tenant id, the model, the canonicalized request content and every
//! sampling parameter that changes the output. Each field is length
//! prefixed and each optional field carries a presence tag, so no two
//! field sequences encode to the same bytes.

use serde_json::Value;
use sha2::{Digest, Sha256};
use tollgate_core::models::cache_entry::CacheKey;
use tollgate_core::models::completion::{CachePolicy, CompletionRequest, SamplingParams};
use uuid::Uuid;

use crate::config::CacheConfig;

/// Bump when the encoding below changes; old entries then simply miss.
const DOMAIN: &[u8] = b"tollgate/response-cache/v2";

/// Whether a request may be served from, or written to, the cache.
pub fn is_cacheable(request: &CompletionRequest, config: &CacheConfig) -> bool {
    request.cache_policy == CachePolicy::Cacheable
        && request.params.temperature <= config.max_cacheable_temperature
}

/// Derive the cache key for `request` within `tenant_id`.
pub fn fingerprint(tenant_id: Uuid, request: &CompletionRequest) -> CacheKey {
    let mut hasher = Sha256::new();
    write_field(&mut hasher, DOMAIN);
    write_field(&mut hasher, tenant_id.as_bytes());
    write_field(&mut hasher, request.model.trim().as_bytes());
    write_field(&mut hasher, canonical_json(&request.input).as_bytes());
    write_params(&mut hasher, &request.params);
    CacheKey::new(hex::encode(hasher.finalize()))
}

fn write_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

/// Tag byte 0 for an absent value, 1 followed by the field when present.
fn write_optional<B: AsRef<[u8]>>(hasher: &mut Sha256, value: Option<B>) {
    match value {
        Some(bytes) => {
            hasher.update([1]);
            write_field(hasher, bytes.as_ref());
        }
        None => hasher.update([0]),
    }
}

fn write_params(hasher: &mut Sha256, params: &SamplingParams) {
    // -0.0 and 0.0 sample identically.
    let temperature = if params.temperature == 0.0 {
        0.0f32
    } else {
        params.temperature
    };
    write_field(hasher, &temperature.to_bits().to_be_bytes());
    write_optional(hasher, params.top_p.map(|p| p.to_bits().to_be_bytes()));
    write_optional(hasher, params.max_tokens.map(u32::to_be_bytes));
    write_optional(hasher, params.seed.map(u64::to_be_bytes));
    let mut stop = params.stop.clone();
    stop.sort();
    stop.dedup();
    write_field(hasher, &(stop.len() as u64).to_be_bytes());
    for s in &stop {
        write_field(hasher, s.as_bytes());
    }
}

/// Serialize with object keys sorted and string leaves trimmed and with
/// `\r\n` folded to `\n`, so cosmetic differences do not split the cache.
fn canonical_json(value: &Value) -> String {
    fn normalize(value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(s.replace("\r\n", "\n").trim().to_owned()),
            Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
            Value::Object(map) => {
                let mut entries: Vec<(&String, &Value)> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                Value::Object(
                    entries
                        .into_iter()
                        .map(|(k, v)| (k.clone(), normalize(v)))
                        .collect(),
                )
            }
            other => other.clone(),
        }
    }
    normalize(value).to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tollgate_core::money::Money;

    use super::*;

    fn request(input: Value) -> CompletionRequest {
        CompletionRequest {
            model: "m-small".into(),
            input,
            params: SamplingParams::default(),
            cache_policy: CachePolicy::Cacheable,
            estimated_cost: Money::from_units(1),
        }
    }

    #[test]
    fn same_request_same_key() {
        let tenant = Uuid::new_v4();
        let a = request(json!({"role": "user", "content": "What is VAT?"}));
        let b = request(json!({"content": "  What is VAT?\r\n", "role": "user"}));
        assert_eq!(fingerprint(tenant, &a), fingerprint(tenant, &b));
        assert_eq!(fingerprint(tenant, &a).as_str().len(), 64);
    }

    #[test]
    fn tenant_is_part_of_the_key() {
        let req = request(json!("hello"));
        assert_ne!(
            fingerprint(Uuid::new_v4(), &req),
            fingerprint(Uuid::new_v4(), &req)
        );
    }

    #[test]
    fn output_affecting_params_change_the_key() {
        let tenant = Uuid::new_v4();
        let base = request(json!("hello"));
        let mut seeded = base.clone();
        seeded.params.seed = Some(7);
        let mut other_model = base.clone();
        other_model.model = "m-large".into();
        let mut stop = base.clone();
        stop.params.stop = vec!["\n".into()];

        let key = fingerprint(tenant, &base);
        assert_ne!(key, fingerprint(tenant, &seeded));
        assert_ne!(key, fingerprint(tenant, &other_model));
        assert_ne!(key, fingerprint(tenant, &stop));
    }

    #[test]
    fn unset_params_differ_from_zero_values() {
        let tenant = Uuid::new_v4();
        let base = request(json!("hello"));
        let key = fingerprint(tenant, &base);

        let mut seed = base.clone();
        seed.params.seed = Some(0);
        let mut max_tokens = base.clone();
        max_tokens.params.max_tokens = Some(0);
        let mut top_p = base.clone();
        top_p.params.top_p = Some(0.0);

        assert_ne!(key, fingerprint(tenant, &seed));
        assert_ne!(key, fingerprint(tenant, &max_tokens));
        assert_ne!(key, fingerprint(tenant, &top_p));
        assert_ne!(fingerprint(tenant, &seed), fingerprint(tenant, &max_tokens));
    }

    #[test]
    fn cache_policy_does_not_change_the_key() {
        let tenant = Uuid::new_v4();
        let base = request(json!("hello"));
        let mut fresh = base.clone();
        fresh.cache_policy = CachePolicy::Fresh;
        assert_eq!(fingerprint(tenant, &base), fingerprint(tenant, &fresh));
    }

    #[test]
    fn eligibility() {
        let config = CacheConfig::default();
        let mut req = request(json!("hello"));
        assert!(is_cacheable(&req, &config));

        req.params.temperature = 0.9;
        assert!(!is_cacheable(&req, &config));

        req.params.temperature = 0.0;
        req.cache_policy = CachePolicy::Fresh;
        assert!(!is_cacheable(&req, &config));
    }
}
