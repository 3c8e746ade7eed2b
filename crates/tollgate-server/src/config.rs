//! Server configuration from `TOLLGATE_*` environment variables layered
//! over defaults.

use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tollgate_auth::AuthConfig;
use tollgate_budget::BudgetConfig;
use tollgate_cache::CacheConfig;
use tollgate_core::Money;
use tollgate_db::DbConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Surreal,
    Memory,
}

/// First tenant and administrator created at startup when absent.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub tenant_slug: String,
    pub admin_username: String,
    pub admin_email: String,
    pub admin_password: String,
    pub budget_limit: Money,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub store: StoreKind,
    pub db: DbConfig,
    pub auth: AuthConfig,
    pub budget: BudgetConfig,
    pub cache: CacheConfig,
    /// Base URL of the model-invocation service.
    pub model_url: Option<String>,
    pub model_timeout_ms: u64,
    /// Interval between expired-session and expired-cache sweeps.
    pub sweep_interval_secs: u64,
    pub bootstrap: Option<BootstrapConfig>,
    /// Peers whose `X-Forwarded-For` header is believed. Empty means the
    /// header is ignored and the socket peer is the client address.
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            store: StoreKind::Surreal,
            db: DbConfig::default(),
            auth: AuthConfig::default(),
            budget: BudgetConfig::default(),
            cache: CacheConfig::default(),
            model_url: None,
            model_timeout_ms: 60_000,
            sweep_interval_secs: 300,
            bootstrap: None,
            trusted_proxies: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_millis(self.model_timeout_ms)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let mut config = Self::default();

        env.set_string("TOLLGATE_LISTEN_ADDR", &mut config.listen_addr);
        if let Some(store) = env.get("TOLLGATE_STORE") {
            config.store = match store.as_str() {
                "surreal" | "surrealdb" => StoreKind::Surreal,
                "memory" => StoreKind::Memory,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "TOLLGATE_STORE",
                        value: store,
                    });
                }
            };
        }

        env.set_string("TOLLGATE_DB_URL", &mut config.db.url);
        env.set_string("TOLLGATE_DB_NAMESPACE", &mut config.db.namespace);
        env.set_string("TOLLGATE_DB_DATABASE", &mut config.db.database);
        env.set_string("TOLLGATE_DB_USERNAME", &mut config.db.username);
        env.set_string("TOLLGATE_DB_PASSWORD", &mut config.db.password);

        let auth = &mut config.auth;
        auth.jwt_private_key_pem = env.require("TOLLGATE_JWT_PRIVATE_KEY_PEM")?;
        auth.jwt_public_key_pem = env.require("TOLLGATE_JWT_PUBLIC_KEY_PEM")?;
        env.set_string("TOLLGATE_JWT_ISSUER", &mut auth.jwt_issuer);
        auth.pepper = env.get("TOLLGATE_PASSWORD_PEPPER").or(auth.pepper.take());
        env.parse("TOLLGATE_ACCESS_TOKEN_TTL_SECS", &mut auth.access_token_lifetime_secs)?;
        env.parse("TOLLGATE_REFRESH_TOKEN_TTL_SECS", &mut auth.refresh_token_lifetime_secs)?;
        env.parse("TOLLGATE_MAX_SESSIONS", &mut auth.max_concurrent_sessions)?;
        env.parse("TOLLGATE_MAX_FAILED_LOGINS", &mut auth.max_failed_login_attempts)?;
        env.parse("TOLLGATE_LOCKOUT_SECS", &mut auth.lockout_duration_secs)?;
        env.parse("TOLLGATE_STORE_TIMEOUT_MS", &mut auth.store_timeout_ms)?;

        config.budget.store_timeout_ms = auth.store_timeout_ms;
        env.set_string("TOLLGATE_BUDGET_ADMIN_CONTACT", &mut config.budget.admin_contact);
        if let Some(raw) = env.get("TOLLGATE_BUDGET_THRESHOLDS") {
            config.budget.soft_thresholds = parse_thresholds(&raw)?;
        }

        env.parse("TOLLGATE_CACHE_TTL_SECS", &mut config.cache.default_ttl_secs)?;
        env.parse(
            "TOLLGATE_CACHE_MAX_TEMPERATURE",
            &mut config.cache.max_cacheable_temperature,
        )?;
        env.parse("TOLLGATE_CACHE_LOOKUP_TIMEOUT_MS", &mut config.cache.lookup_timeout_ms)?;

        config.model_url = env.get("TOLLGATE_MODEL_URL");
        env.parse("TOLLGATE_MODEL_TIMEOUT_MS", &mut config.model_timeout_ms)?;
        env.parse("TOLLGATE_SWEEP_INTERVAL_SECS", &mut config.sweep_interval_secs)?;
        if let Some(raw) = env.get("TOLLGATE_TRUSTED_PROXIES") {
            config.trusted_proxies = parse_proxies(&raw)?;
        }

        if let Some(tenant_slug) = env.get("TOLLGATE_BOOTSTRAP_TENANT") {
            let mut budget_units: i64 = 100;
            env.parse("TOLLGATE_BOOTSTRAP_BUDGET_UNITS", &mut budget_units)?;
            config.bootstrap = Some(BootstrapConfig {
                tenant_slug,
                admin_username: env
                    .get("TOLLGATE_BOOTSTRAP_ADMIN_USERNAME")
                    .unwrap_or_else(|| "admin".into()),
                admin_email: env.require("TOLLGATE_BOOTSTRAP_ADMIN_EMAIL")?,
                admin_password: env.require("TOLLGATE_BOOTSTRAP_ADMIN_PASSWORD")?,
                budget_limit: Money::from_units(budget_units),
            });
        }

        Ok(config)
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn require(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn set_string(&self, key: &str, target: &mut String) {
        if let Some(value) = self.get(key) {
            *target = value;
        }
    }

    fn parse<T: FromStr>(&self, key: &'static str, target: &mut T) -> Result<(), ConfigError> {
        if let Some(value) = self.get(key) {
            *target = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value })?;
        }
        Ok(())
    }
}

fn parse_proxies(raw: &str) -> Result<Vec<IpAddr>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|_| ConfigError::Invalid {
                key: "TOLLGATE_TRUSTED_PROXIES",
                value: raw.to_string(),
            })
        })
        .collect()
}

fn parse_thresholds(raw: &str) -> Result<Vec<u8>, ConfigError> {
    let invalid = || ConfigError::Invalid {
        key: "TOLLGATE_BUDGET_THRESHOLDS",
        value: raw.to_string(),
    };
    let mut thresholds = raw
        .split(',')
        .map(|s| s.trim().parse::<u8>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;
    if thresholds.iter().any(|&t| t == 0 || t >= 100) {
        return Err(invalid());
    }
    thresholds.sort_unstable();
    thresholds.dedup();
    Ok(thresholds)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const KEYS: [(&str, &str); 2] = [
        ("TOLLGATE_JWT_PRIVATE_KEY_PEM", "private"),
        ("TOLLGATE_JWT_PUBLIC_KEY_PEM", "public"),
    ];

    #[test]
    fn key_pair_is_required() {
        let err = ServerConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("TOLLGATE_JWT_PRIVATE_KEY_PEM")));
    }

    #[test]
    fn defaults_apply() {
        let config = ServerConfig::from_lookup(lookup(&KEYS)).unwrap();
        assert_eq!(config.store, StoreKind::Surreal);
        assert_eq!(config.budget.soft_thresholds, vec![75, 90]);
        assert_eq!(config.auth.max_concurrent_sessions, 5);
        assert!(config.bootstrap.is_none());
        assert!(config.trusted_proxies.is_empty());
    }

    #[test]
    fn trusted_proxies_are_parsed() {
        let mut pairs = KEYS.to_vec();
        pairs.push(("TOLLGATE_TRUSTED_PROXIES", "10.0.0.1, ::1"));
        let config = ServerConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(
            config.trusted_proxies,
            vec![IpAddr::from([10, 0, 0, 1]), IpAddr::from([0, 0, 0, 0, 0, 0, 0, 1u16])]
        );

        let mut pairs = KEYS.to_vec();
        pairs.push(("TOLLGATE_TRUSTED_PROXIES", "10.0.0.1,proxy.internal"));
        assert!(matches!(
            ServerConfig::from_lookup(lookup(&pairs)),
            Err(ConfigError::Invalid { key: "TOLLGATE_TRUSTED_PROXIES", .. })
        ));
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = KEYS.to_vec();
        pairs.extend([
            ("TOLLGATE_STORE", "memory"),
            ("TOLLGATE_MAX_SESSIONS", "2"),
            ("TOLLGATE_BUDGET_THRESHOLDS", "90, 50"),
            ("TOLLGATE_CACHE_MAX_TEMPERATURE", "0.5"),
            ("TOLLGATE_STORE_TIMEOUT_MS", "750"),
        ]);
        let config = ServerConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.store, StoreKind::Memory);
        assert_eq!(config.auth.max_concurrent_sessions, 2);
        assert_eq!(config.budget.soft_thresholds, vec![50, 90]);
        assert_eq!(config.cache.max_cacheable_temperature, 0.5);
        assert_eq!(config.budget.store_timeout_ms, 750);
    }

    #[test]
    fn bad_values_are_reported() {
        let mut pairs = KEYS.to_vec();
        pairs.push(("TOLLGATE_BUDGET_THRESHOLDS", "75,120"));
        assert!(matches!(
            ServerConfig::from_lookup(lookup(&pairs)),
            Err(ConfigError::Invalid { .. })
        ));

        let mut pairs = KEYS.to_vec();
        pairs.push(("TOLLGATE_STORE", "postgres"));
        assert!(ServerConfig::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn bootstrap_requires_admin_credentials() {
        let mut pairs = KEYS.to_vec();
        pairs.push(("TOLLGATE_BOOTSTRAP_TENANT", "acme"));
        assert!(matches!(
            ServerConfig::from_lookup(lookup(&pairs)),
            Err(ConfigError::Missing("TOLLGATE_BOOTSTRAP_ADMIN_EMAIL"))
        ));

        pairs.extend([
            ("TOLLGATE_BOOTSTRAP_ADMIN_EMAIL", "ops@acme.test"),
            ("TOLLGATE_BOOTSTRAP_ADMIN_PASSWORD", "a-long-enough-password"),
            ("TOLLGATE_BOOTSTRAP_BUDGET_UNITS", "250"),
        ]);
        let bootstrap = ServerConfig::from_lookup(lookup(&pairs))
            .unwrap()
            .bootstrap
            .unwrap();
        assert_eq!(bootstrap.tenant_slug, "acme");
        assert_eq!(bootstrap.admin_username, "admin");
        assert_eq!(bootstrap.budget_limit, Money::from_units(250));
    }
}
