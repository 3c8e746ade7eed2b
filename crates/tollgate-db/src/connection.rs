//! SurrealDB connection management.
//!
//! The endpoint scheme picks the engine: `ws://` / `wss://` for a remote
//! server, `mem://` for an embedded in-process database. A bare
//! `host:port` is treated as `ws://host:port`.

use surrealdb::Surreal;
use surrealdb::engine::any::{self, Any};
use surrealdb::opt::auth::Root;
use tracing::{debug, info};

use crate::error::DbError;
use crate::schema::run_migrations;

/// Configuration for connecting to SurrealDB.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Endpoint, e.g. `ws://127.0.0.1:8000` or `mem://`.
    pub url: String,
    pub namespace: String,
    pub database: String,
    /// Root credentials; unused by embedded engines.
    pub username: String,
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8000".into(),
            namespace: "tollgate".into(),
            database: "main".into(),
            username: "root".into(),
            password: "root".into(),
        }
    }
}

impl DbConfig {
    /// Embedded in-memory database with the given namespace and database.
    pub fn in_memory(namespace: &str, database: &str) -> Self {
        Self {
            url: "mem://".into(),
            namespace: namespace.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    /// The endpoint with an explicit scheme.
    pub fn endpoint(&self) -> String {
        let url = self.url.trim();
        if url.contains("://") {
            url.to_owned()
        } else {
            format!("ws://{url}")
        }
    }

    /// Whether the endpoint runs inside this process.
    pub fn is_embedded(&self) -> bool {
        let endpoint = self.endpoint();
        !["ws://", "wss://", "http://", "https://"]
            .iter()
            .any(|scheme| endpoint.starts_with(scheme))
    }
}

/// A ready SurrealDB handle: connected, authenticated where the engine
/// needs it, scoped to one namespace and database, schema applied.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Any>,
}

impl DbManager {
    /// Connect to the configured endpoint and bring the schema up to date.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        let endpoint = config.endpoint();
        info!(
            endpoint = %endpoint,
            namespace = %config.namespace,
            database = %config.database,
            "Connecting to SurrealDB"
        );

        let db = any::connect(endpoint.as_str()).await?;
        if config.is_embedded() {
            debug!("Embedded engine; skipping root sign-in");
        } else {
            db.signin(Root {
                username: config.username.clone(),
                password: config.password.clone(),
            })
            .await?;
        }
        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;
        run_migrations(&db).await?;

        info!("SurrealDB ready");
        Ok(Self { db })
    }

    pub fn client(&self) -> &Surreal<Any> {
        &self.db
    }
}
