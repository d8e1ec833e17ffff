//! Persistent principal registry with SQLite.
//!
//! Accounts and their registered public keys live in two tables; the hot
//! lookup path reads an in-memory snapshot swapped atomically after every
//! mutation, so request handling never touches the database and the cache
//! is never observed half-populated.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use sqlx::{Row, SqlitePool};
use tracing::warn;
use wellknown_auth::authn::MAX_USERNAME_LEN;
use wellknown_auth::{CapabilitySet, KeyRegistry, Principal, PublicKey, RegisteredPrincipal};

use crate::current_timestamp;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid username: {0}")]
    InvalidUsername(String),
    #[error("no such principal: {0}")]
    UnknownPrincipal(String),
    #[error("principal already exists: {0}")]
    PrincipalExists(String),
    #[error("invalid public key: {0}")]
    InvalidKey(#[from] wellknown_auth::KeyError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// One row of `user list` output.
#[derive(Debug, Clone)]
pub struct PrincipalSummary {
    pub principal: Principal,
    pub key_count: usize,
}

pub struct SqlRegistry {
    pool: SqlitePool,
    cache: ArcSwap<HashMap<String, RegisteredPrincipal>>,
}

impl SqlRegistry {
    /// Create the registry, creating tables if needed and pre-populating
    /// the lookup cache.
    pub async fn new(pool: SqlitePool) -> Result<Self, RegistryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS principals (
                username TEXT PRIMARY KEY,
                trusted INTEGER NOT NULL DEFAULT 0,
                can_create INTEGER NOT NULL DEFAULT 0,
                can_update INTEGER NOT NULL DEFAULT 0,
                can_delete INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS principal_keys (
                username TEXT NOT NULL REFERENCES principals(username) ON DELETE CASCADE,
                public_key TEXT NOT NULL,
                added_at INTEGER NOT NULL,
                PRIMARY KEY (username, public_key)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        let registry = Self {
            pool,
            cache: ArcSwap::from_pointee(HashMap::new()),
        };
        registry.refresh_cache().await?;

        Ok(registry)
    }

    /// Register a new account. Fails if the name is taken.
    pub async fn add_principal(
        &self,
        username: &str,
        trusted: bool,
        capabilities: CapabilitySet,
    ) -> Result<(), RegistryError> {
        validate_username(username)?;

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO principals
                (username, trusted, can_create, can_update, can_delete, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(username)
        .bind(trusted)
        .bind(capabilities.create)
        .bind(capabilities.update)
        .bind(capabilities.delete)
        .bind(current_timestamp())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RegistryError::PrincipalExists(username.to_string()));
        }

        self.refresh_cache().await
    }

    /// Register an additional public key for an account. A user may hold
    /// several keys, one per machine they publish from.
    pub async fn add_key(&self, username: &str, key: &PublicKey) -> Result<(), RegistryError> {
        self.require_principal(username).await?;

        sqlx::query(
            "INSERT OR IGNORE INTO principal_keys (username, public_key, added_at) VALUES (?, ?, ?)",
        )
        .bind(username)
        .bind(key.to_base64())
        .bind(current_timestamp())
        .execute(&self.pool)
        .await?;

        self.refresh_cache().await
    }

    /// Remove one registered key from an account.
    pub async fn remove_key(&self, username: &str, key: &PublicKey) -> Result<(), RegistryError> {
        self.require_principal(username).await?;

        sqlx::query("DELETE FROM principal_keys WHERE username = ? AND public_key = ?")
            .bind(username)
            .bind(key.to_base64())
            .execute(&self.pool)
            .await?;

        self.refresh_cache().await
    }

    /// Mark an account trusted or untrusted.
    pub async fn set_trusted(&self, username: &str, trusted: bool) -> Result<(), RegistryError> {
        let result = sqlx::query("UPDATE principals SET trusted = ? WHERE username = ?")
            .bind(trusted)
            .bind(username)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RegistryError::UnknownPrincipal(username.to_string()));
        }

        self.refresh_cache().await
    }

    /// Replace an account's operation grants.
    pub async fn grant(
        &self,
        username: &str,
        capabilities: CapabilitySet,
    ) -> Result<(), RegistryError> {
        let result = sqlx::query(
            "UPDATE principals SET can_create = ?, can_update = ?, can_delete = ? WHERE username = ?",
        )
        .bind(capabilities.create)
        .bind(capabilities.update)
        .bind(capabilities.delete)
        .bind(username)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RegistryError::UnknownPrincipal(username.to_string()));
        }

        self.refresh_cache().await
    }

    /// All accounts with their key counts, for the admin CLI.
    pub async fn list(&self) -> Result<Vec<PrincipalSummary>, RegistryError> {
        let rows = sqlx::query(
            r#"
            SELECT p.username, p.trusted, p.can_create, p.can_update, p.can_delete,
                   COUNT(k.public_key) AS key_count
            FROM principals p
            LEFT JOIN principal_keys k ON k.username = p.username
            GROUP BY p.username
            ORDER BY p.username
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PrincipalSummary {
                principal: principal_from_row(&row),
                key_count: row.get::<i64, _>("key_count") as usize,
            })
            .collect())
    }

    /// Rebuild the lookup snapshot from the database and swap it in
    /// atomically. Rows with unparsable keys are skipped with a warning
    /// rather than taking the whole account down.
    pub async fn refresh_cache(&self) -> Result<(), RegistryError> {
        let principal_rows = sqlx::query(
            "SELECT username, trusted, can_create, can_update, can_delete FROM principals",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut snapshot: HashMap<String, RegisteredPrincipal> = principal_rows
            .iter()
            .map(|row| {
                let principal = principal_from_row(row);
                (
                    principal.username.clone(),
                    RegisteredPrincipal {
                        principal,
                        keys: Vec::new(),
                    },
                )
            })
            .collect();

        let key_rows = sqlx::query("SELECT username, public_key FROM principal_keys")
            .fetch_all(&self.pool)
            .await?;

        for row in key_rows {
            let username: String = row.get("username");
            let encoded: String = row.get("public_key");
            match PublicKey::from_base64(&encoded) {
                Ok(key) => {
                    if let Some(registered) = snapshot.get_mut(&username) {
                        registered.keys.push(key);
                    }
                }
                Err(err) => {
                    warn!(%username, error = %err, "skipping unparsable registered key");
                }
            }
        }

        self.cache.store(Arc::new(snapshot));
        Ok(())
    }

    async fn require_principal(&self, username: &str) -> Result<(), RegistryError> {
        let exists = sqlx::query("SELECT 1 FROM principals WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .is_some();

        if exists {
            Ok(())
        } else {
            Err(RegistryError::UnknownPrincipal(username.to_string()))
        }
    }
}

impl KeyRegistry for SqlRegistry {
    fn lookup(&self, username: &str) -> Option<RegisteredPrincipal> {
        self.cache.load().get(username).cloned()
    }
}

fn principal_from_row(row: &sqlx::sqlite::SqliteRow) -> Principal {
    Principal {
        username: row.get("username"),
        trusted: row.get("trusted"),
        capabilities: CapabilitySet {
            create: row.get("can_create"),
            update: row.get("can_update"),
            delete: row.get("can_delete"),
        },
    }
}

fn validate_username(username: &str) -> Result<(), RegistryError> {
    if username.trim().is_empty() {
        return Err(RegistryError::InvalidUsername("must not be blank".into()));
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err(RegistryError::InvalidUsername(format!(
            "longer than {MAX_USERNAME_LEN} bytes"
        )));
    }
    Ok(())
}
