//! Challenge record storage.
//!
//! One row per challenge token. Publication is an upsert so a re-issued
//! challenge simply replaces its response; retraction reports whether a
//! row actually existed so the route can answer 404 honestly.

use sqlx::{Row, SqlitePool};

use crate::current_timestamp;

#[derive(Clone)]
pub struct ChallengeStore {
    pool: SqlitePool,
}

impl ChallengeStore {
    /// Create the store, creating its table if needed.
    pub async fn new(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS challenges (
                challenge TEXT PRIMARY KEY,
                response TEXT NOT NULL,
                created_by TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Publish a challenge/response pair, replacing any previous response
    /// for the same token.
    pub async fn insert(
        &self,
        challenge: &str,
        response: &str,
        created_by: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO challenges (challenge, response, created_by, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(challenge) DO UPDATE
                SET response = excluded.response,
                    created_by = excluded.created_by,
                    created_at = excluded.created_at
            "#,
        )
        .bind(challenge)
        .bind(response)
        .bind(created_by)
        .bind(current_timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a challenge; returns whether a record existed.
    pub async fn remove(&self, challenge: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM challenges WHERE challenge = ?")
            .bind(challenge)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// The response value for a challenge, if one is published.
    pub async fn lookup(&self, challenge: &str) -> Result<Option<String>, sqlx::Error> {
        let row = sqlx::query("SELECT response FROM challenges WHERE challenge = ?")
            .bind(challenge)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get("response")))
    }

    /// Delete records older than `max_age_seconds`. Challenges are only
    /// meaningful during one validation round; anything an agent failed to
    /// retract is garbage after that.
    pub async fn purge_older_than(&self, max_age_seconds: i64) -> Result<u64, sqlx::Error> {
        let cutoff = current_timestamp().saturating_sub(max_age_seconds);
        let result = sqlx::query("DELETE FROM challenges WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> ChallengeStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        ChallengeStore::new(pool).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_lookup_remove() {
        let store = test_store().await;

        store.insert("tok123", "resp123", Some("deployer")).await.unwrap();
        assert_eq!(
            store.lookup("tok123").await.unwrap().as_deref(),
            Some("resp123")
        );
        assert_eq!(store.lookup("other").await.unwrap(), None);

        assert!(store.remove("tok123").await.unwrap());
        assert!(!store.remove("tok123").await.unwrap());
        assert_eq!(store.lookup("tok123").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_republish_replaces_response() {
        let store = test_store().await;

        store.insert("tok", "first", None).await.unwrap();
        store.insert("tok", "second", None).await.unwrap();
        assert_eq!(store.lookup("tok").await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_purge_only_removes_old_records() {
        let store = test_store().await;

        store.insert("fresh", "r", None).await.unwrap();

        // Backdate one record past the cutoff
        sqlx::query("INSERT INTO challenges (challenge, response, created_at) VALUES (?, ?, ?)")
            .bind("stale")
            .bind("r")
            .bind(current_timestamp() - 100_000)
            .execute(&store.pool)
            .await
            .unwrap();

        let purged = store.purge_older_than(86_400).await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.lookup("fresh").await.unwrap().is_some());
        assert!(store.lookup("stale").await.unwrap().is_none());
    }
}
