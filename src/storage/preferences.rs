use anyhow::Result;
use sqlx::SqliteExecutor;

use super::schema::Database;

/// UPSERT against any executor, so callers can batch writes in a transaction.
pub(super) async fn upsert_preference<'e, E>(executor: E, key: &str, value: &str) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO user_preferences (key, value, updated_at)
        VALUES (?, ?, datetime('now'))
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
    "#,
    )
    .bind(key)
    .bind(value)
    .execute(executor)
    .await?;

    Ok(())
}

pub(super) async fn remove_preference<'e, E>(executor: E, key: &str) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM user_preferences WHERE key = ?")
        .bind(key)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

impl Database {
    // ========================================================================
    // User Preferences Operations
    // ========================================================================

    /// Get a single preference value by key.
    ///
    /// Keys use dotted convention: `credential.api_key`, `credential.use_custom`, etc.
    ///
    /// # Returns
    ///
    /// The preference value if the key exists, or `None` if not set.
    pub async fn get_preference(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM user_preferences WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Set a preference value (UPSERT).
    ///
    /// Inserts the key-value pair if it doesn't exist, or updates the value and
    /// timestamp if the key already exists.
    ///
    /// # Arguments
    ///
    /// * `key` - Dotted preference key (e.g., `credential.use_custom`)
    /// * `value` - The preference value to store
    pub async fn set_preference(&self, key: &str, value: &str) -> Result<()> {
        upsert_preference(&self.pool, key, value).await
    }

    /// Remove a preference. Returns whether a row was deleted.
    pub async fn delete_preference(&self, key: &str) -> Result<bool> {
        remove_preference(&self.pool, key).await
    }

    /// Get all preferences matching a key prefix.
    ///
    /// Useful for loading grouped settings (e.g., all `credential.*` entries).
    ///
    /// # Arguments
    ///
    /// * `prefix` - The key prefix to match (e.g., `credential.` returns `credential.api_key` and `credential.use_custom`)
    ///
    /// # Returns
    ///
    /// A vector of (key, value) pairs matching the prefix, ordered by key.
    pub async fn get_preferences_by_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let pattern = format!("{}%", prefix);
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM user_preferences WHERE key LIKE ? ORDER BY key")
                .bind(&pattern)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::Database;
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_get_preference_missing() {
        let db = test_db().await;
        let value = db.get_preference("nonexistent.key").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_set_and_get_preference() {
        let db = test_db().await;
        db.set_preference("credential.use_custom", "true")
            .await
            .unwrap();

        let value = db.get_preference("credential.use_custom").await.unwrap();
        assert_eq!(value, Some("true".to_string()));
    }

    #[tokio::test]
    async fn test_set_preference_upsert() {
        let db = test_db().await;
        db.set_preference("credential.use_custom", "true")
            .await
            .unwrap();
        db.set_preference("credential.use_custom", "false")
            .await
            .unwrap();

        let value = db.get_preference("credential.use_custom").await.unwrap();
        assert_eq!(value, Some("false".to_string()));
    }

    #[tokio::test]
    async fn test_delete_preference() {
        let db = test_db().await;
        db.set_preference("credential.api_key", "abc").await.unwrap();

        assert!(db.delete_preference("credential.api_key").await.unwrap());
        assert_eq!(db.get_preference("credential.api_key").await.unwrap(), None);

        // Second delete finds nothing
        assert!(!db.delete_preference("credential.api_key").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_preferences_by_prefix() {
        let db = test_db().await;
        db.set_preference("credential.use_custom", "true")
            .await
            .unwrap();
        db.set_preference("credential.api_key", "abc").await.unwrap();
        db.set_preference("search.last_mode", "phrase").await.unwrap();

        let prefs = db.get_preferences_by_prefix("credential.").await.unwrap();
        assert_eq!(
            prefs,
            vec![
                ("credential.api_key".to_string(), "abc".to_string()),
                ("credential.use_custom".to_string(), "true".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_get_preferences_by_prefix_no_false_matches() {
        let db = test_db().await;
        db.set_preference("credential.api_key", "abc").await.unwrap();
        db.set_preference("credentials_old.value", "x").await.unwrap();

        // "credential." should not match "credentials_old."
        let prefs = db.get_preferences_by_prefix("credential.").await.unwrap();
        assert_eq!(prefs.len(), 1);
        assert_eq!(prefs[0].0, "credential.api_key");
    }

    #[tokio::test]
    async fn test_set_preference_records_timestamp() {
        let db = test_db().await;
        db.set_preference("test.key", "value1").await.unwrap();

        let row: (String,) =
            sqlx::query_as("SELECT updated_at FROM user_preferences WHERE key = ?")
                .bind("test.key")
                .fetch_one(&db.pool)
                .await
                .unwrap();

        assert!(!row.0.is_empty());
    }
}
