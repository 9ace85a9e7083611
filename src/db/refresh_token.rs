//! Refresh token records: rotation and revocation.
//!
//! Only the SHA-256 hash of a refresh secret is ever stored. Revocation is
//! a compare-and-revoke (`UPDATE ... WHERE revoked_at IS NULL`), so two
//! simultaneous presentations of the same token resolve to exactly one
//! winner.

use sqlx::sqlite::SqlitePool;

/// A refresh token record.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub user_id: i64,
    pub token_hash: String,
    pub remember: bool,
    pub created_at: i64,
    pub expires_at: i64,
    pub revoked_at: Option<i64>,
}

impl RefreshTokenRecord {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Parameters for a new refresh token record.
#[derive(Debug, Clone)]
pub struct NewRefreshToken<'a> {
    pub user_id: i64,
    pub token_hash: &'a str,
    pub remember: bool,
    pub expires_at: i64,
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: i64,
    user_id: i64,
    token_hash: String,
    remember: i64,
    created_at: i64,
    expires_at: i64,
    revoked_at: Option<i64>,
}

impl From<RecordRow> for RefreshTokenRecord {
    fn from(row: RecordRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            token_hash: row.token_hash,
            remember: row.remember != 0,
            created_at: row.created_at,
            expires_at: row.expires_at,
            revoked_at: row.revoked_at,
        }
    }
}

const RECORD_COLUMNS: &str =
    "id, user_id, token_hash, remember, created_at, expires_at, revoked_at";

/// Store for refresh token records.
#[derive(Clone)]
pub struct RefreshTokenStore {
    pool: SqlitePool,
}

impl RefreshTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new refresh token record. Returns the record ID.
    pub async fn create(&self, token: &NewRefreshToken<'_>) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token_hash, remember, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(token.user_id)
        .bind(token.token_hash)
        .bind(token.remember as i64)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get a record by ID.
    pub async fn get(&self, id: i64) -> Result<Option<RefreshTokenRecord>, sqlx::Error> {
        let row: Option<RecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM refresh_tokens WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RefreshTokenRecord::from))
    }

    /// Look up a record by the hash of a presented secret.
    pub async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, sqlx::Error> {
        let row: Option<RecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM refresh_tokens WHERE token_hash = ?"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RefreshTokenRecord::from))
    }

    /// List active (non-revoked, non-expired) records for a user, newest
    /// first.
    pub async fn list_active(&self, user_id: i64) -> Result<Vec<RefreshTokenRecord>, sqlx::Error> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM refresh_tokens \
             WHERE user_id = ? AND revoked_at IS NULL AND expires_at > strftime('%s','now') \
             ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(RefreshTokenRecord::from).collect())
    }

    /// Revoke a record. Compare-and-revoke: returns false when the record
    /// was already revoked or does not exist.
    pub async fn revoke(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = strftime('%s','now') \
             WHERE id = ? AND revoked_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke every active record for a user (containment after token
    /// reuse, or "logout everywhere"). Returns the number revoked.
    pub async fn revoke_all_for_user(&self, user_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = strftime('%s','now') \
             WHERE user_id = ? AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Rotate a record: revoke the presented one and create its replacement
    /// in a single transaction.
    ///
    /// Returns the replacement record ID, or `None` when the presented
    /// record had already been revoked by a concurrent presentation; the
    /// caller must treat that exactly like a revoked token.
    pub async fn rotate(
        &self,
        presented_id: i64,
        replacement: &NewRefreshToken<'_>,
    ) -> Result<Option<i64>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let revoked = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = strftime('%s','now') \
             WHERE id = ? AND revoked_at IS NULL",
        )
        .bind(presented_id)
        .execute(&mut *tx)
        .await?;

        if revoked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let inserted = sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token_hash, remember, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(replacement.user_id)
        .bind(replacement.token_hash)
        .bind(replacement.remember as i64)
        .bind(replacement.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(inserted.last_insert_rowid()))
    }

    /// Delete expired records. Returns the number deleted.
    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < strftime('%s','now')")
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Delete records revoked before the given Unix timestamp. Revoked
    /// records are kept around for a while so reuse detection still fires.
    pub async fn delete_revoked_before(&self, cutoff: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM refresh_tokens WHERE revoked_at IS NOT NULL AND revoked_at < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
