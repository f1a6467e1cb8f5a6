//! Credential storage for linked providers
//!
//! One OAuth credential row per (user, provider), written by the auth
//! callback on linking and read at publish time. Tokens are passed to
//! publishers explicitly; nothing in the library reads an ambient
//! "current session" token.

use sqlx::Row;

use crate::db::Database;
use crate::error::Result;
use crate::types::Credential;

#[derive(Clone)]
pub struct CredentialStore {
    db: Database,
}

impl CredentialStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Look up the credential for a (user, provider) pair.
    ///
    /// An unlinked provider is a normal outcome and returns `Ok(None)`;
    /// only storage failures are errors.
    pub async fn get(&self, user_id: &str, provider: &str) -> Result<Option<Credential>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, provider, provider_account_id, access_token,
                   refresh_token, expires_at, updated_at
            FROM credentials
            WHERE user_id = ? AND provider = ?
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .fetch_optional(self.db.pool())
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.map(row_to_credential))
    }

    /// All credentials linked by one user
    pub async fn for_user(&self, user_id: &str) -> Result<Vec<Credential>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, provider, provider_account_id, access_token,
                   refresh_token, expires_at, updated_at
            FROM credentials
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(rows.into_iter().map(row_to_credential).collect())
    }

    /// Create or replace the single row for (user, provider).
    ///
    /// A single upsert statement, so a concurrent reader sees either the
    /// old row or the new one, never a half-written credential.
    pub async fn upsert(&self, credential: &Credential) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO credentials
                (user_id, provider, provider_account_id, access_token,
                 refresh_token, expires_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, provider) DO UPDATE SET
                provider_account_id = excluded.provider_account_id,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&credential.user_id)
        .bind(&credential.provider)
        .bind(&credential.provider_account_id)
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(credential.expires_at)
        .bind(credential.updated_at)
        .execute(self.db.pool())
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    /// Unlink a provider. Deleting an absent credential is not an error.
    pub async fn delete(&self, user_id: &str, provider: &str) -> Result<()> {
        sqlx::query("DELETE FROM credentials WHERE user_id = ? AND provider = ?")
            .bind(user_id)
            .bind(provider)
            .execute(self.db.pool())
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }
}

fn row_to_credential(r: sqlx::sqlite::SqliteRow) -> Credential {
    Credential {
        user_id: r.get("user_id"),
        provider: r.get("provider"),
        provider_account_id: r.get("provider_account_id"),
        access_token: r.get("access_token"),
        refresh_token: r.get("refresh_token"),
        expires_at: r.get("expires_at"),
        updated_at: r.get("updated_at"),
    }
}
