//! Users, linked identities and the token revocation list.

use rusqlite::{params, OptionalExtension};
use zg_domain::ident::{is_valid_ident, MAX_IDENT_LEN};

use crate::{unique_conflict, Catalog, CatalogError, Result};

/// A user account row. `password_hash` is `None` for federated-only users.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub active: bool,
    pub created_at: i64,
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        active: row.get(4)?,
        created_at: row.get(5)?,
    })
}

const USER_COLUMNS: &str = "id, username, email, password_hash, active, created_at";

impl Catalog {
    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO users (username, email, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![username, email, password_hash, Self::now()],
        )
        .map_err(|e| match unique_conflict(&e) {
            Some(m) if m.contains("users.username") => CatalogError::UsernameTaken,
            Some(m) if m.contains("users.email") => CatalogError::EmailTaken,
            _ => CatalogError::Sqlite(e),
        })?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_user_by_name(&self, username: &str) -> Result<UserRow> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
            params![username],
            user_from_row,
        )
        .optional()?
        .ok_or(CatalogError::NotFound)
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<UserRow> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()?
        .ok_or(CatalogError::NotFound)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<UserRow> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email],
            user_from_row,
        )
        .optional()?
        .ok_or(CatalogError::NotFound)
    }

    /// Soft-deactivate an account. Rows are never physically deleted while
    /// releases reference them.
    pub fn deactivate_user(&self, id: i64) -> Result<()> {
        let conn = self.conn();
        let affected = conn.execute("UPDATE users SET active = 0 WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(CatalogError::NotFound);
        }
        Ok(())
    }

    // ── Linked identities ───────────────────────────────────────────

    pub fn link_identity(
        &self,
        user_id: i64,
        provider: &str,
        provider_user_id: &str,
        display: &str,
    ) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO identities (user_id, provider, provider_user_id, display, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, provider, provider_user_id, display, Self::now()],
        )
        .map_err(|e| match unique_conflict(&e) {
            Some(m) if m.contains("identities.") => CatalogError::AlreadyLinked,
            _ => CatalogError::Sqlite(e),
        })?;
        Ok(())
    }

    pub fn get_user_by_identity(&self, provider: &str, provider_user_id: &str) -> Result<UserRow> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT u.{} FROM users u
                 JOIN identities i ON i.user_id = u.id
                 WHERE i.provider = ?1 AND i.provider_user_id = ?2",
                USER_COLUMNS.replace(", ", ", u.")
            ),
            params![provider, provider_user_id],
            user_from_row,
        )
        .optional()?
        .ok_or(CatalogError::NotFound)
    }

    /// First free username derived from `base`: the sanitized base itself,
    /// then `-2`, `-3`, … suffixes. Used when a federated sign-in creates an
    /// account.
    pub fn find_free_username(&self, base: &str) -> Result<String> {
        let mut sanitized: String = base
            .chars()
            .take(MAX_IDENT_LEN)
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        if !is_valid_ident(&sanitized) {
            sanitized = "user".into();
        }

        for n in 1u32.. {
            let candidate = if n == 1 {
                sanitized.clone()
            } else {
                let suffix = format!("-{n}");
                let mut c = sanitized.clone();
                c.truncate(MAX_IDENT_LEN - suffix.len());
                c.push_str(&suffix);
                c
            };
            if matches!(
                self.get_user_by_name(&candidate),
                Err(CatalogError::NotFound)
            ) {
                return Ok(candidate);
            }
        }
        unreachable!("username suffix search is unbounded")
    }

    // ── Token revocation ────────────────────────────────────────────

    /// Record a revoked token digest. Entries past their expiry are pruned
    /// on the way in.
    pub fn revoke_token(&self, token_digest: &str, expires_at: i64) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM revoked_tokens WHERE expires_at < ?1",
            params![Self::now()],
        )?;
        conn.execute(
            "INSERT OR REPLACE INTO revoked_tokens (token_digest, expires_at) VALUES (?1, ?2)",
            params![token_digest, expires_at],
        )?;
        Ok(())
    }

    pub fn is_token_revoked(&self, token_digest: &str) -> Result<bool> {
        let conn = self.conn();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM revoked_tokens WHERE token_digest = ?1",
                params![token_digest],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}
