//! The package catalog: a transactional SQLite store of packages, releases,
//! aliases, users, linked identities, counters and registry config.
//!
//! The catalog owns all row data; archive bytes live in the blob store and
//! rows hold only `(size, sha256)` references. One WAL-mode connection
//! behind a mutex serializes writers; operations that touch multiple rows
//! run in an explicit transaction.

mod aliases;
mod packages;
mod schema;
mod stats;
mod users;

pub use packages::{BlobRef, NewRelease, PackageHints};
pub use users::UserRow;

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::Connection;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("not found")]
    NotFound,

    #[error("username is already taken")]
    UsernameTaken,

    #[error("email is already registered")]
    EmailTaken,

    #[error("release already exists")]
    VersionExists,

    #[error("package is locked against new releases")]
    PackageLocked,

    #[error("identity is already linked to an account")]
    AlreadyLinked,

    #[error("database: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Constraint message (`UNIQUE constraint failed: table.column`) when the
/// error is a unique violation; call sites map it onto a typed conflict.
pub(crate) fn unique_conflict(e: &rusqlite::Error) -> Option<String> {
    match e {
        rusqlite::Error::SqliteFailure(ffi, Some(message))
            if ffi.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Some(message.clone())
        }
        _ => None,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Catalog
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Catalog {
    conn: Mutex<Connection>,
}

impl Catalog {
    /// Open (and create) the catalog at `path`, applying migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::migrate(&conn)?;
        tracing::info!(path = %path.display(), "catalog ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory catalog for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Unix seconds, the timestamp unit used across the schema.
    pub(crate) fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Escape `%`, `_` and the escape character itself for a `LIKE ? ESCAPE '\'`
/// pattern.
pub(crate) fn like_escape(q: &str) -> String {
    let mut out = String::with_capacity(q.len());
    for c in q.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_escape_neutralizes_wildcards() {
        assert_eq!(like_escape("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(like_escape("widget"), "widget");
    }
}
