//! Catalog schema. Every statement is idempotent, so migration re-runs on
//! each boot.

use rusqlite::Connection;

pub(crate) fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS packages (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            owner            TEXT NOT NULL,
            repo             TEXT NOT NULL,
            description      TEXT NOT NULL DEFAULT '',
            topics           TEXT NOT NULL DEFAULT '[]',
            license          TEXT NOT NULL DEFAULT '',
            homepage         TEXT NOT NULL DEFAULT '',
            github_url       TEXT NOT NULL DEFAULT '',
            stargazers_count INTEGER NOT NULL DEFAULT 0,
            private          INTEGER NOT NULL DEFAULT 0,
            locked           INTEGER NOT NULL DEFAULT 0,
            created_at       INTEGER NOT NULL,
            updated_at       INTEGER NOT NULL,
            UNIQUE(owner, repo)
        );

        CREATE TABLE IF NOT EXISTS releases (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            package_id     INTEGER NOT NULL REFERENCES packages(id) ON DELETE CASCADE,
            tag            TEXT NOT NULL,
            name           TEXT NOT NULL DEFAULT '',
            body           TEXT NOT NULL DEFAULT '',
            draft          INTEGER NOT NULL DEFAULT 0,
            prerelease     INTEGER NOT NULL DEFAULT 0,
            created_at     INTEGER NOT NULL,
            published_at   INTEGER,
            file_size      INTEGER NOT NULL,
            sha256         TEXT NOT NULL,
            download_count INTEGER NOT NULL DEFAULT 0,
            UNIQUE(package_id, tag)
        );
        CREATE INDEX IF NOT EXISTS idx_releases_package ON releases(package_id);

        CREATE TABLE IF NOT EXISTS users (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            username      TEXT NOT NULL UNIQUE,
            email         TEXT NOT NULL UNIQUE,
            password_hash TEXT,
            active        INTEGER NOT NULL DEFAULT 1,
            created_at    INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS identities (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id          INTEGER NOT NULL REFERENCES users(id),
            provider         TEXT NOT NULL,
            provider_user_id TEXT NOT NULL,
            display          TEXT NOT NULL DEFAULT '',
            created_at       INTEGER NOT NULL,
            UNIQUE(provider, provider_user_id)
        );

        CREATE TABLE IF NOT EXISTS aliases (
            short_name TEXT PRIMARY KEY,
            owner      TEXT NOT NULL,
            repo       TEXT NOT NULL,
            created_by TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS revoked_tokens (
            token_digest TEXT PRIMARY KEY,
            expires_at   INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS downloads_daily (
            day   TEXT PRIMARY KEY,
            count INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS registry_config (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS discovery_cache (
            cache_key  TEXT PRIMARY KEY,
            payload    TEXT NOT NULL,
            fetched_at INTEGER NOT NULL
        );
        "#,
    )
}
