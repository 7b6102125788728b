//! Download counters, aggregate stats, registry config KV and the
//! discovery cache.

use rusqlite::{params, OptionalExtension};
use zg_domain::model::Stats;

use crate::{Catalog, Result};

impl Catalog {
    /// Apply a batch of download-count increments for one release.
    ///
    /// Counters are monotonic: the per-release counter, the per-day counter
    /// and the lifetime total all move together in one transaction. An
    /// increment for a release deleted since it was counted still lands in
    /// the aggregates.
    pub fn increment_download_count(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
        by: i64,
    ) -> Result<()> {
        if by <= 0 {
            return Ok(());
        }
        let day = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE releases SET download_count = download_count + ?4
             WHERE package_id = (SELECT id FROM packages WHERE owner = ?1 AND repo = ?2)
               AND tag = ?3",
            params![owner, repo, tag, by],
        )?;
        tx.execute(
            "INSERT INTO downloads_daily (day, count) VALUES (?1, ?2)
             ON CONFLICT(day) DO UPDATE SET count = count + ?2",
            params![day, by],
        )?;
        tx.execute(
            "INSERT INTO registry_config (key, value) VALUES ('total_downloads', ?1)
             ON CONFLICT(key) DO UPDATE SET value = CAST(value AS INTEGER) + ?1",
            params![by],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_download_count(&self, owner: &str, repo: &str, tag: &str) -> Result<i64> {
        let conn = self.conn();
        let count: Option<i64> = conn
            .query_row(
                "SELECT download_count FROM releases
                 WHERE package_id = (SELECT id FROM packages WHERE owner = ?1 AND repo = ?2)
                   AND tag = ?3",
                params![owner, repo, tag],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0))
    }

    pub fn get_stats(&self) -> Result<Stats> {
        let conn = self.conn();
        let total_packages: i64 =
            conn.query_row("SELECT COUNT(*) FROM packages", [], |row| row.get(0))?;
        let total_releases: i64 =
            conn.query_row("SELECT COUNT(*) FROM releases", [], |row| row.get(0))?;
        let total_downloads: i64 = conn
            .query_row(
                "SELECT CAST(value AS INTEGER) FROM registry_config WHERE key = 'total_downloads'",
                [],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        let day = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let downloads_today: i64 = conn
            .query_row(
                "SELECT count FROM downloads_daily WHERE day = ?1",
                params![day],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        Ok(Stats {
            total_packages,
            total_releases,
            total_downloads,
            downloads_today,
        })
    }

    // ── Registry config KV ──────────────────────────────────────────

    pub fn get_registry_config(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        Ok(conn
            .query_row(
                "SELECT value FROM registry_config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn set_registry_config(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO registry_config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    // ── Discovery cache ─────────────────────────────────────────────

    /// Cached upstream payload and its age in seconds, if present.
    pub fn get_discovery_cache(&self, cache_key: &str) -> Result<Option<(String, i64)>> {
        let conn = self.conn();
        Ok(conn
            .query_row(
                "SELECT payload, fetched_at FROM discovery_cache WHERE cache_key = ?1",
                params![cache_key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .map(|(payload, fetched_at): (String, i64)| (payload, Self::now() - fetched_at)))
    }

    pub fn put_discovery_cache(&self, cache_key: &str, payload: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO discovery_cache (cache_key, payload, fetched_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(cache_key) DO UPDATE SET payload = ?2, fetched_at = ?3",
            params![cache_key, payload, Self::now()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::packages::{BlobRef, NewRelease, PackageHints};

    use super::*;

    fn catalog_with_release() -> Catalog {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog
            .create_release(
                "alice",
                "widget",
                "1.0.0",
                &NewRelease::default(),
                &BlobRef {
                    size: 1234,
                    sha256: "ab".repeat(32),
                },
                &PackageHints::default(),
            )
            .unwrap();
        catalog
    }

    #[test]
    fn increments_move_all_counters() {
        let catalog = catalog_with_release();
        catalog.increment_download_count("alice", "widget", "1.0.0", 1).unwrap();
        catalog.increment_download_count("alice", "widget", "1.0.0", 2).unwrap();

        assert_eq!(catalog.get_download_count("alice", "widget", "1.0.0").unwrap(), 3);
        let stats = catalog.get_stats().unwrap();
        assert_eq!(stats.total_packages, 1);
        assert_eq!(stats.total_releases, 1);
        assert_eq!(stats.total_downloads, 3);
        assert_eq!(stats.downloads_today, 3);
    }

    #[test]
    fn zero_increment_is_a_no_op() {
        let catalog = catalog_with_release();
        catalog.increment_download_count("alice", "widget", "1.0.0", 0).unwrap();
        assert_eq!(catalog.get_stats().unwrap().total_downloads, 0);
    }

    #[test]
    fn aggregate_counters_survive_release_deletion() {
        let catalog = catalog_with_release();
        catalog.increment_download_count("alice", "widget", "1.0.0", 5).unwrap();
        catalog.delete_release("alice", "widget", "1.0.0").unwrap();
        // The lifetime total is monotonic even though the release is gone.
        assert_eq!(catalog.get_stats().unwrap().total_downloads, 5);
        assert_eq!(catalog.get_download_count("alice", "widget", "1.0.0").unwrap(), 0);
    }

    #[test]
    fn registry_config_round_trips() {
        let catalog = Catalog::open_in_memory().unwrap();
        assert_eq!(catalog.get_registry_config("motd").unwrap(), None);
        catalog.set_registry_config("motd", "hello").unwrap();
        catalog.set_registry_config("motd", "hello again").unwrap();
        assert_eq!(
            catalog.get_registry_config("motd").unwrap().as_deref(),
            Some("hello again")
        );
    }

    #[test]
    fn discovery_cache_reports_age() {
        let catalog = Catalog::open_in_memory().unwrap();
        assert!(catalog.get_discovery_cache("search:q").unwrap().is_none());
        catalog.put_discovery_cache("search:q", r#"[{"name":"x"}]"#).unwrap();
        let (payload, age) = catalog.get_discovery_cache("search:q").unwrap().unwrap();
        assert_eq!(payload, r#"[{"name":"x"}]"#);
        assert!(age <= 1);
    }
}
