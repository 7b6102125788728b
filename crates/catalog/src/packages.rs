//! Package and release operations.

use rusqlite::{params, OptionalExtension, Transaction};
use zg_domain::model::{download_path, Package, PackageSummary, Release, TagEntry};
use zg_domain::version::cmp_tags_desc;

use crate::{like_escape, unique_conflict, Catalog, CatalogError, Result};

/// Metadata hints applied to the package row on publish. `None` leaves the
/// existing value (or the column default) untouched.
#[derive(Debug, Clone, Default)]
pub struct PackageHints {
    pub description: Option<String>,
    pub topics: Option<Vec<String>>,
    pub license: Option<String>,
    pub homepage: Option<String>,
    pub github_url: Option<String>,
}

/// Attributes of a release being published.
#[derive(Debug, Clone, Default)]
pub struct NewRelease {
    pub name: String,
    pub body: String,
    pub draft: bool,
    pub prerelease: bool,
}

/// Reference to a stored archive: the catalog records integrity metadata,
/// never the bytes.
#[derive(Debug, Clone)]
pub struct BlobRef {
    pub size: u64,
    pub sha256: String,
}

impl Catalog {
    pub fn get_package(&self, owner: &str, repo: &str) -> Result<Package> {
        let conn = self.conn();
        conn.query_row(
            "SELECT owner, repo, description, topics, license, homepage, github_url,
                    stargazers_count, private, created_at, updated_at
             FROM packages WHERE owner = ?1 AND repo = ?2",
            params![owner, repo],
            package_from_row,
        )
        .optional()?
        .ok_or(CatalogError::NotFound)
    }

    /// Create or refresh the package row a release is being published into.
    pub fn upsert_package_from_release(
        &self,
        owner: &str,
        repo: &str,
        hints: &PackageHints,
    ) -> Result<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let id = upsert_package_tx(&tx, owner, repo, hints, Self::now())?;
        tx.commit()?;
        Ok(id)
    }

    /// Publish: upsert the package row and insert the release, atomically.
    pub fn create_release(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
        attrs: &NewRelease,
        blob: &BlobRef,
        hints: &PackageHints,
    ) -> Result<i64> {
        let now = Self::now();
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let package_id = upsert_package_tx(&tx, owner, repo, hints, now)?;

        let locked: bool = tx.query_row(
            "SELECT locked FROM packages WHERE id = ?1",
            params![package_id],
            |row| row.get(0),
        )?;
        if locked {
            return Err(CatalogError::PackageLocked);
        }

        let published_at: Option<i64> = if attrs.draft { None } else { Some(now) };
        tx.execute(
            "INSERT INTO releases
                 (package_id, tag, name, body, draft, prerelease,
                  created_at, published_at, file_size, sha256)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                package_id,
                tag,
                attrs.name,
                attrs.body,
                attrs.draft,
                attrs.prerelease,
                now,
                published_at,
                blob.size as i64,
                blob.sha256,
            ],
        )
        .map_err(|e| match unique_conflict(&e) {
            Some(m) if m.contains("releases.") => CatalogError::VersionExists,
            _ => CatalogError::Sqlite(e),
        })?;
        let release_id = tx.last_insert_rowid();

        tx.commit()?;
        Ok(release_id)
    }

    pub fn get_release(&self, owner: &str, repo: &str, tag: &str) -> Result<Release> {
        let conn = self.conn();
        conn.query_row(
            "SELECT r.id, r.tag, r.name, r.body, r.draft, r.prerelease,
                    r.created_at, r.published_at, r.file_size, r.sha256
             FROM releases r
             JOIN packages p ON p.id = r.package_id
             WHERE p.owner = ?1 AND p.repo = ?2 AND r.tag = ?3",
            params![owner, repo, tag],
            |row| release_from_row(row, owner, repo),
        )
        .optional()?
        .ok_or(CatalogError::NotFound)
    }

    /// All releases for a package, newest first by semver precedence.
    pub fn list_releases(&self, owner: &str, repo: &str) -> Result<Vec<Release>> {
        // The package must exist even when it has no releases.
        self.get_package(owner, repo)?;

        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT r.id, r.tag, r.name, r.body, r.draft, r.prerelease,
                    r.created_at, r.published_at, r.file_size, r.sha256
             FROM releases r
             JOIN packages p ON p.id = r.package_id
             WHERE p.owner = ?1 AND p.repo = ?2",
        )?;
        let mut releases: Vec<Release> = stmt
            .query_map(params![owner, repo], |row| release_from_row(row, owner, repo))?
            .collect::<rusqlite::Result<_>>()?;
        releases.sort_by(|a, b| cmp_tags_desc(&a.tag_name, &b.tag_name));
        Ok(releases)
    }

    /// Tag listing (release subset), same ordering as `list_releases`.
    pub fn list_tags(&self, owner: &str, repo: &str) -> Result<Vec<TagEntry>> {
        let releases = self.list_releases(owner, repo)?;
        Ok(releases
            .into_iter()
            .map(|r| TagEntry {
                name: r.tag_name,
                tarball_url: r.tarball_url,
                zipball_url: r.zipball_url,
            })
            .collect())
    }

    pub fn delete_release(&self, owner: &str, repo: &str, tag: &str) -> Result<()> {
        let conn = self.conn();
        let affected = conn.execute(
            "DELETE FROM releases
             WHERE package_id = (SELECT id FROM packages WHERE owner = ?1 AND repo = ?2)
               AND tag = ?3",
            params![owner, repo, tag],
        )?;
        if affected == 0 {
            return Err(CatalogError::NotFound);
        }
        Ok(())
    }

    /// Admin switch blocking further publishes to a package.
    pub fn set_package_locked(&self, owner: &str, repo: &str, locked: bool) -> Result<()> {
        let conn = self.conn();
        let affected = conn.execute(
            "UPDATE packages SET locked = ?3 WHERE owner = ?1 AND repo = ?2",
            params![owner, repo, locked],
        )?;
        if affected == 0 {
            return Err(CatalogError::NotFound);
        }
        Ok(())
    }

    /// Substring search over owner, repo and description. Rank: owner match
    /// counts 3, repo 2, description 1; ties break on stars, then recency.
    pub fn search_packages(&self, q: &str, limit: usize) -> Result<Vec<PackageSummary>> {
        if q.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let pattern = format!("%{}%", like_escape(q));
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT owner, repo, description, stargazers_count, updated_at
             FROM packages
             WHERE (owner LIKE ?1 ESCAPE '\\')
                OR (repo LIKE ?1 ESCAPE '\\')
                OR (description LIKE ?1 ESCAPE '\\')
             ORDER BY (owner LIKE ?1 ESCAPE '\\') * 3
                    + (repo LIKE ?1 ESCAPE '\\') * 2
                    + (description LIKE ?1 ESCAPE '\\') DESC,
                      stargazers_count DESC,
                      updated_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![pattern, limit as i64], |row| {
                let owner: String = row.get(0)?;
                let repo: String = row.get(1)?;
                Ok(PackageSummary {
                    full_name: format!("{owner}/{repo}"),
                    owner,
                    repo,
                    description: row.get(2)?,
                    stargazers_count: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    }
}

fn upsert_package_tx(
    tx: &Transaction<'_>,
    owner: &str,
    repo: &str,
    hints: &PackageHints,
    now: i64,
) -> Result<i64> {
    let topics_json = hints
        .topics
        .as_ref()
        .map(|t| serde_json::to_string(t).unwrap_or_else(|_| "[]".into()));
    tx.execute(
        "INSERT INTO packages
             (owner, repo, description, topics, license, homepage, github_url,
              created_at, updated_at)
         VALUES (?1, ?2, COALESCE(?3, ''), COALESCE(?4, '[]'), COALESCE(?5, ''),
                 COALESCE(?6, ''), COALESCE(?7, ''), ?8, ?8)
         ON CONFLICT(owner, repo) DO UPDATE SET
             description = COALESCE(?3, description),
             topics      = COALESCE(?4, topics),
             license     = COALESCE(?5, license),
             homepage    = COALESCE(?6, homepage),
             github_url  = COALESCE(?7, github_url),
             updated_at  = ?8",
        params![
            owner,
            repo,
            hints.description,
            topics_json,
            hints.license,
            hints.homepage,
            hints.github_url,
            now,
        ],
    )?;
    let id = tx.query_row(
        "SELECT id FROM packages WHERE owner = ?1 AND repo = ?2",
        params![owner, repo],
        |row| row.get(0),
    )?;
    Ok(id)
}

fn package_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Package> {
    let owner: String = row.get(0)?;
    let repo: String = row.get(1)?;
    let topics_json: String = row.get(3)?;
    Ok(Package {
        full_name: format!("{owner}/{repo}"),
        owner,
        repo,
        description: row.get(2)?,
        topics: serde_json::from_str(&topics_json).unwrap_or_default(),
        license: row.get(4)?,
        homepage: row.get(5)?,
        github_url: row.get(6)?,
        stargazers_count: row.get(7)?,
        private: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn release_from_row(row: &rusqlite::Row<'_>, owner: &str, repo: &str) -> rusqlite::Result<Release> {
    let tag: String = row.get(1)?;
    let url = download_path(owner, repo, &tag);
    Ok(Release {
        id: row.get(0)?,
        name: row.get(2)?,
        body: row.get(3)?,
        draft: row.get(4)?,
        prerelease: row.get(5)?,
        created_at: row.get(6)?,
        published_at: row.get(7)?,
        file_size: row.get(8)?,
        sha256: row.get(9)?,
        tarball_url: url.clone(),
        zipball_url: url.clone(),
        download_url: url,
        tag_name: tag,
    })
}
