//! Alias short names. Globally namespaced: one `short_name` maps to one
//! `(owner, repo)` target.

use rusqlite::{params, OptionalExtension};
use zg_domain::model::Alias;

use crate::{Catalog, CatalogError, Result};

impl Catalog {
    /// Resolve a short name. A dangling alias (target package gone) is
    /// reported as `NotFound`, same as a missing alias.
    pub fn resolve_alias(&self, short_name: &str) -> Result<Alias> {
        let conn = self.conn();
        conn.query_row(
            "SELECT a.short_name, a.owner, a.repo, a.created_at, a.created_by
             FROM aliases a
             JOIN packages p ON p.owner = a.owner AND p.repo = a.repo
             WHERE a.short_name = ?1",
            params![short_name],
            |row| {
                let owner: String = row.get(1)?;
                let repo: String = row.get(2)?;
                Ok(Alias {
                    short_name: row.get(0)?,
                    full_name: format!("{owner}/{repo}"),
                    owner,
                    repo,
                    created_at: row.get(3)?,
                    created_by: row.get(4)?,
                })
            },
        )
        .optional()?
        .ok_or(CatalogError::NotFound)
    }

    /// Create an alias, or repoint an existing one.
    pub fn upsert_alias(
        &self,
        short_name: &str,
        owner: &str,
        repo: &str,
        created_by: &str,
    ) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO aliases (short_name, owner, repo, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(short_name) DO UPDATE SET
                 owner = ?2, repo = ?3, created_by = ?4",
            params![short_name, owner, repo, created_by, Self::now()],
        )?;
        Ok(())
    }

    pub fn delete_alias(&self, short_name: &str) -> Result<()> {
        let conn = self.conn();
        let affected = conn.execute(
            "DELETE FROM aliases WHERE short_name = ?1",
            params![short_name],
        )?;
        if affected == 0 {
            return Err(CatalogError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::packages::{BlobRef, NewRelease, PackageHints};

    use super::*;

    fn catalog_with_package() -> Catalog {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog
            .create_release(
                "alice",
                "widget",
                "1.0.0",
                &NewRelease::default(),
                &BlobRef {
                    size: 1,
                    sha256: "00".repeat(32),
                },
                &PackageHints::default(),
            )
            .unwrap();
        catalog
    }

    #[test]
    fn alias_resolves_to_target() {
        let catalog = catalog_with_package();
        catalog.upsert_alias("widget", "alice", "widget", "admin").unwrap();
        let alias = catalog.resolve_alias("widget").unwrap();
        assert_eq!(alias.full_name, "alice/widget");
        assert_eq!(alias.created_by, "admin");
    }

    #[test]
    fn upsert_is_idempotent_and_repoints() {
        let catalog = catalog_with_package();
        catalog.upsert_alias("w", "alice", "widget", "admin").unwrap();
        catalog.upsert_alias("w", "alice", "widget", "admin").unwrap();
        assert_eq!(catalog.resolve_alias("w").unwrap().full_name, "alice/widget");

        // Repoint to another existing package.
        catalog
            .create_release(
                "bob",
                "gadget",
                "1.0.0",
                &NewRelease::default(),
                &BlobRef {
                    size: 1,
                    sha256: "11".repeat(32),
                },
                &PackageHints::default(),
            )
            .unwrap();
        catalog.upsert_alias("w", "bob", "gadget", "admin").unwrap();
        assert_eq!(catalog.resolve_alias("w").unwrap().full_name, "bob/gadget");
    }

    #[test]
    fn dangling_alias_is_not_found() {
        let catalog = catalog_with_package();
        catalog.upsert_alias("ghost", "nobody", "nothing", "admin").unwrap();
        assert!(matches!(
            catalog.resolve_alias("ghost"),
            Err(CatalogError::NotFound)
        ));
    }

    #[test]
    fn delete_alias_removes_it() {
        let catalog = catalog_with_package();
        catalog.upsert_alias("w", "alice", "widget", "admin").unwrap();
        catalog.delete_alias("w").unwrap();
        assert!(matches!(catalog.resolve_alias("w"), Err(CatalogError::NotFound)));
        assert!(matches!(catalog.delete_alias("w"), Err(CatalogError::NotFound)));
    }
}
