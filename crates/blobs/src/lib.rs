//! Content-addressed archive store.
//!
//! Archives live at `<root>/packages/<owner>/<repo>/<tag>.zpkg`. Ingest
//! computes the SHA-256 fingerprint, writes to a temp file in the
//! destination directory, then renames — a partial write is never visible.
//! Re-publishing byte-identical content is an idempotent success; anything
//! else at an occupied path is a conflict.
//!
//! Callers serialize concurrent publishes to one `(owner, repo, tag)`
//! (the gateway holds a per-path lock across store-and-commit).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(thiserror::Error, Debug)]
pub enum BlobError {
    #[error("archive is {size} bytes, over the {limit}-byte cap")]
    TooLarge { size: u64, limit: u64 },

    #[error("a different archive is already stored for this version")]
    AlreadyExists,

    #[error("archive not found")]
    NotFound,

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BlobError>;

/// Ingest result: where the archive landed and its integrity metadata.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub path: PathBuf,
    pub size: u64,
    pub sha256: String,
}

/// SHA-256 fingerprint of a byte slice, lowercase hex.
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct BlobStore {
    root: PathBuf,
    max_size: u64,
}

impl BlobStore {
    /// Open (and create) the store under `root`.
    pub fn new(root: impl Into<PathBuf>, max_size: u64) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("packages"))?;
        tracing::info!(root = %root.display(), max_size, "blob store ready");
        Ok(Self { root, max_size })
    }

    /// On-disk path for a release archive. Callers validate the identifier
    /// charset before reaching the store, which keeps `..` out of paths.
    pub fn blob_path(&self, owner: &str, repo: &str, tag: &str) -> PathBuf {
        self.root
            .join("packages")
            .join(owner)
            .join(repo)
            .join(format!("{tag}.zpkg"))
    }

    /// Ingest an archive.
    ///
    /// Fails with [`BlobError::AlreadyExists`] when the destination holds
    /// different content; byte-identical re-ingest succeeds and reports the
    /// existing file.
    pub fn store(&self, owner: &str, repo: &str, tag: &str, bytes: &[u8]) -> Result<StoredBlob> {
        let size = bytes.len() as u64;
        if size > self.max_size {
            return Err(BlobError::TooLarge {
                size,
                limit: self.max_size,
            });
        }

        let sha256 = fingerprint(bytes);
        let dest = self.blob_path(owner, repo, tag);

        if dest.exists() {
            let existing = fingerprint(&fs::read(&dest)?);
            if existing == sha256 {
                tracing::debug!(path = %dest.display(), "identical archive already stored");
                return Ok(StoredBlob {
                    path: dest,
                    size,
                    sha256,
                });
            }
            return Err(BlobError::AlreadyExists);
        }

        let parent = dest.parent().expect("blob path always has a parent");
        fs::create_dir_all(parent)?;

        // Temp file in the destination directory, so the rename is atomic
        // on the same filesystem.
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.persist(&dest).map_err(|e| BlobError::Io(e.error))?;

        tracing::info!(path = %dest.display(), size, sha256 = %sha256, "archive stored");
        Ok(StoredBlob {
            path: dest,
            size,
            sha256,
        })
    }

    /// Read an archive back in full.
    pub fn retrieve(&self, owner: &str, repo: &str, tag: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(owner, repo, tag);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BlobError::NotFound),
            Err(e) => Err(BlobError::Io(e)),
        }
    }

    pub fn exists(&self, owner: &str, repo: &str, tag: &str) -> bool {
        self.blob_path(owner, repo, tag).is_file()
    }

    /// Remove an archive. Used by release deletion; the caller treats
    /// failure as non-fatal.
    pub fn delete(&self, owner: &str, repo: &str, tag: &str) -> Result<()> {
        let path = self.blob_path(owner, repo, tag);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BlobError::NotFound),
            Err(e) => Err(BlobError::Io(e)),
        }
    }
}
