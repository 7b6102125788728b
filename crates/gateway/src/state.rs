use std::collections::HashMap;
use std::sync::Arc;

use zg_auth::federated::{LoginStateStore, OauthClient, OidcClient};
use zg_auth::tokens::TokenSigner;
use zg_blobs::BlobStore;
use zg_catalog::Catalog;
use zg_discovery::DiscoveryProvider;
use zg_domain::config::Config;

use crate::runtime::downloads::DownloadCoalescer;
use crate::runtime::publish_lock::PublishLockMap;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core stores** — config, catalog, blob store
/// - **Auth** — token signer, login handshakes, identity providers
/// - **Satellites** — discovery client
/// - **Runtime** — publish locks, download coalescer
#[derive(Clone)]
pub struct AppState {
    // ── Core stores ───────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub catalog: Arc<Catalog>,
    pub blobs: Arc<BlobStore>,

    // ── Auth ──────────────────────────────────────────────────────────
    pub signer: Arc<TokenSigner>,
    pub logins: Arc<LoginStateStore>,
    pub oidc: Arc<HashMap<String, Arc<OidcClient>>>,
    pub oauth: Arc<HashMap<String, Arc<OauthClient>>>,

    // ── Satellites ────────────────────────────────────────────────────
    /// `None` when `DISCOVERY_URL` is unset; the discovery surface then
    /// serves empty lists.
    pub discovery: Option<Arc<dyn DiscoveryProvider>>,

    // ── Runtime ───────────────────────────────────────────────────────
    /// Per-`(owner, repo, tag)` exclusive locks held across
    /// store-and-commit during publish.
    pub publish_locks: Arc<PublishLockMap>,
    /// Coalesced download counters, flushed periodically.
    pub downloads: Arc<DownloadCoalescer>,
}

impl AppState {
    /// Whether `username` is granted the admin scope at login.
    pub fn is_admin_user(&self, username: &str) -> bool {
        self.config
            .auth
            .admin_users
            .iter()
            .any(|u| u == username)
    }
}
