//! Thin client for the external discovery provider.
//!
//! The provider is a read-only index of packages in the wider ecosystem.
//! The gateway caches results in the catalog and serves stale entries when
//! the upstream is down, so every failure here is soft.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum DiscoveryError {
    #[error("discovery upstream: {0}")]
    Upstream(String),
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// One entry from the discovery index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredPackage {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "html_url")]
    pub url: String,
    #[serde(default, alias = "stargazers_count")]
    pub stars: i64,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub topics: Vec<String>,
}

/// Upstream responses come either bare or wrapped in `{"items": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum DiscoveryResponse {
    Wrapped { items: Vec<DiscoveredPackage> },
    Bare(Vec<DiscoveredPackage>),
}

impl DiscoveryResponse {
    fn into_items(self) -> Vec<DiscoveredPackage> {
        match self {
            DiscoveryResponse::Wrapped { items } => items,
            DiscoveryResponse::Bare(items) => items,
        }
    }
}

/// Narrow client interface; the gateway only needs these three reads.
#[async_trait]
pub trait DiscoveryProvider: Send + Sync {
    async fn search(&self, q: &str, limit: usize) -> Result<Vec<DiscoveredPackage>>;
    async fn trending(&self, category: Option<&str>, limit: usize)
        -> Result<Vec<DiscoveredPackage>>;
    async fn browse(&self, category: &str, limit: usize) -> Result<Vec<DiscoveredPackage>>;
}

/// HTTP implementation against `DISCOVERY_URL`.
pub struct HttpDiscoveryProvider {
    base_url: String,
    http: reqwest::Client,
}

impl HttpDiscoveryProvider {
    pub fn new(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }

    async fn fetch(&self, path: &str, params: &[(&str, String)]) -> Result<Vec<DiscoveredPackage>> {
        let url = reqwest::Url::parse_with_params(&format!("{}{path}", self.base_url), params)
            .map_err(|e| DiscoveryError::Upstream(e.to_string()))?;
        let response: DiscoveryResponse = self
            .http
            .get(url)
            .header("User-Agent", "ziggurat-registry")
            .send()
            .await
            .map_err(|e| DiscoveryError::Upstream(e.to_string()))?
            .error_for_status()
            .map_err(|e| DiscoveryError::Upstream(e.to_string()))?
            .json()
            .await
            .map_err(|e| DiscoveryError::Upstream(e.to_string()))?;
        Ok(response.into_items())
    }
}

#[async_trait]
impl DiscoveryProvider for HttpDiscoveryProvider {
    async fn search(&self, q: &str, limit: usize) -> Result<Vec<DiscoveredPackage>> {
        self.fetch(
            "/search",
            &[("q", q.to_owned()), ("limit", limit.to_string())],
        )
        .await
    }

    async fn trending(
        &self,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DiscoveredPackage>> {
        let mut params = vec![("limit", limit.to_string())];
        if let Some(category) = category {
            params.push(("category", category.to_owned()));
        }
        self.fetch("/trending", &params).await
    }

    async fn browse(&self, category: &str, limit: usize) -> Result<Vec<DiscoveredPackage>> {
        self.fetch(
            "/browse",
            &[("category", category.to_owned()), ("limit", limit.to_string())],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_and_bare_payloads_both_parse() {
        let wrapped = r#"{"items":[{"name":"zlib","description":"compression","url":"https://x","stars":10,"score":0.9,"topics":["io"]}]}"#;
        let bare = r#"[{"name":"zlib"}]"#;

        let a: DiscoveryResponse = serde_json::from_str(wrapped).unwrap();
        assert_eq!(a.into_items()[0].stars, 10);

        let b: DiscoveryResponse = serde_json::from_str(bare).unwrap();
        let items = b.into_items();
        assert_eq!(items[0].name, "zlib");
        assert_eq!(items[0].stars, 0);
        assert!(items[0].topics.is_empty());
    }

    #[test]
    fn alias_fields_are_accepted() {
        let payload = r#"[{"name":"zlib","html_url":"https://x","stargazers_count":7}]"#;
        let items: DiscoveryResponse = serde_json::from_str(payload).unwrap();
        let items = items.into_items();
        assert_eq!(items[0].url, "https://x");
        assert_eq!(items[0].stars, 7);
    }
}
