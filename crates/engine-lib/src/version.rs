//! Model version resolution
//!
//! Versions are published as release bundles in an external release index;
//! each usable release carries one artifact per model, a preprocessor, and
//! a metadata file. Resolution is layered: the live backend knows best,
//! the release index is the fallback, and a configured default tag is the
//! answer of last resort. Nothing here ever fails a scoring request.

use crate::backend::ScoringBackend;
use crate::models::{VersionInfo, VersionSource, MODEL_NAMES};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const PREPROCESSOR_ASSET: &str = "preprocessor.pkl";
pub const METADATA_ASSET: &str = "metadata.json";

fn model_asset_name(model: &str) -> String {
    format!("{model}_model.pkl")
}

/// One file attached to a release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

/// One entry in the release index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    pub fn is_published(&self) -> bool {
        !self.draft && !self.prerelease
    }

    /// A release is only usable when every model artifact plus the
    /// preprocessor and metadata files are present.
    pub fn has_complete_artifacts(&self) -> bool {
        MODEL_NAMES
            .iter()
            .all(|model| self.asset(&model_asset_name(model)).is_some())
            && self.asset(PREPROCESSOR_ASSET).is_some()
            && self.asset(METADATA_ASSET).is_some()
    }

    /// Artifact URLs keyed by model name, for reload requests.
    pub fn model_urls(&self) -> BTreeMap<String, String> {
        MODEL_NAMES
            .iter()
            .filter_map(|model| {
                self.asset(&model_asset_name(model))
                    .map(|asset| (model.to_string(), asset.browser_download_url.clone()))
            })
            .collect()
    }

    fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|asset| asset.name == name)
    }
}

/// Source of published release bundles.
#[async_trait]
pub trait ReleaseIndex: Send + Sync {
    /// All releases, newest first.
    async fn releases(&self) -> Result<Vec<Release>>;
}

/// Release index backed by the GitHub releases API for one repository.
pub struct GithubReleaseIndex {
    http: reqwest::Client,
    repo: String,
    request_timeout: Duration,
}

impl GithubReleaseIndex {
    pub fn new(repo: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            // the GitHub API refuses requests without a User-Agent
            .user_agent("ensemble-fraud-scoring")
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            repo: repo.into(),
            request_timeout: Duration::from_secs(10),
        })
    }
}

#[async_trait]
impl ReleaseIndex for GithubReleaseIndex {
    async fn releases(&self) -> Result<Vec<Release>> {
        let url = format!("https://api.github.com/repos/{}/releases", self.repo);
        let response = self
            .http
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .with_context(|| format!("Release index request failed for {}", self.repo))?;

        if !response.status().is_success() {
            bail!("release index returned HTTP {}", response.status());
        }
        response
            .json()
            .await
            .context("Release index returned malformed JSON")
    }
}

/// Resolves the active model version and brokers best-effort reloads.
pub struct VersionResolver {
    backend: Arc<dyn ScoringBackend>,
    index: Arc<dyn ReleaseIndex>,
    default_version: String,
    query_backend: bool,
}

impl VersionResolver {
    pub fn new(
        backend: Arc<dyn ScoringBackend>,
        index: Arc<dyn ReleaseIndex>,
        default_version: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            index,
            default_version: default_version.into(),
            query_backend: true,
        }
    }

    /// Skip all backend calls when the backend is administratively
    /// disabled; resolution then starts at the release index.
    pub fn with_backend_queries(mut self, enabled: bool) -> Self {
        self.query_backend = enabled;
        self
    }

    /// The version currently in effect. Backend first, newest published
    /// release next, the configured default tag last. Never fails.
    pub async fn current_version(&self) -> VersionInfo {
        if self.query_backend {
            if let Some(version) = self.backend.loaded_version().await {
                return VersionInfo {
                    version,
                    source: VersionSource::Backend,
                };
            }
        }

        match self.published_releases().await.into_iter().next() {
            Some(release) => VersionInfo {
                version: release.tag_name,
                source: VersionSource::ReleaseIndex,
            },
            None => {
                debug!(
                    default = %self.default_version,
                    "Version resolution degraded to default tag"
                );
                VersionInfo {
                    version: self.default_version.clone(),
                    source: VersionSource::Unknown,
                }
            }
        }
    }

    /// Tags of every published, artifact-complete release. Empty when the
    /// index is unreachable.
    pub async fn available_versions(&self) -> Vec<String> {
        self.published_releases()
            .await
            .into_iter()
            .map(|release| release.tag_name)
            .collect()
    }

    /// Release metadata for one version: index fields plus the asset
    /// name-to-URL map. `None` when the version is not published.
    pub async fn metadata(&self, version: &str) -> Option<BTreeMap<String, serde_json::Value>> {
        let release = self.find_release(version).await?;

        let mut metadata = BTreeMap::new();
        metadata.insert("tag".to_string(), serde_json::json!(release.tag_name));
        if let Some(name) = &release.name {
            metadata.insert("name".to_string(), serde_json::json!(name));
        }
        if let Some(published_at) = &release.published_at {
            metadata.insert("published_at".to_string(), serde_json::json!(published_at));
        }
        let assets: BTreeMap<&str, &str> = release
            .assets
            .iter()
            .map(|asset| (asset.name.as_str(), asset.browser_download_url.as_str()))
            .collect();
        metadata.insert("assets".to_string(), serde_json::json!(assets));
        Some(metadata)
    }

    /// Ask the backend to load the given version's artifacts. Best-effort:
    /// an unknown version or an unreachable backend yields `false`, never
    /// an error, and never blocks scoring.
    pub async fn request_reload(&self, version: &str) -> bool {
        if !self.query_backend {
            warn!(version = %version, "Reload requested while backend is disabled");
            return false;
        }
        let release = match self.find_release(version).await {
            Some(release) => release,
            None => {
                warn!(version = %version, "Reload requested for unknown version");
                return false;
            }
        };

        let model_urls = release.model_urls();
        let accepted = self.backend.request_reload(version, &model_urls).await;
        if accepted {
            info!(version = %version, "Backend accepted model reload");
        } else {
            warn!(version = %version, "Backend declined model reload");
        }
        accepted
    }

    async fn find_release(&self, version: &str) -> Option<Release> {
        self.published_releases()
            .await
            .into_iter()
            .find(|release| release.tag_name == version)
    }

    async fn published_releases(&self) -> Vec<Release> {
        match self.index.releases().await {
            Ok(releases) => releases
                .into_iter()
                .filter(|release| release.is_published() && release.has_complete_artifacts())
                .collect(),
            Err(err) => {
                warn!(error = %err, "Release index unavailable");
                Vec::new()
            }
        }
    }
}
