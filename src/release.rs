//! Release feed client.
//!
//! Queries a release feed (GitHub-style JSON) for the latest version tag
//! and downloadable asset of an addon, the loader, or the application
//! itself.
//!
//! "No release found" is a valid terminal outcome distinct from a fetch
//! failure: an empty feed body, a missing tag, or a release without
//! assets all decode to `Ok(None)` and mean "nothing to do".

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::download;
use crate::error::UpdateError;
use crate::progress::ProgressSink;

/// HTTP request timeout for feed queries.
const FEED_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent sent with every request.
const USER_AGENT: &str = "loadstone-addon-manager";

/// Latest release of a feed: version tag plus the asset to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseDescriptor {
    /// Version tag (e.g. "v1.2").
    pub tag: String,
    /// Download URL of the first release asset.
    pub asset_url: String,
}

/// Release feed payload.
#[derive(Debug, Deserialize)]
struct ReleaseInfo {
    #[serde(default)]
    tag_name: String,
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

/// One downloadable asset of a release.
#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    #[serde(default)]
    browser_download_url: String,
}

/// Source of release metadata and artifacts.
///
/// The trait is the seam between the reconciliation logic and the
/// network; tests substitute a local provider.
pub trait ReleaseProvider: Send + Sync {
    /// Fetches the latest release for a feed URL.
    ///
    /// Returns `Ok(None)` when the feed exists but lists no usable
    /// release.
    fn latest_release(&self, feed_url: &str) -> Result<Option<ReleaseDescriptor>, UpdateError>;

    /// Downloads a release asset to `dest`, reporting progress.
    fn download_asset(
        &self,
        url: &str,
        dest: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<(), UpdateError>;
}

/// Release feed client over HTTP.
pub struct GitHubReleaseClient {
    /// HTTP client.
    client: reqwest::blocking::Client,
}

impl GitHubReleaseClient {
    /// Creates a new release client.
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FEED_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self { client }
    }

    /// Decodes a feed payload into a descriptor.
    ///
    /// An empty body, empty tag, or a release with no assets is the
    /// "no release" outcome rather than an error.
    fn decode(body: &str) -> Result<Option<ReleaseDescriptor>, UpdateError> {
        if body.trim().is_empty() {
            debug!("Feed returned an empty body, treating as no release");
            return Ok(None);
        }

        let info: ReleaseInfo = serde_json::from_str(body)
            .map_err(|e| UpdateError::FeedMalformed(e.to_string()))?;

        if info.tag_name.is_empty() {
            debug!("Feed payload has no tag_name, treating as no release");
            return Ok(None);
        }

        // The first asset is used unconditionally; a release without
        // assets has nothing to install.
        let Some(asset) = info.assets.first() else {
            debug!("Release {} has no assets, treating as no release", info.tag_name);
            return Ok(None);
        };

        if asset.browser_download_url.is_empty() {
            return Ok(None);
        }

        Ok(Some(ReleaseDescriptor {
            tag: info.tag_name,
            asset_url: asset.browser_download_url.clone(),
        }))
    }
}

impl Default for GitHubReleaseClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseProvider for GitHubReleaseClient {
    fn latest_release(&self, feed_url: &str) -> Result<Option<ReleaseDescriptor>, UpdateError> {
        assert!(!feed_url.is_empty(), "Feed URL must not be empty");

        debug!("Querying release feed: {}", feed_url);

        let response = self
            .client
            .get(feed_url)
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .map_err(|e| {
                warn!("Feed request failed: {}", e);
                UpdateError::FeedUnavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Feed returned status {}: {}", status, feed_url);
            return Err(UpdateError::FeedUnavailable(format!(
                "feed returned {}",
                status
            )));
        }

        let body = response
            .text()
            .map_err(|e| UpdateError::FeedUnavailable(e.to_string()))?;

        Self::decode(&body)
    }

    fn download_asset(
        &self,
        url: &str,
        dest: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<(), UpdateError> {
        download::download(&self.client, url, dest, sink)
    }
}

/// Update policy: an update is available iff the latest tag is non-empty
/// and string-unequal to the current version.
///
/// Deliberately not semantic-version aware; downgrades and upgrades are
/// indistinguishable, only "different" triggers action.
#[must_use]
pub fn update_available(current: &str, latest: &str) -> bool {
    !latest.is_empty() && latest != current
}

/// Reported latest version for a feed query result.
///
/// Falls back to the current version when the feed yielded no tag, so
/// that "no release" never signals an update.
#[must_use]
pub fn reported_latest<'a>(current: &'a str, release: Option<&'a ReleaseDescriptor>) -> &'a str {
    match release {
        Some(descriptor) => descriptor.tag.as_str(),
        None => current,
    }
}
