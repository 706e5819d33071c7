use log::{debug, warn};
use serde::Deserialize;
use thiserror::Error;

use crate::config::UpdaterConfig;

/// What an update run will download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    /// Release tag, or a synthetic `<current>-src` label when the feed did
    /// not provide one.
    pub tag: String,
    pub tag_is_synthetic: bool,
    pub asset_url: String,
    pub asset_name: Option<String>,
    /// Lower-case hex SHA-256 published alongside the asset, if any.
    pub asset_sha256: Option<String>,
    /// Set when `asset_url` is the unversioned source snapshot.
    pub is_source_fallback: bool,
}

impl ReleaseInfo {
    /// Source snapshot release used when no tagged artifact is available.
    #[must_use]
    pub fn source_fallback(
        current_version: &str,
        remote_tag: Option<&str>,
        config: &UpdaterConfig,
    ) -> Self {
        let (tag, tag_is_synthetic) = tag_or_synthetic(remote_tag, current_version);
        Self {
            tag,
            tag_is_synthetic,
            asset_url: config.fallback_url(),
            asset_name: None,
            asset_sha256: None,
            is_source_fallback: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GitHubAsset {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub browser_download_url: Option<String>,
    #[serde(default)]
    pub digest: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubRelease {
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub assets: Option<Vec<GitHubAsset>>,
}

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("failed to check for release: {0}")]
    Request(#[source] reqwest::Error),
    #[error("release check failed with HTTP {status}{body_snippet}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body_snippet: String,
    },
}

pub struct ReleaseLocator<'a> {
    client: &'a reqwest::Client,
    config: &'a UpdaterConfig,
}

impl<'a> ReleaseLocator<'a> {
    #[must_use]
    pub fn new(client: &'a reqwest::Client, config: &'a UpdaterConfig) -> Self {
        Self { client, config }
    }

    /// Look up the newest published release and pick its artifact.
    ///
    /// A response that cannot be decoded degrades to the source snapshot
    /// instead of failing.
    ///
    /// # Errors
    /// Returns [`LocateError`] when the endpoint is unreachable, times out,
    /// or answers with a non-success status.
    pub async fn locate(&self, current_version: &str) -> Result<ReleaseInfo, LocateError> {
        let url = self.config.latest_release_url();
        debug!("Fetching latest release from {url}");

        let response = self
            .client
            .get(&url)
            .timeout(self.config.http_timeout())
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(LocateError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body_snippet = response
                .text()
                .await
                .ok()
                .map(|body| response_snippet(&body, 160))
                .unwrap_or_default();
            return Err(LocateError::HttpStatus {
                status,
                body_snippet,
            });
        }

        let body = response.text().await.map_err(LocateError::Request)?;
        let release = match serde_json::from_str::<GitHubRelease>(&body) {
            Ok(release) => release,
            Err(error) => {
                warn!("Ignoring malformed release metadata: {error}");
                GitHubRelease::default()
            }
        };

        Ok(select_release(&release, current_version, self.config))
    }
}

/// Choose the artifact for this product from a decoded release.
#[must_use]
pub fn select_release(
    release: &GitHubRelease,
    current_version: &str,
    config: &UpdaterConfig,
) -> ReleaseInfo {
    let remote_tag = release
        .tag_name
        .as_deref()
        .map(str::trim)
        .filter(|tag| !tag.is_empty());

    let token = config.product_token.to_ascii_lowercase();
    let extension = config.asset_extension.to_ascii_lowercase();

    let matched = release.assets.iter().flatten().find_map(|asset| {
        let name = asset.name.as_deref()?;
        let url = asset.browser_download_url.as_deref()?;
        let lowered = name.to_ascii_lowercase();
        (lowered.ends_with(&extension) && lowered.contains(&token)).then_some((name, url, asset))
    });

    let Some((name, url, asset)) = matched else {
        return ReleaseInfo::source_fallback(current_version, remote_tag, config);
    };

    let (tag, tag_is_synthetic) = tag_or_synthetic(remote_tag, current_version);
    ReleaseInfo {
        tag,
        tag_is_synthetic,
        asset_url: url.to_string(),
        asset_name: Some(name.to_string()),
        asset_sha256: asset.digest.as_deref().and_then(parse_sha256_digest),
        is_source_fallback: false,
    }
}

fn tag_or_synthetic(remote_tag: Option<&str>, current_version: &str) -> (String, bool) {
    match remote_tag {
        Some(tag) => (tag.to_string(), false),
        None => (format!("{current_version}-src"), true),
    }
}

fn response_snippet(body: &str, max_chars: usize) -> String {
    let snippet: String = body.chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}

fn parse_sha256_digest(digest: &str) -> Option<String> {
    let (algorithm, hash) = digest.split_once(':')?;
    if !algorithm.eq_ignore_ascii_case("sha256") {
        return None;
    }
    if hash.len() != 64 || !hash.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    Some(hash.to_ascii_lowercase())
}
