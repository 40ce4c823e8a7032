//! Web-app manifest icon extraction.

use crate::candidate::{CandidateDescriptor, DeclaredSize, Role};
use crate::fetch::{self, FetchError, Fetcher};
use serde::Deserialize;
use tracing::debug;
use url::Url;

#[derive(Debug, Default, Deserialize)]
struct WebManifest {
    #[serde(default)]
    icons: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ManifestIcon {
    src: String,
    #[serde(default)]
    sizes: Option<String>,
    #[serde(default, rename = "type")]
    mime: Option<String>,
}

/// Errors encountered while loading a manifest. Never surfaced to callers of
/// [`fetch_manifest_icons`]; they only explain an empty result in logs.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The manifest could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The server answered with a non-success status.
    #[error("manifest answered with status {0}")]
    Status(u16),
    /// The body was not valid JSON.
    #[error("manifest is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Extracts icon candidates from a manifest body.
///
/// Entries without a usable `src` are skipped individually; only a body that
/// is not JSON at all is an error.
pub fn parse_manifest(manifest_url: &Url, body: &[u8]) -> Result<Vec<CandidateDescriptor>, serde_json::Error> {
    let manifest: WebManifest = serde_json::from_slice(body)?;
    let candidates = manifest
        .icons
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<ManifestIcon>(entry).ok())
        .filter_map(|icon| {
            let url = manifest_url.join(icon.src.trim()).ok()?;
            Some(
                CandidateDescriptor::new(url, Role::ManifestIcon)
                    .with_size(DeclaredSize::parse(icon.sizes.as_deref()))
                    .with_type(icon.mime),
            )
        })
        .collect();
    Ok(candidates)
}

async fn load_manifest<F>(
    fetcher: &F,
    manifest_url: &Url,
    max_bytes: usize,
) -> Result<Vec<CandidateDescriptor>, ManifestError>
where
    F: Fetcher + ?Sized,
{
    let response = fetch::open(fetcher, manifest_url).await?;
    if !response.head.is_success() {
        return Err(ManifestError::Status(response.head.status));
    }
    let base = response.head.url.clone();
    let body = response.bytes(max_bytes).await?;
    Ok(parse_manifest(&base, &body)?)
}

/// Fetches a manifest and returns its icons; any failure yields an empty list.
pub async fn fetch_manifest_icons<F>(
    fetcher: &F,
    manifest_url: &Url,
    max_bytes: usize,
) -> Vec<CandidateDescriptor>
where
    F: Fetcher + ?Sized,
{
    match load_manifest(fetcher, manifest_url, max_bytes).await {
        Ok(candidates) => candidates,
        Err(err) => {
            debug!(manifest = %manifest_url, %err, "manifest yielded no icons");
            Vec::new()
        }
    }
}
