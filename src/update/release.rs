//! Release-list responses in the GitHub REST format.
//!
//! Only the first release of the list is looked at, and only its first
//! asset with the installable suffix. Assets are decoded in order and the
//! scan stops at the first match, so entries after it are never inspected.

use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Asset {
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
}

#[derive(Debug, Deserialize)]
struct ReleaseWire {
    tag_name: String,
    html_url: String,
    #[serde(default)]
    assets: Vec<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleaseInfo {
    /// Tag name without the leading `v`.
    pub version: String,
    pub html_url: String,
    /// URL of the selected installable asset.
    pub download_url: String,
}

/// Parses a release list and picks the most recent release.
///
/// Returns `Ok(None)` for an empty list or when the release carries no asset
/// ending in `suffix`.
pub fn latest_release(body: &str, suffix: &str) -> serde_json::Result<Option<ReleaseInfo>> {
    let releases: Vec<serde_json::Value> = serde_json::from_str(body)?;
    let Some(latest) = releases.into_iter().next() else {
        return Ok(None);
    };
    let latest: ReleaseWire = serde_json::from_value(latest)?;

    let mut selected = None;
    for asset in latest.assets {
        let asset: Asset = serde_json::from_value(asset)?;
        if asset.name.ends_with(suffix) {
            selected = Some(asset);
            break;
        }
    }
    let Some(asset) = selected else {
        return Ok(None);
    };

    Ok(Some(ReleaseInfo {
        version: latest
            .tag_name
            .strip_prefix('v')
            .unwrap_or(&latest.tag_name)
            .to_owned(),
        html_url: latest.html_url,
        download_url: asset.download_url,
    }))
}
