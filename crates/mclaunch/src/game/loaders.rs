//! Mod-loader and custom-client version selection.

use std::sync::LazyLock;

use mclaunch_types::VersionId;
use regex::Regex;
use serde::Deserialize;

pub const FABRIC_META_URL: &str = "https://meta.fabricmc.net/v2";
pub const FORGE_MAVEN_URL: &str = "https://maven.minecraftforge.net/net/minecraftforge/forge";

static MAVEN_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<version>\s*([^<\s]+)\s*</version>").expect("maven version pattern is valid"));

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FabricGameVersion {
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FabricLoaderVersion {
    pub version: String,
    #[serde(default)]
    pub stable: bool,
}

pub fn fabric_version_id(game: &VersionId, loader: &str) -> VersionId {
    VersionId::new(format!("fabric-loader-{loader}-{game}"))
}

pub(crate) fn latest_stable_loader(loaders: &[FabricLoaderVersion]) -> Option<String> {
    loaders
        .iter()
        .find(|l| l.stable)
        .or_else(|| loaders.first())
        .map(|l| l.version.clone())
}

pub fn forge_version_id(game: &VersionId, build: &str) -> VersionId {
    VersionId::new(format!("{game}-forge-{build}"))
}

/// Forge builds published for `game` in the maven metadata, oldest first.
pub(crate) fn forge_builds_for(metadata: &str, game: &VersionId) -> Vec<String> {
    let prefix = format!("{game}-");
    let mut builds: Vec<String> = MAVEN_VERSION
        .captures_iter(metadata)
        .filter_map(|c| c[1].strip_prefix(prefix.as_str()).map(str::to_string))
        .collect();
    builds.sort_by(|a, b| compare_dotted(a, b));
    builds.dedup();
    builds
}

pub(crate) fn forge_installer_url(maven: &str, game: &VersionId, build: &str) -> String {
    let coord = format!("{game}-{build}");
    format!("{}/{coord}/forge-{coord}-installer.jar", maven.trim_end_matches('/'))
}

/// Picks the forge build to launch from what is already installed.
///
/// An explicit `requested` build must be installed as `<game>-forge-<build>`.
/// Otherwise the newest installed build for `game` is used.
pub fn find_installed_forge(
    installed: &[VersionId],
    game: &VersionId,
    requested: Option<&str>,
) -> anyhow::Result<VersionId> {
    let prefix = format!("{game}-forge-");
    if let Some(build) = requested {
        let wanted = format!("{prefix}{build}");
        return installed
            .iter()
            .find(|v| v.as_str() == wanted)
            .cloned()
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "forge {wanted} is not installed; run the official forge installer for it first"
                )
            });
    }

    let mut builds: Vec<&VersionId> = installed
        .iter()
        .filter(|v| v.as_str().starts_with(&prefix))
        .collect();
    builds.sort_by(|a, b| compare_dotted(&a.as_str()[prefix.len()..], &b.as_str()[prefix.len()..]));
    builds.last().map(|v| (*v).clone()).ok_or_else(|| {
        anyhow::anyhow!(
            "no forge build is installed for minecraft {game}; run the official forge installer first"
        )
    })
}

/// Numeric-aware comparison of dotted build strings (`47.10.0 > 47.9.1`).
fn compare_dotted(a: &str, b: &str) -> std::cmp::Ordering {
    let mut ai = a.split(['.', '-']);
    let mut bi = b.split(['.', '-']);
    loop {
        match (ai.next(), bi.next()) {
            (None, None) => return std::cmp::Ordering::Equal,
            (None, Some(_)) => return std::cmp::Ordering::Less,
            (Some(_), None) => return std::cmp::Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(x), Ok(y)) => x.cmp(&y),
                    _ => x.cmp(y),
                };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMatch {
    None,
    One(VersionId),
    Many(Vec<VersionId>),
}

/// Installed versions whose id mentions both the game version and the
/// client name (case-insensitive on the name).
pub fn find_client(installed: &[VersionId], game: &VersionId, client: &str) -> ClientMatch {
    let needle = client.to_lowercase();
    let mut found: Vec<VersionId> = installed
        .iter()
        .filter(|v| v.as_str().contains(game.as_str()) && v.as_str().to_lowercase().contains(&needle))
        .cloned()
        .collect();
    match found.len() {
        0 => ClientMatch::None,
        1 => ClientMatch::One(found.remove(0)),
        _ => ClientMatch::Many(found),
    }
}
