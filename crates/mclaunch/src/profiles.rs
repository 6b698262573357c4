use std::{collections::BTreeMap, path::Path};

use mclaunch_types::VersionId;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct LauncherProfiles {
    #[serde(default)]
    profiles: BTreeMap<String, Profile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    #[serde(default)]
    last_version_id: Option<String>,
    #[serde(default)]
    game_dir: Option<String>,
}

/// `gameDir` of the first official-launcher profile pinned to `version`.
pub fn game_dir_override(minecraft_dir: &Path, version: &VersionId) -> Option<String> {
    let path = minecraft_dir.join("launcher_profiles.json");
    let raw = std::fs::read_to_string(&path).ok()?;
    let parsed: LauncherProfiles = match serde_json::from_str(&raw) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable launcher profiles");
            return None;
        }
    };

    let (name, profile) = parsed
        .profiles
        .iter()
        .find(|(_, p)| p.last_version_id.as_deref() == Some(version.as_str()))?;
    tracing::info!(profile = %name, version = %version, "found launcher profile");
    profile.game_dir.clone().filter(|d| !d.trim().is_empty())
}
