//! Mojang version JSON model, rule evaluation and `inheritsFrom` merging.

use std::collections::HashMap;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct VersionManifest {
    pub latest: LatestVersions,
    pub versions: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LatestVersions {
    pub release: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionJson {
    pub id: String,
    #[serde(default)]
    pub inherits_from: Option<String>,
    #[serde(default)]
    pub main_class: Option<String>,
    /// Pre-1.13 space separated game arguments.
    #[serde(default)]
    pub minecraft_arguments: Option<String>,
    #[serde(default)]
    pub arguments: Option<Arguments>,
    #[serde(default)]
    pub libraries: Vec<Library>,
    #[serde(default)]
    pub downloads: Option<VersionDownloads>,
    #[serde(default)]
    pub asset_index: Option<AssetIndexRef>,
    #[serde(default)]
    pub assets: Option<String>,
    #[serde(default, rename = "type")]
    pub release_type: Option<String>,
    #[serde(default)]
    pub jar: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Arguments {
    #[serde(default)]
    pub game: Vec<ArgEntry>,
    #[serde(default)]
    pub jvm: Vec<ArgEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ArgEntry {
    Plain(String),
    Ruled { rules: Vec<Rule>, value: ArgValue },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    One(String),
    Many(Vec<String>),
}

impl ArgEntry {
    /// Argument strings this entry contributes on the current platform.
    pub fn resolve(&self) -> Vec<String> {
        match self {
            ArgEntry::Plain(s) => vec![s.clone()],
            ArgEntry::Ruled { rules, value } if rules_allow(rules) => match value {
                ArgValue::One(s) => vec![s.clone()],
                ArgValue::Many(v) => v.clone(),
            },
            ArgEntry::Ruled { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    pub action: RuleAction,
    #[serde(default)]
    pub os: Option<OsRule>,
    /// Launcher features (demo mode, custom resolution, ...). None are enabled.
    #[serde(default)]
    pub features: Option<HashMap<String, bool>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsRule {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
}

impl Rule {
    fn applies(&self) -> bool {
        let os_ok = match &self.os {
            None => true,
            Some(os) => {
                os.name.as_deref().is_none_or(|n| n == current_os_name())
                    && os.arch.as_deref().is_none_or(|a| a == current_arch_name())
            }
        };
        let features_ok = self
            .features
            .as_ref()
            .is_none_or(|f| f.values().all(|enabled| !enabled));
        os_ok && features_ok
    }
}

/// Mojang rule semantics: no rules means allowed; otherwise start disallowed
/// and let the last applicable rule decide.
pub fn rules_allow(rules: &[Rule]) -> bool {
    if rules.is_empty() {
        return true;
    }
    let mut allowed = false;
    for rule in rules {
        if rule.applies() {
            allowed = rule.action == RuleAction::Allow;
        }
    }
    allowed
}

pub fn current_os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    }
}

fn current_arch_name() -> &'static str {
    if cfg!(target_pointer_width = "32") { "x86" } else { "x86_64" }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Library {
    pub name: String,
    #[serde(default)]
    pub downloads: Option<LibraryDownloads>,
    /// Maven repository base, used by loader profiles that omit `downloads`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub rules: Option<Vec<Rule>>,
    #[serde(default)]
    pub natives: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryDownloads {
    #[serde(default)]
    pub artifact: Option<Artifact>,
    #[serde(default)]
    pub classifiers: Option<HashMap<String, Artifact>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Artifact {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionDownloads {
    #[serde(default)]
    pub client: Option<Artifact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetIndexRef {
    pub id: String,
    #[serde(default)]
    pub sha1: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetIndex {
    pub objects: HashMap<String, AssetObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetObject {
    pub hash: String,
}

/// A file to fetch into the libraries tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryFile {
    pub rel_path: String,
    pub url: String,
    pub sha1: Option<String>,
}

impl Library {
    pub fn is_allowed(&self) -> bool {
        self.rules.as_deref().is_none_or(rules_allow)
    }

    /// The main jar of this library, if it has one.
    pub fn artifact(&self) -> Option<LibraryFile> {
        if let Some(a) = self.downloads.as_ref().and_then(|d| d.artifact.as_ref()) {
            let rel_path = a.path.clone().or_else(|| maven_path(&self.name))?;
            return Some(LibraryFile {
                rel_path,
                url: a.url.clone(),
                sha1: a.sha1.clone(),
            });
        }
        if self.natives.is_some() {
            return None;
        }
        let rel_path = maven_path(&self.name)?;
        let base = self.url.as_deref().unwrap_or(LIBRARIES_URL);
        Some(LibraryFile {
            url: format!("{}/{}", base.trim_end_matches('/'), rel_path),
            rel_path,
            sha1: None,
        })
    }

    /// Platform natives jar for legacy versions (`natives` + `classifiers`).
    pub fn native(&self) -> Option<LibraryFile> {
        let classifier = self.natives.as_ref()?.get(current_os_name())?;
        let arch = if cfg!(target_pointer_width = "32") { "32" } else { "64" };
        let classifier = classifier.replace("${arch}", arch);
        let a = self
            .downloads
            .as_ref()?
            .classifiers
            .as_ref()?
            .get(&classifier)?;
        let rel_path = a
            .path
            .clone()
            .or_else(|| maven_path(&format!("{}:{classifier}", self.name)))?;
        Some(LibraryFile {
            rel_path,
            url: a.url.clone(),
            sha1: a.sha1.clone(),
        })
    }
}

pub const LIBRARIES_URL: &str = "https://libraries.minecraft.net";

/// `group:artifact:version[:classifier][@ext]` to its repository path.
pub fn maven_path(coord: &str) -> Option<String> {
    let (coord, ext) = match coord.rsplit_once('@') {
        Some((c, e)) => (c, e),
        None => (coord, "jar"),
    };
    let parts: Vec<&str> = coord.split(':').collect();
    let (group, artifact, version, classifier) = match parts.as_slice() {
        [g, a, v] => (*g, *a, *v, None),
        [g, a, v, c] => (*g, *a, *v, Some(*c)),
        _ => return None,
    };
    if group.is_empty() || artifact.is_empty() || version.is_empty() {
        return None;
    }
    let file = match classifier {
        Some(c) => format!("{artifact}-{version}-{c}.{ext}"),
        None => format!("{artifact}-{version}.{ext}"),
    };
    Some(format!("{}/{artifact}/{version}/{file}", group.replace('.', "/")))
}

/// Folds a parent version into a child. Child values win; library and
/// argument lists are concatenated with the child's entries first for
/// libraries and last for arguments.
pub fn merge_parent(child: VersionJson, parent: VersionJson) -> VersionJson {
    let mut libraries = child.libraries;
    libraries.extend(parent.libraries);

    let arguments = match (parent.arguments, child.arguments) {
        (Some(mut p), Some(c)) => {
            p.game.extend(c.game);
            p.jvm.extend(c.jvm);
            Some(p)
        }
        (p, c) => c.or(p),
    };

    VersionJson {
        id: child.id,
        inherits_from: parent.inherits_from,
        main_class: child.main_class.or(parent.main_class),
        minecraft_arguments: child.minecraft_arguments.or(parent.minecraft_arguments),
        arguments,
        libraries,
        downloads: child.downloads.or(parent.downloads),
        asset_index: child.asset_index.or(parent.asset_index),
        assets: child.assets.or(parent.assets),
        release_type: child.release_type.or(parent.release_type),
        jar: child.jar.or(parent.jar),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maven_coordinates_map_to_paths() {
        assert_eq!(
            maven_path("net.fabricmc:fabric-loader:0.16.9").as_deref(),
            Some("net/fabricmc/fabric-loader/0.16.9/fabric-loader-0.16.9.jar")
        );
        assert_eq!(
            maven_path("org.lwjgl:lwjgl:3.3.3:natives-linux").as_deref(),
            Some("org/lwjgl/lwjgl/3.3.3/lwjgl-3.3.3-natives-linux.jar")
        );
        assert_eq!(
            maven_path("de.oceanlabs.mcp:mcp_config:1.20.1@zip").as_deref(),
            Some("de/oceanlabs/mcp/mcp_config/1.20.1/mcp_config-1.20.1.zip")
        );
        assert_eq!(maven_path("broken"), None);
    }

    fn rule(action: RuleAction, os: Option<&str>) -> Rule {
        Rule {
            action,
            os: os.map(|n| OsRule {
                name: Some(n.to_string()),
                arch: None,
            }),
            features: None,
        }
    }

    #[test]
    fn rules_follow_last_applicable() {
        assert!(rules_allow(&[]));
        assert!(rules_allow(&[rule(RuleAction::Allow, None)]));
        assert!(!rules_allow(&[
            rule(RuleAction::Allow, None),
            rule(RuleAction::Disallow, Some(current_os_name())),
        ]));
        assert!(!rules_allow(&[rule(RuleAction::Allow, Some("not-an-os"))]));
    }

    #[test]
    fn feature_gated_arguments_are_skipped() {
        let entry: ArgEntry = serde_json::from_value(serde_json::json!({
            "rules": [{"action": "allow", "features": {"is_demo_user": true}}],
            "value": "--demo"
        }))
        .unwrap();
        assert!(entry.resolve().is_empty());

        let plain: ArgEntry = serde_json::from_value(serde_json::json!("--username")).unwrap();
        assert_eq!(plain.resolve(), vec!["--username"]);
    }

    #[test]
    fn loader_libraries_resolve_through_maven_url() {
        let lib: Library = serde_json::from_value(serde_json::json!({
            "name": "net.fabricmc:intermediary:1.20.1",
            "url": "https://maven.fabricmc.net/"
        }))
        .unwrap();
        let f = lib.artifact().unwrap();
        assert_eq!(
            f.url,
            "https://maven.fabricmc.net/net/fabricmc/intermediary/1.20.1/intermediary-1.20.1.jar"
        );
        assert!(f.sha1.is_none());
    }

    #[test]
    fn merge_keeps_child_values_and_concatenates_lists() {
        let parent: VersionJson = serde_json::from_value(serde_json::json!({
            "id": "1.20.1",
            "mainClass": "net.minecraft.client.main.Main",
            "arguments": {"game": ["--username", "${auth_player_name}"], "jvm": ["-cp", "${classpath}"]},
            "libraries": [{"name": "a:b:1", "downloads": {"artifact": {"path": "a/b/1/b-1.jar", "url": "u"}}}],
            "assetIndex": {"id": "5", "url": "idx"},
            "type": "release"
        }))
        .unwrap();
        let child: VersionJson = serde_json::from_value(serde_json::json!({
            "id": "fabric-loader-0.16.9-1.20.1",
            "inheritsFrom": "1.20.1",
            "mainClass": "net.fabricmc.loader.impl.launch.knot.KnotClient",
            "arguments": {"game": [], "jvm": ["-DFabricMcEmu= net.minecraft.client.main.Main "]},
            "libraries": [{"name": "net.fabricmc:fabric-loader:0.16.9", "url": "https://maven.fabricmc.net/"}]
        }))
        .unwrap();

        let merged = merge_parent(child, parent);
        assert_eq!(merged.id, "fabric-loader-0.16.9-1.20.1");
        assert_eq!(
            merged.main_class.as_deref(),
            Some("net.fabricmc.loader.impl.launch.knot.KnotClient")
        );
        assert_eq!(merged.libraries.len(), 2);
        assert_eq!(merged.libraries[0].name, "net.fabricmc:fabric-loader:0.16.9");
        let args = merged.arguments.unwrap();
        assert_eq!(args.jvm.len(), 3);
        assert_eq!(merged.asset_index.unwrap().id, "5");
        assert!(merged.jar.is_none());
        assert!(merged.inherits_from.is_none());
    }
}
