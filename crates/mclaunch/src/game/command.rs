use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use mclaunch_types::{Credentials, LaunchCommand};

use super::version::VersionJson;

const CLASSPATH_SEPARATOR: &str = if cfg!(windows) { ";" } else { ":" };

/// Everything needed to turn a merged version into an argument vector.
pub(crate) struct CommandInputs<'a> {
    pub root: &'a Path,
    pub version: &'a VersionJson,
    /// Version ids from the launched one down to its base release.
    pub chain: &'a [String],
    pub creds: &'a Credentials,
    pub java: &'a str,
}

pub(crate) fn natives_dir(root: &Path, chain: &[String]) -> PathBuf {
    let base = chain.last().map(String::as_str).unwrap_or_default();
    root.join("versions").join(base).join("natives")
}

fn client_jar(root: &Path, version: &VersionJson, chain: &[String]) -> PathBuf {
    let jar_for = |id: &str| root.join("versions").join(id).join(format!("{id}.jar"));
    if let Some(id) = version.jar.as_deref() {
        return jar_for(id);
    }
    chain
        .iter()
        .map(|id| jar_for(id))
        .find(|p| p.is_file())
        .unwrap_or_else(|| jar_for(chain.last().map(String::as_str).unwrap_or(&version.id)))
}

fn classpath(root: &Path, version: &VersionJson, chain: &[String]) -> String {
    let libs = root.join("libraries");
    let mut seen = std::collections::HashSet::new();
    let mut entries = Vec::new();
    for lib in version.libraries.iter().filter(|l| l.is_allowed()) {
        let Some(file) = lib.artifact() else { continue };
        let path = libs.join(&file.rel_path).to_string_lossy().into_owned();
        if seen.insert(path.clone()) {
            entries.push(path);
        }
    }
    entries.push(client_jar(root, version, chain).to_string_lossy().into_owned());
    entries.join(CLASSPATH_SEPARATOR)
}

fn substitute(arg: &str, vars: &HashMap<&'static str, String>) -> String {
    if !arg.contains("${") {
        return arg.to_string();
    }
    let mut out = arg.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("${{{key}}}"), value);
    }
    out
}

pub(crate) fn build_command(inputs: CommandInputs<'_>) -> anyhow::Result<LaunchCommand> {
    let CommandInputs {
        root,
        version,
        chain,
        creds,
        java,
    } = inputs;

    let name = creds
        .name()
        .ok_or_else(|| anyhow::anyhow!("credentials are missing the player name"))?;
    let uuid = creds
        .id()
        .ok_or_else(|| anyhow::anyhow!("credentials are missing the player id"))?;
    let token = creds
        .access_token()
        .ok_or_else(|| anyhow::anyhow!("credentials are missing the access token"))?;
    let main_class = version
        .main_class
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("version {} has no main class", version.id))?;

    let root_str = root.to_string_lossy().into_owned();
    let assets = root.join("assets");
    let assets_index = version
        .asset_index
        .as_ref()
        .map(|a| a.id.clone())
        .or_else(|| version.assets.clone())
        .unwrap_or_default();
    let game_assets = if assets_index == "legacy" || assets_index == "pre-1.6" {
        assets.join("virtual").join("legacy")
    } else {
        assets.clone()
    };

    let vars: HashMap<&'static str, String> = HashMap::from([
        ("auth_player_name", name.to_string()),
        ("auth_uuid", uuid.to_string()),
        ("auth_access_token", token.to_string()),
        ("auth_session", format!("token:{token}:{uuid}")),
        ("auth_xuid", String::new()),
        ("clientid", String::new()),
        ("user_type", "msa".to_string()),
        ("user_properties", "{}".to_string()),
        ("version_name", version.id.clone()),
        (
            "version_type",
            version.release_type.clone().unwrap_or_else(|| "release".to_string()),
        ),
        ("game_directory", root_str.clone()),
        ("assets_root", assets.to_string_lossy().into_owned()),
        ("game_assets", game_assets.to_string_lossy().into_owned()),
        ("assets_index_name", assets_index),
        ("natives_directory", natives_dir(root, chain).to_string_lossy().into_owned()),
        ("library_directory", root.join("libraries").to_string_lossy().into_owned()),
        ("classpath_separator", CLASSPATH_SEPARATOR.to_string()),
        ("classpath", classpath(root, version, chain)),
        ("launcher_name", env!("CARGO_PKG_NAME").to_string()),
        ("launcher_version", env!("CARGO_PKG_VERSION").to_string()),
    ]);

    let mut jvm: Vec<String> = version
        .arguments
        .as_ref()
        .map(|a| a.jvm.iter().flat_map(|e| e.resolve()).collect())
        .unwrap_or_default();
    if !jvm.iter().any(|a| a.contains("${classpath}")) {
        let mut legacy = vec![
            "-Djava.library.path=${natives_directory}".to_string(),
            "-cp".to_string(),
            "${classpath}".to_string(),
        ];
        legacy.append(&mut jvm);
        jvm = legacy;
    }

    let mut game: Vec<String> = version
        .arguments
        .as_ref()
        .map(|a| a.game.iter().flat_map(|e| e.resolve()).collect())
        .unwrap_or_default();
    if game.is_empty() {
        if let Some(legacy) = version.minecraft_arguments.as_deref() {
            game = legacy.split_whitespace().map(str::to_string).collect();
        }
    }

    let args = jvm
        .iter()
        .map(|a| substitute(a, &vars))
        .chain(std::iter::once(main_class.to_string()))
        .chain(game.iter().map(|a| substitute(a, &vars)))
        .collect();

    Ok(LaunchCommand {
        program: java.to_string(),
        args,
        working_dir: root.to_path_buf(),
    })
}

/// Swaps a bare `java` for the legacy runtime the official launcher ships
/// on macOS, when that runtime is present. Returns whether it changed.
pub fn patch_java_path(cmd: &mut LaunchCommand, root: &Path) -> bool {
    if cmd.program != "java" {
        return false;
    }
    let bin = root
        .join("runtime")
        .join("jre-legacy")
        .join("mac-os")
        .join("jre-legacy")
        .join("jre.bundle")
        .join("Contents")
        .join("Home")
        .join("bin");
    for name in ["java", "java_path"] {
        let candidate = bin.join(name);
        if candidate.is_file() {
            cmd.program = candidate.to_string_lossy().into_owned();
            return true;
        }
    }
    false
}
