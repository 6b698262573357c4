//! Game installation and launch-command construction.
//!
//! [`GameLibrary`] is the seam the launcher talks to; [`MinecraftDir`]
//! implements it over a standard `.minecraft` directory.

mod command;
mod download;
mod loaders;
mod version;

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use anyhow::Context;
use async_trait::async_trait;
use mclaunch_types::{Credentials, LaunchCommand, VersionId};

pub use command::patch_java_path;
pub use loaders::{
    ClientMatch, FABRIC_META_URL, FORGE_MAVEN_URL, fabric_version_id, find_client, find_installed_forge,
    forge_version_id,
};

use command::{CommandInputs, build_command, natives_dir};
use download::{DownloadEntry, Downloader, extract_natives, write_atomic};
use loaders::{
    FabricGameVersion, FabricLoaderVersion, forge_builds_for, forge_installer_url, latest_stable_loader,
};
use version::{AssetIndex, AssetIndexRef, VersionJson, VersionManifest, merge_parent};

use crate::config::RuntimeConfig;

pub const RESOURCES_URL: &str = "https://resources.download.minecraft.net";

const MAX_INHERITANCE_DEPTH: usize = 8;

#[async_trait]
pub trait GameLibrary: Send + Sync {
    /// Directory holding `versions/`, `libraries/` and `launcher_profiles.json`.
    fn root(&self) -> &Path;

    async fn resolve_latest_release(&self) -> anyhow::Result<VersionId>;

    async fn is_version_installed(&self, version: &VersionId) -> bool;

    async fn install_version(&self, version: &VersionId) -> anyhow::Result<()>;

    async fn build_launch_command(
        &self,
        version: &VersionId,
        creds: &Credentials,
    ) -> anyhow::Result<LaunchCommand>;

    /// Loader build to use for `game`: `requested` or the latest stable one.
    /// `None` when fabric does not support that game version.
    async fn fabric_loader_for(&self, game: &VersionId, requested: Option<&str>) -> anyhow::Result<Option<String>>;

    /// Installs the fabric profile on top of `base` and returns its version id.
    async fn install_fabric(&self, base: &VersionId, loader: Option<String>) -> anyhow::Result<VersionId>;

    /// Forge build to use for `game`: `requested` or the newest published
    /// one. `None` when forge publishes nothing for that game version.
    async fn forge_build_for(&self, game: &VersionId, requested: Option<&str>) -> anyhow::Result<Option<String>>;

    /// Runs the forge installer for `game`/`build` and returns the installed id.
    async fn install_forge(&self, game: &VersionId, build: &str) -> anyhow::Result<VersionId>;

    async fn installed_versions(&self) -> anyhow::Result<Vec<VersionId>>;
}

pub struct MinecraftDir {
    root: PathBuf,
    downloader: Downloader,
    manifest_url: String,
    fabric_meta_url: String,
    forge_maven_url: String,
    resources_url: String,
    java: String,
}

impl MinecraftDir {
    pub fn new(root: impl Into<PathBuf>, cfg: &RuntimeConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(15 * 60))
            .build()
            .context("build http client")?;
        Ok(Self {
            root: root.into(),
            downloader: Downloader::new(client),
            manifest_url: cfg.manifest_url.clone(),
            fabric_meta_url: FABRIC_META_URL.to_string(),
            forge_maven_url: FORGE_MAVEN_URL.to_string(),
            resources_url: RESOURCES_URL.to_string(),
            java: cfg.java.clone(),
        })
    }

    pub fn with_fabric_meta_url(mut self, url: impl Into<String>) -> Self {
        self.fabric_meta_url = url.into();
        self
    }

    pub fn with_forge_maven_url(mut self, url: impl Into<String>) -> Self {
        self.forge_maven_url = url.into();
        self
    }

    pub fn with_resources_url(mut self, url: impl Into<String>) -> Self {
        self.resources_url = url.into();
        self
    }

    fn version_json_path(&self, id: &str) -> PathBuf {
        self.root.join("versions").join(id).join(format!("{id}.json"))
    }

    async fn manifest(&self) -> anyhow::Result<VersionManifest> {
        let (manifest, _) = self
            .downloader
            .fetch_json::<VersionManifest>(&self.manifest_url)
            .await
            .context("fetch version manifest")?;
        Ok(manifest)
    }

    async fn read_local(&self, id: &str) -> anyhow::Result<VersionJson> {
        let path = self.version_json_path(id);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
    }

    /// Local version JSON, or the manifest's copy written into `versions/`.
    async fn ensure_version_json(&self, id: &str) -> anyhow::Result<VersionJson> {
        if self.version_json_path(id).is_file() {
            return self.read_local(id).await;
        }
        let manifest = self.manifest().await?;
        let entry = manifest
            .versions
            .into_iter()
            .find(|v| v.id == id)
            .ok_or_else(|| anyhow::anyhow!("invalid version: {id}"))?;
        let (json, raw) = self
            .downloader
            .fetch_json::<VersionJson>(&entry.url)
            .await
            .with_context(|| format!("fetch version json for {id}"))?;
        write_atomic(&self.version_json_path(id), raw.as_bytes()).await?;
        Ok(json)
    }

    /// Walks `inheritsFrom` from `id` down to the base release.
    async fn resolve_chain(&self, id: &str, fetch: bool) -> anyhow::Result<Vec<(String, VersionJson)>> {
        let mut chain: Vec<(String, VersionJson)> = Vec::new();
        let mut next = Some(id.to_string());
        while let Some(cur) = next {
            if chain.iter().any(|(seen, _)| *seen == cur) || chain.len() >= MAX_INHERITANCE_DEPTH {
                anyhow::bail!("version {id} has a broken inheritsFrom chain at {cur}");
            }
            let json = if fetch {
                self.ensure_version_json(&cur).await?
            } else {
                self.read_local(&cur).await?
            };
            next = json.inherits_from.clone();
            chain.push((cur, json));
        }
        Ok(chain)
    }

    fn merge_chain(chain: Vec<(String, VersionJson)>) -> anyhow::Result<(VersionJson, Vec<String>)> {
        let ids: Vec<String> = chain.iter().map(|(id, _)| id.clone()).collect();
        let mut jsons = chain.into_iter().map(|(_, json)| json);
        let leaf = jsons.next().ok_or_else(|| anyhow::anyhow!("empty version chain"))?;
        Ok((jsons.fold(leaf, merge_parent), ids))
    }

    async fn install_assets(&self, index: &AssetIndexRef) -> anyhow::Result<()> {
        let assets = self.root.join("assets");
        let index_path = assets.join("indexes").join(format!("{}.json", index.id));
        self.downloader
            .download(&DownloadEntry {
                url: index.url.clone(),
                dest: index_path.clone(),
                sha1: index.sha1.clone(),
            })
            .await
            .context("download asset index")?;

        let raw = tokio::fs::read_to_string(&index_path).await?;
        let parsed: AssetIndex = serde_json::from_str(&raw).context("parse asset index")?;
        let objects = assets.join("objects");
        let total = parsed.objects.len();

        let mut entries = Vec::new();
        for obj in parsed.objects.values() {
            let Some(prefix) = obj.hash.get(..2) else { continue };
            let dest = objects.join(prefix).join(&obj.hash);
            // Content-addressed: presence is enough.
            if dest.is_file() {
                continue;
            }
            entries.push(DownloadEntry {
                url: format!("{}/{prefix}/{}", self.resources_url.trim_end_matches('/'), obj.hash),
                dest,
                sha1: Some(obj.hash.clone()),
            });
        }
        entries.sort_by(|a, b| a.dest.cmp(&b.dest));
        entries.dedup();

        tracing::info!(missing = entries.len(), total, "downloading assets");
        self.downloader.download_all(entries).await
    }
}

#[async_trait]
impl GameLibrary for MinecraftDir {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn resolve_latest_release(&self) -> anyhow::Result<VersionId> {
        Ok(VersionId::new(self.manifest().await?.latest.release))
    }

    async fn is_version_installed(&self, version: &VersionId) -> bool {
        self.version_json_path(version.as_str()).is_file()
    }

    async fn install_version(&self, version: &VersionId) -> anyhow::Result<()> {
        let chain = self.resolve_chain(version.as_str(), true).await?;
        let libraries_dir = self.root.join("libraries");

        let mut entries = Vec::new();
        let mut natives = Vec::new();
        for (id, json) in &chain {
            if let Some(client) = json.downloads.as_ref().and_then(|d| d.client.as_ref()) {
                entries.push(DownloadEntry {
                    url: client.url.clone(),
                    dest: self.root.join("versions").join(id).join(format!("{id}.jar")),
                    sha1: client.sha1.clone(),
                });
            }
            for lib in json.libraries.iter().filter(|l| l.is_allowed()) {
                for (file, is_native) in [(lib.artifact(), false), (lib.native(), true)] {
                    // Empty URLs mark files produced locally by an installer.
                    let Some(file) = file.filter(|f| !f.url.is_empty()) else { continue };
                    let dest = libraries_dir.join(&file.rel_path);
                    if is_native {
                        natives.push(dest.clone());
                    }
                    entries.push(DownloadEntry {
                        url: file.url,
                        dest,
                        sha1: file.sha1,
                    });
                }
            }
        }
        entries.sort_by(|a, b| a.dest.cmp(&b.dest));
        entries.dedup_by(|a, b| a.dest == b.dest);

        tracing::info!(version = %version, files = entries.len(), "installing version files");
        self.downloader.download_all(entries).await?;

        let (merged, ids) = Self::merge_chain(chain)?;

        if !natives.is_empty() {
            let out = natives_dir(&self.root, &ids);
            tokio::task::spawn_blocking(move || {
                natives.iter().try_for_each(|jar| extract_natives(jar, &out))
            })
            .await
            .context("natives extraction task")??;
        }

        if let Some(index) = merged.asset_index.as_ref() {
            self.install_assets(index).await?;
        }
        Ok(())
    }

    async fn build_launch_command(
        &self,
        version: &VersionId,
        creds: &Credentials,
    ) -> anyhow::Result<LaunchCommand> {
        let chain = self.resolve_chain(version.as_str(), false).await?;
        let (merged, ids) = Self::merge_chain(chain)?;
        build_command(CommandInputs {
            root: &self.root,
            version: &merged,
            chain: &ids,
            creds,
            java: &self.java,
        })
    }

    async fn fabric_loader_for(&self, game: &VersionId, requested: Option<&str>) -> anyhow::Result<Option<String>> {
        let base = self.fabric_meta_url.trim_end_matches('/');
        let (games, _) = self
            .downloader
            .fetch_json::<Vec<FabricGameVersion>>(&format!("{base}/versions/game"))
            .await
            .context("fetch fabric game versions")?;
        if !games.iter().any(|g| g.version == game.as_str()) {
            return Ok(None);
        }
        if let Some(loader) = requested {
            return Ok(Some(loader.to_string()));
        }
        let (loaders, _) = self
            .downloader
            .fetch_json::<Vec<FabricLoaderVersion>>(&format!("{base}/versions/loader"))
            .await
            .context("fetch fabric loader versions")?;
        latest_stable_loader(&loaders)
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("fabric meta lists no loader versions"))
    }

    async fn install_fabric(&self, base: &VersionId, loader: Option<String>) -> anyhow::Result<VersionId> {
        let loader = match loader {
            Some(l) => l,
            None => self
                .fabric_loader_for(base, None)
                .await?
                .ok_or_else(|| anyhow::anyhow!("fabric does not support minecraft {base}"))?,
        };

        let meta = self.fabric_meta_url.trim_end_matches('/');
        let url = format!("{meta}/versions/loader/{base}/{loader}/profile/json");
        let (profile, raw) = self
            .downloader
            .fetch_json::<VersionJson>(&url)
            .await
            .context("fetch fabric profile")?;
        let id = if profile.id.is_empty() {
            fabric_version_id(base, &loader)
        } else {
            VersionId::new(profile.id)
        };

        write_atomic(&self.version_json_path(id.as_str()), raw.as_bytes()).await?;
        tracing::info!(version = %id, "fabric profile written");
        self.install_version(&id).await?;
        Ok(id)
    }

    async fn forge_build_for(&self, game: &VersionId, requested: Option<&str>) -> anyhow::Result<Option<String>> {
        let url = format!("{}/maven-metadata.xml", self.forge_maven_url.trim_end_matches('/'));
        let raw = self
            .downloader
            .fetch_bytes(&url)
            .await
            .context("fetch forge metadata")?;
        let mut builds = forge_builds_for(&String::from_utf8_lossy(&raw), game);
        if let Some(build) = requested {
            return Ok((!builds.is_empty()).then(|| build.to_string()));
        }
        Ok(builds.pop())
    }

    async fn install_forge(&self, game: &VersionId, build: &str) -> anyhow::Result<VersionId> {
        let id = forge_version_id(game, build);
        let url = forge_installer_url(&self.forge_maven_url, game, build);
        let bytes = self
            .downloader
            .fetch_bytes(&url)
            .await
            .with_context(|| format!("download forge installer for {id}"))?;
        let installer = std::env::temp_dir().join(format!("mclaunch-{}-{id}-installer.jar", std::process::id()));
        write_atomic(&installer, &bytes).await?;

        // The installer refuses to run without a launcher profile file.
        let profiles = self.root.join("launcher_profiles.json");
        if !profiles.is_file() {
            write_atomic(&profiles, br#"{"profiles":{}}"#).await?;
        }

        tracing::info!(version = %id, java = %self.java, "running forge installer");
        let result = tokio::process::Command::new(&self.java)
            .arg("-jar")
            .arg(&installer)
            .arg("--installClient")
            .arg(&self.root)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .output()
            .await;
        if let Err(e) = tokio::fs::remove_file(&installer).await {
            tracing::debug!(error = %e, path = %installer.display(), "could not remove forge installer");
        }
        let output = result.with_context(|| format!("failed to start forge installer with {}", self.java))?;
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            tracing::debug!(target: "forge_installer", "{line}");
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("forge installer exited with {}: {}", output.status, stderr.trim());
        }
        if !self.is_version_installed(&id).await {
            anyhow::bail!("forge installer finished but {id} is not installed");
        }

        // Anything the installer left for the launcher to fetch.
        self.install_version(&id).await?;
        Ok(id)
    }

    async fn installed_versions(&self) -> anyhow::Result<Vec<VersionId>> {
        let dir = self.root.join("versions");
        let mut rd = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("read {}", dir.display())),
        };
        let mut out = Vec::new();
        while let Some(entry) = rd.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else { continue };
            if self.version_json_path(&name).is_file() {
                out.push(VersionId::new(name));
            }
        }
        out.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::temp_dir;
    use super::download::sha1_hex;

    /// A tiny stand-in for the version manifest, library repo, asset CDN,
    /// fabric meta and forge maven, all on one loopback server.
    async fn fake_upstream() -> (String, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let base = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());

        let client_jar = b"client-jar".to_vec();
        let lib_jar = b"lib-jar".to_vec();
        let loader_jar = b"loader-jar".to_vec();
        let sound = b"sound".to_vec();
        let sound_hash = sha1_hex(&sound);

        let asset_index = serde_json::json!({
            "objects": {"minecraft/sounds/a.ogg": {"hash": sound_hash, "size": sound.len()}}
        })
        .to_string();
        let version = serde_json::json!({
            "id": "1.20.1",
            "type": "release",
            "mainClass": "net.minecraft.client.main.Main",
            "assetIndex": {"id": "5", "url": format!("{base}/indexes/5.json"), "sha1": sha1_hex(asset_index.as_bytes())},
            "downloads": {"client": {"url": format!("{base}/client.jar"), "sha1": sha1_hex(&client_jar), "size": client_jar.len()}},
            "arguments": {
                "game": ["--username", "${auth_player_name}", "--gameDir", "${game_directory}"],
                "jvm": ["-cp", "${classpath}"]
            },
            "libraries": [{
                "name": "com.mojang:brigadier:1.1.8",
                "downloads": {"artifact": {
                    "path": "com/mojang/brigadier/1.1.8/brigadier-1.1.8.jar",
                    "url": format!("{base}/lib.jar"),
                    "sha1": sha1_hex(&lib_jar)
                }}
            }]
        })
        .to_string();
        let manifest = serde_json::json!({
            "latest": {"release": "1.20.1", "snapshot": "23w31a"},
            "versions": [{"id": "1.20.1", "url": format!("{base}/1.20.1.json")}]
        })
        .to_string();
        let fabric_profile = serde_json::json!({
            "id": "fabric-loader-0.16.9-1.20.1",
            "inheritsFrom": "1.20.1",
            "mainClass": "net.fabricmc.loader.impl.launch.knot.KnotClient",
            "arguments": {"game": [], "jvm": []},
            "libraries": [{"name": "net.fabricmc:fabric-loader:0.16.9", "url": format!("{base}/maven/")}]
        })
        .to_string();

        let forge_metadata = r#"<metadata><versioning><versions>
            <version>1.20.1-47.1.0</version>
            <version>1.20.1-47.2.0</version>
            <version>1.19.2-43.2.0</version>
        </versions></versioning></metadata>"#;

        let files = vec![
            ("/manifest.json".to_string(), manifest.into_bytes()),
            ("/forge/maven-metadata.xml".to_string(), forge_metadata.as_bytes().to_vec()),
            (
                "/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-installer.jar".to_string(),
                b"forge-installer".to_vec(),
            ),
            ("/1.20.1.json".to_string(), version.into_bytes()),
            ("/client.jar".to_string(), client_jar),
            ("/lib.jar".to_string(), lib_jar),
            ("/indexes/5.json".to_string(), asset_index.into_bytes()),
            (format!("/res/{}/{}", &sound_hash[..2], sound_hash), sound),
            (
                "/fabric/versions/game".to_string(),
                br#"[{"version":"1.20.1","stable":true}]"#.to_vec(),
            ),
            (
                "/fabric/versions/loader".to_string(),
                br#"[{"version":"0.17.0-beta.1","stable":false},{"version":"0.16.9","stable":true}]"#.to_vec(),
            ),
            (
                "/fabric/versions/loader/1.20.1/0.16.9/profile/json".to_string(),
                fabric_profile.into_bytes(),
            ),
            (
                "/maven/net/fabricmc/fabric-loader/0.16.9/fabric-loader-0.16.9.jar".to_string(),
                loader_jar,
            ),
        ];

        let mut app = axum::Router::new();
        for (path, body) in files {
            app = app.route(
                &path,
                axum::routing::get(move || {
                    let body = body.clone();
                    async move { body }
                }),
            );
        }
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (base, task)
    }

    fn library(root: &Path, base: &str) -> MinecraftDir {
        let cfg = RuntimeConfig {
            manifest_url: format!("{base}/manifest.json"),
            ..RuntimeConfig::default()
        };
        MinecraftDir::new(root, &cfg)
            .unwrap()
            .with_fabric_meta_url(format!("{base}/fabric"))
            .with_forge_maven_url(format!("{base}/forge"))
            .with_resources_url(format!("{base}/res"))
    }

    fn creds() -> Credentials {
        Credentials::from_value(serde_json::json!({
            "name": "Steve",
            "id": "069a79f444e94726a5befca90e38aaf5",
            "access_token": "tok",
        }))
    }

    #[tokio::test]
    async fn install_then_build_vanilla() {
        let (base, task) = fake_upstream().await;
        let root = temp_dir("vanilla");
        let lib = library(&root, &base);

        let latest = lib.resolve_latest_release().await.unwrap();
        assert_eq!(latest.as_str(), "1.20.1");
        assert!(!lib.is_version_installed(&latest).await);

        lib.install_version(&latest).await.unwrap();
        assert!(lib.is_version_installed(&latest).await);
        assert!(root.join("versions/1.20.1/1.20.1.jar").is_file());
        assert!(root.join("libraries/com/mojang/brigadier/1.1.8/brigadier-1.1.8.jar").is_file());
        assert!(root.join("assets/indexes/5.json").is_file());
        assert_eq!(lib.installed_versions().await.unwrap(), vec![latest.clone()]);

        let cmd = lib.build_launch_command(&latest, &creds()).await.unwrap();
        assert_eq!(cmd.arg_value("--username"), Some("Steve"));
        let game_dir = root.to_string_lossy().into_owned();
        assert_eq!(cmd.arg_value("--gameDir"), Some(game_dir.as_str()));
        assert_eq!(cmd.working_dir, root);

        task.abort();
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn fabric_installs_on_top_of_vanilla() {
        let (base, task) = fake_upstream().await;
        let root = temp_dir("fabric");
        let lib = library(&root, &base);
        let game = VersionId::new("1.20.1");

        assert_eq!(
            lib.fabric_loader_for(&game, None).await.unwrap().as_deref(),
            Some("0.16.9")
        );
        assert_eq!(lib.fabric_loader_for(&VersionId::new("0.1"), None).await.unwrap(), None);

        let id = lib.install_fabric(&game, None).await.unwrap();
        assert_eq!(id.as_str(), "fabric-loader-0.16.9-1.20.1");
        assert!(lib.is_version_installed(&game).await);
        assert!(
            root.join("libraries/net/fabricmc/fabric-loader/0.16.9/fabric-loader-0.16.9.jar")
                .is_file()
        );

        let cmd = lib.build_launch_command(&id, &creds()).await.unwrap();
        assert!(cmd.args.contains(&"net.fabricmc.loader.impl.launch.knot.KnotClient".to_string()));
        let cp = cmd.arg_value("-cp").unwrap();
        assert!(cp.contains("fabric-loader-0.16.9.jar"));
        assert!(cp.contains("brigadier-1.1.8.jar"));
        assert!(cp.ends_with("1.20.1.jar"));

        task.abort();
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn forge_builds_resolve_from_maven() {
        let (base, task) = fake_upstream().await;
        let root = temp_dir("forge-meta");
        let lib = library(&root, &base);
        let game = VersionId::new("1.20.1");

        assert_eq!(lib.forge_build_for(&game, None).await.unwrap().as_deref(), Some("47.2.0"));
        assert_eq!(
            lib.forge_build_for(&game, Some("47.1.0")).await.unwrap().as_deref(),
            Some("47.1.0")
        );
        assert_eq!(lib.forge_build_for(&VersionId::new("1.12.2"), None).await.unwrap(), None);

        task.abort();
        let _ = std::fs::remove_dir_all(&root);
    }

    /// Writes a stand-in `java` that plays the forge installer: checks it was
    /// handed the downloaded jar, then writes the forge version JSON.
    #[cfg(unix)]
    fn fake_java(dir: &Path, exit_code: i32) -> String {
        use std::os::unix::fs::PermissionsExt;

        let script = format!(
            r#"#!/bin/sh
[ "$1" = "-jar" ] || exit 9
[ "$(cat "$2")" = "forge-installer" ] || exit 8
[ "$3" = "--installClient" ] || exit 7
[ -f "$4/launcher_profiles.json" ] || exit 6
[ {exit_code} -eq 0 ] || {{ echo "installer blew up" >&2; exit {exit_code}; }}
mkdir -p "$4/versions/1.20.1-forge-47.2.0"
cat > "$4/versions/1.20.1-forge-47.2.0/1.20.1-forge-47.2.0.json" <<'JSON'
{{"id":"1.20.1-forge-47.2.0","inheritsFrom":"1.20.1","mainClass":"cpw.mods.bootstraplauncher.BootstrapLauncher","libraries":[]}}
JSON
"#
        );
        let path = dir.join("fake-java");
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn forge_installer_runs_with_configured_java() {
        let (base, task) = fake_upstream().await;
        let root = temp_dir("forge-install");
        let tools = temp_dir("forge-tools");
        let cfg = RuntimeConfig {
            manifest_url: format!("{base}/manifest.json"),
            java: fake_java(&tools, 0),
            ..RuntimeConfig::default()
        };
        let lib = MinecraftDir::new(&root, &cfg)
            .unwrap()
            .with_forge_maven_url(format!("{base}/forge"))
            .with_resources_url(format!("{base}/res"));
        let game = VersionId::new("1.20.1");
        lib.install_version(&game).await.unwrap();

        let id = lib.install_forge(&game, "47.2.0").await.unwrap();
        assert_eq!(id.as_str(), "1.20.1-forge-47.2.0");
        assert!(lib.is_version_installed(&id).await);

        let cmd = lib.build_launch_command(&id, &creds()).await.unwrap();
        assert!(cmd.args.contains(&"cpw.mods.bootstraplauncher.BootstrapLauncher".to_string()));
        assert!(cmd.arg_value("-cp").unwrap().ends_with("1.20.1.jar"));

        task.abort();
        let _ = std::fs::remove_dir_all(&root);
        let _ = std::fs::remove_dir_all(&tools);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_forge_installer_reports_its_stderr() {
        let (base, task) = fake_upstream().await;
        let root = temp_dir("forge-fail");
        let tools = temp_dir("forge-fail-tools");
        let cfg = RuntimeConfig {
            manifest_url: format!("{base}/manifest.json"),
            java: fake_java(&tools, 3),
            ..RuntimeConfig::default()
        };
        let lib = MinecraftDir::new(&root, &cfg)
            .unwrap()
            .with_forge_maven_url(format!("{base}/forge"));

        let err = lib.install_forge(&VersionId::new("1.20.1"), "47.2.0").await.unwrap_err();
        assert!(format!("{err:#}").contains("installer blew up"));
        assert!(!lib.is_version_installed(&VersionId::new("1.20.1-forge-47.2.0")).await);

        task.abort();
        let _ = std::fs::remove_dir_all(&root);
        let _ = std::fs::remove_dir_all(&tools);
    }

    #[tokio::test]
    async fn unknown_version_is_rejected() {
        let (base, task) = fake_upstream().await;
        let root = temp_dir("unknown");
        let lib = library(&root, &base);
        let err = lib.install_version(&VersionId::new("9.9.9")).await.unwrap_err();
        assert!(format!("{err:#}").contains("invalid version"));
        task.abort();
        let _ = std::fs::remove_dir_all(&root);
    }
}
