//! End-to-end launch: version selection, sign-in, game process.

use std::{process::ExitStatus, sync::Arc};

use anyhow::Context;
use mclaunch_auth::{
    AuthError, Cancel, allocate_local_port, authorization_url, code_from_redirect_url, exchange_code,
    receive_code,
};
use mclaunch_types::{AuthorizationCode, LaunchCommand, VersionId};

use crate::{
    config::RuntimeConfig,
    game::{
        ClientMatch, GameLibrary, fabric_version_id, find_client, find_installed_forge, forge_version_id,
        patch_java_path,
    },
    log_relay::{LogRelay, LogSink},
    profiles::game_dir_override,
    prompt::{BrowserOpener, Prompt, StdinPrompt},
};

/// Optional layer on top of the vanilla version.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Overlay {
    #[default]
    Vanilla,
    /// Fabric with an optional loader build.
    Fabric(Option<String>),
    /// Forge with an optional build; installed on request when missing.
    Forge(Option<String>),
    /// An installed custom client matched by name.
    Client(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// Local callback listener plus a browser window.
    #[default]
    Browser,
    /// Print the URL and read the redirect back from the prompt.
    Manual,
}

#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub version: Option<VersionId>,
    pub overlay: Overlay,
    pub install: bool,
    pub assume_yes: bool,
    pub auth: AuthMode,
}

impl Default for LaunchRequest {
    fn default() -> Self {
        Self {
            version: None,
            overlay: Overlay::Vanilla,
            install: true,
            assume_yes: false,
            auth: AuthMode::Browser,
        }
    }
}

#[derive(Debug)]
pub enum LaunchOutcome {
    Exited(ExitStatus),
    /// The user declined to continue at a prompt.
    Declined,
}

pub struct Launcher {
    library: Arc<dyn GameLibrary>,
    config: RuntimeConfig,
    browser: Arc<dyn BrowserOpener>,
    sink: Arc<dyn LogSink>,
    prompt: Arc<dyn Prompt>,
    http: reqwest::Client,
}

impl Launcher {
    pub fn new(
        library: Arc<dyn GameLibrary>,
        config: RuntimeConfig,
        browser: Arc<dyn BrowserOpener>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            library,
            config,
            browser,
            sink,
            prompt: Arc::new(StdinPrompt),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn Prompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    async fn confirm(&self, request: &LaunchRequest, question: String) -> anyhow::Result<bool> {
        if request.assume_yes {
            return Ok(true);
        }
        let prompt = self.prompt.clone();
        tokio::task::spawn_blocking(move || prompt.confirm(&question))
            .await
            .context("prompt task")
    }

    pub async fn run(&self, request: LaunchRequest, cancel: Cancel) -> anyhow::Result<LaunchOutcome> {
        let base = match request.version.clone() {
            Some(v) => {
                tracing::debug!(version = %v, "using requested version");
                v
            }
            None => {
                let v = self
                    .library
                    .resolve_latest_release()
                    .await
                    .context("resolve latest release")?;
                tracing::debug!(version = %v, "using latest release");
                v
            }
        };

        if !request.install {
            tracing::info!(version = %base, "skipping install");
        } else if self.library.is_version_installed(&base).await {
            tracing::info!(version = %base, "already installed");
        } else {
            tracing::info!(version = %base, "installing");
            self.library
                .install_version(&base)
                .await
                .with_context(|| format!("install {base}"))?;
        }

        let Some(version) = self.apply_overlay(&request, base).await? else {
            return Ok(LaunchOutcome::Declined);
        };

        let code = self.authorize(&request, &cancel).await?;
        let creds = exchange_code(&self.http, &self.config.auth_backend, &code)
            .await
            .context("exchange authorization code")?;
        tracing::info!(player = creds.name().unwrap_or("?"), "signed in");

        let mut cmd = self
            .library
            .build_launch_command(&version, &creds)
            .await
            .with_context(|| format!("build launch command for {version}"))?;
        if let Some(dir) = game_dir_override(self.library.root(), &version) {
            if !cmd.set_game_dir(&dir) {
                tracing::warn!(%dir, "launch command has no --gameDir to override");
            }
        }
        if cfg!(target_os = "macos") && patch_java_path(&mut cmd, self.library.root()) {
            tracing::debug!(java = %cmd.program, "using bundled legacy runtime");
        }

        let shown = match creds.access_token() {
            Some(token) => cmd.display().replace(token, "<redacted>"),
            None => cmd.display(),
        };
        tracing::debug!(command = %shown, "running command");

        let status = self.spawn_and_wait(&cmd, &cancel).await?;
        Ok(LaunchOutcome::Exited(status))
    }

    async fn apply_overlay(&self, request: &LaunchRequest, base: VersionId) -> anyhow::Result<Option<VersionId>> {
        match &request.overlay {
            Overlay::Vanilla => Ok(Some(base)),

            Overlay::Fabric(requested) => {
                tracing::info!("using fabric");
                let Some(loader) = self
                    .library
                    .fabric_loader_for(&base, requested.as_deref())
                    .await
                    .context("look up fabric loader")?
                else {
                    println!("This version is not supported by fabric");
                    return Ok(Some(base));
                };
                let fabric = fabric_version_id(&base, &loader);

                if self.library.is_version_installed(&fabric).await
                    && self
                        .confirm(request, format!("Fabric version {loader} is installed. Would you like to use it?"))
                        .await?
                {
                    return Ok(Some(fabric));
                }
                if self
                    .confirm(request, format!("Do you want to install fabric {loader}?"))
                    .await?
                {
                    let id = self
                        .library
                        .install_fabric(&base, Some(loader))
                        .await
                        .context("install fabric")?;
                    tracing::debug!(version = %id, "switched to fabric version");
                    return Ok(Some(id));
                }
                Ok(Some(base))
            }

            Overlay::Forge(requested) => {
                tracing::info!("using forge");
                let build = match self.library.forge_build_for(&base, requested.as_deref()).await {
                    Ok(Some(build)) => build,
                    Ok(None) => {
                        println!("This Minecraft version is not supported by forge");
                        return Ok(Some(base));
                    }
                    Err(e) => {
                        tracing::warn!(error = %format!("{e:#}"), "forge metadata unavailable; using installed builds");
                        let installed = self.library.installed_versions().await?;
                        let forge = find_installed_forge(&installed, &base, requested.as_deref())?;
                        let use_it = self
                            .confirm(request, format!("Forge version {forge} is installed. Would you like to use it?"))
                            .await?;
                        return Ok(Some(if use_it { forge } else { base }));
                    }
                };
                let forge = forge_version_id(&base, &build);

                if self.library.is_version_installed(&forge).await
                    && self
                        .confirm(request, format!("Forge version {forge} is installed. Would you like to use it?"))
                        .await?
                {
                    return Ok(Some(forge));
                }
                if self
                    .confirm(request, format!("Do you want to install forge {forge}?"))
                    .await?
                {
                    let id = self
                        .library
                        .install_forge(&base, &build)
                        .await
                        .context("install forge")?;
                    tracing::debug!(version = %id, "switched to forge version");
                    return Ok(Some(id));
                }
                Ok(Some(base))
            }

            Overlay::Client(name) => {
                let installed = self.library.installed_versions().await?;
                match find_client(&installed, &base, name) {
                    ClientMatch::One(id) => Ok(Some(id)),
                    ClientMatch::Many(ids) => {
                        let list = ids.iter().map(VersionId::as_str).collect::<Vec<_>>().join("\", \"");
                        anyhow::bail!(
                            "found multiple versions for \"{name}\" with MC \"{base}\". Versions found: \"{list}\""
                        )
                    }
                    ClientMatch::None => {
                        let question = format!(
                            "Couldn't find a suitable version for \"{name}\" with MC \"{base}\". \
                             Would you like to try to run vanilla minecraft for \"{base}\"?"
                        );
                        if self.confirm(request, question).await? {
                            Ok(Some(base))
                        } else {
                            Ok(None)
                        }
                    }
                }
            }
        }
    }

    async fn authorize(&self, request: &LaunchRequest, cancel: &Cancel) -> Result<AuthorizationCode, AuthError> {
        let port = allocate_local_port(0)?;
        let auth_url = authorization_url(&self.config.client_id, &self.config.redirect_url, port)?.to_string();

        match request.auth {
            AuthMode::Browser => {
                let browser = self.browser.clone();
                receive_code(port, self.config.callback_options(), cancel, move |_| {
                    if let Err(e) = browser.open(&auth_url) {
                        tracing::warn!(error = %e, "could not open a browser");
                        println!("Open this URL to sign in: {auth_url}");
                    }
                })
                .await
            }
            AuthMode::Manual => {
                let prompt = self.prompt.clone();
                let read = tokio::task::spawn_blocking(move || prompt.read_redirect_url(&auth_url));
                let raw = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AuthError::Cancelled),
                    res = read => res
                        .map_err(|e| AuthError::InvalidUrl(e.to_string()))?
                        .map_err(|e| AuthError::InvalidUrl(e.to_string()))?,
                };
                code_from_redirect_url(&raw)
            }
        }
    }

    async fn spawn_and_wait(&self, cmd: &LaunchCommand, cancel: &Cancel) -> anyhow::Result<ExitStatus> {
        let relay = LogRelay::with_fold_idle(self.sink.clone(), self.config.fold_idle)
            .context("create log relay")?;
        let stdio = relay.stdio().context("attach log relay");
        let (out, err) = match stdio {
            Ok(v) => v,
            Err(e) => {
                relay.close().finished().await;
                return Err(e);
            }
        };

        let message = "Starting minecraft";
        println!("{message}\n{}\n", "=".repeat(message.len()));

        // The command owns the parent's copies of the pipe; it must be gone
        // before the relay can see end-of-stream.
        let spawned = {
            let mut command = tokio::process::Command::new(&cmd.program);
            command
                .args(&cmd.args)
                .current_dir(&cmd.working_dir)
                .stdin(std::process::Stdio::null())
                .stdout(out)
                .stderr(err)
                .kill_on_drop(true);
            command.spawn()
        };
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                relay.close().finished().await;
                return Err(e).with_context(|| format!("failed to start {}", cmd.program));
            }
        };
        tracing::info!(pid = child.id(), "game started");

        let status = tokio::select! {
            res = child.wait() => res.context("wait for game process"),
            _ = cancel.cancelled() => {
                tracing::warn!("cancelled; stopping game");
                if let Err(e) = child.start_kill() {
                    tracing::warn!(error = %e, "failed to kill game process");
                }
                child.wait().await.context("wait for game process")
            }
        };

        relay.close().finished().await;
        let status = status?;
        tracing::info!(%status, "game exited");
        Ok(status)
    }
}
