use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use anyhow::Context;
use clap::{ArgAction, Parser};
use mclaunch::{
    AuthMode, LaunchOutcome, LaunchRequest, Launcher, MinecraftDir, Overlay, RuntimeConfig, TracingSink,
    config::default_minecraft_dir, format_error_chain, prompt::SystemBrowser,
};
use mclaunch_auth::{AuthError, Cancel};
use mclaunch_types::VersionId;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_VERBOSITY: u8 = 3;
const MAX_VERBOSITY: u8 = 5;

#[derive(Debug, Parser)]
#[command(name = "mclaunch", version, about = "Launch Minecraft Java Edition from the command line")]
struct Args {
    /// Minecraft version. Release versions and snapshots all work. Defaults to newest release.
    #[arg(value_name = "VERSION")]
    game_version: Option<String>,

    /// Use a custom client, such as OptiFine. Not case sensitive. The client must already be installed.
    #[arg(long, short = 'c', value_name = "NAME")]
    client: Option<String>,

    /// Use the fabric mod loader. Loader version defaults to the newest stable release.
    #[arg(long, value_name = "VERSION", num_args = 0..=1, default_missing_value = "", conflicts_with_all = ["forge", "client"])]
    fabric: Option<String>,

    /// Use the forge mod loader. Build defaults to the newest published release.
    #[arg(long, value_name = "VERSION", num_args = 0..=1, default_missing_value = "", conflicts_with = "client")]
    forge: Option<String>,

    /// Answer yes to every prompt.
    #[arg(short = 'y')]
    yes: bool,

    /// Don't install anything; run the locally installed version.
    #[arg(long)]
    no_install: bool,

    /// Raise verbosity (default 3: warnings). Up to two times: 4 info, 5 debug.
    #[arg(short = 'v', action = ArgAction::Count)]
    verbose: u8,

    /// Paste the redirect URL by hand instead of using a local callback listener.
    #[arg(long, short = 'm')]
    manual_auth: bool,

    /// Minecraft directory. Defaults to the platform's .minecraft.
    #[arg(long, value_name = "DIR")]
    minecraft_dir: Option<PathBuf>,

    /// Also write logs to DIR/latest.log.
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Give up waiting for the browser sign-in after this many seconds.
    #[arg(long, value_name = "SECS")]
    code_timeout: Option<u64>,
}

fn optional(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl Args {
    fn overlay(&self) -> Overlay {
        if let Some(name) = &self.client {
            Overlay::Client(name.clone())
        } else if self.fabric.is_some() {
            Overlay::Fabric(optional(self.fabric.clone()))
        } else if self.forge.is_some() {
            Overlay::Forge(optional(self.forge.clone()))
        } else {
            Overlay::Vanilla
        }
    }
}

fn level_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0..=2 => "error",
        3 => "warn",
        4 => "info",
        _ => "debug",
    }
}

fn init_tracing(verbosity: u8, log_dir: Option<&PathBuf>) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_filter(verbosity)));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let Some(dir) = log_dir else {
        tracing_subscriber::registry().with(filter).with(stderr_layer).init();
        return Ok(None);
    };

    std::fs::create_dir_all(dir).with_context(|| format!("create log dir {}", dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, "latest.log"));
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
        .init();
    Ok(Some(guard))
}

async fn run(args: Args, cancel: Cancel) -> anyhow::Result<LaunchOutcome> {
    let mut config = RuntimeConfig::from_env();
    if let Some(secs) = args.code_timeout.filter(|s| *s > 0) {
        config.code_timeout = Some(Duration::from_secs(secs));
    }

    let root = args
        .minecraft_dir
        .clone()
        .or_else(|| config.minecraft_dir.clone())
        .or_else(default_minecraft_dir)
        .context("could not determine the minecraft directory; pass --minecraft-dir")?;
    tracing::debug!(dir = %root.display(), "using minecraft directory");

    let library = Arc::new(MinecraftDir::new(root, &config)?);
    let launcher = Launcher::new(library, config, Arc::new(SystemBrowser), Arc::new(TracingSink));

    let request = LaunchRequest {
        version: optional(args.game_version.clone()).map(VersionId::new),
        overlay: args.overlay(),
        install: !args.no_install,
        assume_yes: args.yes,
        auth: if args.manual_auth {
            AuthMode::Manual
        } else {
            AuthMode::Browser
        },
    };

    println!("If no further input is required, you will be prompted to login momentarily.");
    launcher.run(request, cancel).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let verbosity = DEFAULT_VERBOSITY.saturating_add(args.verbose);
    if verbosity > MAX_VERBOSITY {
        eprintln!("Verbosity level ({verbosity}) exceeded max verbosity ({MAX_VERBOSITY})");
        return ExitCode::from(2);
    }

    let _guard = match init_tracing(verbosity, args.log_dir.as_ref()) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("{}", format_error_chain(&e));
            return ExitCode::FAILURE;
        }
    };

    let cancel = Cancel::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted");
                cancel.cancel();
            }
        });
    }

    match run(args, cancel).await {
        Ok(LaunchOutcome::Exited(status)) if status.success() => ExitCode::SUCCESS,
        Ok(LaunchOutcome::Exited(status)) => {
            tracing::warn!(%status, "game exited with failure");
            ExitCode::from(status.code().and_then(|c| u8::try_from(c).ok()).unwrap_or(1))
        }
        Ok(LaunchOutcome::Declined) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<AuthError>() {
                Some(AuthError::NoCodeInUrl) => println!("That url is not valid"),
                _ => eprintln!("error: {}", format_error_chain(&e)),
            }
            ExitCode::FAILURE
        }
    }
}
