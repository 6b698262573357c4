use std::{path::PathBuf, time::Duration};

use mclaunch_auth::{
    CallbackOptions, ProbeConfig,
    oauth::{DEFAULT_AUTH_BACKEND, DEFAULT_CLIENT_ID, DEFAULT_REDIRECT_URL},
};

pub const DEFAULT_MANIFEST_URL: &str = "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

const DEFAULT_PROBE_ATTEMPTS: u64 = 150;
const DEFAULT_PROBE_INTERVAL_MS: u64 = 100;
const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2000;

/// Launcher tunables. Every field has a default; the environment may
/// override them, and out-of-range numbers are clamped.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub probe: ProbeConfig,
    pub code_timeout: Option<Duration>,
    pub shutdown_grace: Duration,
    /// Early flush of a pending log record; `None` holds it until the next header.
    pub fold_idle: Option<Duration>,
    pub client_id: String,
    pub auth_backend: String,
    pub redirect_url: String,
    pub manifest_url: String,
    pub java: String,
    pub minecraft_dir: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let u64_var = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u64>().ok());
        let str_var = |name: &str, default: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let attempts = u64_var("MCLAUNCH_PROBE_ATTEMPTS")
            .map(|v| v.clamp(1, 1000))
            .unwrap_or(DEFAULT_PROBE_ATTEMPTS);
        let interval_ms = u64_var("MCLAUNCH_PROBE_INTERVAL_MS")
            .map(|v| v.clamp(10, 5000))
            .unwrap_or(DEFAULT_PROBE_INTERVAL_MS);
        let grace_ms = u64_var("MCLAUNCH_SHUTDOWN_GRACE_MS")
            .map(|v| v.clamp(100, 30_000))
            .unwrap_or(DEFAULT_SHUTDOWN_GRACE_MS);
        let fold_idle = u64_var("MCLAUNCH_FOLD_IDLE_MS")
            .filter(|v| *v > 0)
            .map(|v| Duration::from_millis(v.min(5000)));
        // Zero means "no timeout", same as unset.
        let code_timeout = u64_var("MCLAUNCH_CODE_TIMEOUT_SECS")
            .filter(|v| *v > 0)
            .map(Duration::from_secs);

        Self {
            probe: ProbeConfig {
                attempts: attempts as u32,
                interval: Duration::from_millis(interval_ms),
            },
            code_timeout,
            shutdown_grace: Duration::from_millis(grace_ms),
            fold_idle,
            client_id: str_var("MCLAUNCH_CLIENT_ID", DEFAULT_CLIENT_ID),
            auth_backend: str_var("MCLAUNCH_AUTH_BACKEND", DEFAULT_AUTH_BACKEND),
            redirect_url: str_var("MCLAUNCH_REDIRECT_URL", DEFAULT_REDIRECT_URL),
            manifest_url: str_var("MCLAUNCH_MANIFEST_URL", DEFAULT_MANIFEST_URL),
            java: str_var("MCLAUNCH_JAVA", "java"),
            minecraft_dir: lookup("MCLAUNCH_MINECRAFT_DIR")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn callback_options(&self) -> CallbackOptions {
        CallbackOptions {
            probe: self.probe,
            code_timeout: self.code_timeout,
            ready_timeout: self.code_timeout,
            shutdown_grace: self.shutdown_grace,
        }
    }
}

/// Platform default `.minecraft` location.
pub fn default_minecraft_dir() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        dirs::data_dir().map(|d| d.join(".minecraft"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir().map(|d| d.join("minecraft"))
    } else {
        dirs::home_dir().map(|d| d.join(".minecraft"))
    }
}

pub fn format_error_chain(err: &anyhow::Error) -> String {
    let mut parts = Vec::<String>::new();
    for cause in err.chain() {
        let s = cause.to_string();
        if s.is_empty() || parts.last() == Some(&s) {
            continue;
        }
        parts.push(s);
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(": ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn with(vars: &[(&str, &str)]) -> RuntimeConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RuntimeConfig::from_lookup(move |name| map.get(name).cloned())
    }

    #[test]
    fn defaults_match_reference_behavior() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.probe.attempts, 150);
        assert_eq!(cfg.probe.interval, Duration::from_millis(100));
        assert_eq!(cfg.code_timeout, None);
        assert_eq!(cfg.shutdown_grace, Duration::from_secs(2));
        assert_eq!(cfg.fold_idle, None);
        assert_eq!(cfg.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(cfg.java, "java");
        assert!(cfg.minecraft_dir.is_none());
    }

    #[test]
    fn numeric_overrides_are_clamped() {
        let cfg = with(&[
            ("MCLAUNCH_PROBE_ATTEMPTS", "0"),
            ("MCLAUNCH_PROBE_INTERVAL_MS", "999999"),
            ("MCLAUNCH_SHUTDOWN_GRACE_MS", "5"),
            ("MCLAUNCH_CODE_TIMEOUT_SECS", "30"),
            ("MCLAUNCH_FOLD_IDLE_MS", "60000"),
        ]);
        assert_eq!(cfg.fold_idle, Some(Duration::from_millis(5000)));
        assert_eq!(cfg.probe.attempts, 1);
        assert_eq!(cfg.probe.interval, Duration::from_millis(5000));
        assert_eq!(cfg.shutdown_grace, Duration::from_millis(100));
        assert_eq!(cfg.code_timeout, Some(Duration::from_secs(30)));
        assert_eq!(cfg.callback_options().code_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn garbage_and_blank_values_fall_back() {
        let cfg = with(&[
            ("MCLAUNCH_PROBE_ATTEMPTS", "many"),
            ("MCLAUNCH_JAVA", "  "),
            ("MCLAUNCH_CODE_TIMEOUT_SECS", "0"),
            ("MCLAUNCH_MINECRAFT_DIR", "/srv/mc"),
        ]);
        assert_eq!(cfg.probe.attempts, 150);
        assert_eq!(cfg.java, "java");
        assert_eq!(cfg.code_timeout, None);
        assert_eq!(cfg.minecraft_dir, Some(PathBuf::from("/srv/mc")));
    }

    #[test]
    fn error_chain_skips_repeats() {
        let err = anyhow::anyhow!("connection refused")
            .context("exchange code")
            .context("exchange code");
        assert_eq!(format_error_chain(&err), "exchange code: connection refused");
    }
}
