use std::fmt;
use std::path::PathBuf;

use chrono::NaiveTime;

/// Thread label used for output that does not follow the game's log layout.
pub const NATIVE_THREAD_NAME: &str = "Java";

/// A game version identifier as it appears under `versions/<id>/`.
///
/// NOTE: Overlay versions (fabric, forge, custom clients) are plain ids too;
/// nothing in this type distinguishes them from vanilla releases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct VersionId(pub String);

impl VersionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque, single-use OAuth authorization code.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationCode(String);

impl AuthorizationCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for AuthorizationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthorizationCode(<{} bytes>)", self.0.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum LogLevel {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    /// Maps a level label written by the game (log4j names) onto the severity enum.
    /// Unknown labels degrade to `Info`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "FATAL" | "CRITICAL" => LogLevel::Critical,
            "ERROR" => LogLevel::Error,
            "WARN" | "WARNING" => LogLevel::Warning,
            "INFO" => LogLevel::Info,
            "DEBUG" | "TRACE" => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Critical => "CRITICAL",
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARNING",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum LogSource {
    Game,
    Native,
}

impl LogSource {
    pub fn as_str(self) -> &'static str {
        match self {
            LogSource::Game => "game",
            LogSource::Native => "native",
        }
    }
}

/// One relayed chunk of subprocess output.
///
/// `message` always carries the `"<thread_name> - "` prefix.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LogRecord {
    pub source: LogSource,
    pub level: LogLevel,
    pub thread_name: String,
    pub time: Option<NaiveTime>,
    pub message: String,
}

impl LogRecord {
    pub fn game(thread_name: &str, level: LogLevel, time: Option<NaiveTime>, text: &str) -> Self {
        Self {
            source: LogSource::Game,
            level,
            thread_name: thread_name.to_string(),
            time,
            message: format!("{thread_name} - {text}"),
        }
    }

    pub fn native(line: &str) -> Self {
        Self {
            source: LogSource::Native,
            level: LogLevel::Info,
            thread_name: NATIVE_THREAD_NAME.to_string(),
            time: None,
            message: format!("{NATIVE_THREAD_NAME} - {line}"),
        }
    }

    /// The message without its thread prefix.
    pub fn body(&self) -> &str {
        self.message
            .strip_prefix(self.thread_name.as_str())
            .and_then(|rest| rest.strip_prefix(" - "))
            .unwrap_or(&self.message)
    }
}

/// Argument vector plus working directory for the game process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl LaunchCommand {
    pub fn argv(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.args.len() + 1);
        out.push(self.program.clone());
        out.extend(self.args.iter().cloned());
        out
    }

    pub fn arg_value(&self, flag: &str) -> Option<&str> {
        let idx = self.args.iter().position(|a| a == flag)?;
        self.args.get(idx + 1).map(String::as_str)
    }

    /// Replaces the value following `--gameDir`. Returns false when the
    /// flag (or its value) is absent, leaving the command untouched.
    pub fn set_game_dir(&mut self, dir: &str) -> bool {
        let Some(idx) = self.args.iter().position(|a| a == "--gameDir") else {
            return false;
        };
        match self.args.get_mut(idx + 1) {
            Some(v) => {
                *v = dir.to_string();
                true
            }
            None => false,
        }
    }

    pub fn display(&self) -> String {
        self.argv().join(" ")
    }
}

/// Credential material returned by the token-exchange backend.
///
/// The JSON is kept as-is; accessors read the fields the launch command needs.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Credentials(pub serde_json::Value);

impl Credentials {
    pub fn from_value(v: serde_json::Value) -> Self {
        Self(v)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    pub fn id(&self) -> Option<&str> {
        self.str_field("id")
    }

    pub fn access_token(&self) -> Option<&str> {
        self.str_field("access_token")
    }

    pub fn error(&self) -> Option<&str> {
        self.str_field("error")
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.0
    }
}
