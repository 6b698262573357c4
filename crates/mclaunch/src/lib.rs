//! Command-line Minecraft launcher: sign-in through a local callback
//! listener, version install, and a relayed game console.

pub mod config;
pub mod game;
pub mod log_relay;
pub mod orchestrator;
pub mod profiles;
pub mod prompt;

pub use config::{RuntimeConfig, format_error_chain};
pub use game::{GameLibrary, MinecraftDir};
pub use log_relay::{LineAssembler, LogRelay, LogSink, MemorySink, TracingSink};
pub use orchestrator::{AuthMode, LaunchOutcome, LaunchRequest, Launcher, Overlay};
