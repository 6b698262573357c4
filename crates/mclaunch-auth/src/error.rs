use std::time::Duration;

/// Errors raised while authorizing a launch.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum AuthError {
    // ── Local listener ──────────────────────────────────
    #[error("no free local port: {0}")]
    PortUnavailable(#[source] std::io::Error),

    #[error("port already in use: {0}")]
    PortInUse(u16),

    #[error("failed to bind callback listener on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to localhost:{port} after {attempts} attempts")]
    ListenerUnreachable { port: u16, attempts: u32 },

    #[error("callback listener stopped before the {0} was delivered")]
    ListenerClosed(&'static str),

    // ── Authorization outcome ───────────────────────────
    #[error("authorization denied: {error}")]
    Denied {
        error: String,
        description: Option<String>,
    },

    #[error("timed out after {after:?} waiting for the {waiting_for}")]
    Timeout {
        after: Duration,
        waiting_for: &'static str,
    },

    #[error("authorization cancelled")]
    Cancelled,

    // ── Manual flow ─────────────────────────────────────
    #[error("that url does not contain an authorization code")]
    NoCodeInUrl,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    // ── Token exchange ──────────────────────────────────
    #[error("token exchange failed (HTTP {status}): {body}")]
    Exchange { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl AuthError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AuthError::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AuthError::Timeout { .. })
    }

    /// Errors the user caused (or can fix) rather than local faults.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            AuthError::Denied { .. } | AuthError::NoCodeInUrl | AuthError::Cancelled
        )
    }
}
