//! Local OAuth callback rendezvous for the launcher.
//!
//! A single-use HTTP listener on an ephemeral loopback port receives the
//! browser redirect, hands the authorization code to the caller, and shuts
//! down only after the confirmation page has been delivered.

pub mod cancel;
mod error;
pub mod oauth;
pub mod port_alloc;
pub mod probe;
pub mod server;

pub use cancel::Cancel;
pub use error::AuthError;
pub use oauth::{authorization_url, code_from_redirect_url, exchange_code};
pub use port_alloc::allocate_local_port;
pub use probe::{ProbeConfig, wait_until_live};
pub use server::{CallbackHandle, CallbackOptions, CallbackServer, receive_code};
