//! Single-use local HTTP listener that receives the OAuth redirect.
//!
//! The handoff has two phases. The authorization code is pushed to the
//! caller as soon as the request arrives; a second one-shot ("ready") fires
//! only once the confirmation page body has been fully handed to the
//! connection. The caller waits for both before stopping the listener, so
//! the browser never sees a dropped connection.

use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::stream::{self, StreamExt};
use mclaunch_types::AuthorizationCode;
use reqwest::Url;
use serde::Deserialize;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};

use crate::cancel::{Cancel, wait_bounded};
use crate::probe::{ProbeConfig, wait_until_live};
use crate::AuthError;

pub const CONFIRMATION_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Authorized</title>
</head>
<body>
<h1>Authorized</h1>
<p id="description">You may close this window.</p>
<p>Minecraft should launch momentarily. (approx. 15 seconds)</p>
<script>
    const closeAfter = 30;
    document.getElementById("description").innerText += " It will automatically close after " + closeAfter + " seconds."
    setTimeout(() => window.close(), closeAfter * 1000)
</script>
</body>
</html>"#;

pub const DENIED_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Authorization failed</title>
</head>
<body>
<h1>Authorization failed</h1>
<p>The sign-in was not completed. You may close this window and run the launcher again.</p>
</body>
</html>"#;

const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

type CodeOutcome = Result<AuthorizationCode, AuthError>;

/// Handler state. Each sender is taken exactly once.
struct CallbackContext {
    code_tx: Mutex<Option<oneshot::Sender<CodeOutcome>>>,
    ready_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl CallbackContext {
    fn take_code_slot(&self) -> Option<oneshot::Sender<CodeOutcome>> {
        self.code_tx.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    fn take_ready(&self) -> Option<oneshot::Sender<()>> {
        self.ready_tx.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// Fires the ready signal once; dropping it unfired fires it too, so an
/// aborted connection cannot leave the caller waiting forever.
struct ReadyGuard(Option<oneshot::Sender<()>>);

impl ReadyGuard {
    fn fire(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ReadyGuard {
    fn drop(&mut self) {
        self.fire();
    }
}

/// Response body that signals `ready` only after its single chunk has been
/// consumed by the HTTP layer and the stream has been polled to its end.
fn body_then_signal(content: &'static str, ready: Option<oneshot::Sender<()>>) -> Body {
    let mut guard = ReadyGuard(ready);
    let head = stream::iter([Ok::<Bytes, Infallible>(Bytes::from_static(content.as_bytes()))]);
    let tail = stream::once(async move {
        guard.fire();
        None::<Result<Bytes, Infallible>>
    })
    .filter_map(|item| async move { item });
    Body::from_stream(head.chain(tail))
}

fn html_response(status: StatusCode, content: &'static str, ready: Option<oneshot::Sender<()>>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        body_then_signal(content, ready),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn redirect_route(
    State(ctx): State<Arc<CallbackContext>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    if let Some(code) = params.code.filter(|c| !c.is_empty()) {
        let Some(tx) = ctx.take_code_slot() else {
            tracing::warn!("ignoring repeated authorization callback");
            return (StatusCode::GONE, "authorization code already received").into_response();
        };
        // The code reaches the caller before the response body exists.
        let _ = tx.send(Ok(AuthorizationCode::new(code)));
        tracing::info!("received authorization code");
        return html_response(StatusCode::OK, CONFIRMATION_HTML, ctx.take_ready());
    }

    if let Some(error) = params.error.filter(|e| !e.is_empty()) {
        let Some(tx) = ctx.take_code_slot() else {
            return (StatusCode::GONE, "authorization already completed").into_response();
        };
        tracing::warn!(%error, description = ?params.error_description, "authorization denied");
        let _ = tx.send(Err(AuthError::Denied {
            error,
            description: params.error_description,
        }));
        return html_response(StatusCode::BAD_REQUEST, DENIED_HTML, ctx.take_ready());
    }

    // Also the readiness probe's answer.
    (StatusCode::BAD_REQUEST, "missing code query parameter").into_response()
}

fn router(ctx: Arc<CallbackContext>) -> Router {
    Router::new().route("/", get(redirect_route)).with_state(ctx)
}

pub struct CallbackServer;

impl CallbackServer {
    /// Binds `127.0.0.1:<port>` and serves the callback route on its own task.
    /// Port 0 binds an OS-chosen port; read it back with [`CallbackHandle::port`].
    pub async fn start(port: u16) -> Result<CallbackHandle, AuthError> {
        let (code_tx, code_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let ctx = Arc::new(CallbackContext {
            code_tx: Mutex::new(Some(code_tx)),
            ready_tx: Mutex::new(Some(ready_tx)),
        });

        let addr: SocketAddr = ([127, 0, 0, 1], port).into();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| AuthError::Bind { port, source })?;
        let port = listener.local_addr().map(|a| a.port()).unwrap_or(port);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(ctx);
        let task = tokio::spawn(async move {
            let res = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = res {
                tracing::warn!(error = %e, "callback listener exited with error");
            }
        });

        tracing::info!(port, "callback listener started");

        Ok(CallbackHandle {
            port,
            code_rx: Some(code_rx),
            ready_rx: Some(ready_rx),
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }
}

/// Owner of a running callback listener. Dropping it aborts the listener.
pub struct CallbackHandle {
    port: u16,
    code_rx: Option<oneshot::Receiver<CodeOutcome>>,
    ready_rx: Option<oneshot::Receiver<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CallbackHandle {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Waits for the redirect carrying the code. Can be retried after a
    /// timeout; returns `ListenerClosed` once the code was already taken.
    pub async fn await_code(
        &mut self,
        timeout: Option<Duration>,
        cancel: &Cancel,
    ) -> Result<AuthorizationCode, AuthError> {
        const WHAT: &str = "authorization code";
        let rx = self.code_rx.as_mut().ok_or(AuthError::ListenerClosed(WHAT))?;
        let received = wait_bounded(rx, timeout, cancel, WHAT).await?;
        self.code_rx = None;
        received.map_err(|_| AuthError::ListenerClosed(WHAT))?
    }

    /// Waits until the confirmation page has been fully handed to the client.
    pub async fn await_ready(&mut self, timeout: Option<Duration>, cancel: &Cancel) -> Result<(), AuthError> {
        const WHAT: &str = "confirmation response";
        let rx = self.ready_rx.as_mut().ok_or(AuthError::ListenerClosed(WHAT))?;
        let received = wait_bounded(rx, timeout, cancel, WHAT).await?;
        self.ready_rx = None;
        received.map_err(|_| AuthError::ListenerClosed(WHAT))
    }

    /// Graceful shutdown; aborts the listener task if it outlives `grace`.
    pub async fn stop(mut self, grace: Duration) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(grace, &mut task).await {
                Ok(_) => tracing::info!(port = self.port, "callback listener shut down"),
                Err(_) => {
                    tracing::warn!(port = self.port, ?grace, "callback listener did not stop in time; aborting");
                    task.abort();
                }
            }
        }
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Tunables for [`receive_code`].
#[derive(Debug, Clone, Copy)]
pub struct CallbackOptions {
    pub probe: ProbeConfig,
    pub code_timeout: Option<Duration>,
    pub ready_timeout: Option<Duration>,
    pub shutdown_grace: Duration,
}

impl Default for CallbackOptions {
    fn default() -> Self {
        Self {
            probe: ProbeConfig::default(),
            code_timeout: None,
            ready_timeout: None,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// Full listener lifecycle: start, confirm it is live, hand the URL to
/// `when_ready` (typically opens a browser), take the code, wait for the
/// confirmation page to flush, stop.
pub async fn receive_code<F>(
    port: u16,
    opts: CallbackOptions,
    cancel: &Cancel,
    when_ready: F,
) -> Result<AuthorizationCode, AuthError>
where
    F: FnOnce(u16),
{
    let mut handle = CallbackServer::start(port).await?;
    let port = handle.port();

    tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(AuthError::Cancelled),
        res = wait_until_live(port, opts.probe) => res?,
    }
    when_ready(port);

    tracing::info!("waiting for authorization code");
    let code = match handle.await_code(opts.code_timeout, cancel).await {
        Ok(code) => code,
        Err(denied @ AuthError::Denied { .. }) => {
            // The denial page goes out the same way; let it flush before teardown.
            if let Err(e) = handle.await_ready(opts.ready_timeout, cancel).await {
                tracing::debug!(error = %e, "denial page did not flush");
            }
            handle.stop(opts.shutdown_grace).await;
            return Err(denied);
        }
        Err(e) => return Err(e),
    };

    tracing::debug!("waiting for confirmation page to flush");
    handle.await_ready(opts.ready_timeout, cancel).await?;
    handle.stop(opts.shutdown_grace).await;

    Ok(code)
}

/// `http://localhost:<port>/?code=<code>` — the URL the auth backend redirects to.
pub fn local_callback_url(port: u16) -> Result<Url, AuthError> {
    Url::parse(&format!("http://localhost:{port}/")).map_err(|e| AuthError::InvalidUrl(e.to_string()))
}
