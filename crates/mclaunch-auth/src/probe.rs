use std::time::Duration;

use reqwest::StatusCode;

use crate::AuthError;

const DEFAULT_PROBE_ATTEMPTS: u32 = 150;
const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(100);
const PROBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
/// Floor for the overall probe budget so a tiny interval still leaves room
/// for one real round trip.
const MIN_PROBE_BUDGET: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_PROBE_ATTEMPTS,
            interval: DEFAULT_PROBE_INTERVAL,
        }
    }
}

/// Polls `GET /` on the local callback listener until it answers with the
/// missing-parameter status (400). Connection failures are retried quietly.
///
/// The whole loop is bounded by `attempts * interval`, so a listener that
/// accepts but never answers cannot stretch it.
pub async fn wait_until_live(port: u16, cfg: ProbeConfig) -> Result<(), AuthError> {
    // Never route loopback probes through an HTTP proxy.
    let client = reqwest::Client::builder()
        .no_proxy()
        .timeout(PROBE_REQUEST_TIMEOUT)
        .build()?;
    let url = format!("http://127.0.0.1:{port}/");
    let budget = cfg.interval.saturating_mul(cfg.attempts).max(MIN_PROBE_BUDGET);
    let deadline = tokio::time::Instant::now() + budget;

    let mut made = 0;
    for attempt in 1..=cfg.attempts {
        made = attempt;
        match tokio::time::timeout_at(deadline, client.get(&url).send()).await {
            Err(_) => {
                tracing::debug!(port, attempt, ?budget, "probe budget exhausted");
                break;
            }
            Ok(Ok(resp)) if resp.status() == StatusCode::BAD_REQUEST => {
                tracing::debug!(port, attempt, "callback listener is live");
                return Ok(());
            }
            Ok(Ok(resp)) => {
                tracing::debug!(port, attempt, status = %resp.status(), "unexpected probe status");
            }
            Ok(Err(e)) => {
                tracing::debug!(port, attempt, error = %e, "callback listener not reachable yet");
            }
        }
        if attempt < cfg.attempts {
            if tokio::time::Instant::now() + cfg.interval >= deadline {
                break;
            }
            tokio::time::sleep(cfg.interval).await;
        }
    }

    Err(AuthError::ListenerUnreachable { port, attempts: made })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::CallbackServer;

    #[tokio::test]
    async fn live_listener_passes_quickly() {
        let handle = CallbackServer::start(0).await.unwrap();
        let started = std::time::Instant::now();
        wait_until_live(handle.port(), ProbeConfig::default())
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(15));
        handle.stop(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn unbound_port_fails_with_distinct_error() {
        // Reserve then release a port so nothing listens there.
        let port = crate::port_alloc::allocate_local_port(0).unwrap();
        let cfg = ProbeConfig {
            attempts: 5,
            interval: Duration::from_millis(10),
        };
        let err = wait_until_live(port, cfg).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::ListenerUnreachable { port: p, attempts: 5 } if p == port
        ));
    }

    #[tokio::test]
    async fn refused_connections_are_retried_until_listener_binds() {
        let port = crate::port_alloc::allocate_local_port(0).unwrap();
        let late = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            CallbackServer::start(port).await.unwrap()
        });

        let cfg = ProbeConfig {
            attempts: 50,
            interval: Duration::from_millis(20),
        };
        wait_until_live(port, cfg).await.unwrap();
        late.await.unwrap().stop(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn silent_listener_cannot_stretch_past_budget() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let task = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((sock, _)) = listener.accept().await {
                held.push(sock);
            }
        });

        let cfg = ProbeConfig {
            attempts: 3,
            interval: Duration::from_millis(200),
        };
        let started = std::time::Instant::now();
        let err = wait_until_live(port, cfg).await.unwrap_err();
        assert!(matches!(err, AuthError::ListenerUnreachable { .. }));
        assert!(started.elapsed() < Duration::from_millis(1500));
        task.abort();
    }

    #[tokio::test]
    async fn foreign_server_answering_200_is_not_accepted() {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let app = axum::Router::new().route("/", axum::routing::get(|| async { "hello" }));
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let cfg = ProbeConfig {
            attempts: 3,
            interval: Duration::from_millis(10),
        };
        let err = wait_until_live(port, cfg).await.unwrap_err();
        assert!(matches!(err, AuthError::ListenerUnreachable { .. }));
        task.abort();
    }
}
