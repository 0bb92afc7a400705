//! Classifier server core logic.
//!
//! Accepts TCP connections and runs one [`Session`] per connection on
//! its own task. All sessions share one accelerator.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use nna_core::{NnaError, Session, SessionId, SharedAccelerator, TcpTransport};

use crate::config::ServerConfig;

// ── ClassifierServer ─────────────────────────────────────────────

/// The top-level classifier server.
pub struct ClassifierServer {
    config: ServerConfig,
    accelerator: SharedAccelerator,
    running: Arc<AtomicBool>,
    /// Set by `stop`; sticky, so a stop issued before `serve` still holds.
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    next_id: AtomicU64,
}

impl ClassifierServer {
    /// Create a server around an already configured accelerator.
    pub fn new(config: ServerConfig, accelerator: SharedAccelerator) -> Self {
        Self {
            config,
            accelerator,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Obtain a handle that can be used to stop the server from
    /// another task: storing `true` requests shutdown.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener, NnaError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr).await?;
        info!(address = %addr, "classifier listening");
        Ok(listener)
    }

    /// Bind, then serve until stopped.
    pub async fn run(&self) -> Result<(), NnaError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` until stopped.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), NnaError> {
        let session_config = self.config.to_session_config()?;
        let limit = self.config.network.max_connections.max(1) as usize;
        self.running.store(true, Ordering::SeqCst);

        while !self.shutdown.load(Ordering::SeqCst) {
            let accept = tokio::select! {
                result = listener.accept() => result,
                _ = Self::wait_for_stop(&self.shutdown) => break,
            };

            let (stream, peer) = match accept {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept error: {e}");
                    continue;
                }
            };

            if self.active.load(Ordering::SeqCst) >= limit {
                warn!(%peer, limit, "connection refused: session limit reached");
                drop(stream);
                continue;
            }

            let id = SessionId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
            let session = match Session::new(id, &session_config, Arc::clone(&self.accelerator)) {
                Ok(session) => session,
                Err(e) => {
                    error!(session = %id, %peer, "failed to create session: {e}");
                    continue;
                }
            };

            self.active.fetch_add(1, Ordering::SeqCst);
            info!(session = %id, %peer, "session opened");

            let active = Arc::clone(&self.active);
            tokio::spawn(async move {
                Self::drive(session, stream).await;
                active.fetch_sub(1, Ordering::SeqCst);
            });
        }

        self.running.store(false, Ordering::SeqCst);
        info!("classifier server stopped");
        Ok(())
    }

    /// Signal the server to stop.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Sessions currently open.
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Run one session to completion and log how it ended.
    async fn drive(mut session: Session, stream: TcpStream) {
        let id = session.id();
        let mut transport = match TcpTransport::from_tcp(stream) {
            Ok(t) => t,
            Err(e) => {
                warn!(session = %id, "transport setup failed: {e}");
                return;
            }
        };

        match session.run(&mut transport).await {
            Ok(()) => {}
            Err(e) => debug!(session = %id, "connection error: {e}"),
        }

        info!(
            session = %id,
            frames = session.frames_classified(),
            bytes = transport.consumed(),
            "session closed"
        );
    }

    /// Async helper: resolves once shutdown is requested.
    async fn wait_for_stop(shutdown: &Arc<AtomicBool>) {
        loop {
            if shutdown.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use nna_core::{AcceleratorConfig, AcceleratorProxy, StubDriver};

    fn server() -> ClassifierServer {
        let accel = AcceleratorProxy::configure(
            Box::new(StubDriver::default()),
            AcceleratorConfig::default(),
        )
        .unwrap()
        .into_shared();
        ClassifierServer::new(ServerConfig::default(), accel)
    }

    #[test]
    fn server_creates_with_defaults() {
        let svc = server();
        assert!(!svc.is_running());
        assert_eq!(svc.active_sessions(), 0);
    }

    #[test]
    fn stop_handle_works() {
        let svc = server();
        let handle = svc.stop_handle();
        assert!(!handle.load(Ordering::SeqCst));
        svc.stop();
        assert!(handle.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn stop_before_serve_is_kept() {
        let svc = server();
        svc.stop();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_secs(2), svc.serve(listener))
            .await
            .expect("serve ignored an earlier stop");
        assert!(result.is_ok());
        assert!(!svc.is_running());
    }

    #[tokio::test]
    async fn serve_returns_after_stop() {
        let svc = Arc::new(server());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let task = tokio::spawn({
            let svc = Arc::clone(&svc);
            async move { svc.serve(listener).await }
        });

        while !svc.is_running() {
            tokio::task::yield_now().await;
        }
        svc.stop();

        let result = tokio::time::timeout(std::time::Duration::from_secs(2), task)
            .await
            .expect("timeout")
            .unwrap();
        assert!(result.is_ok());
    }
}
