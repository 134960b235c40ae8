//! # Gate Server
//!
//! Listens for TCP and/or WebSocket connections, applies the
//! maximum-connection admission policy, and drives one [`Session`] per
//! accepted connection.
//!
//! Both listener kinds run the same accept loop behind the uniform
//! [`Acceptor`] contract; transport upgrades (TLS handshake, WebSocket
//! upgrade) happen on the per-connection task so a slow client can never
//! stall the accept loop.
//!
//! Shutdown is graceful with a deadline: listeners close first, every live
//! session is stopped, and the server then waits for sessions to drain up
//! to the configured shutdown timeout before abandoning stragglers.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::GateConfig;
use crate::error::{GateError, Result};
use crate::session::{Conn, MessageHandler, Session, SessionManager};
use crate::transport::socket::Socket;
use crate::transport::tcp::TcpAcceptor;
use crate::transport::tls::TlsServerSettings;
use crate::transport::websocket::WsAcceptor;
use crate::transport::Acceptor;
use crate::utils::{ActivityClock, Metrics};

/// The connection front end: listeners, admission control, session spawn.
pub struct GateServer {
    config: GateConfig,
    handler: Arc<dyn MessageHandler>,
    manager: Arc<SessionManager>,
    metrics: Arc<Metrics>,
    shutdown: watch::Sender<bool>,
    running: AtomicBool,
    accept_tasks: Mutex<Vec<JoinHandle<()>>>,
    tcp_addr: Mutex<Option<SocketAddr>>,
    ws_addr: Mutex<Option<SocketAddr>>,
}

impl GateServer {
    pub fn new(config: GateConfig, handler: Arc<dyn MessageHandler>) -> Arc<Self> {
        let metrics = Arc::new(Metrics::new());
        let manager = SessionManager::new(config.server.max_connections, metrics.clone());
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            config,
            handler,
            manager,
            metrics,
            shutdown,
            running: AtomicBool::new(false),
            accept_tasks: Mutex::new(Vec::new()),
            tcp_addr: Mutex::new(None),
            ws_addr: Mutex::new(None),
        })
    }

    pub fn manager(&self) -> Arc<SessionManager> {
        self.manager.clone()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Bound TCP listener address, once running. Useful with port 0.
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.tcp_addr.lock().ok().and_then(|a| *a)
    }

    /// Bound WebSocket listener address, once running.
    pub fn ws_addr(&self) -> Option<SocketAddr> {
        self.ws_addr.lock().ok().and_then(|a| *a)
    }

    /// Bind the configured listeners and start accepting. Returns once the
    /// listeners are live; accepting continues on background tasks until
    /// [`GateServer::stop`].
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        self.config.validate_strict()?;
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(GateError::Custom(
                crate::error::constants::ERR_ALREADY_RUNNING.into(),
            ));
        }

        match self.bind_listeners().await {
            Ok(acceptors) => {
                let mut tasks = Vec::new();
                for acceptor in acceptors {
                    info!(address = %acceptor.local_addr(), scheme = acceptor.scheme(), "listening");
                    tasks.push(tokio::spawn(self.clone().accept_loop(acceptor)));
                }
                if let Ok(mut slot) = self.accept_tasks.lock() {
                    slot.extend(tasks);
                }
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Bind every configured listener before any accept loop starts, so a
    /// bind failure leaves nothing running.
    async fn bind_listeners(&self) -> Result<Vec<Arc<dyn Acceptor>>> {
        let transport = &self.config.transport;
        let tls = match (&transport.tls_cert_path, &transport.tls_key_path) {
            (Some(cert), Some(key)) => Some(TlsServerSettings::new(cert, key).load_acceptor()?),
            _ => None,
        };

        let mut acceptors: Vec<Arc<dyn Acceptor>> = Vec::new();

        if let Some(addr) = self.config.server.tcp_address.as_deref() {
            let acceptor = TcpAcceptor::bind(
                addr,
                tls.clone(),
                transport.max_body_len,
                transport.read_buffer_size,
            )
            .await?;
            if let Ok(mut slot) = self.tcp_addr.lock() {
                *slot = Some(acceptor.local_addr());
            }
            acceptors.push(Arc::new(acceptor));
        }

        if let Some(addr) = self.config.server.ws_address.as_deref() {
            let acceptor =
                WsAcceptor::bind(addr, transport.max_body_len, transport.write_buffer_size)
                    .await?;
            if let Ok(mut slot) = self.ws_addr.lock() {
                *slot = Some(acceptor.local_addr());
            }
            acceptors.push(Arc::new(acceptor));
        }

        if acceptors.is_empty() {
            return Err(GateError::ConfigError(
                "no listener configured: set a tcp or websocket address".into(),
            ));
        }
        Ok(acceptors)
    }

    /// Run, then block until CTRL+C, then stop.
    pub async fn run_until_shutdown(self: &Arc<Self>) -> Result<()> {
        self.run().await?;
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received CTRL+C signal, shutting down");
        }
        self.stop().await;
        Ok(())
    }

    async fn accept_loop(self: Arc<Self>, acceptor: Arc<dyn Acceptor>) {
        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown_rx.changed() => continue,
                accepted = acceptor.accept_raw() => match accepted {
                    Ok((stream, peer)) => self.handle_accept(acceptor.clone(), stream, peer),
                    Err(e) => {
                        warn!(scheme = acceptor.scheme(), error = %e, "accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }
        debug!(scheme = acceptor.scheme(), "acceptor stopped");
    }

    /// Admission check, then hand the connection to its own task. The
    /// cheap pre-check here closes over-limit connections before paying for
    /// the transport upgrade; registration enforces the limit
    /// authoritatively.
    fn handle_accept(
        self: &Arc<Self>,
        acceptor: Arc<dyn Acceptor>,
        stream: tokio::net::TcpStream,
        peer: SocketAddr,
    ) {
        if !self.manager.has_capacity() {
            self.manager.record_rejection();
            debug!(
                %peer,
                live = self.manager.live(),
                max = self.manager.max_connections(),
                "connection rejected at capacity"
            );
            drop(stream);
            return;
        }

        let server = self.clone();
        tokio::spawn(async move {
            match acceptor.upgrade(stream).await {
                Ok((reader, writer)) => {
                    let clock = Arc::new(ActivityClock::new());
                    let socket =
                        Socket::new(reader, writer, peer, clock, server.metrics.clone());
                    let conn = Conn::new(
                        socket,
                        server.config.server.handshake_key.clone(),
                        server.config.server.heartbeat_interval,
                        server.metrics.clone(),
                    );
                    let session = Session::new(
                        conn,
                        server.handler.clone(),
                        server.manager.clone(),
                        server.metrics.clone(),
                    );
                    match session.run().await {
                        Ok(()) => {}
                        Err(GateError::AtCapacity { max }) => {
                            debug!(%peer, max, "connection rejected at capacity");
                        }
                        Err(e) => {
                            debug!(%peer, error = %e, "session ended with error");
                        }
                    }
                }
                Err(e) => {
                    warn!(%peer, error = %e, "transport upgrade failed");
                }
            }
        });
    }

    /// Close the listeners, stop every session, and wait for live
    /// connections to drain, bounded by the configured shutdown deadline.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            debug!("stop ignored, server not running");
            return;
        }
        info!("server shutting down");

        let _ = self.shutdown.send(true);
        let tasks: Vec<JoinHandle<()>> = self
            .accept_tasks
            .lock()
            .map(|mut t| t.drain(..).collect())
            .unwrap_or_default();
        for task in tasks {
            let _ = task.await;
        }

        self.manager.stop_all();

        let deadline = tokio::time::sleep(self.config.server.shutdown_timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => {
                    warn!(live = self.manager.live(), "shutdown deadline reached, abandoning remaining connections");
                    break;
                }
                _ = tokio::time::sleep(Duration::from_millis(50)) => {
                    if self.manager.live() == 0 {
                        info!("all sessions closed");
                        break;
                    }
                }
            }
        }

        self.metrics.log_summary();
    }
}
