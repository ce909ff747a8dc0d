//! The message relay.
//!
//! Accepts TCP clients, requires each to identify itself with a `cid` record, and forwards every
//! later record according to the routing policy in [`router`]. One task per connection reads and
//! decodes, a single router task decides recipients, and one writer task per connection drains
//! that client's outbound queue. A slow or dead client therefore never stalls anyone else.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::registry::ClientRegistry;

use self::config::RelayConfig;
use self::connection::ConnectionContext;
use self::error::RelayError;
use self::router::Router;

pub mod config;
mod connection;
pub mod error;
pub mod router;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Relay {
    listener: TcpListener,
    config: RelayConfig,
    registry: Arc<ClientRegistry>,
}

impl Relay {
    /// Validate `config` and bind the listening socket.
    pub async fn bind(config: RelayConfig) -> Result<Self, RelayError> {
        config.validate()?;

        let addr = config.address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| RelayError::Bind { addr, source })?;

        Ok(Self {
            listener,
            config,
            registry: Arc::new(ClientRegistry::new()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The live client table. Shared with every connection task.
    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    /// Serve until the process is killed.
    pub async fn run(self) {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `signal` resolves, then close every connection and wait for the tasks to end.
    pub async fn run_until<F>(self, signal: F)
    where
        F: Future<Output = ()>,
    {
        let Relay {
            listener,
            config,
            registry,
        } = self;

        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, "Relay listening");
        }

        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity);
        let router = tokio::spawn(Router::new(Arc::clone(&registry)).run(inbound_rx));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctx = ConnectionContext {
            registry: Arc::clone(&registry),
            inbound: inbound_tx,
            shutdown: shutdown_rx,
            max_record_len: config.max_record_len,
            outbound_capacity: config.outbound_capacity,
            handshake_timeout: config.handshake_timeout,
            drain_timeout: config.drain_timeout,
        };

        let mut connections = JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "Accepted connection");
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                        }
                        connections.spawn(connection::serve(stream, peer, ctx.clone()));
                    }
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Connection task failed");
                    }
                }
            }
        }

        info!(clients = registry.len(), "Relay shutting down");
        drop(listener);
        let _ = shutdown_tx.send(true);

        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Connection task failed");
            }
        }

        // The router stops once the last inbound sender is gone.
        drop(ctx);
        if router.await.is_err() {
            error!("Router task panicked");
        }

        registry.clear();
        info!("Relay stopped");
    }
}
