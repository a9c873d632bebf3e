//! TCP listener hosting bridge connections.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hap_core::Result;
use hap_pairing::{
    random_pairing_id, Advertiser, ConnectionHandle, ConnectionId, FilePairingStore,
    MemoryPairingStore, NoopAdvertiser, PairingContext, PairingStore, SessionRegistry,
};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::advertise::{MdnsAdvertiser, ServiceRecord};
use crate::config::BridgeConfig;
use crate::connection::{log_outcome, serve_connection};
use crate::router::{AccessoryHandler, NotFoundHandler};

/// A HAP bridge: pairing context, accessory handler and listener settings.
pub struct BridgeServer {
    config: BridgeConfig,
    ctx: Arc<PairingContext>,
    handler: Arc<dyn AccessoryHandler>,
    mdns: Option<Arc<MdnsAdvertiser>>,
    next_id: AtomicU64,
}

impl BridgeServer {
    /// Build the store and advertiser described by `config`.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        config.validate()?;

        let pairing_id = config.pairing_id.clone().unwrap_or_else(random_pairing_id);
        let store: Arc<dyn PairingStore> = match &config.storage_path {
            Some(path) => Arc::new(FilePairingStore::open(path, &pairing_id)?),
            None => Arc::new(MemoryPairingStore::new(pairing_id)),
        };

        let mdns = if config.advertise {
            let record = ServiceRecord {
                name: config.name.clone(),
                model: config.model.clone(),
                category: config.category,
            };
            Some(Arc::new(MdnsAdvertiser::new(record, store.clone())?))
        } else {
            None
        };
        let advertiser: Arc<dyn Advertiser> = match &mdns {
            Some(mdns) => mdns.clone(),
            None => Arc::new(NoopAdvertiser),
        };

        let mut server = Self::with_parts(config, store, advertiser);
        server.mdns = mdns;
        Ok(server)
    }

    /// Assemble a server around existing collaborators.
    pub fn with_parts(
        config: BridgeConfig,
        store: Arc<dyn PairingStore>,
        advertiser: Arc<dyn Advertiser>,
    ) -> Self {
        let ctx = Arc::new(PairingContext::new(
            store,
            advertiser,
            Arc::new(SessionRegistry::new()),
            config.setup_code.clone(),
        ));
        Self {
            config,
            ctx,
            handler: Arc::new(NotFoundHandler),
            mdns: None,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn AccessoryHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<PairingContext> {
        &self.ctx
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.config.socket_addr()).await?;
        Ok(listener)
    }

    /// Accept connections until `shutdown` resolves, then close every
    /// verified connection.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let local: SocketAddr = listener.local_addr()?;
        let identity = self.ctx.store().bridge_identity();
        info!(
            addr = %local,
            pairing_id = %identity.pairing_id(),
            paired = identity.is_paired(),
            "Bridge listening"
        );

        if let Some(mdns) = &self.mdns {
            mdns.set_port(local.port());
            mdns.reload_service();
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(error = %e, "Accept failed");
                            continue;
                        }
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(error = %e, "Failed to set TCP_NODELAY");
                    }

                    let conn = ConnectionId(self.next_id.fetch_add(1, Ordering::SeqCst));
                    debug!(%conn, %peer, "Accepted connection");

                    let handle = ConnectionHandle::new(conn);
                    let ctx = self.ctx.clone();
                    let handler = self.handler.clone();
                    tokio::spawn(async move {
                        let result = serve_connection(stream, handle, ctx, handler).await;
                        log_outcome(conn, &result);
                    });
                }
            }
        }

        let closed = self.ctx.registry().close_all();
        info!(closed, "Bridge shutting down");
        if let Some(mdns) = &self.mdns {
            mdns.shutdown();
        }
        Ok(())
    }

    /// Bind and serve until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config() -> BridgeConfig {
        BridgeConfig::builder()
            .setup_code("031-45-154")
            .pairing_id("0E:10:20:30:40:50")
            .bind_address([127, 0, 0, 1].into())
            .port(0)
            .advertise(false)
            .build()
            .unwrap()
    }

    #[test]
    fn memory_store_uses_configured_pairing_id() {
        let server = BridgeServer::new(config()).unwrap();
        let identity = server.context().store().bridge_identity();
        assert_eq!(identity.pairing_id(), "0E:10:20:30:40:50");
        assert!(!identity.is_paired());
        assert_eq!(server.context().setup_code(), "031-45-154");
    }

    #[test]
    fn file_store_keeps_identity_across_restarts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pairings.json");

        let mut cfg = config();
        cfg.storage_path = Some(path.clone());
        let first = BridgeServer::new(cfg.clone()).unwrap();
        let key = first.context().store().bridge_identity().public_key();
        drop(first);

        cfg.pairing_id = Some("0E:99:99:99:99:99".to_string());
        let second = BridgeServer::new(cfg).unwrap();
        let identity = second.context().store().bridge_identity();
        assert_eq!(identity.public_key(), key);
        assert_eq!(identity.pairing_id(), "0E:10:20:30:40:50");
        assert!(path.exists());
    }

    #[test]
    fn generated_pairing_id_when_absent() {
        let mut cfg = config();
        cfg.pairing_id = None;
        let server = BridgeServer::new(cfg).unwrap();
        let id = server.context().store().bridge_identity().pairing_id().to_string();
        assert_eq!(id.split(':').count(), 6);
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown() {
        let server = BridgeServer::new(config()).unwrap();
        let listener = server.bind().await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
        server.serve(listener, async {}).await.unwrap();
    }
}
