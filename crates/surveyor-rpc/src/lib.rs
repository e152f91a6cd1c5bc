//! Surveyor RPC - server binary and service facades for the inventory
//! lifecycle manager.
//!
//! The library surface exists so integration tests can run the full server
//! in-process; the binary in `main.rs` is a thin CLI over [`serve`].

pub mod server;
pub mod services;

use server::{RpcServer, RpcServerHandle, RpcService, ServiceRegistry};
use services::{ExplainService, InventoryService, PlaygroundService};
use std::net::SocketAddr;
use std::sync::Arc;
use surveyor_core::crawler::Crawler;
use surveyor_core::db::Engine;
use surveyor_core::error::Result;
use surveyor_core::executor::ThreadPool;
use surveyor_core::lifecycle::InventoryManager;

/// Wire up every service over a shared engine and start the server.
///
/// `workers` sizes the crawl thread pool; the pool lives as long as the
/// manager, which the returned handle keeps alive through the registry.
pub async fn serve(
    addr: SocketAddr,
    engine: Engine,
    workers: usize,
    crawler: Arc<dyn Crawler>,
) -> Result<RpcServerHandle> {
    let executor = Arc::new(ThreadPool::new(workers));
    let manager = Arc::new(InventoryManager::new(engine.clone(), executor, crawler)?);

    let registry = Arc::new(
        ServiceRegistry::new()
            .register(
                "inventory",
                Arc::new(InventoryService::new(manager)) as Arc<dyn RpcService>,
            )
            .register(
                "explain",
                Arc::new(ExplainService::new(engine.clone())) as Arc<dyn RpcService>,
            )
            .register(
                "playground",
                Arc::new(PlaygroundService::new(engine)) as Arc<dyn RpcService>,
            ),
    );

    RpcServer::start(addr, registry).await
}
