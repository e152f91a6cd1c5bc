//! Surveyor Core - Headless library for inventory lifecycle management.
//!
//! This crate provides point-in-time snapshots ("inventory indices") of a
//! crawled resource and policy graph: persistence, crawl orchestration, and
//! the RPC protocol and client used to drive a running server. It can be
//! used programmatically without any RPC layer.
//!
//! For the server binary and service facades, see the `surveyor-rpc` crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use surveyor_core::{Engine, InventoryManager, ScriptedCrawler, ThreadPool};
//!
//! fn main() -> surveyor_core::Result<()> {
//!     let engine = Engine::open("inventory.sqlite")?;
//!     let manager = InventoryManager::new(
//!         engine,
//!         Arc::new(ThreadPool::new(10)),
//!         Arc::new(ScriptedCrawler::completing(100)),
//!     )?;
//!
//!     // Foreground crawl: returns once the terminal status is committed
//!     let handle = manager.create(None, false)?;
//!     println!("index {} -> {}", handle.id, manager.get(handle.id)?.status);
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod crawler;
pub mod db;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod progress;
pub mod protocol;
pub mod store;

// Re-export commonly used types
pub use client::{ClientComposition, ExplainClient, InventoryClient, PlaygroundClient, RpcChannel};
pub use crawler::{CrawlOutcome, CrawlUpdate, Crawler, ResourceCounts, ScriptedCrawler};
pub use db::{Engine, Session};
pub use error::{Result, SurveyorError};
pub use executor::{TaskExecutor, ThreadPool};
pub use lifecycle::{CreateHandle, InventoryManager};
pub use progress::Progress;
pub use store::{IndexStatus, IndexStore, InventoryIndex};
