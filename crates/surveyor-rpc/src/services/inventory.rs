//! Inventory service facade.
//!
//! Translates `inventory.*` wire calls into [`InventoryManager`] operations.
//! Manager calls run on the blocking pool: they take the storage lock and,
//! for a foreground create, the whole crawl.

use crate::server::{Dispatch, RpcService};
use crate::services::require_i64_param;
use std::sync::Arc;
use surveyor_core::error::{Result, SurveyorError};
use surveyor_core::lifecycle::InventoryManager;
use tracing::debug;

pub struct InventoryService {
    manager: Arc<InventoryManager>,
}

impl InventoryService {
    pub fn new(manager: Arc<InventoryManager>) -> Self {
        Self { manager }
    }

    async fn create(&self, params: serde_json::Value) -> Result<Dispatch> {
        let import_target = params
            .get("import_target")
            .and_then(|v| v.as_str())
            .map(String::from);
        let background = params
            .get("background")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        debug!(?import_target, background, "inventory.create");

        let manager = self.manager.clone();
        let handle = run_blocking(move || manager.create(import_target, background)).await?;
        Ok(Dispatch::Stream(handle.events))
    }

    async fn list(&self) -> Result<Dispatch> {
        let manager = self.manager.clone();
        let indices = run_blocking(move || manager.list()).await?;
        Ok(Dispatch::Value(serde_json::to_value(indices)?))
    }

    async fn get(&self, params: serde_json::Value) -> Result<Dispatch> {
        let id = require_i64_param(&params, "id")?;
        let manager = self.manager.clone();
        let index = run_blocking(move || manager.get(id)).await?;
        Ok(Dispatch::Value(serde_json::to_value(index)?))
    }

    async fn delete(&self, params: serde_json::Value) -> Result<Dispatch> {
        let id = require_i64_param(&params, "id")?;
        let manager = self.manager.clone();
        let removed = run_blocking(move || manager.delete(id)).await?;
        Ok(Dispatch::Value(serde_json::to_value(removed)?))
    }
}

#[async_trait::async_trait]
impl RpcService for InventoryService {
    async fn dispatch(&self, method: &str, params: serde_json::Value) -> Result<Dispatch> {
        match method {
            "create" => self.create(params).await,
            "list" => self.list().await,
            "get" => self.get(params).await,
            "delete" => self.delete(params).await,
            _ => Err(SurveyorError::InvalidParams {
                message: format!("unknown method: inventory.{}", method),
            }),
        }
    }
}

/// Run a manager call on the blocking pool.
async fn run_blocking<T: Send + 'static>(
    f: impl FnOnce() -> Result<T> + Send + 'static,
) -> Result<T> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SurveyorError::Other(format!("blocking task failed: {}", e)))?
}
