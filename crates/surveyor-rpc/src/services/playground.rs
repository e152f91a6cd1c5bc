//! Playground service facade.
//!
//! Shares the storage engine with the inventory service; currently exposes
//! only its health surface.

use crate::server::{Dispatch, RpcService};
use surveyor_core::db::Engine;
use surveyor_core::error::{Result, SurveyorError};

pub struct PlaygroundService {
    #[allow(dead_code)]
    engine: Engine,
}

impl PlaygroundService {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }
}

#[async_trait::async_trait]
impl RpcService for PlaygroundService {
    async fn dispatch(&self, method: &str, _params: serde_json::Value) -> Result<Dispatch> {
        match method {
            "ping" => Ok(Dispatch::Value(serde_json::json!("playground: pong"))),
            _ => Err(SurveyorError::InvalidParams {
                message: format!("unknown method: playground.{}", method),
            }),
        }
    }
}
