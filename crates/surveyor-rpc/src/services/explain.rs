//! Explain service facade.
//!
//! Shares the storage engine with the inventory service; currently exposes
//! only its health surface, with analysis methods to follow once the model
//! import path lands.

use crate::server::{Dispatch, RpcService};
use surveyor_core::db::Engine;
use surveyor_core::error::{Result, SurveyorError};

pub struct ExplainService {
    #[allow(dead_code)]
    engine: Engine,
}

impl ExplainService {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }
}

#[async_trait::async_trait]
impl RpcService for ExplainService {
    async fn dispatch(&self, method: &str, _params: serde_json::Value) -> Result<Dispatch> {
        match method {
            "ping" => Ok(Dispatch::Value(serde_json::json!("explain: pong"))),
            _ => Err(SurveyorError::InvalidParams {
                message: format!("unknown method: explain.{}", method),
            }),
        }
    }
}
