//! Service facades: thin translation layers between wire params and the
//! shared manager. Each service gets its collaborators injected; none owns
//! index state of its own.

pub mod explain;
pub mod inventory;
pub mod playground;

pub use explain::ExplainService;
pub use inventory::InventoryService;
pub use playground::PlaygroundService;

use surveyor_core::error::SurveyorError;

/// Extract a required i64 parameter.
pub(crate) fn require_i64_param(
    params: &serde_json::Value,
    name: &str,
) -> Result<i64, SurveyorError> {
    params
        .get(name)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| SurveyorError::InvalidParams {
            message: format!("missing required parameter: {}", name),
        })
}
