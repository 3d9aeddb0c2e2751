//! Request and response bodies for the gateway's REST routes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `POST /api/v1/query`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(alias = "query", default)]
    pub q: String,
    #[serde(alias = "budgetCeiling", default)]
    pub budget: Option<u64>,
    #[serde(alias = "maxBadAttempts", default)]
    pub max_bad_attempt: Option<u32>,
}

/// Reply to an accepted query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub request_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub running: usize,
    pub total: usize,
    pub uptime_secs: u64,
}
