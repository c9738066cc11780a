// API request/response models (DTOs)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ingest::RowFailure;
use crate::query::Sort;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

/// Body of `/get-rows`: offset pagination plus the optional filter bag and
/// sort. Unknown filter keys are the compiler's problem (they are ignored).
#[derive(Debug, Deserialize)]
pub struct RowsRequest {
    pub table: String,
    pub start: i64,
    pub count: i64,
    #[serde(default)]
    pub filters: Map<String, Value>,
    #[serde(default)]
    pub sort: Option<Sort>,
}

#[derive(Debug, Serialize)]
pub struct RowsResponse {
    pub data: Vec<Value>,
    #[serde(rename = "totalCount")]
    pub total_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub table: String,
    #[serde(default)]
    pub filters: Map<String, Value>,
    #[serde(default)]
    pub sort: Option<Sort>,
}

/// Batch-insert outcome: `count` is rows actually persisted, never the batch
/// size.
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub message: String,
    pub count: usize,
    pub ids: Vec<i64>,
    pub failures: Vec<RowFailure>,
}

#[derive(Debug, Deserialize)]
pub struct UserUpdateRequest {
    pub email: String,
    pub name: Option<String>,
    pub is_admin: bool,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub uptime_seconds: u64,
}
