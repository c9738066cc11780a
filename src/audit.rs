//! Upload-history audit log, written by the ingestion service on every
//! completed or failed attempt.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::Db;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Every row in the batch was persisted.
    Success,
    /// Some rows were persisted, some failed coercion.
    Partial,
    /// Nothing (or not everything attempted) was persisted.
    Failed,
}

impl UploadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::Success => "success",
            UploadStatus::Partial => "partial",
            UploadStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UploadHistoryEntry {
    pub id: i64,
    pub file_type: String,
    pub rows_processed: i64,
    pub time_added: DateTime<Utc>,
    pub status: String,
    pub error_message: Option<String>,
}

pub async fn record(
    db: &Db,
    file_type: &str,
    rows_processed: i64,
    status: UploadStatus,
    error_message: Option<&str>,
) -> Result<(), Error> {
    sqlx::query(
        "INSERT INTO upload_history (file_type, rows_processed, status, error_message, time_added)
         VALUES ($1, $2, $3, $4, now())",
    )
    .bind(file_type)
    .bind(rows_processed)
    .bind(status.as_str())
    .bind(error_message)
    .execute(&db.pool)
    .await?;
    Ok(())
}

/// Most recent attempts first.
pub async fn list(db: &Db, limit: i64) -> Result<Vec<UploadHistoryEntry>, Error> {
    let entries = sqlx::query_as::<_, UploadHistoryEntry>(
        "SELECT id, file_type, rows_processed, time_added, status, error_message
         FROM upload_history
         ORDER BY time_added DESC
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(&db.pool)
    .await?;
    Ok(entries)
}
