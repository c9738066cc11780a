//! Batch ingestion: coercion, taxonomy enrichment and chunked bulk insert for
//! one entity type.
//!
//! Ingestion is append-only by design: re-ingesting an identical batch
//! creates new rows stamped with a fresh `time_added`, which is what makes
//! the field-history queries possible. There is no dedup on insert.

use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::{QueryBuilder, Row};
use tracing::{info, warn};

use crate::audit::{self, UploadStatus};
use crate::category;
use crate::coerce::{coerce_row, TypedRow};
use crate::db::{push_scalar, Db};
use crate::error::Error;
use crate::schema::{Table, TableSchema};

/// Rows per bulk INSERT statement. Throughput tunable, not a correctness
/// parameter; sized to stay well under Postgres's bind-parameter ceiling at
/// the widest table.
pub const INSERT_CHUNK_ROWS: usize = 500;

#[derive(Debug, Clone, serde::Serialize)]
pub struct RowFailure {
    /// Zero-based position of the row in the submitted batch.
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Default, serde::Serialize)]
pub struct IngestReport {
    pub inserted_ids: Vec<i64>,
    pub failures: Vec<RowFailure>,
}

fn entity_name(table: Table) -> &'static str {
    match table {
        Table::Products => "product",
        Table::Stores => "store",
        Table::Categories => "category",
    }
}

/// Coerce every row and split the batch: rows carrying their natural keys
/// (paired with their batch position) versus per-row failure entries.
fn triage_rows(
    schema: &TableSchema,
    raw_rows: &[Map<String, Value>],
) -> (Vec<(usize, TypedRow)>, Vec<RowFailure>) {
    let mut accepted = Vec::with_capacity(raw_rows.len());
    let mut failures = Vec::new();
    for (index, raw) in raw_rows.iter().enumerate() {
        let row = coerce_row(raw, schema);
        let missing = row.missing_required(schema);
        if missing.is_empty() {
            accepted.push((index, row));
        } else {
            failures.push(RowFailure {
                index,
                reason: format!("missing required field(s): {}", missing.join(", ")),
            });
        }
    }
    (accepted, failures)
}

/// How an attempt is recorded: all rows in is success, none in (with
/// failures) is failed, anything between is partial.
fn batch_status(inserted: usize, failed: usize) -> UploadStatus {
    if failed == 0 {
        UploadStatus::Success
    } else if inserted == 0 {
        UploadStatus::Failed
    } else {
        UploadStatus::Partial
    }
}

/// Ingest a batch of loose rows into one table.
///
/// Each row is coerced independently; a row missing its natural-key fields
/// becomes a failure entry and the batch continues. Product breadcrumbs are
/// resolved into the category taxonomy sequentially (bounding duplicate-node
/// races to the storage upsert), and a resolution failure never blocks the
/// row itself. The audit collaborator is always told how the attempt ended.
pub async fn ingest(
    db: &Db,
    table: Table,
    raw_rows: &[Map<String, Value>],
) -> Result<IngestReport, Error> {
    let schema = table.schema();
    let (accepted, failures) = triage_rows(schema, raw_rows);
    let mut report = IngestReport {
        inserted_ids: Vec::new(),
        failures,
    };

    if table == Table::Products {
        for (index, _) in &accepted {
            if let Some(breadcrumb) = raw_rows[*index].get("category_tree").and_then(Value::as_str)
            {
                if let Err(e) = category::resolve_path(db, breadcrumb).await {
                    // Taxonomy is best-effort enrichment; the product row
                    // still goes in.
                    warn!(row = *index, error = %e, "breadcrumb resolution failed");
                }
            }
        }
    }

    let rows: Vec<TypedRow> = accepted.into_iter().map(|(_, row)| row).collect();
    let time_added = Utc::now();
    for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
        match insert_chunk(db, table, chunk, time_added).await {
            Ok(mut ids) => report.inserted_ids.append(&mut ids),
            Err(e) => {
                // Abort on storage error; the audit entry records how far we got.
                audit::record(
                    db,
                    entity_name(table),
                    report.inserted_ids.len() as i64,
                    UploadStatus::Failed,
                    Some(&e.to_string()),
                )
                .await?;
                return Err(e);
            }
        }
    }

    let status = batch_status(report.inserted_ids.len(), report.failures.len());
    let error_message = (!report.failures.is_empty())
        .then(|| format!("{} row(s) failed coercion", report.failures.len()));
    audit::record(
        db,
        entity_name(table),
        report.inserted_ids.len() as i64,
        status,
        error_message.as_deref(),
    )
    .await?;

    info!(
        table = %table,
        inserted = report.inserted_ids.len(),
        failed = report.failures.len(),
        "batch ingested"
    );
    Ok(report)
}

/// One bulk INSERT round-trip for up to [`INSERT_CHUNK_ROWS`] rows.
async fn insert_chunk(
    db: &Db,
    table: Table,
    rows: &[TypedRow],
    time_added: chrono::DateTime<Utc>,
) -> Result<Vec<i64>, Error> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let schema = table.schema();

    let columns: Vec<&str> = schema.fields.iter().map(|fs| fs.name).collect();
    let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(format!(
        "INSERT INTO {} ({}, time_added) ",
        table.name(),
        columns.join(", ")
    ));
    qb.push_values(rows, |mut b, row| {
        for (spec, scalar) in schema.fields.iter().zip(&row.values) {
            push_scalar(&mut b, spec.kind, scalar);
        }
        b.push_bind(time_added);
    });
    qb.push(" RETURNING id");

    let rows = qb.build().persistent(false).fetch_all(&db.pool).await?;
    let mut ids = Vec::with_capacity(rows.len());
    for row in rows {
        ids.push(row.try_get::<i64, _>(0)?);
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PRODUCTS;
    use serde_json::json;

    fn product_row(id: &str) -> Map<String, Value> {
        json!({ "product_id": id, "product_title": "Mug" })
            .as_object()
            .unwrap()
            .clone()
    }

    #[test]
    fn one_bad_row_fails_alone_and_keeps_its_index() {
        let mut rows: Vec<Map<String, Value>> =
            (0..5).map(|i| product_row(&format!("p-{i}"))).collect();
        rows[2].insert("product_id".into(), json!(""));

        let (accepted, failures) = triage_rows(&PRODUCTS, &rows);
        assert_eq!(accepted.len(), 4);
        assert_eq!(
            accepted.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            vec![0, 1, 3, 4]
        );
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 2);
        assert!(failures[0].reason.contains("product_id"));
    }

    #[test]
    fn row_missing_every_natural_key_names_them_all() {
        let rows = vec![product_row("p-1"), Map::new()];
        let (accepted, failures) = triage_rows(&PRODUCTS, &rows);
        assert_eq!(accepted.len(), 1);
        assert!(failures[0].reason.contains("product_id"));
        assert!(failures[0].reason.contains("product_title"));
    }

    #[test]
    fn status_reflects_partial_and_total_failure() {
        assert_eq!(batch_status(5, 0), UploadStatus::Success);
        assert_eq!(batch_status(4, 1), UploadStatus::Partial);
        assert_eq!(batch_status(0, 3), UploadStatus::Failed);
        assert_eq!(batch_status(0, 0), UploadStatus::Success);
    }
}
