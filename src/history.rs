//! Field history across a record's append-only snapshots.
//!
//! Because ingestion never overwrites, every upload of the same natural key
//! adds a row; a history query is just the chronological projection of one
//! field over those rows. Fields are drawn from an explicit allow-list per
//! table so the column name never comes from the request.

use serde_json::{Map, Value};
use sqlx::Row;

use crate::db::Db;
use crate::error::Error;
use crate::query;
use crate::schema::{Table, TableSchema};

/// Product fields whose history may be requested (keyed by `product_id`).
pub const PRODUCT_HISTORY_FIELDS: &[&str] = &[
    "price_usd",
    "sale_price_usd",
    "product_reviews",
    "ratingvalue",
    "number_of_favourties",
    "last_24_hours",
    "number_in_basket",
    "store_reviews",
    "store_sales",
    "store_admirers",
    "number_of_store_products",
];

/// Store fields whose history may be requested (keyed by `store_name`).
pub const STORE_HISTORY_FIELDS: &[&str] = &[
    "store_reviews",
    "store_review_score",
    "store_sales",
    "store_admirers",
    "number_of_store_products",
];

fn checked_field(
    schema: &TableSchema,
    allowed: &[&str],
    field: &str,
) -> Result<&'static str, Error> {
    // Map the request string back onto the schema's static name so the SQL
    // below only ever embeds descriptor-owned identifiers.
    allowed
        .iter()
        .find(|f| **f == field)
        .and_then(|f| schema.field(f).map(|fs| fs.name))
        .ok_or_else(|| Error::InvalidHistoryField(field.to_string()))
}

async fn field_series(
    db: &Db,
    table: Table,
    key_column: &'static str,
    key: &str,
    field: &'static str,
) -> Result<Vec<Value>, Error> {
    let schema = table.schema();
    let kind = schema
        .field(field)
        .expect("allow-listed history field is declared")
        .kind;

    let sql = format!(
        "SELECT time_added, {field} FROM {table} WHERE {key_column} = $1 ORDER BY time_added ASC",
        field = field,
        table = table.name(),
        key_column = key_column
    );
    let rows = sqlx::query(&sql).bind(key).fetch_all(&db.pool).await?;

    rows.iter()
        .map(|row| {
            let mut point = Map::new();
            point.insert(
                "time_added".to_string(),
                Value::from(
                    row.try_get::<chrono::DateTime<chrono::Utc>, _>("time_added")
                        .map(|t| t.to_rfc3339())?,
                ),
            );
            point.insert(field.to_string(), query::decode_field(row, field, kind)?);
            Ok(Value::Object(point))
        })
        .collect()
}

/// Chronological values of one product field across all snapshots of a
/// product id.
pub async fn product_history(db: &Db, product_id: &str, field: &str) -> Result<Vec<Value>, Error> {
    let field = checked_field(Table::Products.schema(), PRODUCT_HISTORY_FIELDS, field)?;
    field_series(db, Table::Products, "product_id", product_id, field).await
}

/// Chronological values of one store field across all snapshots of a store
/// name.
pub async fn store_history(db: &Db, store_name: &str, field: &str) -> Result<Vec<Value>, Error> {
    let field = checked_field(Table::Stores.schema(), STORE_HISTORY_FIELDS, field)?;
    field_series(db, Table::Stores, "store_name", store_name, field).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_listed_fields_resolve() {
        let schema = Table::Products.schema();
        assert_eq!(
            checked_field(schema, PRODUCT_HISTORY_FIELDS, "price_usd").unwrap(),
            "price_usd"
        );
    }

    #[test]
    fn off_list_fields_are_rejected() {
        let schema = Table::Products.schema();
        for bad in ["password", "pjson", "price_usd; --"] {
            assert!(matches!(
                checked_field(schema, PRODUCT_HISTORY_FIELDS, bad),
                Err(Error::InvalidHistoryField(_))
            ));
        }
    }

    #[test]
    fn allow_lists_only_name_declared_fields() {
        for field in PRODUCT_HISTORY_FIELDS {
            assert!(Table::Products.schema().field(field).is_some());
        }
        for field in STORE_HISTORY_FIELDS {
            assert!(Table::Stores.schema().field(field).is_some());
        }
    }
}
