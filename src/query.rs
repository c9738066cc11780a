//! Browsing and export queries over the scraped tables.
//!
//! `page`, `total_count` and `export_all` all consume one [`filter::compile`]
//! output for a given (table, filter-bag) pair, so the page of rows, the
//! total count and an export can never disagree about what matched.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::coerce::Scalar;
use crate::db::{bind_scalar, Db};
use crate::error::Error;
use crate::filter::{self, CompiledFilter};
use crate::schema::{FieldKind, Table, TableSchema};

/// Store columns denormalized onto product rows for display. The join key is
/// the store *name*, which the scrape does not guarantee unique; we join the
/// latest snapshot per name so collisions at least resolve deterministically.
/// A stable store identifier on product rows would remove the ambiguity.
const PRODUCT_STORE_JOIN: &str =
    "LEFT JOIN LATERAL (
        SELECT on_etsy_since AS store_on_etsy_since,
               store_review_score,
               store_description,
               store_logo_url
        FROM stores
        WHERE stores.store_name = p.store_name
        ORDER BY time_added DESC
        LIMIT 1
    ) s ON TRUE";

const PRODUCT_JOIN_COLUMNS: [&str; 4] = [
    "store_on_etsy_since",
    "store_review_score",
    "store_description",
    "store_logo_url",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sort {
    pub column: String,
    pub direction: SortDirection,
}

#[derive(Debug)]
pub struct PageResult {
    pub rows: Vec<Value>,
    pub total_count: i64,
}

/// ORDER BY fragment for an optional sort, defaulting to insertion order.
/// The column must be a declared field; anything else is rejected before SQL
/// is assembled.
fn order_by(schema: &TableSchema, sort: Option<&Sort>) -> Result<String, Error> {
    match sort {
        None => Ok("ORDER BY id".to_string()),
        Some(sort) => {
            if !schema.sortable(&sort.column) {
                return Err(Error::Validation(format!(
                    "cannot sort {} by {}",
                    schema.table, sort.column
                )));
            }
            Ok(format!("ORDER BY {} {}", sort.column, sort.direction.sql()))
        }
    }
}

fn select_clause(table: Table) -> String {
    let schema = table.schema();
    let fields: Vec<String> = schema.fields.iter().map(|fs| fs.name.to_string()).collect();
    match table {
        Table::Products => format!(
            "SELECT p.id, p.time_added, p.{}, s.* FROM products p {}",
            fields.join(", p."),
            PRODUCT_STORE_JOIN
        ),
        _ => format!(
            "SELECT id, time_added, {} FROM {}",
            fields.join(", "),
            table.name()
        ),
    }
}

/// One page of rows plus the total count under the same predicate.
pub async fn page(
    db: &Db,
    table: Table,
    start: i64,
    count: i64,
    filters: &Map<String, Value>,
    sort: Option<&Sort>,
) -> Result<PageResult, Error> {
    let schema = table.schema();
    let compiled = filter::compile(filters, schema);
    let order = order_by(schema, sort)?;

    let sql = format!(
        "{} WHERE {} {} LIMIT ${} OFFSET ${}",
        select_clause(table),
        compiled.where_sql,
        order,
        compiled.params.len() + 1,
        compiled.params.len() + 2,
    );
    let mut query = sqlx::query(&sql);
    for param in &compiled.params {
        query = bind_scalar(query, param);
    }
    let rows = query
        .bind(count)
        .bind(start)
        .fetch_all(&db.pool)
        .await?;

    let total_count = total_count(db, table, &compiled).await?;
    let rows = decode_rows(table, &rows)?;
    Ok(PageResult { rows, total_count })
}

/// Row count under the identical WHERE fragment and parameter list the page
/// query used (minus pagination).
pub async fn total_count(db: &Db, table: Table, compiled: &CompiledFilter) -> Result<i64, Error> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {}",
        table.name(),
        compiled.where_sql
    );
    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    for param in &compiled.params {
        query = match param {
            Scalar::Null => query.bind(None::<String>),
            Scalar::Int(v) => query.bind(*v),
            Scalar::Float(v) => query.bind(*v),
            Scalar::Bool(v) => query.bind(*v),
            Scalar::Timestamp(v) => query.bind(*v),
            Scalar::Text(v) => query.bind(v.clone()),
            Scalar::TextArray(v) => query.bind(v.clone()),
        };
    }
    Ok(query.fetch_one(&db.pool).await?)
}

/// Every matching row, never paginated. Same compiled predicate as `page`.
pub async fn export_all(
    db: &Db,
    table: Table,
    filters: &Map<String, Value>,
    sort: Option<&Sort>,
) -> Result<Vec<Value>, Error> {
    let schema = table.schema();
    let compiled = filter::compile(filters, schema);
    let order = order_by(schema, sort)?;

    let sql = format!(
        "{} WHERE {} {}",
        select_clause(table),
        compiled.where_sql,
        order
    );
    let mut query = sqlx::query(&sql);
    for param in &compiled.params {
        query = bind_scalar(query, param);
    }
    let rows = query.fetch_all(&db.pool).await?;
    decode_rows(table, &rows)
}

/// Distinct values backing the browsing UI's dropdown filters.
#[derive(Debug, Default, serde::Serialize)]
pub struct FilterOptions {
    pub countries: Vec<String>,
    pub categories: Vec<String>,
    pub brands: Vec<String>,
}

pub async fn filter_options(db: &Db, table: Table) -> Result<FilterOptions, Error> {
    async fn distinct(db: &Db, table: Table, column: &str) -> Result<Vec<String>, Error> {
        // Identifiers come from schema descriptors, never from the request.
        let sql = format!(
            "SELECT DISTINCT {col} FROM {table} WHERE {col} IS NOT NULL ORDER BY {col}",
            col = column,
            table = table.name()
        );
        Ok(sqlx::query_scalar::<_, String>(&sql)
            .fetch_all(&db.pool)
            .await?)
    }

    let mut options = FilterOptions::default();
    match table {
        Table::Products => {
            options.countries = distinct(db, table, "store_country").await?;
            options.categories = distinct(db, table, "category_name").await?;
            options.brands = distinct(db, table, "brand").await?;
        }
        Table::Stores => {
            options.countries = distinct(db, table, "store_country").await?;
        }
        Table::Categories => {
            options.brands = distinct(db, table, "store_name").await?;
        }
    }
    Ok(options)
}

fn decode_rows(table: Table, rows: &[PgRow]) -> Result<Vec<Value>, Error> {
    rows.iter().map(|row| decode_row(table, row)).collect()
}

/// Decode one dynamic row into JSON using the schema's declared kinds.
fn decode_row(table: Table, row: &PgRow) -> Result<Value, Error> {
    let schema = table.schema();
    let mut out = Map::new();

    out.insert("id".to_string(), Value::from(row.try_get::<i64, _>("id")?));
    out.insert(
        "time_added".to_string(),
        timestamp_json(row.try_get::<Option<DateTime<Utc>>, _>("time_added")?),
    );
    for spec in schema.fields {
        out.insert(spec.name.to_string(), decode_field(row, spec.name, spec.kind)?);
    }
    if table == Table::Products {
        for col in PRODUCT_JOIN_COLUMNS {
            let kind = if col == "store_on_etsy_since" {
                FieldKind::Timestamp
            } else if col == "store_review_score" {
                FieldKind::Float
            } else {
                FieldKind::Text
            };
            out.insert(col.to_string(), decode_field(row, col, kind)?);
        }
    }
    Ok(Value::Object(out))
}

/// Decode one column by its declared kind. Shared with the history queries.
pub(crate) fn decode_field(row: &PgRow, name: &str, kind: FieldKind) -> Result<Value, Error> {
    let value = match kind {
        FieldKind::Integer => row
            .try_get::<Option<i64>, _>(name)?
            .map(Value::from)
            .unwrap_or(Value::Null),
        FieldKind::Float => row
            .try_get::<Option<f64>, _>(name)?
            .map(Value::from)
            .unwrap_or(Value::Null),
        FieldKind::Boolean => row
            .try_get::<Option<bool>, _>(name)?
            .map(Value::from)
            .unwrap_or(Value::Null),
        FieldKind::Timestamp => timestamp_json(row.try_get::<Option<DateTime<Utc>>, _>(name)?),
        FieldKind::Text => row
            .try_get::<Option<String>, _>(name)?
            .map(Value::from)
            .unwrap_or(Value::Null),
        FieldKind::TextArray => row
            .try_get::<Option<Vec<String>>, _>(name)?
            .map(Value::from)
            .unwrap_or(Value::Null),
    };
    Ok(value)
}

fn timestamp_json(ts: Option<DateTime<Utc>>) -> Value {
    ts.map(|t| Value::from(t.to_rfc3339())).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PRODUCTS;
    use serde_json::json;

    #[test]
    fn default_order_is_insertion_order() {
        assert_eq!(order_by(&PRODUCTS, None).unwrap(), "ORDER BY id");
    }

    #[test]
    fn sort_column_must_be_declared() {
        let sort = Sort {
            column: "price_usd".into(),
            direction: SortDirection::Desc,
        };
        assert_eq!(
            order_by(&PRODUCTS, Some(&sort)).unwrap(),
            "ORDER BY price_usd DESC"
        );

        let bad = Sort {
            column: "price_usd; DROP TABLE products".into(),
            direction: SortDirection::Asc,
        };
        assert!(matches!(
            order_by(&PRODUCTS, Some(&bad)),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn page_and_count_share_one_compiled_predicate() {
        // The count SQL embeds the same WHERE text the page query uses.
        let compiled = filter::compile(
            json!({"price_usd_from": 10, "brand": "Acme"})
                .as_object()
                .unwrap(),
            &PRODUCTS,
        );
        let page_sql = format!(
            "{} WHERE {} ORDER BY id LIMIT $3 OFFSET $4",
            select_clause(Table::Products),
            compiled.where_sql
        );
        let count_sql = format!("SELECT COUNT(*) FROM products WHERE {}", compiled.where_sql);
        assert!(page_sql.contains("price_usd >= $1 AND brand = $2"));
        assert!(count_sql.contains("price_usd >= $1 AND brand = $2"));
    }

    #[test]
    fn sort_direction_parses_lowercase() {
        let sort: Sort = serde_json::from_value(json!({"column": "id", "direction": "desc"})).unwrap();
        assert_eq!(sort.direction, SortDirection::Desc);
    }
}
