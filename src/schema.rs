//! Static schema descriptors for the browsable tables.
//!
//! Every piece of SQL text in this crate is assembled from these descriptors,
//! never from request input. A table name arriving over the wire is resolved
//! through [`Table::parse`] (the allow-list) and everything downstream works
//! with `&'static str` column names declared here.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The closed set of tables dynamic SQL may ever target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Products,
    Stores,
    Categories,
}

impl Table {
    /// Resolve a request-supplied table name, rejecting anything off-list.
    pub fn parse(name: &str) -> Result<Self, Error> {
        match name {
            "products" => Ok(Table::Products),
            "stores" => Ok(Table::Stores),
            "categories" => Ok(Table::Categories),
            other => Err(Error::InvalidTable(other.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Table::Products => "products",
            Table::Stores => "stores",
            Table::Categories => "categories",
        }
    }

    pub fn schema(self) -> &'static TableSchema {
        match self {
            Table::Products => &PRODUCTS,
            Table::Stores => &STORES,
            Table::Categories => &CATEGORIES,
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Declared type of one column, driving coercion and row decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Float,
    Boolean,
    Timestamp,
    Text,
    TextArray,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn f(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

/// Which of the filter shapes a declared filter key expands into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterShape {
    /// `{key}_from` / `{key}_to` optional bounds on one column.
    Range,
    /// Exact match on a scalar value.
    Equality,
    /// `column = ANY($n)` against an array-valued filter.
    AnyOf,
    /// Boolean equality, emitted only when the key is present.
    Flag,
}

#[derive(Debug, Clone, Copy)]
pub struct FilterableField {
    /// Key as it appears in the request filter bag.
    pub key: &'static str,
    /// Column the clause targets (may differ from the key).
    pub column: &'static str,
    pub shape: FilterShape,
}

const fn flt(key: &'static str, column: &'static str, shape: FilterShape) -> FilterableField {
    FilterableField { key, column, shape }
}

/// Everything the coercion layer, filter compiler and query service need to
/// know about one table.
#[derive(Debug)]
pub struct TableSchema {
    pub table: Table,
    /// Entity columns, excluding the `id` / `time_added` bookkeeping pair.
    pub fields: &'static [FieldSpec],
    /// Natural-key columns a row must carry to be persisted.
    pub required: &'static [&'static str],
    pub filters: &'static [FilterableField],
    /// Columns the shared free-text `search` key scans.
    pub search_columns: &'static [&'static str],
}

impl TableSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|fs| fs.name == name)
    }

    /// Whether `column` may appear in an ORDER BY for this table.
    pub fn sortable(&self, column: &str) -> bool {
        column == "id" || column == "time_added" || self.field(column).is_some()
    }
}

use FieldKind::*;
use FilterShape::*;

pub static PRODUCTS: TableSchema = TableSchema {
    table: Table::Products,
    fields: &[
        f("time_scraped", Timestamp),
        f("cid", Text),
        f("pjson", Text),
        f("productj", Text),
        f("breadcrumbj", Text),
        f("category_name", Text),
        f("category_tree", Text),
        f("category_url", Text),
        f("product_url", Text),
        f("product_id", Text),
        f("product_id_new", Text),
        f("product_title", Text),
        f("brand", Text),
        f("image", Text),
        f("last_24_hours", Integer),
        f("number_in_basket", Integer),
        f("product_reviews", Integer),
        f("ratingvalue", Integer),
        f("date_of_latest_review", Timestamp),
        f("date_listed", Timestamp),
        f("number_of_favourties", Integer),
        f("related_searches", Text),
        f("star_seller", Boolean),
        f("ad", Boolean),
        f("digital_download", Boolean),
        f("price_usd", Float),
        f("sale_price_usd", Float),
        f("store_reviews", Integer),
        f("store_name", Text),
        f("store_url", Text),
        f("store_country", Text),
        f("on_etsy_since", Timestamp),
        f("store_sales", Integer),
        f("store_admirers", Integer),
        f("number_of_store_products", Integer),
        f("facebook_url", Text),
        f("instagram_url", Text),
        f("pinterest_url", Text),
        f("tiktok_url", Text),
    ],
    required: &["product_id", "product_title"],
    filters: &[
        flt("time_scraped", "time_scraped", Range),
        flt("date_listed", "date_listed", Range),
        flt("price_usd", "price_usd", Range),
        flt("sale_price_usd", "sale_price_usd", Range),
        flt("product_reviews", "product_reviews", Range),
        flt("ratingvalue", "ratingvalue", Range),
        flt("store_reviews", "store_reviews", Range),
        flt("store_sales", "store_sales", Range),
        flt("store_country", "store_country", Equality),
        flt("brand", "brand", Equality),
        flt("category", "category_name", Equality),
        flt("categories", "category_name", AnyOf),
        flt("star_seller", "star_seller", Flag),
        flt("ad", "ad", Flag),
        flt("digital_download", "digital_download", Flag),
    ],
    search_columns: &["product_title", "brand", "store_name", "pjson"],
};

pub static STORES: TableSchema = TableSchema {
    table: Table::Stores,
    fields: &[
        f("store_id", Integer),
        f("store_name", Text),
        f("store_url", Text),
        f("store_sub_title", Text),
        f("welcome_to_our_shop_text", Text),
        f("store_logo_url", Text),
        f("store_description", Text),
        f("most_recent_product_urls", TextArray),
        f("store_country", Text),
        f("star_seller", Boolean),
        f("store_last_updated", Timestamp),
        f("store_reviews", Integer),
        f("store_review_score", Float),
        f("on_etsy_since", Timestamp),
        f("store_sales", Integer),
        f("store_admirers", Integer),
        f("number_of_store_products", Integer),
        f("looking_for_more_urls", TextArray),
        f("facebook_url", Text),
        f("instagram_url", Text),
        f("pinterest_url", Text),
        f("tiktok_url", Text),
    ],
    required: &["store_name", "store_url", "store_country"],
    filters: &[
        flt("on_etsy_since", "on_etsy_since", Range),
        flt("store_last_updated", "store_last_updated", Range),
        flt("store_reviews", "store_reviews", Range),
        flt("store_review_score", "store_review_score", Range),
        flt("store_sales", "store_sales", Range),
        flt("store_admirers", "store_admirers", Range),
        flt("number_of_store_products", "number_of_store_products", Range),
        flt("store_country", "store_country", Equality),
        flt("countries", "store_country", AnyOf),
        flt("star_seller", "star_seller", Flag),
    ],
    search_columns: &["store_name", "store_sub_title", "store_description"],
};

pub static CATEGORIES: TableSchema = TableSchema {
    table: Table::Categories,
    fields: &[
        f("product_id", Text),
        f("search_url", Text),
        f("category_tree", TextArray),
        f("product_url", Text),
        f("product_name", Text),
        f("is_ad", Boolean),
        f("star_seller", Boolean),
        f("store_reviews_number", Integer),
        f("store_reviews_score", Float),
        f("store_name", Text),
        f("store_url", Text),
    ],
    required: &["product_id", "search_url", "product_url"],
    filters: &[
        flt("store_reviews_number", "store_reviews_number", Range),
        flt("store_reviews_score", "store_reviews_score", Range),
        flt("store_name", "store_name", Equality),
        flt("stores", "store_name", AnyOf),
        flt("is_ad", "is_ad", Flag),
        flt("star_seller", "star_seller", Flag),
    ],
    search_columns: &["product_name", "store_name", "search_url"],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_tables() {
        assert_eq!(Table::parse("products").unwrap(), Table::Products);
        assert_eq!(Table::parse("stores").unwrap(), Table::Stores);
        assert_eq!(Table::parse("categories").unwrap(), Table::Categories);
    }

    #[test]
    fn rejects_off_list_tables() {
        assert!(matches!(
            Table::parse("users"),
            Err(Error::InvalidTable(name)) if name == "users"
        ));
        assert!(Table::parse("products; DROP TABLE users").is_err());
    }

    #[test]
    fn filter_columns_are_declared_fields() {
        for schema in [&PRODUCTS, &STORES, &CATEGORIES] {
            for flt in schema.filters {
                assert!(
                    schema.field(flt.column).is_some(),
                    "{} filter {} targets undeclared column {}",
                    schema.table,
                    flt.key,
                    flt.column
                );
            }
            for col in schema.search_columns {
                assert_eq!(schema.field(col).map(|fs| fs.kind), Some(FieldKind::Text));
            }
            for col in schema.required {
                assert!(schema.field(col).is_some());
            }
        }
    }

    #[test]
    fn sortable_covers_bookkeeping_columns() {
        assert!(PRODUCTS.sortable("id"));
        assert!(PRODUCTS.sortable("time_added"));
        assert!(PRODUCTS.sortable("price_usd"));
        assert!(!PRODUCTS.sortable("password"));
    }
}
