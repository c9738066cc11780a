//! Schema-driven compilation of a request filter bag into a parameterized
//! WHERE fragment.
//!
//! The same compiled fragment backs the paginated fetch, the count query and
//! the export query, so all three always see identical filtering. Column and
//! table identifiers come exclusively from [`TableSchema`] descriptors;
//! request input only ever lands in the positional parameter list.

use serde_json::{Map, Value};

use crate::coerce::{coerce_value, Scalar};
use crate::schema::{FilterShape, TableSchema};

/// Filter key that expands into the free-text OR-group.
pub const SEARCH_KEY: &str = "search";

/// A WHERE fragment plus its positional parameters, `$1`-based and in
/// placeholder order. Callers appending their own placeholders (LIMIT/OFFSET)
/// continue numbering at `params.len() + 1`.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    pub where_sql: String,
    pub params: Vec<Scalar>,
}

impl CompiledFilter {
    fn unfiltered() -> Self {
        Self {
            where_sql: "TRUE".to_string(),
            params: Vec::new(),
        }
    }
}

/// Compile a filter bag against a table schema.
///
/// Unrecognized keys are ignored (forward-compatible parsing) and a bag that
/// produces zero clauses compiles to the unconditionally-true predicate.
/// Clause order follows the schema's filter declaration order, with the
/// free-text group last, so the output is deterministic for a given input.
pub fn compile(filters: &Map<String, Value>, schema: &TableSchema) -> CompiledFilter {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Scalar> = Vec::new();

    for flt in schema.filters {
        let kind = schema
            .field(flt.column)
            .map(|fs| fs.kind)
            .expect("filterable column is a declared field");

        match flt.shape {
            FilterShape::Range => {
                // Both bounds independently optional. Bounds that do not
                // coerce to the column's kind are dropped here instead of
                // being shipped to Postgres as malformed text.
                for (suffix, op) in [("_from", ">="), ("_to", "<=")] {
                    let key = format!("{}{}", flt.key, suffix);
                    let value = coerce_value(filters.get(&key), kind);
                    if !value.is_null() {
                        params.push(value);
                        clauses.push(format!("{} {} ${}", flt.column, op, params.len()));
                    }
                }
            }
            FilterShape::Equality => {
                if let Some(Value::String(s)) = filters.get(flt.key) {
                    if !s.trim().is_empty() {
                        params.push(Scalar::Text(s.clone()));
                        clauses.push(format!("{} = ${}", flt.column, params.len()));
                    }
                }
            }
            FilterShape::AnyOf => {
                if let Some(Value::Array(items)) = filters.get(flt.key) {
                    let values: Vec<String> = items
                        .iter()
                        .filter_map(|v| v.as_str())
                        .map(str::to_string)
                        .collect();
                    if !values.is_empty() {
                        params.push(Scalar::TextArray(values));
                        clauses.push(format!("{} = ANY(${})", flt.column, params.len()));
                    }
                }
            }
            FilterShape::Flag => {
                // Absence, null and the empty string all mean "no clause",
                // matching what `apply_filter_change` treats as removal; the
                // closed truthy vocabulary applies to real values.
                match filters.get(flt.key) {
                    None | Some(Value::Null) => {}
                    Some(Value::String(s)) if s.trim().is_empty() => {}
                    Some(value) => {
                        if let Scalar::Bool(b) = coerce_value(Some(value), kind) {
                            params.push(Scalar::Bool(b));
                            clauses.push(format!("{} = ${}", flt.column, params.len()));
                        }
                    }
                }
            }
        }
    }

    // Free-text search: one shared wildcarded parameter reused across every
    // OR branch, bound once.
    if let Some(Value::String(needle)) = filters.get(SEARCH_KEY) {
        let needle = needle.trim();
        if !needle.is_empty() && !schema.search_columns.is_empty() {
            params.push(Scalar::Text(format!("%{}%", needle)));
            let placeholder = params.len();
            let branches: Vec<String> = schema
                .search_columns
                .iter()
                .map(|col| format!("{} ILIKE ${}", col, placeholder))
                .collect();
            clauses.push(format!("({})", branches.join(" OR ")));
        }
    }

    if clauses.is_empty() {
        CompiledFilter::unfiltered()
    } else {
        CompiledFilter {
            where_sql: clauses.join(" AND "),
            params,
        }
    }
}

/// Immutable filter-state update: returns the bag with `key` set to `value`,
/// or removed when the value is null / empty. The reducer behind the
/// browsing UI's filter accumulation.
pub fn apply_filter_change(state: &Map<String, Value>, key: &str, value: Value) -> Map<String, Value> {
    let mut next = state.clone();
    let clears = match &value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    };
    if clears {
        next.remove(key);
    } else {
        next.insert(key.to_string(), value);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{PRODUCTS, STORES};
    use serde_json::json;

    fn bag(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn empty_bag_compiles_to_true() {
        let compiled = compile(&Map::new(), &PRODUCTS);
        assert_eq!(compiled.where_sql, "TRUE");
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn range_bounds_emit_in_order() {
        let compiled = compile(
            &bag(json!({"price_usd_from": 10, "price_usd_to": 50})),
            &PRODUCTS,
        );
        assert_eq!(compiled.where_sql, "price_usd >= $1 AND price_usd <= $2");
        assert_eq!(
            compiled.params,
            vec![Scalar::Float(10.0), Scalar::Float(50.0)]
        );
    }

    #[test]
    fn range_bounds_are_independently_optional() {
        let compiled = compile(&bag(json!({"price_usd_to": "50"})), &PRODUCTS);
        assert_eq!(compiled.where_sql, "price_usd <= $1");
        assert_eq!(compiled.params, vec![Scalar::Float(50.0)]);
    }

    #[test]
    fn malformed_range_bound_is_dropped() {
        let compiled = compile(&bag(json!({"price_usd_from": "cheap"})), &PRODUCTS);
        assert_eq!(compiled.where_sql, "TRUE");
    }

    #[test]
    fn set_membership_binds_one_array_param() {
        let compiled = compile(&bag(json!({"categories": ["Jewelry", "Art"]})), &PRODUCTS);
        assert_eq!(compiled.where_sql, "category_name = ANY($1)");
        assert_eq!(
            compiled.params,
            vec![Scalar::TextArray(vec!["Jewelry".into(), "Art".into()])]
        );
    }

    #[test]
    fn flag_absent_emits_nothing_but_false_binds() {
        let absent = compile(&Map::new(), &PRODUCTS);
        assert_eq!(absent.where_sql, "TRUE");

        let explicit = compile(&bag(json!({"star_seller": false})), &PRODUCTS);
        assert_eq!(explicit.where_sql, "star_seller = $1");
        assert_eq!(explicit.params, vec![Scalar::Bool(false)]);

        let truthy = compile(&bag(json!({"star_seller": "Y"})), &PRODUCTS);
        assert_eq!(truthy.params, vec![Scalar::Bool(true)]);
    }

    #[test]
    fn cleared_flag_value_is_not_an_explicit_false() {
        // An empty string is what clearing the control leaves behind; it must
        // compile like an absent key, not like `= false`.
        for cleared in [json!({"star_seller": ""}), json!({"star_seller": null})] {
            let compiled = compile(&bag(cleared), &PRODUCTS);
            assert_eq!(compiled.where_sql, "TRUE");
            assert!(compiled.params.is_empty());
        }

        let explicit = compile(&bag(json!({"star_seller": "N"})), &PRODUCTS);
        assert_eq!(explicit.params, vec![Scalar::Bool(false)]);
    }

    #[test]
    fn search_reuses_one_placeholder_across_branches() {
        let compiled = compile(&bag(json!({"search": "mug"})), &STORES);
        assert_eq!(compiled.params, vec![Scalar::Text("%mug%".into())]);
        assert_eq!(compiled.where_sql.matches("$1").count(), STORES.search_columns.len());
        assert!(compiled.where_sql.contains("store_name ILIKE $1"));
        assert!(!compiled.where_sql.contains("$2"));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let compiled = compile(
            &bag(json!({"bogus": 1, "price_usd_from": 5, "also_bogus": "x"})),
            &PRODUCTS,
        );
        assert_eq!(compiled.where_sql, "price_usd >= $1");
    }

    #[test]
    fn clause_order_is_schema_order_not_bag_order() {
        let a = compile(
            &bag(json!({"brand": "Acme", "price_usd_from": 5})),
            &PRODUCTS,
        );
        let b = compile(
            &bag(json!({"price_usd_from": 5, "brand": "Acme"})),
            &PRODUCTS,
        );
        assert_eq!(a.where_sql, b.where_sql);
        assert_eq!(a.params, b.params);
        assert_eq!(a.where_sql, "price_usd >= $1 AND brand = $2");
    }

    #[test]
    fn filter_change_reducer_is_immutable() {
        let state = Map::new();
        let with_brand = apply_filter_change(&state, "brand", json!("Acme"));
        assert!(state.is_empty());
        assert_eq!(with_brand.get("brand"), Some(&json!("Acme")));

        let cleared = apply_filter_change(&with_brand, "brand", json!(""));
        assert!(cleared.is_empty());
        assert_eq!(with_brand.len(), 1);
    }
}
