//! Category taxonomy built incrementally from breadcrumb strings.
//!
//! Nodes form a forest keyed by (name, parent, depth) and are create-only.
//! Deduplication is enforced at the storage layer: a unique index over
//! `(name, COALESCE(parent_id, 0), depth)` plus insert-or-fetch-on-conflict,
//! so concurrent ingestion of the same unseen path converges on one node
//! chain instead of racing check-then-insert in application code. The
//! COALESCE sentinel makes root-level siblings compare against each other
//! rather than against arbitrary NULLs.

use serde::Serialize;

use crate::db::Db;
use crate::error::Error;

/// Separator tokens a breadcrumb may use; all are normalized to one split.
const SEPARATORS: [char; 2] = ['>', '/'];

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CategoryNode {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub depth: i32,
}

/// Split a breadcrumb into ordered, trimmed, non-empty segments
/// (root first).
pub fn split_breadcrumb(raw: &str) -> Vec<String> {
    raw.split(SEPARATORS)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Walk (and lazily create) the node chain for one breadcrumb, returning the
/// leaf node id. A breadcrumb that is empty after trimming is a no-op.
pub async fn resolve_path(db: &Db, breadcrumb: &str) -> Result<Option<i64>, Error> {
    let segments = split_breadcrumb(breadcrumb);
    if segments.is_empty() {
        return Ok(None);
    }

    let mut parent: Option<i64> = None;
    for (depth, name) in segments.iter().enumerate() {
        // The no-op DO UPDATE makes RETURNING yield the existing row's id on
        // conflict, so insert and fetch are one atomic round-trip.
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO category_nodes (name, parent_id, depth)
             VALUES ($1, $2, $3)
             ON CONFLICT (name, COALESCE(parent_id, 0), depth)
             DO UPDATE SET name = EXCLUDED.name
             RETURNING id",
        )
        .bind(name)
        .bind(parent)
        .bind(depth as i32)
        .fetch_one(&db.pool)
        .await?;
        parent = Some(id);
    }
    Ok(parent)
}

/// Immediate children of a node (root nodes for `None`), ordered by name.
pub async fn children_of(db: &Db, parent: Option<i64>) -> Result<Vec<CategoryNode>, Error> {
    let nodes = sqlx::query_as::<_, CategoryNode>(
        "SELECT id, name, parent_id, depth
         FROM category_nodes
         WHERE parent_id IS NOT DISTINCT FROM $1
         ORDER BY name",
    )
    .bind(parent)
    .fetch_all(&db.pool)
    .await?;
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_both_separators() {
        assert_eq!(
            split_breadcrumb("Home > Kitchen > Mugs"),
            vec!["Home", "Kitchen", "Mugs"]
        );
        assert_eq!(
            split_breadcrumb("Home / Kitchen / Mugs"),
            vec!["Home", "Kitchen", "Mugs"]
        );
        assert_eq!(split_breadcrumb("A>B/C"), vec!["A", "B", "C"]);
    }

    #[test]
    fn drops_empty_segments() {
        assert_eq!(split_breadcrumb("A >> B > "), vec!["A", "B"]);
        assert_eq!(split_breadcrumb(" > / "), Vec::<String>::new());
        assert_eq!(split_breadcrumb(""), Vec::<String>::new());
    }
}
