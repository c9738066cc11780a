//! Postgres pool wrapper and parameter binding for dynamically assembled
//! queries.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use tracing::{info, instrument};

use crate::coerce::Scalar;
use crate::schema::FieldKind;

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let use_prepared = std::env::var("USE_PREPARED")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("on"))
            .unwrap_or(false);
        let mut connect_options = PgConnectOptions::from_str(database_url)?;

        if database_url.contains("sslmode=require") && !database_url.contains("sslmode=disable") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }

        if !use_prepared {
            // PgBouncer txn mode safe
            connect_options = connect_options.statement_cache_capacity(0);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await?;
        info!("connected to db");

        // Auto-migrate gate (default: OFF); enable with AUTO_MIGRATE=1/true/on.
        let auto_migrate = std::env::var("AUTO_MIGRATE")
            .map(|raw| {
                let v = raw.trim().to_ascii_lowercase();
                matches!(v.as_str(), "1" | "true" | "on" | "yes")
            })
            .unwrap_or(false);
        if auto_migrate {
            info!("running migrations (AUTO_MIGRATE=on)");
            Self::run_migrations(&pool).await?;
        } else {
            info!("AUTO_MIGRATE disabled; skipping migrations");
        }
        Ok(Self { pool })
    }

    /// Lightweight migration runner over `./migrations/NNNN_name.sql`.
    /// Ignores files without a numeric prefix.
    async fn run_migrations(pool: &PgPool) -> Result<()> {
        use std::{collections::HashSet, fs, path::Path};
        let dir = Path::new("./migrations");
        if !dir.exists() {
            return Ok(());
        }
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _sqlx_migrations (
                version BIGINT PRIMARY KEY,
                description TEXT,
                installed_at TIMESTAMPTZ DEFAULT now()
             )",
        )
        .execute(pool)
        .await?;

        let mut applied: HashSet<i64> = HashSet::new();
        for row in sqlx::raw_sql("SELECT version FROM _sqlx_migrations")
            .fetch_all(pool)
            .await?
        {
            applied.insert(row.try_get::<i64, _>(0)?);
        }

        let mut candidates: Vec<(i64, String, std::path::PathBuf)> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(fname) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            if !fname.ends_with(".sql") {
                continue;
            }
            let num_str: String = fname.chars().take_while(|c| c.is_ascii_digit()).collect();
            let Ok(version) = num_str.parse::<i64>() else {
                continue;
            };
            let desc = fname
                .trim_start_matches(&num_str)
                .trim_start_matches('_')
                .trim_end_matches(".sql")
                .to_string();
            candidates.push((version, desc, path));
        }
        candidates.sort_by_key(|(v, _, _)| *v);

        for (version, desc, path) in candidates {
            if applied.contains(&version) {
                continue;
            }
            let sql = fs::read_to_string(&path)?;
            info!(version, file = ?path, "applying migration");
            sqlx::raw_sql(sql.trim()).execute(pool).await?;

            let desc_escaped = desc.replace('\'', "''");
            let stmt = format!(
                "INSERT INTO _sqlx_migrations(version, description) VALUES ({}, '{}')",
                version, desc_escaped
            );
            sqlx::raw_sql(&stmt).execute(pool).await?;
            applied.insert(version);
        }
        Ok(())
    }
}

/// Bind one typed scalar onto a positional query. Parameters must be bound in
/// the same order the compiler emitted their placeholders.
pub fn bind_scalar<'q>(
    query: Query<'q, Postgres, PgArguments>,
    scalar: &Scalar,
) -> Query<'q, Postgres, PgArguments> {
    match scalar {
        Scalar::Null => query.bind(None::<String>),
        Scalar::Int(v) => query.bind(*v),
        Scalar::Float(v) => query.bind(*v),
        Scalar::Bool(v) => query.bind(*v),
        Scalar::Timestamp(v) => query.bind(*v),
        Scalar::Text(v) => query.bind(v.clone()),
        Scalar::TextArray(v) => query.bind(v.clone()),
    }
}

/// Push one scalar into a `QueryBuilder` VALUES tuple. Nulls must be typed by
/// the column kind or Postgres cannot infer the parameter type in a bulk
/// insert.
pub fn push_scalar(
    b: &mut sqlx::query_builder::Separated<'_, '_, Postgres, &'static str>,
    kind: FieldKind,
    scalar: &Scalar,
) {
    match scalar {
        Scalar::Null => match kind {
            FieldKind::Integer => b.push_bind(None::<i64>),
            FieldKind::Float => b.push_bind(None::<f64>),
            FieldKind::Boolean => b.push_bind(None::<bool>),
            FieldKind::Timestamp => b.push_bind(None::<DateTime<Utc>>),
            FieldKind::Text => b.push_bind(None::<String>),
            FieldKind::TextArray => b.push_bind(None::<Vec<String>>),
        },
        Scalar::Int(v) => b.push_bind(*v),
        Scalar::Float(v) => b.push_bind(*v),
        Scalar::Bool(v) => b.push_bind(*v),
        Scalar::Timestamp(v) => b.push_bind(*v),
        Scalar::Text(v) => b.push_bind(v.clone()),
        Scalar::TextArray(v) => b.push_bind(v.clone()),
    };
}
