// API server implementation using actix-web

use crate::api::{auth, routes};
use crate::db::Db;
use actix_cors::Cors;
use actix_web::http::header;
use actix_web::middleware::{Compress, Logger};
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use std::env;
use std::time::Instant;

/// Secret shared between the auth middleware and the login handler.
#[derive(Clone)]
pub struct TokenSecret(pub String);

/// Process start instant, recorded once so the health endpoint reports real
/// uptime.
#[derive(Clone, Copy)]
pub struct StartTime(pub Instant);

impl StartTime {
    pub fn uptime_seconds(&self) -> u64 {
        self.0.elapsed().as_secs()
    }
}

pub struct ApiServer {
    pub host: String,
    pub port: u16,
    pub token_secret: String,
    pub allowed_origins: String,
}

fn allowed_origin_list(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// CORS for the dashboard frontend: the surface is GET/POST plus the user
/// update PUT, with the bearer token arriving in the Authorization header.
fn cors(allowed_origins: &str) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::ACCEPT,
            header::CONTENT_TYPE,
        ])
        .max_age(3600);
    for origin in allowed_origin_list(allowed_origins) {
        cors = cors.allowed_origin(origin);
    }
    cors
}

impl ApiServer {
    /// Create server from environment variables
    pub fn from_env() -> Result<Self> {
        crate::util::env::init_env();

        let host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("API_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .context("Invalid API_PORT")?;

        let token_secret =
            env::var("TOKEN_SECRET").context("TOKEN_SECRET environment variable is required")?;

        let allowed_origins =
            env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Self {
            host,
            port,
            token_secret,
            allowed_origins,
        })
    }

    /// Start the HTTP server
    pub async fn run(self, db: Db) -> Result<()> {
        let bind_addr = format!("{}:{}", self.host, self.port);

        tracing::info!(
            host = %self.host,
            port = %self.port,
            "Starting marketdash API server"
        );

        let db_data = web::Data::new(db);
        let started = StartTime(Instant::now());
        let token_secret = self.token_secret.clone();
        let allowed_origins = self.allowed_origins.clone();

        HttpServer::new(move || {
            App::new()
                .app_data(db_data.clone())
                .app_data(web::Data::new(TokenSecret(token_secret.clone())))
                .app_data(web::Data::new(started))
                .wrap(Logger::default())
                .wrap(Compress::default())
                .wrap(cors(&allowed_origins))
                .wrap(auth::Auth::new(token_secret.clone()))
                .configure(routes::configure_routes)
        })
        .bind(&bind_addr)
        .with_context(|| format!("Failed to bind to {}", bind_addr))?
        .run()
        .await
        .context("HTTP server error")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn origin_list_trims_and_drops_empty_entries() {
        assert_eq!(
            allowed_origin_list("http://a.example, http://b.example ,"),
            vec!["http://a.example", "http://b.example"]
        );
        assert!(allowed_origin_list("  ").is_empty());
    }

    #[test]
    fn uptime_counts_from_recorded_start() {
        let earlier = Instant::now() - Duration::from_secs(3);
        assert!(StartTime(earlier).uptime_seconds() >= 3);
        assert!(StartTime(Instant::now()).uptime_seconds() < 2);
    }
}
