//! User accounts: password hashing and bearer-token issuance.
//!
//! Thin plumbing around the admin gate; authorization beyond the
//! `is_admin` boolean is out of scope.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::db::Db;
use crate::error::Error;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserWithPassword {
    pub id: i64,
    pub email: String,
    pub password: String,
    pub is_admin: bool,
}

/// Bearer-token claims: subject user id plus the admin flag the gate checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub is_admin: bool,
    pub exp: i64,
}

const TOKEN_TTL_HOURS: i64 = 24 * 7;
const SALT_LEN: usize = 16;

/// Salted SHA-256, stored as `base64(salt)$hex(digest)`.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    format!("{}${}", B64.encode(salt), digest_hex(&salt, password))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_b64, expected)) = stored.split_once('$') else {
        return false;
    };
    let Ok(salt) = B64.decode(salt_b64) else {
        return false;
    };
    // Fixed-length hex digests; byte-wise compare without early exit.
    let actual = digest_hex(&salt, password);
    actual.len() == expected.len()
        && actual
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn digest_hex(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

pub fn issue_token(user_id: i64, is_admin: bool, secret: &str) -> Result<String, Error> {
    let claims = Claims {
        sub: user_id,
        is_admin,
        exp: (Utc::now() + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| Error::Unauthorized)
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| Error::Unauthorized)
}

pub async fn find_by_email(db: &Db, email: &str) -> Result<Option<UserWithPassword>, Error> {
    let user = sqlx::query_as::<_, UserWithPassword>(
        "SELECT id, email, password, is_admin FROM users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(&db.pool)
    .await?;
    Ok(user)
}

pub async fn find_by_id(db: &Db, id: i64) -> Result<Option<User>, Error> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, email, name, is_admin, created_at FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&db.pool)
    .await?;
    Ok(user)
}

pub async fn create(
    db: &Db,
    email: &str,
    password: &str,
    name: Option<&str>,
    is_admin: bool,
) -> Result<i64, Error> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(Error::Validation("email and password are required".into()));
    }
    if find_by_email(db, email).await?.is_some() {
        return Err(Error::Validation("user with this email already exists".into()));
    }
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO users (email, password, name, is_admin, created_at)
         VALUES ($1, $2, $3, $4, now())
         RETURNING id",
    )
    .bind(email)
    .bind(hash_password(password))
    .bind(name)
    .bind(is_admin)
    .fetch_one(&db.pool)
    .await?;
    Ok(id)
}

pub async fn list(db: &Db) -> Result<Vec<User>, Error> {
    let users = sqlx::query_as::<_, User>(
        "SELECT id, email, name, is_admin, created_at FROM users ORDER BY id",
    )
    .fetch_all(&db.pool)
    .await?;
    Ok(users)
}

pub async fn update(
    db: &Db,
    id: i64,
    email: &str,
    name: Option<&str>,
    is_admin: bool,
) -> Result<Option<User>, Error> {
    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET email = $2, name = $3, is_admin = $4
         WHERE id = $1
         RETURNING id, email, name, is_admin, created_at",
    )
    .bind(id)
    .bind(email)
    .bind(name)
    .bind(is_admin)
    .fetch_optional(&db.pool)
    .await?;
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_round_trips_and_salts() {
        let a = hash_password("hunter2");
        let b = hash_password("hunter2");
        assert_ne!(a, b);
        assert!(verify_password("hunter2", &a));
        assert!(verify_password("hunter2", &b));
        assert!(!verify_password("hunter3", &a));
        assert!(!verify_password("hunter2", "not-a-stored-hash"));
    }

    #[test]
    fn token_round_trips_claims() {
        let token = issue_token(42, true, "secret").unwrap();
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, 42);
        assert!(claims.is_admin);
        assert!(verify_token(&token, "other-secret").is_err());
        assert!(verify_token("garbage", "secret").is_err());
    }
}
