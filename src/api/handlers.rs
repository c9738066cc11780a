// HTTP request handlers for API endpoints

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use serde_json::{Map, Value};

use crate::api::models::*;
use crate::api::server::{StartTime, TokenSecret};
use crate::audit;
use crate::category;
use crate::db::Db;
use crate::error::Error;
use crate::history;
use crate::ingest;
use crate::query;
use crate::schema::Table;
use crate::users::{self, Claims};

fn claims(req: &HttpRequest) -> Result<Claims, Error> {
    req.extensions().get::<Claims>().cloned().ok_or(Error::Unauthorized)
}

fn require_admin(req: &HttpRequest) -> Result<Claims, Error> {
    let claims = claims(req)?;
    if !claims.is_admin {
        return Err(Error::Unauthorized);
    }
    Ok(claims)
}

/// Health check endpoint
pub async fn health_check(
    db: web::Data<Db>,
    started: web::Data<StartTime>,
) -> Result<HttpResponse, Error> {
    let db_status = match sqlx::query_scalar::<_, bool>("SELECT true")
        .fetch_one(&db.pool)
        .await
    {
        Ok(_) => "connected",
        Err(_) => "disconnected",
    };

    Ok(HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        database: db_status.to_string(),
        uptime_seconds: started.uptime_seconds(),
    }))
}

pub async fn login(
    payload: web::Json<LoginRequest>,
    db: web::Data<Db>,
    secret: web::Data<TokenSecret>,
) -> Result<HttpResponse, Error> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(Error::Validation("email and password are required".into()));
    }

    let user = users::find_by_email(&db, &payload.email)
        .await?
        .ok_or(Error::Unauthorized)?;
    if !users::verify_password(&payload.password, &user.password) {
        return Err(Error::Unauthorized);
    }

    let token = users::issue_token(user.id, user.is_admin, &secret.0)?;
    tracing::info!(email = %payload.email, "login successful");
    Ok(HttpResponse::Ok().json(TokenResponse { token }))
}

pub async fn signup(
    payload: web::Json<SignupRequest>,
    db: web::Data<Db>,
) -> Result<HttpResponse, Error> {
    let id = users::create(
        &db,
        &payload.email,
        &payload.password,
        payload.name.as_deref(),
        payload.is_admin,
    )
    .await?;
    tracing::info!(user_id = id, "user created");
    Ok(HttpResponse::Ok().json(serde_json::json!({ "id": id })))
}

pub async fn get_user(req: HttpRequest, db: web::Data<Db>) -> Result<HttpResponse, Error> {
    let claims = claims(&req)?;
    let user = users::find_by_id(&db, claims.sub)
        .await?
        .ok_or(Error::Unauthorized)?;
    Ok(HttpResponse::Ok().json(user))
}

async fn run_batch(
    req: &HttpRequest,
    db: &Db,
    table: Table,
    rows: Vec<Map<String, Value>>,
) -> Result<HttpResponse, Error> {
    require_admin(req)?;
    let report = ingest::ingest(db, table, &rows).await?;
    Ok(HttpResponse::Ok().json(BatchResponse {
        message: format!("{} rows added", report.inserted_ids.len()),
        count: report.inserted_ids.len(),
        ids: report.inserted_ids,
        failures: report.failures,
    }))
}

pub async fn add_product_batch(
    req: HttpRequest,
    payload: web::Json<Vec<Map<String, Value>>>,
    db: web::Data<Db>,
) -> Result<HttpResponse, Error> {
    run_batch(&req, &db, Table::Products, payload.into_inner()).await
}

pub async fn add_store_batch(
    req: HttpRequest,
    payload: web::Json<Vec<Map<String, Value>>>,
    db: web::Data<Db>,
) -> Result<HttpResponse, Error> {
    run_batch(&req, &db, Table::Stores, payload.into_inner()).await
}

pub async fn add_category_batch(
    req: HttpRequest,
    payload: web::Json<Vec<Map<String, Value>>>,
    db: web::Data<Db>,
) -> Result<HttpResponse, Error> {
    run_batch(&req, &db, Table::Categories, payload.into_inner()).await
}

pub async fn get_rows(
    payload: web::Json<RowsRequest>,
    db: web::Data<Db>,
) -> Result<HttpResponse, Error> {
    let table = Table::parse(&payload.table)?;
    let page = query::page(
        &db,
        table,
        payload.start.max(0),
        payload.count.max(0),
        &payload.filters,
        payload.sort.as_ref(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(RowsResponse {
        data: page.rows,
        total_count: page.total_count,
    }))
}

pub async fn export_data(
    payload: web::Json<ExportRequest>,
    db: web::Data<Db>,
) -> Result<HttpResponse, Error> {
    let table = Table::parse(&payload.table)?;
    let rows = query::export_all(&db, table, &payload.filters, payload.sort.as_ref()).await?;
    Ok(HttpResponse::Ok().json(rows))
}

pub async fn filter_options(
    path: web::Path<String>,
    db: web::Data<Db>,
) -> Result<HttpResponse, Error> {
    let table = Table::parse(&path.into_inner())?;
    let options = query::filter_options(&db, table).await?;
    Ok(HttpResponse::Ok().json(options))
}

pub async fn category_roots(db: web::Data<Db>) -> Result<HttpResponse, Error> {
    let nodes = category::children_of(&db, None).await?;
    Ok(HttpResponse::Ok().json(nodes))
}

pub async fn category_children(
    path: web::Path<i64>,
    db: web::Data<Db>,
) -> Result<HttpResponse, Error> {
    let nodes = category::children_of(&db, Some(path.into_inner())).await?;
    Ok(HttpResponse::Ok().json(nodes))
}

pub async fn product_history(
    path: web::Path<(String, String)>,
    db: web::Data<Db>,
) -> Result<HttpResponse, Error> {
    let (product_id, field) = path.into_inner();
    let series = history::product_history(&db, &product_id, &field).await?;
    Ok(HttpResponse::Ok().json(series))
}

pub async fn store_history(
    path: web::Path<(String, String)>,
    db: web::Data<Db>,
) -> Result<HttpResponse, Error> {
    let (store_name, field) = path.into_inner();
    let series = history::store_history(&db, &store_name, &field).await?;
    Ok(HttpResponse::Ok().json(series))
}

pub async fn upload_history(db: web::Data<Db>) -> Result<HttpResponse, Error> {
    let entries = audit::list(&db, 100).await?;
    Ok(HttpResponse::Ok().json(entries))
}

pub async fn list_users(req: HttpRequest, db: web::Data<Db>) -> Result<HttpResponse, Error> {
    require_admin(&req)?;
    let all = users::list(&db).await?;
    Ok(HttpResponse::Ok().json(all))
}

pub async fn update_user(
    req: HttpRequest,
    path: web::Path<i64>,
    payload: web::Json<UserUpdateRequest>,
    db: web::Data<Db>,
) -> Result<HttpResponse, Error> {
    require_admin(&req)?;
    let updated = users::update(
        &db,
        path.into_inner(),
        &payload.email,
        payload.name.as_deref(),
        payload.is_admin,
    )
    .await?
    .ok_or_else(|| Error::Validation("no such user".into()))?;
    Ok(HttpResponse::Ok().json(updated))
}
