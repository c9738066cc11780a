// API route configuration

use crate::api::handlers;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check and auth (no token required; see auth::PUBLIC_PATHS)
        .route("/health", web::get().to(handlers::health_check))
        .route("/", web::get().to(handlers::health_check))
        .route("/login", web::post().to(handlers::login))
        .route("/signup", web::post().to(handlers::signup))
        .route("/get-user", web::get().to(handlers::get_user))
        // Batch ingestion (admin only)
        .route(
            "/add-product-batch",
            web::post().to(handlers::add_product_batch),
        )
        .route("/add-store-batch", web::post().to(handlers::add_store_batch))
        .route(
            "/add-category-batch",
            web::post().to(handlers::add_category_batch),
        )
        // Browsing and export
        .route("/get-rows", web::post().to(handlers::get_rows))
        .route("/export-data", web::post().to(handlers::export_data))
        .route(
            "/filter-options/{table}",
            web::get().to(handlers::filter_options),
        )
        // Category taxonomy
        .route(
            "/category-children",
            web::get().to(handlers::category_roots),
        )
        .route(
            "/category-children/{parent_id}",
            web::get().to(handlers::category_children),
        )
        // Field history
        .route(
            "/product-history/{product_id}/{field}",
            web::get().to(handlers::product_history),
        )
        .route(
            "/store-history/{store_name}/{field}",
            web::get().to(handlers::store_history),
        )
        // Audit log
        .route("/upload-history", web::get().to(handlers::upload_history))
        // User management (admin only)
        .route("/users", web::get().to(handlers::list_users))
        .route("/users/{id}", web::put().to(handlers::update_user));
}
