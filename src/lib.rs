pub mod api;
pub mod audit;
pub mod category;
pub mod coerce;
pub mod db;
pub mod error;
pub mod filter;
pub mod history;
pub mod ingest;
pub mod query;
pub mod schema;
pub mod users;

pub mod util {
    pub mod env;
}
