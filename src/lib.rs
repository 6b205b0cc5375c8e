pub mod api;
pub mod config;
pub mod handlers;
pub mod models;
pub mod provision;
pub mod routes;
pub mod templates;
