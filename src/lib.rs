pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod server;
pub mod services;
