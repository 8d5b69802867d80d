pub mod auth;
pub mod cart;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod orders;
pub mod routes;
pub mod startup;
pub mod store;
