// src/lib.rs

pub mod client;
pub mod config;
pub mod error;
pub mod feed;
pub mod handlers;
pub mod interaction;
pub mod models;
pub mod query;
pub mod repositories;
pub mod routes;
pub mod state;
pub mod utils;

pub use routes::create_router;
