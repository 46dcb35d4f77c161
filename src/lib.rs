pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod database;
pub mod dns;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod logging;
pub mod middleware;
pub mod ops;
pub mod services;
pub mod tenancy;

pub use app::{router, AppState};
