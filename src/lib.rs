//! Ghana data-bundle purchase and settlement backend

pub mod api;
pub mod app;
pub mod config;
pub mod database;
pub mod delivery;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod services;
pub mod workers;
