pub mod api;
pub mod app;
pub mod config;
pub mod controls;
pub mod core;
pub mod error;
pub mod interfaces;
pub mod invoice;
pub mod models;
pub mod notifications;
pub mod observability;
pub mod settlement;
pub mod store;
pub mod types;
pub mod utils;
pub mod verification;
