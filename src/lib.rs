pub mod api;
pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod geo;
pub mod models;
pub mod observability;
pub mod payments;
pub mod state;
