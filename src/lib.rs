pub mod api;
pub mod clients;
pub mod config;
pub mod consumer;
pub mod delivery;
pub mod error;
pub mod models;
pub mod publisher;
pub mod replay;
pub mod routing;
pub mod utils;
