pub mod auth;
pub mod coin;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod req;
pub mod server;
pub mod telemetry;
pub mod utils;
