pub mod app;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod http_client;
pub mod providers;
pub mod setup;

pub use error::InfraError;
