#![warn(missing_docs)]

//! ViewMesh REST layer: vehicle order endpoints, the peer surface other
//! instances forward to, configuration and CLI.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod order;

pub use api::OrderApi;
pub use config::ServerConfig;
pub use error::ApiError;
pub use order::VehicleOrder;
