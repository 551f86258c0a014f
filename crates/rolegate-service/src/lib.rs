pub mod adapter;
pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod seed;
pub mod service;

pub use error::ApiError;
pub use service::AuthzService;
