pub mod cache;
pub mod engine;
pub mod model;
