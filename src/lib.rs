//! Task collections with display ordering, status filters and completion
//! statistics, plus the storage and HTTP layers that serve them.

pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod store;

pub use error::{Result, TaskError};
