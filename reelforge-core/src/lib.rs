pub mod content_store;
pub mod http_range;
pub mod media_info;
pub mod metrics;
pub mod models;
pub mod playback_decider;
pub mod process;
pub mod repository;
pub mod resilience;
pub mod service;
pub mod session_manager;
pub mod cache;
pub mod provider;
pub mod config;
pub mod error;
pub mod logging;
pub mod bootstrap;
pub mod transaction;

pub use config::Config;
pub use error::{Error, Result};
pub use transaction::{UnitOfWork, with_transaction};
