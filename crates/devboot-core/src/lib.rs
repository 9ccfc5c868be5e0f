pub mod backup;
pub mod config;
pub mod confirm;
pub mod credentials;
pub mod error;
pub mod introspect;
pub mod orchestrator;
pub mod paths;
pub mod port;
pub mod runner;
pub mod signal;

pub use error::{DevbootError, Result};
