pub mod config;
pub mod error;

pub use config::FdsConfig;
pub use error::{FdsError, Result};
