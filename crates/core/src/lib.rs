pub mod config;
pub mod error;
pub mod types;

pub use config::{CONFIG_FILE_NAME, parse_project_toml};
pub use error::{Error, Result};
pub use types::*;
