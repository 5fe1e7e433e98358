//! cmsrelay core: error taxonomy and process configuration.

pub mod config;
pub mod error;

pub use config::{ContentstackSettings, RelayConfig};
pub use error::{Error, Result};
