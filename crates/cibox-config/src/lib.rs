//! KDL configuration parsing for cibox.
//!
//! This crate handles parsing of:
//! - Project definitions (cibox.kdl)
//! - System configuration (log directory, timeouts, environment policy)

pub mod error;
mod kdl_util;
pub mod project;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use project::{CommandConfig, ProjectConfig, load_project, parse_project};
pub use system::{SystemConfig, load_system_config, parse_system_config};
