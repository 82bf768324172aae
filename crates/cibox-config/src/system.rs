//! System configuration parsing.

use crate::kdl_util::{get_all_string_args, get_first_integer_arg, get_first_string_arg};
use crate::{ConfigError, ConfigResult};
use cibox_core::executor::EnvPolicy;
use kdl::KdlDocument;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Machine-wide settings shared by every project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Directory holding one log file per command result.
    pub log_dir: PathBuf,
    /// Upper bound on a single command. `None` waits forever.
    pub command_timeout: Option<Duration>,
    /// Environment normalization for commands.
    pub env: EnvPolicy,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("log"),
            command_timeout: None,
            env: EnvPolicy::default(),
        }
    }
}

/// Read a system config file, falling back to defaults when it does not exist.
pub fn load_system_config(path: impl AsRef<Path>) -> ConfigResult<SystemConfig> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_system_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SystemConfig::default()),
        Err(e) => Err(e.into()),
    }
}

/// Parse system configuration from KDL text.
pub fn parse_system_config(kdl: &str) -> ConfigResult<SystemConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = SystemConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "log-dir" => {
                config.log_dir = get_first_string_arg(node)
                    .map(PathBuf::from)
                    .ok_or_else(|| ConfigError::MissingField("log-dir path".to_string()))?;
            }
            "command-timeout" => {
                let secs = get_first_integer_arg(node).ok_or_else(|| {
                    ConfigError::MissingField("command-timeout seconds".to_string())
                })?;
                config.command_timeout = match secs {
                    0 => None,
                    s if s > 0 && s <= u64::MAX as i128 => Some(Duration::from_secs(s as u64)),
                    _ => {
                        return Err(ConfigError::InvalidValue {
                            field: "command-timeout".to_string(),
                            message: format!("expected seconds >= 0, got {}", secs),
                        });
                    }
                };
            }
            "environment" => {
                // An explicit block replaces the defaults entirely.
                let mut env = EnvPolicy::inherit();
                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        match child.name().value() {
                            "unset" => env.unset.extend(get_all_string_args(child)),
                            "source" => env.source.extend(get_all_string_args(child)),
                            other => {
                                return Err(ConfigError::InvalidValue {
                                    field: "environment".to_string(),
                                    message: format!("unknown entry: {}", other),
                                });
                            }
                        }
                    }
                }
                config.env = env;
            }
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_system_config("").unwrap();
        assert_eq!(config, SystemConfig::default());
        assert!(config.env.unset.contains(&"RUBYOPT".to_string()));
    }

    #[test]
    fn test_parse_full_config() {
        let kdl = r#"
            log-dir "/var/log/cibox"
            command-timeout 1800
            environment {
                unset "RAILS_ENV" "RUBYOPT"
                unset "CI"
                source "$HOME/.profile"
            }
        "#;

        let config = parse_system_config(kdl).unwrap();
        assert_eq!(config.log_dir, PathBuf::from("/var/log/cibox"));
        assert_eq!(config.command_timeout, Some(Duration::from_secs(1800)));
        assert_eq!(config.env.unset, vec!["RAILS_ENV", "RUBYOPT", "CI"]);
        assert_eq!(config.env.source, vec!["$HOME/.profile"]);
    }

    #[test]
    fn test_zero_timeout_disables_it() {
        let config = parse_system_config("command-timeout 0").unwrap();
        assert_eq!(config.command_timeout, None);
    }

    #[test]
    fn test_negative_timeout_is_rejected() {
        assert!(matches!(
            parse_system_config("command-timeout -5").unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_empty_environment_block_clears_policy() {
        let config = parse_system_config("environment {\n}").unwrap();
        assert_eq!(config.env, EnvPolicy::inherit());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_system_config(dir.path().join("absent.kdl")).unwrap();
        assert_eq!(config, SystemConfig::default());
    }
}
