//! Project configuration parsing.

use crate::kdl_util::{get_first_string_arg, get_string_prop};
use crate::{ConfigError, ConfigResult};
use cibox_core::log::command_log_name;
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BRANCH: &str = "master";
pub const DEFAULT_REMOTE: &str = "origin";

/// A project and its ordered command list, as written in `cibox.kdl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    /// Local working copy.
    pub folder: PathBuf,
    pub branch: String,
    pub remote: String,
    /// In execution order.
    pub commands: Vec<CommandConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    pub name: String,
    pub run: String,
}

/// Read and parse a project file.
pub fn load_project(path: impl AsRef<Path>) -> ConfigResult<ProjectConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_project(&content)
}

/// Parse a project configuration from KDL text.
pub fn parse_project(kdl: &str) -> ConfigResult<ProjectConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut project = None;
    let mut commands: Vec<CommandConfig> = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "project" => {
                if project.is_some() {
                    return Err(ConfigError::Duplicate("project".to_string()));
                }
                project = Some(parse_project_node(node)?);
            }
            "command" => {
                let command = parse_command(node)?;
                check_log_name(&commands, &command)?;
                commands.push(command);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    let (name, folder, branch, remote) =
        project.ok_or_else(|| ConfigError::MissingField("project".to_string()))?;

    if commands.is_empty() {
        return Err(ConfigError::MissingField(format!(
            "at least one command for project '{}'",
            name
        )));
    }

    Ok(ProjectConfig {
        name,
        folder,
        branch,
        remote,
        commands,
    })
}

fn parse_project_node(node: &KdlNode) -> ConfigResult<(String, PathBuf, String, String)> {
    let name = get_first_string_arg(node)
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingField("project name".to_string()))?;

    let mut folder = None;
    let mut branch = DEFAULT_BRANCH.to_string();
    let mut remote = DEFAULT_REMOTE.to_string();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "folder" => {
                    folder = get_first_string_arg(child).map(PathBuf::from);
                }
                "branch" => {
                    branch = non_empty_arg(child, "branch")?;
                }
                "remote" => {
                    remote = non_empty_arg(child, "remote")?;
                }
                _ => {}
            }
        }
    }

    let folder = folder
        .ok_or_else(|| ConfigError::MissingField(format!("folder for project '{}'", name)))?;

    Ok((name, folder, branch, remote))
}

fn parse_command(node: &KdlNode) -> ConfigResult<CommandConfig> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("command name".to_string()))?;

    // Either `command "x" run="..."` or a `run "..."` child.
    let run = get_string_prop(node, "run").or_else(|| {
        node.children().and_then(|children| {
            children
                .nodes()
                .iter()
                .find(|c| c.name().value() == "run")
                .and_then(get_first_string_arg)
        })
    });

    match run {
        Some(run) if !run.trim().is_empty() => Ok(CommandConfig { name, run }),
        _ => Err(ConfigError::MissingField(format!(
            "run for command '{}'",
            name
        ))),
    }
}

/// Each command needs a log file name of its own.
fn check_log_name(existing: &[CommandConfig], command: &CommandConfig) -> ConfigResult<()> {
    let log_name = command_log_name(&command.name).ok_or_else(|| ConfigError::InvalidValue {
        field: format!("command '{}'", command.name),
        message: "name needs at least one letter or digit".to_string(),
    })?;

    if let Some(other) = existing
        .iter()
        .find(|c| command_log_name(&c.name).as_deref() == Some(log_name.as_str()))
    {
        if other.name == command.name {
            return Err(ConfigError::Duplicate(format!("command '{}'", command.name)));
        }
        return Err(ConfigError::Duplicate(format!(
            "command '{}' shares log name '{}' with '{}'",
            command.name, log_name, other.name
        )));
    }
    Ok(())
}

fn non_empty_arg(node: &KdlNode, field: &str) -> ConfigResult<String> {
    match get_first_string_arg(node) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: "expected a non-empty string".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_project() {
        let kdl = r#"
            project "web-shop" {
                folder "/srv/web-shop"
                branch "main"
            }

            command "bundle" run="bundle install"
            command "specs" run="bundle exec rspec"
        "#;

        let project = parse_project(kdl).unwrap();
        assert_eq!(project.name, "web-shop");
        assert_eq!(project.folder, PathBuf::from("/srv/web-shop"));
        assert_eq!(project.branch, "main");
        assert_eq!(project.remote, "origin");
        assert_eq!(project.commands.len(), 2);
        assert_eq!(project.commands[0].name, "bundle");
        assert_eq!(project.commands[1].run, "bundle exec rspec");
    }

    #[test]
    fn test_block_form_command_and_defaults() {
        let kdl = r#"
            project "tool" {
                folder "/srv/tool"
                remote "upstream"
            }

            command "test" {
                run "make test"
            }
        "#;

        let project = parse_project(kdl).unwrap();
        assert_eq!(project.branch, DEFAULT_BRANCH);
        assert_eq!(project.remote, "upstream");
        assert_eq!(project.commands[0].run, "make test");
    }

    #[test]
    fn test_missing_folder() {
        let kdl = r#"
            project "tool"
            command "test" run="make test"
        "#;

        assert!(matches!(
            parse_project(kdl).unwrap_err(),
            ConfigError::MissingField(_)
        ));
    }

    #[test]
    fn test_missing_commands() {
        let kdl = r#"
            project "tool" {
                folder "/srv/tool"
            }
        "#;

        assert!(matches!(
            parse_project(kdl).unwrap_err(),
            ConfigError::MissingField(_)
        ));
    }

    #[test]
    fn test_duplicate_command_names() {
        let kdl = r#"
            project "tool" {
                folder "/srv/tool"
            }
            command "test" run="make test"
            command "test" run="make check"
        "#;

        assert!(matches!(
            parse_project(kdl).unwrap_err(),
            ConfigError::Duplicate(_)
        ));
    }

    #[test]
    fn test_command_names_sharing_a_log_file() {
        let kdl = r#"
            project "tool" {
                folder "/srv/tool"
            }
            command "Unit Tests" run="printf FIRST"
            command "unit-tests" run="printf SECOND"
        "#;

        let err = parse_project(kdl).unwrap_err();
        assert!(matches!(err, ConfigError::Duplicate(ref msg) if msg.contains("unit_tests")));
    }

    #[test]
    fn test_command_name_without_letters_or_digits() {
        let kdl = r#"
            project "tool" {
                folder "/srv/tool"
            }
            command "---" run="make test"
        "#;

        assert!(matches!(
            parse_project(kdl).unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_command_without_run() {
        let kdl = r#"
            project "tool" {
                folder "/srv/tool"
            }
            command "test"
        "#;

        assert!(parse_project(kdl).is_err());
    }

    #[test]
    fn test_load_project_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cibox.kdl");
        std::fs::write(
            &path,
            "project \"tool\" {\n    folder \"/srv/tool\"\n}\ncommand \"test\" run=\"make test\"\n",
        )
        .unwrap();

        let project = load_project(&path).unwrap();
        assert_eq!(project.name, "tool");
        assert!(matches!(
            load_project(dir.path().join("missing.kdl")).unwrap_err(),
            ConfigError::Io(_)
        ));
    }
}
