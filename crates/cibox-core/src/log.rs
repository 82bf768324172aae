//! Log file layout.
//!
//! Every command result writes to its own file under a configured log
//! directory. The file name is derived from the project name, the build id
//! and the command name, so it can be recomputed without a lookup.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::ResourceId;

static NON_ALPHANUMERIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Reduce a name to lowercase ASCII alphanumerics joined by `sep`.
///
/// `"My App (v2)"` becomes `"my_app_v2"` with `sep = '_'`.
pub fn parameterize(name: &str, sep: char) -> String {
    let lowered = name.to_lowercase();
    let replaced = NON_ALPHANUMERIC.replace_all(&lowered, sep.to_string().as_str());
    replaced.trim_matches(sep).to_string()
}

/// The part of a log file name taken from a command name.
///
/// Two commands of one project must not share it, or their results would
/// write to the same file. `None` when nothing file-safe is left.
pub fn command_log_name(command: &str) -> Option<String> {
    Some(parameterize(command, '_')).filter(|name| !name.is_empty())
}

/// Where result logs live on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLayout {
    log_dir: PathBuf,
}

impl LogLayout {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn result_log_path(&self, project: &str, build_id: ResourceId, command: &str) -> PathBuf {
        self.log_dir.join(format!(
            "build_{}_{}_{}.log",
            parameterize(project, '_'),
            build_id.simple(),
            parameterize(command, '_'),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameterize() {
        assert_eq!(parameterize("My App (v2)", '_'), "my_app_v2");
        assert_eq!(parameterize("  --rspec--  ", '_'), "rspec");
        assert_eq!(parameterize("bundle exec rake", '-'), "bundle-exec-rake");
        assert_eq!(parameterize("../../etc/passwd", '_'), "etc_passwd");
    }

    #[test]
    fn test_command_log_name() {
        assert_eq!(command_log_name("Unit Tests").as_deref(), Some("unit_tests"));
        assert_eq!(command_log_name("unit-tests"), command_log_name("Unit Tests"));
        assert_eq!(command_log_name("--- !!"), None);
        assert_eq!(command_log_name(""), None);
    }

    #[test]
    fn test_result_log_path_is_deterministic() {
        let layout = LogLayout::new("/var/log/cibox");
        let build_id = ResourceId::new();

        let path = layout.result_log_path("Web Shop", build_id, "Unit Tests");
        assert_eq!(path, layout.result_log_path("Web Shop", build_id, "Unit Tests"));
        assert_eq!(path.parent(), Some(Path::new("/var/log/cibox")));
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            format!("build_web_shop_{}_unit_tests.log", build_id.simple())
        );
    }
}
