//! Shell process runner.
//!
//! Runs each command as `sh -c <script>` in the project's working copy with
//! stdout and stderr sent to the result's log file.

use async_trait::async_trait;
use cibox_core::executor::{CommandRunner, EnvPolicy, ExecOutcome, ShellJob};
use cibox_core::{Error, Result};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Runs commands through a POSIX shell on the local machine.
pub struct ShellRunner {
    shell: String,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellRunner {
    pub fn new() -> Self {
        Self {
            shell: "/bin/sh".to_string(),
        }
    }

    /// Use a different shell binary. It must accept `-c <script>`.
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// The full script: best-effort init scripts, then the command.
    fn script(job: &ShellJob, policy: &EnvPolicy) -> String {
        let mut lines: Vec<String> = policy
            .source
            .iter()
            .map(|path| {
                let quoted = double_quote(path);
                format!("if [ -s {0} ]; then . {0} || true; fi", quoted)
            })
            .collect();
        lines.push(job.script.clone());
        lines.join("\n")
    }

    fn command(&self, job: &ShellJob, policy: &EnvPolicy) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(Self::script(job, policy))
            .current_dir(&job.working_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        for var in &policy.unset {
            cmd.env_remove(var);
        }
        cmd
    }
}

/// Quote for the shell, leaving `$` expansions intact.
fn double_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

fn io_error(context: &str, job: &ShellJob, e: std::io::Error) -> Error {
    Error::Internal(format!("{} ({}): {}", context, job.log_path.display(), e))
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, job: &ShellJob, policy: &EnvPolicy) -> Result<ExecOutcome> {
        if let Some(parent) = job.log_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("Failed to create log directory", job, e))?;
        }

        let log = tokio::fs::File::create(&job.log_path)
            .await
            .map_err(|e| io_error("Failed to open log", job, e))?
            .into_std()
            .await;
        let log_err = log
            .try_clone()
            .map_err(|e| io_error("Failed to open log", job, e))?;

        let mut cmd = self.command(job, policy);
        cmd.stdout(Stdio::from(log)).stderr(Stdio::from(log_err));

        info!(dir = %job.working_dir.display(), log = %job.log_path.display(), "Running command");
        debug!(script = %job.script, "Command script");

        let mut child = cmd
            .spawn()
            .map_err(|e| io_error("Failed to spawn command", job, e))?;

        let status = match job.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!(timeout_secs = limit.as_secs_f64(), "Command timed out, killing");
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "Failed to kill timed out command");
                    }
                    append_line(
                        job,
                        &format!("cibox: command timed out after {:?}", limit),
                    )
                    .await;
                    return Ok(ExecOutcome::TimedOut);
                }
            },
            None => child.wait().await,
        }
        .map_err(|e| io_error("Failed to wait for command", job, e))?;

        if status.success() {
            Ok(ExecOutcome::Succeeded)
        } else {
            debug!(exit_code = ?status.code(), "Command failed");
            Ok(ExecOutcome::Failed {
                exit_code: status.code(),
            })
        }
    }
}

async fn append_line(job: &ShellJob, line: &str) {
    let file = tokio::fs::OpenOptions::new()
        .append(true)
        .open(&job.log_path)
        .await;
    match file {
        Ok(mut file) => {
            if let Err(e) = file.write_all(format!("\n{}\n", line).as_bytes()).await {
                warn!(error = %e, "Failed to append to log");
            }
        }
        Err(e) => warn!(error = %e, "Failed to append to log"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    fn job(dir: &Path, script: &str) -> ShellJob {
        ShellJob {
            script: script.to_string(),
            working_dir: dir.to_path_buf(),
            log_path: dir.join("logs").join("result.log"),
            timeout: None,
        }
    }

    fn read_log(job: &ShellJob) -> String {
        std::fs::read_to_string(&job.log_path).unwrap()
    }

    #[tokio::test]
    async fn test_successful_command_writes_log() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path(), "printf OK");

        let outcome = ShellRunner::new()
            .run(&job, &EnvPolicy::inherit())
            .await
            .unwrap();

        assert_eq!(outcome, ExecOutcome::Succeeded);
        assert_eq!(read_log(&job), "OK");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path(), "echo broken >&2; exit 3");

        let outcome = ShellRunner::new()
            .run(&job, &EnvPolicy::inherit())
            .await
            .unwrap();

        assert_eq!(outcome, ExecOutcome::Failed { exit_code: Some(3) });
        assert_eq!(read_log(&job), "broken\n");
    }

    #[tokio::test]
    async fn test_runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "").unwrap();
        let job = job(dir.path(), "test -f marker");

        let outcome = ShellRunner::new()
            .run(&job, &EnvPolicy::inherit())
            .await
            .unwrap();
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_log_is_truncated_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ShellRunner::new();

        runner
            .run(&job(dir.path(), "printf first"), &EnvPolicy::inherit())
            .await
            .unwrap();
        let second = job(dir.path(), "printf second");
        runner.run(&second, &EnvPolicy::inherit()).await.unwrap();

        assert_eq!(read_log(&second), "second");
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = job(dir.path(), "sleep 5");
        job.timeout = Some(Duration::from_millis(200));

        let outcome = ShellRunner::new()
            .run(&job, &EnvPolicy::inherit())
            .await
            .unwrap();

        assert_eq!(outcome, ExecOutcome::TimedOut);
        assert!(read_log(&job).contains("timed out"));
    }

    #[tokio::test]
    async fn test_init_scripts_are_sourced_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let init = dir.path().join("init.sh");
        std::fs::write(&init, "CIBOX_INIT=loaded\n").unwrap();

        let policy = EnvPolicy {
            unset: Vec::new(),
            source: vec![
                dir.path().join("missing.sh").to_string_lossy().to_string(),
                init.to_string_lossy().to_string(),
            ],
        };
        let job = job(dir.path(), "printf \"$CIBOX_INIT\"");

        let outcome = ShellRunner::new().run(&job, &policy).await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(read_log(&job), "loaded");
    }

    #[tokio::test]
    async fn test_missing_working_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = job(dir.path(), "true");
        job.working_dir = dir.path().join("does-not-exist");

        assert!(
            ShellRunner::new()
                .run(&job, &EnvPolicy::inherit())
                .await
                .is_err()
        );
    }

    #[test]
    fn test_policy_unsets_variables() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path(), "true");
        let policy = EnvPolicy::default();

        let cmd = ShellRunner::new().command(&job, &policy);
        let removed: Vec<String> = cmd
            .as_std()
            .get_envs()
            .filter(|(_, value)| value.is_none())
            .map(|(key, _)| key.to_string_lossy().to_string())
            .collect();

        for var in ["RAILS_ENV", "RUBYOPT", "BUNDLE_GEMFILE", "BUNDLE_BIN_PATH"] {
            assert!(removed.iter().any(|r| r == var), "{} not removed", var);
        }
    }

    #[test]
    fn test_script_quotes_init_paths() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(dir.path(), "make test");
        let policy = EnvPolicy {
            unset: Vec::new(),
            source: vec!["$HOME/.rvm/scripts/rvm".to_string()],
        };

        let script = ShellRunner::script(&job, &policy);
        assert_eq!(
            script,
            "if [ -s \"$HOME/.rvm/scripts/rvm\" ]; then . \"$HOME/.rvm/scripts/rvm\" || true; fi\nmake test"
        );
        assert_eq!(double_quote("a\"b"), "\"a\\\"b\"");
    }
}
