//! Projects, commands, builds and command results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::log::LogLayout;
use crate::status::{self, Status};
use crate::vcs::CommitInfo;
use crate::{Error, ResourceId, Result};

/// A source repository checked out on this machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ResourceId,
    pub name: String,
    /// Local working copy. Commands run here.
    pub folder_path: PathBuf,
    pub branch: String,
    /// Remote whose `<remote>/<branch>` is tracked.
    pub remote: String,
    pub created_at: DateTime<Utc>,
}

/// A named shell invocation, run in `position` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub id: ResourceId,
    pub project_id: ResourceId,
    pub name: String,
    pub command: String,
    pub position: i32,
}

/// The outcome record of one command within one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub id: ResourceId,
    pub build_id: ResourceId,
    pub command_id: ResourceId,
    /// Copied from the command so logs and reports need no extra lookup.
    pub command_name: String,
    status: Status,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub log_path: PathBuf,
}

impl CommandResult {
    /// A fresh result in `pending`.
    pub fn pending(build_id: ResourceId, command: &Command, log_path: PathBuf) -> Self {
        Self {
            id: ResourceId::new(),
            build_id,
            command_id: command.id,
            command_name: command.name.clone(),
            status: Status::Pending,
            start_time: None,
            end_time: None,
            log_path,
        }
    }

    /// Rebuild a result from stored fields.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: ResourceId,
        build_id: ResourceId,
        command_id: ResourceId,
        command_name: String,
        status: Status,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        log_path: PathBuf,
    ) -> Self {
        Self {
            id,
            build_id,
            command_id,
            command_name,
            status,
            start_time,
            end_time,
            log_path,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn in_status(&self, status: Status) -> bool {
        self.status == status
    }

    pub fn is_pending(&self) -> bool {
        self.in_status(Status::Pending)
    }

    pub fn is_busy(&self) -> bool {
        self.in_status(Status::Busy)
    }

    pub fn is_passed(&self) -> bool {
        self.in_status(Status::Passed)
    }

    pub fn is_failed(&self) -> bool {
        self.in_status(Status::Failed)
    }

    pub fn is_skipped(&self) -> bool {
        self.in_status(Status::Skipped)
    }

    /// `pending -> busy`. Stamps `start_time`.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(Status::Pending, Status::Busy)?;
        self.start_time = Some(now);
        Ok(())
    }

    /// `busy -> passed | failed`. Stamps `end_time`.
    pub fn finish(&mut self, success: bool, now: DateTime<Utc>) -> Result<()> {
        let to = if success {
            Status::Passed
        } else {
            Status::Failed
        };
        self.transition(Status::Busy, to)?;
        self.end_time = Some(now);
        Ok(())
    }

    /// `pending -> skipped`. Stamps `end_time`.
    pub fn skip(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(Status::Pending, Status::Skipped)?;
        self.end_time = Some(now);
        Ok(())
    }

    /// Overwrite the status with `skipped` whatever it was.
    pub fn force_skip(&mut self) {
        self.status = Status::Skipped;
    }

    /// Full contents of this result's log file.
    pub fn log(&self) -> Result<String> {
        std::fs::read_to_string(&self.log_path).map_err(|source| Error::Read {
            path: self.log_path.clone(),
            source,
        })
    }

    fn transition(&mut self, from: Status, to: Status) -> Result<()> {
        if self.status != from {
            return Err(Error::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

/// One run of a project's full command list against a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub id: ResourceId,
    pub project_id: ResourceId,
    pub commit_hash: Option<String>,
    pub commit_message: Option<String>,
    pub commit_author: Option<String>,
    pub commit_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// One per project command, in command order. Never grows or shrinks.
    pub results: Vec<CommandResult>,
}

impl Build {
    /// Create a build with one pending result per command.
    ///
    /// `commands` must already be in execution order.
    pub fn new(project: &Project, commands: &[Command], layout: &LogLayout) -> Self {
        let id = ResourceId::new();
        let results = commands
            .iter()
            .map(|command| {
                let log_path = layout.result_log_path(&project.name, id, &command.name);
                CommandResult::pending(id, command, log_path)
            })
            .collect();

        Self {
            id,
            project_id: project.id,
            commit_hash: None,
            commit_message: None,
            commit_author: None,
            commit_date: None,
            created_at: Utc::now(),
            results,
        }
    }

    /// Builder-style helper to pin the build to a commit hash.
    pub fn with_commit_hash(mut self, hash: impl Into<String>) -> Self {
        self.commit_hash = Some(hash.into());
        self
    }

    /// Aggregate status, derived from the current results.
    pub fn status(&self) -> Status {
        status::aggregate(self.results.iter().map(CommandResult::status))
    }

    pub fn results_in_status(&self, status: Status) -> usize {
        self.results.iter().filter(|r| r.in_status(status)).count()
    }

    /// Start of the first result, if it has started.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.results.first().and_then(|r| r.start_time)
    }

    /// End of the last result, if it has ended.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.results.last().and_then(|r| r.end_time)
    }

    /// First ten characters of the commit hash.
    pub fn short_hash(&self) -> Option<&str> {
        self.commit_hash
            .as_deref()
            .map(|hash| hash.get(..10).unwrap_or(hash))
    }

    pub fn has_commit_info(&self) -> bool {
        self.commit_hash.as_deref().is_some_and(|s| !s.is_empty())
            && self.commit_message.as_deref().is_some_and(|s| !s.is_empty())
            && self.commit_author.as_deref().is_some_and(|s| !s.is_empty())
            && self.commit_date.is_some()
    }

    pub fn set_commit(&mut self, commit: &CommitInfo) {
        self.commit_hash = Some(commit.hash.clone());
        self.commit_message = Some(commit.message.clone());
        self.commit_author = Some(commit.author.clone());
        self.commit_date = Some(commit.date);
    }

    /// Mark every result `skipped`, including finished ones.
    pub fn skip_all(&mut self) {
        for result in &mut self.results {
            result.force_skip();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn project() -> Project {
        Project {
            id: ResourceId::new(),
            name: "Web Shop".to_string(),
            folder_path: PathBuf::from("/srv/web-shop"),
            branch: "main".to_string(),
            remote: "origin".to_string(),
            created_at: Utc::now(),
        }
    }

    fn commands(project: &Project, names: &[&str]) -> Vec<Command> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| Command {
                id: ResourceId::new(),
                project_id: project.id,
                name: name.to_string(),
                command: format!("make {}", name),
                position: i as i32,
            })
            .collect()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_new_build_has_one_pending_result_per_command() {
        let project = project();
        let commands = commands(&project, &["deps", "lint", "test"]);
        let build = Build::new(&project, &commands, &LogLayout::new("/tmp/logs"));

        assert_eq!(build.results.len(), 3);
        assert!(build.results.iter().all(CommandResult::is_pending));
        assert_eq!(build.status(), Status::Pending);
        for (result, command) in build.results.iter().zip(&commands) {
            assert_eq!(result.command_id, command.id);
            assert_eq!(result.build_id, build.id);
        }
        assert!(
            build.results[1]
                .log_path
                .to_string_lossy()
                .ends_with("_lint.log")
        );
    }

    #[test]
    fn test_build_without_commands_is_passed() {
        let project = project();
        let build = Build::new(&project, &[], &LogLayout::new("/tmp/logs"));
        assert!(build.results.is_empty());
        assert_eq!(build.status(), Status::Passed);
        assert_eq!(build.start_time(), None);
        assert_eq!(build.end_time(), None);
    }

    #[test]
    fn test_result_lifecycle() {
        let project = project();
        let commands = commands(&project, &["test"]);
        let mut result = CommandResult::pending(ResourceId::new(), &commands[0], "x.log".into());

        result.start(at(0)).unwrap();
        assert!(result.is_busy());
        assert_eq!(result.start_time, Some(at(0)));
        assert_eq!(result.end_time, None);

        result.finish(true, at(5)).unwrap();
        assert!(result.is_passed());
        assert_eq!(result.end_time, Some(at(5)));
    }

    #[test]
    fn test_skip_sets_only_end_time() {
        let project = project();
        let commands = commands(&project, &["test"]);
        let mut result = CommandResult::pending(ResourceId::new(), &commands[0], "x.log".into());

        result.skip(at(1)).unwrap();
        assert!(result.is_skipped());
        assert_eq!(result.start_time, None);
        assert_eq!(result.end_time, Some(at(1)));
    }

    #[test]
    fn test_illegal_transitions_are_rejected() {
        let project = project();
        let commands = commands(&project, &["test"]);
        let mut result = CommandResult::pending(ResourceId::new(), &commands[0], "x.log".into());

        assert!(matches!(
            result.finish(true, at(0)),
            Err(Error::InvalidTransition {
                from: Status::Pending,
                to: Status::Passed
            })
        ));

        result.start(at(0)).unwrap();
        assert!(result.skip(at(1)).is_err());
        assert!(result.start(at(1)).is_err());

        result.finish(false, at(2)).unwrap();
        assert!(result.is_failed());
        assert!(result.start(at(3)).is_err());
        assert_eq!(result.start_time, Some(at(0)));
        assert_eq!(result.end_time, Some(at(2)));
    }

    #[test]
    fn test_build_times_come_from_first_and_last_result() {
        let project = project();
        let commands = commands(&project, &["a", "b", "c"]);
        let mut build = Build::new(&project, &commands, &LogLayout::new("/tmp/logs"));

        build.results[0].start(at(10)).unwrap();
        build.results[0].finish(true, at(20)).unwrap();
        assert_eq!(build.start_time(), Some(at(10)));
        assert_eq!(build.end_time(), None);

        build.results[1].start(at(20)).unwrap();
        build.results[1].finish(false, at(30)).unwrap();
        build.results[2].skip(at(31)).unwrap();

        assert_eq!(build.end_time(), Some(at(31)));
        assert_eq!(build.status(), Status::Failed);
        assert_eq!(build.results_in_status(Status::Passed), 1);
        assert_eq!(build.results_in_status(Status::Skipped), 1);
    }

    #[test]
    fn test_skip_all_overwrites_finished_results() {
        let project = project();
        let commands = commands(&project, &["a", "b"]);
        let mut build = Build::new(&project, &commands, &LogLayout::new("/tmp/logs"));
        build.results[0].start(at(0)).unwrap();
        build.results[0].finish(true, at(1)).unwrap();

        build.skip_all();

        assert!(build.results.iter().all(CommandResult::is_skipped));
        assert_eq!(build.status(), Status::Skipped);
    }

    #[test]
    fn test_commit_info() {
        let project = project();
        let mut build = Build::new(&project, &[], &LogLayout::new("/tmp/logs"));
        assert_eq!(build.short_hash(), None);
        assert!(!build.has_commit_info());

        build = build.with_commit_hash("abc");
        assert_eq!(build.short_hash(), Some("abc"));
        assert!(!build.has_commit_info());

        build.set_commit(&CommitInfo {
            hash: "0123456789abcdef".to_string(),
            message: "Fix checkout".to_string(),
            author: "Ada".to_string(),
            date: at(0),
        });
        assert_eq!(build.short_hash(), Some("0123456789"));
        assert!(build.has_commit_info());
    }

    #[test]
    fn test_log_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let project = project();
        let commands = commands(&project, &["test"]);
        let build = Build::new(&project, &commands, &LogLayout::new(dir.path()));
        let result = &build.results[0];

        assert!(matches!(result.log(), Err(Error::Read { .. })));

        std::fs::write(&result.log_path, "OK").unwrap();
        assert_eq!(result.log().unwrap(), "OK");
    }
}
