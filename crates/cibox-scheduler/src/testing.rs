//! Fakes shared by the scheduler tests.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use cibox_core::executor::{CommandRunner, EnvPolicy, ExecOutcome, ShellJob};
use cibox_core::vcs::{CommitInfo, Vcs};
use cibox_core::{Error, Project, ResourceId, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

pub fn project() -> Project {
    Project {
        id: ResourceId::new(),
        name: "shop".to_string(),
        folder_path: PathBuf::from("/srv/shop"),
        branch: "main".to_string(),
        remote: "origin".to_string(),
        created_at: Utc::now(),
    }
}

/// Records every call. Fails the step named in `fail_on`.
#[derive(Default)]
pub struct FakeVcs {
    calls: Mutex<Vec<String>>,
    fail_on: Option<String>,
    /// When set, `reset_hard` waits for a permit.
    gate: Option<Arc<Semaphore>>,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(step: &str) -> Self {
        Self {
            fail_on: Some(step.to_string()),
            ..Self::default()
        }
    }

    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn tip() -> CommitInfo {
        CommitInfo {
            hash: "f00dfacecafe0123456789".to_string(),
            message: "Add checkout flow".to_string(),
            author: "Grace".to_string(),
            date: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String, step: &str) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.fail_on.as_deref() == Some(step) {
            return Err(Error::Sync(format!("{} refused", step)));
        }
        Ok(())
    }
}

#[async_trait]
impl Vcs for FakeVcs {
    async fn reset_hard(&self, _dir: &Path) -> Result<()> {
        self.record("reset".to_string(), "reset")?;
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }
        Ok(())
    }

    async fn checkout(&self, _dir: &Path, reference: &str) -> Result<()> {
        self.record(format!("checkout {}", reference), "checkout")
    }

    async fn pull(&self, _dir: &Path) -> Result<()> {
        self.record("pull".to_string(), "pull")
    }

    async fn fetch(&self, _dir: &Path, remote: &str) -> Result<()> {
        self.record(format!("fetch {}", remote), "fetch")
    }

    async fn resolve_remote_branch(
        &self,
        _dir: &Path,
        remote: &str,
        branch: &str,
    ) -> Result<CommitInfo> {
        self.record(format!("resolve {}/{}", remote, branch), "resolve")?;
        if branch == "gone" {
            return Err(Error::RefNotFound(format!("{}/{}", remote, branch)));
        }
        Ok(Self::tip())
    }
}

/// Writes "OK" or "FAILED" to the log and returns a scripted outcome.
/// Unknown scripts succeed; the script `explode` cannot be run at all.
#[derive(Default)]
pub struct FakeRunner {
    outcomes: HashMap<String, ExecOutcome>,
    jobs: Mutex<Vec<ShellJob>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcome(mut self, script: &str, outcome: ExecOutcome) -> Self {
        self.outcomes.insert(script.to_string(), outcome);
        self
    }

    pub fn scripts(&self) -> Vec<String> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .map(|job| job.script.clone())
            .collect()
    }

    pub fn jobs(&self) -> Vec<ShellJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, job: &ShellJob, _policy: &EnvPolicy) -> Result<ExecOutcome> {
        self.jobs.lock().unwrap().push(job.clone());
        if job.script == "explode" {
            return Err(Error::Internal("cannot spawn".to_string()));
        }

        let outcome = self
            .outcomes
            .get(&job.script)
            .copied()
            .unwrap_or(ExecOutcome::Succeeded);
        let content = if outcome.is_success() { "OK" } else { "FAILED" };
        if let Some(parent) = job.log_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&job.log_path, content).unwrap();
        Ok(outcome)
    }
}
