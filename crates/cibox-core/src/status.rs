//! Result status and build-level aggregation.

use serde::{Deserialize, Serialize};

/// Status of a single command result.
///
/// A build has no stored status of its own; see [`aggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Busy,
    Failed,
    Passed,
    Skipped,
}

/// Order in which [`aggregate`] looks for a status. The first one held by
/// any result wins; `Passed` is the fallback.
pub const PRECEDENCE: [Status; 4] = [Status::Busy, Status::Failed, Status::Pending, Status::Skipped];

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Pending,
        Status::Busy,
        Status::Failed,
        Status::Passed,
        Status::Skipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Busy => "busy",
            Status::Failed => "failed",
            Status::Passed => "passed",
            Status::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Passed | Status::Failed | Status::Skipped)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Unknown status: {}", s))
    }
}

/// Derive the status of a build from the statuses of its results.
///
/// Evaluated on every call; results are mutable while a build runs.
pub fn aggregate<I>(statuses: I) -> Status
where
    I: IntoIterator<Item = Status>,
{
    let held: Vec<Status> = statuses.into_iter().collect();
    PRECEDENCE
        .into_iter()
        .find(|candidate| held.contains(candidate))
        .unwrap_or(Status::Passed)
}
