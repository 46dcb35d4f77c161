use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of long-running system operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Backup,
    Restore,
    Update,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Backup => "backup",
            JobKind::Restore => "restore",
            JobKind::Update => "update",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backup" => Ok(JobKind::Backup),
            "restore" => Ok(JobKind::Restore),
            "update" => Ok(JobKind::Update),
            other => Err(format!("unknown operation kind '{}'", other)),
        }
    }
}

/// Operation lifecycle.
///
/// ```text
/// pending ──> running ──> completed
///    │           │
///    └───────────┴──> failed ──> rolling_back ──> rolled_back
///                                     └─────────> rollback_failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    RollingBack,
    RolledBack,
    RollbackFailed,
}

impl JobStatus {
    pub const OPEN: [JobStatus; 3] = [JobStatus::Pending, JobStatus::Running, JobStatus::RollingBack];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::RollingBack => "rolling_back",
            JobStatus::RolledBack => "rolled_back",
            JobStatus::RollbackFailed => "rollback_failed",
        }
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Completed)
                | (Running, Failed)
                | (Failed, RollingBack)
                | (RollingBack, RolledBack)
                | (RollingBack, RollbackFailed)
        )
    }

    /// Work is still in progress (or queued)
    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }

    /// No further transition is possible. `Failed` is not final: a rollback may
    /// still start from it.
    pub fn is_final(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::RolledBack | JobStatus::RollbackFailed)
    }

    /// Status written when a process dies while the operation was open
    pub fn interrupted(&self) -> Option<JobStatus> {
        match self {
            JobStatus::Pending | JobStatus::Running => Some(JobStatus::Failed),
            JobStatus::RollingBack => Some(JobStatus::RollbackFailed),
            _ => None,
        }
    }

    /// Sets `finished_at` when entered
    pub fn stamps_finish(&self) -> bool {
        self.is_final() || *self == JobStatus::Failed
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "rolling_back" => Ok(JobStatus::RollingBack),
            "rolled_back" => Ok(JobStatus::RolledBack),
            "rollback_failed" => Ok(JobStatus::RollbackFailed),
            other => Err(format!("unknown operation status '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::JobStatus::*;
    use super::*;

    const ALL: [JobStatus; 7] = [Pending, Running, Completed, Failed, RollingBack, RolledBack, RollbackFailed];

    #[test]
    fn happy_path_transitions() {
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(Failed.can_transition_to(RollingBack));
        assert!(RollingBack.can_transition_to(RolledBack));
        assert!(RollingBack.can_transition_to(RollbackFailed));
    }

    #[test]
    fn final_states_have_no_exits() {
        for from in ALL.iter().filter(|s| s.is_final()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{} -> {} must be rejected", from, to);
            }
        }
    }

    #[test]
    fn no_skipping_or_reentry() {
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Running.can_transition_to(Running));
        assert!(!Completed.can_transition_to(RollingBack));
        assert!(!Running.can_transition_to(RollingBack));
        assert!(!Failed.can_transition_to(Running));
    }

    #[test]
    fn interrupted_open_states_close_legally() {
        for s in JobStatus::OPEN {
            let next = s.interrupted().unwrap();
            assert!(s.can_transition_to(next));
        }
        assert_eq!(Completed.interrupted(), None);
    }

    #[test]
    fn restart_fails_work_and_rollbacks_separately() {
        assert_eq!(Pending.interrupted(), Some(Failed));
        assert_eq!(Running.interrupted(), Some(Failed));
        assert_eq!(RollingBack.interrupted(), Some(RollbackFailed));
        assert_eq!(Failed.interrupted(), None);
        assert_eq!(RolledBack.interrupted(), None);
    }

    #[test]
    fn string_round_trip_matches_schema_values() {
        for s in ALL {
            assert_eq!(s.as_str().parse::<JobStatus>().unwrap(), s);
        }
        assert_eq!(serde_json::to_value(RollingBack).unwrap(), "rolling_back");
    }
}
