//! Confirmation boundary for destructive operations
//!
//! The engine never reads stdin itself; every prompt goes through a
//! [`ConfirmationProvider`] so the CLI can supply an interactive
//! implementation and tests can script the answers.

/// Which replica a deletion group targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionSide {
    /// Files to remove on the local replica
    Local,
    /// Files to remove on the remote replica
    Remote,
}

impl std::fmt::Display for DeletionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Pending deletions under one parent directory
#[derive(Debug, Clone)]
pub struct DeletionGroup {
    /// Parent directory, `.` for the replica root
    pub parent: String,
    /// Sorted relative paths in this group
    pub paths: Vec<String>,
    /// Which replica the removals would touch
    pub side: DeletionSide,
}

/// Operator decision for one deletion group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupDecision {
    /// Delete this group
    Confirm,
    /// Keep this group, continue with the next
    Skip,
    /// Delete this group and every remaining group without prompting
    ConfirmAll,
    /// Abort the whole deletion phase; nothing further is removed
    Abort,
}

/// Operator decision for leftover conflict artifacts found at run start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreflightDecision {
    /// Remove the artifacts and proceed with the run
    RemoveAndContinue,
    /// Remove the artifacts, then stop without syncing
    RemoveAndExit,
    /// Leave everything untouched and stop
    Abort,
}

/// Answers the prompts the executors need before destructive work
pub trait ConfirmationProvider: Send {
    /// Decide the fate of one deletion group
    fn confirm_deletions(&mut self, group: &DeletionGroup) -> GroupDecision;

    /// Decide what to do about leftover conflict artifacts, listed as
    /// paths relative to the local root
    fn confirm_preflight(&mut self, artifacts: &[String]) -> PreflightDecision;
}
