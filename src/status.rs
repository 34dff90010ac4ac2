//! Shared per-target progress, safe to read while a run is executing.

use dashmap::DashMap;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    Pending,
    Running,
    Done,
    Failed,
    /// Never started because a fail-fast run was aborted.
    Skipped,
}

impl TargetStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TargetStatus::Done | TargetStatus::Failed | TargetStatus::Skipped
        )
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetStatus::Pending => "pending",
            TargetStatus::Running => "running",
            TargetStatus::Done => "done",
            TargetStatus::Failed => "failed",
            TargetStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// One row of the status board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetProgress {
    /// Rendered action label, e.g. `Resizing and Upgrading`.
    pub action: String,
    pub status: TargetStatus,
    /// Name of the step currently executing.
    pub step: Option<&'static str>,
}

#[derive(Debug, Default)]
pub struct StatusBoard {
    targets: DashMap<String, TargetProgress>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, action: impl Into<String>) {
        self.targets.insert(
            name.to_string(),
            TargetProgress {
                action: action.into(),
                status: TargetStatus::Pending,
                step: None,
            },
        );
    }

    pub fn set_status(&self, name: &str, status: TargetStatus) {
        if let Some(mut entry) = self.targets.get_mut(name) {
            entry.status = status;
            if status.is_terminal() {
                entry.step = None;
            }
        }
    }

    pub fn set_step(&self, name: &str, step: &'static str) {
        if let Some(mut entry) = self.targets.get_mut(name) {
            entry.step = Some(step);
        }
    }

    pub fn get(&self, name: &str) -> Option<TargetProgress> {
        self.targets.get(name).map(|e| e.value().clone())
    }

    /// Sorted snapshot of every target.
    pub fn snapshot(&self) -> Vec<(String, TargetProgress)> {
        let mut rows: Vec<_> = self
            .targets
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    pub fn count(&self, status: TargetStatus) -> usize {
        self.targets.iter().filter(|e| e.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        let board = StatusBoard::new();
        board.register("db2", "Creating");
        board.register("db1", "Looking up");
        assert_eq!(board.count(TargetStatus::Pending), 2);

        board.set_status("db1", TargetStatus::Running);
        board.set_step("db1", "lookup");
        assert_eq!(board.get("db1").unwrap().step, Some("lookup"));

        board.set_status("db1", TargetStatus::Done);
        let row = board.get("db1").unwrap();
        assert_eq!(row.status, TargetStatus::Done);
        assert_eq!(row.step, None);

        let names: Vec<_> = board.snapshot().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["db1", "db2"]);
    }

    #[test]
    fn test_unknown_target_is_ignored() {
        let board = StatusBoard::new();
        board.set_status("ghost", TargetStatus::Failed);
        assert!(board.get("ghost").is_none());
    }
}
