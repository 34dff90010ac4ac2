//! Per-target step definitions and execution state.
//!
//! A runner is a fixed list of [`Step`]s. While it executes, the only
//! mutable thing is its [`TaskState`]: the deployment id it is working
//! on (which a resize or upgrade may change) and the identity it will
//! contribute to the output.

use crate::config::TeamRoles;
use crate::types::DeploymentParams;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Separator between type and name in a placeholder identity.
pub const PLACEHOLDER_SEPARATOR: &str = "::";

/// Runner steps. Closed set; every executor handles each one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    /// Create the deployment and wait for provisioning.
    Create(DeploymentParams),
    /// Change allocated units and wait.
    Resize { units: u32 },
    /// In-place upgrade and wait.
    Upgrade { version: String },
    /// Replace the notes.
    UpdateNotes { notes: String },
    /// Grant missing team roles. Never revokes.
    SyncTeamRoles { roles: TeamRoles },
    /// Look the deployment up by name and record its id.
    Lookup,
    /// Deprovision and wait.
    Deprovision,
}

impl Step {
    /// Human-readable step name for logging/display.
    pub fn name(&self) -> &'static str {
        match self {
            Step::Create(_) => "create",
            Step::Resize { .. } => "resize",
            Step::Upgrade { .. } => "upgrade",
            Step::UpdateNotes { .. } => "update_notes",
            Step::SyncTeamRoles { .. } => "sync_team_roles",
            Step::Lookup => "lookup",
            Step::Deprovision => "deprovision",
        }
    }

    /// Whether this step changes anything on the platform.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Step::Lookup)
    }
}

/// Identity a finished task contributes to the output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RealizedId {
    /// A real platform deployment id.
    Live(String),
    /// Dry-run stand-in for a deployment that would have been created.
    Placeholder { db_type: String, name: String },
}

impl RealizedId {
    pub fn placeholder(db_type: impl Into<String>, name: impl Into<String>) -> Self {
        RealizedId::Placeholder {
            db_type: db_type.into(),
            name: name.into(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, RealizedId::Placeholder { .. })
    }
}

impl fmt::Display for RealizedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RealizedId::Live(id) => f.write_str(id),
            RealizedId::Placeholder { db_type, name } => {
                write!(f, "{db_type}{PLACEHOLDER_SEPARATOR}{name}")
            }
        }
    }
}

/// Mutable state of one executing runner.
#[derive(Debug, Clone)]
pub struct TaskState {
    /// Deployment name this task reconciles.
    pub name: String,
    pub db_type: String,
    /// Current platform id. Updated after every recipe.
    pub deployment_id: Option<String>,
    /// Set by the step that establishes the final identity.
    pub realized: Option<RealizedId>,
    /// How long to wait on each recipe. Zero means don't wait.
    pub timeout: Duration,
    /// Recipes this task waited on, in order.
    pub recipe_ids: Vec<String>,
    /// Names of completed steps, in order.
    pub completed: Vec<&'static str>,
}

impl TaskState {
    pub fn new(
        name: impl Into<String>,
        db_type: impl Into<String>,
        deployment_id: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            db_type: db_type.into(),
            deployment_id,
            realized: None,
            timeout: Duration::ZERO,
            recipe_ids: Vec::new(),
            completed: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Move to a new deployment id, ignoring empty ids.
    pub fn track_id(&mut self, id: &str) {
        if !id.is_empty() && self.deployment_id.as_deref() != Some(id) {
            tracing::debug!(name = %self.name, id, "deployment id changed");
            self.deployment_id = Some(id.to_string());
        }
    }

    pub fn record_recipe(&mut self, recipe_id: impl Into<String>) {
        self.recipe_ids.push(recipe_id.into());
    }

    pub fn realize(&mut self, id: RealizedId) {
        self.realized = Some(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realized_id_display() {
        let placeholder = RealizedId::placeholder("redis", "db1");
        assert_eq!(placeholder.to_string(), "redis::db1");
        assert!(placeholder.is_placeholder());

        let live = RealizedId::Live("5a1b2c".into());
        assert_eq!(live.to_string(), "5a1b2c");
        assert!(!live.is_placeholder());
    }

    #[test]
    fn test_step_names() {
        assert_eq!(Step::Resize { units: 2 }.name(), "resize");
        assert_eq!(Step::Lookup.name(), "lookup");
        assert!(!Step::Lookup.is_mutation());
        assert!(Step::Deprovision.is_mutation());
    }

    #[test]
    fn test_track_id() {
        let mut task = TaskState::new("db1", "redis", Some("a".into()));
        task.track_id("");
        assert_eq!(task.deployment_id.as_deref(), Some("a"));
        task.track_id("b");
        assert_eq!(task.deployment_id.as_deref(), Some("b"));
    }
}
