//! Runners: the unit of planned work for one target.
//!
//! The planner produces one [`Runner`] per target. A runner carries a
//! display label and a fixed step list; the executor walks the steps in
//! order through a [`StepHandler`].

use crate::config::TeamRoles;
use crate::error::DeployError;
use crate::state::{Step, TaskState};
use crate::types::DeploymentParams;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Prefix on every label of a dry-run runner.
pub const DRY_RUN_PREFIX: &str = "Dry run: ";

/// User-visible action kinds. Team-role sync is implicit and never shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Action {
    Lookup,
    Create,
    Resize,
    UpgradeVersion,
    UpdateNotes,
    Deprovision,
}

impl Action {
    pub fn verb(&self) -> &'static str {
        match self {
            Action::Lookup => "Looking up",
            Action::Create => "Creating",
            Action::Resize => "Resizing",
            Action::UpgradeVersion => "Upgrading",
            Action::UpdateNotes => "Commenting on",
            Action::Deprovision => "Deprovisioning",
        }
    }
}

/// Ordered, non-empty set of actions a runner performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionLabel {
    actions: Vec<Action>,
    dry_run: bool,
}

impl ActionLabel {
    pub fn single(action: Action) -> Self {
        Self {
            actions: vec![action],
            dry_run: false,
        }
    }

    /// Build a label from an action list. An empty list is a lookup.
    pub fn from_actions(actions: Vec<Action>) -> Self {
        if actions.is_empty() {
            return Self::single(Action::Lookup);
        }
        Self {
            actions,
            dry_run: false,
        }
    }

    pub fn contains(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }

    pub fn is_lookup(&self) -> bool {
        self.actions == [Action::Lookup]
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub(crate) fn into_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

impl fmt::Display for ActionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            f.write_str(DRY_RUN_PREFIX)?;
        }
        for (i, action) in self.actions.iter().enumerate() {
            if i > 0 {
                f.write_str(" and ")?;
            }
            f.write_str(action.verb())?;
        }
        Ok(())
    }
}

/// What a runner acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub db_type: String,
    /// Platform id when the deployment already exists.
    pub existing_id: Option<String>,
}

/// One target's planned work. Built once, never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Runner {
    pub target: Target,
    pub label: ActionLabel,
    pub steps: Vec<Step>,
    /// How long to wait on each recipe. Zero means don't wait.
    pub timeout: Duration,
    pub dry_run: bool,
}

impl Runner {
    pub fn new(target: Target, label: ActionLabel, steps: Vec<Step>, timeout: Duration) -> Self {
        Self {
            target,
            label,
            steps,
            timeout,
            dry_run: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.target.name
    }

    /// Fresh task state for one execution of this runner.
    pub fn task(&self) -> TaskState {
        TaskState::new(
            &self.target.name,
            &self.target.db_type,
            self.target.existing_id.clone(),
        )
        .with_timeout(self.timeout)
    }

    /// Log line such as `Creating 'db1'`.
    pub fn describe(&self) -> String {
        format!("{} '{}'", self.label, self.target.name)
    }
}

/// Executes individual steps. Every step kind has a live and a dry-run
/// handler; [`Step::dispatch`] picks one.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn create(&self, task: &mut TaskState, params: &DeploymentParams)
        -> Result<(), DeployError>;

    async fn resize(&self, task: &mut TaskState, units: u32) -> Result<(), DeployError>;

    async fn upgrade(&self, task: &mut TaskState, version: &str) -> Result<(), DeployError>;

    async fn update_notes(&self, task: &mut TaskState, notes: &str) -> Result<(), DeployError>;

    async fn sync_team_roles(
        &self,
        task: &mut TaskState,
        roles: &TeamRoles,
    ) -> Result<(), DeployError>;

    async fn lookup(&self, task: &mut TaskState) -> Result<(), DeployError>;

    async fn deprovision(&self, task: &mut TaskState) -> Result<(), DeployError>;

    /// Record a placeholder instead of creating.
    async fn dry_run_create(
        &self,
        task: &mut TaskState,
        params: &DeploymentParams,
    ) -> Result<(), DeployError>;

    /// Stand-in for resize, upgrade, notes and team sync: records the
    /// existing id without changing anything.
    async fn dry_run_mutate(&self, task: &mut TaskState, step: &Step) -> Result<(), DeployError>;

    /// Read-only lookup that tolerates a missing deployment.
    async fn dry_run_lookup(&self, task: &mut TaskState) -> Result<(), DeployError>;

    async fn dry_run_deprovision(&self, task: &mut TaskState) -> Result<(), DeployError>;
}

impl Step {
    /// Route this step to the matching handler method.
    pub async fn dispatch<H>(
        &self,
        handler: &H,
        task: &mut TaskState,
        dry_run: bool,
    ) -> Result<(), DeployError>
    where
        H: StepHandler + ?Sized,
    {
        match (self, dry_run) {
            (Step::Create(params), false) => handler.create(task, params).await,
            (Step::Create(params), true) => handler.dry_run_create(task, params).await,
            (Step::Resize { units }, false) => handler.resize(task, *units).await,
            (Step::Upgrade { version }, false) => handler.upgrade(task, version).await,
            (Step::UpdateNotes { notes }, false) => handler.update_notes(task, notes).await,
            (Step::SyncTeamRoles { roles }, false) => handler.sync_team_roles(task, roles).await,
            (
                Step::Resize { .. }
                | Step::Upgrade { .. }
                | Step::UpdateNotes { .. }
                | Step::SyncTeamRoles { .. },
                true,
            ) => handler.dry_run_mutate(task, self).await,
            (Step::Lookup, false) => handler.lookup(task).await,
            (Step::Lookup, true) => handler.dry_run_lookup(task).await,
            (Step::Deprovision, false) => handler.deprovision(task).await,
            (Step::Deprovision, true) => handler.dry_run_deprovision(task).await,
        }
    }
}
