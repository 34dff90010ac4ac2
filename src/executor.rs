//! Concurrent execution of runners.
//!
//! Every runner is driven on its own future and polled together on the
//! caller's task. Steps within a runner are strictly sequential; runners
//! share nothing but the status board and the realized-id set, both of
//! which are concurrent maps.

use crate::backend::PlatformGateway;
use crate::config::TeamRoles;
use crate::error::{DeployError, TargetFailure};
use crate::recipe::{RecipeHandle, RecipeWaiter, DEFAULT_POLLING_INTERVAL};
use crate::runner::{Runner, StepHandler};
use crate::state::{RealizedId, Step, TaskState};
use crate::status::{StatusBoard, TargetStatus};
use crate::teams::TeamRoleReconciler;
use crate::types::{DeploymentParams, Recipe};
use async_trait::async_trait;
use dashmap::DashSet;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Interval between recipe polls.
    pub polling_interval: Duration,
    /// Stop dispatching new work after the first failure.
    pub fail_fast: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            polling_interval: DEFAULT_POLLING_INTERVAL,
            fail_fast: false,
        }
    }
}

/// Result of executing a batch of runners.
#[derive(Debug, Default)]
pub struct ExecutionOutcome {
    /// Identities to include in the output, sorted.
    pub realized: Vec<RealizedId>,
    /// Failures in the order they were observed.
    pub failures: Vec<TargetFailure>,
    /// Targets never started because the run was aborted.
    pub skipped: Vec<String>,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Collapse into a single result.
    ///
    /// Fail-fast callers get the first failure as-is; otherwise every
    /// failure is reported together.
    pub fn into_result(mut self, fail_fast: bool) -> Result<Vec<RealizedId>, DeployError> {
        if self.failures.is_empty() {
            return Ok(self.realized);
        }
        if fail_fast {
            return Err(self.failures.remove(0).error);
        }
        Err(DeployError::Aggregate(self.failures))
    }
}

pub struct TaskExecutor<'a, B: PlatformGateway> {
    backend: &'a B,
    config: ExecutorConfig,
    status: StatusBoard,
    realized: DashSet<RealizedId>,
    aborted: AtomicBool,
}

impl<'a, B: PlatformGateway> TaskExecutor<'a, B> {
    pub fn new(backend: &'a B, config: ExecutorConfig) -> Self {
        Self {
            backend,
            config,
            status: StatusBoard::new(),
            realized: DashSet::new(),
            aborted: AtomicBool::new(false),
        }
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    /// Run every runner to completion and collect the results.
    ///
    /// Returns once all runners have finished, failed, or been skipped.
    #[tracing::instrument(skip_all, fields(runners = runners.len()))]
    pub async fn execute(&self, runners: &[Runner]) -> ExecutionOutcome {
        for runner in runners {
            self.status.register(runner.name(), runner.label.to_string());
        }

        let mut in_flight: FuturesUnordered<_> = runners
            .iter()
            .map(|runner| async move { (runner.name(), self.run_one(runner).await) })
            .collect();

        let mut outcome = ExecutionOutcome::default();
        while let Some((name, result)) = in_flight.next().await {
            match result {
                Ok(RunnerEnd::Finished) => self.status.set_status(name, TargetStatus::Done),
                Ok(RunnerEnd::Skipped) => {
                    self.status.set_status(name, TargetStatus::Skipped);
                    outcome.skipped.push(name.to_string());
                }
                Err(error) => {
                    tracing::warn!(target_name = %name, error = %error, "target failed");
                    self.status.set_status(name, TargetStatus::Failed);
                    if self.config.fail_fast {
                        self.aborted.store(true, Ordering::SeqCst);
                    }
                    outcome.failures.push(TargetFailure::new(name, error));
                }
            }
        }

        let mut realized: Vec<RealizedId> =
            self.realized.iter().map(|id| id.key().clone()).collect();
        realized.sort();
        outcome.realized = realized;
        outcome.skipped.sort();
        outcome
    }

    async fn run_one(&self, runner: &Runner) -> Result<RunnerEnd, DeployError> {
        let mut task = runner.task();
        self.status.set_status(runner.name(), TargetStatus::Running);
        tracing::info!("{}", runner.describe());

        for step in &runner.steps {
            if self.aborted.load(Ordering::SeqCst) {
                tracing::debug!(target_name = %runner.name(), "run aborted, skipping remaining steps");
                return Ok(RunnerEnd::Skipped);
            }
            self.status.set_step(runner.name(), step.name());
            step.dispatch(self, &mut task, runner.dry_run).await?;
            task.completed.push(step.name());
        }

        if let Some(id) = task.realized.take() {
            self.realized.insert(id);
        }
        Ok(RunnerEnd::Finished)
    }

    fn require_id(task: &TaskState, operation: &str) -> Result<String, DeployError> {
        task.deployment_id.clone().ok_or_else(|| {
            DeployError::InvalidState(format!(
                "cannot {operation} '{}': no deployment id",
                task.name
            ))
        })
    }

    /// Wait on a recipe and move the task to the id it reports.
    async fn settle(&self, task: &mut TaskState, recipe: Recipe) -> Result<(), DeployError> {
        task.record_recipe(&recipe.id);
        task.track_id(&recipe.deployment_id);

        let handle = RecipeHandle::new(&recipe.id, task.timeout);
        let waiter = RecipeWaiter::new(self.backend, self.config.polling_interval);
        if let Some(done) = waiter.wait(&handle).await? {
            task.track_id(&done.deployment_id);
        }
        Ok(())
    }
}

enum RunnerEnd {
    Finished,
    Skipped,
}

#[async_trait]
impl<'a, B: PlatformGateway> StepHandler for TaskExecutor<'a, B> {
    async fn create(
        &self,
        task: &mut TaskState,
        params: &DeploymentParams,
    ) -> Result<(), DeployError> {
        let created = self
            .backend
            .create_deployment(params)
            .await
            .map_err(|e| e.during("create", &task.name))?;
        tracing::info!(name = %task.name, id = %created.id, "deployment created");

        task.deployment_id = Some(created.id.clone());
        task.record_recipe(&created.provision_recipe_id);

        let handle = RecipeHandle::new(&created.provision_recipe_id, task.timeout);
        let waiter = RecipeWaiter::new(self.backend, self.config.polling_interval);
        if let Some(done) = waiter.wait(&handle).await? {
            task.track_id(&done.deployment_id);
        }

        let id = Self::require_id(task, "create")?;
        task.realize(RealizedId::Live(id));
        Ok(())
    }

    async fn resize(&self, task: &mut TaskState, units: u32) -> Result<(), DeployError> {
        let id = Self::require_id(task, "resize")?;
        let recipe = self
            .backend
            .set_scalings(&id, units)
            .await
            .map_err(|e| e.during("resize", &task.name))?;
        tracing::info!(name = %task.name, units, "resize started");
        self.settle(task, recipe).await
    }

    async fn upgrade(&self, task: &mut TaskState, version: &str) -> Result<(), DeployError> {
        let id = Self::require_id(task, "upgrade")?;
        let recipe = self
            .backend
            .update_version(&id, version)
            .await
            .map_err(|e| e.during("upgrade", &task.name))?;
        tracing::info!(name = %task.name, version, "upgrade started");
        self.settle(task, recipe).await
    }

    async fn update_notes(&self, task: &mut TaskState, notes: &str) -> Result<(), DeployError> {
        let id = Self::require_id(task, "update notes on")?;
        self.backend
            .patch_notes(&id, notes)
            .await
            .map_err(|e| e.during("update notes", &task.name))
    }

    async fn sync_team_roles(
        &self,
        task: &mut TaskState,
        roles: &TeamRoles,
    ) -> Result<(), DeployError> {
        let id = Self::require_id(task, "sync team roles on")?;
        let granted = TeamRoleReconciler::new(self.backend)
            .reconcile(&id, roles)
            .await?;
        if granted > 0 {
            tracing::debug!(name = %task.name, granted, "team roles synced");
        }
        Ok(())
    }

    async fn lookup(&self, task: &mut TaskState) -> Result<(), DeployError> {
        let deployment = self
            .backend
            .get_deployment_by_name(&task.name)
            .await
            .map_err(|e| e.during("look up", &task.name))?
            .ok_or_else(|| {
                DeployError::InvalidState(format!("deployment '{}' does not exist", task.name))
            })?;

        task.track_id(&deployment.id);
        task.realize(RealizedId::Live(deployment.id));
        Ok(())
    }

    async fn deprovision(&self, task: &mut TaskState) -> Result<(), DeployError> {
        let id = Self::require_id(task, "deprovision")?;
        let recipe = self
            .backend
            .deprovision(&id)
            .await
            .map_err(|e| e.during("deprovision", &task.name))?;
        tracing::info!(name = %task.name, id = %id, "deprovision started");
        task.record_recipe(&recipe.id);

        let handle = RecipeHandle::new(&recipe.id, task.timeout);
        RecipeWaiter::new(self.backend, self.config.polling_interval)
            .wait(&handle)
            .await?;
        Ok(())
    }

    async fn dry_run_create(
        &self,
        task: &mut TaskState,
        params: &DeploymentParams,
    ) -> Result<(), DeployError> {
        tracing::debug!(name = %params.name, "dry run: would create");
        task.realize(RealizedId::placeholder(&params.db_type, &params.name));
        Ok(())
    }

    async fn dry_run_mutate(&self, task: &mut TaskState, step: &Step) -> Result<(), DeployError> {
        tracing::debug!(name = %task.name, step = step.name(), "dry run: would apply");
        // Without an id this follows a dry-run create; the placeholder stands.
        if let Some(id) = task.deployment_id.clone() {
            task.realize(RealizedId::Live(id));
        }
        Ok(())
    }

    async fn dry_run_lookup(&self, task: &mut TaskState) -> Result<(), DeployError> {
        match self.backend.get_deployment_by_name(&task.name).await {
            Ok(Some(deployment)) => {
                task.track_id(&deployment.id);
                task.realize(RealizedId::Live(deployment.id));
            }
            Ok(None) => task.realize(RealizedId::placeholder(&task.db_type, &task.name)),
            Err(error) => {
                tracing::debug!(name = %task.name, error = %error, "dry run: lookup failed, using placeholder");
                task.realize(RealizedId::placeholder(&task.db_type, &task.name));
            }
        }
        Ok(())
    }

    async fn dry_run_deprovision(&self, task: &mut TaskState) -> Result<(), DeployError> {
        tracing::debug!(name = %task.name, "dry run: would deprovision");
        Ok(())
    }
}

#[cfg(all(test, feature = "memory-platform"))]
mod tests {
    use super::*;
    use crate::memory::InMemoryPlatform;
    use crate::runner::{Action, ActionLabel, Target};
    use crate::types::Scalings;

    fn seed(platform: &InMemoryPlatform, name: &str) -> String {
        platform.seed(
            name,
            "redis",
            "4.0.1",
            Scalings {
                allocated_units: 1,
                utilized_units: 1,
            },
        )
    }

    fn lookup(name: &str) -> Runner {
        Runner::new(
            Target {
                name: name.into(),
                db_type: "redis".into(),
                existing_id: None,
            },
            ActionLabel::single(Action::Lookup),
            vec![Step::Lookup],
            Duration::ZERO,
        )
    }

    fn resize(name: &str, id: &str, units: u32) -> Runner {
        Runner::new(
            Target {
                name: name.into(),
                db_type: "redis".into(),
                existing_id: Some(id.into()),
            },
            ActionLabel::single(Action::Resize),
            vec![Step::Resize { units }, Step::Lookup],
            Duration::from_secs(60),
        )
    }

    fn config(fail_fast: bool) -> ExecutorConfig {
        ExecutorConfig {
            polling_interval: Duration::from_secs(1),
            fail_fast,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_skips_remaining_steps() {
        let platform = InMemoryPlatform::new().with_polls_to_complete(3);
        let id = seed(&platform, "slow");
        let runners = vec![resize("slow", &id, 2), lookup("bad")];

        let executor = TaskExecutor::new(&platform, config(true));
        let outcome = executor.execute(&runners).await;

        let failed: Vec<_> = outcome.failures.iter().map(|f| f.target.as_str()).collect();
        assert_eq!(failed, vec!["bad"]);
        assert_eq!(outcome.skipped, vec!["slow".to_string()]);
        assert!(outcome.realized.is_empty());

        let status = executor.status();
        assert_eq!(status.get("slow").unwrap().status, TargetStatus::Skipped);
        assert_eq!(status.get("bad").unwrap().status, TargetStatus::Failed);
        assert_eq!(status.count(TargetStatus::Skipped), 1);

        let err = outcome.into_result(true).unwrap_err();
        assert!(matches!(err, DeployError::InvalidState(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_continue_on_error_runs_every_target() {
        let platform = InMemoryPlatform::new();
        let id = seed(&platform, "db1");
        let runners = vec![lookup("missing-a"), lookup("db1"), lookup("missing-b")];

        let executor = TaskExecutor::new(&platform, config(false));
        let outcome = executor.execute(&runners).await;

        let mut failed: Vec<_> = outcome.failures.iter().map(|f| f.target.clone()).collect();
        failed.sort();
        assert_eq!(failed, vec!["missing-a".to_string(), "missing-b".to_string()]);
        assert!(outcome.skipped.is_empty());
        assert_eq!(outcome.realized, vec![RealizedId::Live(id)]);
        assert_eq!(executor.status().count(TargetStatus::Done), 1);
        assert_eq!(executor.status().count(TargetStatus::Failed), 2);

        let err = outcome.into_result(false).unwrap_err();
        assert!(matches!(err, DeployError::Aggregate(ref failures) if failures.len() == 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_realized_ids_are_deduplicated_and_sorted() {
        let platform = InMemoryPlatform::new();
        let zeta = seed(&platform, "zeta");
        let alpha = seed(&platform, "alpha");
        assert!(zeta < alpha);

        let notes = Runner {
            dry_run: true,
            ..Runner::new(
                Target {
                    name: "alpha-notes".into(),
                    db_type: "redis".into(),
                    existing_id: Some(alpha.clone()),
                },
                ActionLabel::single(Action::UpdateNotes),
                vec![Step::UpdateNotes {
                    notes: "owned by ops".into(),
                }],
                Duration::ZERO,
            )
        };
        let runners = vec![lookup("alpha"), notes, lookup("zeta")];

        let outcome = TaskExecutor::new(&platform, config(false))
            .execute(&runners)
            .await;

        assert!(outcome.is_success(), "{:?}", outcome.failures);
        assert_eq!(
            outcome.realized,
            vec![RealizedId::Live(zeta), RealizedId::Live(alpha)]
        );
        assert!(platform.mutations().is_empty());
    }
}
