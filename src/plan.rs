//! Planning: desired state + platform snapshot → runners.
//!
//! Planning only reads from the platform. Every decision about what to
//! change is made here; the executor just carries it out.

use crate::backend::PlatformGateway;
use crate::config::{ConfigSet, DeploymentSpec, DeprovisionRequest, LookupRequest, PlacementTarget};
use crate::dry_run;
use crate::error::{DeployError, TargetFailure};
use crate::runner::{Action, ActionLabel, Runner, Target};
use crate::session::{ExistingDeployment, Session};
use crate::state::Step;
use crate::types::{DeploymentParams, Placement};
use crate::validate;
use crate::version;
use crate::workflow::WorkflowConfig;
use std::time::Duration;

/// Runners ready to execute, plus targets that could not be planned.
#[derive(Debug, Default)]
pub struct PlanOutcome {
    pub runners: Vec<Runner>,
    pub failures: Vec<TargetFailure>,
}

pub struct Planner<'a, B: PlatformGateway> {
    backend: &'a B,
    session: &'a mut Session,
    config: &'a WorkflowConfig,
}

impl<'a, B: PlatformGateway> Planner<'a, B> {
    pub fn new(backend: &'a B, session: &'a mut Session, config: &'a WorkflowConfig) -> Self {
        Self {
            backend,
            session,
            config,
        }
    }

    /// Plan every object in a config set.
    ///
    /// Targets that fail planning are reported in the outcome; the rest
    /// still get runners. A name used twice is fatal.
    pub async fn plan(&mut self, set: &ConfigSet) -> Result<PlanOutcome, DeployError> {
        set.check_names()?;

        let mut outcome = PlanOutcome::default();
        for spec in &set.deployments {
            match self.plan_deployment(spec).await {
                Ok(runner) => outcome.runners.push(runner),
                Err(error) => {
                    tracing::warn!(name = %spec.name, error = %error, "cannot plan deployment");
                    outcome.failures.push(TargetFailure::new(&spec.name, error));
                    if self.config.fail_fast {
                        return Ok(outcome);
                    }
                }
            }
        }
        for lookup in &set.lookups {
            outcome.runners.push(self.plan_lookup(lookup));
        }
        for request in &set.deprovisions {
            match self.plan_deprovision(request).await {
                Ok(Some(runner)) => outcome.runners.push(runner),
                Ok(None) => {}
                Err(error) => {
                    outcome
                        .failures
                        .push(TargetFailure::new(&request.target, error));
                    if self.config.fail_fast {
                        return Ok(outcome);
                    }
                }
            }
        }
        Ok(outcome)
    }

    /// Plan one deployment: create if absent, otherwise diff and update.
    #[tracing::instrument(skip_all, fields(name = %spec.name))]
    pub async fn plan_deployment(&mut self, spec: &DeploymentSpec) -> Result<Runner, DeployError> {
        let existing = self.session.existing(self.backend, &spec.name).await?;
        let runner = match existing {
            None => self.plan_create(spec)?,
            Some(existing) => self.plan_update(spec, &existing)?,
        };
        tracing::debug!(action = %runner.label, steps = runner.steps.len(), "planned");
        Ok(self.finish(runner))
    }

    /// A client-only lookup. Never validates, never mutates.
    pub fn plan_lookup(&self, request: &LookupRequest) -> Runner {
        let runner = Runner::new(
            Target {
                name: request.name.clone(),
                db_type: request.db_type.clone(),
                existing_id: None,
            },
            ActionLabel::single(Action::Lookup),
            vec![Step::Lookup],
            Duration::ZERO,
        );
        self.finish(runner)
    }

    /// Resolve a deprovision target by id, then by name. `None` when it
    /// matches nothing.
    #[tracing::instrument(skip_all, fields(target = %request.target))]
    pub async fn plan_deprovision(
        &self,
        request: &DeprovisionRequest,
    ) -> Result<Option<Runner>, DeployError> {
        let by_id = self
            .backend
            .get_deployment(&request.target)
            .await
            .map_err(|e| e.during("look up", &request.target))?;
        let deployment = match by_id {
            Some(deployment) => Some(deployment),
            None => self
                .backend
                .get_deployment_by_name(&request.target)
                .await
                .map_err(|e| e.during("look up", &request.target))?,
        };

        let Some(deployment) = deployment else {
            tracing::warn!("no deployment matches, skipping");
            return Ok(None);
        };

        let timeout = request
            .timeout
            .map(Duration::from_secs)
            .unwrap_or(self.config.deprovision_timeout);
        let runner = Runner::new(
            Target {
                name: deployment.name,
                db_type: deployment.db_type,
                existing_id: Some(deployment.id),
            },
            ActionLabel::single(Action::Deprovision),
            vec![Step::Deprovision],
            timeout,
        );
        Ok(Some(self.finish(runner)))
    }

    fn finish(&self, runner: Runner) -> Runner {
        if self.config.dry_run {
            dry_run::substitute(runner)
        } else {
            runner
        }
    }

    fn plan_create(&self, spec: &DeploymentSpec) -> Result<Runner, DeployError> {
        let mut rules = validate::new_deployment(spec);

        let placement = match spec.placement_target() {
            Some(PlacementTarget::Cluster(name)) => match self.session.cluster_id(&name) {
                Some(id) => Some(Placement::ClusterId(id.to_string())),
                None => {
                    rules.push(format!("Cluster '{name}' does not exist in this account"));
                    None
                }
            },
            Some(PlacementTarget::Datacenter(slug)) => {
                if self.session.has_datacenter(&slug) {
                    Some(Placement::Datacenter(slug))
                } else {
                    rules.push(format!("Datacenter '{slug}' is not available"));
                    None
                }
            }
            Some(PlacementTarget::Tags(tags)) => Some(Placement::ProvisioningTags(tags)),
            None => None,
        };

        let version = if spec.version.trim().is_empty() || !validate::is_valid_type(&spec.db_type)
        {
            None
        } else {
            match self.session.supported_versions(&spec.db_type) {
                Some(versions) => match version::resolve(&spec.version, versions) {
                    Ok(resolved) => resolved,
                    Err(error) => {
                        rules.push(error.to_string());
                        None
                    }
                },
                None => {
                    rules.push(format!(
                        "No versions of '{}' are available in this account",
                        spec.db_type
                    ));
                    None
                }
            }
        };

        let placement = match placement {
            Some(placement) if rules.is_empty() => placement,
            _ => return Err(validate::rejected(spec, rules)),
        };

        let params = DeploymentParams {
            name: spec.name.clone(),
            db_type: spec.db_type.clone(),
            placement,
            units: units(spec)?,
            version,
            notes: spec.notes.clone(),
            ssl: spec.ssl,
            wired_tiger: spec.wired_tiger_enabled(),
            cache_mode: spec.cache_mode_enabled(),
        };

        Ok(Runner::new(
            target(spec, None),
            ActionLabel::single(Action::Create),
            vec![
                Step::Create(params),
                Step::SyncTeamRoles {
                    roles: spec.team_roles(),
                },
            ],
            spec.timeout(),
        ))
    }

    fn plan_update(
        &self,
        spec: &DeploymentSpec,
        existing: &ExistingDeployment,
    ) -> Result<Runner, DeployError> {
        let rules = validate::existing_deployment(spec);
        if !rules.is_empty() {
            return Err(validate::rejected(spec, rules));
        }

        let mut actions = Vec::new();
        let mut steps = Vec::new();

        let desired = units(spec)?;
        if desired != existing.allocated_units {
            if desired < existing.utilized_units {
                if self.config.strict_floor {
                    return Err(validate::rejected(
                        spec,
                        vec![format!(
                            "Deployment scaling {desired} is below the {} units in use",
                            existing.utilized_units
                        )],
                    ));
                }
                tracing::warn!(
                    desired,
                    utilized = existing.utilized_units,
                    "refusing to scale below utilized units"
                );
            } else {
                actions.push(Action::Resize);
                steps.push(Step::Resize { units: desired });
            }
        }

        if !version::satisfies(&spec.version, &existing.version) {
            let target_version = version::resolve(&spec.version, &existing.upgrade_targets)
                .map_err(|_| DeployError::Version {
                    constraint: spec.version.clone(),
                    reason: format!(
                        "no in-place upgrade from {} satisfies it",
                        existing.version
                    ),
                })?;
            if let Some(version) = target_version {
                actions.push(Action::UpgradeVersion);
                steps.push(Step::Upgrade { version });
            }
        }

        if !spec.notes.is_empty() && spec.notes != existing.notes {
            actions.push(Action::UpdateNotes);
            steps.push(Step::UpdateNotes {
                notes: spec.notes.clone(),
            });
        }

        steps.push(Step::SyncTeamRoles {
            roles: spec.team_roles(),
        });
        steps.push(Step::Lookup);

        Ok(Runner::new(
            target(spec, Some(existing.id.clone())),
            ActionLabel::from_actions(actions),
            steps,
            spec.timeout(),
        ))
    }
}

fn target(spec: &DeploymentSpec, existing_id: Option<String>) -> Target {
    Target {
        name: spec.name.clone(),
        db_type: spec.db_type.clone(),
        existing_id,
    }
}

fn units(spec: &DeploymentSpec) -> Result<u32, DeployError> {
    u32::try_from(spec.scaling)
        .ok()
        .filter(|units| *units >= 1)
        .ok_or_else(|| {
            validate::rejected(
                spec,
                vec![format!("Deployment scaling must be at least 1, got {}", spec.scaling)],
            )
        })
}
