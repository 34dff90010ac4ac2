//! Reconciliation Workflow Engine
//!
//! Drives one run end to end: load the platform snapshot, plan every
//! target, execute the runners, then publish connection info for what
//! was realized. No transport, no config parsing. Just sequencing.

use crate::backend::PlatformGateway;
use crate::config::{ConfigObject, ConfigSet, DeprovisionRequest, TargetFilter};
use crate::error::{DeployError, TargetFailure};
use crate::executor::{ExecutorConfig, TaskExecutor};
use crate::output::{
    EndpointMap, OutputBuilder, OutputDestination, OutputDocument, DEFAULT_OUTPUT_PATH,
};
use crate::plan::{PlanOutcome, Planner};
use crate::recipe::DEFAULT_POLLING_INTERVAL;
use crate::session::Session;
use crate::status::TargetProgress;
use std::time::Duration;

/// Recipe timeout for deprovision requests that don't set one.
pub const DEFAULT_DEPROVISION_TIMEOUT: Duration = Duration::from_secs(300);

/// Workflow configuration.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Plan and report, but never mutate the platform.
    pub dry_run: bool,
    /// Stop dispatching new work after the first failure.
    pub fail_fast: bool,
    /// Fail a target whose desired scaling is below utilized units
    /// instead of skipping the resize.
    pub strict_floor: bool,
    /// How long to wait between recipe polls.
    pub polling_interval: Duration,
    /// Recipe timeout for deprovision requests.
    pub deprovision_timeout: Duration,
    /// Where to write connection info. `None` skips writing.
    pub output: Option<OutputDestination>,
    /// Only plan deployments in these clusters/datacenters.
    pub filter: TargetFilter,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            fail_fast: false,
            strict_floor: false,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            deprovision_timeout: DEFAULT_DEPROVISION_TIMEOUT,
            output: Some(OutputDestination::parse(DEFAULT_OUTPUT_PATH)),
            filter: TargetFilter::default(),
        }
    }
}

impl WorkflowConfig {
    fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            polling_interval: self.polling_interval,
            fail_fast: self.fail_fast,
        }
    }
}

/// What a run did.
#[derive(Debug, Default)]
pub struct RunReport {
    /// (target, rendered label) for every planned runner, in plan order.
    pub actions: Vec<(String, String)>,
    /// Final status of every runner, sorted by target.
    pub statuses: Vec<(String, TargetProgress)>,
    /// Every failure: planning, execution and output collection.
    pub failures: Vec<TargetFailure>,
    /// Connection info for realized deployments.
    pub output: OutputDocument,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// The output document, or every failure aggregated.
    pub fn into_result(self) -> Result<OutputDocument, DeployError> {
        if self.failures.is_empty() {
            Ok(self.output)
        } else {
            Err(DeployError::Aggregate(self.failures))
        }
    }
}

/// The reconciliation workflow.
///
/// Parameterized by the gateway: you provide the implementation.
pub struct DeploymentWorkflow<'a, B: PlatformGateway> {
    backend: &'a B,
    config: WorkflowConfig,
}

impl<'a, B: PlatformGateway> DeploymentWorkflow<'a, B> {
    pub fn new(backend: &'a B, config: WorkflowConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Reconcile a config set.
    ///
    /// Errors returned here mean nothing was published: a fatal
    /// configuration problem, a catalog that could not be loaded, or the
    /// first failure of a fail-fast run. Anything else is reported per
    /// target in the [`RunReport`].
    #[tracing::instrument(skip_all, fields(dry_run = self.config.dry_run))]
    pub async fn reconcile(&self, set: &ConfigSet) -> Result<RunReport, DeployError> {
        if set.is_empty() {
            tracing::info!("nothing to reconcile");
        }

        let mut session = Session::load(self.backend).await?;
        let plan = Planner::new(self.backend, &mut session, &self.config)
            .plan(set)
            .await?;
        self.run(plan, set.endpoint_map.clone()).await
    }

    /// Assemble a config set with this workflow's filters, then
    /// reconcile it. Integrity errors abort before the platform is touched.
    pub async fn reconcile_objects(
        &self,
        objects: impl IntoIterator<Item = ConfigObject>,
    ) -> Result<RunReport, DeployError> {
        let set = ConfigSet::from_objects(objects, &self.config.filter)?;
        self.reconcile(&set).await
    }

    /// Deprovision targets by id or name. Unmatched targets are skipped.
    #[tracing::instrument(skip_all, fields(targets = requests.len()))]
    pub async fn deprovision(
        &self,
        requests: &[DeprovisionRequest],
    ) -> Result<RunReport, DeployError> {
        let set = ConfigSet {
            deprovisions: requests.to_vec(),
            ..ConfigSet::default()
        };
        let mut session = Session::default();
        let plan = Planner::new(self.backend, &mut session, &self.config)
            .plan(&set)
            .await?;
        self.run(plan, set.endpoint_map).await
    }

    async fn run(
        &self,
        mut plan: PlanOutcome,
        endpoint_map: EndpointMap,
    ) -> Result<RunReport, DeployError> {
        if self.config.fail_fast && !plan.failures.is_empty() {
            return Err(plan.failures.remove(0).error);
        }

        let mut report = RunReport {
            actions: plan
                .runners
                .iter()
                .map(|r| (r.name().to_string(), r.label.to_string()))
                .collect(),
            failures: plan.failures,
            ..RunReport::default()
        };

        let executor = TaskExecutor::new(self.backend, self.config.executor_config());
        let mut outcome = executor.execute(&plan.runners).await;
        report.statuses = executor.status().snapshot();

        if self.config.fail_fast && !outcome.failures.is_empty() {
            return Err(outcome.failures.remove(0).error);
        }
        report.failures.append(&mut outcome.failures);

        let mut builder = OutputBuilder::new(endpoint_map);
        let mut output_failures = builder.collect(self.backend, &outcome.realized).await?;
        report.failures.append(&mut output_failures);
        report.output = builder.into_document();

        if let Some(destination) = &self.config.output {
            if !report.output.is_empty() {
                destination.write(&report.output).await?;
            }
        }

        tracing::info!(
            runners = report.actions.len(),
            realized = report.output.len(),
            failures = report.failures.len(),
            "run finished"
        );
        Ok(report)
    }
}

#[cfg(all(test, feature = "memory-platform"))]
mod tests {
    use super::*;
    use crate::config::DeploymentSpec;
    use crate::memory::InMemoryPlatform;

    fn config() -> WorkflowConfig {
        WorkflowConfig {
            output: None,
            polling_interval: Duration::from_millis(10),
            ..WorkflowConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = WorkflowConfig::default();
        assert_eq!(config.polling_interval, Duration::from_secs(5));
        assert_eq!(config.deprovision_timeout, Duration::from_secs(300));
        assert_eq!(
            config.output,
            Some(OutputDestination::File(DEFAULT_OUTPUT_PATH.into()))
        );
        assert!(!config.dry_run);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_creates_and_outputs() {
        let platform = InMemoryPlatform::new().with_cluster("prod", "cluster-1");
        let set = ConfigSet::from_deployments(vec![
            DeploymentSpec::new("db1", "redis").with_cluster("prod")
        ])
        .unwrap();

        let report = DeploymentWorkflow::new(&platform, config())
            .reconcile(&set)
            .await
            .unwrap();
        assert!(report.is_success(), "{:?}", report.failures);
        assert_eq!(report.actions, vec![("db1".to_string(), "Creating".to_string())]);
        assert_eq!(report.output["db1"].db_type, "redis");
    }

    #[tokio::test(start_paused = true)]
    async fn test_catalog_failure_aborts() {
        let platform = InMemoryPlatform::new();
        platform.fail("list_databases", "503");
        let set = ConfigSet::from_deployments(vec![
            DeploymentSpec::new("db1", "redis").with_cluster("prod")
        ])
        .unwrap();

        let result = DeploymentWorkflow::new(&platform, config())
            .reconcile(&set)
            .await;
        assert!(result.is_err());
        assert!(platform.mutations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_returns_first_planning_error() {
        let platform = InMemoryPlatform::new().with_cluster("prod", "cluster-1");
        let set = ConfigSet::from_deployments(vec![
            DeploymentSpec::new("bad", "oracle").with_cluster("prod"),
            DeploymentSpec::new("db1", "redis").with_cluster("prod"),
        ])
        .unwrap();

        let err = DeploymentWorkflow::new(
            &platform,
            WorkflowConfig {
                fail_fast: true,
                ..config()
            },
        )
        .reconcile(&set)
        .await
        .unwrap_err();
        assert!(matches!(err, DeployError::Validation { .. }));
        assert!(platform.mutations().is_empty());
    }
}
