//! DBaaS Deploy Library
//!
//! Declarative, idempotent reconciliation engine for managed database
//! deployments.
//!
//! # Design
//!
//! You describe the deployments you want; the engine compares that with
//! what the platform reports, plans the smallest set of changes (create,
//! resize, in-place upgrade, notes, additive team grants), runs them
//! concurrently, and writes out connection info for everything it
//! touched. Running it twice against an unchanged platform is a lookup.
//!
//! The engine is coupled to no transport. You implement the
//! [`PlatformGateway`] trait against your platform's API, and the
//! workflow does the rest.
//!
//! # Usage
//!
//! ```ignore
//! use dbaas_deploy_rs::{
//!     ConfigSet, DeploymentSpec, DeploymentWorkflow, PlatformGateway, WorkflowConfig,
//! };
//!
//! // Implement PlatformGateway for your platform
//! struct MyGateway { /* ... */ }
//! impl PlatformGateway for MyGateway { /* ... */ }
//!
//! let set = ConfigSet::from_deployments(vec![
//!     DeploymentSpec::new("db1", "redis")
//!         .with_cluster("prod")
//!         .with_scaling(2)
//!         .with_team("admin", "team-ops"),
//! ])?;
//!
//! let gateway = MyGateway::new();
//! let workflow = DeploymentWorkflow::new(&gateway, WorkflowConfig::default());
//! let report = workflow.reconcile(&set).await?;
//!
//! for (target, action) in &report.actions {
//!     println!("{action} '{target}'");
//! }
//! report.into_result()?;
//! ```

pub mod backend;
pub mod config;
pub mod dry_run;
pub mod error;
pub mod executor;
pub mod output;
pub mod plan;
pub mod recipe;
pub mod runner;
pub mod session;
pub mod state;
pub mod status;
pub mod teams;
pub mod types;
pub mod validate;
pub mod version;
pub mod workflow;

#[cfg(feature = "memory-platform")]
pub mod memory;

// Re-export the main types at crate root for convenience
pub use backend::PlatformGateway;
pub use config::{
    ConfigObject, ConfigSet, DeploymentSpec, DeprovisionRequest, LookupRequest, PlacementTarget,
    TargetFilter, TeamGrant, TeamRoles,
};
pub use error::{DeployError, TargetFailure};
pub use executor::{ExecutionOutcome, ExecutorConfig, TaskExecutor};
pub use output::{
    ConnectionRecord, DeploymentOutput, EndpointMap, OutputBuilder, OutputDestination,
    OutputDocument, OutputFormat,
};
pub use plan::{PlanOutcome, Planner};
pub use recipe::{RecipeHandle, RecipeWaiter};
pub use runner::{Action, ActionLabel, Runner, StepHandler, Target};
pub use session::{ExistingDeployment, Session};
pub use state::{RealizedId, Step, TaskState};
pub use status::{StatusBoard, TargetProgress, TargetStatus};
pub use teams::TeamRoleReconciler;
pub use types::*;
pub use workflow::{DeploymentWorkflow, RunReport, WorkflowConfig};

#[cfg(feature = "memory-platform")]
pub use memory::{GatewayCall, InMemoryPlatform};
