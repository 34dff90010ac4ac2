//! The One Trait: PlatformGateway
//!
//! This is the single abstraction point for the remote database platform.
//! The planner and executor are pure logic. They don't know about HTTP,
//! authentication, or wire formats. That's YOUR problem when you
//! implement this trait.

use crate::error::DeployError;
use crate::types::*;
use std::future::Future;

/// Capability set consumed from the remote platform.
///
/// Every call may fail with [`DeployError::Api`]. Nothing here retries;
/// the executor attaches operation and target names to failures.
pub trait PlatformGateway: Send + Sync {
    // ═══════════════════════════════════════════════════════════════
    // DEPLOYMENT QUERIES (read-only)
    // ═══════════════════════════════════════════════════════════════

    /// Fetch a deployment by platform id. `None` if it does not exist.
    fn get_deployment(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<Deployment>, DeployError>> + Send;

    /// Fetch a deployment by name. `None` if it does not exist.
    fn get_deployment_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<Deployment>, DeployError>> + Send;

    /// Current scaling of a deployment.
    fn get_scalings(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Scalings, DeployError>> + Send;

    /// Legal version transitions from the deployment's current version.
    fn get_version_transitions(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Vec<VersionTransition>, DeployError>> + Send;

    /// Roles currently granted on a deployment.
    fn get_team_roles(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Vec<TeamRole>, DeployError>> + Send;

    /// Poll an asynchronous operation.
    fn get_recipe(
        &self,
        recipe_id: &str,
    ) -> impl Future<Output = Result<Recipe, DeployError>> + Send;

    // ═══════════════════════════════════════════════════════════════
    // ACCOUNT CATALOGS (read-only, loaded once per run)
    // ═══════════════════════════════════════════════════════════════

    fn list_clusters(&self) -> impl Future<Output = Result<Vec<Cluster>, DeployError>> + Send;

    fn list_datacenters(
        &self,
    ) -> impl Future<Output = Result<Vec<Datacenter>, DeployError>> + Send;

    /// Supported database types and the versions each can be created at.
    fn list_databases(
        &self,
    ) -> impl Future<Output = Result<Vec<DatabaseVersions>, DeployError>> + Send;

    // ═══════════════════════════════════════════════════════════════
    // MUTATIONS
    // ═══════════════════════════════════════════════════════════════

    /// Create a deployment. Returns its id and provisioning recipe.
    fn create_deployment(
        &self,
        params: &DeploymentParams,
    ) -> impl Future<Output = Result<CreatedDeployment, DeployError>> + Send;

    /// Change allocated units.
    fn set_scalings(
        &self,
        id: &str,
        units: u32,
    ) -> impl Future<Output = Result<Recipe, DeployError>> + Send;

    /// Upgrade in place to `version`.
    fn update_version(
        &self,
        id: &str,
        version: &str,
    ) -> impl Future<Output = Result<Recipe, DeployError>> + Send;

    /// Replace the free-text notes.
    fn patch_notes(
        &self,
        id: &str,
        notes: &str,
    ) -> impl Future<Output = Result<(), DeployError>> + Send;

    /// Grant `role` on a deployment to one team.
    fn create_team_role(
        &self,
        id: &str,
        role: &str,
        team_id: &str,
    ) -> impl Future<Output = Result<(), DeployError>> + Send;

    /// Start deprovisioning a deployment.
    fn deprovision(&self, id: &str) -> impl Future<Output = Result<Recipe, DeployError>> + Send;
}
