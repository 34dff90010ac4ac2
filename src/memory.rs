//! In-process platform.
//!
//! Implements [`PlatformGateway`] against plain in-memory state. It
//! records every call, can inject failures per operation, and lets
//! recipes take a configurable number of polls to finish. Used by the
//! test-suite and for rehearsing a configuration offline.

use crate::backend::PlatformGateway;
use crate::config::TeamRoles;
use crate::error::DeployError;
use crate::types::*;
use crate::version;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One gateway call, as recorded by [`InMemoryPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    GetDeployment(String),
    GetDeploymentByName(String),
    GetScalings(String),
    GetVersionTransitions(String),
    GetTeamRoles(String),
    GetRecipe(String),
    ListClusters,
    ListDatacenters,
    ListDatabases,
    CreateDeployment(String),
    SetScalings(String, u32),
    UpdateVersion(String, String),
    PatchNotes(String, String),
    CreateTeamRole {
        id: String,
        role: String,
        team: String,
    },
    Deprovision(String),
}

impl GatewayCall {
    /// Operation name, as used by [`InMemoryPlatform::fail`].
    pub fn operation(&self) -> &'static str {
        match self {
            GatewayCall::GetDeployment(_) => "get_deployment",
            GatewayCall::GetDeploymentByName(_) => "get_deployment_by_name",
            GatewayCall::GetScalings(_) => "get_scalings",
            GatewayCall::GetVersionTransitions(_) => "get_version_transitions",
            GatewayCall::GetTeamRoles(_) => "get_team_roles",
            GatewayCall::GetRecipe(_) => "get_recipe",
            GatewayCall::ListClusters => "list_clusters",
            GatewayCall::ListDatacenters => "list_datacenters",
            GatewayCall::ListDatabases => "list_databases",
            GatewayCall::CreateDeployment(_) => "create_deployment",
            GatewayCall::SetScalings(..) => "set_scalings",
            GatewayCall::UpdateVersion(..) => "update_version",
            GatewayCall::PatchNotes(..) => "patch_notes",
            GatewayCall::CreateTeamRole { .. } => "create_team_role",
            GatewayCall::Deprovision(_) => "deprovision",
        }
    }

    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            GatewayCall::CreateDeployment(_)
                | GatewayCall::SetScalings(..)
                | GatewayCall::UpdateVersion(..)
                | GatewayCall::PatchNotes(..)
                | GatewayCall::CreateTeamRole { .. }
                | GatewayCall::Deprovision(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecipeOutcome {
    Complete,
    Fail,
    Stall,
}

#[derive(Debug)]
struct StoredDeployment {
    deployment: Deployment,
    scalings: Scalings,
    transitions: Vec<VersionTransition>,
    team_roles: TeamRoles,
}

#[derive(Debug)]
struct StoredRecipe {
    deployment_id: String,
    polls_left: u32,
    outcome: RecipeOutcome,
}

#[derive(Debug)]
struct PlatformState {
    deployments: BTreeMap<String, StoredDeployment>,
    recipes: HashMap<String, StoredRecipe>,
    clusters: Vec<Cluster>,
    datacenters: Vec<Datacenter>,
    databases: Vec<DatabaseVersions>,
    failures: HashMap<&'static str, String>,
    calls: Vec<GatewayCall>,
    polls_to_complete: u32,
    recipe_outcome: RecipeOutcome,
    rotate_ids: bool,
    next_id: u64,
}

impl PlatformState {
    /// Record a call and return the injected failure for it, if any.
    fn enter(&mut self, call: GatewayCall) -> Result<(), DeployError> {
        let operation = call.operation();
        self.calls.push(call);
        match self.failures.get(operation) {
            Some(message) => Err(DeployError::Api(message.clone())),
            None => Ok(()),
        }
    }

    fn allocate(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn stored_mut(&mut self, id: &str) -> Result<&mut StoredDeployment, DeployError> {
        self.deployments
            .get_mut(id)
            .ok_or_else(|| DeployError::Api(format!("404: no deployment with id {id}")))
    }

    fn stored(&self, id: &str) -> Result<&StoredDeployment, DeployError> {
        self.deployments
            .get(id)
            .ok_or_else(|| DeployError::Api(format!("404: no deployment with id {id}")))
    }

    /// Give a deployment a fresh id when rotation is on.
    fn rekey(&mut self, id: &str) -> String {
        if !self.rotate_ids {
            return id.to_string();
        }
        let Some(mut stored) = self.deployments.remove(id) else {
            return id.to_string();
        };
        let new_id = self.allocate("dep");
        stored.deployment.id = new_id.clone();
        self.deployments.insert(new_id.clone(), stored);
        new_id
    }

    fn start_recipe(&mut self, deployment_id: &str) -> Recipe {
        let id = self.allocate("rcp");
        self.recipes.insert(
            id.clone(),
            StoredRecipe {
                deployment_id: deployment_id.to_string(),
                polls_left: self.polls_to_complete,
                outcome: self.recipe_outcome,
            },
        );
        Recipe {
            id,
            status: RecipeStatus::Running,
            deployment_id: deployment_id.to_string(),
        }
    }

    fn by_name(&self, name: &str) -> Option<&StoredDeployment> {
        self.deployments
            .values()
            .find(|d| d.deployment.name == name)
    }
}

/// A [`PlatformGateway`] backed by memory.
#[derive(Debug)]
pub struct InMemoryPlatform {
    state: Mutex<PlatformState>,
}

impl Default for InMemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PlatformState {
                deployments: BTreeMap::new(),
                recipes: HashMap::new(),
                clusters: Vec::new(),
                datacenters: Vec::new(),
                databases: Vec::new(),
                failures: HashMap::new(),
                calls: Vec::new(),
                polls_to_complete: 1,
                recipe_outcome: RecipeOutcome::Complete,
                rotate_ids: false,
                next_id: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PlatformState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ═══════════════════════════════════════════════════════════════
    // SETUP
    // ═══════════════════════════════════════════════════════════════

    pub fn with_cluster(self, name: &str, id: &str) -> Self {
        self.lock().clusters.push(Cluster {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn with_datacenter(self, slug: &str) -> Self {
        self.lock().datacenters.push(Datacenter {
            slug: slug.to_string(),
        });
        self
    }

    pub fn with_database(self, db_type: &str, versions: &[&str]) -> Self {
        self.lock().databases.push(DatabaseVersions {
            db_type: db_type.to_string(),
            versions: versions.iter().map(|v| v.to_string()).collect(),
        });
        self
    }

    /// Recipes report complete on the `polls`-th poll.
    pub fn with_polls_to_complete(self, polls: u32) -> Self {
        self.lock().polls_to_complete = polls.max(1);
        self
    }

    /// Resize and upgrade move the deployment to a new id.
    pub fn with_rotating_ids(self) -> Self {
        self.lock().rotate_ids = true;
        self
    }

    /// Add an existing deployment. Returns its id.
    pub fn seed(&self, name: &str, db_type: &str, version: &str, scalings: Scalings) -> String {
        let mut state = self.lock();
        let id = state.allocate("dep");
        let deployment = Deployment {
            id: id.clone(),
            name: name.to_string(),
            db_type: db_type.to_string(),
            version: version.to_string(),
            notes: String::new(),
            connection_strings: connection_strings(db_type, name),
            ca_certificate_base64: String::new(),
        };
        state.deployments.insert(
            id.clone(),
            StoredDeployment {
                deployment,
                scalings,
                transitions: Vec::new(),
                team_roles: TeamRoles::new(),
            },
        );
        id
    }

    pub fn set_transitions(&self, id: &str, transitions: Vec<VersionTransition>) {
        if let Some(stored) = self.lock().deployments.get_mut(id) {
            stored.transitions = transitions;
        }
    }

    pub fn set_notes(&self, id: &str, notes: &str) {
        if let Some(stored) = self.lock().deployments.get_mut(id) {
            stored.deployment.notes = notes.to_string();
        }
    }

    pub fn grant(&self, id: &str, role: &str, team: &str) {
        if let Some(stored) = self.lock().deployments.get_mut(id) {
            stored
                .team_roles
                .entry(role.to_string())
                .or_default()
                .insert(team.to_string());
        }
    }

    /// Make every call to `operation` fail with `message`.
    pub fn fail(&self, operation: &'static str, message: &str) {
        self.lock().failures.insert(operation, message.to_string());
    }

    /// Recipes started from now on never complete.
    pub fn stall_recipes(&self) {
        self.lock().recipe_outcome = RecipeOutcome::Stall;
    }

    /// Recipes started from now on finish as failed.
    pub fn fail_recipes(&self) {
        self.lock().recipe_outcome = RecipeOutcome::Fail;
    }

    // ═══════════════════════════════════════════════════════════════
    // INSPECTION
    // ═══════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    pub fn mutations(&self) -> Vec<GatewayCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn deployment(&self, name: &str) -> Option<Deployment> {
        self.lock().by_name(name).map(|d| d.deployment.clone())
    }

    pub fn scalings(&self, name: &str) -> Option<Scalings> {
        self.lock().by_name(name).map(|d| d.scalings)
    }

    pub fn team_roles(&self, name: &str) -> Option<TeamRoles> {
        self.lock().by_name(name).map(|d| d.team_roles.clone())
    }
}

fn connection_strings(db_type: &str, name: &str) -> Vec<String> {
    match db_type {
        "mongodb" => vec![format!(
            "mongodb://admin:secret@{name}-0.memory.invalid:27017,{name}-1.memory.invalid:27018/admin?ssl=true"
        )],
        "postgresql" => vec![format!(
            "postgres://admin:secret@{name}.memory.invalid:5432/compose"
        )],
        "redis" => vec![format!("redis://admin:secret@{name}.memory.invalid:6379")],
        "mysql" => vec![format!("mysql://admin:secret@{name}.memory.invalid:3306/compose")],
        "rabbitmq" => vec![format!("amqps://admin:secret@{name}.memory.invalid:5671/{name}")],
        _ => vec![format!("https://admin:secret@{name}.memory.invalid:443/")],
    }
}

impl PlatformGateway for InMemoryPlatform {
    async fn get_deployment(&self, id: &str) -> Result<Option<Deployment>, DeployError> {
        let mut state = self.lock();
        state.enter(GatewayCall::GetDeployment(id.to_string()))?;
        Ok(state.deployments.get(id).map(|d| d.deployment.clone()))
    }

    async fn get_deployment_by_name(&self, name: &str) -> Result<Option<Deployment>, DeployError> {
        let mut state = self.lock();
        state.enter(GatewayCall::GetDeploymentByName(name.to_string()))?;
        Ok(state.by_name(name).map(|d| d.deployment.clone()))
    }

    async fn get_scalings(&self, id: &str) -> Result<Scalings, DeployError> {
        let mut state = self.lock();
        state.enter(GatewayCall::GetScalings(id.to_string()))?;
        Ok(state.stored(id)?.scalings)
    }

    async fn get_version_transitions(
        &self,
        id: &str,
    ) -> Result<Vec<VersionTransition>, DeployError> {
        let mut state = self.lock();
        state.enter(GatewayCall::GetVersionTransitions(id.to_string()))?;
        Ok(state.stored(id)?.transitions.clone())
    }

    async fn get_team_roles(&self, id: &str) -> Result<Vec<TeamRole>, DeployError> {
        let mut state = self.lock();
        state.enter(GatewayCall::GetTeamRoles(id.to_string()))?;
        Ok(state
            .stored(id)?
            .team_roles
            .iter()
            .map(|(role, teams)| TeamRole {
                name: role.clone(),
                teams: teams
                    .iter()
                    .map(|t| Team {
                        id: t.clone(),
                        name: String::new(),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn get_recipe(&self, recipe_id: &str) -> Result<Recipe, DeployError> {
        let mut state = self.lock();
        state.enter(GatewayCall::GetRecipe(recipe_id.to_string()))?;
        let recipe = state
            .recipes
            .get_mut(recipe_id)
            .ok_or_else(|| DeployError::Api(format!("404: no recipe with id {recipe_id}")))?;

        recipe.polls_left = recipe.polls_left.saturating_sub(1);
        let status = if recipe.polls_left > 0 {
            RecipeStatus::Running
        } else {
            match recipe.outcome {
                RecipeOutcome::Complete => RecipeStatus::Complete,
                RecipeOutcome::Fail => RecipeStatus::Failed,
                RecipeOutcome::Stall => RecipeStatus::Running,
            }
        };
        Ok(Recipe {
            id: recipe_id.to_string(),
            status,
            deployment_id: recipe.deployment_id.clone(),
        })
    }

    async fn list_clusters(&self) -> Result<Vec<Cluster>, DeployError> {
        let mut state = self.lock();
        state.enter(GatewayCall::ListClusters)?;
        Ok(state.clusters.clone())
    }

    async fn list_datacenters(&self) -> Result<Vec<Datacenter>, DeployError> {
        let mut state = self.lock();
        state.enter(GatewayCall::ListDatacenters)?;
        Ok(state.datacenters.clone())
    }

    async fn list_databases(&self) -> Result<Vec<DatabaseVersions>, DeployError> {
        let mut state = self.lock();
        state.enter(GatewayCall::ListDatabases)?;
        Ok(state.databases.clone())
    }

    async fn create_deployment(
        &self,
        params: &DeploymentParams,
    ) -> Result<CreatedDeployment, DeployError> {
        let mut state = self.lock();
        state.enter(GatewayCall::CreateDeployment(params.name.clone()))?;
        if state.by_name(&params.name).is_some() {
            return Err(DeployError::Api(format!(
                "422: name '{}' is already taken",
                params.name
            )));
        }

        let version = match &params.version {
            Some(v) => v.clone(),
            None => state
                .databases
                .iter()
                .find(|d| d.db_type == params.db_type)
                .and_then(|d| {
                    d.versions
                        .iter()
                        .filter_map(|v| version::parse_version(v).map(|parsed| (parsed, v)))
                        .max_by(|a, b| a.0.cmp(&b.0))
                        .map(|(_, v)| v.clone())
                })
                .unwrap_or_default(),
        };

        let id = state.allocate("dep");
        state.deployments.insert(
            id.clone(),
            StoredDeployment {
                deployment: Deployment {
                    id: id.clone(),
                    name: params.name.clone(),
                    db_type: params.db_type.clone(),
                    version,
                    notes: params.notes.clone(),
                    connection_strings: connection_strings(&params.db_type, &params.name),
                    ca_certificate_base64: String::new(),
                },
                scalings: Scalings {
                    allocated_units: params.units,
                    utilized_units: params.units.min(1),
                },
                transitions: Vec::new(),
                team_roles: TeamRoles::new(),
            },
        );
        let recipe = state.start_recipe(&id);
        Ok(CreatedDeployment {
            id,
            provision_recipe_id: recipe.id,
        })
    }

    async fn set_scalings(&self, id: &str, units: u32) -> Result<Recipe, DeployError> {
        let mut state = self.lock();
        state.enter(GatewayCall::SetScalings(id.to_string(), units))?;
        let stored = state.stored_mut(id)?;
        if units < stored.scalings.utilized_units {
            return Err(DeployError::Api(format!(
                "422: cannot scale below {} utilized units",
                stored.scalings.utilized_units
            )));
        }
        stored.scalings.allocated_units = units;
        let id = state.rekey(id);
        Ok(state.start_recipe(&id))
    }

    async fn update_version(&self, id: &str, version: &str) -> Result<Recipe, DeployError> {
        let mut state = self.lock();
        state.enter(GatewayCall::UpdateVersion(id.to_string(), version.to_string()))?;
        let stored = state.stored_mut(id)?;
        if !stored
            .transitions
            .iter()
            .any(|t| t.is_in_place() && t.to_version == version)
        {
            return Err(DeployError::Api(format!(
                "422: no in-place transition from {} to {version}",
                stored.deployment.version
            )));
        }
        stored.deployment.version = version.to_string();
        stored.transitions.retain(|t| t.to_version != version);
        let id = state.rekey(id);
        Ok(state.start_recipe(&id))
    }

    async fn patch_notes(&self, id: &str, notes: &str) -> Result<(), DeployError> {
        let mut state = self.lock();
        state.enter(GatewayCall::PatchNotes(id.to_string(), notes.to_string()))?;
        state.stored_mut(id)?.deployment.notes = notes.to_string();
        Ok(())
    }

    async fn create_team_role(
        &self,
        id: &str,
        role: &str,
        team_id: &str,
    ) -> Result<(), DeployError> {
        let mut state = self.lock();
        state.enter(GatewayCall::CreateTeamRole {
            id: id.to_string(),
            role: role.to_string(),
            team: team_id.to_string(),
        })?;
        state
            .stored_mut(id)?
            .team_roles
            .entry(role.to_string())
            .or_default()
            .insert(team_id.to_string());
        Ok(())
    }

    async fn deprovision(&self, id: &str) -> Result<Recipe, DeployError> {
        let mut state = self.lock();
        state.enter(GatewayCall::Deprovision(id.to_string()))?;
        state.stored(id)?;
        state.deployments.remove(id);
        Ok(state.start_recipe(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_lookup() {
        let platform = InMemoryPlatform::new().with_database("redis", &["3.2.9", "4.0.1"]);
        let created = platform
            .create_deployment(&DeploymentParams {
                name: "db1".into(),
                db_type: "redis".into(),
                placement: Placement::ClusterId("c-1".into()),
                units: 2,
                version: None,
                notes: String::new(),
                ssl: false,
                wired_tiger: false,
                cache_mode: false,
            })
            .await
            .unwrap();

        let found = platform.get_deployment_by_name("db1").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.version, "4.0.1");
        assert_eq!(platform.scalings("db1").unwrap().allocated_units, 2);

        let recipe = platform.get_recipe(&created.provision_recipe_id).await.unwrap();
        assert_eq!(recipe.status, RecipeStatus::Complete);
    }

    #[tokio::test]
    async fn test_injected_failure_is_recorded() {
        let platform = InMemoryPlatform::new();
        platform.fail("list_clusters", "boom");
        let err = platform.list_clusters().await.unwrap_err();
        assert_eq!(err.to_string(), "platform API error: boom");
        assert_eq!(platform.calls(), vec![GatewayCall::ListClusters]);
        assert!(platform.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_rotating_ids() {
        let platform = InMemoryPlatform::new().with_rotating_ids();
        let id = platform.seed(
            "db1",
            "redis",
            "4.0.1",
            Scalings {
                allocated_units: 1,
                utilized_units: 1,
            },
        );
        let recipe = platform.set_scalings(&id, 3).await.unwrap();
        assert_ne!(recipe.deployment_id, id);
        assert!(platform.get_deployment(&id).await.unwrap().is_none());
        assert_eq!(platform.deployment("db1").unwrap().id, recipe.deployment_id);
    }

    #[tokio::test]
    async fn test_recipe_takes_configured_polls() {
        let platform = InMemoryPlatform::new().with_polls_to_complete(2);
        let id = platform.seed(
            "db1",
            "redis",
            "4.0.1",
            Scalings {
                allocated_units: 1,
                utilized_units: 1,
            },
        );
        let recipe = platform.deprovision(&id).await.unwrap();
        assert_eq!(
            platform.get_recipe(&recipe.id).await.unwrap().status,
            RecipeStatus::Running
        );
        assert_eq!(
            platform.get_recipe(&recipe.id).await.unwrap().status,
            RecipeStatus::Complete
        );
        assert!(platform.deployment("db1").is_none());
    }
}
