//! Per-run platform snapshot.
//!
//! Account catalogs are fetched once when a run starts. Existing
//! deployments are fetched lazily, once per distinct name, and reused
//! for the rest of the run.

use crate::backend::PlatformGateway;
use crate::error::DeployError;
use std::collections::{BTreeSet, HashMap};

/// Everything the planner needs to know about a deployment that exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingDeployment {
    pub id: String,
    pub name: String,
    pub db_type: String,
    pub version: String,
    pub notes: String,
    pub allocated_units: u32,
    pub utilized_units: u32,
    /// Versions reachable by an in-place transition.
    pub upgrade_targets: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Session {
    clusters_by_name: HashMap<String, String>,
    datacenters: BTreeSet<String>,
    versions_by_type: HashMap<String, Vec<String>>,
    existing: HashMap<String, Option<ExistingDeployment>>,
}

impl Session {
    /// Load account catalogs. Any failure here aborts the run.
    #[tracing::instrument(skip_all)]
    pub async fn load<B: PlatformGateway>(backend: &B) -> Result<Self, DeployError> {
        let clusters = backend
            .list_clusters()
            .await
            .map_err(|e| e.during("list clusters", "account"))?;
        let datacenters = backend
            .list_datacenters()
            .await
            .map_err(|e| e.during("list datacenters", "account"))?;
        let databases = backend
            .list_databases()
            .await
            .map_err(|e| e.during("list databases", "account"))?;

        tracing::debug!(
            clusters = clusters.len(),
            datacenters = datacenters.len(),
            database_types = databases.len(),
            "loaded account catalogs"
        );

        Ok(Self {
            clusters_by_name: clusters.into_iter().map(|c| (c.name, c.id)).collect(),
            datacenters: datacenters.into_iter().map(|d| d.slug).collect(),
            versions_by_type: databases
                .into_iter()
                .map(|d| (d.db_type, d.versions))
                .collect(),
            existing: HashMap::new(),
        })
    }

    pub fn cluster_id(&self, name: &str) -> Option<&str> {
        self.clusters_by_name.get(name).map(String::as_str)
    }

    pub fn has_datacenter(&self, slug: &str) -> bool {
        self.datacenters.contains(slug)
    }

    /// Versions a new deployment of `db_type` may be created at.
    pub fn supported_versions(&self, db_type: &str) -> Option<&[String]> {
        self.versions_by_type.get(db_type).map(Vec::as_slice)
    }

    /// The existing deployment called `name`, fetched on first use.
    pub async fn existing<B: PlatformGateway>(
        &mut self,
        backend: &B,
        name: &str,
    ) -> Result<Option<ExistingDeployment>, DeployError> {
        if let Some(cached) = self.existing.get(name) {
            return Ok(cached.clone());
        }
        let fetched = fetch_existing(backend, name).await?;
        self.existing.insert(name.to_string(), fetched.clone());
        Ok(fetched)
    }

    /// Whether the existing deployment for `name` has been fetched.
    pub fn is_cached(&self, name: &str) -> bool {
        self.existing.contains_key(name)
    }
}

async fn fetch_existing<B: PlatformGateway>(
    backend: &B,
    name: &str,
) -> Result<Option<ExistingDeployment>, DeployError> {
    let Some(deployment) = backend
        .get_deployment_by_name(name)
        .await
        .map_err(|e| e.during("look up", name))?
    else {
        return Ok(None);
    };

    let scalings = backend
        .get_scalings(&deployment.id)
        .await
        .map_err(|e| e.during("get scalings", name))?;
    let transitions = backend
        .get_version_transitions(&deployment.id)
        .await
        .map_err(|e| e.during("get version transitions", name))?;

    Ok(Some(ExistingDeployment {
        id: deployment.id,
        name: deployment.name,
        db_type: deployment.db_type,
        version: deployment.version,
        notes: deployment.notes,
        allocated_units: scalings.allocated_units,
        utilized_units: scalings.utilized_units,
        upgrade_targets: transitions
            .into_iter()
            .filter(|t| t.is_in_place())
            .map(|t| t.to_version)
            .collect(),
    }))
}
