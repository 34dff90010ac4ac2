//! Desired-state objects.
//!
//! These are what the configuration layer hands the engine: deployment
//! specs, client-only lookups, deprovision requests and endpoint maps.
//! Field names match the on-disk schema so a YAML/JSON loader can bind
//! straight to them. Once loaded they are read-only.

use crate::error::DeployError;
use crate::output::EndpointMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Recipe timeout used when a deployment spec does not set one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Role → team ids.
pub type TeamRoles = BTreeMap<String, BTreeSet<String>>;

/// One team grant as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamGrant {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub role: String,
}

/// Desired state of one deployment.
///
/// The placement fields are kept raw: exactly one of `cluster`,
/// `datacenter` or `tags` must be set, and that is checked when the
/// spec is planned so every violated rule is reported together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub db_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default = "default_scaling")]
    pub scaling: i64,
    /// Exact version or semver range. Empty means "don't care".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
    #[serde(default)]
    pub wired_tiger: bool,
    #[serde(default)]
    pub cache_mode: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teams: Vec<TeamGrant>,
    /// Seconds to wait on recipes. 0 means don't wait.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_scaling() -> i64 {
    1
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Where a new deployment goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementTarget {
    Cluster(String),
    Datacenter(String),
    Tags(Vec<String>),
}

impl DeploymentSpec {
    /// Create a spec with defaults; placement must be set by the caller.
    pub fn new(name: impl Into<String>, db_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            db_type: db_type.into(),
            cluster: None,
            datacenter: None,
            tags: Vec::new(),
            scaling: default_scaling(),
            version: String::new(),
            ssl: false,
            notes: String::new(),
            wired_tiger: false,
            cache_mode: false,
            teams: Vec::new(),
            timeout: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    pub fn with_datacenter(mut self, datacenter: impl Into<String>) -> Self {
        self.datacenter = Some(datacenter.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_scaling(mut self, scaling: i64) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn with_team(mut self, role: impl Into<String>, team_id: impl Into<String>) -> Self {
        self.teams.push(TeamGrant {
            id: team_id.into(),
            role: role.into(),
        });
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    /// The placement target, if exactly one is set.
    pub fn placement_target(&self) -> Option<PlacementTarget> {
        let cluster = self.cluster.as_deref().filter(|c| !c.is_empty());
        let datacenter = self.datacenter.as_deref().filter(|d| !d.is_empty());
        match (cluster, datacenter, self.tags.is_empty()) {
            (Some(c), None, true) => Some(PlacementTarget::Cluster(c.to_string())),
            (None, Some(d), true) => Some(PlacementTarget::Datacenter(d.to_string())),
            (None, None, false) => Some(PlacementTarget::Tags(self.tags.clone())),
            _ => None,
        }
    }

    /// Team grants folded into role → team ids.
    pub fn team_roles(&self) -> TeamRoles {
        let mut roles = TeamRoles::new();
        for grant in &self.teams {
            roles
                .entry(grant.role.clone())
                .or_default()
                .insert(grant.id.clone());
        }
        roles
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// WiredTiger only applies to mongodb.
    pub fn wired_tiger_enabled(&self) -> bool {
        self.db_type == "mongodb" && self.wired_tiger
    }

    /// Cache mode only applies to redis.
    pub fn cache_mode_enabled(&self) -> bool {
        self.db_type == "redis" && self.cache_mode
    }
}

/// A client-only lookup: the deployment must exist; nothing is changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRequest {
    pub name: String,
    #[serde(rename = "type", default)]
    pub db_type: String,
}

/// A deployment to remove, named by platform id or by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeprovisionRequest {
    #[serde(alias = "id", alias = "name")]
    pub target: String,
    /// Seconds to wait on the deprovision recipe. Falls back to the
    /// workflow's deprovision timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl DeprovisionRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            timeout: None,
        }
    }
}

/// One typed object produced by the configuration loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigObject {
    Deployment(DeploymentSpec),
    EndpointMap(EndpointMap),
    DeploymentClient(LookupRequest),
    Deprovision(DeprovisionRequest),
}

/// Restricts which desired deployments are planned at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetFilter {
    pub clusters: BTreeSet<String>,
    pub datacenters: BTreeSet<String>,
}

impl TargetFilter {
    /// Cluster specs are checked against the cluster filter; everything
    /// else against the datacenter filter. An empty filter admits all.
    pub fn admits(&self, spec: &DeploymentSpec) -> bool {
        match spec.cluster.as_deref().filter(|c| !c.is_empty()) {
            Some(cluster) => self.clusters.is_empty() || self.clusters.contains(cluster),
            None => {
                self.datacenters.is_empty()
                    || spec
                        .datacenter
                        .as_deref()
                        .is_some_and(|d| self.datacenters.contains(d))
            }
        }
    }
}

/// Everything one run reconciles, with integrity already checked.
#[derive(Debug, Clone, Default)]
pub struct ConfigSet {
    pub deployments: Vec<DeploymentSpec>,
    pub lookups: Vec<LookupRequest>,
    pub deprovisions: Vec<DeprovisionRequest>,
    pub endpoint_map: EndpointMap,
}

impl ConfigSet {
    /// Assemble a config set.
    ///
    /// Names are unique across deployments, client lookups and
    /// deprovision targets. A repeated name, conflicting endpoint
    /// mappings or a cyclic alias chain is fatal: nothing from this input
    /// may be executed.
    pub fn from_objects(
        objects: impl IntoIterator<Item = ConfigObject>,
        filter: &TargetFilter,
    ) -> Result<Self, DeployError> {
        let mut set = ConfigSet::default();
        let mut names = BTreeSet::new();

        for object in objects {
            match object {
                ConfigObject::Deployment(spec) => {
                    claim_name(&mut names, &spec.name)?;
                    if filter.admits(&spec) {
                        set.deployments.push(spec);
                    } else {
                        tracing::debug!(name = %spec.name, "filtered out by cluster/datacenter filter");
                    }
                }
                ConfigObject::EndpointMap(map) => set.endpoint_map.merge(&map)?,
                ConfigObject::DeploymentClient(lookup) => {
                    claim_name(&mut names, &lookup.name)?;
                    set.lookups.push(lookup);
                }
                ConfigObject::Deprovision(request) => {
                    claim_name(&mut names, &request.target)?;
                    set.deprovisions.push(request);
                }
            }
        }

        set.endpoint_map.validate()?;
        Ok(set)
    }

    /// Re-check name uniqueness on a set that may have been built by hand.
    pub fn check_names(&self) -> Result<(), DeployError> {
        let mut names = BTreeSet::new();
        self.deployments
            .iter()
            .map(|spec| spec.name.as_str())
            .chain(self.lookups.iter().map(|lookup| lookup.name.as_str()))
            .chain(self.deprovisions.iter().map(|request| request.target.as_str()))
            .try_for_each(|name| claim_name(&mut names, name))
    }

    /// Convenience for a set of deployment specs only.
    pub fn from_deployments(
        deployments: impl IntoIterator<Item = DeploymentSpec>,
    ) -> Result<Self, DeployError> {
        Self::from_objects(
            deployments.into_iter().map(ConfigObject::Deployment),
            &TargetFilter::default(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.deployments.is_empty() && self.lookups.is_empty() && self.deprovisions.is_empty()
    }
}

fn claim_name(names: &mut BTreeSet<String>, name: &str) -> Result<(), DeployError> {
    if names.insert(name.to_string()) {
        Ok(())
    } else {
        Err(DeployError::Config(format!(
            "names must be unique, but '{name}' is specified more than once"
        )))
    }
}
