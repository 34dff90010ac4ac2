//! Minimal platform types for the reconciliation engine.
//!
//! These are the shapes the gateway hands back and accepts. Nothing more.
//! If you're adding types here, ask yourself if the planner or executor
//! actually needs them.

use serde::{Deserialize, Serialize};

/// A deployment as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub db_type: String,
    pub version: String,
    #[serde(default)]
    pub notes: String,
    /// Direct connection strings, one URI per entry.
    #[serde(default)]
    pub connection_strings: Vec<String>,
    #[serde(default)]
    pub ca_certificate_base64: String,
}

/// Scaling state of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scalings {
    pub allocated_units: u32,
    /// Units actually in use. Shrinking below this is refused.
    pub utilized_units: u32,
}

/// How a version transition is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionMethod {
    InPlace,
    Migration,
    #[serde(other)]
    Unknown,
}

/// One legal version change for an existing deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionTransition {
    pub to_version: String,
    pub method: TransitionMethod,
}

impl VersionTransition {
    pub fn is_in_place(&self) -> bool {
        self.method == TransitionMethod::InPlace
    }
}

/// Status of an asynchronous platform operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipeStatus {
    Waiting,
    Running,
    Complete,
    Failed,
    #[serde(other)]
    Unknown,
}

impl RecipeStatus {
    pub fn name(&self) -> &'static str {
        match self {
            RecipeStatus::Waiting => "waiting",
            RecipeStatus::Running => "running",
            RecipeStatus::Complete => "complete",
            RecipeStatus::Failed => "failed",
            RecipeStatus::Unknown => "unknown",
        }
    }
}

/// An asynchronous platform operation ("recipe").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub status: RecipeStatus,
    /// Deployment the recipe acts on. Resize and upgrade may move a
    /// deployment to a new identifier; this carries the latest one.
    pub deployment_id: String,
}

/// Result of a create call: the new identity plus its provisioning recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedDeployment {
    pub id: String,
    pub provision_recipe_id: String,
}

/// A team granted access to a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// All teams holding one role on a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRole {
    pub name: String,
    pub teams: Vec<Team>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datacenter {
    pub slug: String,
}

/// Supported versions for one database type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseVersions {
    #[serde(rename = "type")]
    pub db_type: String,
    pub versions: Vec<String>,
}

/// Where a new deployment is created, already resolved to platform terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    ClusterId(String),
    Datacenter(String),
    ProvisioningTags(Vec<String>),
}

/// Parameters for a create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentParams {
    pub name: String,
    #[serde(rename = "type")]
    pub db_type: String,
    pub placement: Placement,
    pub units: u32,
    /// `None` lets the platform pick its default version.
    pub version: Option<String>,
    pub notes: String,
    pub ssl: bool,
    pub wired_tiger: bool,
    pub cache_mode: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_method_parsing() {
        let t: VersionTransition =
            serde_json::from_str(r#"{"to_version":"9.6.5","method":"in_place"}"#).unwrap();
        assert!(t.is_in_place());

        let t: VersionTransition =
            serde_json::from_str(r#"{"to_version":"10.0","method":"migration"}"#).unwrap();
        assert!(!t.is_in_place());

        let t: VersionTransition =
            serde_json::from_str(r#"{"to_version":"10.0","method":"teleport"}"#).unwrap();
        assert_eq!(t.method, TransitionMethod::Unknown);
    }

    #[test]
    fn test_recipe_status_parsing() {
        let r: Recipe =
            serde_json::from_str(r#"{"id":"r1","status":"complete","deployment_id":"d1"}"#)
                .unwrap();
        assert_eq!(r.status, RecipeStatus::Complete);

        let r: Recipe =
            serde_json::from_str(r#"{"id":"r1","status":"paused","deployment_id":"d1"}"#)
                .unwrap();
        assert_eq!(r.status, RecipeStatus::Unknown);
        assert_eq!(r.status.name(), "unknown");
    }

    #[test]
    fn test_deployment_serialization_golden() {
        let deployment = Deployment {
            id: "d-1".to_string(),
            name: "db1".to_string(),
            db_type: "redis".to_string(),
            version: "4.0.1".to_string(),
            notes: String::new(),
            connection_strings: vec!["redis://x:y@h:1".to_string()],
            ca_certificate_base64: String::new(),
        };

        let json = serde_json::to_string(&deployment).unwrap();
        let expected = r#"{"id":"d-1","name":"db1","type":"redis","version":"4.0.1","notes":"","connection_strings":["redis://x:y@h:1"],"ca_certificate_base64":""}"#;
        assert_eq!(json, expected, "JSON structure changed - wire format compatibility broken");

        // Optional fields default when the platform omits them
        let minimal: Deployment = serde_json::from_str(
            r#"{"id":"d-2","name":"db2","type":"mysql","version":"5.7"}"#,
        )
        .unwrap();
        assert!(minimal.connection_strings.is_empty());
        assert!(minimal.notes.is_empty());
    }
}
