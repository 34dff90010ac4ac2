//! Validation rules for desired deployments.
//!
//! Each rule returns a human-readable violation. Rules are collected,
//! never short-circuited, so an operator sees everything wrong with an
//! object in one pass.

use crate::config::DeploymentSpec;
use crate::error::DeployError;

/// Database types the platform can provision.
pub const VALID_TYPES: &[&str] = &[
    "mongodb",
    "rethinkdb",
    "elastic_search",
    "redis",
    "postgresql",
    "rabbitmq",
    "etcd",
    "mysql",
    "janusgraph",
    "scylla",
    "disque",
];

/// Roles that may be granted to teams.
pub const VALID_ROLES: &[&str] = &["admin", "developer", "manager"];

pub fn is_valid_type(db_type: &str) -> bool {
    VALID_TYPES.contains(&db_type)
}

/// Rules for a deployment that does not exist yet.
pub fn new_deployment(spec: &DeploymentSpec) -> Vec<String> {
    let mut rules = Vec::new();
    check_name(spec, &mut rules);
    check_type(spec, &mut rules);
    check_scaling(spec, &mut rules);
    check_placement(spec, &mut rules);
    check_type_flags(spec, &mut rules);
    check_teams(spec, &mut rules);
    rules
}

/// Rules for a deployment that already exists.
///
/// Placement and type cannot change after creation, so only what can
/// be mutated is checked.
pub fn existing_deployment(spec: &DeploymentSpec) -> Vec<String> {
    let mut rules = Vec::new();
    check_name(spec, &mut rules);
    check_scaling(spec, &mut rules);
    check_teams(spec, &mut rules);
    rules
}

/// Build the error for a rejected spec, embedding the offending object.
pub fn rejected(spec: &DeploymentSpec, rules: Vec<String>) -> DeployError {
    let object = serde_yaml::to_string(spec).unwrap_or_else(|_| format!("{spec:?}"));
    DeployError::Validation {
        name: spec.name.clone(),
        object,
        rules,
    }
}

fn check_name(spec: &DeploymentSpec, rules: &mut Vec<String>) {
    if spec.name.trim().is_empty() {
        rules.push("Deployment name is required".to_string());
    }
}

fn check_type(spec: &DeploymentSpec, rules: &mut Vec<String>) {
    if !is_valid_type(&spec.db_type) {
        rules.push(format!(
            "Deployment type '{}' must be one of {}",
            spec.db_type,
            VALID_TYPES.join(", ")
        ));
    }
}

fn check_scaling(spec: &DeploymentSpec, rules: &mut Vec<String>) {
    if spec.scaling < 1 {
        rules.push(format!(
            "Deployment scaling must be at least 1, got {}",
            spec.scaling
        ));
    } else if u32::try_from(spec.scaling).is_err() {
        rules.push(format!("Deployment scaling {} is too large", spec.scaling));
    }
}

fn check_placement(spec: &DeploymentSpec, rules: &mut Vec<String>) {
    if spec.placement_target().is_none() {
        rules.push(
            "Exactly one of cluster, datacenter or tags must be specified".to_string(),
        );
    }
}

fn check_type_flags(spec: &DeploymentSpec, rules: &mut Vec<String>) {
    if spec.wired_tiger && spec.db_type != "mongodb" {
        rules.push("wired_tiger is only valid for mongodb deployments".to_string());
    }
    if spec.cache_mode && spec.db_type != "redis" {
        rules.push("cache_mode is only valid for redis deployments".to_string());
    }
}

fn check_teams(spec: &DeploymentSpec, rules: &mut Vec<String>) {
    for grant in &spec.teams {
        if grant.id.trim().is_empty() {
            rules.push(format!("Team entry for role '{}' is missing an id", grant.role));
        }
        if !VALID_ROLES.contains(&grant.role.as_str()) {
            rules.push(format!(
                "Team role '{}' must be one of {}",
                grant.role,
                VALID_ROLES.join(", ")
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_spec_passes() {
        let spec = DeploymentSpec::new("db1", "redis")
            .with_cluster("c1")
            .with_team("admin", "t1");
        assert!(new_deployment(&spec).is_empty());
    }

    #[test]
    fn test_all_violations_collected() {
        let mut spec = DeploymentSpec::new("", "oracle").with_scaling(0);
        spec.wired_tiger = true;
        spec = spec.with_team("owner", "");

        let rules = new_deployment(&spec);
        assert_eq!(rules.len(), 7, "{rules:#?}");
    }

    #[test]
    fn test_existing_skips_placement_and_type() {
        let spec = DeploymentSpec::new("db1", "oracle");
        assert!(existing_deployment(&spec).is_empty());
        assert_eq!(new_deployment(&spec).len(), 2);
    }

    #[test]
    fn test_rejected_carries_object() {
        let spec = DeploymentSpec::new("db1", "redis").with_scaling(-2);
        let err = rejected(&spec, new_deployment(&spec));
        let msg = err.to_string();
        assert!(msg.contains("invalid deployment 'db1'"));
        assert!(msg.contains("scaling: -2"));
    }
}
