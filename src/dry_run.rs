//! Dry-run substitution and placeholder conventions.
//!
//! A dry run plans exactly like a live run, then swaps every runner for
//! its dry-run counterpart: same steps, same label with a prefix, but
//! dispatched to handlers that never mutate the platform. Deployments
//! that would be created are represented by placeholder identities and
//! synthetic connection details.

use crate::output::{ConnectionRecord, DeploymentOutput};
use crate::runner::Runner;

/// Host used in every fabricated connection record.
pub const PLACEHOLDER_HOST: &str = "dry-run.invalid";
pub const PLACEHOLDER_USER: &str = "dry-run";
pub const PLACEHOLDER_PASSWORD: &str = "dry-run";
pub const PLACEHOLDER_VERSION: &str = "dry-run";

/// Produce the dry-run counterpart of a live runner.
pub fn substitute(runner: Runner) -> Runner {
    Runner {
        label: runner.label.into_dry_run(),
        dry_run: true,
        ..runner
    }
}

/// Connection scheme a deployment type would be reached over.
pub fn placeholder_scheme(db_type: &str) -> &'static str {
    match db_type {
        "postgresql" => "postgres",
        "redis" => "redis",
        "rabbitmq" => "amqps",
        "mongodb" => "mongodb",
        "mysql" => "mysql",
        // elastic_search, etcd, janusgraph, scylla and anything newer
        _ => "https",
    }
}

/// Stable port derived from the deployment name, in 10000..60000.
pub fn placeholder_port(name: &str) -> u16 {
    let hash = name
        .bytes()
        .fold(5381u32, |h, b| h.wrapping_mul(33).wrapping_add(u32::from(b)));
    // < 50_000, fits in u16
    10_000 + (hash % 50_000) as u16
}

/// Synthetic output for a deployment that only exists in a dry run.
pub fn placeholder_output(db_type: &str, name: &str) -> DeploymentOutput {
    DeploymentOutput {
        db_type: db_type.to_string(),
        cacert: String::new(),
        version: PLACEHOLDER_VERSION.to_string(),
        connections: vec![ConnectionRecord {
            scheme: placeholder_scheme(db_type).to_string(),
            host: PLACEHOLDER_HOST.to_string(),
            port: Some(placeholder_port(name)),
            path: String::new(),
            query: String::new(),
            username: PLACEHOLDER_USER.to_string(),
            password: PLACEHOLDER_PASSWORD.to_string(),
        }],
    }
}
