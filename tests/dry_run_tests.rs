#![cfg(feature = "memory-platform")]

use dbaas_deploy_rs::dry_run::{PLACEHOLDER_HOST, PLACEHOLDER_VERSION};
use dbaas_deploy_rs::{
    ConfigSet, DeploymentSpec, DeploymentWorkflow, DeprovisionRequest, InMemoryPlatform, Scalings,
    WorkflowConfig,
};

fn dry_run() -> WorkflowConfig {
    WorkflowConfig {
        dry_run: true,
        output: None,
        ..WorkflowConfig::default()
    }
}

fn platform() -> InMemoryPlatform {
    let platform = InMemoryPlatform::new()
        .with_cluster("prod", "cluster-1")
        .with_database("postgresql", &["9.6.3", "9.6.5"]);
    platform.seed(
        "existing",
        "postgresql",
        "9.6.3",
        Scalings {
            allocated_units: 1,
            utilized_units: 1,
        },
    );
    platform
}

#[tokio::test(start_paused = true)]
async fn test_dry_run_never_mutates() {
    let platform = platform();
    let set = ConfigSet::from_deployments(vec![
        DeploymentSpec::new("fresh", "postgresql")
            .with_cluster("prod")
            .with_team("admin", "t1"),
        DeploymentSpec::new("existing", "postgresql")
            .with_cluster("prod")
            .with_scaling(4)
            .with_notes("resized in dry run")
            .with_team("developer", "t2"),
    ])
    .unwrap();

    let report = DeploymentWorkflow::new(&platform, dry_run())
        .reconcile(&set)
        .await
        .unwrap();

    assert!(report.is_success(), "{:?}", report.failures);
    assert!(platform.mutations().is_empty(), "{:?}", platform.mutations());
    assert_eq!(
        report.actions,
        vec![
            ("fresh".to_string(), "Dry run: Creating".to_string()),
            (
                "existing".to_string(),
                "Dry run: Resizing and Commenting on".to_string()
            ),
        ]
    );
    assert_eq!(platform.scalings("existing").unwrap().allocated_units, 1);
}

#[tokio::test(start_paused = true)]
async fn test_dry_run_output_uses_placeholders_for_new_deployments() {
    let platform = platform();
    let set = ConfigSet::from_deployments(vec![
        DeploymentSpec::new("fresh", "postgresql").with_cluster("prod"),
        DeploymentSpec::new("existing", "postgresql").with_cluster("prod"),
    ])
    .unwrap();

    let report = DeploymentWorkflow::new(&platform, dry_run())
        .reconcile(&set)
        .await
        .unwrap();

    let fresh = &report.output["fresh"];
    assert_eq!(fresh.version, PLACEHOLDER_VERSION);
    assert_eq!(fresh.connections[0].scheme, "postgres");
    assert_eq!(fresh.connections[0].host, PLACEHOLDER_HOST);

    let existing = &report.output["existing"];
    assert_eq!(existing.version, "9.6.3");
    assert_eq!(existing.connections[0].host, "existing.memory.invalid");
}

#[tokio::test(start_paused = true)]
async fn test_dry_run_deprovision_keeps_deployment() {
    let platform = platform();
    let report = DeploymentWorkflow::new(&platform, dry_run())
        .deprovision(&[DeprovisionRequest::new("existing")])
        .await
        .unwrap();

    assert_eq!(report.actions[0].1, "Dry run: Deprovisioning");
    assert!(platform.mutations().is_empty());
    assert!(platform.deployment("existing").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_dry_run_still_reports_validation_errors() {
    let platform = platform();
    let set = ConfigSet::from_deployments(vec![DeploymentSpec::new("fresh", "postgresql")
        .with_cluster("prod")
        .with_version("11.0")])
    .unwrap();

    let report = DeploymentWorkflow::new(&platform, dry_run())
        .reconcile(&set)
        .await
        .unwrap();

    assert_eq!(report.failures.len(), 1);
    assert!(report.output.is_empty());
}
