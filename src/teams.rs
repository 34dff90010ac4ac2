//! Additive team-role reconciliation.
//!
//! Grants whatever the desired mapping names that the deployment does
//! not already have. Never revokes.

use crate::backend::PlatformGateway;
use crate::config::TeamRoles;
use crate::error::DeployError;
use crate::types::TeamRole;

/// (role, team id) pairs in `desired` that `existing` lacks.
pub fn missing_grants(desired: &TeamRoles, existing: &[TeamRole]) -> Vec<(String, String)> {
    desired
        .iter()
        .flat_map(|(role, teams)| {
            let held = existing.iter().find(|r| &r.name == role);
            teams
                .iter()
                .filter(move |team| {
                    !held.is_some_and(|r| r.teams.iter().any(|t| &t.id == *team))
                })
                .map(move |team| (role.clone(), team.clone()))
        })
        .collect()
}

pub struct TeamRoleReconciler<'a, B: PlatformGateway> {
    backend: &'a B,
}

impl<'a, B: PlatformGateway> TeamRoleReconciler<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Grant missing roles on `deployment_id`. Returns the number of
    /// grants issued. An empty mapping makes no platform calls.
    #[tracing::instrument(skip(self, desired))]
    pub async fn reconcile(
        &self,
        deployment_id: &str,
        desired: &TeamRoles,
    ) -> Result<usize, DeployError> {
        if desired.values().all(|teams| teams.is_empty()) {
            return Ok(0);
        }

        let existing = self
            .backend
            .get_team_roles(deployment_id)
            .await
            .map_err(|e| e.during("get team roles", deployment_id))?;

        let missing = missing_grants(desired, &existing);
        for (role, team) in &missing {
            self.backend
                .create_team_role(deployment_id, role, team)
                .await
                .map_err(|e| {
                    e.during(
                        "grant team role",
                        format!("team {team} as {role} on {deployment_id}"),
                    )
                })?;
            tracing::info!(team = %team, role = %role, "granted team role");
        }

        Ok(missing.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Team;

    fn roles(pairs: &[(&str, &str)]) -> TeamRoles {
        let mut out = TeamRoles::new();
        for (role, team) in pairs {
            out.entry(role.to_string())
                .or_default()
                .insert(team.to_string());
        }
        out
    }

    #[test]
    fn test_missing_grants_is_set_difference() {
        let desired = roles(&[("admin", "t1"), ("admin", "t2"), ("developer", "t3")]);
        let existing = vec![
            TeamRole {
                name: "admin".into(),
                teams: vec![Team {
                    id: "t1".into(),
                    name: "ops".into(),
                }],
            },
            TeamRole {
                name: "manager".into(),
                teams: vec![Team {
                    id: "t9".into(),
                    name: String::new(),
                }],
            },
        ];

        let missing = missing_grants(&desired, &existing);
        assert_eq!(
            missing,
            vec![
                ("admin".to_string(), "t2".to_string()),
                ("developer".to_string(), "t3".to_string()),
            ]
        );
    }

    #[test]
    fn test_nothing_missing() {
        let desired = roles(&[("admin", "t1")]);
        let existing = vec![TeamRole {
            name: "admin".into(),
            teams: vec![Team {
                id: "t1".into(),
                name: String::new(),
            }],
        }];
        assert!(missing_grants(&desired, &existing).is_empty());
    }

    #[cfg(feature = "memory-platform")]
    mod with_platform {
        use super::*;
        use crate::memory::{GatewayCall, InMemoryPlatform};
        use crate::types::Scalings;

        fn seeded() -> (InMemoryPlatform, String) {
            let platform = InMemoryPlatform::new();
            let id = platform.seed(
                "db1",
                "redis",
                "4.0.1",
                Scalings {
                    allocated_units: 1,
                    utilized_units: 1,
                },
            );
            (platform, id)
        }

        #[tokio::test]
        async fn test_empty_mapping_makes_no_calls() {
            let (platform, id) = seeded();
            let granted = TeamRoleReconciler::new(&platform)
                .reconcile(&id, &TeamRoles::new())
                .await
                .unwrap();
            assert_eq!(granted, 0);
            assert!(platform.calls().is_empty());
        }

        #[tokio::test]
        async fn test_grants_only_missing() {
            let (platform, id) = seeded();
            platform.grant(&id, "admin", "t1");

            let granted = TeamRoleReconciler::new(&platform)
                .reconcile(&id, &roles(&[("admin", "t1"), ("admin", "t2")]))
                .await
                .unwrap();
            assert_eq!(granted, 1);

            let grants: Vec<_> = platform
                .calls()
                .into_iter()
                .filter(|c| matches!(c, GatewayCall::CreateTeamRole { .. }))
                .collect();
            assert_eq!(
                grants,
                vec![GatewayCall::CreateTeamRole {
                    id: id.clone(),
                    role: "admin".into(),
                    team: "t2".into(),
                }]
            );
        }

        #[tokio::test]
        async fn test_grant_failure_names_team_and_role() {
            let (platform, id) = seeded();
            platform.fail("create_team_role", "forbidden");

            let err = TeamRoleReconciler::new(&platform)
                .reconcile(&id, &roles(&[("developer", "t7")]))
                .await
                .unwrap_err();
            let msg = err.to_string();
            assert!(msg.contains("t7"));
            assert!(msg.contains("developer"));
            assert!(msg.contains(&id));
        }
    }
}
