//! Version constraint resolution.
//!
//! Constraints are semver requirements (`9.6.*`, `>=10, <11`, `10.0`).
//! A bare version pins: `9.6.3` means exactly that release and `10.0`
//! means any `10.0.x`. Platform version strings are often short (`10.0`,
//! `9`), so candidates are parsed leniently by padding missing components
//! with zero.

use crate::error::DeployError;
use semver::{Version, VersionReq};

/// Parse a platform version string, padding `10.0` to `10.0.0`.
pub fn parse_version(raw: &str) -> Option<Version> {
    let raw = raw.trim().trim_start_matches('v');
    if raw.is_empty() {
        return None;
    }
    let split = raw.find(|c: char| c == '-' || c == '+').unwrap_or(raw.len());
    let (core, suffix) = raw.split_at(split);
    let mut parts: Vec<&str> = core.split('.').collect();
    if parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    while parts.len() < 3 {
        parts.push("0");
    }
    Version::parse(&format!("{}{}", parts.join("."), suffix)).ok()
}

/// Rewrite operator-less comparators so they pin instead of acting as
/// caret requirements: `9.6.3` becomes `=9.6.3`, `10.0` becomes `~10.0`.
fn pin_bare(constraint: &str) -> String {
    constraint
        .split(',')
        .map(|part| {
            let part = part.trim();
            let core = part
                .split(|c: char| c == '-' || c == '+')
                .next()
                .unwrap_or(part);
            let components: Vec<&str> = core.split('.').collect();
            let bare = !core.is_empty()
                && components
                    .iter()
                    .all(|c| !c.is_empty() && c.chars().all(|ch| ch.is_ascii_digit()));
            match (bare, components.len()) {
                (true, 3) => format!("={part}"),
                (true, _) => format!("~{part}"),
                (false, _) => part.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn parse_constraint(constraint: &str) -> Result<VersionReq, DeployError> {
    VersionReq::parse(&pin_bare(constraint.trim())).map_err(|e| DeployError::Version {
        constraint: constraint.to_string(),
        reason: e.to_string(),
    })
}

/// Whether `current` already satisfies `constraint`.
///
/// An empty constraint is always satisfied. An unparseable constraint
/// or version only matches on exact string equality.
pub fn satisfies(constraint: &str, current: &str) -> bool {
    if constraint.trim().is_empty() || constraint == current {
        return true;
    }
    match (parse_constraint(constraint), parse_version(current)) {
        (Ok(req), Some(version)) => req.matches(&version),
        _ => false,
    }
}

/// Pick the highest candidate satisfying `constraint`.
///
/// Returns `Ok(None)` for an empty constraint, meaning "no preference".
/// A candidate whose string equals the constraint wins outright.
pub fn resolve<'a, I>(constraint: &str, candidates: I) -> Result<Option<String>, DeployError>
where
    I: IntoIterator<Item = &'a String>,
{
    let constraint = constraint.trim();
    if constraint.is_empty() {
        return Ok(None);
    }

    let candidates: Vec<&String> = candidates.into_iter().collect();
    if let Some(exact) = candidates.iter().find(|c| c.as_str() == constraint) {
        return Ok(Some((*exact).clone()));
    }

    let req = parse_constraint(constraint)?;
    let mut matching: Vec<(Version, &String)> = candidates
        .into_iter()
        .filter_map(|raw| match parse_version(raw) {
            Some(version) => Some((version, raw)),
            None => {
                tracing::debug!(version = %raw, "skipping unparseable version");
                None
            }
        })
        .filter(|(version, _)| req.matches(version))
        .collect();

    matching.sort_by(|a, b| b.0.cmp(&a.0));
    match matching.first() {
        Some((_, raw)) => Ok(Some((*raw).clone())),
        None => Err(DeployError::Version {
            constraint: constraint.to_string(),
            reason: "no available version satisfies it".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<String> {
        ["9.5.10", "9.6.3", "9.6.5", "10.0"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_parse_version_pads() {
        assert_eq!(parse_version("10.0"), Some(Version::new(10, 0, 0)));
        assert_eq!(parse_version("9"), Some(Version::new(9, 0, 0)));
        assert_eq!(parse_version("v3.4.10"), Some(Version::new(3, 4, 10)));
        assert!(parse_version("6.2.4-rc1").is_some());
        assert_eq!(parse_version(""), None);
        assert_eq!(parse_version("latest"), None);
        assert_eq!(parse_version("1.2.3.4"), None);
    }

    #[test]
    fn test_resolve_wildcard_picks_highest() {
        assert_eq!(
            resolve("9.6.*", &catalog()).unwrap(),
            Some("9.6.5".to_string())
        );
    }

    #[test]
    fn test_resolve_exact() {
        assert_eq!(resolve("10.0", &catalog()).unwrap(), Some("10.0".to_string()));
    }

    #[test]
    fn test_resolve_unsatisfiable() {
        let err = resolve("11.0", &catalog()).unwrap_err();
        assert!(matches!(err, DeployError::Version { .. }));
    }

    #[test]
    fn test_resolve_empty_is_no_preference() {
        assert_eq!(resolve("", &catalog()).unwrap(), None);
        assert_eq!(resolve("  ", &catalog()).unwrap(), None);
    }

    #[test]
    fn test_resolve_bad_constraint() {
        assert!(resolve("not a version", &catalog()).is_err());
    }

    #[test]
    fn test_resolve_skips_unparseable_candidates() {
        let candidates = vec!["latest".to_string(), "9.6.1".to_string()];
        assert_eq!(
            resolve(">=9", &candidates).unwrap(),
            Some("9.6.1".to_string())
        );
    }

    #[test]
    fn test_satisfies() {
        assert!(satisfies("", "9.6.3"));
        assert!(satisfies("9.6.*", "9.6.3"));
        assert!(satisfies("10.0", "10.0"));
        assert!(!satisfies("10.0", "9.6.3"));
        assert!(!satisfies("garbage", "9.6.3"));
    }

    #[test]
    fn test_bare_full_version_is_exact() {
        let candidates: Vec<String> = vec!["9.6.3".into(), "9.6.5".into(), "9.7.0".into()];
        assert_eq!(
            resolve("9.6.3", &candidates).unwrap(),
            Some("9.6.3".to_string())
        );
        assert!(!satisfies("9.6.3", "9.9.1"));
        assert!(!satisfies("9.6.3", "9.6.5"));
        assert!(satisfies("9.6.3", "9.6.3"));
    }

    #[test]
    fn test_bare_partial_version_pins_minor() {
        let candidates: Vec<String> = vec!["9.6.3".into(), "9.6.5".into(), "9.7.0".into()];
        assert_eq!(
            resolve("9.6", &candidates).unwrap(),
            Some("9.6.5".to_string())
        );

        let candidates: Vec<String> = vec!["10.0.0".into(), "10.1.0".into()];
        assert_eq!(
            resolve("10.0", &candidates).unwrap(),
            Some("10.0.0".to_string())
        );
        assert!(satisfies("10.0", "10.0.4"));
        assert!(!satisfies("10.0", "10.1.0"));
    }

    #[test]
    fn test_operators_left_alone() {
        assert!(satisfies(">=9.6, <11", "10.1.0"));
        assert!(satisfies("^9.6", "9.9.1"));
    }
}
