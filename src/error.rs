//! Error types for deployment reconciliation.
//!
//! No `anyhow` leakage. Explicit, typed errors.

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// A desired deployment violates one or more rules. Carries the
    /// offending object so operators can see exactly what was rejected.
    #[error("invalid deployment '{name}': {}\n{object}", join_rules(.rules))]
    Validation {
        name: String,
        object: String,
        rules: Vec<String>,
    },

    /// Raw failure reported by the platform API.
    #[error("platform API error: {0}")]
    Api(String),

    /// A platform call failed while working on a specific target.
    #[error("{operation} failed for '{target}': {source}")]
    Gateway {
        operation: &'static str,
        target: String,
        #[source]
        source: Box<DeployError>,
    },

    #[error("timed out after {seconds}s waiting on recipe {recipe_id}")]
    Timeout { recipe_id: String, seconds: u64 },

    #[error("recipe {recipe_id} finished with status '{status}'")]
    RecipeFailed { recipe_id: String, status: String },

    #[error("cannot resolve version constraint '{constraint}': {reason}")]
    Version { constraint: String, reason: String },

    /// The input itself cannot be reconciled unambiguously. Always fatal.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid reconciliation state: {0}")]
    InvalidState(String),

    #[error("output error: {0}")]
    Output(String),

    #[error("{}", format_failures(.0))]
    Aggregate(Vec<TargetFailure>),
}

impl DeployError {
    /// Whether this error might be recoverable by re-running.
    pub fn is_recoverable(&self) -> bool {
        match self {
            DeployError::Api(_) | DeployError::Timeout { .. } => true,
            DeployError::Gateway { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }

    /// Configuration-integrity errors abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DeployError::Config(_))
    }

    /// Attach the operation and target to a raw platform failure.
    ///
    /// Timeouts and already-attributed errors pass through unchanged so
    /// "platform is slow" never reads as "platform rejected".
    pub fn during(self, operation: &'static str, target: impl Into<String>) -> Self {
        match self {
            DeployError::Api(_) | DeployError::RecipeFailed { .. } => DeployError::Gateway {
                operation,
                target: target.into(),
                source: Box::new(self),
            },
            other => other,
        }
    }
}

/// One failed target in a run.
#[derive(Debug)]
pub struct TargetFailure {
    pub target: String,
    pub error: DeployError,
}

impl TargetFailure {
    pub fn new(target: impl Into<String>, error: DeployError) -> Self {
        Self {
            target: target.into(),
            error,
        }
    }
}

impl fmt::Display for TargetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.target, self.error)
    }
}

fn join_rules(rules: &[String]) -> String {
    rules.join("; ")
}

fn format_failures(failures: &[TargetFailure]) -> String {
    let mut out = format!("{} error(s) occurred:", failures.len());
    for failure in failures {
        out.push_str("\n- ");
        out.push_str(&failure.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DeployError::Api("503 service unavailable".to_string());
        assert_eq!(err.to_string(), "platform API error: 503 service unavailable");

        let err = DeployError::Timeout {
            recipe_id: "r-1".to_string(),
            seconds: 30,
        };
        assert_eq!(err.to_string(), "timed out after 30s waiting on recipe r-1");

        let err = DeployError::Version {
            constraint: "11.0".to_string(),
            reason: "no version satisfies it".to_string(),
        };
        assert!(err.to_string().contains("'11.0'"));

        let err = DeployError::Validation {
            name: "db1".to_string(),
            object: "name: db1".to_string(),
            rules: vec!["bad type".to_string(), "bad scaling".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("bad type; bad scaling"));
        assert!(msg.contains("name: db1"));

        let err = DeployError::Config("duplicate name".to_string());
        assert_eq!(err.to_string(), "configuration error: duplicate name");
    }

    #[test]
    fn test_during_wraps_api_errors_only() {
        let err = DeployError::Api("boom".into()).during("resize", "db1");
        assert!(matches!(
            err,
            DeployError::Gateway {
                operation: "resize",
                ..
            }
        ));
        assert_eq!(err.to_string(), "resize failed for 'db1': platform API error: boom");

        let err = DeployError::Timeout {
            recipe_id: "r".into(),
            seconds: 1,
        }
        .during("resize", "db1");
        assert!(matches!(err, DeployError::Timeout { .. }));
    }

    #[test]
    fn test_error_is_recoverable() {
        assert!(DeployError::Api("x".into()).is_recoverable());
        assert!(DeployError::Api("x".into()).during("create", "a").is_recoverable());
        assert!(DeployError::Timeout {
            recipe_id: "r".into(),
            seconds: 1
        }
        .is_recoverable());

        assert!(!DeployError::Config("x".into()).is_recoverable());
        assert!(!DeployError::InvalidState("x".into()).is_recoverable());
        assert!(DeployError::Config("x".into()).is_fatal());
        assert!(!DeployError::Api("x".into()).is_fatal());
    }

    #[test]
    fn test_aggregate_lists_every_target() {
        let err = DeployError::Aggregate(vec![
            TargetFailure::new("db1", DeployError::Api("a".into())),
            TargetFailure::new("db2", DeployError::Api("b".into())),
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("2 error(s) occurred:"));
        assert!(msg.contains("- db1: platform API error: a"));
        assert!(msg.contains("- db2: platform API error: b"));
    }
}
