//! Connection-info output.
//!
//! After a run, every realized deployment is fetched once more and its
//! connection strings are broken into structured records. Hosts pass
//! through the endpoint map so private names can be published under
//! public aliases. The document is keyed by deployment name and written
//! as YAML, or JSON when the destination ends in `.json`.

use crate::backend::PlatformGateway;
use crate::dry_run;
use crate::error::{DeployError, TargetFailure};
use crate::state::RealizedId;
use crate::types::Deployment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use url::Url;

/// Default output location.
pub const DEFAULT_OUTPUT_PATH: &str = "./connection-strings.yml";

/// Alias chains longer than this are treated as cycles.
pub const MAX_ALIAS_DEPTH: usize = 8;

// ═══════════════════════════════════════════════════════════════════
// ENDPOINT MAP
// ═══════════════════════════════════════════════════════════════════

/// Host → alias host. Aliases may chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointMap(BTreeMap<String, String>);

impl EndpointMap {
    pub fn insert(&mut self, host: impl Into<String>, alias: impl Into<String>) {
        self.0.insert(host.into(), alias.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fold another map in. Mapping one host to two different aliases is
    /// a configuration error.
    pub fn merge(&mut self, other: &EndpointMap) -> Result<(), DeployError> {
        for (host, alias) in &other.0 {
            match self.0.get(host) {
                Some(existing) if existing != alias => {
                    return Err(DeployError::Config(format!(
                        "endpoint '{host}' is mapped to both '{existing}' and '{alias}'"
                    )));
                }
                Some(_) => {}
                None => {
                    self.0.insert(host.clone(), alias.clone());
                }
            }
        }
        Ok(())
    }

    /// Check that every chain in the map terminates.
    pub fn validate(&self) -> Result<(), DeployError> {
        self.0.keys().try_for_each(|host| self.resolve(host).map(|_| ()))
    }

    /// Follow the alias chain from `host`.
    pub fn resolve(&self, host: &str) -> Result<String, DeployError> {
        let mut current = host;
        for _ in 0..MAX_ALIAS_DEPTH {
            match self.0.get(current) {
                Some(next) => current = next,
                None => return Ok(current.to_string()),
            }
        }
        if self.0.contains_key(current) {
            return Err(DeployError::Config(format!(
                "endpoint map for '{host}' is cyclic or deeper than {MAX_ALIAS_DEPTH} layers"
            )));
        }
        Ok(current.to_string())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EndpointMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// ═══════════════════════════════════════════════════════════════════
// OUTPUT DOCUMENT
// ═══════════════════════════════════════════════════════════════════

/// One host's connection details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub scheme: String,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentOutput {
    #[serde(rename = "type")]
    pub db_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cacert: String,
    pub version: String,
    pub connections: Vec<ConnectionRecord>,
}

/// Deployment name → connection info, sorted by name.
pub type OutputDocument = BTreeMap<String, DeploymentOutput>;

/// Split a multi-host URI (`mongodb://u:p@h1:1,h2:2/db`) into one URI
/// per host, each keeping the credentials, path and query.
pub fn split_hosts(uri: &str) -> Vec<String> {
    let Some(scheme_end) = uri.find("://") else {
        return vec![uri.to_string()];
    };
    let authority_start = scheme_end + 3;
    let rest = &uri[authority_start..];
    let authority_end = rest
        .find(|c: char| c == '/' || c == '?' || c == '#')
        .unwrap_or(rest.len());
    let authority = &rest[..authority_end];

    let (userinfo, hosts) = match authority.rfind('@') {
        Some(at) => (&authority[..=at], &authority[at + 1..]),
        None => ("", authority),
    };
    if !hosts.contains(',') {
        return vec![uri.to_string()];
    }

    let prefix = &uri[..authority_start];
    let suffix = &rest[authority_end..];
    hosts
        .split(',')
        .filter(|h| !h.is_empty())
        .map(|h| format!("{prefix}{userinfo}{h}{suffix}"))
        .collect()
}

/// Builds the output document from realized deployments.
#[derive(Debug, Default)]
pub struct OutputBuilder {
    endpoint_map: EndpointMap,
    document: OutputDocument,
}

impl OutputBuilder {
    pub fn new(endpoint_map: EndpointMap) -> Self {
        Self {
            endpoint_map,
            document: OutputDocument::new(),
        }
    }

    /// Break one connection string into per-host records.
    pub fn convert(&self, connection_string: &str) -> Result<Vec<ConnectionRecord>, DeployError> {
        split_hosts(connection_string)
            .iter()
            .map(|uri| self.convert_one(uri))
            .collect()
    }

    fn convert_one(&self, uri: &str) -> Result<ConnectionRecord, DeployError> {
        let url = Url::parse(uri)
            .map_err(|e| DeployError::Output(format!("cannot parse connection string: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| DeployError::Output("connection string has no host".to_string()))?;

        Ok(ConnectionRecord {
            scheme: url.scheme().to_string(),
            host: self.endpoint_map.resolve(host)?,
            port: url.port_or_known_default(),
            path: url.path().to_string(),
            query: url.query().unwrap_or_default().to_string(),
            username: url.username().to_string(),
            password: url.password().unwrap_or_default().to_string(),
        })
    }

    /// Add a live deployment.
    pub fn add_deployment(&mut self, deployment: &Deployment) -> Result<(), DeployError> {
        let mut connections = Vec::new();
        for connection_string in &deployment.connection_strings {
            connections.extend(self.convert(connection_string)?);
        }
        self.document.insert(
            deployment.name.clone(),
            DeploymentOutput {
                db_type: deployment.db_type.clone(),
                cacert: deployment.ca_certificate_base64.clone(),
                version: deployment.version.clone(),
                connections,
            },
        );
        Ok(())
    }

    pub fn add_placeholder(&mut self, db_type: &str, name: &str) {
        self.document
            .insert(name.to_string(), dry_run::placeholder_output(db_type, name));
    }

    /// Fetch and add every realized deployment.
    ///
    /// Per-deployment failures are returned, not raised. A cyclic alias
    /// chain is a configuration error and aborts collection.
    pub async fn collect<B: PlatformGateway>(
        &mut self,
        backend: &B,
        realized: &[RealizedId],
    ) -> Result<Vec<TargetFailure>, DeployError> {
        let mut failures = Vec::new();
        for id in realized {
            match id {
                RealizedId::Placeholder { db_type, name } => self.add_placeholder(db_type, name),
                RealizedId::Live(id) => {
                    let result = match backend.get_deployment(id).await {
                        Ok(Some(deployment)) => self.add_deployment(&deployment),
                        Ok(None) => Err(DeployError::InvalidState(format!(
                            "deployment {id} disappeared before output"
                        ))),
                        Err(e) => Err(e.during("fetch connection info", id.as_str())),
                    };
                    match result {
                        Ok(()) => {}
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => failures.push(TargetFailure::new(id.as_str(), e)),
                    }
                }
            }
        }
        Ok(failures)
    }

    pub fn document(&self) -> &OutputDocument {
        &self.document
    }

    pub fn into_document(self) -> OutputDocument {
        self.document
    }
}

// ═══════════════════════════════════════════════════════════════════
// DESTINATION
// ═══════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Yaml,
    Json,
}

impl OutputFormat {
    pub fn render(&self, document: &OutputDocument) -> Result<String, DeployError> {
        match self {
            OutputFormat::Yaml => serde_yaml::to_string(document)
                .map_err(|e| DeployError::Output(format!("failed to serialize YAML: {}", e))),
            OutputFormat::Json => serde_json::to_string_pretty(document)
                .map_err(|e| DeployError::Output(format!("failed to serialize JSON: {}", e))),
        }
    }
}

/// Where the document goes. `-` means stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputDestination {
    Stdout(OutputFormat),
    File(PathBuf),
}

impl OutputDestination {
    pub fn parse(raw: &str) -> Self {
        if raw == "-" {
            OutputDestination::Stdout(OutputFormat::Yaml)
        } else {
            OutputDestination::File(PathBuf::from(raw))
        }
    }

    pub fn format(&self) -> OutputFormat {
        match self {
            OutputDestination::Stdout(format) => *format,
            OutputDestination::File(path) => format_for(path),
        }
    }

    pub async fn write(&self, document: &OutputDocument) -> Result<(), DeployError> {
        let content = self.format().render(document)?;
        match self {
            OutputDestination::Stdout(_) => {
                println!("{}", content);
            }
            OutputDestination::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        DeployError::Output(format!("failed to create output dir: {}", e))
                    })?;
                }
                tokio::fs::write(path, content).await.map_err(|e| {
                    DeployError::Output(format!("failed to write {}: {}", path.display(), e))
                })?;
                tracing::info!(path = %path.display(), entries = document.len(), "wrote connection info");
            }
        }
        Ok(())
    }
}

fn format_for(path: &Path) -> OutputFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => OutputFormat::Json,
        _ => OutputFormat::Yaml,
    }
}
