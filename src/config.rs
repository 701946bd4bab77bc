//! Runtime settings and the agent enrollment file.
//!
//! [`Settings`] is parsed from the command line with `FLEETPLANE_*`
//! environment fallbacks. The enrollment file lists the agents allowed to
//! connect together with the bearer token each one presents:
//!
//! ```yaml
//! agents:
//!   - token: 3f9c0d5e
//!     org_id: 8d2f6c1e-4a7b-4c3d-9e8f-1a2b3c4d5e6f
//!     instance_uid: edge-collector-01
//!     name: edge collector
//!     tags: [edge, canary]
//!     deployment_mode: supervisor
//! ```

use crate::agent::domain::{
    AgentDomainError, DeploymentMode, InstanceUid, OrgId, ParseAgentValueError,
};
use crate::agent::services::RegisterAgentRequest;
use crate::capability::{ServerCapabilities, UnknownCapabilityName};
use crate::opamp::Principal;
use crate::transport::{DEFAULT_MAX_FRAME_BYTES, StaticTokenAuthenticator};
use clap::Parser;
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Server settings.
#[derive(Debug, Clone, Parser)]
#[command(name = "fleetplane", version, about = "OpAMP fleet control plane", long_about = None)]
pub struct Settings {
    /// Address the OpAMP endpoint listens on.
    #[arg(long, env = "FLEETPLANE_LISTEN", default_value = "0.0.0.0:4320")]
    pub listen: SocketAddr,

    /// `PostgreSQL` URL; in-memory stores are used when absent.
    #[arg(long, env = "FLEETPLANE_DATABASE_URL", value_name = "URL")]
    pub database_url: Option<String>,

    /// Maximum pooled database connections.
    #[arg(long, env = "FLEETPLANE_POOL_SIZE", default_value_t = 10)]
    pub pool_size: u32,

    /// Agent enrollment file.
    #[arg(long, env = "FLEETPLANE_AGENTS_FILE", value_name = "PATH")]
    pub agents_file: Option<PathBuf>,

    /// Heartbeat interval offered to agents in connection settings.
    #[arg(long, env = "FLEETPLANE_HEARTBEAT_SECS", default_value_t = 30)]
    pub heartbeat_interval_secs: u64,

    /// Largest accepted inbound frame or request body, in bytes.
    #[arg(long, env = "FLEETPLANE_MAX_FRAME_BYTES", default_value_t = DEFAULT_MAX_FRAME_BYTES)]
    pub max_frame_bytes: usize,

    /// Server capabilities to advertise by protocol name; all supported
    /// capabilities when empty.
    #[arg(
        long = "server-capability",
        env = "FLEETPLANE_SERVER_CAPABILITIES",
        value_delimiter = ','
    )]
    pub server_capabilities: Vec<String>,
}

impl Settings {
    /// Resolves the advertised server capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownCapability`] for an unrecognised name.
    pub fn capabilities(&self) -> Result<ServerCapabilities, ConfigError> {
        if self.server_capabilities.is_empty() {
            return Ok(ServerCapabilities::SUPPORTED);
        }
        Ok(ServerCapabilities::from_names(
            self.server_capabilities.iter().map(String::as_str),
        )?)
    }
}

/// Settings or enrollment file failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The enrollment file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The enrollment file is not valid YAML for its schema.
    #[error("invalid enrollment file: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// An entry has a blank token.
    #[error("enrollment entry {index} has an empty token")]
    EmptyToken {
        /// Zero-based entry position.
        index: usize,
    },
    /// Two entries share a token.
    #[error("enrollment entry {index} reuses a token")]
    DuplicateToken {
        /// Zero-based position of the second use.
        index: usize,
    },
    /// An entry names an invalid instance identifier.
    #[error("enrollment entry {index}: {source}")]
    InvalidAgent {
        /// Zero-based entry position.
        index: usize,
        /// Validation failure.
        #[source]
        source: AgentDomainError,
    },
    /// An entry names an unknown deployment mode.
    #[error("enrollment entry {index}: {source}")]
    InvalidDeploymentMode {
        /// Zero-based entry position.
        index: usize,
        /// Parse failure.
        #[source]
        source: ParseAgentValueError,
    },
    /// A server capability name is not recognised.
    #[error(transparent)]
    UnknownCapability(#[from] UnknownCapabilityName),
}

/// One enrolled agent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Enrollment {
    /// Bearer token the agent presents.
    pub token: String,
    /// Owning organisation.
    pub org_id: Uuid,
    /// Instance identifier the agent reports.
    pub instance_uid: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Targeting tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Declared deployment mode.
    #[serde(default)]
    pub deployment_mode: Option<String>,
}

/// A validated enrollment file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrollmentFile {
    entries: Vec<Enrollment>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEnrollmentFile {
    #[serde(default)]
    agents: Vec<Enrollment>,
}

impl EnrollmentFile {
    /// Reads and validates an enrollment file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read, or any
    /// error [`EnrollmentFile::parse`] returns.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parses and validates enrollment YAML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for malformed YAML, blank or reused tokens,
    /// invalid instance identifiers, and unknown deployment modes.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let raw: RawEnrollmentFile = serde_yaml::from_str(yaml)?;
        let mut seen = HashSet::new();
        for (index, entry) in raw.agents.iter().enumerate() {
            let token = entry.token.trim();
            if token.is_empty() {
                return Err(ConfigError::EmptyToken { index });
            }
            if !seen.insert(token) {
                return Err(ConfigError::DuplicateToken { index });
            }
            InstanceUid::new(&entry.instance_uid)
                .map_err(|source| ConfigError::InvalidAgent { index, source })?;
            if let Some(mode) = &entry.deployment_mode {
                DeploymentMode::try_from(mode.as_str())
                    .map_err(|source| ConfigError::InvalidDeploymentMode { index, source })?;
            }
        }
        Ok(Self {
            entries: raw.agents,
        })
    }

    /// Enrolled agents in file order.
    #[must_use]
    pub fn entries(&self) -> &[Enrollment] {
        &self.entries
    }

    /// Organisations with at least one enrolled agent.
    #[must_use]
    pub fn organisations(&self) -> BTreeSet<OrgId> {
        self.entries
            .iter()
            .map(|entry| OrgId::from_uuid(entry.org_id))
            .collect()
    }

    /// Builds the token table for the transport.
    #[must_use]
    pub fn authenticator(&self) -> StaticTokenAuthenticator {
        let mut authenticator = StaticTokenAuthenticator::new();
        for entry in &self.entries {
            // Validated in `parse`.
            if let Ok(instance_uid) = InstanceUid::new(&entry.instance_uid) {
                let principal = Principal {
                    org_id: OrgId::from_uuid(entry.org_id),
                    instance_uid,
                };
                authenticator.insert(entry.token.trim(), principal);
            }
        }
        authenticator
    }

    /// Registration requests for every enrolled agent.
    ///
    /// Entries without tags leave the stored tags alone.
    #[must_use]
    pub fn registrations(&self) -> Vec<RegisterAgentRequest> {
        self.entries
            .iter()
            .map(|entry| {
                let mut request =
                    RegisterAgentRequest::new(OrgId::from_uuid(entry.org_id), &entry.instance_uid);
                if !entry.tags.is_empty() {
                    request = request.with_tags(entry.tags.iter().cloned());
                }
                if let Some(name) = &entry.name {
                    request = request.with_name(name.clone());
                }
                if let Some(mode) = entry
                    .deployment_mode
                    .as_deref()
                    .and_then(|mode| DeploymentMode::try_from(mode).ok())
                {
                    request = request.with_deployment_mode(mode);
                }
                request
            })
            .collect()
    }
}
