//! Service-catalog collaborator contract.
//!
//! The engine only ever talks to the catalog through the [`Catalog`] trait:
//! one node+service+check registration per call, deregistration keyed by
//! node name, node listing for stale-entry cleanup, and leader lookup for
//! bootstrap discovery. The HTTP implementation lives in [`consul`].

pub mod consul;
#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Tag attached to every registration this process creates. Cleanup only
/// ever touches nodes carrying it, so manually managed catalog entries are
/// left alone.
pub const MANAGED_TAG: &str = "registrar";

/// Note attached to every check this process registers.
pub const MANAGED_NOTE: &str = "registrar managed node";

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("catalog returned status {status} for {operation}")]
    UnexpectedStatus {
        operation: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("catalog has no leader")]
    NoLeader,
    #[error("unable to determine consul address; try --consul or a container named 'consul'")]
    DiscoveryFailed,
}

/// One catalog registration: a node, and optionally one service with its
/// health check. Registering the same data twice is a no-op to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Registration {
    pub node: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceRegistration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<CheckRegistration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceRegistration {
    pub service: String,
    pub port: u16,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CheckRegistration {
    #[serde(rename = "CheckID")]
    pub check_id: String,
    pub status: String,
    pub output: String,
    pub notes: String,
}

/// Service entry as returned by a node lookup. Only the tags matter to the
/// engine (cleanup checks for [`MANAGED_TAG`]).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeService {
    #[serde(default)]
    pub tags: Vec<String>,
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn register(&self, registration: &Registration) -> Result<(), CatalogError>;
    async fn deregister(&self, node: &str) -> Result<(), CatalogError>;
    async fn list_nodes(&self) -> Result<Vec<String>, CatalogError>;
    async fn node_services(&self, node: &str) -> Result<Vec<NodeService>, CatalogError>;
    async fn leader(&self) -> Result<String, CatalogError>;
}
