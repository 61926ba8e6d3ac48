//! Consul catalog API implementation over HTTP.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::catalog::{Catalog, CatalogError, NodeService, Registration};
use crate::runtime::ContainerSummary;

/// Well-known name of the catalog's own container. A container with this
/// name is never registered, and is the fallback discovery target when the
/// configured address has no reachable leader.
pub const CATALOG_SELF_NAME: &str = "consul";

/// Port the catalog's HTTP API listens on inside its own container.
const CATALOG_HTTP_PORT: u16 = 8500;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ConsulCatalog {
    http: reqwest::Client,
    base: String,
}

#[derive(Debug, Deserialize)]
struct NodeRef {
    #[serde(rename = "Node")]
    node: String,
}

#[derive(Debug, Deserialize)]
struct NodeLookup {
    #[serde(rename = "Services", default)]
    services: HashMap<String, NodeService>,
}

impl ConsulCatalog {
    pub fn new(address: &str) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base: format!("http://{address}"),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

fn expect_success(
    operation: &'static str,
    response: &reqwest::Response,
) -> Result<(), CatalogError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(CatalogError::UnexpectedStatus {
            operation,
            status: response.status(),
        })
    }
}

#[async_trait]
impl Catalog for ConsulCatalog {
    async fn register(&self, registration: &Registration) -> Result<(), CatalogError> {
        let response = self
            .http
            .put(self.url("/v1/catalog/register"))
            .json(registration)
            .send()
            .await?;
        expect_success("register", &response)
    }

    async fn deregister(&self, node: &str) -> Result<(), CatalogError> {
        let body = serde_json::json!({ "Node": node });
        let response = self
            .http
            .put(self.url("/v1/catalog/deregister"))
            .json(&body)
            .send()
            .await?;
        expect_success("deregister", &response)
    }

    async fn list_nodes(&self) -> Result<Vec<String>, CatalogError> {
        let response = self.http.get(self.url("/v1/catalog/nodes")).send().await?;
        expect_success("list nodes", &response)?;
        let nodes: Vec<NodeRef> = response.json().await?;
        Ok(nodes.into_iter().map(|n| n.node).collect())
    }

    async fn node_services(&self, node: &str) -> Result<Vec<NodeService>, CatalogError> {
        let response = self
            .http
            .get(self.url(&format!("/v1/catalog/node/{node}")))
            .send()
            .await?;
        expect_success("node lookup", &response)?;
        // Consul returns a JSON null for an unknown node.
        let lookup: Option<NodeLookup> = response.json().await?;
        Ok(lookup
            .map(|l| l.services.into_values().collect())
            .unwrap_or_default())
    }

    async fn leader(&self) -> Result<String, CatalogError> {
        let response = self.http.get(self.url("/v1/status/leader")).send().await?;
        expect_success("leader", &response)?;
        let leader: String = response.json().await?;
        if leader.is_empty() {
            return Err(CatalogError::NoLeader);
        }
        Ok(leader)
    }
}

/// Locate the catalog and return a client with a confirmed leader.
///
/// Two explicit steps: ask the configured address first; if that fails,
/// scan the running containers for one named `consul` and retry against its
/// address on the catalog port. Both failing is a startup-fatal condition.
pub async fn discover(
    configured: &str,
    running: &[ContainerSummary],
) -> Result<ConsulCatalog, CatalogError> {
    let catalog = ConsulCatalog::new(configured)?;
    match catalog.leader().await {
        Ok(leader) => {
            log::info!("Consul leader is {leader}");
            return Ok(catalog);
        }
        Err(e) => log::warn!("Error getting leader from {configured}: {e}"),
    }

    let fallback = running
        .iter()
        .find(|c| c.name == CATALOG_SELF_NAME && !c.address.is_empty())
        .map(|c| format!("{}:{CATALOG_HTTP_PORT}", c.address))
        .ok_or(CatalogError::DiscoveryFailed)?;

    log::info!("Retrying with {fallback}");
    let catalog = ConsulCatalog::new(&fallback)?;
    let leader = catalog.leader().await?;
    log::info!("Consul leader is {leader}");
    Ok(catalog)
}
