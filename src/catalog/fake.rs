//! In-memory [`Catalog`] used by the engine tests.
//!
//! Models the catalog's idempotent semantics: registering identical data
//! twice leaves the state unchanged, and deregistration removes the whole
//! node. Every call is also recorded so tests can assert on call counts.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::catalog::{Catalog, CatalogError, NodeService, Registration, ServiceRegistration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Register { node: String, service: Option<String> },
    Deregister { node: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeNode {
    pub address: String,
    /// Service name -> (port, tags, check status).
    pub services: BTreeMap<String, (u16, Vec<String>, String)>,
}

#[derive(Default)]
pub struct FakeCatalog {
    state: Mutex<BTreeMap<String, FakeNode>>,
    ops: Mutex<Vec<Op>>,
    fail_next_registers: Mutex<usize>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a node as if something else had registered it.
    pub fn seed_node(&self, node: &str, service: &str, tags: &[&str]) {
        let mut state = self.state.lock().unwrap();
        let entry = state.entry(node.to_string()).or_default();
        entry.services.insert(
            service.to_string(),
            (0, tags.iter().map(|t| t.to_string()).collect(), String::new()),
        );
    }

    /// Make the next `n` register calls fail.
    pub fn fail_next_registers(&self, n: usize) {
        *self.fail_next_registers.lock().unwrap() = n;
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    pub fn deregister_count(&self, node: &str) -> usize {
        self.ops()
            .iter()
            .filter(|op| matches!(op, Op::Deregister { node: n } if n == node))
            .count()
    }

    pub fn nodes(&self) -> BTreeMap<String, FakeNode> {
        self.state.lock().unwrap().clone()
    }

    pub fn node_names(&self) -> Vec<String> {
        self.state.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn register(&self, registration: &Registration) -> Result<(), CatalogError> {
        self.ops.lock().unwrap().push(Op::Register {
            node: registration.node.clone(),
            service: registration.service.as_ref().map(|s| s.service.clone()),
        });

        {
            let mut fail = self.fail_next_registers.lock().unwrap();
            if *fail > 0 {
                *fail -= 1;
                return Err(CatalogError::UnexpectedStatus {
                    operation: "register",
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                });
            }
        }

        let mut state = self.state.lock().unwrap();
        let node = state.entry(registration.node.clone()).or_default();
        node.address = registration.address.clone();
        if let Some(ServiceRegistration {
            service,
            port,
            tags,
        }) = &registration.service
        {
            let status = registration
                .check
                .as_ref()
                .map(|c| c.status.clone())
                .unwrap_or_default();
            node.services
                .insert(service.clone(), (*port, tags.clone(), status));
        }
        Ok(())
    }

    async fn deregister(&self, node: &str) -> Result<(), CatalogError> {
        self.ops.lock().unwrap().push(Op::Deregister {
            node: node.to_string(),
        });
        self.state.lock().unwrap().remove(node);
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<String>, CatalogError> {
        Ok(self.node_names())
    }

    async fn node_services(&self, node: &str) -> Result<Vec<NodeService>, CatalogError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .get(node)
            .map(|n| {
                n.services
                    .values()
                    .map(|(_, tags, _)| NodeService { tags: tags.clone() })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn leader(&self) -> Result<String, CatalogError> {
        Ok("127.0.0.1:8300".to_string())
    }
}
