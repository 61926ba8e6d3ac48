//! In-memory model of the containers this process tracks.
//!
//! The registry is the single piece of shared mutable state: the event loop
//! adds and removes containers while the health loop reads snapshots and
//! writes probe results back. All access goes through an `RwLock`; every
//! method takes the lock for the duration of one operation only.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

/// Health of one derived service, as understood by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Unknown,
    Passing,
    Warning,
    Critical,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Unknown => "unknown",
            ServiceStatus::Passing => "passing",
            ServiceStatus::Warning => "warning",
            ServiceStatus::Critical => "critical",
        }
    }
}

/// Kind of reachability probe backing a service's check.
///
/// Only a TCP connect probe exists today; the enum keeps the wire field
/// from degenerating into a stringly-typed constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    TcpSyn,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::TcpSyn => "TCP SYN",
        }
    }
}

/// One network-reachable endpoint exposed by a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    pub port: u16,
    pub check_kind: CheckKind,
    pub status: ServiceStatus,
    /// Diagnostic from the most recent probe: connect latency or error text.
    pub last_output: String,
}

impl Service {
    /// A freshly derived service always starts out `unknown`; only the
    /// health loop transitions it afterwards.
    pub fn new(name: String, port: u16) -> Self {
        Self {
            name,
            port,
            check_kind: CheckKind::TcpSyn,
            status: ServiceStatus::Unknown,
            last_output: String::new(),
        }
    }
}

/// One running container we have decided to track. Mirrored into the
/// catalog as one node plus one service+check entry per service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    /// Runtime-assigned id, stable for the container's lifetime. Removal key.
    pub id: String,
    /// Human-readable name, used as the catalog node name.
    pub name: String,
    /// Address reachable from the health-check loop.
    pub address: String,
    /// Fixed at creation; exposed-port changes on a running container are
    /// not detected.
    pub services: Vec<Service>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("container name {name} already registered by container {existing_id}")]
    NameConflict { name: String, existing_id: String },
}

/// Shared map of container id to tracked container.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<HashMap<String, Container>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a container keyed by id.
    ///
    /// Two distinct containers with the same derived name would produce an
    /// ambiguous catalog node, so the second one is rejected rather than
    /// silently overwriting the first.
    pub async fn upsert(&self, container: Container) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.values().find(|c| c.name == container.name)
            && existing.id != container.id
        {
            return Err(RegistryError::NameConflict {
                name: container.name,
                existing_id: existing.id.clone(),
            });
        }
        inner.insert(container.id.clone(), container);
        Ok(())
    }

    /// Remove a container by id, returning it if it was tracked.
    pub async fn remove(&self, id: &str) -> Option<Container> {
        self.inner.write().await.remove(id)
    }

    /// Clone of every tracked container. The health loop probes against a
    /// snapshot so a slow sweep never holds the lock.
    pub async fn snapshot(&self) -> Vec<Container> {
        self.inner.read().await.values().cloned().collect()
    }

    /// Write one probe result back into the live registry entry.
    ///
    /// The container may have been removed while its probe was in flight;
    /// in that case the result is dropped. Returns the updated container so
    /// the caller re-registers current state rather than the stale snapshot.
    pub async fn apply_probe(
        &self,
        id: &str,
        port: u16,
        status: ServiceStatus,
        output: String,
    ) -> Option<Container> {
        let mut inner = self.inner.write().await;
        let container = inner.get_mut(id)?;
        let service = container.services.iter_mut().find(|s| s.port == port)?;
        service.status = status;
        service.last_output = output;
        Some(container.clone())
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inner.read().await.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(id: &str, name: &str) -> Container {
        Container {
            id: id.to_string(),
            name: name.to_string(),
            address: "172.17.0.2".to_string(),
            services: vec![Service::new(name.to_string(), 80)],
        }
    }

    #[tokio::test]
    async fn upsert_rejects_name_collision_across_ids() {
        let registry = Registry::new();
        registry.upsert(container("aaa", "web")).await.unwrap();

        let err = registry.upsert(container("bbb", "web")).await.unwrap_err();
        assert!(matches!(err, RegistryError::NameConflict { .. }));

        // The first registration is untouched.
        assert!(registry.contains("aaa").await);
        assert!(!registry.contains("bbb").await);
    }

    #[tokio::test]
    async fn upsert_allows_replacing_same_id() {
        let registry = Registry::new();
        registry.upsert(container("aaa", "web")).await.unwrap();
        registry.upsert(container("aaa", "web")).await.unwrap();
        assert_eq!(registry.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn apply_probe_on_removed_container_is_noop() {
        let registry = Registry::new();
        registry.upsert(container("aaa", "web")).await.unwrap();
        registry.remove("aaa").await.unwrap();

        let updated = registry
            .apply_probe("aaa", 80, ServiceStatus::Passing, "ok".to_string())
            .await;
        assert!(updated.is_none());
    }

    #[tokio::test]
    async fn apply_probe_updates_live_entry() {
        let registry = Registry::new();
        registry.upsert(container("aaa", "web")).await.unwrap();

        let updated = registry
            .apply_probe("aaa", 80, ServiceStatus::Critical, "Error: refused".to_string())
            .await
            .unwrap();
        assert_eq!(updated.services[0].status, ServiceStatus::Critical);
        assert_eq!(updated.services[0].last_output, "Error: refused");
    }
}
