//! Keeps the registry and the catalog in line with the runtime.
//!
//! Three independent situations drive it: the bootstrap pass over the
//! containers already running at startup, stale-entry cleanup of tagged
//! catalog nodes nothing backs any more, and the live Docker event loop.
//! A failure on one container never stops reconciliation of the others.

use futures_util::StreamExt;

use crate::catalog::{Catalog, MANAGED_TAG, consul::CATALOG_SELF_NAME};
use crate::derive::derive_services;
use crate::registry::{Container, Registry, RegistryError};
use crate::runtime::{self, ContainerSummary, EventKind};
use crate::sync;

/// Derive a container's services and track it in the registry.
///
/// Returns `None` without touching anything for the catalog's own container
/// (registering it would feed the catalog back into itself) and for a name
/// conflict with an already-tracked container.
pub async fn track(summary: &ContainerSummary, registry: &Registry) -> Option<Container> {
    if summary.name == CATALOG_SELF_NAME {
        log::debug!("Not adding {CATALOG_SELF_NAME} container");
        return None;
    }

    log::info!("Adding container {}", summary.name);
    let container = Container {
        id: summary.id.clone(),
        name: summary.name.clone(),
        address: summary.address.clone(),
        services: derive_services(&summary.name, &summary.exposed_ports, &summary.env),
    };

    match registry.upsert(container.clone()).await {
        Ok(()) => Some(container),
        Err(e @ RegistryError::NameConflict { .. }) => {
            log::error!("Refusing to track container {}: {}", summary.id, e);
            None
        }
    }
}

/// Initial pass over the containers already running when we come up.
///
/// Each one is tracked and pushed through a deregister-then-register cycle:
/// if a previous run of this process left a registration with different
/// service data behind, the cycle replaces it wholesale. Ends with the
/// stale-entry cleanup over everything that survived.
pub async fn bootstrap<C: Catalog>(
    catalog: &C,
    registry: &Registry,
    running: &[ContainerSummary],
) {
    let mut reconciled = Vec::new();
    for summary in running {
        log::info!("Found already running container: {}", summary.name);
        if let Some(container) = track(summary, registry).await {
            sync::deregister_node(catalog, &container.name).await;
            sync::register_container(catalog, &container).await;
            reconciled.push(container.name);
        }
    }

    cleanup_stale(catalog, &reconciled).await;
}

/// Deregister catalog nodes we manage that no running container backs.
///
/// Only nodes carrying the management tag are candidates; anything else in
/// the catalog was put there by someone else and is left alone.
pub async fn cleanup_stale<C: Catalog>(catalog: &C, running_names: &[String]) {
    let nodes = match catalog.list_nodes().await {
        Ok(nodes) => nodes,
        Err(e) => {
            log::error!("Error getting list of nodes: {e}");
            return;
        }
    };

    for node in nodes {
        if running_names.iter().any(|name| name == &node) {
            continue;
        }
        let services = match catalog.node_services(&node).await {
            Ok(services) => services,
            Err(e) => {
                log::error!("Error getting data for node {node}: {e}");
                continue;
            }
        };
        let managed = services
            .iter()
            .any(|s| s.tags.iter().any(|t| t == MANAGED_TAG));
        if managed {
            log::info!("Removing stale node {node}");
            sync::deregister_node(catalog, &node).await;
        }
    }
}

/// A container started: track it and register its services.
pub async fn handle_start<C: Catalog>(
    summary: &ContainerSummary,
    catalog: &C,
    registry: &Registry,
) {
    if let Some(container) = track(summary, registry).await {
        sync::register_container(catalog, &container).await;
    }
}

/// A container died: forget it and remove its catalog node. Unknown ids are
/// ignored (we never tracked the catalog's own container, for one).
pub async fn handle_die<C: Catalog>(id: &str, catalog: &C, registry: &Registry) {
    if let Some(container) = registry.remove(id).await {
        log::info!("Removing container {}", container.name);
        sync::deregister_node(catalog, &container.name).await;
    }
}

/// Consume the live Docker event stream until it ends or we are cancelled.
pub async fn run_event_loop<C: Catalog>(catalog: &C, registry: &Registry) {
    let mut stream = runtime::event_stream();
    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                log::error!("Docker event stream error: {e}");
                continue;
            }
        };
        let Some(event) = runtime::map_event(message) else {
            continue;
        };
        match event.kind {
            EventKind::Start => match runtime::inspect(&event.id).await {
                Ok(summary) => handle_start(&summary, catalog, registry).await,
                Err(e) => log::error!("Failed to inspect started container {}: {}", event.id, e),
            },
            EventKind::Die => handle_die(&event.id, catalog, registry).await,
            EventKind::Lifecycle => {}
            EventKind::Other(action) => {
                log::debug!("Received event {action} for container {}", event.id)
            }
        }
    }
    log::error!("Docker event stream ended");
}
