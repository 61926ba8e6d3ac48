//! Docker runtime collaborator using bollard.
//!
//! Provides a shared Docker client connected to the configured socket and
//! the three calls the engine needs: list running containers, inspect one
//! container into a [`ContainerSummary`], and the live event stream mapped
//! to [`RuntimeEvent`]s.

use std::sync::OnceLock;

use bollard::Docker;
use bollard::models::{ContainerInspectResponse, EventMessage, EventMessageTypeEnum};
use bollard::query_parameters::{
    EventsOptions, InspectContainerOptions, InspectContainerOptionsBuilder, ListContainersOptions,
    ListContainersOptionsBuilder,
};
use futures_util::Stream;

static DOCKER_CLIENT: OnceLock<Docker> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Docker API error: {0}")]
    Api(#[from] bollard::errors::Error),
}

/// Get a reference to the shared Docker client.
///
/// Lazily connects to the socket given on the command line on first use.
pub fn get_docker() -> &'static Docker {
    DOCKER_CLIENT.get_or_init(|| {
        let socket = &crate::cli::get_cli_args().docker;
        Docker::connect_with_unix(socket, 120, bollard::API_DEFAULT_VERSION)
            .expect("Failed to connect to Docker daemon")
    })
}

/// The container metadata the engine derives services from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub address: String,
    pub exposed_ports: Vec<u16>,
    pub env: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Start,
    Die,
    /// Lifecycle stages we observe but do not act on.
    Lifecycle,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEvent {
    pub id: String,
    pub kind: EventKind,
}

/// Inspect one container and reduce the response to what the engine needs.
pub async fn inspect(id: &str) -> Result<ContainerSummary, RuntimeError> {
    let docker = get_docker();
    let options: InspectContainerOptions = InspectContainerOptionsBuilder::new().build();
    let info = docker.inspect_container(id, Some(options)).await?;
    Ok(summarize(id, info))
}

fn summarize(id: &str, info: ContainerInspectResponse) -> ContainerSummary {
    // Docker reports names with a leading slash.
    let name = info
        .name
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| id.to_string());

    // Take the address from the first attached network, by network name so
    // repeated inspections agree.
    let address = info
        .network_settings
        .and_then(|settings| settings.networks)
        .and_then(|networks| {
            let mut entries: Vec<_> = networks.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            entries
                .into_iter()
                .filter_map(|(_, endpoint)| endpoint.ip_address)
                .find(|ip| !ip.is_empty())
        })
        .unwrap_or_default();

    let (exposed_ports, env) = info
        .config
        .map(|config| {
            // Exposed ports arrive as "80/tcp" map keys.
            let ports = config
                .exposed_ports
                .map(|ports| {
                    ports
                        .iter()
                        .filter_map(|key| key.split('/').next()?.parse::<u16>().ok())
                        .collect()
                })
                .unwrap_or_default();
            (ports, config.env.unwrap_or_default())
        })
        .unwrap_or_default();

    ContainerSummary {
        id: id.to_string(),
        name,
        address,
        exposed_ports,
        env,
    }
}

/// List running containers, inspecting each one for its full metadata.
///
/// A listing failure is propagated (the engine cannot start without it); a
/// per-container inspection failure only skips that container.
pub async fn list_running() -> Result<Vec<ContainerSummary>, RuntimeError> {
    let docker = get_docker();
    let options: ListContainersOptions = ListContainersOptionsBuilder::new().all(false).build();
    let entries = docker.list_containers(Some(options)).await?;

    let mut summaries = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(id) = entry.id else {
            continue;
        };
        match inspect(&id).await {
            Ok(summary) => summaries.push(summary),
            Err(e) => log::error!("Failed to inspect container {id}: {e}"),
        }
    }
    Ok(summaries)
}

/// Subscribe to the Docker event stream.
pub fn event_stream()
-> impl Stream<Item = Result<EventMessage, bollard::errors::Error>> + Unpin {
    Box::pin(get_docker().events(None::<EventsOptions>))
}

/// Reduce a raw Docker event to the kinds the reconciler reacts to.
/// Non-container events and events without an actor id yield `None`.
pub fn map_event(message: EventMessage) -> Option<RuntimeEvent> {
    if message.typ != Some(EventMessageTypeEnum::CONTAINER) {
        return None;
    }
    let id = message.actor.and_then(|actor| actor.id)?;
    let kind = match message.action.as_deref() {
        Some("start") => EventKind::Start,
        Some("die") => EventKind::Die,
        Some("create") | Some("destroy") | Some("delete") => EventKind::Lifecycle,
        Some(other) => EventKind::Other(other.to_string()),
        None => return None,
    };
    Some(RuntimeEvent { id, kind })
}
