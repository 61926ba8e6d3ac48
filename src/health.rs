//! Periodic TCP reachability probing of every tracked service.
//!
//! Every sweep snapshots the registry and probes each container's services
//! in its own task; the sweep joins all of them before the next tick, so
//! fan-out is bounded by one sweep and a hanging probe costs at most the
//! probe timeout. Status transitions are logged only at the boundary so
//! steady state stays quiet.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::catalog::Catalog;
use crate::registry::{Container, Registry, ServiceStatus};
use crate::sync;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(2);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Passing { latency: Duration },
    Critical { error: String },
}

impl ProbeOutcome {
    fn into_state(self) -> (ServiceStatus, String) {
        match self {
            ProbeOutcome::Passing { latency } => (
                ServiceStatus::Passing,
                format!("Successful SYN. Connect time: {latency:?}"),
            ),
            ProbeOutcome::Critical { error } => {
                (ServiceStatus::Critical, format!("Error: {error}"))
            }
        }
    }
}

/// Try to open a TCP connection to `address:port` within the probe timeout.
pub async fn probe(address: &str, port: u16) -> ProbeOutcome {
    let target = format!("{address}:{port}");
    let start = Instant::now();
    match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(&target)).await {
        Ok(Ok(_stream)) => ProbeOutcome::Passing {
            latency: start.elapsed(),
        },
        Ok(Err(e)) => ProbeOutcome::Critical {
            error: e.to_string(),
        },
        Err(_) => ProbeOutcome::Critical {
            error: format!("connect timed out after {PROBE_TIMEOUT:?}"),
        },
    }
}

/// A status change worth a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First successful probe ever.
    Passing,
    /// Back from critical.
    Recovered,
    /// Newly unreachable.
    Failed,
}

/// Decide whether a status change crosses a logging boundary. Repeats of
/// the same state never do.
pub fn transition(previous: ServiceStatus, next: ServiceStatus) -> Option<Transition> {
    match (previous, next) {
        (ServiceStatus::Unknown, ServiceStatus::Passing) => Some(Transition::Passing),
        (ServiceStatus::Critical, ServiceStatus::Passing) => Some(Transition::Recovered),
        (previous, ServiceStatus::Critical) if previous != ServiceStatus::Critical => {
            Some(Transition::Failed)
        }
        _ => None,
    }
}

/// Probe every service of one container, fold the results back into the
/// registry and re-register the container's current state.
pub async fn check_container<C: Catalog>(catalog: &C, registry: &Registry, container: Container) {
    let mut current = None;
    for service in &container.services {
        let outcome = probe(&container.address, service.port).await;
        let (status, output) = outcome.into_state();

        // Snapshot status is authoritative here: only this loop writes it.
        if let Some(boundary) = transition(service.status, status) {
            let target = format!("{}:{}", container.address, service.port);
            match boundary {
                Transition::Failed => log::warn!(
                    "Service {}:{} [{}] has error {}",
                    container.name,
                    service.name,
                    target,
                    output
                ),
                Transition::Passing => log::info!(
                    "Service {}:{} [{}] passing",
                    container.name,
                    service.name,
                    target
                ),
                Transition::Recovered => log::info!(
                    "Service {}:{} [{}] recovered",
                    container.name,
                    service.name,
                    target
                ),
            }
        }

        // None means the container was removed mid-sweep; drop the result.
        match registry
            .apply_probe(&container.id, service.port, status, output)
            .await
        {
            Some(updated) => current = Some(updated),
            None => return,
        }
    }

    if let Some(current) = current {
        sync::register_container(catalog, &current).await;
    }
}

/// Timer-driven sweep over the whole registry, forever.
pub async fn run<C: Catalog + 'static>(catalog: Arc<C>, registry: Registry) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let mut sweep = JoinSet::new();
        for container in registry.snapshot().await {
            let catalog = Arc::clone(&catalog);
            let registry = registry.clone();
            sweep.spawn(async move {
                check_container(catalog.as_ref(), &registry, container).await;
            });
        }

        while let Some(result) = sweep.join_next().await {
            if let Err(e) = result {
                log::error!("Health check task failed: {e}");
            }
        }
    }
}
