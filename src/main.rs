use std::sync::Arc;

mod catalog;
mod cli;
mod derive;
mod health;
mod reconciler;
mod registry;
mod runtime;
mod sync;

use registry::Registry;

#[tokio::main]
async fn main() {
    // Initialize the logger
    env_logger::init();

    let args = cli::get_cli_args();

    // Everything here is startup-fatal: without the runtime and a reachable
    // catalog leader there is nothing this process can do.
    let running = match runtime::list_running().await {
        Ok(running) => running,
        Err(e) => {
            log::error!("Unable to list running containers: {e}");
            std::process::exit(1);
        }
    };

    let consul = match catalog::consul::discover(&args.consul, &running).await {
        Ok(consul) => Arc::new(consul),
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    let registry = Registry::new();
    reconciler::bootstrap(consul.as_ref(), &registry, &running).await;

    log::info!("Finished enumerating containers, starting watch for docker events.");

    // The event loop and the health loop share the registry; ctrl-c cancels
    // both by dropping them.
    tokio::select! {
        _ = reconciler::run_event_loop(consul.as_ref(), &registry) => {
            log::error!("Event loop stopped, shutting down");
        }
        _ = health::run(Arc::clone(&consul), registry.clone()) => {}
        _ = tokio::signal::ctrl_c() => {
            log::info!("Received interrupt, shutting down");
        }
    }
}
