use std::sync::OnceLock;

use clap::Parser;

/// Keeps a Consul catalog synchronized with the containers running on this host.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Address of the Consul server.
    #[arg(long, default_value = "0.0.0.0:8500")]
    pub consul: String,

    /// Path to the Docker socket.
    #[arg(long, default_value = "/var/run/docker.sock")]
    pub docker: String,
}

static ARGS: OnceLock<Args> = OnceLock::new();

pub fn get_cli_args() -> &'static Args {
    ARGS.get_or_init(Args::parse)
}
