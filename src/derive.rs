//! Derives a container's candidate services from its metadata.
//!
//! Naming follows the registrator environment-variable convention:
//! `SERVICE_NAME=<value>` names every exposed port, and
//! `SERVICE_<port>_NAME=<value>` names one specific port. The per-port
//! variable is more specific and wins over the container-wide one, which in
//! turn wins over the bare container name.

use crate::registry::Service;

/// Build the ordered service list for a container.
///
/// Docker enumerates exposed ports as a map with arbitrary iteration order,
/// so the caller may pass ports in any order; they are derived in ascending
/// port order to keep the result deterministic. Pure function, no I/O.
pub fn derive_services(container_name: &str, exposed_ports: &[u16], env: &[String]) -> Vec<Service> {
    let mut ports: Vec<u16> = exposed_ports.to_vec();
    ports.sort_unstable();
    ports.dedup();

    let global_name = env_value(env, "SERVICE_NAME");

    ports
        .into_iter()
        .map(|port| {
            let per_port = env_value(env, &format!("SERVICE_{port}_NAME"));
            let name = per_port
                .or(global_name)
                .unwrap_or(container_name)
                .to_string();
            Service::new(name, port)
        })
        .collect()
}

/// Look up `key=value` in a docker-style environment list.
fn env_value<'a>(env: &'a [String], key: &str) -> Option<&'a str> {
    env.iter().find_map(|entry| {
        let (k, v) = entry.split_once('=')?;
        (k == key).then_some(v)
    })
}
