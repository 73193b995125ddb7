//! Host socket paths a configuration will create.
//!
//! Whoever launches the hypervisor usually has to wait for these to appear (or clean
//! them up afterwards), so they are collected from the configuration without
//! assembling it.

use crate::config::Config;
use crate::devices::CharBackend;

/// Collects the unix socket paths of `config`.
///
/// Paths are returned in a fixed order: socket character devices, socket monitors,
/// socket legacy serial ports, then unix QMP sockets. Within each group the
/// configuration order is kept.
pub fn socket_paths(config: &Config) -> Vec<String> {
    let chardevs = config
        .char_devices
        .iter()
        .filter(|dev| dev.backend == CharBackend::Socket)
        .map(|dev| dev.path.clone());
    let monitors = config
        .monitor_devices
        .iter()
        .filter(|dev| dev.backend == Some(CharBackend::Socket))
        .map(|dev| dev.path.clone());
    let serials = config
        .legacy_serial_devices
        .iter()
        .filter(|dev| dev.backend == Some(CharBackend::Socket))
        .map(|dev| dev.path.clone());
    let qmp = config
        .qmp_sockets
        .iter()
        .filter(|qmp| qmp.is_unix())
        .map(|qmp| qmp.name.clone());

    chardevs.chain(monitors).chain(serials).chain(qmp).collect()
}
