//! Socket path collection.

use pretty_assertions::assert_eq;
use qcmd_core::config::QmpSocket;
use qcmd_core::devices::{CharBackend, CharDevice, LegacySerial, MonitorDevice};
use qcmd_core::{Config, socket_paths};

use crate::common::fixtures::{full_vm, socket_chardev};

#[test]
fn test_groups_are_ordered_by_kind() {
    let config = Config {
        qmp_sockets: vec![QmpSocket {
            name: "/run/vm/qmp.sock".into(),
            server: true,
            ..QmpSocket::default()
        }],
        legacy_serial_devices: vec![LegacySerial {
            backend: Some(CharBackend::Socket),
            path: "/run/vm/serial.sock".into(),
            ..LegacySerial::default()
        }],
        monitor_devices: vec![MonitorDevice {
            backend: Some(CharBackend::Socket),
            path: "/run/vm/monitor.sock".into(),
            ..MonitorDevice::default()
        }],
        char_devices: vec![
            socket_chardev("console0", "/run/vm/console.sock"),
            socket_chardev("agent0", "/run/vm/agent.sock"),
        ],
        ..Config::default()
    };
    assert_eq!(
        socket_paths(&config),
        vec![
            "/run/vm/console.sock",
            "/run/vm/agent.sock",
            "/run/vm/monitor.sock",
            "/run/vm/serial.sock",
            "/run/vm/qmp.sock",
        ]
    );
}

#[test]
fn test_non_socket_backends_are_skipped() {
    let config = Config {
        char_devices: vec![CharDevice {
            backend: CharBackend::Pty,
            id: "pty0".into(),
            ..CharDevice::default()
        }],
        monitor_devices: vec![MonitorDevice {
            name: "stdio".into(),
            ..MonitorDevice::default()
        }],
        legacy_serial_devices: vec![LegacySerial {
            chardev_id: "pty0".into(),
            ..LegacySerial::default()
        }],
        qmp_sockets: vec![QmpSocket {
            socket_type: "tcp".into(),
            name: "localhost:4444".into(),
            ..QmpSocket::default()
        }],
        ..Config::default()
    };
    assert!(socket_paths(&config).is_empty());
}

#[test]
fn test_full_vm_sockets() {
    assert_eq!(
        socket_paths(&full_vm()),
        vec!["/tmp/console.sock", "/tmp/monitor.sock"]
    );
}
