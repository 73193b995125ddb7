//! # Device Tests
//!
//! Validation rules and token layouts of each device kind, rendered against a fresh
//! build context.

use pretty_assertions::assert_eq;
use qcmd_core::builder::BuildContext;
use qcmd_core::config::Knobs;
use qcmd_core::devices::{
    BalloonDevice, BlockDevice, BridgeDevice, BridgeType, CharBackend, CharDevice, Device,
    DeviceContext, IdeController, LegacySerial, MonitorDevice, NetDevice, NetTap, NetType,
    PcieRootPort, RngDevice, ScsiController, TpmDevice, UefiFirmware, UsbController,
    VirtioSerial, drivers,
};
use qcmd_core::transport::Transport;
use qcmd_core::{AllocationError, CollisionPolicy, HostArch, ValidationError};
use rstest::rstest;

use crate::common::fixtures::{rng0, socket_chardev, tpm, virtio_disk};
use crate::common::harness::tokens;

/// Renders one device on a fresh x86 q35 context.
fn render(device: &dyn Device, transport: Transport) -> Vec<String> {
    render_with(device, transport, HostArch::X86_64, &Knobs::default()).0
}

/// Renders one device and returns the tokens with the context's descriptor table.
fn render_with(
    device: &dyn Device,
    transport: Transport,
    arch: HostArch,
    knobs: &Knobs,
) -> (Vec<String>, Vec<i32>) {
    let mut ctx = BuildContext::new(arch, CollisionPolicy::Strict, "q35");
    let out = device
        .render(&mut DeviceContext::new(&mut ctx, knobs, transport))
        .unwrap();
    (out, ctx.into_fds())
}

#[test]
fn test_root_port_defaults() {
    let port = PcieRootPort {
        id: "rp1".into(),
        ..PcieRootPort::default()
    };
    assert_eq!(
        render(&port, Transport::Pci),
        tokens("-device pcie-root-port,id=rp1,bus=pcie.0,chassis=0x00,slot=0x00,addr=0x00,multifunction=off")
    );
}

#[test]
fn test_root_port_reservations_are_exclusive() {
    let port = PcieRootPort {
        id: "rp0".into(),
        pref32_reserve: "256M".into(),
        pref64_reserve: "16G".into(),
        ..PcieRootPort::default()
    };
    assert!(matches!(
        port.validate(),
        Err(ValidationError::Exclusive { .. })
    ));
}

#[test]
fn test_root_port_multifunction_range() {
    let ports = PcieRootPort::multifunction_range("root-port", "pcie.0", "4", 8).unwrap();
    assert_eq!(ports.len(), 8);
    assert_eq!(
        render(&ports[0], Transport::Pci),
        tokens("-device pcie-root-port,id=root-port.4.0,bus=pcie.0,chassis=0x0,slot=0x00,port=0x0,addr=4.0x0,multifunction=on")
    );
    assert_eq!(
        render(&ports[7], Transport::Pci),
        tokens("-device pcie-root-port,id=root-port.4.7,bus=pcie.0,chassis=0x7,slot=0x00,port=0x7,addr=4.0x7")
    );
    assert!(PcieRootPort::multifunction_range("root-port", "pcie.0", "4", 0).is_err());
}

#[test]
fn test_bridges_render_address_verbatim() {
    let bridge = BridgeDevice {
        bridge_type: BridgeType::Pci,
        bus: "pci.0".into(),
        id: "bridge0".into(),
        chassis: 5,
        shpc: true,
        addr: "0x1e".into(),
        ..BridgeDevice::default()
    };
    assert_eq!(
        render(&bridge, Transport::Pci),
        tokens("-device pci-bridge,bus=pci.0,id=bridge0,chassis_nr=5,shpc=on,addr=1e")
    );

    let pcie = BridgeDevice {
        bridge_type: BridgeType::Pcie,
        bus: "pcie.0".into(),
        id: "pcie-bridge0".into(),
        ..BridgeDevice::default()
    };
    assert_eq!(
        render(&pcie, Transport::Pci),
        tokens("-device pcie-pci-bridge,bus=pcie.0,id=pcie-bridge0")
    );
    assert!(BridgeDevice::default().validate().is_err());
}

#[test]
fn test_scsi_controller_declares_its_iothread() {
    let scsi = ScsiController {
        id: "scsi0".into(),
        iothread: "io0".into(),
        ..ScsiController::default()
    };
    assert_eq!(
        render(&scsi, Transport::Pci),
        tokens("-device virtio-scsi-pci,id=scsi0,addr=0x1e,bus=pcie.0,disable-modern=false,iothread=io0 -object iothread,poll-max-ns=32,id=io0")
    );
}

#[test]
fn test_ide_and_usb_controllers_take_slots() {
    let ide = IdeController::new(drivers::ICH9_AHCI, "ahci0");
    assert_eq!(
        render(&ide, Transport::Pci),
        tokens("-device ich9-ahci,id=ahci0,addr=0x1e,bus=pcie.0")
    );
    let usb = UsbController::xhci("usb0");
    assert_eq!(
        render(&usb, Transport::Pci),
        tokens("-device qemu-xhci,id=usb0,addr=0x1e")
    );
    assert!(matches!(
        IdeController::new("", "ide0").validate(),
        Err(ValidationError::Missing { field: "driver", .. })
    ));
}

#[rstest]
#[case::missing_file(|d: &mut qcmd_core::devices::BlockDevice| d.file.clear(), "file")]
#[case::missing_format(|d: &mut qcmd_core::devices::BlockDevice| d.format.clear(), "format")]
#[case::missing_interface(|d: &mut qcmd_core::devices::BlockDevice| d.interface.clear(), "interface")]
fn test_block_required_fields(
    #[case] strip: fn(&mut qcmd_core::devices::BlockDevice),
    #[case] field: &str,
) {
    let mut disk = virtio_disk("hd0", "disk.qcow2");
    strip(&mut disk);
    match disk.validate() {
        Err(ValidationError::Missing { field: got, .. }) => assert_eq!(got, field),
        other => panic!("expected missing {field}, got {other:?}"),
    }
}

#[test]
fn test_block_rotation_rate_rules() {
    let mut disk = virtio_disk("hd0", "disk.qcow2");
    disk.rotation_rate = 7200;
    assert!(matches!(
        disk.validate(),
        Err(ValidationError::Unsupported { .. })
    ));

    disk.driver = drivers::SCSI_HD.into();
    disk.bus = "scsi0.0".into();
    assert_eq!(disk.validate(), Ok(()));
    assert_eq!(
        render(&disk, Transport::Pci),
        tokens("-drive file=disk.qcow2,id=hd0,if=none,format=qcow2 -device scsi-hd,drive=hd0,serial=hd0,bus=scsi0.0,rotation_rate=7200,scsi=off")
    );
}

#[test]
fn test_block_on_ccw_takes_no_slot() {
    let mut disk = virtio_disk("hd0", "disk.qcow2");
    disk.devno = "fe.0.0001".into();
    assert_eq!(
        render(&disk, Transport::Ccw),
        tokens("-drive file=disk.qcow2,id=hd0,if=none,format=qcow2 -device virtio-blk-ccw,drive=hd0,serial=hd0,scsi=off,config-wce=off,devno=fe.0.0001")
    );
}

#[test]
fn test_block_drive_only() {
    let mut disk = virtio_disk("hd0", "disk.qcow2");
    disk.drive_only = true;
    assert_eq!(
        render(&disk, Transport::Pci),
        tokens("-drive file=disk.qcow2,id=hd0,if=none,format=qcow2")
    );
}

#[test]
fn test_block_boot_index_must_be_numeric_or_auto() {
    let mut disk = virtio_disk("hd0", "disk.qcow2");
    disk.boot_index = Some("first".into());
    assert!(matches!(
        disk.validate(),
        Err(ValidationError::InvalidValue { field: "bootindex", .. })
    ));
    disk.boot_index = Some("auto".into());
    assert_eq!(disk.validate(), Ok(()));
}

#[test]
fn test_chardev_rules() {
    let stdio = CharDevice {
        backend: CharBackend::Stdio,
        id: "char0".into(),
        ..CharDevice::default()
    };
    assert_eq!(stdio.validate(), Ok(()));

    let mut socket = socket_chardev("char1", "");
    assert!(socket.validate().is_err());
    socket.path = "/tmp/char1.sock".into();
    socket.mux = "maybe".into();
    assert!(matches!(
        socket.validate(),
        Err(ValidationError::InvalidValue { field: "multiplex", .. })
    ));
}

#[test]
fn test_chardev_with_virtserialport_frontend() {
    let port = CharDevice {
        backend: CharBackend::Socket,
        driver: drivers::VIRTSERIALPORT.into(),
        bus: "serial0.0".into(),
        device_id: "channel0".into(),
        id: "charch0".into(),
        path: "/tmp/agent.sock".into(),
        name: "org.qemu.guest_agent.0".into(),
        ..CharDevice::default()
    };
    assert_eq!(
        render(&port, Transport::Pci),
        tokens("-device virtserialport,bus=serial0.0,chardev=charch0,id=channel0,name=org.qemu.guest_agent.0 -chardev socket,id=charch0,path=/tmp/agent.sock,server=on,wait=off")
    );
}

#[test]
fn test_pci_serial_chardev_disables_default_serial() {
    let dev = CharDevice {
        driver: drivers::PCI_SERIAL.into(),
        ..socket_chardev("console0", "/tmp/console.sock")
    };
    assert_eq!(
        render(&dev, Transport::Pci),
        tokens("-serial none -chardev socket,id=console0,path=/tmp/console.sock,server=on,wait=off")
    );
}

#[rstest]
#[case::nothing(None, "", "", false)]
#[case::both(None, "stdio", "char0", false)]
#[case::name_only(None, "stdio", "", true)]
#[case::chardev_only(None, "", "char0", true)]
#[case::pty(Some(CharBackend::Pty), "", "", false)]
#[case::socket_without_path(Some(CharBackend::Socket), "", "", false)]
fn test_legacy_serial_endpoint_rules(
    #[case] backend: Option<CharBackend>,
    #[case] name: &str,
    #[case] chardev_id: &str,
    #[case] valid: bool,
) {
    let serial = LegacySerial {
        backend,
        name: name.into(),
        chardev_id: chardev_id.into(),
        ..LegacySerial::default()
    };
    assert_eq!(serial.validate().is_ok(), valid);
    let monitor = MonitorDevice {
        backend,
        name: name.into(),
        chardev_id: chardev_id.into(),
        ..MonitorDevice::default()
    };
    assert_eq!(monitor.validate().is_ok(), valid);
}

#[test]
fn test_serial_and_monitor_endpoints() {
    let muxed = LegacySerial {
        mon_mux: true,
        ..LegacySerial::default()
    };
    assert_eq!(muxed.validate(), Ok(()));
    assert_eq!(render(&muxed, Transport::Pci), tokens("-serial mon:stdio"));

    let monitor = MonitorDevice {
        backend: Some(CharBackend::Socket),
        path: "/tmp/hmp.sock".into(),
        ..MonitorDevice::default()
    };
    assert_eq!(
        render(&monitor, Transport::Pci),
        tokens("-monitor unix:/tmp/hmp.sock,server=on,wait=off")
    );
}

fn tap(fds: Vec<i32>) -> NetDevice {
    NetDevice {
        net_type: NetType::Tap,
        driver: drivers::VIRTIO_NET.into(),
        id: "tap0".into(),
        mac_address: "52:54:00:12:34:56".into(),
        fds,
        ..NetDevice::default()
    }
}

#[test]
fn test_tap_descriptors_enable_multiqueue() {
    let (out, fds) = render_with(
        &tap(vec![10, 11]),
        Transport::Pci,
        HostArch::X86_64,
        &Knobs::default(),
    );
    assert_eq!(
        out,
        tokens("-netdev tap,id=tap0,fds=3:4 -device virtio-net-pci,netdev=tap0,mac=52:54:00:12:34:56,disable-modern=false,mq=on,vectors=6")
    );
    assert_eq!(fds, vec![10, 11]);
}

#[test]
fn test_tap_vhost_descriptors_number_first() {
    let mut dev = tap(vec![20]);
    dev.vhost = true;
    dev.vhost_fds = vec![30];
    let (out, fds) = render_with(&dev, Transport::Ccw, HostArch::S390x, &Knobs::default());
    assert_eq!(out[1], "tap,id=tap0,vhost=on,vhostfds=3,fds=4");
    assert_eq!(fds, vec![30, 20]);
    // no vector count off PCI
    assert!(out[3].contains(",mq=on,devno="));
}

#[test]
fn test_tap_by_name() {
    let mut dev = tap(Vec::new());
    assert!(matches!(
        dev.validate(),
        Err(ValidationError::Missing { field: "tap-device.ifname", .. })
    ));
    dev.tap = NetTap {
        ifname: "tap0".into(),
        script: "/etc/qemu-ifup".into(),
        ..NetTap::default()
    };
    dev.addr = "6".into();
    dev.boot_index = Some("auto".into());
    assert_eq!(dev.validate(), Ok(()));
    assert_eq!(
        render(&dev, Transport::Pci),
        tokens("-netdev tap,id=tap0,ifname=tap0,script=/etc/qemu-ifup -device virtio-net-pci,netdev=tap0,mac=52:54:00:12:34:56,addr=0x06,bootindex=0,disable-modern=false")
    );
}

#[test]
fn test_macvtap_needs_descriptors_to_render() {
    let mut dev = tap(Vec::new());
    dev.net_type = NetType::Macvtap;
    assert!(render(&dev, Transport::Pci).is_empty());

    dev.fds = vec![7];
    let (out, fds) = render_with(&dev, Transport::Pci, HostArch::X86_64, &Knobs::default());
    assert_eq!(out[1], "tap,id=tap0,fds=3");
    assert_eq!(fds, vec![7]);
}

#[rstest]
#[case(NetType::Vfio)]
#[case(NetType::Vhostuser)]
#[case(NetType::Ipvtap)]
fn test_unsupported_net_types(#[case] net_type: NetType) {
    let mut dev = tap(vec![3]);
    dev.net_type = net_type;
    assert!(matches!(
        dev.validate(),
        Err(ValidationError::InvalidValue { field: "type", .. })
    ));
}

#[test]
fn test_net_explicit_slot_collision_is_reported() {
    let mut ctx = BuildContext::new(HostArch::X86_64, CollisionPolicy::Strict, "q35");
    ctx.bus_mut().set_slot(6).unwrap();
    let mut dev = tap(vec![3]);
    dev.addr = "6".into();
    let knobs = Knobs::default();
    assert_eq!(
        dev.render(&mut DeviceContext::new(&mut ctx, &knobs, Transport::Pci)),
        Err(AllocationError::Collision { slot: 6 })
    );
}

#[test]
fn test_rng_on_ccw_with_iommu() {
    let rng = RngDevice {
        devno: "fe.0.0002".into(),
        max_bytes: 1024,
        period: 1000,
        transport: Some(Transport::Ccw),
        ..rng0()
    };
    let knobs = Knobs {
        iommu_platform: true,
        ..Knobs::default()
    };
    let (out, _) = render_with(&rng, Transport::Ccw, HostArch::S390x, &knobs);
    assert_eq!(
        out,
        tokens("-object rng-random,id=rng0,filename=/dev/urandom -device virtio-rng-ccw,rng=rng0,bus=pcie.0,iommu_platform=on,devno=fe.0.0002,max-bytes=1024,period=1000")
    );
}

#[test]
fn test_rng_requires_driver() {
    let rng = RngDevice {
        driver: String::new(),
        ..rng0()
    };
    assert!(matches!(
        rng.validate(),
        Err(ValidationError::Missing { field: "driver", .. })
    ));
}

#[test]
fn test_balloon() {
    let balloon = BalloonDevice {
        id: "balloon0".into(),
        deflate_on_oom: true,
        ..BalloonDevice::default()
    };
    assert_eq!(
        render(&balloon, Transport::Pci),
        tokens("-device virtio-balloon-pci,id=balloon0,deflate-on-oom=on,disable-modern=false")
    );
    assert!(BalloonDevice::default().validate().is_err());
}

#[test]
fn test_virtio_serial_controller() {
    let serial = VirtioSerial {
        driver: drivers::VIRTIO_SERIAL.into(),
        id: "serial0".into(),
        ..VirtioSerial::default()
    };
    assert_eq!(
        render(&serial, Transport::Pci),
        tokens("-device virtio-serial-pci,disable-modern=false,id=serial0")
    );
    assert_eq!(
        render(&serial, Transport::Mmio),
        tokens("-device virtio-serial-device,id=serial0")
    );
}

#[rstest]
#[case(HostArch::X86_64, "tpm-tis")]
#[case(HostArch::Aarch64, "tpm-tis-device")]
fn test_tpm_frontend_follows_arch(#[case] arch: HostArch, #[case] frontend: &str) {
    let (out, _) = render_with(&tpm(), Transport::Pci, arch, &Knobs::default());
    assert_eq!(out.last().map(String::as_str), Some(&*format!("{frontend},tpmdev=tpm0")));
}

#[test]
fn test_tpm_type_is_checked() {
    let bad = TpmDevice {
        tpm_type: "swtpm".into(),
        ..tpm()
    };
    assert!(matches!(
        bad.validate(),
        Err(ValidationError::InvalidValue { field: "type", .. })
    ));
}

#[rstest]
#[case::ccw(Transport::Ccw, HostArch::S390x, "-device virtio-scsi-ccw,id=scsi0,devno=fe.0.0001")]
#[case::mmio(Transport::Mmio, HostArch::X86_64, "-device virtio-scsi-device,id=scsi0")]
fn test_scsi_controller_off_pci_takes_no_slot(
    #[case] transport: Transport,
    #[case] arch: HostArch,
    #[case] expected: &str,
) {
    let scsi = ScsiController {
        id: "scsi0".into(),
        devno: "fe.0.0001".into(),
        ..ScsiController::default()
    };
    let mut ctx = BuildContext::new(arch, CollisionPolicy::Strict, "q35");
    let out = scsi
        .render(&mut DeviceContext::new(&mut ctx, &Knobs::default(), transport))
        .unwrap();
    assert_eq!(out, tokens(expected));
    assert!(ctx.bus().used_slots().is_empty());
}

#[test]
fn test_root_ports_claim_their_slot_once() {
    let ports = PcieRootPort::multifunction_range("rp", "pcie.0", "0x5", 2).unwrap();
    let mut ctx = BuildContext::new(HostArch::X86_64, CollisionPolicy::Strict, "q35");
    let knobs = Knobs::default();
    for port in &ports {
        let _ = port
            .render(&mut DeviceContext::new(&mut ctx, &knobs, Transport::Pci))
            .unwrap();
    }
    assert_eq!(ctx.bus().used_slots(), vec![5]);

    let rng = RngDevice {
        addr: "5".into(),
        ..rng0()
    };
    assert_eq!(
        rng.render(&mut DeviceContext::new(&mut ctx, &knobs, Transport::Pci)),
        Err(AllocationError::Collision { slot: 5 })
    );
}

#[test]
fn test_bridge_claims_root_slot_only_on_root_bus() {
    let mut ctx = BuildContext::new(HostArch::X86_64, CollisionPolicy::Strict, "pc");
    let knobs = Knobs::default();
    let on_root = BridgeDevice {
        bus: "pci.0".into(),
        id: "bridge0".into(),
        addr: "0x1e".into(),
        ..BridgeDevice::default()
    };
    let nested = BridgeDevice {
        bus: "bridge0".into(),
        id: "bridge1".into(),
        addr: "0x3".into(),
        ..BridgeDevice::default()
    };
    for bridge in [&on_root, &nested] {
        let _ = bridge
            .render(&mut DeviceContext::new(&mut ctx, &knobs, Transport::Pci))
            .unwrap();
    }
    assert_eq!(ctx.bus().used_slots(), vec![30]);
    assert_eq!(ctx.bus_mut().allocate_auto(), Ok(29));
}

#[rstest]
#[case::root_port(Box::new(PcieRootPort::default()))]
#[case::bridge(Box::new(BridgeDevice { bus: "pcie.0".into(), ..BridgeDevice::default() }))]
#[case::scsi(Box::new(ScsiController::default()))]
#[case::ide(Box::new(IdeController::new(drivers::ICH9_AHCI, "")))]
#[case::usb(Box::new(UsbController::xhci("")))]
#[case::block(Box::new(virtio_disk("", "disk.qcow2")))]
#[case::chardev(Box::new(socket_chardev("", "/tmp/console.sock")))]
#[case::net(Box::new(NetDevice { driver: drivers::VIRTIO_NET.into(), ..NetDevice::default() }))]
#[case::rng(Box::new(RngDevice { id: String::new(), ..rng0() }))]
#[case::balloon(Box::new(BalloonDevice::default()))]
#[case::virtio_serial(Box::new(VirtioSerial { driver: drivers::VIRTIO_SERIAL.into(), ..VirtioSerial::default() }))]
#[case::tpm(Box::new(TpmDevice { id: String::new(), ..tpm() }))]
fn test_empty_identifier_is_rejected(#[case] device: Box<dyn Device>) {
    assert_eq!(device.id(), None);
    match device.validate() {
        Err(ValidationError::Missing { kind, field: "id" }) => assert_eq!(kind, device.kind()),
        other => panic!("{} accepted an empty id: {other:?}", device.kind()),
    }
}

#[rstest]
#[case::legacy_serial(Box::new(LegacySerial { name: "stdio".into(), ..LegacySerial::default() }))]
#[case::monitor(Box::new(MonitorDevice { name: "stdio".into(), ..MonitorDevice::default() }))]
#[case::uefi(Box::new(UefiFirmware::new("OVMF_CODE.fd", "OVMF_VARS.fd")))]
fn test_endpoint_kinds_have_no_identifier(#[case] device: Box<dyn Device>) {
    assert_eq!(device.id(), None);
    assert_eq!(device.validate(), Ok(()));
}
