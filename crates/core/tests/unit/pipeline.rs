//! # Pipeline Tests
//!
//! Whole-configuration assembly: golden command lines, stage and device ordering,
//! all-or-nothing validation, allocation failures, and logger diagnostics.

use pretty_assertions::assert_eq;
use qcmd_core::config::{FwCfg, Incoming, IoThread, Kernel, Knobs, Machine, QmpSocket, Rtc, Smp};
use qcmd_core::devices::{
    BalloonDevice, NetDevice, NetType, PcieRootPort, RngDevice, ScsiController, drivers,
};
use qcmd_core::{
    AllocationError, Assembler, BuildError, BuildOptions, CollisionPolicy, Config, HostArch,
    NullLogger, ValidationError, assemble,
};

use crate::common::fixtures::{
    AARCH64_UEFI_TPM_VM, FULL_BIOS_VM, SPICE_TOKENS, TPM_TOKENS, UEFI_X86_DRIVES, aarch64_vm,
    full_vm, q35_machine, rng0, spice, tpm, uefi_x86, virtio_disk,
};
use crate::common::harness::{assembler, build_x86, init_tracing, position, tokens};
use crate::common::mocks::{MockSink, quiet_sink};

/// Golden tokens with `extra` spliced in before the first `anchor` token.
fn golden_with(anchor: &str, extra: &str) -> Vec<String> {
    let mut expected = tokens(FULL_BIOS_VM);
    let at = position(&expected, anchor).unwrap();
    let _ = expected.splice(at..at, tokens(extra)).count();
    expected
}

fn validation_errors(err: &BuildError) -> Vec<ValidationError> {
    err.validation_errors()
        .map(|errors| errors.iter().cloned().collect())
        .unwrap_or_default()
}

#[test]
fn test_full_bios_vm() {
    init_tracing();
    let invocation = assembler(HostArch::X86_64)
        .build(&full_vm(), &quiet_sink())
        .unwrap();
    assert_eq!(invocation.args, tokens(FULL_BIOS_VM));
    assert!(invocation.fds.is_empty());
}

#[test]
fn test_full_uefi_vm() {
    let args = build_x86(&uefi_x86()).unwrap().args;
    assert_eq!(args, golden_with("-global", UEFI_X86_DRIVES));
}

#[test]
fn test_full_uefi_spice_vm() {
    let mut config = uefi_x86();
    config.spice = Some(spice());
    let mut expected = golden_with("-global", UEFI_X86_DRIVES);
    let at = position(&expected, "-m").unwrap();
    let _ = expected.splice(at..at, tokens(SPICE_TOKENS)).count();
    assert_eq!(build_x86(&config).unwrap().args, expected);
}

#[test]
fn test_full_uefi_tpm_vm() {
    let mut config = uefi_x86();
    config.tpm = Some(tpm());
    let mut expected = golden_with("-global", UEFI_X86_DRIVES);
    let at = position(&expected, "-m").unwrap();
    let _ = expected.splice(at..at, tokens(TPM_TOKENS)).count();
    assert_eq!(build_x86(&config).unwrap().args, expected);
}

#[test]
fn test_full_aarch64_uefi_tpm_vm() {
    let mut config = aarch64_vm();
    config.tpm = Some(tpm());
    config.uefi_firmware_devices.push(qcmd_core::devices::UefiFirmware::new(
        "/usr/share/AAVMF/AAVMF_CODE.ms.fd",
        "uefi_nvram.fd",
    ));
    let args = assembler(HostArch::Aarch64)
        .build(&config, &NullLogger)
        .unwrap()
        .args;
    assert_eq!(args, tokens(AARCH64_UEFI_TPM_VM));
}

#[test]
fn test_minimal_rng_machine() {
    let config = Config {
        machine: q35_machine(),
        cpu_model: "qemu64".into(),
        cpu_model_flags: vec!["+x2apic".into()],
        memory: qcmd_core::config::Memory {
            size: "4096".into(),
            ..Default::default()
        },
        rng_devices: vec![rng0()],
        ..Config::default()
    };
    assert_eq!(
        build_x86(&config).unwrap().args,
        tokens(
            "-machine q35,accel=kvm,smm=on -cpu qemu64,+x2apic -m 4096 \
             -object rng-random,id=rng0,filename=/dev/urandom \
             -device virtio-rng-pci,rng=rng0,bus=pcie.0,addr=0x03"
        )
    );
}

#[test]
fn test_max_cpus_below_cpus_produces_nothing() {
    let mut config = full_vm();
    config.smp = Smp {
        cpus: 4,
        max_cpus: 2,
        ..Smp::default()
    };
    let err = build_x86(&config).unwrap_err();
    assert_eq!(
        validation_errors(&err),
        vec![ValidationError::MaxCpus {
            max_cpus: 2,
            cpus: 4
        }]
    );
    assert!(assemble(&config, &NullLogger).is_err());
}

#[test]
fn test_every_problem_is_reported_at_once() {
    let mut config = full_vm();
    config.machine.smm = "yes".into();
    config.blk_devices[0].file.clear();
    config.rng_devices[0].driver.clear();
    config.qmp_sockets.push(QmpSocket::default());
    config.smp.max_cpus = 1;

    let errors = validation_errors(&build_x86(&config).unwrap_err());
    assert_eq!(errors.len(), 5, "{errors:?}");
    assert!(errors.contains(&ValidationError::Missing {
        kind: "BlockDevice",
        field: "file"
    }));
    assert!(errors.contains(&ValidationError::Missing {
        kind: "RngDevice",
        field: "driver"
    }));
}

#[test]
fn test_controller_precedes_attached_disk() {
    let config = Config {
        blk_devices: vec![qcmd_core::devices::BlockDevice {
            driver: drivers::SCSI_HD.into(),
            bus: "scsi0.0".into(),
            ..virtio_disk("hd0", "data.qcow2")
        }],
        scsi_controller_devices: vec![ScsiController {
            id: "scsi0".into(),
            ..ScsiController::default()
        }],
        ..Config::default()
    };
    let args = build_x86(&config).unwrap().args;
    let controller = args
        .iter()
        .position(|a| a.starts_with("virtio-scsi-pci,id=scsi0"))
        .unwrap();
    let disk = args
        .iter()
        .position(|a| a.starts_with("scsi-hd,drive=hd0"))
        .unwrap();
    assert!(controller < disk);
}

#[test]
fn test_assembly_is_idempotent_across_runs() {
    let mut config = uefi_x86();
    config.balloon_devices.push(BalloonDevice {
        id: "balloon0".into(),
        ..BalloonDevice::default()
    });
    config.blk_devices.push(virtio_disk("data0", "data.qcow2"));
    let first = build_x86(&config.clone()).unwrap();
    let second = build_x86(&config).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_duplicate_ids_within_a_category() {
    let mut config = full_vm();
    config.rng_devices.push(RngDevice {
        addr: String::new(),
        ..rng0()
    });
    let errors = validation_errors(&build_x86(&config).unwrap_err());
    assert_eq!(
        errors,
        vec![ValidationError::DuplicateId {
            kind: "RngDevice",
            id: "rng0".into()
        }]
    );
}

#[test]
fn test_same_id_in_different_categories_is_allowed() {
    let mut config = full_vm();
    config.balloon_devices.push(BalloonDevice {
        id: "rng0".into(),
        ..BalloonDevice::default()
    });
    assert!(build_x86(&config).is_ok());
}

#[test]
fn test_explicit_boot_index_is_reserved_before_auto() {
    let config = Config {
        blk_devices: vec![
            qcmd_core::devices::BlockDevice {
                boot_index: Some("auto".into()),
                ..virtio_disk("hd0", "a.qcow2")
            },
            qcmd_core::devices::BlockDevice {
                boot_index: Some("0".into()),
                ..virtio_disk("hd1", "b.qcow2")
            },
        ],
        ..Config::default()
    };
    let args = build_x86(&config).unwrap().args;
    assert!(args[3].contains("drive=hd0,serial=hd0,bootindex=1,"));
    assert!(args[7].contains("drive=hd1,serial=hd1,bootindex=0,"));
}

#[test]
fn test_duplicate_explicit_boot_index_fails() {
    let config = Config {
        blk_devices: vec![
            qcmd_core::devices::BlockDevice {
                boot_index: Some("0".into()),
                ..virtio_disk("hd0", "a.qcow2")
            },
            qcmd_core::devices::BlockDevice {
                boot_index: Some("0".into()),
                ..virtio_disk("hd1", "b.qcow2")
            },
        ],
        ..Config::default()
    };
    assert!(matches!(
        build_x86(&config),
        Err(BuildError::Allocation(AllocationError::IndexTaken { index: 0, .. }))
    ));
}

#[test]
fn test_slot_collision_policies() {
    let mut config = full_vm();
    config.rng_devices.push(RngDevice {
        id: "rng1".into(),
        addr: "4".into(),
        ..rng0()
    });

    assert!(matches!(
        build_x86(&config),
        Err(BuildError::Allocation(AllocationError::Collision { slot: 4 }))
    ));

    let legacy = Assembler::new(BuildOptions {
        arch: HostArch::X86_64,
        policy: CollisionPolicy::Legacy,
    });
    let args = legacy.build(&config, &NullLogger).unwrap().args;
    assert!(args.contains(&"virtio-rng-pci,rng=rng1,bus=pcie.0,addr=0x1e".to_string()));
}

#[test]
fn test_root_port_slot_is_not_handed_out_again() {
    let mut config = Config {
        machine: q35_machine(),
        pcie_root_port_devices: vec![PcieRootPort {
            id: "rp0".into(),
            chassis: "0x1".into(),
            port: "0x1".into(),
            addr: "0x1e".into(),
            ..PcieRootPort::default()
        }],
        rng_devices: vec![RngDevice {
            addr: String::new(),
            ..rng0()
        }],
        ..Config::default()
    };
    let args = build_x86(&config).unwrap().args;
    assert!(args.contains(&"virtio-rng-pci,rng=rng0,bus=pcie.0,addr=0x1d".to_string()));

    config.rng_devices[0].addr = "0x1e".into();
    assert!(matches!(
        build_x86(&config),
        Err(BuildError::Allocation(AllocationError::Collision { slot: 30 }))
    ));
}

#[test]
fn test_scsi_controller_off_pci_has_no_bus_address() {
    let mut config = Config {
        scsi_controller_devices: vec![ScsiController {
            id: "scsi0".into(),
            devno: "fe.0.0001".into(),
            ..ScsiController::default()
        }],
        ..Config::default()
    };
    let ccw = assembler(HostArch::S390x)
        .build(&config, &NullLogger)
        .unwrap()
        .args;
    assert!(ccw.contains(&"virtio-scsi-ccw,id=scsi0,devno=fe.0.0001".to_string()));

    config.machine = Machine {
        machine_type: "microvm".into(),
        ..Machine::default()
    };
    let mmio = build_x86(&config).unwrap().args;
    assert!(mmio.contains(&"virtio-scsi-device,id=scsi0".to_string()));
}

#[test]
fn test_invalid_fw_cfg_is_skipped_with_error() {
    let mut config = full_vm();
    config.fw_cfg = vec![
        FwCfg {
            name: "opt/broken".into(),
            ..FwCfg::default()
        },
        FwCfg {
            name: "opt/role".into(),
            contents: "worker".into(),
            ..FwCfg::default()
        },
    ];
    let mut sink = MockSink::new();
    let _ = sink.expect_info().return_const(());
    let _ = sink.expect_warn().never();
    let _ = sink
        .expect_error()
        .withf(|message| message.contains("fw_cfg") && message.contains("file"))
        .times(1)
        .return_const(());

    let args = assembler(HostArch::X86_64).build(&config, &sink).unwrap().args;
    assert_eq!(
        args.iter().filter(|a| a.as_str() == "-fw_cfg").count(),
        1,
        "only the valid entry renders"
    );
    assert!(args.contains(&"name=opt/role,string=worker".to_string()));
}

#[test]
fn test_invalid_rtc_is_skipped_with_warning() {
    let mut config = full_vm();
    config.rtc = Some(Rtc {
        clock: "wall".into(),
        ..Rtc::default()
    });
    let mut sink = MockSink::new();
    let _ = sink.expect_info().times(2).return_const(());
    let _ = sink
        .expect_warn()
        .withf(|message| message.contains("real-time clock"))
        .times(1)
        .return_const(());
    let _ = sink.expect_error().never();

    let args = assembler(HostArch::X86_64).build(&config, &sink).unwrap().args;
    assert_eq!(position(&args, "-rtc"), None);
}

#[test]
fn test_descriptor_table_spans_devices_and_migration() {
    let config = Config {
        net_devices: vec![NetDevice {
            net_type: NetType::Tap,
            driver: drivers::VIRTIO_NET.into(),
            id: "tap0".into(),
            fds: vec![10],
            ..NetDevice::default()
        }],
        incoming: Incoming::Fd { fd: 42 },
        ..Config::default()
    };
    let invocation = build_x86(&config).unwrap();
    assert_eq!(invocation.fds, vec![10, 42]);
    assert_eq!(invocation.args[1], "tap,id=tap0,fds=3");
    let tail = &invocation.args[invocation.args.len() - 3..];
    assert_eq!(tail, tokens("-S -incoming fd:4").as_slice());
}

#[test]
fn test_stage_order_of_global_settings() {
    let config = Config {
        name: "vm1".into(),
        uuid: "8c4a2b57-0000-4000-8000-000000000001".into(),
        machine: Machine {
            machine_type: "pc".into(),
            ..Machine::default()
        },
        smbios: qcmd_core::config::SmbiosInfo {
            file: "smbios.bin".into(),
            ..Default::default()
        },
        qmp_sockets: vec![QmpSocket {
            name: "/tmp/qmp.sock".into(),
            server: true,
            no_wait: true,
            ..QmpSocket::default()
        }],
        rtc: Some(Rtc {
            clock: "host".into(),
            driftfix: "slew".into(),
            ..Rtc::default()
        }),
        global_params: vec!["kvm-pit.lost_tick_policy=delay".into()],
        pflash: vec!["flash.img".into()],
        vga: "std".into(),
        knobs: Knobs {
            no_defaults: true,
            ..Knobs::default()
        },
        kernel: Kernel {
            path: "vmlinuz".into(),
            initrd_path: "initrd.img".into(),
            params: "console=ttyS0".into(),
        },
        bios: "bios.bin".into(),
        iothreads: vec![
            IoThread { id: "io0".into() },
            IoThread { id: String::new() },
        ],
        incoming: Incoming::Defer,
        pid_file: "/run/vm1.pid".into(),
        log_file: "/var/log/vm1.log".into(),
        fw_cfg: vec![FwCfg {
            name: "opt/vm1/role".into(),
            contents: "worker".into(),
            ..FwCfg::default()
        }],
        seccomp_sandbox: "on".into(),
        smp: Smp {
            cpus: 2,
            cores: 2,
            max_cpus: 4,
            ..Smp::default()
        },
        ..Config::default()
    };
    assert_eq!(
        build_x86(&config).unwrap().args,
        tokens(
            "-name vm1 -uuid 8c4a2b57-0000-4000-8000-000000000001 -machine pc \
             -smbios file=smbios.bin -qmp unix:/tmp/qmp.sock,server=on,wait=off \
             -rtc base=utc,driftfix=slew,clock=host -global kvm-pit.lost_tick_policy=delay \
             -pflash flash.img -vga std -nodefaults \
             -kernel vmlinuz -initrd initrd.img -append console=ttyS0 -bios bios.bin \
             -object iothread,id=io0 -S -incoming defer \
             -pidfile /run/vm1.pid -D /var/log/vm1.log \
             -fw_cfg name=opt/vm1/role,string=worker -sandbox on -smp 2,cores=2,maxcpus=4"
        )
    );
}

#[test]
fn test_microvm_uses_mmio_and_machine_memory_backend() {
    let config = Config {
        machine: Machine {
            machine_type: "microvm".into(),
            ..Machine::default()
        },
        memory: qcmd_core::config::Memory {
            size: "512M".into(),
            ..Default::default()
        },
        knobs: Knobs {
            mem_shared: true,
            ..Knobs::default()
        },
        rng_devices: vec![RngDevice {
            transport: None,
            ..rng0()
        }],
        ..Config::default()
    };
    assert_eq!(
        build_x86(&config).unwrap().args,
        tokens(
            "-machine microvm -m 512M -object rng-random,id=rng0,filename=/dev/urandom \
             -device virtio-rng-device,rng=rng0,bus=pcie.0 \
             -object memory-backend-ram,id=dimm1,size=512M,share=on -machine memory-backend=dimm1"
        )
    );
}

#[test]
fn test_check_validates_without_rendering() {
    let mut config = full_vm();
    // would collide at render time, but validation alone passes
    config.rng_devices[0].addr = "4".into();
    let assembler = assembler(HostArch::X86_64);
    assert!(assembler.validate(&config).is_ok());
    assert!(assembler.build(&config, &NullLogger).is_err());
    assert_eq!(assembler.options().policy, CollisionPolicy::Strict);
}
