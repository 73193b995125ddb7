//! # UEFI Firmware Discovery Tests
//!
//! Candidate preference and error reporting, against firmware trees built in a
//! temporary directory.

use std::fs;
use std::path::{Path, PathBuf};

use qcmd_core::devices::UefiFirmware;
use qcmd_core::{FirmwareError, HostArch};
use tempfile::TempDir;

/// Creates `root/<dir>/<name>` for every name.
fn install(root: &Path, dir: &str, names: &[&str]) {
    let dir = root.join(dir);
    fs::create_dir_all(&dir).unwrap();
    for name in names {
        fs::write(dir.join(name), b"fw").unwrap();
    }
}

fn path_of(root: &Path, dir: &str, name: &str) -> String {
    root.join(dir).join(name).to_string_lossy().into_owned()
}

#[test]
fn test_secure_prefers_4mb_secboot_with_ms_vars() {
    let root = TempDir::new().unwrap();
    install(
        root.path(),
        "OVMF",
        &[
            "OVMF_CODE_4M.secboot.fd",
            "OVMF_VARS_4M.ms.fd",
            "OVMF_VARS_4M.secboot.fd",
            "OVMF_CODE.secboot.fd",
            "OVMF_VARS.secboot.fd",
        ],
    );
    let fw = UefiFirmware::discover(root.path(), HostArch::X86_64, true).unwrap();
    assert_eq!(fw.code, path_of(root.path(), "OVMF", "OVMF_CODE_4M.secboot.fd"));
    assert_eq!(fw.vars, path_of(root.path(), "OVMF", "OVMF_VARS_4M.ms.fd"));
    assert!(fw.is_secure_boot());
    assert!(fw.is_4mb());
}

#[test]
fn test_secure_moves_past_incomplete_pairs() {
    let root = TempDir::new().unwrap();
    // code without matching vars for the first two candidates
    install(
        root.path(),
        "OVMF",
        &["OVMF_CODE_4M.secboot.fd", "OVMF_CODE.secboot.fd", "OVMF_VARS.secboot.fd"],
    );
    let fw = UefiFirmware::discover(root.path(), HostArch::X86_64, true).unwrap();
    assert_eq!(fw.code, path_of(root.path(), "OVMF", "OVMF_CODE.secboot.fd"));
    assert!(!fw.is_4mb());
}

#[test]
fn test_insecure_falls_back_to_plain_pair() {
    let root = TempDir::new().unwrap();
    install(root.path(), "OVMF", &["OVMF_CODE.fd", "OVMF_VARS.fd"]);
    let fw = UefiFirmware::discover(root.path(), HostArch::X86_64, false).unwrap();
    assert_eq!(fw.code, path_of(root.path(), "OVMF", "OVMF_CODE.fd"));
    assert_eq!(fw.vars, path_of(root.path(), "OVMF", "OVMF_VARS.fd"));
    assert!(!fw.is_secure_boot());
}

#[test]
fn test_aarch64_skips_x86_only_layouts() {
    let root = TempDir::new().unwrap();
    install(
        root.path(),
        "AAVMF",
        &[
            "AAVMF_CODE.secboot.fd",
            "AAVMF_VARS.secboot.fd",
            "AAVMF_CODE.ms.fd",
            "AAVMF_VARS.ms.fd",
        ],
    );
    let fw = UefiFirmware::discover(root.path(), HostArch::Aarch64, true).unwrap();
    assert_eq!(fw.code, path_of(root.path(), "AAVMF", "AAVMF_CODE.ms.fd"));
    assert_eq!(fw.vars, path_of(root.path(), "AAVMF", "AAVMF_VARS.ms.fd"));
}

#[test]
fn test_nothing_installed() {
    let root = TempDir::new().unwrap();
    let err = UefiFirmware::discover(root.path(), HostArch::Aarch64, false).unwrap_err();
    assert_eq!(
        err,
        FirmwareError::NotFound {
            prefix: "AA",
            base: root.path().join("AAVMF"),
        }
    );
    assert!(err.to_string().starts_with("AAVMF code and vars missing"));
}

#[test]
fn test_exists_lists_every_missing_image() {
    let root = TempDir::new().unwrap();
    install(root.path(), "OVMF", &["OVMF_CODE.fd"]);
    let code = path_of(root.path(), "OVMF", "OVMF_CODE.fd");
    let vars = path_of(root.path(), "OVMF", "OVMF_VARS.fd");

    let fw = UefiFirmware::new(code, vars.clone());
    assert_eq!(
        fw.exists(),
        Err(FirmwareError::MissingFiles {
            missing: vec![PathBuf::from(vars)],
        })
    );
}
