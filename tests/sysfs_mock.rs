use gpuswitch::catalog::{self, SolutionGroup};
use gpuswitch::detect::{GpuVendor, HardwareInfo, Topology};
use gpuswitch::error::Error;
use gpuswitch::sysfs::SysfsRoot;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;
use tempfile::TempDir;

/// Add a PCI device to a mock sysfs tree, optionally bound to `driver`.
fn add_pci_device(
    root: &Path,
    addr: &str,
    class: &str,
    vendor: &str,
    device: &str,
    driver: Option<&str>,
    boot_vga: bool,
) {
    let dev = root.join("sys/bus/pci/devices").join(addr);
    fs::create_dir_all(&dev).unwrap();
    fs::write(dev.join("class"), format!("{}\n", class)).unwrap();
    fs::write(dev.join("vendor"), format!("{}\n", vendor)).unwrap();
    fs::write(dev.join("device"), format!("{}\n", device)).unwrap();
    fs::write(dev.join("boot_vga"), if boot_vga { "1\n" } else { "0\n" }).unwrap();

    if let Some(driver) = driver {
        let driver_dir = root.join("sys/bus/pci/drivers").join(driver);
        fs::create_dir_all(&driver_dir).unwrap();
        symlink(&driver_dir, dev.join("driver")).unwrap();
    }
}

/// Desktop with a single GeForce on nouveau, plus the usual chipset noise.
fn create_nvidia_desktop_fixture(root: &Path) {
    add_pci_device(root, "0000:00:00.0", "0x060000", "0x1022", "0x14d8", None, false);
    add_pci_device(
        root,
        "0000:00:14.0",
        "0x0c0330",
        "0x8086",
        "0x7ae0",
        Some("xhci_hcd"),
        false,
    );
    add_pci_device(
        root,
        "0000:01:00.0",
        "0x030000",
        "0x10de",
        "0x2684",
        Some("nouveau"),
        true,
    );
    // HDMI audio function of the same card
    add_pci_device(
        root,
        "0000:01:00.1",
        "0x040300",
        "0x10de",
        "0x22ba",
        Some("snd_hda_intel"),
        false,
    );
}

/// Optimus laptop: Intel iGPU drives the panel, GeForce is a 3D controller.
fn create_optimus_fixture(root: &Path, nvidia_driver: &str) {
    add_pci_device(
        root,
        "0000:00:02.0",
        "0x030000",
        "0x8086",
        "0xa7a0",
        Some("i915"),
        true,
    );
    add_pci_device(
        root,
        "0000:01:00.0",
        "0x030200",
        "0x10de",
        "0x28e0",
        Some(nvidia_driver),
        false,
    );
}

#[test]
fn test_nvidia_desktop_detection() {
    let tmp = TempDir::new().unwrap();
    create_nvidia_desktop_fixture(tmp.path());

    let hw = HardwareInfo::detect(&SysfsRoot::new(tmp.path()));
    assert_eq!(hw.devices.len(), 1);
    assert_eq!(hw.devices[0].address, "0000:01:00.0");
    assert_eq!(hw.devices[0].driver.as_deref(), Some("nouveau"));
    assert!(hw.devices[0].boot_vga);

    let profile = hw.profile();
    assert_eq!(profile.vendor, GpuVendor::Nvidia);
    assert_eq!(profile.topology, Topology::Single);
    assert!(!profile.proprietary_driver);
}

#[test]
fn test_nvidia_desktop_solutions() {
    let tmp = TempDir::new().unwrap();
    create_nvidia_desktop_fixture(tmp.path());
    let profile = HardwareInfo::detect(&SysfsRoot::new(tmp.path())).profile();

    let ids: Vec<_> = catalog::solutions_for(&profile)
        .unwrap()
        .iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, vec!["nvidia-default", "nvidia-open", "nvidia-closed"]);
    assert_eq!(catalog::default_fallback(&profile).unwrap().id, "nvidia-default");

    // nouveau is in use, so the default solution carries the missing-driver note
    let default = catalog::find("nvidia-default").unwrap();
    assert!(catalog::notice_for(default, &profile).is_some());
}

#[test]
fn test_loaded_nvidia_module_counts_as_proprietary() {
    let tmp = TempDir::new().unwrap();
    create_nvidia_desktop_fixture(tmp.path());
    fs::create_dir_all(tmp.path().join("sys/module/nvidia")).unwrap();

    let profile = HardwareInfo::detect(&SysfsRoot::new(tmp.path())).profile();
    assert!(profile.proprietary_driver);
    let default = catalog::find("nvidia-default").unwrap();
    assert!(catalog::notice_for(default, &profile).is_none());
}

#[test]
fn test_optimus_laptop_is_hybrid() {
    let tmp = TempDir::new().unwrap();
    create_optimus_fixture(tmp.path(), "nvidia");

    let hw = HardwareInfo::detect(&SysfsRoot::new(tmp.path()));
    assert_eq!(hw.devices.len(), 2);

    let profile = hw.profile();
    assert_eq!(profile.vendor, GpuVendor::Nvidia);
    assert_eq!(profile.topology, Topology::Hybrid);
    assert!(profile.proprietary_driver, "bound to nvidia");

    let solutions = catalog::solutions_for(&profile).unwrap();
    let groups: Vec<_> = solutions.iter().map(|s| s.group).collect();
    assert_eq!(
        groups,
        vec![
            SolutionGroup::Nvidia,
            SolutionGroup::Nvidia,
            SolutionGroup::Nvidia,
            SolutionGroup::Hybrid,
            SolutionGroup::Hybrid,
        ]
    );
    assert_eq!(catalog::default_fallback(&profile).unwrap().id, "nvidia-default");
}

#[test]
fn test_intel_only_machine() {
    let tmp = TempDir::new().unwrap();
    add_pci_device(
        tmp.path(),
        "0000:00:02.0",
        "0x030000",
        "0x8086",
        "0x46a6",
        Some("i915"),
        true,
    );

    let profile = HardwareInfo::detect(&SysfsRoot::new(tmp.path())).profile();
    assert_eq!(profile.vendor, GpuVendor::Intel);
    assert_eq!(profile.topology, Topology::Single);

    let ids: Vec<_> = catalog::solutions_for(&profile)
        .unwrap()
        .iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(
        ids,
        vec!["intel-default", "intel-compatible", "intel-acceleration"]
    );
}

#[test]
fn test_no_display_hardware_is_unsupported() {
    let tmp = TempDir::new().unwrap();
    add_pci_device(tmp.path(), "0000:00:00.0", "0x060000", "0x1022", "0x14d8", None, false);

    let profile = HardwareInfo::detect(&SysfsRoot::new(tmp.path())).profile();
    assert_eq!(profile.vendor, GpuVendor::Unknown);
    assert!(matches!(
        catalog::solutions_for(&profile),
        Err(Error::UnsupportedHardware)
    ));
}

#[test]
fn test_unknown_vendor_display_is_unsupported() {
    let tmp = TempDir::new().unwrap();
    // Matrox G200 on a server BMC
    add_pci_device(
        tmp.path(),
        "0000:03:00.0",
        "0x030000",
        "0x102b",
        "0x0536",
        Some("mgag200"),
        true,
    );

    let profile = HardwareInfo::detect(&SysfsRoot::new(tmp.path())).profile();
    assert_eq!(profile.vendor, GpuVendor::Unknown);
    assert!(catalog::default_fallback(&profile).is_err());
}
