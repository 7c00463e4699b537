use super::GpuVendor;
use crate::sysfs::SysfsRoot;
use serde::Serialize;

const PCI_DEVICES: &str = "sys/bus/pci/devices";

/// PCI base class for display controllers (VGA, XGA, 3D, other).
const DISPLAY_CLASS: u32 = 0x03;

/// A PCI display controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayDevice {
    pub address: String,
    pub vendor: GpuVendor,
    pub vendor_id: u32,
    pub device_id: Option<u32>,
    pub driver: Option<String>,
    /// Firmware used this device for the boot console.
    pub boot_vga: bool,
}

/// Enumerate display-class PCI devices. Unreadable entries are skipped.
pub fn display_devices(sysfs: &SysfsRoot) -> Vec<DisplayDevice> {
    let Ok(entries) = sysfs.list_dir(PCI_DEVICES) else {
        return Vec::new();
    };

    let mut devices = Vec::new();
    for addr in entries {
        let base = format!("{}/{}", PCI_DEVICES, addr);

        let Ok(class) = sysfs.read_hex(format!("{}/class", base)) else {
            continue;
        };
        if class >> 16 != DISPLAY_CLASS {
            continue;
        }

        let Ok(vendor_id) = sysfs.read_hex(format!("{}/vendor", base)) else {
            tracing::debug!(address = %addr, "display device without readable vendor id");
            continue;
        };

        let boot_vga = sysfs
            .read_optional(format!("{}/boot_vga", base))
            .unwrap_or(None)
            .is_some_and(|v| v == "1");

        devices.push(DisplayDevice {
            vendor: GpuVendor::from_pci_id(vendor_id),
            vendor_id,
            device_id: sysfs.read_hex(format!("{}/device", base)).ok(),
            driver: sysfs.link_name(format!("{}/driver", base)),
            boot_vga,
            address: addr,
        });
    }

    devices
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn add_device(root: &Path, addr: &str, class: &str, vendor: &str) {
        let dev = root.join(PCI_DEVICES).join(addr);
        fs::create_dir_all(&dev).unwrap();
        fs::write(dev.join("class"), format!("{}\n", class)).unwrap();
        fs::write(dev.join("vendor"), format!("{}\n", vendor)).unwrap();
        fs::write(dev.join("device"), "0x1f91\n").unwrap();
    }

    #[test]
    fn test_only_display_class_devices_are_returned() {
        let tmp = tempfile::tempdir().unwrap();
        add_device(tmp.path(), "0000:00:02.0", "0x030000", "0x8086");
        add_device(tmp.path(), "0000:00:14.0", "0x0c0330", "0x8086");
        add_device(tmp.path(), "0000:01:00.0", "0x030200", "0x10de");

        let devices = display_devices(&SysfsRoot::new(tmp.path()));
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].vendor, GpuVendor::Intel);
        assert_eq!(devices[1].vendor, GpuVendor::Nvidia);
        assert_eq!(devices[1].device_id, Some(0x1f91));
    }

    #[test]
    fn test_boot_vga_flag() {
        let tmp = tempfile::tempdir().unwrap();
        add_device(tmp.path(), "0000:00:02.0", "0x030000", "0x8086");
        fs::write(
            tmp.path().join(PCI_DEVICES).join("0000:00:02.0/boot_vga"),
            "1\n",
        )
        .unwrap();

        let devices = display_devices(&SysfsRoot::new(tmp.path()));
        assert!(devices[0].boot_vga);
    }

    #[test]
    fn test_missing_pci_tree_yields_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(display_devices(&SysfsRoot::new(tmp.path())).is_empty());
    }
}
