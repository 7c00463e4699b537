pub mod pci;

use crate::sysfs::SysfsRoot;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuVendor {
    Amd,
    Nvidia,
    Intel,
    Unknown,
}

impl GpuVendor {
    pub fn from_pci_id(id: u32) -> Self {
        match id {
            0x1002 => GpuVendor::Amd,
            0x10de => GpuVendor::Nvidia,
            0x8086 => GpuVendor::Intel,
            _ => GpuVendor::Unknown,
        }
    }

    /// Preference when picking the primary GPU: discrete vendors first.
    fn rank(self) -> u8 {
        match self {
            GpuVendor::Nvidia => 0,
            GpuVendor::Amd => 1,
            GpuVendor::Intel => 2,
            GpuVendor::Unknown => 3,
        }
    }
}

impl fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuVendor::Amd => write!(f, "AMD"),
            GpuVendor::Nvidia => write!(f, "NVIDIA"),
            GpuVendor::Intel => write!(f, "Intel"),
            GpuVendor::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    Single,
    /// Integrated plus discrete GPU from different vendors.
    Hybrid,
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::Single => write!(f, "single"),
            Topology::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// What the solution catalog needs to know about the machine.
/// Detected once per boot and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareProfile {
    pub vendor: GpuVendor,
    pub topology: Topology,
    pub proprietary_driver: bool,
}

/// Raw detection results, kept for display alongside the derived profile.
#[derive(Debug, Clone, Serialize)]
pub struct HardwareInfo {
    pub devices: Vec<pci::DisplayDevice>,
    pub nvidia_module_loaded: bool,
}

impl HardwareInfo {
    pub fn detect(sysfs: &SysfsRoot) -> Self {
        let devices = pci::display_devices(sysfs);
        let nvidia_module_loaded = sysfs.exists("sys/module/nvidia");
        tracing::debug!(
            devices = devices.len(),
            nvidia_module_loaded,
            "detected display hardware"
        );
        Self {
            devices,
            nvidia_module_loaded,
        }
    }

    pub fn profile(&self) -> HardwareProfile {
        let vendor = self
            .devices
            .iter()
            .map(|d| d.vendor)
            .min_by_key(|v| v.rank())
            .unwrap_or(GpuVendor::Unknown);

        let mut vendors: Vec<GpuVendor> = self
            .devices
            .iter()
            .map(|d| d.vendor)
            .filter(|v| *v != GpuVendor::Unknown)
            .collect();
        vendors.sort_by_key(|v| v.rank());
        vendors.dedup();

        let topology = if vendors.len() > 1 {
            Topology::Hybrid
        } else {
            Topology::Single
        };

        let proprietary_driver = self.nvidia_module_loaded
            || self
                .devices
                .iter()
                .any(|d| d.driver.as_deref() == Some("nvidia"));

        HardwareProfile {
            vendor,
            topology,
            proprietary_driver,
        }
    }
}
