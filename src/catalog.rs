//! The driver solutions offered per GPU vendor.
//!
//! One declarative table; every entry is a plain record. A hardware profile
//! selects one or two groups from it, in the order they appear here: vendor
//! default first, then increasing risk.

use crate::detect::{GpuVendor, HardwareProfile, Topology};
use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionGroup {
    Amd,
    Nvidia,
    Intel,
    /// NVIDIA Optimus modes, offered on top of the NVIDIA group.
    Hybrid,
}

impl fmt::Display for SolutionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolutionGroup::Amd => write!(f, "AMD"),
            SolutionGroup::Nvidia => write!(f, "NVIDIA"),
            SolutionGroup::Intel => write!(f, "Intel"),
            SolutionGroup::Hybrid => write!(f, "Hybrid graphics"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Solution {
    /// Stable key, persisted in switch records.
    pub id: &'static str,
    pub group: SolutionGroup,
    pub vendor: GpuVendor,
    pub name: &'static str,
    pub description: &'static str,
    pub risk_note: Option<&'static str>,
    pub requires_external_package: bool,
    pub is_default_fallback: bool,
    /// Kernel modules to blacklist in modprobe.d while this solution is active.
    pub blacklist_modules: &'static [&'static str],
    /// Kernel command line parameters this solution needs.
    pub kernel_params: &'static [&'static str],
}

const NVIDIA_MISSING_NOTE: &str = "NVIDIA driver is not detected in the current environment, and NVIDIA card will not work properly.";

static CATALOG: &[Solution] = &[
    Solution {
        id: "amd",
        group: SolutionGroup::Amd,
        vendor: GpuVendor::Amd,
        name: "AMD Default Driver",
        description: "Use AMD card driver. For special needs. Auto determine the acceleration way without external configuration.",
        risk_note: None,
        requires_external_package: false,
        is_default_fallback: true,
        blacklist_modules: &[],
        kernel_params: &[],
    },
    Solution {
        id: "nvidia-default",
        group: SolutionGroup::Nvidia,
        vendor: GpuVendor::Nvidia,
        name: "NVIDIA Default Driver",
        description: "Use default driver",
        risk_note: None,
        requires_external_package: false,
        is_default_fallback: true,
        blacklist_modules: &[],
        kernel_params: &[],
    },
    Solution {
        id: "nvidia-open",
        group: SolutionGroup::Nvidia,
        vendor: GpuVendor::Nvidia,
        name: "NVIDIA Open Source Driver",
        description: "Use open source driver",
        risk_note: Some("Poor performance, unstable in some graphics cards."),
        requires_external_package: true,
        is_default_fallback: false,
        blacklist_modules: &["nvidia", "nvidia_drm", "nvidia_modeset"],
        kernel_params: &[],
    },
    Solution {
        id: "nvidia-closed",
        group: SolutionGroup::Nvidia,
        vendor: GpuVendor::Nvidia,
        name: "NVIDIA Closed Source Driver",
        description: "Use closed source driver",
        risk_note: Some(
            "Only adaptive to parts of distributions and graphics cards, may cause black screen.",
        ),
        requires_external_package: true,
        is_default_fallback: false,
        blacklist_modules: &["nouveau"],
        kernel_params: &["nvidia-drm.modeset=1"],
    },
    Solution {
        id: "intel-default",
        group: SolutionGroup::Intel,
        vendor: GpuVendor::Intel,
        name: "Intel Default Driver",
        description: "Use Intel default driver",
        risk_note: Some("Poor compatibility for parts of old graphics cards."),
        requires_external_package: false,
        is_default_fallback: true,
        blacklist_modules: &[],
        kernel_params: &[],
    },
    Solution {
        id: "intel-compatible",
        group: SolutionGroup::Intel,
        vendor: GpuVendor::Intel,
        name: "Intel Compatible Mode",
        description: "Use Intel compatible mode. Best compatibility for all Intel graphics cards to accelerate, but performance is relatively weak.",
        risk_note: None,
        requires_external_package: true,
        is_default_fallback: false,
        blacklist_modules: &[],
        kernel_params: &[],
    },
    Solution {
        id: "intel-acceleration",
        group: SolutionGroup::Intel,
        vendor: GpuVendor::Intel,
        name: "Intel Acceleration Mode",
        description: "Use Intel acceleration mode",
        risk_note: Some(
            "Speed up the graphics card with better performance, but unstable in some cards with screen flashing.",
        ),
        requires_external_package: true,
        is_default_fallback: false,
        blacklist_modules: &[],
        kernel_params: &[],
    },
    Solution {
        id: "bumblebee",
        group: SolutionGroup::Hybrid,
        vendor: GpuVendor::Nvidia,
        name: "Bumblebee Solution",
        description: "Use Bumblebee Solution. Save power to reduce power consumption.",
        risk_note: None,
        requires_external_package: true,
        is_default_fallback: true,
        blacklist_modules: &["nouveau"],
        kernel_params: &[],
    },
    Solution {
        id: "prime",
        group: SolutionGroup::Hybrid,
        vendor: GpuVendor::Nvidia,
        name: "PRIME Solution",
        description: "Use NV-PRIME Solution",
        risk_note: Some(
            "For laptops with hybrid graphics, having best performance but must work with closed-source driver.",
        ),
        requires_external_package: true,
        is_default_fallback: false,
        blacklist_modules: &["nouveau"],
        kernel_params: &["nvidia-drm.modeset=1"],
    },
];

/// Every solution in the catalog, in table order.
pub fn all() -> &'static [Solution] {
    CATALOG
}

/// Look up a solution by id regardless of hardware.
pub fn find(id: &str) -> Option<&'static Solution> {
    CATALOG.iter().find(|s| s.id == id)
}

fn groups_for(profile: &HardwareProfile) -> &'static [SolutionGroup] {
    match (profile.vendor, profile.topology) {
        (GpuVendor::Amd, _) => &[SolutionGroup::Amd],
        (GpuVendor::Nvidia, Topology::Single) => &[SolutionGroup::Nvidia],
        (GpuVendor::Nvidia, Topology::Hybrid) => &[SolutionGroup::Nvidia, SolutionGroup::Hybrid],
        (GpuVendor::Intel, _) => &[SolutionGroup::Intel],
        (GpuVendor::Unknown, _) => &[],
    }
}

/// The ordered solutions valid for `profile`.
pub fn solutions_for(profile: &HardwareProfile) -> Result<Vec<&'static Solution>> {
    let solutions: Vec<&'static Solution> = groups_for(profile)
        .iter()
        .flat_map(|group| CATALOG.iter().filter(move |s| s.group == *group))
        .collect();

    if solutions.is_empty() {
        return Err(Error::UnsupportedHardware);
    }
    Ok(solutions)
}

/// The safest solution of the profile's primary group.
pub fn default_fallback(profile: &HardwareProfile) -> Result<&'static Solution> {
    solutions_for(profile)?
        .into_iter()
        .find(|s| s.is_default_fallback)
        .ok_or(Error::UnsupportedHardware)
}

/// Extra warning shown next to a solution on this machine, if any.
pub fn notice_for(solution: &Solution, profile: &HardwareProfile) -> Option<&'static str> {
    if solution.id == "nvidia-default" && !profile.proprietary_driver {
        return Some(NVIDIA_MISSING_NOTE);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn profile(vendor: GpuVendor, topology: Topology) -> HardwareProfile {
        HardwareProfile {
            vendor,
            topology,
            proprietary_driver: false,
        }
    }

    fn ids(solutions: &[&Solution]) -> Vec<&'static str> {
        solutions.iter().map(|s| s.id).collect()
    }

    #[test]
    fn test_nvidia_order() {
        let solutions = solutions_for(&profile(GpuVendor::Nvidia, Topology::Single)).unwrap();
        assert_eq!(
            ids(&solutions),
            vec!["nvidia-default", "nvidia-open", "nvidia-closed"]
        );
    }

    #[test]
    fn test_intel_order() {
        let solutions = solutions_for(&profile(GpuVendor::Intel, Topology::Single)).unwrap();
        assert_eq!(
            ids(&solutions),
            vec!["intel-default", "intel-compatible", "intel-acceleration"]
        );
    }

    #[test]
    fn test_hybrid_appends_optimus_group() {
        let solutions = solutions_for(&profile(GpuVendor::Nvidia, Topology::Hybrid)).unwrap();
        assert_eq!(
            ids(&solutions),
            vec![
                "nvidia-default",
                "nvidia-open",
                "nvidia-closed",
                "bumblebee",
                "prime"
            ]
        );
    }

    #[test]
    fn test_unknown_vendor_is_unsupported() {
        for topology in [Topology::Single, Topology::Hybrid] {
            assert!(matches!(
                solutions_for(&profile(GpuVendor::Unknown, topology)),
                Err(Error::UnsupportedHardware)
            ));
        }
    }

    #[test]
    fn test_exactly_one_default_fallback_per_group() {
        for vendor in [GpuVendor::Amd, GpuVendor::Nvidia, GpuVendor::Intel] {
            for topology in [Topology::Single, Topology::Hybrid] {
                for proprietary_driver in [false, true] {
                    let p = HardwareProfile {
                        vendor,
                        topology,
                        proprietary_driver,
                    };
                    let solutions = solutions_for(&p).unwrap();
                    assert!(!solutions.is_empty());

                    let mut defaults: HashMap<SolutionGroup, usize> = HashMap::new();
                    for s in &solutions {
                        defaults.entry(s.group).or_default();
                        if s.is_default_fallback {
                            *defaults.entry(s.group).or_default() += 1;
                        }
                    }
                    for (group, count) in defaults {
                        assert_eq!(count, 1, "{:?} {:?} group {}", vendor, topology, group);
                    }
                }
            }
        }
    }

    #[test]
    fn test_vendor_default_comes_first() {
        for vendor in [GpuVendor::Amd, GpuVendor::Nvidia, GpuVendor::Intel] {
            let p = profile(vendor, Topology::Hybrid);
            let solutions = solutions_for(&p).unwrap();
            assert!(solutions[0].is_default_fallback);
            assert_eq!(default_fallback(&p).unwrap().id, solutions[0].id);
        }
    }

    #[test]
    fn test_ids_are_unique() {
        let mut seen: Vec<&str> = all().iter().map(|s| s.id).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), all().len());
    }

    #[test]
    fn test_notice_only_without_proprietary_driver() {
        let default = find("nvidia-default").unwrap();
        let mut p = profile(GpuVendor::Nvidia, Topology::Single);
        assert!(notice_for(default, &p).is_some());
        p.proprietary_driver = true;
        assert!(notice_for(default, &p).is_none());
        assert!(notice_for(find("nvidia-closed").unwrap(), &p).is_none());
    }

    #[test]
    fn test_solutions_for_is_deterministic() {
        let p = profile(GpuVendor::Nvidia, Topology::Hybrid);
        assert_eq!(solutions_for(&p).unwrap(), solutions_for(&p).unwrap());
    }
}
