use crate::catalog;
use crate::error::Result;
use crate::record::SwitchRecord;
use crate::store::{CurrentSolution, StateStore};
use serde::Serialize;

/// Whether a kernel parameter of the active solution is on the running
/// kernel's command line.
#[derive(Debug, Clone, Serialize)]
pub struct KernelParamStatus {
    pub param: String,
    pub in_cmdline: bool,
}

/// Full status report.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// The in-flight record, or the most recently finished one.
    pub record: Option<SwitchRecord>,
    pub in_flight: bool,
    pub current: Option<CurrentSolution>,
    pub kernel_params: Vec<KernelParamStatus>,
}

impl StatusReport {
    /// Parameters the active solution needs but the running kernel lacks.
    /// Non-zero right after a switch until the reboot.
    pub fn drifted_count(&self) -> usize {
        self.kernel_params.iter().filter(|k| !k.in_cmdline).count()
    }
}

/// The in-flight record if there is one, otherwise the last archived
/// record, otherwise None.
pub fn current_status(store: &StateStore) -> Result<Option<SwitchRecord>> {
    match store.load_record()? {
        Some(record) => Ok(Some(record)),
        None => store.last_archived(),
    }
}

fn check_kernel_params(current: Option<&CurrentSolution>, cmdline: &str) -> Vec<KernelParamStatus> {
    let Some(solution) = current.and_then(|c| catalog::find(&c.solution_id)) else {
        return Vec::new();
    };
    solution
        .kernel_params
        .iter()
        .map(|param| KernelParamStatus {
            param: param.to_string(),
            in_cmdline: cmdline.split_whitespace().any(|p| p == *param),
        })
        .collect()
}

/// Build a status report against the live kernel command line.
pub fn check(store: &StateStore) -> Result<StatusReport> {
    let cmdline = std::fs::read_to_string("/proc/cmdline").unwrap_or_default();
    report(store, &cmdline)
}

fn report(store: &StateStore, cmdline: &str) -> Result<StatusReport> {
    let in_flight = store.load_record()?.is_some();
    let current = store.current_solution()?;
    Ok(StatusReport {
        record: current_status(store)?,
        in_flight,
        kernel_params: check_kernel_params(current.as_ref(), cmdline),
        current,
    })
}
