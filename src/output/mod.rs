use crate::catalog::{self, Solution};
use crate::detect::{HardwareInfo, HardwareProfile, Topology};
use crate::record::{SwitchRecord, SwitchStatus};
use crate::status::StatusReport;
use colored::Colorize;

const LABEL_W: usize = 18;

fn print_box(title: &str, rows: &[(&str, String)]) {
    let inner_w = rows
        .iter()
        .map(|(l, v)| l.len().max(LABEL_W) + 2 + v.len())
        .max()
        .unwrap_or(40);

    let fill = inner_w.saturating_sub(1 + title.len());
    println!("╭─ {} {}╮", title.bold(), "─".repeat(fill));

    for (label, value) in rows {
        let padded = format!("{:<w$}", label, w = LABEL_W);
        let pad = inner_w.saturating_sub(LABEL_W + 2 + value.len());
        println!("│ {}  {}{} │", padded.dimmed(), value, " ".repeat(pad));
    }

    println!("╰{}╯", "─".repeat(inner_w + 2));
}

pub fn print_hardware_summary(hw: &HardwareInfo) {
    let profile = hw.profile();
    let mut rows: Vec<(&str, String)> = vec![
        ("Vendor", profile.vendor.to_string()),
        (
            "Topology",
            match profile.topology {
                Topology::Single => "single GPU".to_string(),
                Topology::Hybrid => "hybrid graphics".to_string(),
            },
        ),
        (
            "Proprietary driver",
            if profile.proprietary_driver {
                "loaded".to_string()
            } else {
                "not loaded".to_string()
            },
        ),
    ];

    for device in &hw.devices {
        rows.push((
            if device.boot_vga { "Device (boot)" } else { "Device" },
            format!(
                "{} {} ({})",
                device.address,
                device.vendor,
                device.driver.as_deref().unwrap_or("no driver")
            ),
        ));
    }

    print_box("Hardware", &rows);
}

pub fn print_hardware_json(hw: &HardwareInfo) {
    let output = serde_json::json!({
        "profile": hw.profile(),
        "devices": hw.devices.iter().map(|d| serde_json::json!({
            "address": d.address,
            "vendor": d.vendor.to_string(),
            "vendor_id": format!("0x{:04x}", d.vendor_id),
            "device_id": d.device_id.map(|id| format!("0x{:04x}", id)),
            "driver": d.driver,
            "boot_vga": d.boot_vga,
        })).collect::<Vec<_>>(),
        "nvidia_module_loaded": hw.nvidia_module_loaded,
    });
    print_json(&output);
}

pub fn print_solutions(
    solutions: &[&'static Solution],
    active: &Solution,
    profile: &HardwareProfile,
) {
    let title = format!("Solutions ({})", solutions.len());
    let divider_w: usize = 64;
    let fill = divider_w.saturating_sub(2 + title.len());
    println!("── {} {}", title.bold(), "─".repeat(fill));

    let mut group = None;
    for solution in solutions {
        if group.is_some() && group != Some(solution.group) {
            println!();
        }
        group = Some(solution.group);

        let marker = if solution.id == active.id {
            " ACTIVE ".green().bold()
        } else if solution.is_default_fallback {
            "DEFAULT ".dimmed().bold()
        } else {
            "        ".normal()
        };
        println!(
            "  {} {} {}",
            marker,
            solution.name.bold(),
            format!("[{}]", solution.id).cyan()
        );
        println!("           {}", solution.description.dimmed());
        if let Some(note) = solution.risk_note {
            println!("           {}", note.yellow());
        }
        if let Some(note) = catalog::notice_for(solution, profile) {
            println!("           {}", note.yellow());
        }
    }

    println!("{}", "─".repeat(divider_w));
}

pub fn print_solutions_json(
    solutions: &[&'static Solution],
    active: &Solution,
    profile: &HardwareProfile,
) {
    let output = serde_json::json!({
        "profile": profile,
        "active": active.id,
        "solutions": solutions.iter().map(|s| serde_json::json!({
            "id": s.id,
            "group": s.group,
            "name": s.name,
            "description": s.description,
            "risk_note": s.risk_note,
            "notice": catalog::notice_for(s, profile),
            "requires_external_package": s.requires_external_package,
            "is_default_fallback": s.is_default_fallback,
        })).collect::<Vec<_>>(),
    });
    print_json(&output);
}

fn status_label(status: SwitchStatus) -> colored::ColoredString {
    let label = status.to_string();
    match status {
        SwitchStatus::Pending | SwitchStatus::Verifying => label.yellow().bold(),
        SwitchStatus::Committed => label.green().bold(),
        SwitchStatus::RolledBack => label.blue().bold(),
        SwitchStatus::Failed => label.red().bold(),
    }
}

fn solution_name(id: &str) -> String {
    catalog::find(id)
        .map(|s| s.name.to_string())
        .unwrap_or_else(|| id.to_string())
}

pub fn print_record(record: &SwitchRecord) {
    println!(
        "  {} {} → {}",
        status_label(record.status),
        solution_name(&record.previous_solution_id),
        solution_name(&record.target_solution_id).bold()
    );
    let mut detail = vec![
        record.requested_at.clone(),
        format!("{:?}", record.kind).to_lowercase(),
    ];
    if let Some(reason) = &record.reason {
        detail.push(reason.clone());
    }
    println!("       {}", detail.join("  ·  ").dimmed());
}

pub fn print_status(report: &StatusReport) {
    let mut rows: Vec<(&str, String)> = Vec::new();
    match &report.current {
        Some(current) => {
            rows.push(("Current solution", solution_name(&current.solution_id)));
            rows.push(("Since", current.since.clone()));
        }
        None => rows.push(("Current solution", "default (never switched)".to_string())),
    }
    for param in &report.kernel_params {
        rows.push((
            "Kernel param",
            format!(
                "{} {}",
                param.param,
                if param.in_cmdline { "(active)" } else { "(after reboot)" }
            ),
        ));
    }
    print_box("Status", &rows);

    match &report.record {
        Some(record) if report.in_flight => {
            println!("  {}", "Switch in progress:".yellow().bold());
            print_record(record);
        }
        Some(record) => {
            println!("  {}", "Last switch:".bold());
            print_record(record);
        }
        None => println!("  {}", "No switch has been made yet.".dimmed()),
    }
}

pub fn print_status_json(report: &StatusReport) {
    print_json(report);
}

pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("{} failed to serialize output: {}", "Error:".red(), e),
    }
}
