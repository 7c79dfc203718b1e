use colored::Colorize;
use imghdr_core::{Field, InspectReport, PatchPlan, SignOutcome, SynthReport};
use std::path::Path;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn warn(msg: impl std::fmt::Display) {
    println!("{} {msg}", "Warning:".yellow().bold());
}

pub fn print_patch(path: &Path, plan: &PatchPlan) {
    if let SignOutcome::Failed(e) = &plan.sign {
        warn(format!("{e}; signature field will remain unchanged"));
    }

    println!("Patching binary '{}':", path.display());
    println!("  Data size: {} bytes", plan.header.payload_size);
    if plan.writes(Field::Entrypoint) {
        println!("  Entry point: 0x{:016x}", plan.header.entrypoint);
    }
    if let Some(sig) = plan.sign.signature() {
        println!("  Signature: {}... (64 bytes total)", sig.preview());
    }

    println!("  Total file size: {} bytes", plan.total_size);

    for cmd in &plan.commands {
        let line = match cmd.field {
            Field::PayloadSize => "Image size field updated",
            Field::Entrypoint => "Entry point field updated",
            Field::Signature => "Signature field updated in binary",
            _ => continue,
        };
        println!("  {}", line.green());
    }
}

pub fn print_synth(report: &SynthReport) {
    if let SignOutcome::Failed(e) = &report.sign {
        warn(format!("{e}; using zero signature"));
    }

    println!("Image header added successfully:");
    println!("  Input file: {}", report.input.display());
    println!("  Output file: {}", report.output.display());
    println!("  Data size: {} bytes", report.header.payload_size);
    println!("  Entry point: 0x{:016x}", report.header.entrypoint);
    println!("  Build ID: {}", report.header.build_id);
    match report.sign {
        SignOutcome::Signed(_) => println!("  Signature: Generated"),
        SignOutcome::Failed(_) => println!("  Signature: Zero (failed to generate)"),
        SignOutcome::NotRequested => {}
    }
    println!("  Total file size: {} bytes", report.total_size);
}

pub fn print_inspect(report: &InspectReport) {
    let s = report.summary();
    for w in &s.warnings {
        warn(w);
    }

    let rows = vec![
        Row {
            field: "Magic",
            value: s.magic,
        },
        Row {
            field: "Header Version",
            value: s.version.to_string(),
        },
        Row {
            field: "Data Size",
            value: format!("{} bytes", s.payload_size),
        },
        Row {
            field: "Entry Point",
            value: s.entrypoint,
        },
        Row {
            field: "Build ID",
            value: s.build_id,
        },
        Row {
            field: "Signature",
            value: s.signature,
        },
        Row {
            field: "Total File Size",
            value: format!("{} bytes", s.file_size),
        },
    ];

    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("=== Image Header Information ===");
    println!("File: {}", report.path.display());
    println!("{table}");
}
