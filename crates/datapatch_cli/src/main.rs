use std::fs;
use std::io;
use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use datapatch_core::batch::{BatchMode, parse_batch};
use datapatch_core::delta::{DeltaLine, delta};
use datapatch_core::patch_api::{Patcher, RunOptions, RunOutcome};
use datapatch_render::{
    JsonStyle, TextRenderOptions, TextStyle, render_delta_text, render_json_report,
    render_text_report_with_options,
};
use serde_json::Value as JsonValue;
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, ValueEnum)]
enum ModeArg {
    #[default]
    Auto,
    Scoped,
    Grouped,
    Mass,
}

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(value_name = "EDITS.json")]
    edits: PathBuf,
    #[arg(long, value_name = "PATH", env = "DATAPATCH_DATASET", default_value = "data.js")]
    dataset: PathBuf,
    #[arg(long, value_enum, default_value_t = ModeArg::Auto)]
    mode: ModeArg,
    #[arg(long = "dry-run")]
    dry_run: bool,
    #[arg(long)]
    json: bool,
    #[arg(long = "show-delta")]
    show_delta: bool,
    #[arg(long = "clear-backup", conflicts_with = "dry_run")]
    clear_backup: bool,
}

fn main() {
    let cli = Cli::try_parse().unwrap_or_else(|e| {
        if !e.use_stderr() {
            e.exit();
        }
        let _ = e.print();
        process::exit(1);
    });
    init_tracing();

    let text = fs::read_to_string(&cli.edits).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {e}", cli.edits.display());
        process::exit(1);
    });
    let batch = parse_batch(&text, to_batch_mode(cli.mode)).unwrap_or_else(|e| {
        eprintln!("Error parsing edit batch: {}", cli.edits.display());
        eprintln!("  {}", e.message);
        process::exit(1);
    });
    tracing::debug!(edits = batch.len(), shape = ?batch.shape, "edit batch parsed");

    if !cli.dataset.is_file() {
        eprintln!("Error: dataset {} not found", cli.dataset.display());
        process::exit(1);
    }

    let options = RunOptions {
        dry_run: cli.dry_run,
        clear_backup: cli.clear_backup,
    };
    let outcome = Patcher::new()
        .run(&cli.dataset, &batch.edits, options)
        .unwrap_or_else(|e| {
            eprintln!("Error patching {}: {e}", cli.dataset.display());
            process::exit(1);
        });

    let delta_lines = if cli.show_delta {
        backup_delta(&outcome).unwrap_or_else(|e| {
            eprintln!("Error reading backup for delta: {e}");
            process::exit(1);
        })
    } else {
        None
    };

    if cli.json {
        let mut report = render_json_report(&outcome, JsonStyle::CanonicalV1);
        if let (Some(lines), JsonValue::Object(map)) = (&delta_lines, &mut report) {
            map.insert(
                "delta".to_string(),
                serde_json::to_value(lines).unwrap_or(JsonValue::Null),
            );
        }
        print_json(&report);
    } else {
        let options = TextRenderOptions {
            show_diff: cli.show_delta && delta_lines.is_none(),
        };
        print!(
            "{}",
            render_text_report_with_options(&outcome, TextStyle::Plain, options)
        );
        if let Some(lines) = &delta_lines {
            println!();
            print!("{}", render_delta_text(lines));
        }
    }

    if let Err(e) = outcome.ensure_written() {
        eprintln!("Error: {}", e.message);
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn to_batch_mode(mode: ModeArg) -> BatchMode {
    match mode {
        ModeArg::Auto => BatchMode::Auto,
        ModeArg::Scoped => BatchMode::Scoped,
        ModeArg::Grouped => BatchMode::Grouped,
        ModeArg::Mass => BatchMode::Mass,
    }
}

/// Line delta between the backup and the dataset, when a backup is on disk.
fn backup_delta(outcome: &RunOutcome) -> io::Result<Option<Vec<DeltaLine>>> {
    let Some(backup) = &outcome.backup_path else {
        return Ok(None);
    };
    let before = fs::read_to_string(backup)?;
    let after = fs::read_to_string(&outcome.dataset_path)?;
    Ok(Some(delta(&before, &after)))
}

fn print_json(value: &JsonValue) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => {
            eprintln!("Error serializing JSON: {e}");
            process::exit(1);
        }
    }
}
