use std::fmt::Write as _;

use datapatch_core::delta::{DeltaKind, DeltaLine, changed_lines};
use datapatch_core::patch_api::{EditIssue, EditResult, Report, RunOutcome, RunState};
use datapatch_core::value::EditValue;
use serde_json::{Map as JsonMap, Value as JsonValue};

const LABEL_WIDTH: usize = 20;
const TAG_WIDTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonStyle {
    #[default]
    CanonicalV1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextStyle {
    #[default]
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextRenderOptions {
    /// Also list every value rewrite as a `-`/`+` pair.
    pub show_diff: bool,
}

pub fn render_json_report(outcome: &RunOutcome, style: JsonStyle) -> JsonValue {
    match style {
        JsonStyle::CanonicalV1 => JsonValue::Object(outcome_json(outcome)),
    }
}

pub fn render_text_report(outcome: &RunOutcome, style: TextStyle) -> String {
    render_text_report_with_options(outcome, style, TextRenderOptions::default())
}

pub fn render_text_report_with_options(
    outcome: &RunOutcome,
    style: TextStyle,
    options: TextRenderOptions,
) -> String {
    match style {
        TextStyle::Plain => render_plain_report(outcome, options),
    }
}

pub fn render_delta_text(lines: &[DeltaLine]) -> String {
    let mut out = String::new();
    if lines.is_empty() {
        writeln!(&mut out, "No changes between backup and dataset.")
            .expect("writing to String cannot fail");
        return out;
    }

    for line in lines {
        let marker = match line.kind {
            DeltaKind::Removed => '-',
            DeltaKind::Added => '+',
        };
        writeln!(&mut out, "{marker} {:>5}: {}", line.line, line.text)
            .expect("writing to String cannot fail");
    }
    writeln!(&mut out, "{} line(s) changed", changed_lines(lines))
        .expect("writing to String cannot fail");
    out
}

pub fn state_name(state: RunState) -> &'static str {
    match state {
        RunState::Idle => "idle",
        RunState::BackedUp => "backed_up",
        RunState::Edited => "edited",
        RunState::Verified => "verified",
        RunState::Written => "written",
        RunState::VerifyFailed => "verify_failed",
        RunState::RolledBack => "rolled_back",
    }
}

fn outcome_json(outcome: &RunOutcome) -> JsonMap<String, JsonValue> {
    let report = &outcome.report;
    let mut out = JsonMap::new();

    out.insert(
        "dataset".to_string(),
        JsonValue::String(outcome.dataset_path.display().to_string()),
    );
    out.insert(
        "state".to_string(),
        JsonValue::String(state_name(outcome.state).to_string()),
    );
    out.insert("succeeded".to_string(), JsonValue::Bool(outcome.succeeded()));
    out.insert(
        "backup".to_string(),
        match &outcome.backup_path {
            Some(p) => JsonValue::String(p.display().to_string()),
            None => JsonValue::Null,
        },
    );
    out.insert("requested".to_string(), JsonValue::from(report.requested));
    out.insert("matched".to_string(), JsonValue::from(report.matched));
    out.insert("unmatched".to_string(), JsonValue::from(report.unmatched));
    out.insert(
        "sites_changed".to_string(),
        JsonValue::from(report.sites_changed),
    );
    out.insert("warnings".to_string(), JsonValue::from(report.warnings));
    out.insert(
        "elapsed_ms".to_string(),
        JsonValue::from(elapsed_ms(outcome)),
    );
    out.insert(
        "edits_per_second".to_string(),
        match outcome.throughput() {
            Some(rate) => JsonValue::from(rate),
            None => JsonValue::Null,
        },
    );
    out.insert("edits".to_string(), edits_to_json(&report.results));
    out.insert("diff".to_string(), diff_to_json(report));

    out
}

fn edits_to_json(results: &[EditResult]) -> JsonValue {
    JsonValue::Array(results.iter().map(edit_to_json).collect())
}

fn edit_to_json(r: &EditResult) -> JsonValue {
    let mut m = JsonMap::new();
    m.insert("label".to_string(), JsonValue::String(r.label()));
    m.insert("category".to_string(), optional_text(r.scope.category()));
    m.insert("record".to_string(), optional_text(r.scope.record_key()));
    m.insert("property".to_string(), JsonValue::String(r.property.clone()));
    m.insert("value".to_string(), value_to_json(&r.value));
    m.insert("matched".to_string(), JsonValue::Bool(r.matched));
    m.insert("occurrences".to_string(), JsonValue::from(r.occurrences));
    m.insert("rewritten".to_string(), JsonValue::from(r.rewritten));
    m.insert("previous".to_string(), optional_text(r.previous.as_deref()));
    m.insert("written".to_string(), optional_text(r.written.as_deref()));
    m.insert(
        "issues".to_string(),
        JsonValue::Array(r.issues.iter().map(issue_to_json).collect()),
    );
    JsonValue::Object(m)
}

fn issue_to_json(issue: &EditIssue) -> JsonValue {
    let mut m = JsonMap::new();
    m.insert(
        "kind".to_string(),
        JsonValue::String(issue_kind(issue).to_string()),
    );
    m.insert("warning".to_string(), JsonValue::Bool(issue.is_warning()));
    m.insert("message".to_string(), JsonValue::String(issue.to_string()));
    JsonValue::Object(m)
}

fn diff_to_json(report: &Report) -> JsonValue {
    JsonValue::Array(
        report
            .diff
            .iter()
            .map(|d| {
                let mut m = JsonMap::new();
                m.insert("label".to_string(), JsonValue::String(d.label.clone()));
                m.insert("removed".to_string(), optional_text(d.removed.as_deref()));
                m.insert("added".to_string(), JsonValue::String(d.added.clone()));
                JsonValue::Object(m)
            })
            .collect(),
    )
}

fn value_to_json(value: &EditValue) -> JsonValue {
    match value {
        EditValue::Number(n) => JsonValue::Number(n.clone()),
        EditValue::Text(s) => JsonValue::String(s.clone()),
    }
}

fn optional_text(value: Option<&str>) -> JsonValue {
    match value {
        Some(s) => JsonValue::String(s.to_string()),
        None => JsonValue::Null,
    }
}

fn issue_kind(issue: &EditIssue) -> &'static str {
    match issue {
        EditIssue::UnmatchedEdit => "unmatched_edit",
        EditIssue::DuplicateRecord { .. } => "duplicate_record",
        EditIssue::AmbiguousMatch { .. } => "ambiguous_match",
        EditIssue::NonPrimitiveTarget { .. } => "non_primitive_target",
        EditIssue::TypeMismatch { .. } => "type_mismatch",
    }
}

fn render_plain_report(outcome: &RunOutcome, options: TextRenderOptions) -> String {
    let report = &outcome.report;
    let mut out = String::new();

    let verb = if outcome.state == RunState::Verified {
        "Dry run on"
    } else {
        "Patched"
    };
    writeln!(
        &mut out,
        "{verb} {} ({} edit(s))",
        outcome.dataset_path.display(),
        report.requested
    )
    .expect("writing to String cannot fail");

    for r in &report.results {
        write_edit_line(&mut out, r);
    }

    if options.show_diff && !report.diff.is_empty() {
        writeln!(&mut out).expect("writing to String cannot fail");
        writeln!(&mut out, "Diff").expect("writing to String cannot fail");
        for d in &report.diff {
            if let Some(removed) = &d.removed {
                writeln!(&mut out, "  - {}: {removed}", d.label)
                    .expect("writing to String cannot fail");
            }
            writeln!(&mut out, "  + {}: {}", d.label, d.added)
                .expect("writing to String cannot fail");
        }
    }

    writeln!(&mut out).expect("writing to String cannot fail");
    writeln!(&mut out, "Summary").expect("writing to String cannot fail");
    write_summary_row(&mut out, "Requests processed", &report.requested.to_string());
    write_summary_row(&mut out, "Matched", &report.matched.to_string());
    write_summary_row(&mut out, "Unmatched", &report.unmatched.to_string());
    write_summary_row(&mut out, "Sites changed", &report.sites_changed.to_string());
    write_summary_row(&mut out, "Warnings", &report.warnings.to_string());
    write_summary_row(&mut out, "Elapsed", &format!("{} ms", elapsed_ms(outcome)));
    write_summary_row(
        &mut out,
        "Throughput",
        &match outcome.throughput() {
            Some(rate) => format!("{rate:.1} edits/s"),
            None => "n/a".to_string(),
        },
    );
    if let Some(backup) = &outcome.backup_path {
        write_summary_row(&mut out, "Backup", &backup.display().to_string());
    }
    write_summary_row(&mut out, "State", state_name(outcome.state));

    if !outcome.succeeded() {
        writeln!(
            &mut out,
            "Verification failed; {} was restored from its backup.",
            outcome.dataset_path.display()
        )
        .expect("writing to String cannot fail");
    }

    out
}

fn write_edit_line(out: &mut String, r: &EditResult) {
    let label = r.label();
    if !r.matched {
        write_tagged(out, "miss", &format!("{label}: {}", EditIssue::UnmatchedEdit));
        return;
    }

    let tag = if r.has_warnings() { "warn" } else { "ok" };
    let change = match (&r.previous, &r.written) {
        (Some(prev), Some(new)) if r.rewritten > 1 => {
            format!("{prev} -> {new} at {} sites", r.rewritten)
        }
        (Some(prev), Some(new)) => format!("{prev} -> {new}"),
        _ => "left unchanged".to_string(),
    };
    write_tagged(out, tag, &format!("{label}: {change}"));

    for issue in r.issues.iter().filter(|i| i.is_warning()) {
        writeln!(out, "  {:<width$} {issue}", "", width = TAG_WIDTH)
            .expect("writing to String cannot fail");
    }
}

fn write_tagged(out: &mut String, tag: &str, line: &str) {
    writeln!(out, "  {:<width$} {line}", format!("[{tag}]"), width = TAG_WIDTH)
        .expect("writing to String cannot fail");
}

fn write_summary_row(out: &mut String, label: &str, value: &str) {
    writeln!(out, "  {:<width$}{value}", format!("{label}:"), width = LABEL_WIDTH)
        .expect("writing to String cannot fail");
}

fn elapsed_ms(outcome: &RunOutcome) -> u64 {
    u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX)
}
