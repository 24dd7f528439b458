use changekit::{BatchReport, ChangeStatus, UnitOutcome};
use colored::{ColoredString, Colorize};

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a step indicator
pub fn step(num: usize, total: usize, msg: &str) {
    println!("{} {}", format!("[{num}/{total}]").blue().bold(), msg);
}

/// Colored status label, e.g. `SUCCESS` in green
pub fn status_label(status: ChangeStatus) -> ColoredString {
    match status {
        ChangeStatus::Success => status.as_str().green(),
        ChangeStatus::Warn => status.as_str().yellow(),
        ChangeStatus::Failed => status.as_str().red(),
    }
}

/// One-line description of how a unit ended
pub fn describe_outcome(outcome: &UnitOutcome) -> String {
    match outcome {
        UnitOutcome::Skipped => "already applied, skipped".to_string(),
        UnitOutcome::LockTimeout { result } | UnitOutcome::Completed { result } => {
            result.message().to_string()
        }
    }
}

// ============================================================================
// Commands output
// ============================================================================

/// Print registered changes as an aligned two-column table
pub fn change_table(entries: &[(String, String)]) {
    header("Changes");
    let width = entries.iter().map(|(n, _)| n.len()).max().unwrap_or(0);
    for (name, description) in entries {
        println!("  {:<width$}  {}", name.cyan(), description.dimmed());
    }
    println!();
}

/// Print the end-of-batch summary with per-unit warnings and failures
pub fn batch_summary(report: &BatchReport) {
    let summary = report.summary();
    header(&format!("{} summary", capitalize(&report.operation.to_string())));
    println!("  {}", summary_line(report));

    for unit in report.warnings() {
        warn(&format!("{}: {}", unit.path, describe_outcome(&unit.outcome)));
    }
    for unit in report.failures() {
        error(&format!("{}: {}", unit.path, describe_outcome(&unit.outcome)));
    }

    if summary.is_success() {
        success(&format!("{} finished", capitalize(&report.operation.to_string())));
    }
}

/// Plain counts, e.g. `3 succeeded, 1 failed, 0 warned, 2 skipped`
pub fn summary_line(report: &BatchReport) -> String {
    let s = report.summary();
    format!(
        "{} succeeded, {} failed, {} warned, {} skipped",
        s.succeeded, s.failed, s.warned, s.skipped
    )
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ============================================================================
// Tests
// ============================================================================
