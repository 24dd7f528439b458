//! Terminal progress for batch runs

use crate::ui;
use changekit::{BatchReport, Operation, ProgressCallback, UnitOutcome};

/// Prints one step line per unit and the summary at the end
#[derive(Debug, Default)]
pub struct TerminalProgress {
    quiet: bool,
}

impl TerminalProgress {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_batch_start(&mut self, operation: Operation, count: usize) {
        if !self.quiet {
            ui::header(&format!("Running {operation} on {count} change(s)"));
        }
    }

    fn on_unit_start(&mut self, index: usize, count: usize, path: &str) {
        if !self.quiet {
            ui::step(index, count, path);
        }
    }

    fn on_unit_complete(&mut self, _path: &str, outcome: &UnitOutcome) {
        if !self.quiet {
            println!(
                "      {} {}",
                ui::status_label(outcome.status()),
                ui::describe_outcome(outcome)
            );
        }
    }

    fn on_batch_complete(&mut self, report: &BatchReport) {
        if self.quiet {
            if !report.is_success() {
                for unit in report.failures() {
                    ui::error(&format!("{}: {}", unit.path, ui::describe_outcome(&unit.outcome)));
                }
            }
            return;
        }
        ui::batch_summary(report);
    }
}
