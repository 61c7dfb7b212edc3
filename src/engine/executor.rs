//! Cycle execution with terminal reporting and confirmation

use anyhow::Result;
use colored::Colorize;
use declarative::{
    AutoConfirm, ConfirmCallback, CycleSummary, Decision, Phase, PropertyReport, Reporter,
    SkipReason,
};
use indicatif::ProgressBar;

use crate::progress;
use crate::resource::{InspectionResult, ScriptDeployment};
use crate::ui;

use super::differ::{display_commit, display_inspection};

/// Options for one CLI-driven cycle
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Inspect and decide only
    pub dry_run: bool,
    /// Skip the confirmation prompt
    pub yes: bool,
    /// Print nothing but errors
    pub quiet: bool,
    /// Verbose logging is on; the spinner would fight with it
    pub verbose: bool,
}

/// Reporter that draws a spinner per phase and prints property reports
pub struct UiReporter {
    quiet: bool,
    spinner_visible: bool,
    spinner: Option<ProgressBar>,
}

impl UiReporter {
    pub fn new(quiet: bool, verbose: bool) -> Self {
        Self {
            quiet,
            spinner_visible: !quiet && !verbose,
            spinner: None,
        }
    }

    fn start(&mut self, msg: String) {
        self.stop();
        self.spinner = Some(progress::spinner(msg, self.spinner_visible));
    }

    fn stop(&mut self) {
        if let Some(pb) = self.spinner.take() {
            progress::finish_clear(&pb);
        }
    }
}

impl Drop for UiReporter {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Reporter for UiReporter {
    fn on_phase(&mut self, unit: &str, phase: Phase) {
        log::debug!("{unit}: {phase}");
        match phase {
            Phase::Inspecting => self.start(format!("Inspecting {unit} (audit run in sandbox)")),
            Phase::Committing => self.start(format!("Committing {unit}")),
            Phase::Skipped(reason) => {
                self.stop();
                if !self.quiet {
                    print_skip(reason);
                }
            }
            _ => self.stop(),
        }
    }

    fn on_inspected(&mut self, unit: &str, decision: Decision, properties: &[PropertyReport]) {
        self.stop();
        if !self.quiet {
            display_inspection(unit, decision, properties);
        }
    }

    fn on_committed(&mut self, unit: &str, properties: &[PropertyReport]) {
        self.stop();
        if !self.quiet {
            display_commit(unit, properties);
        }
    }
}

/// Confirmation through an interactive prompt
pub struct PromptConfirm;

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        use dialoguer::Confirm;

        println!();
        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?;

        Ok(confirmed)
    }
}

/// Run one cycle of `unit` with terminal output
pub fn execute(
    unit: &ScriptDeployment<'_>,
    opts: &ExecuteOptions,
) -> Result<CycleSummary<InspectionResult>> {
    let cycle = declarative::ExecuteOptions { dry_run: opts.dry_run };
    let mut reporter = UiReporter::new(opts.quiet, opts.verbose);

    let summary = if opts.yes {
        declarative::reconcile(unit, &cycle, &mut reporter, &mut AutoConfirm)?
    } else {
        declarative::reconcile(unit, &cycle, &mut reporter, &mut PromptConfirm)?
    };
    drop(reporter);

    if !opts.quiet {
        if let Some(copy) = &summary.inspection.debug_copy {
            println!();
            ui::info(&format!("Sandbox copy kept at {}", copy.display()));
        }
        print_summary(&summary);
    }

    Ok(summary)
}

fn print_skip(reason: SkipReason) {
    println!();
    match reason {
        SkipReason::InSync => {}
        SkipReason::DryRun => ui::info("Dry run - no changes made"),
        SkipReason::Declined => ui::warn("Aborted, no changes made"),
    }
}

fn print_summary(summary: &CycleSummary<InspectionResult>) {
    if !summary.is_committed() {
        return;
    }
    println!();
    println!(
        "  {} {} applied ({} properties changed)",
        "✓".green().bold(),
        summary.unit,
        summary.total_changes()
    );
}
