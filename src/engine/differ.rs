//! Property report display

use colored::Colorize;
use declarative::{Decision, PropertyReport, PropertyState};

use crate::ui;

/// Headline for one property report
///
/// `committed` selects past tense ("changes made") over the inspect wording.
pub fn headline(report: &PropertyReport, committed: bool) -> String {
    match (report.state, committed) {
        (PropertyState::NoChanges, _) => format!("{}: in sync", report.property),
        (PropertyState::RunNoChanges, _) => {
            format!("{}: audit reported no changes", report.property)
        }
        (PropertyState::ChangesRequired, false) => {
            format!("{}: changes required", report.property)
        }
        (PropertyState::ChangesRequired, true) => {
            format!("{}: still out of sync", report.property)
        }
        (PropertyState::Changed, _) => format!("{}: changes made", report.property),
    }
}

/// Print the Inspect result of one unit
pub fn display_inspection(unit: &str, decision: Decision, properties: &[PropertyReport]) {
    ui::section(&format!("Inspect {unit}"));
    for report in properties {
        print_report(report, false);
    }

    println!();
    match decision {
        Decision::NoChange => println!("  {} No changes needed", "✓".green()),
        Decision::ChangeNeeded => {
            let pending = properties.iter().filter(|p| !p.state.is_in_sync()).count();
            println!(
                "  {} {} of {} properties out of sync",
                "~".yellow(),
                pending.to_string().bold(),
                properties.len()
            );
        }
    }
}

/// Print the Commit result of one unit
pub fn display_commit(unit: &str, properties: &[PropertyReport]) {
    ui::section(&format!("Commit {unit}"));
    for report in properties {
        print_report(report, true);
    }
}

fn print_report(report: &PropertyReport, committed: bool) {
    let line = headline(report, committed);
    match report.state {
        PropertyState::NoChanges | PropertyState::RunNoChanges => {
            println!("  {} {}", "○".dimmed(), line.dimmed());
        }
        PropertyState::ChangesRequired => println!("  {} {}", "~".yellow(), line),
        PropertyState::Changed => println!("  {} {}", "✓".green(), line),
    }
    if let Some(detail) = &report.detail {
        ui::block(detail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headlines() {
        let exec = PropertyReport::new("exec", PropertyState::ChangesRequired);
        assert_eq!(headline(&exec, false), "exec: changes required");

        let made = PropertyReport::new("exec", PropertyState::Changed);
        assert_eq!(headline(&made, true), "exec: changes made");

        let files = PropertyReport::new("files", PropertyState::NoChanges);
        assert_eq!(headline(&files, false), "files: in sync");

        let audit = PropertyReport::new("exec", PropertyState::RunNoChanges);
        assert!(headline(&audit, false).contains("no changes"));
    }
}
