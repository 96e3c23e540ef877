use std::fmt::Write as _;

use clap::ValueEnum;
use colored::Colorize;

use crate::error::Result;
use crate::model::MigrationRun;
use crate::report::{ParentStatus, Report};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Pretty,
}

pub fn print_report(report: &Report, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(report)?),
        Format::Pretty => print!("{}", render_report(report)),
    }
    Ok(())
}

/// Human-readable breakdown, one block per parent in processing order.
pub fn render_report(report: &Report) -> String {
    let mut out = String::new();

    if report.already_migrated {
        let _ = writeln!(
            out,
            "{} migration already applied; nothing to do",
            report.migration.bold()
        );
        return out;
    }

    let _ = writeln!(out, "{} migration", report.migration.bold());
    for parent in &report.parents {
        let state = match &parent.status {
            ParentStatus::Applied if parent.failed.is_empty() => " ok ".green().to_string(),
            ParentStatus::Applied => "warn".yellow().to_string(),
            ParentStatus::Skipped { .. } => "skip".dimmed().to_string(),
            ParentStatus::Failed { .. } => " ERR".red().bold().to_string(),
        };
        let _ = writeln!(out, "  {}  {}", state, parent.parent_name);

        match &parent.status {
            ParentStatus::Skipped { existing } => {
                let _ = writeln!(out, "        already has {existing} children");
            }
            ParentStatus::Failed { reason } => {
                let _ = writeln!(out, "        {reason}");
            }
            ParentStatus::Applied => {
                if !parent.created.is_empty() {
                    let _ = writeln!(out, "        created: {}", parent.created.join(", "));
                }
                if !parent.skipped.is_empty() {
                    let _ = writeln!(out, "        existing: {}", parent.skipped.join(", "));
                }
                for failure in &parent.failed {
                    let _ = writeln!(out, "        failed: {} ({})", failure.name, failure.reason);
                }
                if parent.links_created > 0 {
                    let _ = writeln!(out, "        card links: {}", parent.links_created);
                }
                if !parent.unmatched.is_empty() {
                    let _ = writeln!(out, "        unmatched: {}", parent.unmatched.join(", "));
                }
            }
        }
    }

    let totals = &report.totals;
    let _ = writeln!(
        out,
        "parents={} created={} reused={} failed={} skipped_parents={} failed_parents={}",
        totals.parents,
        totals.created,
        totals.reused,
        totals.failed,
        totals.skipped_parents,
        totals.failed_parents
    );
    if totals.links_created > 0 || totals.unmatched > 0 {
        let _ = writeln!(
            out,
            "links_created={} unmatched={}",
            totals.links_created, totals.unmatched
        );
    }
    out
}

pub fn print_runs(runs: &[MigrationRun], format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(runs)?),
        Format::Pretty => {
            if runs.is_empty() {
                println!("no migrations recorded");
            }
            for run in runs {
                let state = if run.is_clean() {
                    " ok ".green()
                } else {
                    "warn".yellow()
                };
                println!(
                    "  {state}  {:12} {}  created={} reused={} failed={} skipped_parents={} failed_parents={}",
                    run.name,
                    run.applied_at.to_rfc3339(),
                    run.created,
                    run.reused,
                    run.failed,
                    run.skipped_parents,
                    run.failed_parents
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{ParentOutcome, summarize};

    #[test]
    fn pretty_report_lists_parents_and_totals() {
        colored::control::set_override(false);

        let mut t1 = ParentOutcome::new("a", "T1");
        t1.created = vec!["Planning".into(), "Launch".into()];
        let mut t2 = ParentOutcome::new("b", "T2");
        t2.status = ParentStatus::Skipped { existing: 1 };

        let text = render_report(&summarize("milestones", vec![t1, t2]));

        assert!(text.contains("T1"));
        assert!(text.contains("created: Planning, Launch"));
        assert!(text.contains("already has 1 children"));
        assert!(text.contains("created=2"));
        assert!(text.contains("skipped_parents=1"));
        assert!(!text.contains("links_created"));
    }

    #[test]
    fn pretty_report_for_early_exit_is_one_line() {
        colored::control::set_override(false);
        let text = render_report(&Report::already_migrated("labels"));
        assert_eq!(text, "labels migration already applied; nothing to do\n");
    }
}
