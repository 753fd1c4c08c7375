//! Interactive confirmation prompts
//!
//! Implements the engine's confirmation boundary on top of the terminal.
//! Deletion groups show up to a fixed sample of paths; the operator can
//! confirm one group, skip it, accept everything remaining, or abort the
//! phase.

use console::style;
use dialoguer::{theme::ColorfulTheme, Select};
use driftsync_engine::{ConfirmationProvider, DeletionGroup, GroupDecision, PreflightDecision};

const SAMPLE_LIMIT: usize = 10;

/// Prompts on the controlling terminal
#[derive(Debug, Default)]
pub struct ConsolePrompter;

impl ConfirmationProvider for ConsolePrompter {
    fn confirm_deletions(&mut self, group: &DeletionGroup) -> GroupDecision {
        println!(
            "\nDirectory: {}  ({} {} file(s))",
            style(&group.parent).cyan(),
            group.paths.len(),
            group.side
        );
        for rel in group.paths.iter().take(SAMPLE_LIMIT) {
            println!("  {rel}");
        }
        if group.paths.len() > SAMPLE_LIMIT {
            println!("  ... ({} more)", group.paths.len() - SAMPLE_LIMIT);
        }

        let choice = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Delete these files?")
            .items(&[
                "No, keep them",
                "Yes, delete this group",
                "Yes to all remaining groups",
                "Abort deletions",
            ])
            .default(0)
            .interact();

        match choice {
            Ok(1) => GroupDecision::Confirm,
            Ok(2) => GroupDecision::ConfirmAll,
            Ok(3) => GroupDecision::Abort,
            // A closed terminal keeps the files.
            Ok(_) | Err(_) => GroupDecision::Skip,
        }
    }

    fn confirm_preflight(&mut self, artifacts: &[String]) -> PreflightDecision {
        println!(
            "\n{} {} unresolved conflict file(s):",
            style("warning:").yellow().bold(),
            artifacts.len()
        );
        for rel in artifacts {
            println!("    {rel}");
        }
        println!();

        let choice = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("What should happen to them?")
            .items(&[
                "Exit without changing anything",
                "Remove them and continue syncing",
                "Remove them and exit",
            ])
            .default(0)
            .interact();

        match choice {
            Ok(1) => PreflightDecision::RemoveAndContinue,
            Ok(2) => PreflightDecision::RemoveAndExit,
            Ok(_) | Err(_) => PreflightDecision::Abort,
        }
    }
}
