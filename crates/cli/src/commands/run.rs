use anyhow::Result;
use colored::*;
use stackrun_core::execution::TaskOutcome;
use stackrun_core::report::format_duration;
use stackrun_core::workspace_manager::WorkspaceManager;
use std::time::Duration;

use super::target_filter;

pub async fn execute(
    manager: &WorkspaceManager,
    command: &str,
    targets: &[String],
    json: bool,
) -> Result<()> {
    if !json {
        println!("{} {}", "Running".bold(), command.cyan());
        println!();
    }

    let result = manager
        .run_command(command, target_filter(targets))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run command: {}", e))?;

    if json {
        println!("{}", result.to_json()?);
    } else {
        println!();
        for (service, outcome) in &result.outcomes {
            match outcome {
                TaskOutcome::Succeeded { elapsed_ms } => println!(
                    "  {} {} {}",
                    "✓".green().bold(),
                    service,
                    format_duration(Duration::from_millis(*elapsed_ms)).dimmed()
                ),
                TaskOutcome::Failed { error, .. } => {
                    println!("  {} {} {}", "✗".red().bold(), service, error.red())
                }
                TaskOutcome::Skipped { dependency } => println!(
                    "  {} {} {}",
                    "-".yellow().bold(),
                    service,
                    format!("skipped, {} did not succeed", dependency).dimmed()
                ),
            }
        }
        for target in &result.unresolved {
            println!("  {} {} {}", "✗".red().bold(), target.service, target.error.red());
        }
        println!();
    }

    if !result.is_success() {
        anyhow::bail!(
            "{} of {} service(s) did not complete",
            result.failed().len() + result.unresolved.len(),
            result.outcomes.len() + result.unresolved.len()
        );
    }

    if !json {
        println!(
            "{} {}",
            "✓".green().bold(),
            "All services completed successfully!".green().bold()
        );
    }

    Ok(())
}
