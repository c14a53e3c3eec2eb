use anyhow::Result;
use colored::*;
use stackrun_core::workspace_manager::WorkspaceManager;

use super::target_filter;

pub async fn execute(manager: &WorkspaceManager, command: &str, targets: &[String]) -> Result<()> {
    println!("{} {}", "Execution plan for".bold(), command.cyan());

    let plan = manager
        .plan(command, target_filter(targets))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get execution plan: {}", e))?;

    println!("\n{}:", "Execution order".bold());
    if plan.order.is_empty() {
        println!("  {}", "Nothing to run".dimmed());
    }
    for (i, key) in plan.order.iter().enumerate() {
        println!("  {}. {}", i + 1, key);
    }

    if !plan.unresolved.is_empty() {
        println!("\n{}:", "Skipped".yellow().bold());
        for target in &plan.unresolved {
            println!("  {} {}", target.service.yellow(), target.error.dimmed());
        }
    }

    Ok(())
}
