use anyhow::Result;
use colored::*;
use stackrun_core::workspace_manager::WorkspaceManager;

pub fn execute(manager: &WorkspaceManager) -> Result<()> {
    println!(
        "{} {}",
        "Commands for module type".bold().underline(),
        manager.workspace_config.module_type().cyan()
    );

    for handler in manager.commands() {
        println!("{:<10} {}", handler.name().blue().bold(), handler.description().dimmed());
    }

    Ok(())
}
