use anyhow::Result;
use colored::*;
use stackrun_core::report::service_color;
use stackrun_core::workspace_manager::WorkspaceManager;

pub async fn execute(manager: &WorkspaceManager) -> Result<()> {
    let result = manager.list_services().await?;

    println!("{}", "Services".bold().underline());

    if result.services.is_empty() {
        println!("  {}", "No services found".dimmed());
        return Ok(());
    }

    for service in &result.services {
        let name = service.name.color(service_color(&service.name)).bold();
        let module = format!("[{}:{}]", service.module_type, service.module);

        if service.module_type == result.module_type {
            println!("{} {} {}", name, module.green(), service.stack.dimmed());
            if !service.dependencies.is_empty() {
                println!("  {} {}", "depends on:".dimmed(), service.dependencies.join(", "));
            }
        } else {
            // Stack commands skip services of other module types
            println!("{} {}", name, module.dimmed());
        }
    }

    Ok(())
}
