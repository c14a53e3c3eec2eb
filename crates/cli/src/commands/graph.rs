use anyhow::Result;
use colored::*;
use stackrun_core::graph::describe_cycle;
use stackrun_core::workspace_manager::WorkspaceManager;

pub async fn execute(manager: &WorkspaceManager) -> Result<()> {
    println!("{}", "Service Dependency Graph:".bold().underline());

    let result = manager
        .get_dependency_graph()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get dependency graph: {}", e))?;

    let graph = &result.graph;
    if graph.node_count() == 0 {
        println!("No services found");
        return Ok(());
    }

    if !result.cycles.is_empty() {
        let cycles_description = result
            .cycles
            .iter()
            .map(|cycle| describe_cycle(cycle))
            .collect::<Vec<_>>()
            .join("; ");

        println!(
            "{} {}",
            "Warning:".yellow().bold(),
            format!("Circular dependencies detected: {}", cycles_description).yellow()
        );
    }

    for (node_index, node_weight) in graph.node_indices().zip(graph.node_weights()) {
        println!("{}", node_weight.blue().bold());

        let mut deps: Vec<String> = graph
            .neighbors(node_index)
            .filter_map(|neighbor| graph.node_weight(neighbor).cloned())
            .collect();
        deps.sort();

        if !deps.is_empty() {
            println!("  {} {}", "depends on:".dimmed(), deps.join(", "));
        } else {
            println!("  {}", "no dependencies".dimmed());
        }
        println!();
    }

    Ok(())
}
