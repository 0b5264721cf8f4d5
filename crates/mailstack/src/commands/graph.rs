use crate::utils;
use colored::Colorize;
use std::path::Path;

pub async fn handle(project_root: &Path, stack: &str) -> anyhow::Result<()> {
    let (_loaded, _ctx, _providers, built) = utils::load_stack(project_root, stack)?;
    let graph = &built.graph;
    let levels = graph.levels()?;

    println!(
        "{}",
        format!("タスク: {}個 / レベル: {}個", graph.len(), levels.len()).bold()
    );
    for (index, level) in levels.iter().enumerate() {
        println!();
        println!("{}", format!("レベル {}:", index + 1).blue().bold());
        for id in level {
            let Some(task) = graph.get(id) else {
                continue;
            };
            println!("  • {} [{}]", id.as_str().cyan(), task.kind());
            let deps = task.dependencies();
            if !deps.is_empty() {
                let names: Vec<&str> = deps.iter().map(|d| d.as_str()).collect();
                println!("      ← {}", names.join(", ").dimmed());
            }
        }
    }
    Ok(())
}
