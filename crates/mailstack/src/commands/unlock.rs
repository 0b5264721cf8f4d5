use colored::Colorize;
use mailstack_cloud::StateManager;
use std::path::Path;

pub async fn handle(project_root: &Path, stack: &str) -> anyhow::Result<()> {
    let manager = StateManager::new(project_root, stack);
    if manager.force_unlock().await? {
        println!("{}", format!("✓ スタック '{}' のロックを解除しました", stack).green().bold());
    } else {
        println!("スタック '{}' はロックされていません", stack.cyan());
    }
    Ok(())
}
