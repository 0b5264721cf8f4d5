use crate::utils;
use colored::Colorize;
use mailstack_cloud::{ActionType, Executor, Plan, StateManager};
use std::path::Path;

pub async fn handle(project_root: &Path, stack: &str) -> anyhow::Result<()> {
    println!("{}", "変更内容を計算中...".blue());
    let (loaded, _ctx, _providers, built) = utils::load_stack(project_root, stack)?;
    utils::print_loaded_config(&loaded);
    println!("スタック: {}", stack.cyan());

    let manager = StateManager::new(project_root, stack);
    let state = manager.load().await?;
    let plan = Executor::new(&built.graph).plan(&state).await?;

    println!();
    print_plan(&plan);
    Ok(())
}

/// 変更のあるタスクとサマリーを表示
pub fn print_plan(plan: &Plan) {
    if !plan.has_changes {
        println!("{}", "✓ 変更はありません".green().bold());
        return;
    }

    for action in &plan.actions {
        let marker = match action.action_type {
            ActionType::Create => "+".green().bold(),
            ActionType::Update => "~".yellow().bold(),
            ActionType::NoOp => continue,
        };
        let deferred = if action.deferred {
            " (適用後に確定)".dimmed().to_string()
        } else {
            String::new()
        };
        println!(
            "  {} {} {}{}",
            marker,
            action.id.cyan(),
            action.description.dimmed(),
            deferred
        );
    }

    let summary = plan.summary();
    println!();
    println!(
        "作成: {}  更新: {}  変更なし: {}",
        summary.create.to_string().green(),
        summary.update.to_string().yellow(),
        summary.no_change
    );
}
