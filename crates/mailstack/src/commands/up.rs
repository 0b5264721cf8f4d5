use super::plan::print_plan;
use crate::utils;
use colored::Colorize;
use mailstack_cloud::{ApplyEvent, Executor, StateManager};
use mailstack_stack::Providers;
use mailstack_stack::outputs::{exports, write_outputs_json};
use std::io::Write;
use std::path::Path;

pub async fn handle(project_root: &Path, stack: &str, yes: bool, parallel: usize) -> anyhow::Result<()> {
    println!("{}", "スタックを構築します...".blue().bold());
    let (loaded, ctx, providers, built) = utils::load_stack(project_root, stack)?;
    utils::print_loaded_config(&loaded);
    println!("スタック: {}", stack.cyan());

    check_auth(&providers).await?;

    let manager = StateManager::new(project_root, stack);
    let lock = manager.acquire_lock().await?;
    let mut state = manager.load().await?;

    let executor = Executor::new(&built.graph)
        .with_parallelism(parallel)
        .with_observer(print_event);

    let plan = executor.plan(&state).await?;
    println!();
    print_plan(&plan);

    if plan.has_changes && !yes && !confirm()? {
        println!("キャンセルしました");
        lock.release().await?;
        return Ok(());
    }

    println!();
    let result = executor.apply(&mut state, &manager).await?;

    state.set_exports(exports(&state));
    manager.save(&state).await?;
    let path = write_outputs_json(&ctx.outputs_dir, &state.outputs)?;
    lock.release().await?;

    println!();
    if !result.is_success() {
        eprintln!("{}", "✗ 一部のタスクが失敗しました".red().bold());
        for failure in &result.failed {
            eprintln!(
                "  • {}: {}",
                failure.task.cyan(),
                failure.error.as_deref().unwrap_or_default()
            );
        }
        eprintln!();
        eprintln!("完了したタスクは記録済みです。再実行すると続きから適用します");
        std::process::exit(1);
    }

    println!(
        "{}",
        format!(
            "✓ 適用しました（実行: {}, 変更なし: {}, {:.1}秒）",
            result.succeeded.len(),
            result.unchanged.len(),
            result.duration_ms as f64 / 1000.0
        )
        .green()
        .bold()
    );
    println!("出力: {}", path.display().to_string().cyan());
    Ok(())
}

async fn check_auth(providers: &Providers) -> anyhow::Result<()> {
    let checks = [
        (providers.compute.name(), providers.compute.check_auth().await?),
        (providers.dns.name(), providers.dns.check_auth().await?),
        (providers.storage.name(), providers.storage.check_auth().await?),
    ];
    for (name, status) in checks {
        if !status.authenticated {
            anyhow::bail!(
                "{} の認証に失敗しました: {}",
                name,
                status.error.unwrap_or_default()
            );
        }
        tracing::debug!(
            provider = name,
            account = status.account_info.as_deref().unwrap_or("-"),
            "Authenticated"
        );
    }
    Ok(())
}

fn confirm() -> anyhow::Result<bool> {
    println!();
    print!("{}", "上記の変更を適用しますか？ [y/N]: ".yellow());
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

fn print_event(event: &ApplyEvent) {
    match event {
        ApplyEvent::Started { id, description } => {
            println!("  {} {} {}", "→".blue(), id.as_str().cyan(), description.dimmed());
        }
        ApplyEvent::Finished { id, action } => {
            println!("  {} {} ({})", "✓".green(), id.as_str().cyan(), action);
        }
        ApplyEvent::Unchanged { id } => {
            tracing::debug!(task = %id, "Unchanged");
        }
        ApplyEvent::Failed { id, error } => {
            println!("  {} {}: {}", "✗".red(), id.as_str().cyan(), error.red());
        }
    }
}
