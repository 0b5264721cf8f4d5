use crate::utils;
use colored::Colorize;
use mailstack_stack::{StackContext, build_stack};
use std::path::Path;

pub async fn handle(project_root: &Path, stack: &str) -> anyhow::Result<()> {
    println!("{}", "設定を検証中...".blue());

    let loaded = match mailstack_config::load(stack) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ 設定エラー".red().bold());
            eprintln!("  {}", e);
            eprintln!();
            eprintln!(
                "mailstack.{}.yaml が存在するディレクトリで実行するか、MAILSTACK_CONFIG_PATH を指定してください",
                stack
            );
            std::process::exit(1);
        }
    };
    utils::print_loaded_config(&loaded);

    let ctx = StackContext::from_loaded(&loaded, project_root);
    let providers = utils::providers(&ctx);
    let built = match build_stack(&ctx, &providers) {
        Ok(built) => built,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ タスクグラフの構築に失敗しました".red().bold());
            eprintln!("  {:#}", e);
            std::process::exit(1);
        }
    };

    let settings = &ctx.settings;
    println!("{}", "✓ 設定ファイルは正常です！".green().bold());
    println!();
    println!("サマリー:");
    println!("  サーバー: {} ({})", ctx.server_name().cyan(), settings.server.server_type);
    println!("  メールホスト: {}", ctx.mailname().cyan());
    println!("  ドメイン: {}個", settings.mail.additional.len() + 1);
    println!("    - {} (メイン)", settings.mail.main.name.cyan());
    for domain in &settings.mail.additional {
        println!("    - {}", domain.name.cyan());
    }
    println!("  データベース: {}", ctx.postgres.address.cyan());
    println!("  タスク: {}個", built.graph.len());
    Ok(())
}
