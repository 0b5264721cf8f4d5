mod commands;
mod utils;

use clap::{Args, Parser, Subcommand};
use mailstack_cloud::DEFAULT_PARALLELISM;

#[derive(Parser)]
#[command(name = "mailstack")]
#[command(about = "メールサービス一式を、ひとつのコマンドで。", long_about = None)]
struct Cli {
    /// デバッグログを出力
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StackArgs {
    /// スタック名 (dev, prod など)
    stack: Option<String>,
    /// スタック名 (-s/--stack フラグ、MAILSTACK_STACK 環境変数)
    #[arg(
        short = 's',
        long = "stack",
        env = "MAILSTACK_STACK",
        conflicts_with = "stack",
        hide = true
    )]
    stack_flag: Option<String>,
}

impl StackArgs {
    fn into_stack(self) -> Option<String> {
        self.stack.or(self.stack_flag)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// 変更内容を表示（何も実行しない）
    Plan {
        #[command(flatten)]
        stack: StackArgs,
    },
    /// スタックを構築・更新
    Up {
        #[command(flatten)]
        stack: StackArgs,
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
        /// 同時に実行するタスク数
        #[arg(short, long, default_value_t = DEFAULT_PARALLELISM)]
        parallel: usize,
    },
    /// スタックの出力を表示
    Outputs {
        #[command(flatten)]
        stack: StackArgs,
        /// シークレットをマスクせずに表示
        #[arg(long)]
        show_secrets: bool,
        /// JSON形式で出力
        #[arg(long)]
        json: bool,
    },
    /// 設定ファイルを検証
    Validate {
        #[command(flatten)]
        stack: StackArgs,
    },
    /// タスクの依存関係を表示
    Graph {
        #[command(flatten)]
        stack: StackArgs,
    },
    /// ステートのロックを強制解除
    Unlock {
        #[command(flatten)]
        stack: StackArgs,
    },
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let project_root = std::env::current_dir()?;

    match cli.command {
        Commands::Plan { stack } => {
            let stack = utils::determine_stack_name(stack.into_stack())?;
            commands::plan::handle(&project_root, &stack).await?;
        }
        Commands::Up {
            stack,
            yes,
            parallel,
        } => {
            let stack = utils::determine_stack_name(stack.into_stack())?;
            commands::up::handle(&project_root, &stack, yes, parallel).await?;
        }
        Commands::Outputs {
            stack,
            show_secrets,
            json,
        } => {
            let stack = utils::determine_stack_name(stack.into_stack())?;
            commands::outputs::handle(&project_root, &stack, show_secrets, json).await?;
        }
        Commands::Validate { stack } => {
            let stack = utils::determine_stack_name(stack.into_stack())?;
            commands::validate::handle(&project_root, &stack).await?;
        }
        Commands::Graph { stack } => {
            let stack = utils::determine_stack_name(stack.into_stack())?;
            commands::graph::handle(&project_root, &stack).await?;
        }
        Commands::Unlock { stack } => {
            let stack = utils::determine_stack_name(stack.into_stack())?;
            commands::unlock::handle(&project_root, &stack).await?;
        }
        Commands::Version => {
            println!("mailstack {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
