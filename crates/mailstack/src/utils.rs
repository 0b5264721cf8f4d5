use colored::Colorize;
use mailstack_cloud_aws::AwsProvider;
use mailstack_cloud_gcp::GcpProvider;
use mailstack_cloud_hetzner::HetznerProvider;
use mailstack_config::LoadedConfig;
use mailstack_stack::{Providers, Psql, SshExecutor, Stack, StackContext, build_stack};
use std::path::Path;
use std::sync::Arc;

/// スタック名を決定
pub fn determine_stack_name(stack: Option<String>) -> anyhow::Result<String> {
    let stack = stack.ok_or_else(|| {
        anyhow::anyhow!(
            "スタック名を指定してください: mailstack <command> <stack> または MAILSTACK_STACK=<stack>"
        )
    })?;
    mailstack_config::validate_stack_name(&stack)?;
    Ok(stack)
}

/// 読み込んだ設定ファイル情報を表示
pub fn print_loaded_config(loaded: &LoadedConfig) {
    println!("📄 読み込んだ設定ファイル:");
    println!("  • {}", loaded.settings_path.display().to_string().cyan());
}

/// 本番用のプロバイダー一式
pub fn providers(ctx: &StackContext) -> Providers {
    let gcp = Arc::new(GcpProvider::new());
    let vault = &ctx.settings.vault;
    Providers {
        compute: Arc::new(HetznerProvider::new()),
        dns: gcp.clone(),
        objects: gcp.clone(),
        iam: gcp,
        storage: Arc::new(AwsProvider::new()),
        secrets: mailstack_cloud_vault::secret_store(vault.address.as_deref(), &vault.mount),
        database: Arc::new(Psql::new(ctx.postgres.clone())),
        remote: Arc::new(SshExecutor::new()),
    }
}

/// 設定を読み込んでタスクグラフを組み立てる
pub fn load_stack(
    project_root: &Path,
    stack: &str,
) -> anyhow::Result<(LoadedConfig, StackContext, Providers, Stack)> {
    let loaded = mailstack_config::load(stack)?;
    let ctx = StackContext::from_loaded(&loaded, project_root);
    let providers = providers(&ctx);
    let built = build_stack(&ctx, &providers)?;
    Ok((loaded, ctx, providers, built))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determine_stack_name() {
        assert_eq!(determine_stack_name(Some("prod".into())).unwrap(), "prod");
        assert!(determine_stack_name(None).is_err());
        assert!(determine_stack_name(Some("../prod".into())).is_err());
    }
}
