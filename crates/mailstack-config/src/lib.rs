pub mod error;
pub mod settings;
pub mod upstream;

pub use error::*;
pub use settings::*;
pub use upstream::{PostgresConnection, UpstreamAws, UpstreamOutputs, load_upstream};

use std::path::{Path, PathBuf};

/// 設定ファイルパスを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "MAILSTACK_CONFIG_PATH";
/// 上流スタック出力のパスを直接指定する環境変数
pub const UPSTREAM_OUTPUTS_ENV: &str = "MAILSTACK_UPSTREAM_OUTPUTS";

/// グローバル設定ディレクトリ (`~/.config/mailstack`)。なければ作成
pub fn get_config_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .map(|base| base.join("mailstack"))
        .ok_or(ConfigError::ConfigDirNotFound)?;
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// スタック名を検証
pub fn validate_stack_name(stack: &str) -> Result<()> {
    let valid = !stack.is_empty()
        && stack
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !stack.starts_with('-');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidStackName(stack.to_string()))
    }
}

/// スタックの設定ファイルを探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 MAILSTACK_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: mailstack.<stack>.local.yaml, mailstack.<stack>.yaml
/// 3. ./.mailstack/<stack>.yaml
/// 4. ~/.config/mailstack/<stack>.yaml (グローバル設定)
pub fn find_settings_file(stack: &str) -> Result<PathBuf> {
    validate_stack_name(stack)?;

    if let Some(explicit) = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from) {
        if explicit.is_file() {
            return Ok(explicit);
        }
        tracing::warn!(path = %explicit.display(), "{} points to a missing file", CONFIG_PATH_ENV);
    }

    let cwd = std::env::current_dir()?;
    let mut candidates = vec![
        cwd.join(format!("mailstack.{stack}.local.yaml")),
        cwd.join(format!("mailstack.{stack}.yaml")),
        cwd.join(".mailstack").join(format!("{stack}.yaml")),
    ];
    if let Some(global) = dirs::config_dir() {
        candidates.push(global.join("mailstack").join(format!("{stack}.yaml")));
    }

    candidates
        .into_iter()
        .find(|path| path.is_file())
        .ok_or_else(|| ConfigError::SettingsFileNotFound {
            stack: stack.to_string(),
        })
}

/// 設定ファイルを読み込んで検証
pub fn load_settings(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)?;
    let settings = Settings::from_yaml(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    settings.validate()?;
    tracing::debug!(path = %path.display(), "Loaded settings");
    Ok(settings)
}

/// 上流スタック出力のパスを決定
///
/// 優先順位: MAILSTACK_UPSTREAM_OUTPUTS → upstream.outputsPath
/// (設定ファイルからの相対パス) → ../shared-services/outputs/<stack>.json
pub fn upstream_outputs_path(settings: &Settings, settings_path: &Path, stack: &str) -> PathBuf {
    if let Ok(path) = std::env::var(UPSTREAM_OUTPUTS_ENV) {
        return PathBuf::from(path);
    }

    let base = settings_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    match &settings.upstream.outputs_path {
        Some(path) => base.join(path),
        None => base
            .join("..")
            .join("shared-services")
            .join("outputs")
            .join(format!("{stack}.json")),
    }
}

/// 読み込み済みのスタック設定
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub stack: String,
    pub settings_path: PathBuf,
    pub settings: Settings,
    pub upstream: UpstreamOutputs,
}

/// スタックの設定と上流スタック出力をまとめて読み込む
pub fn load(stack: &str) -> Result<LoadedConfig> {
    let settings_path = find_settings_file(stack)?;
    let settings = load_settings(&settings_path)?;
    let upstream_path = upstream_outputs_path(&settings, &settings_path, stack);
    let upstream = load_upstream(&upstream_path)?;

    Ok(LoadedConfig {
        stack: stack.to_string(),
        settings_path,
        settings,
        upstream,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    const UPSTREAM: &str = r#"{"aws":{"postgresql":{"address":"db","port":5432,"username":"admin","password":"pw"}}}"#;

    #[test]
    fn test_get_config_dir() {
        let config_dir = get_config_dir().unwrap();
        assert!(config_dir.ends_with("mailstack"));
        assert!(config_dir.exists());
    }

    #[test]
    fn test_validate_stack_name() {
        assert!(validate_stack_name("prod").is_ok());
        assert!(validate_stack_name("dev-2").is_ok());
        assert!(validate_stack_name("").is_err());
        assert!(validate_stack_name("Prod").is_err());
        assert!(validate_stack_name("../etc").is_err());
        assert!(validate_stack_name("-x").is_err());
    }

    #[test]
    #[serial]
    fn test_find_settings_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("mailstack.prod.yaml"), "# test").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = temp_env::with_var_unset(CONFIG_PATH_ENV, || find_settings_file("prod"));
        assert!(result.unwrap().ends_with("mailstack.prod.yaml"));

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_find_settings_file_local_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("mailstack.prod.yaml"), "# shared").unwrap();
        fs::write(temp_dir.path().join("mailstack.prod.local.yaml"), "# local").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = temp_env::with_var_unset(CONFIG_PATH_ENV, || find_settings_file("prod"));
        assert!(result.unwrap().ends_with("mailstack.prod.local.yaml"));

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_find_settings_file_in_stack_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        let stack_dir = temp_dir.path().join(".mailstack");
        fs::create_dir(&stack_dir).unwrap();
        fs::write(stack_dir.join("dev.yaml"), "# dev").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = temp_env::with_var_unset(CONFIG_PATH_ENV, || find_settings_file("dev"));
        assert!(result.unwrap().ends_with(".mailstack/dev.yaml"));

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_find_settings_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, "# custom").unwrap();

        let result = temp_env::with_var(CONFIG_PATH_ENV, Some(&config_path), || {
            find_settings_file("prod")
        });
        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    #[serial]
    fn test_find_settings_file_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = temp_env::with_var_unset(CONFIG_PATH_ENV, || find_settings_file("nowhere"));
        match result {
            Err(ConfigError::SettingsFileNotFound { stack }) => assert_eq!(stack, "nowhere"),
            other => panic!("Expected SettingsFileNotFound error, got {other:?}"),
        }

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_upstream_path_resolution() {
        let settings = settings::tests::sample();
        let settings_path = Path::new("/infra/mail/mailstack.prod.yaml");

        let default = temp_env::with_var_unset(UPSTREAM_OUTPUTS_ENV, || {
            upstream_outputs_path(&settings, settings_path, "prod")
        });
        assert_eq!(
            default,
            PathBuf::from("/infra/mail/../shared-services/outputs/prod.json")
        );

        let mut custom = settings.clone();
        custom.upstream.outputs_path = Some("state/shared.json".to_string());
        let configured = temp_env::with_var_unset(UPSTREAM_OUTPUTS_ENV, || {
            upstream_outputs_path(&custom, settings_path, "prod")
        });
        assert_eq!(configured, PathBuf::from("/infra/mail/state/shared.json"));

        let overridden = temp_env::with_var(UPSTREAM_OUTPUTS_ENV, Some("/tmp/up.json"), || {
            upstream_outputs_path(&custom, settings_path, "prod")
        });
        assert_eq!(overridden, PathBuf::from("/tmp/up.json"));
    }

    #[test]
    #[serial]
    fn test_load_full_stack() {
        let temp_dir = tempfile::tempdir().unwrap();
        let settings_path = temp_dir.path().join("mailstack.prod.yaml");
        let upstream_path = temp_dir.path().join("shared.json");
        fs::write(&settings_path, settings::tests::SAMPLE).unwrap();
        fs::write(&upstream_path, UPSTREAM).unwrap();

        let loaded = temp_env::with_vars(
            [
                (CONFIG_PATH_ENV, Some(settings_path.as_os_str())),
                (UPSTREAM_OUTPUTS_ENV, Some(upstream_path.as_os_str())),
            ],
            || load("prod"),
        )
        .unwrap();

        assert_eq!(loaded.stack, "prod");
        assert_eq!(loaded.settings.mail.main.name, "example.com");
        assert_eq!(loaded.upstream.postgresql().username, "admin");
    }

    #[test]
    fn test_load_settings_reports_parse_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("broken.yaml");
        fs::write(&path, "bucketId: [unterminated").unwrap();

        let err = load_settings(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
