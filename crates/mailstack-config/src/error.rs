use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error(
        "スタック '{stack}' の設定ファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: mailstack.{stack}.local.yaml, mailstack.{stack}.yaml\n\
        - ./.mailstack/{stack}.yaml\n\
        - ~/.config/mailstack/{stack}.yaml\n\
        または MAILSTACK_CONFIG_PATH 環境変数で直接指定できます"
    )]
    SettingsFileNotFound { stack: String },

    #[error("無効なスタック名です: '{0}' (英小文字・数字・ハイフンのみ使用できます)")]
    InvalidStackName(String),

    #[error("設定ファイルの解析に失敗しました: {path}\n理由: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("設定値が不正です: {field}\n理由: {message}")]
    Invalid { field: String, message: String },

    #[error("上流スタックの出力が見つかりません: {0}\nヒント: upstream.outputsPath または MAILSTACK_UPSTREAM_OUTPUTS を確認してください")]
    UpstreamNotFound(PathBuf),

    #[error("上流スタックの出力が不正です: {path}\n理由: {message}")]
    UpstreamMalformed { path: PathBuf, message: String },

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
