use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("データベースユーザー '{0}' が設定されていません")]
    UnknownDatabaseUser(String),

    #[error("psql が見つかりません。PostgreSQL クライアントをインストールしてください")]
    PsqlNotFound,

    #[error("psql の実行に失敗しました: {0}")]
    Psql(String),

    #[error("ssh が見つかりません")]
    SshNotFound,

    #[error("リモートコマンドが失敗しました ({host}): {message}")]
    Remote { host: String, message: String },

    #[error("出力ファイルを書き込めません: {0}")]
    Outputs(String),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON エラー: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StackError>;

impl From<StackError> for mailstack_cloud::CloudError {
    fn from(e: StackError) -> Self {
        match e {
            StackError::PsqlNotFound | StackError::SshNotFound => {
                mailstack_cloud::CloudError::CommandFailed(e.to_string())
            }
            StackError::Io(err) => mailstack_cloud::CloudError::Io(err),
            StackError::Json(err) => mailstack_cloud::CloudError::Json(err),
            other => mailstack_cloud::CloudError::CommandFailed(other.to_string()),
        }
    }
}
