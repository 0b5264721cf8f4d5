use crate::value::TaskId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("テンプレートエラー: {file}\n理由: {message}")]
    TemplateError {
        file: PathBuf,
        line: Option<usize>,
        message: String,
    },

    #[error("テンプレート展開エラー: {0}")]
    TemplateRenderError(String),

    #[error("タスクIDが重複しています: {0}")]
    DuplicateTask(TaskId),

    #[error("タスク '{task}' が未定義のタスク '{dependency}' に依存しています")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("循環依存が検出されました: {0}")]
    CircularDependency(String),

    #[error("タスク '{task}' は依存関係に宣言されていない '{input}' の出力を参照しています")]
    UndeclaredInput { task: TaskId, input: TaskId },

    #[error("タスク '{task}' の出力 '{key}' がまだ存在しません")]
    MissingOutput { task: TaskId, key: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
