//! テンプレート展開機能
//!
//! Teraを使用して `.j2` アセットを展開します。

use crate::error::{CoreError, Result};
use serde_json::{Map, Value as JsonValue};
use std::path::Path;
use tera::{Context, Tera};
use tracing::debug;

/// テンプレートプロセッサ
pub struct TemplateProcessor {
    tera: Tera,
    context: Context,
}

impl TemplateProcessor {
    /// 新しいテンプレートプロセッサを作成
    pub fn new() -> Self {
        Self {
            tera: Tera::default(),
            context: Context::new(),
        }
    }

    /// 変数を追加
    pub fn add_variable(&mut self, key: impl Into<String>, value: JsonValue) {
        self.context.insert(key.into(), &value);
    }

    /// ドット区切りのパス (`db.auth.user`) で変数を追加
    ///
    /// 同じ先頭キーを持つ変数はひとつのオブジェクトにまとめられます。
    pub fn add_path_variables<'a>(
        &mut self,
        pairs: impl IntoIterator<Item = (&'a str, JsonValue)>,
    ) {
        let mut root = Map::new();
        for (path, value) in pairs {
            insert_path(&mut root, path, value);
        }
        for (key, value) in root {
            self.context.insert(key, &value);
        }
    }

    /// 文字列を展開
    pub fn render_str(&mut self, template: &str) -> Result<String> {
        self.tera
            .render_str(template, &self.context)
            .map_err(|e| CoreError::TemplateRenderError(describe_tera_error(&e)))
    }

    /// アセットを読み込んで展開。エラーにはファイルパスを付ける
    pub fn render_file(&mut self, path: &Path) -> Result<String> {
        debug!(template = %path.display(), "Rendering template");
        let source = std::fs::read_to_string(path).map_err(|e| CoreError::IoError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        match self.render_str(&source) {
            Err(CoreError::TemplateRenderError(message)) => Err(CoreError::TemplateError {
                file: path.to_path_buf(),
                line: None,
                message,
            }),
            other => other,
        }
    }
}

impl Default for TemplateProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// `a.b.c` を `{"a": {"b": {"c": value}}}` として挿入
pub fn insert_path(root: &mut Map<String, JsonValue>, path: &str, value: JsonValue) {
    match path.split_once('.') {
        None => {
            root.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = root
                .entry(head.to_string())
                .or_insert_with(|| JsonValue::Object(Map::new()));
            if !child.is_object() {
                *child = JsonValue::Object(Map::new());
            }
            if let JsonValue::Object(map) = child {
                insert_path(map, rest, value);
            }
        }
    }
}

/// Teraのエラーチェーンを一行にまとめる
///
/// 未定義変数の場合は変数名だけを取り出します。
fn describe_tera_error(e: &tera::Error) -> String {
    use std::error::Error;

    let chain: Vec<String> =
        std::iter::successors(Some(e as &(dyn Error + 'static)), |&err| err.source())
            .map(|err| err.to_string())
            .collect();

    let undefined = chain.iter().find_map(|msg| {
        let rest = msg.split("Variable `").nth(1)?;
        let (name, tail) = rest.split_once('`')?;
        tail.contains("not found in context").then_some(name)
    });

    match undefined {
        Some(name) => format!(
            "未定義の変数: `{name}`\nヒント: アセットのテンプレート変数とサービス定義を確認してください"
        ),
        None => chain.join(": "),
    }
}
