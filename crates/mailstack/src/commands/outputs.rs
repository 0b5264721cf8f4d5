use colored::Colorize;
use mailstack_cloud::StateManager;
use mailstack_stack::outputs::{exports, mask_secrets};
use serde_json::Value;
use std::path::Path;

pub async fn handle(project_root: &Path, stack: &str, show_secrets: bool, json: bool) -> anyhow::Result<()> {
    let manager = StateManager::new(project_root, stack);
    let state = manager.load().await?;

    if state.tasks.is_empty() {
        anyhow::bail!(
            "スタック '{}' はまだ適用されていません: mailstack up {}",
            stack,
            stack
        );
    }

    let exported = if state.outputs.is_null() {
        exports(&state)
    } else {
        state.outputs.clone()
    };
    let exported = if show_secrets {
        exported
    } else {
        mask_secrets(&exported)
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&exported)?);
        return Ok(());
    }

    let mut lines = Vec::new();
    flatten("", &exported, &mut lines);
    for (key, value) in lines {
        println!("{} = {}", key.cyan(), value);
    }
    Ok(())
}

/// `server.network.public.ipv4 = …` 形式の行に展開
fn flatten(prefix: &str, value: &Value, lines: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, child, lines);
            }
        }
        Value::String(s) => lines.push((prefix.to_string(), s.clone())),
        Value::Null => lines.push((prefix.to_string(), "(未確定)".to_string())),
        other => lines.push((prefix.to_string(), other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten() {
        let value = json!({
            "server": {"network": {"public": {"ipv4": "192.0.2.10", "ipv6": null}}},
        });
        let mut lines = Vec::new();
        flatten("", &value, &mut lines);
        assert_eq!(
            lines,
            vec![
                ("server.network.public.ipv4".to_string(), "192.0.2.10".to_string()),
                ("server.network.public.ipv6".to_string(), "(未確定)".to_string()),
            ]
        );
    }
}
