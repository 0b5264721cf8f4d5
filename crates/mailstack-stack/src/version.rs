//! Service versions read back from rendered compose files.
//!
//! A version that cannot be determined is `""`; it only feeds install
//! triggers and templates.

/// Where the version lives in a compose file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSource {
    /// Tag of `services.<name>.image`.
    ImageTag(String),
    /// Top-level `version` key, which mailcow keeps in a comment.
    CommentedKey,
}

impl VersionSource {
    pub fn image(service: &str) -> Self {
        VersionSource::ImageTag(service.to_string())
    }

    pub fn extract(&self, compose: &str) -> String {
        match self {
            VersionSource::ImageTag(service) => image_tag(compose, service),
            VersionSource::CommentedKey => commented_version(compose),
        }
    }
}

pub fn image_tag(compose: &str, service: &str) -> String {
    let parsed: serde_yaml::Value = match serde_yaml::from_str(compose) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "Compose file is not valid YAML");
            return String::new();
        }
    };

    parsed
        .get("services")
        .and_then(|s| s.get(service))
        .and_then(|s| s.get("image"))
        .and_then(serde_yaml::Value::as_str)
        .and_then(|image| image.split_once(':'))
        .map(|(_, tag)| tag.to_string())
        .unwrap_or_else(|| {
            tracing::debug!(service, "No image tag found");
            String::new()
        })
}

pub fn commented_version(compose: &str) -> String {
    let uncommented = compose.replace('#', "");
    match serde_yaml::from_str::<serde_yaml::Value>(&uncommented) {
        Ok(parsed) => parsed
            .get("version")
            .and_then(serde_yaml::Value::as_str)
            .map(str::to_string)
            .unwrap_or_default(),
        Err(e) => {
            tracing::debug!(error = %e, "Compose file is not valid YAML");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPOSE: &str = r#"
services:
  app:
    image: simplelogin/app-ci:v4.70.0
  postfix:
    image: private/postfix
"#;

    #[test]
    fn test_image_tag() {
        assert_eq!(image_tag(COMPOSE, "app"), "v4.70.0");
        assert_eq!(image_tag("services:\n  x:\n    image: foo:1.2\n", "x"), "1.2");
    }

    #[test]
    fn test_image_tag_missing() {
        assert_eq!(image_tag(COMPOSE, "postfix"), "");
        assert_eq!(image_tag(COMPOSE, "webmail"), "");
        assert_eq!(image_tag("services: [unterminated", "app"), "");
    }

    #[test]
    fn test_commented_version() {
        let compose = "#version: 2025-03b\nservices:\n  dovecot-mailcow:\n    environment: []\n";
        assert_eq!(commented_version(compose), "2025-03b");
        assert_eq!(commented_version("services: {}\n"), "");
    }

    #[test]
    fn test_source_dispatch() {
        assert_eq!(VersionSource::image("app").extract(COMPOSE), "v4.70.0");
        assert_eq!(VersionSource::CommentedKey.extract("#version: x\n"), "x");
    }
}
