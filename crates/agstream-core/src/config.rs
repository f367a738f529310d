//! Agent configuration.
//!
//! Settings come from a JSONC file and `AGSTREAM_*` environment overrides,
//! merged field by field. Files may reference other values:
//! - `{env:VAR_NAME}` - Substitute environment variable
//! - `{file:path}` - Substitute file contents (relative to the config file)

use crate::error::{AgentResult, ConfigError};
use crate::patch::DEFAULT_HISTORY_LIMIT;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

static VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

fn var_regex() -> &'static regex::Regex {
    VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\{(env|file):([^}]+)\}")
            .expect("Invalid regex pattern - this is a compile-time constant")
    })
}

/// What to do with a payload that is not a valid event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPayloadPolicy {
    /// Log and drop the payload.
    #[default]
    Skip,
    /// Fail the run with a parse error.
    Abort,
}

/// State snapshot history settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Agent configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    /// Extra request headers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,

    /// Sent as `Authorization: Bearer <token>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,

    /// Transport timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub malformed_payload: Option<MalformedPayloadPolicy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_history: Option<HistoryConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl AgentConfig {
    /// Load configuration from a file.
    pub async fn load_file(path: &Path) -> AgentResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let content = Self::substitute_variables(&content, path)?;
        Self::parse_jsonc(&content, &path.display().to_string())
    }

    /// Parse configuration text. Variable references are not expanded.
    pub fn parse_str(content: &str) -> AgentResult<Self> {
        Self::parse_jsonc(content, "<inline>")
    }

    fn parse_jsonc(content: &str, source: &str) -> AgentResult<Self> {
        let stripped = Self::strip_comments(content);

        serde_json::from_str(&stripped).map_err(|e| {
            ConfigError::InvalidJson {
                path: source.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Strip `//` and `/* */` comments outside of strings.
    fn strip_comments(input: &str) -> String {
        let mut result = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();
        let mut in_string = false;
        let mut escape_next = false;

        while let Some(c) = chars.next() {
            if escape_next {
                result.push(c);
                escape_next = false;
                continue;
            }

            if in_string {
                match c {
                    '\\' => escape_next = true,
                    '"' => in_string = false,
                    _ => {}
                }
                result.push(c);
                continue;
            }

            match (c, chars.peek().copied()) {
                ('"', _) => {
                    in_string = true;
                    result.push(c);
                }
                ('/', Some('/')) => {
                    for c in chars.by_ref() {
                        if c == '\n' {
                            result.push('\n');
                            break;
                        }
                    }
                }
                ('/', Some('*')) => {
                    chars.next();
                    let mut prev = ' ';
                    for c in chars.by_ref() {
                        if prev == '*' && c == '/' {
                            break;
                        }
                        // keep line numbers stable for serde errors
                        if c == '\n' {
                            result.push('\n');
                        }
                        prev = c;
                    }
                }
                _ => result.push(c),
            }
        }

        result
    }

    fn substitute_variables(content: &str, config_path: &Path) -> AgentResult<String> {
        let config_dir = config_path.parent().unwrap_or(Path::new("."));
        let mut result = content.to_string();

        for cap in var_regex().captures_iter(content) {
            let (Some(full_match), Some(kind), Some(value)) = (cap.get(0), cap.get(1), cap.get(2))
            else {
                continue;
            };
            let value = value.as_str();

            let replacement = match kind.as_str() {
                "env" => std::env::var(value).map_err(|_| ConfigError::EnvVarNotFound {
                    name: value.to_string(),
                })?,
                "file" => {
                    let file_path = config_dir.join(value);
                    std::fs::read_to_string(&file_path)
                        .map_err(|_| ConfigError::FileRefNotFound {
                            path: file_path.display().to_string(),
                        })?
                        .trim()
                        .to_string()
                }
                _ => continue,
            };

            result = result.replace(full_match.as_str(), &replacement);
        }

        Ok(result)
    }

    /// Apply `AGSTREAM_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> AgentResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> AgentResult<()> {
        if let Some(url) = lookup("AGSTREAM_URL") {
            self.url = Some(url);
        }
        if let Some(agent_id) = lookup("AGSTREAM_AGENT_ID") {
            self.agent_id = Some(agent_id);
        }
        if let Some(token) = lookup("AGSTREAM_BEARER_TOKEN") {
            self.bearer_token = Some(token);
        }
        if let Some(timeout) = lookup("AGSTREAM_TIMEOUT_MS") {
            let timeout = timeout
                .trim()
                .parse()
                .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
                    key: "AGSTREAM_TIMEOUT_MS".to_string(),
                    message: e.to_string(),
                })?;
            self.timeout_ms = Some(timeout);
        }
        Ok(())
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(self, other: Self) -> Self {
        Self {
            url: merge_option(self.url, other.url),
            agent_id: merge_option(self.agent_id, other.agent_id),
            headers: merge_hashmap(self.headers, other.headers),
            bearer_token: merge_option(self.bearer_token, other.bearer_token),
            timeout_ms: merge_option(self.timeout_ms, other.timeout_ms),
            malformed_payload: merge_option(self.malformed_payload, other.malformed_payload),
            state_history: merge_option(self.state_history, other.state_history),
            log_level: merge_option(self.log_level, other.log_level),
        }
    }
}

fn merge_option<T>(base: Option<T>, other: Option<T>) -> Option<T> {
    match (base, other) {
        (_, Some(o)) => Some(o),
        (b, None) => b,
    }
}

fn merge_hashmap<K: std::hash::Hash + Eq, V>(
    base: Option<HashMap<K, V>>,
    other: Option<HashMap<K, V>>,
) -> Option<HashMap<K, V>> {
    match (base, other) {
        (Some(mut b), Some(o)) => {
            b.extend(o);
            Some(b)
        }
        (b, None) => b,
        (None, o) => o,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;

    #[test]
    fn test_strip_comments() {
        let input = r#"{
            // Line comment
            "url": "http://localhost/agent", // trailing comment
            /* block comment */
            "agent_id": "val/*not a comment*/ue",
            "log_level": "say \"//hi\""
        }"#;

        let result = AgentConfig::strip_comments(input);
        assert!(!result.contains("Line comment"));
        assert!(!result.contains("trailing comment"));
        assert!(!result.contains("block comment"));
        assert!(result.contains("http://localhost/agent"));
        assert!(result.contains("val/*not a comment*/ue"));
        assert!(result.contains(r#""say \"//hi\"""#));
    }

    #[test]
    fn test_parse_jsonc() {
        let config = AgentConfig::parse_str(
            r#"{
                // endpoint
                "url": "http://localhost:8000/awp",
                "malformed_payload": "abort",
                "state_history": { "enabled": true }
            }"#,
        )
        .unwrap();

        assert_eq!(config.url.as_deref(), Some("http://localhost:8000/awp"));
        assert_eq!(config.malformed_payload, Some(MalformedPayloadPolicy::Abort));
        let history = config.state_history.unwrap();
        assert!(history.enabled);
        assert_eq!(history.max_entries, DEFAULT_HISTORY_LIMIT);
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = AgentConfig::parse_str("{ \"url\": }").unwrap_err();
        assert!(matches!(
            err,
            AgentError::Config(ConfigError::InvalidJson { .. })
        ));
    }

    #[test]
    fn test_merge_config() {
        let base = AgentConfig {
            url: Some("http://a".to_string()),
            timeout_ms: Some(1000),
            headers: Some(HashMap::from([("X-A".to_string(), "1".to_string())])),
            ..Default::default()
        };
        let other = AgentConfig {
            url: Some("http://b".to_string()),
            headers: Some(HashMap::from([("X-B".to_string(), "2".to_string())])),
            ..Default::default()
        };

        let merged = base.merge(other);
        assert_eq!(merged.url.as_deref(), Some("http://b"));
        assert_eq!(merged.timeout_ms, Some(1000));
        assert_eq!(merged.headers.map(|h| h.len()), Some(2));
    }

    #[test]
    fn test_env_overrides() {
        let env = HashMap::from([
            ("AGSTREAM_URL", "http://env"),
            ("AGSTREAM_TIMEOUT_MS", "2500"),
        ]);
        let mut config = AgentConfig::default();
        config
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.url.as_deref(), Some("http://env"));
        assert_eq!(config.timeout_ms, Some(2500));
        assert!(config.agent_id.is_none());
    }

    #[test]
    fn test_env_override_rejects_bad_timeout() {
        let mut config = AgentConfig::default();
        let err = config
            .apply_overrides(|name| (name == "AGSTREAM_TIMEOUT_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            AgentError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_file_with_file_reference() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("token.txt"), "secret-token\n").unwrap();
        let path = dir.path().join("agstream.jsonc");
        std::fs::write(
            &path,
            r#"{
                "url": "http://localhost/agent",
                /* read from disk */
                "bearer_token": "{file:token.txt}"
            }"#,
        )
        .unwrap();

        let config = AgentConfig::load_file(&path).await.unwrap();
        assert_eq!(config.bearer_token.as_deref(), Some("secret-token"));
    }

    #[tokio::test]
    async fn test_load_file_missing_reference() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agstream.json");
        std::fs::write(&path, r#"{ "bearer_token": "{file:missing.txt}" }"#).unwrap();

        let err = AgentConfig::load_file(&path).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::Config(ConfigError::FileRefNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_file_missing_env_var() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agstream.json");
        std::fs::write(
            &path,
            r#"{ "url": "{env:AGSTREAM_TEST_SURELY_UNSET_VARIABLE}" }"#,
        )
        .unwrap();

        let err = AgentConfig::load_file(&path).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::Config(ConfigError::EnvVarNotFound { .. })
        ));
    }
}
