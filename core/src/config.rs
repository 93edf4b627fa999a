//! Run configuration.
//!
//! Defaults are overlaid by an optional JSON file (`GOREST_CONFIG`) and then
//! by individual environment variables. The resulting values are passed
//! explicitly to the executor and the suites; nothing is read from the
//! environment after start-up.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://gorest.co.in";

/// What the executor needs: where to send requests and with which credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub token: Option<String>,
    #[serde(with = "secs")]
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Whether a test case stops checking at its first failed expectation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    #[default]
    FirstFailure,
    CollectAll,
}

impl std::str::FromStr for FailureMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" | "first_failure" => Ok(FailureMode::FirstFailure),
            "all" | "collect_all" => Ok(FailureMode::CollectAll),
            _ => Err(ConfigError::InvalidValue {
                key: "GOREST_FAILURE_MODE",
                value: s.to_string(),
            }),
        }
    }
}

/// Per-suite field values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    pub user_name: String,
    pub renamed_user_name: String,
    pub gender: String,
    /// Local part of generated emails; a unique suffix is appended per use.
    pub email_prefix: String,
    pub email_domain: String,
    pub post_title: String,
    pub post_body: String,
    pub comment_body: String,
    pub todo_title_completed: String,
    pub todo_title_pending: String,
    pub due_on: String,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            user_name: "Mark Robinson".to_string(),
            renamed_user_name: "Pablo Robinson".to_string(),
            gender: "male".to_string(),
            email_prefix: "mark.robinson".to_string(),
            email_domain: "example.com".to_string(),
            post_title: "This is a Post title".to_string(),
            post_body: "This body means post was created successfully".to_string(),
            comment_body: "This is a comment in the created post".to_string(),
            todo_title_completed: "This todo must be completed".to_string(),
            todo_title_pending: "This todo must be pending".to_string(),
            due_on: "2025-08-14".to_string(),
        }
    }
}

impl FixtureConfig {
    /// Fresh address; the remote service rejects reused emails.
    pub fn unique_email(&self) -> String {
        format!(
            "{}.{}@{}",
            self.email_prefix,
            Uuid::new_v4().simple(),
            self.email_domain
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    pub client: ClientConfig,
    pub failure_mode: FailureMode,
    /// `1` runs sequentially; more enables the worker pool.
    pub workers: usize,
    pub fixtures: FixtureConfig,
    /// Where the JSON report is written, if anywhere.
    pub report_path: Option<PathBuf>,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            failure_mode: FailureMode::default(),
            workers: 1,
            fixtures: FixtureConfig::default(),
            report_path: None,
        }
    }
}

impl SuiteConfig {
    /// Defaults, then `GOREST_CONFIG`, then individual variables.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("GOREST_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        base.apply_env(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Overlay variables from `lookup`, which stands in for the environment.
    pub fn apply_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(url) = lookup("GOREST_BASE_URL") {
            self.client.base_url = url;
        }
        if let Some(token) = lookup("GOREST_TOKEN") {
            self.client.token = Some(token).filter(|t| !t.trim().is_empty());
        }
        if let Some(raw) = lookup("GOREST_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "GOREST_TIMEOUT_SECS",
                value: raw.clone(),
            })?;
            self.client.timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup("GOREST_WORKERS") {
            self.workers = match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "GOREST_WORKERS",
                        value: raw,
                    })
                }
            };
        }
        if let Some(raw) = lookup("GOREST_FAILURE_MODE") {
            self.failure_mode = raw.parse()?;
        }
        if let Some(path) = lookup("GOREST_REPORT").filter(|p| !p.trim().is_empty()) {
            self.report_path = Some(PathBuf::from(path));
        }
        Ok(self)
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_target_the_public_service() {
        let config = SuiteConfig::default();
        assert_eq!(config.client.base_url, "https://gorest.co.in");
        assert!(config.client.token.is_none());
        assert_eq!(config.workers, 1);
        assert_eq!(config.failure_mode, FailureMode::FirstFailure);
        assert!(config.report_path.is_none());
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = SuiteConfig::default()
            .apply_env(env(&[
                ("GOREST_BASE_URL", "http://127.0.0.1:3000"),
                ("GOREST_TOKEN", "abc"),
                ("GOREST_TIMEOUT_SECS", "5"),
                ("GOREST_WORKERS", "4"),
                ("GOREST_FAILURE_MODE", "all"),
            ]))
            .unwrap();
        assert_eq!(config.client.base_url, "http://127.0.0.1:3000");
        assert_eq!(config.client.token.as_deref(), Some("abc"));
        assert_eq!(config.client.timeout, Duration::from_secs(5));
        assert_eq!(config.workers, 4);
        assert_eq!(config.failure_mode, FailureMode::CollectAll);
    }

    #[test]
    fn report_path_comes_from_file_or_environment() {
        let config: SuiteConfig =
            serde_json::from_str(r#"{"report_path":"out/run.json"}"#).unwrap();
        assert_eq!(config.report_path, Some(PathBuf::from("out/run.json")));

        let config = config
            .apply_env(env(&[("GOREST_REPORT", "/tmp/report.json")]))
            .unwrap();
        assert_eq!(config.report_path, Some(PathBuf::from("/tmp/report.json")));

        let config = SuiteConfig::default()
            .apply_env(env(&[("GOREST_REPORT", "")]))
            .unwrap();
        assert!(config.report_path.is_none());
    }

    #[test]
    fn blank_token_means_no_token() {
        let config = SuiteConfig::default()
            .apply_env(env(&[("GOREST_TOKEN", "  ")]))
            .unwrap();
        assert!(config.client.token.is_none());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let err = SuiteConfig::default()
            .apply_env(env(&[("GOREST_WORKERS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "GOREST_WORKERS", .. }));
    }

    #[test]
    fn bad_failure_mode_is_rejected() {
        assert!("sometimes".parse::<FailureMode>().is_err());
        assert_eq!("first".parse::<FailureMode>().unwrap(), FailureMode::FirstFailure);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: SuiteConfig =
            serde_json::from_str(r#"{"client":{"base_url":"http://x","timeout":2},"workers":3}"#)
                .unwrap();
        assert_eq!(config.client.base_url, "http://x");
        assert_eq!(config.client.timeout, Duration::from_secs(2));
        assert_eq!(config.workers, 3);
        assert_eq!(config.fixtures.user_name, "Mark Robinson");
    }

    #[test]
    fn unique_emails_differ() {
        let fixtures = FixtureConfig::default();
        let a = fixtures.unique_email();
        let b = fixtures.unique_email();
        assert_ne!(a, b);
        assert!(a.starts_with("mark.robinson."));
        assert!(a.ends_with("@example.com"));
    }
}
