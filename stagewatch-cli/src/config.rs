//! Daemon configuration file.
//!
//! The file carries optional `[settings]` and the `[workflow]` itself.
//! TOML is the default format; a `.json` extension selects JSON.
//!
//! # Example TOML
//!
//! ```toml
//! [settings]
//! stage_timeout = "30s"
//! http_timeout = "10s"
//! strict_handlers = false
//! change_policy = "identity"
//!
//! [workflow]
//! stages = ["fetch", "detect", "alert"]
//!
//! [[workflow.transitions]]
//! name = "start"
//! from = "start"
//! to = "fetch"
//!
//! [[workflow.tasks]]
//! name = "fetch"
//! func = "http_fetch"
//! url = "https://api.hetzner.cloud/v1/servers"
//! headers = [{ name = "Authorization", value = "Bearer ${HCLOUD_TOKEN}" }]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stagewatch::{WorkflowDefinition, WorkflowError, DEFAULT_STAGE_TIMEOUT};
use stagewatch_store::ChangePolicy;

/// Errors raised while loading or validating the configuration. All of
/// them are fatal to the daemon.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Io {
        source: std::io::Error,
        path: String,
    },

    /// The file is not valid TOML or does not match the expected schema.
    #[error("failed to parse config TOML: {source}")]
    Toml {
        #[from]
        source: toml::de::Error,
    },

    /// The file is not valid JSON or does not match the expected schema.
    #[error("failed to parse config JSON: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// The settings parsed but hold unusable values.
    #[error("config validation error: {message}")]
    Validation { message: String },

    /// The workflow is inconsistent or references missing handlers.
    #[error("invalid workflow: {0}")]
    Workflow(#[from] WorkflowError),

    /// The persistent store could not be opened.
    #[error("failed to open store: {0}")]
    Store(#[from] stagewatch_store::StoreError),

    /// The HTTP client for the fetch handler could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DaemonConfig {
    /// Daemon-wide settings.
    #[serde(default)]
    pub settings: Settings,
    /// The workflow to run on every tick.
    pub workflow: WorkflowDefinition,
}

/// Daemon-wide settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    /// Bound on every handler invocation.
    #[serde(with = "humantime_serde", default = "default_stage_timeout")]
    pub stage_timeout: Duration,
    /// Request timeout of the HTTP fetch handler.
    #[serde(with = "humantime_serde", default = "default_http_timeout")]
    pub http_timeout: Duration,
    /// Refuse to start when a task names a function with no handler.
    #[serde(default)]
    pub strict_handlers: bool,
    /// What counts as a change for the change-detection handlers.
    #[serde(default)]
    pub change_policy: ChangePolicy,
    /// Directory the `write_json` handler writes into.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_stage_timeout() -> Duration {
    DEFAULT_STAGE_TIMEOUT
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            stage_timeout: default_stage_timeout(),
            http_timeout: default_http_timeout(),
            strict_handlers: false,
            change_policy: ChangePolicy::default(),
            output_dir: default_output_dir(),
        }
    }
}

impl DaemonConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a JSON document.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates the file at `path`, choosing the format from its
    /// extension.
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, a parse
    /// error if it is malformed, or a validation error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            source,
            path: path.display().to_string(),
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_toml(&content)
        }
    }

    /// Checks settings and the workflow definition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.settings.stage_timeout.is_zero() {
            return Err(ConfigError::Validation {
                message: "settings.stage_timeout must be greater than zero".to_string(),
            });
        }
        if self.settings.http_timeout.is_zero() {
            return Err(ConfigError::Validation {
                message: "settings.http_timeout must be greater than zero".to_string(),
            });
        }
        self.workflow.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
[workflow]
stages = ["fetch"]

[[workflow.tasks]]
name = "fetch"
func = "http_fetch"
url = "https://api.example/v1/servers"
"#;

    #[test]
    fn settings_default_when_absent() {
        let config = DaemonConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.settings, Settings::default());
        assert_eq!(config.settings.stage_timeout, Duration::from_secs(30));
        assert_eq!(config.workflow.tasks.len(), 1);
    }

    #[test]
    fn humantime_settings_parse() {
        let toml_str = format!(
            "[settings]\nstage_timeout = \"2m\"\nhttp_timeout = \"500ms\"\nstrict_handlers = true\nchange_policy = \"content\"\n{MINIMAL}"
        );
        let config = DaemonConfig::from_toml(&toml_str).unwrap();
        assert_eq!(config.settings.stage_timeout, Duration::from_secs(120));
        assert_eq!(config.settings.http_timeout, Duration::from_millis(500));
        assert!(config.settings.strict_handlers);
        assert_eq!(config.settings.change_policy, ChangePolicy::Content);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let toml_str = format!("[settings]\nstage_timeout = \"0s\"\n{MINIMAL}");
        let err = DaemonConfig::from_toml(&toml_str).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn missing_workflow_is_a_parse_error() {
        let err = DaemonConfig::from_toml("[settings]\nstrict_handlers = true\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }

    #[test]
    fn malformed_request_fails_to_load() {
        let toml_str = r#"
[workflow]
[[workflow.tasks]]
name = "fetch"
func = "http_fetch"
url = "https://api.example/v1/servers"
headers = [{ name = "Authorization" }]
"#;
        let err = DaemonConfig::from_toml(toml_str).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }

    #[test]
    fn workflow_without_start_edge_fails_to_load() {
        let toml_str = r#"
[workflow]
[[workflow.transitions]]
name = "run"
from = "start"
to = "fetch"

[[workflow.tasks]]
name = "fetch"
func = "http_fetch"
"#;
        let err = DaemonConfig::from_toml(toml_str).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Workflow(WorkflowError::UnreachableStart { .. })
        ));
    }

    #[test]
    fn invalid_workflow_is_rejected() {
        let toml_str = r#"
[workflow]
[[workflow.tasks]]
name = "alert"
func = "log_alert"
store = "detect"
"#;
        let err = DaemonConfig::from_toml(toml_str).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Workflow(WorkflowError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn load_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("workflow.json");
        let mut file = std::fs::File::create(&json_path).unwrap();
        write!(
            file,
            r#"{{"workflow": {{"tasks": [{{"name": "fetch", "func": "http_fetch"}}]}}}}"#
        )
        .unwrap();
        let config = DaemonConfig::load(&json_path).unwrap();
        assert_eq!(config.workflow.tasks[0].function_id, "http_fetch");

        let toml_path = dir.path().join("workflow.toml");
        std::fs::write(&toml_path, MINIMAL).unwrap();
        assert!(DaemonConfig::load(&toml_path).is_ok());
    }

    #[test]
    fn shipped_example_is_valid() {
        let config = DaemonConfig::from_toml(include_str!("../stagewatch.example.toml")).unwrap();
        assert!(config.settings.strict_handlers);
        assert_eq!(config.workflow.tasks.len(), 4);
        assert_eq!(config.settings.output_dir, PathBuf::from("/var/tmp"));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = DaemonConfig::load(Path::new("/nonexistent/stagewatch.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/stagewatch.toml"));
    }
}
