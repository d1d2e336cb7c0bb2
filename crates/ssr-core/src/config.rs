use crate::decode::{Decoder, UnknownPolicy};
use crate::error::{Result, SsrError};
use crate::paths;
use crate::symbols::SymbolTable;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// JobConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default = "default_job_name")]
    pub name: String,
    #[serde(default = "default_task_type")]
    pub task_type: String,
}

fn default_job_name() -> String {
    "Decode Suspension Reasons".to_string()
}

fn default_task_type() -> String {
    "ETL".to_string()
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            name: default_job_name(),
            task_type: default_task_type(),
        }
    }
}

// ---------------------------------------------------------------------------
// DecodeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeConfig {
    #[serde(default)]
    pub unknown_policy: UnknownPolicy,
    #[serde(default = "default_case_insensitive")]
    pub case_insensitive: bool,
}

fn default_case_insensitive() -> bool {
    true
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            unknown_policy: UnknownPolicy::default(),
            case_insensitive: default_case_insensitive(),
        }
    }
}

impl DecodeConfig {
    pub fn decoder(&self) -> Decoder {
        Decoder::new(SymbolTable::builtin())
            .with_policy(self.unknown_policy)
            .with_case_insensitive(self.case_insensitive)
    }
}

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// redb file; relative to the project root. Defaults to `.ssr/registry.redb`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl RegistryConfig {
    pub fn resolved_path(&self, root: &Path) -> PathBuf {
        match &self.path {
            Some(p) => paths::resolve(root, p),
            None => paths::registry_path(root),
        }
    }
}

// ---------------------------------------------------------------------------
// SourceConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Upstream schema or fixture set name, e.g. `baseball_stagingus`.
    pub name: String,
    /// Encoding table this source reconciles into, e.g. `mlb_sit_views`.
    pub namespace: String,
    /// Fixture directory, fixture file or code list; relative to the root.
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookback_hours: Option<u32>,
}

// ---------------------------------------------------------------------------
// ReportingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Dashboard webhook. Without one, reports go to the log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub include_encodings: bool,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub job: JobConfig,
    #[serde(default)]
    pub decode: DecodeConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub reporting: ReportingConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            job: JobConfig::default(),
            decode: DecodeConfig::default(),
            registry: RegistryConfig::default(),
            sources: Vec::new(),
            reporting: ReportingConfig::default(),
        }
    }
}

impl Config {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(SsrError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn source(&self, name: &str) -> Result<&SourceConfig> {
        self.sources
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| SsrError::SourceNotFound(name.to_string()))
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.name.as_str()) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("duplicate source name '{}'", source.name),
                });
            }
            if paths::validate_namespace(&source.namespace).is_err() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!(
                        "source '{}' has invalid namespace '{}'",
                        source.name, source.namespace
                    ),
                });
            }
            if source.path.as_os_str().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("source '{}' has an empty path", source.name),
                });
            }
        }

        if self.sources.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "no sources configured; 'ssr run' has nothing to do".to_string(),
            });
        }

        if let Some(endpoint) = &self.reporting.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("reporting.endpoint '{endpoint}' is not an http(s) URL"),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source(name: &str, namespace: &str) -> SourceConfig {
        SourceConfig {
            name: name.to_string(),
            namespace: namespace.to_string(),
            path: PathBuf::from("data"),
            lookback_hours: None,
        }
    }

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.job.task_type, "ETL");
        assert_eq!(parsed.decode.unknown_policy, UnknownPolicy::Substitute);
    }

    #[test]
    fn minimal_yaml_fills_defaults() {
        let cfg: Config = serde_yaml::from_str(
            "sources:\n  - name: baseball_stagingus\n    namespace: mlb_sit_views\n    path: data/mlb\n",
        )
        .unwrap();
        assert_eq!(cfg.sources.len(), 1);
        assert!(cfg.decode.case_insensitive);
        assert!(cfg.reporting.endpoint.is_none());
    }

    #[test]
    fn only_consumed_sections_are_written() {
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        assert!(!yaml.contains("poll"), "{yaml}");

        // configs written by older versions still load
        let cfg: Config = serde_yaml::from_str("poll:\n  interval_ms: 0\n").unwrap();
        assert!(cfg.validate().iter().all(|w| w.level == WarnLevel::Warning));
    }

    #[test]
    fn unknown_policy_yaml_is_snake_case() {
        let cfg: Config = serde_yaml::from_str("decode:\n  unknown_policy: reject\n").unwrap();
        assert_eq!(cfg.decode.unknown_policy, UnknownPolicy::Reject);
        assert_eq!(cfg.decode.decoder().policy(), UnknownPolicy::Reject);
    }

    #[test]
    fn load_missing_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(SsrError::NotInitialized)
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.sources.push(source("baseball_stagingus", "mlb_sit_views"));
        cfg.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.source("baseball_stagingus").unwrap().namespace, "mlb_sit_views");
        assert!(loaded.source("missing").is_err());
    }

    #[test]
    fn registry_path_defaults_under_ssr_dir() {
        let root = Path::new("/tmp/proj");
        assert_eq!(
            RegistryConfig::default().resolved_path(root),
            PathBuf::from("/tmp/proj/.ssr/registry.redb")
        );
        let custom = RegistryConfig {
            path: Some(PathBuf::from("state/enc.redb")),
        };
        assert_eq!(
            custom.resolved_path(root),
            PathBuf::from("/tmp/proj/state/enc.redb")
        );
    }

    #[test]
    fn validate_flags_problems() {
        let mut cfg = Config::default();
        cfg.sources.push(source("a", "mlb_sit_views"));
        cfg.sources.push(source("a", "Bad Namespace"));
        cfg.reporting.endpoint = Some("ftp://dashboard".into());

        let warnings = cfg.validate();
        let messages: Vec<&str> = warnings.iter().map(|w| w.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("duplicate source name 'a'")));
        assert!(messages.iter().any(|m| m.contains("invalid namespace")));
        assert!(messages.iter().any(|m| m.contains("not an http(s) URL")));
    }

    #[test]
    fn validate_clean_config() {
        let mut cfg = Config::default();
        cfg.sources.push(source("baseball_stagingus", "mlb_sit_views"));
        assert!(cfg.validate().is_empty());
    }
}
