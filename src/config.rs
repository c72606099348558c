use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use searchload_target::TargetConfig;
use serde::{Deserialize, Serialize};

use crate::client::parse_host;

/// User configuration for searchload, stored as `searchload.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchLoadSettings {
    #[serde(default)]
    pub swarm: SwarmSettings,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl SearchLoadSettings {
    /// Load settings from disk, writing defaults if missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Unable to read config at {}", path.display()))?;
            let parsed: Self = toml::from_str(&raw)
                .with_context(|| format!("Malformed config at {}", path.display()))?;
            Ok(parsed)
        } else {
            let settings = Self::default();
            settings.save(path)?;
            Ok(settings)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory {}", parent.display())
            })?;
        }
        let serialised = toml::to_string_pretty(self)?;
        fs::write(path, serialised)
            .with_context(|| format!("Failed to persist config to {}", path.display()))
    }
}

/// How the load-testing framework should drive the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmSettings {
    /// Base URL of the search service under test.
    #[serde(default = "SwarmSettings::default_host")]
    pub host: String,
    /// Number of concurrent simulated users.
    #[serde(default = "SwarmSettings::default_users")]
    pub users: usize,
    /// Users launched per second, as accepted by the framework (e.g. `"0.5"`).
    #[serde(default = "SwarmSettings::default_hatch_rate")]
    pub hatch_rate: String,
    /// Run duration in seconds; 0 runs until interrupted.
    #[serde(default = "SwarmSettings::default_run_time_secs")]
    pub run_time_secs: u64,
    /// Base seed for per-user term selection; random when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl SwarmSettings {
    fn default_host() -> String {
        "http://127.0.0.1:8080".into()
    }

    const fn default_users() -> usize {
        10
    }

    fn default_hatch_rate() -> String {
        "1".into()
    }

    const fn default_run_time_secs() -> u64 {
        60
    }

    pub fn validate(&self) -> Result<()> {
        parse_host(&self.host)?;
        if self.users == 0 {
            bail!("swarm needs at least one user");
        }
        let hatch_rate: f64 = self
            .hatch_rate
            .trim()
            .parse()
            .with_context(|| format!("hatch rate '{}' is not a number", self.hatch_rate))?;
        if !(hatch_rate.is_finite() && hatch_rate > 0.0) {
            bail!("hatch rate must be positive, got {}", self.hatch_rate);
        }
        Ok(())
    }
}

impl Default for SwarmSettings {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            users: Self::default_users(),
            hatch_rate: Self::default_hatch_rate(),
            run_time_secs: Self::default_run_time_secs(),
            seed: None,
        }
    }
}

/// Opt-in run telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub buffer_dir: Option<PathBuf>,
    #[serde(default)]
    pub max_buffer_bytes: Option<u64>,
    #[serde(default)]
    pub traces: TraceSettings,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            buffer_dir: None,
            max_buffer_bytes: Some(512 * 1024),
            traces: TraceSettings::default(),
        }
    }
}

/// Controls structured tracing export to JSON files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "TraceSettings::default_max_files")]
    pub max_files: usize,
}

impl TraceSettings {
    const fn default_max_files() -> usize {
        10
    }
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: None,
            max_files: Self::default_max_files(),
        }
    }
}

pub(crate) fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "searchload", "SearchLoad")
        .context("Unable to resolve platform directories")
}

/// Compute the default path to the configuration file.
pub fn default_config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("searchload.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_describe_a_local_run() {
        let settings = SearchLoadSettings::default();
        assert_eq!(settings.swarm.host, "http://127.0.0.1:8080");
        assert_eq!(settings.swarm.users, 10);
        assert_eq!(settings.swarm.hatch_rate, "1");
        assert_eq!(settings.swarm.run_time_secs, 60);
        assert_eq!(settings.target.listen, "127.0.0.1:8080");
        assert!(!settings.telemetry.enabled);
        assert_eq!(settings.telemetry.traces.max_files, 10);
        settings.swarm.validate().expect("defaults are valid");
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("searchload.toml");

        let settings = SearchLoadSettings::load_or_default(&path).expect("load");
        assert_eq!(settings, SearchLoadSettings::default());
        assert!(path.exists());

        let reloaded = SearchLoadSettings::load_or_default(&path).expect("reload");
        assert_eq!(reloaded, settings);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("searchload.toml");
        fs::write(
            &path,
            r#"
[swarm]
host = "http://search.internal:9000"
users = 250
seed = 17

[target]
catalog_size = 5000
"#,
        )
        .expect("write config");

        let settings = SearchLoadSettings::load_or_default(&path).expect("load");
        assert_eq!(settings.swarm.host, "http://search.internal:9000");
        assert_eq!(settings.swarm.users, 250);
        assert_eq!(settings.swarm.seed, Some(17));
        assert_eq!(settings.swarm.hatch_rate, "1");
        assert_eq!(settings.target.catalog_size, 5000);
        assert_eq!(settings.target.listen, "127.0.0.1:8080");
        assert!(settings.target.metrics);
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("searchload.toml");
        fs::write(&path, "[swarm]\nusers = \"many\"\n").expect("write config");

        let error = SearchLoadSettings::load_or_default(&path).unwrap_err();
        assert!(error.to_string().contains("Malformed config"));
    }

    #[test]
    fn swarm_validation_rejects_bad_values() {
        let mut settings = SwarmSettings::default();
        settings.users = 0;
        assert!(settings.validate().is_err());

        let mut settings = SwarmSettings::default();
        settings.hatch_rate = "fast".into();
        assert!(settings.validate().is_err());

        let mut settings = SwarmSettings::default();
        settings.hatch_rate = "0".into();
        assert!(settings.validate().is_err());

        let mut settings = SwarmSettings::default();
        settings.host = "localhost".into();
        assert!(settings.validate().is_err());

        let mut settings = SwarmSettings::default();
        settings.hatch_rate = "0.5".into();
        assert!(settings.validate().is_ok());
    }
}
