//! Deployment configuration files (TOML or JSON)

use anyhow::{Context, Result, bail};
use manifest::FileManifest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::deployment::DeploymentSpec;
use crate::error::ReconcileError;
use crate::paths;

/// Script timeout when none is configured
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// One deployment as written in a configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentConfig {
    pub name: String,
    pub deploy_path: String,
    pub owner: String,
    /// Path of the script among `files`
    pub script: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub environment: Vec<String>,
    pub audit_params: Vec<String>,
    pub apply_params: Vec<String>,
    #[serde(default)]
    pub change_codes: Vec<i32>,
    #[serde(default)]
    pub warning_codes: Vec<i32>,
    /// Managed files, in declaration order
    #[serde(default)]
    pub files: Vec<FileConfig>,
}

/// A managed file: inline `content` or a `source` file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub path: String,
    #[serde(default)]
    pub content: Option<String>,
    /// Read relative to the configuration file's directory
    #[serde(default)]
    pub source: Option<String>,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Supported configuration formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Format from a file extension; anything but `.json` is TOML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}

impl DeploymentConfig {
    /// Read and parse a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!(
                "Config file not found: {}\nPass --config or create it",
                path.display()
            );
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;

        Self::parse(&content, ConfigFormat::from_path(path))
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        match format {
            ConfigFormat::Toml => toml::from_str(content).context("Invalid TOML format"),
            ConfigFormat::Json => serde_json::from_str(content).context("Invalid JSON format"),
        }
    }

    /// Convert to a validated spec and manifest
    ///
    /// `base_dir` resolves relative `source` paths.
    pub fn into_parts(
        self,
        base_dir: &Path,
    ) -> std::result::Result<(DeploymentSpec, FileManifest), ReconcileError> {
        let name = self.name.clone();
        let mut manifest = FileManifest::new();

        for file in &self.files {
            let content = match (&file.content, &file.source) {
                (Some(content), None) => content.clone(),
                (None, Some(source)) => read_source(&name, base_dir, source)?,
                (Some(_), Some(_)) => {
                    return Err(ReconcileError::config(
                        &name,
                        format!("file `{}` has both content and source", file.path),
                    ));
                }
                (None, None) => {
                    return Err(ReconcileError::config(
                        &name,
                        format!("file `{}` needs content or source", file.path),
                    ));
                }
            };
            manifest
                .insert(file.path.clone(), content)
                .map_err(|e| ReconcileError::from_manifest(&name, e))?;
        }

        let spec = DeploymentSpec {
            name: self.name,
            deploy_path: paths::expand(&self.deploy_path),
            owner: self.owner,
            script_name: self.script,
            timeout_seconds: self.timeout,
            environment: self.environment,
            audit_params: self.audit_params,
            apply_params: self.apply_params,
            change_codes: self.change_codes.into_iter().collect::<BTreeSet<_>>(),
            warning_codes: self.warning_codes.into_iter().collect::<BTreeSet<_>>(),
        };
        spec.validate(&manifest)?;

        Ok((spec, manifest))
    }
}

fn read_source(
    resource: &str,
    base_dir: &Path,
    source: &str,
) -> std::result::Result<String, ReconcileError> {
    let path = resolve_source(base_dir, source);
    fs::read_to_string(&path)
        .map_err(|e| ReconcileError::io(resource, "failed to read source", path, e))
}

fn resolve_source(base_dir: &Path, source: &str) -> PathBuf {
    let expanded = paths::expand(source);
    if expanded.is_absolute() {
        expanded
    } else {
        base_dir.join(expanded)
    }
}

/// Load a configuration file into a spec and manifest
pub fn load_deployment(path: &Path) -> Result<(DeploymentSpec, FileManifest)> {
    let config = DeploymentConfig::load(path)?;
    let base_dir = path.parent().unwrap_or(Path::new("."));
    Ok(config.into_parts(base_dir)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r##"
name = "db-maint"
deploy_path = "/opt/db"
owner = "postgres"
script = "check.sh"
audit_params = ["--audit", "settings.conf"]
apply_params = ["--apply", "settings.conf"]
change_codes = [2]
warning_codes = [3]
environment = ["PGHOST=localhost"]

[[files]]
path = "check.sh"
content = "#!/bin/sh\nexit 0"

[[files]]
path = "settings.conf"
source = "settings.conf"
"##;

    #[test]
    fn test_load_toml_with_source() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("settings.conf"), "level = 3\n").unwrap();
        let path = tmp.path().join("deploy.toml");
        fs::write(&path, SAMPLE).unwrap();

        let (spec, manifest) = load_deployment(&path).unwrap();

        assert_eq!(spec.name, "db-maint");
        assert_eq!(spec.timeout_seconds, DEFAULT_TIMEOUT_SECS);
        assert_eq!(spec.change_codes, BTreeSet::from([2]));
        assert_eq!(manifest.paths().collect::<Vec<_>>(), vec!["check.sh", "settings.conf"]);
        assert_eq!(manifest.get("settings.conf").unwrap().content, "level = 3\n");
    }

    #[test]
    fn test_load_json() {
        let json = r##"{
            "name": "web",
            "deploy_path": "/srv/web",
            "owner": "www",
            "script": "run.sh",
            "timeout": 60,
            "audit_params": ["check"],
            "apply_params": ["fix"],
            "files": [{"path": "run.sh", "content": "#!/bin/sh"}]
        }"##;
        let config = DeploymentConfig::parse(json, ConfigFormat::Json).unwrap();
        let (spec, _) = config.into_parts(Path::new("/")).unwrap();
        assert_eq!(spec.timeout_seconds, 60);
        assert!(spec.warning_codes.is_empty());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("a.toml")), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("deploy")), ConfigFormat::Toml);
    }

    #[test]
    fn test_file_needs_exactly_one_content_kind() {
        let mut config = DeploymentConfig::parse(SAMPLE, ConfigFormat::Toml).unwrap();
        config.files[1].source = None;
        let err = config.into_parts(Path::new("/")).unwrap_err();
        assert!(err.to_string().contains("needs content or source"));

        let mut config = DeploymentConfig::parse(SAMPLE, ConfigFormat::Toml).unwrap();
        config.files[0].source = Some("x".into());
        let err = config.into_parts(Path::new("/")).unwrap_err();
        assert!(err.to_string().contains("both"));
    }

    #[test]
    fn test_missing_source_is_io_error() {
        let config = DeploymentConfig::parse(SAMPLE, ConfigFormat::Toml).unwrap();
        let err = config.into_parts(Path::new("/nonexistent-dir")).unwrap_err();
        assert!(matches!(err, ReconcileError::Io { .. }));
        assert!(err.to_string().contains("settings.conf"));
    }

    #[test]
    fn test_invariants_checked_on_load() {
        let mut config = DeploymentConfig::parse(SAMPLE, ConfigFormat::Toml).unwrap();
        config.files.truncate(1);
        config.script = "absent.sh".into();
        let err = config.into_parts(Path::new("/")).unwrap_err();
        assert!(matches!(err, ReconcileError::Configuration { .. }));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = DeploymentConfig::parse("name = \"x\"\nbogus = 1", ConfigFormat::Toml);
        assert!(err.is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let err = DeploymentConfig::load(Path::new("/nonexistent/deploy.toml")).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }
}
