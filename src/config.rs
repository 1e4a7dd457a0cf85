use crate::execution::{EngineId, ExecutionSettings};
use crate::report::ReportOptions;
use crate::selection::{InclusionRuleset, DEFAULT_INCLUDE};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "suite.toml";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Defaults to the directory holding the config file.
    #[serde(default)]
    pub project_root: Option<PathBuf>,
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    #[serde(default = "default_profile_name")]
    pub default_profile: String,
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(skip, default = "default_base_dir")]
    base_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ProfileConfig {
    #[serde(default = "default_include")]
    pub include: Vec<String>,
    #[serde(default = "default_engines")]
    pub engines: Vec<EngineId>,
    /// Report failing property samples with their parameter names.
    #[serde(default = "default_true")]
    pub retain_parameter_names: bool,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ReportConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_report_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_true")]
    pub create_dirs: bool,
    #[serde(default = "default_true")]
    pub html: bool,
    #[serde(default)]
    pub csv: bool,
    #[serde(default = "default_true")]
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ExecutionConfig {
    /// Concurrent artifacts; defaults to available parallelism.
    pub workers: Option<usize>,
    pub deadline_secs: Option<u64>,
    /// Launcher prefix placed before every artifact path.
    #[serde(default)]
    pub runner: Vec<String>,
    #[serde(default = "default_property_marker")]
    pub property_marker: String,
    #[serde(default = "default_property_cases")]
    pub property_cases: u32,
    pub seed: Option<u64>,
    /// When false, a run with failures skips the report phase.
    #[serde(default = "default_true")]
    pub continue_on_failure: bool,
}

fn default_base_dir() -> PathBuf { PathBuf::from(".") }
fn default_artifact_dir() -> PathBuf { PathBuf::from("target/tests") }
fn default_profile_name() -> String { "coverage".to_string() }
fn default_include() -> Vec<String> { DEFAULT_INCLUDE.iter().map(|p| p.to_string()).collect() }
fn default_engines() -> Vec<EngineId> { vec![EngineId::Property, EngineId::Example] }
fn default_report_dir() -> PathBuf { PathBuf::from("task4/jacocoreport") }
fn default_property_marker() -> String { "prop".to_string() }
fn default_property_cases() -> u32 { 1000 }
fn default_true() -> bool { true }

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: default_report_dir(),
            create_dirs: true,
            html: true,
            csv: false,
            json: true,
        }
    }
}

impl ReportConfig {
    pub fn options(&self) -> ReportOptions {
        ReportOptions {
            create_dirs: self.create_dirs,
            html: self.html,
            csv: self.csv,
            json: self.json,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            workers: None,
            deadline_secs: None,
            runner: Vec::new(),
            property_marker: default_property_marker(),
            property_cases: default_property_cases(),
            seed: None,
            continue_on_failure: true,
        }
    }
}

impl ExecutionConfig {
    pub fn settings(&self) -> ExecutionSettings {
        let mut settings = ExecutionSettings::default();
        if let Some(workers) = self.workers {
            settings.workers = workers;
        }
        settings.deadline = self.deadline_secs.map(Duration::from_secs);
        settings
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_root: None,
            artifact_dir: default_artifact_dir(),
            default_profile: default_profile_name(),
            profiles: BTreeMap::new(),
            execution: ExecutionConfig::default(),
            base_dir: default_base_dir(),
        }
    }
}

impl Config {
    /// The two shipped profiles: one reporting coverage over all five
    /// suffixes, one without reporting and without `*Fixed`.
    pub fn builtin_profiles() -> BTreeMap<String, ProfileConfig> {
        let coverage = ProfileConfig {
            include: default_include(),
            engines: default_engines(),
            retain_parameter_names: true,
            report: ReportConfig::default(),
        };
        let plain = ProfileConfig {
            include: ["*Properties", "*Test", "*Tests", "*PBT"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            engines: default_engines(),
            retain_parameter_names: true,
            report: ReportConfig {
                enabled: false,
                ..ReportConfig::default()
            },
        };
        BTreeMap::from([
            ("coverage".to_string(), coverage),
            ("plain".to_string(), plain),
        ])
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config TOML: {}", path.display()))?;
        config.base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(default_base_dir);
        Ok(config)
    }

    /// Like `load`, but a missing file means built-in defaults rooted at its directory.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        let mut config = Self::default();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.base_dir = parent.to_path_buf();
        }
        Ok(config)
    }

    /// Built-in profiles overlaid with the ones declared in the file.
    pub fn profiles(&self) -> BTreeMap<String, ProfileConfig> {
        let mut all = Self::builtin_profiles();
        all.extend(self.profiles.clone());
        all
    }

    pub fn profile(&self, name: &str) -> Result<ProfileConfig> {
        self.profiles().remove(name).with_context(|| {
            let known: Vec<String> = self.profiles().into_keys().collect();
            format!("Unknown profile `{}` (known: {})", name, known.join(", "))
        })
    }

    pub fn project_root(&self) -> PathBuf {
        match &self.project_root {
            Some(root) => self.base_dir.join(root),
            None => self.base_dir.clone(),
        }
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.project_root().join(&self.artifact_dir)
    }

    /// Absolute output directories are kept; relative ones hang off the project root.
    pub fn report_destination(&self, profile: &ProfileConfig) -> PathBuf {
        self.project_root().join(&profile.report.output_dir)
    }

    /// Fail fast on anything that would break a run before it starts.
    pub fn validate(&self) -> Result<()> {
        for (name, profile) in self.profiles() {
            InclusionRuleset::compile(&profile.include)
                .with_context(|| format!("Profile `{}` has an invalid include pattern", name))?;
            if profile.engines.is_empty() {
                anyhow::bail!("Profile `{}` enables no engines", name);
            }
            let mut seen = profile.engines.clone();
            seen.sort();
            seen.dedup();
            if seen.len() != profile.engines.len() {
                anyhow::bail!("Profile `{}` lists an engine twice", name);
            }
        }
        if !self.profiles().contains_key(&self.default_profile) {
            anyhow::bail!("default_profile `{}` is not defined", self.default_profile);
        }
        if self.execution.workers == Some(0) {
            anyhow::bail!("execution.workers must be at least 1");
        }
        if self.execution.property_marker.is_empty() {
            anyhow::bail!("execution.property_marker must not be empty");
        }
        if self.execution.property_cases == 0 {
            anyhow::bail!("execution.property_cases must be at least 1");
        }
        Ok(())
    }
}
