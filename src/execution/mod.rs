pub mod coverage;
pub mod example;
pub mod libtest;
pub mod property;
pub mod runner;

pub use coverage::{CoverageAccumulator, CoverageData, FileCoverage};
pub use example::ExampleEngine;
pub use property::PropertyEngine;
pub use runner::{
    run_tests, ArtifactOutcome, EngineRun, ExecutionSettings, RunStatus, RunSummary, TestRunResult,
};

use crate::selection::{Artifact, ArtifactName};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of a pluggable execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineId {
    /// Assertion-based example tests.
    #[serde(alias = "junit-jupiter")]
    Example,
    /// Property-based tests.
    #[serde(alias = "jqwik")]
    Property,
}

impl EngineId {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineId::Example => "example",
            EngineId::Property => "property",
        }
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Passed,
    Failed,
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseResult {
    pub name: String,
    pub status: CaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Named parameter values of a failing property sample.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<String>,
}

impl CaseResult {
    pub fn passed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CaseStatus::Passed,
            message: None,
            parameters: None,
        }
    }

    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CaseStatus::Failed,
            message: Some(message.into()),
            parameters: None,
        }
    }
}

/// What an engine observed for one artifact.
#[derive(Debug, Clone, Default)]
pub struct EngineReport {
    pub cases: Vec<CaseResult>,
    /// Whether the artifact process itself exited cleanly.
    pub exit_ok: bool,
    pub detail: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to launch {artifact}: {source}")]
    Spawn {
        artifact: ArtifactName,
        #[source]
        source: std::io::Error,
    },
    #[error("test listing for {artifact} failed: {detail}")]
    Discovery { artifact: ArtifactName, detail: String },
}

/// Environment shared by every engine invocation of one run.
#[derive(Debug)]
pub struct ExecutionContext {
    /// Launcher prefix, e.g. `["/bin/sh"]` or an emulator.
    pub runner: Vec<String>,
    pub scratch_dir: PathBuf,
    pub coverage: CoverageAccumulator,
    sequence: AtomicU64,
}

impl ExecutionContext {
    pub fn new(runner: Vec<String>, scratch_dir: PathBuf) -> Self {
        Self {
            runner,
            scratch_dir,
            coverage: CoverageAccumulator::new(),
            sequence: AtomicU64::new(0),
        }
    }

    /// A fresh path for one invocation's coverage output.
    pub fn coverage_slot(&self, artifact: &ArtifactName, engine: EngineId) -> PathBuf {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let flat: String = artifact
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.scratch_dir.join(format!("{}-{}-{}.cov", flat, engine, seq))
    }
}

/// A test engine: discovers the cases it owns inside an artifact, runs them,
/// reports pass/fail and contributes coverage through the context.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    fn id(&self) -> EngineId;

    async fn discover(
        &self,
        artifact: &Artifact,
        ctx: &ExecutionContext,
    ) -> Result<Vec<String>, EngineError>;

    async fn execute(
        &self,
        artifact: &Artifact,
        cases: &[String],
        ctx: &ExecutionContext,
    ) -> Result<EngineReport, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Engines {
        engines: Vec<EngineId>,
    }

    #[test]
    fn test_engine_ids_accept_aliases() {
        let parsed: Engines =
            toml::from_str(r#"engines = ["jqwik", "junit-jupiter", "property", "example"]"#)
                .unwrap();
        assert_eq!(
            parsed.engines,
            vec![
                EngineId::Property,
                EngineId::Example,
                EngineId::Property,
                EngineId::Example
            ]
        );
    }

    #[test]
    fn test_coverage_slots_are_unique() {
        let ctx = ExecutionContext::new(vec![], PathBuf::from("/tmp/x"));
        let name = ArtifactName::new("org/example/FooTest").unwrap();
        let a = ctx.coverage_slot(&name, EngineId::Example);
        let b = ctx.coverage_slot(&name, EngineId::Example);
        assert_ne!(a, b);
        assert!(a.to_string_lossy().contains("org_example_FooTest-example-"));
    }
}
