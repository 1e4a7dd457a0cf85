// Select -> execute -> report, with the report phase strictly after execution.

use crate::config::{Config, ProfileConfig};
use crate::execution::{
    run_tests, EngineId, ExampleEngine, ExecutionContext, ExecutionEngine, ExecutionSettings,
    PropertyEngine, TestRunResult,
};
use crate::report::{HtmlReportEmitter, ReportEmitter, ReportError, ReportManifest};
use crate::selection::{select_targets, ArtifactCatalog, ArtifactName, InclusionRuleset};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Selecting,
    Executing,
    ReportPending,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Idle => "idle",
            PipelineState::Selecting => "selecting",
            PipelineState::Executing => "executing",
            PipelineState::ReportPending => "report-pending",
            PipelineState::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub enum ReportOutcome {
    Written(ReportManifest),
    Skipped(String),
    Failed(ReportError),
}

#[derive(Debug)]
pub struct PipelineOutcome {
    pub selected: BTreeSet<ArtifactName>,
    pub results: TestRunResult,
    pub report: ReportOutcome,
}

impl PipelineOutcome {
    pub fn tests_passed(&self) -> bool {
        self.results.all_passed()
    }

    /// 0 on success, 1 when any test failed, 2 when only the report failed.
    pub fn exit_code(&self) -> u8 {
        if !self.tests_passed() {
            1
        } else if matches!(self.report, ReportOutcome::Failed(_)) {
            2
        } else {
            0
        }
    }
}

/// Where and whether the report phase writes.
#[derive(Debug, Clone)]
pub struct ReportPlan {
    pub enabled: bool,
    pub destination: PathBuf,
    /// Emit even when tests failed.
    pub on_failure: bool,
}

pub struct Pipeline {
    ruleset: InclusionRuleset,
    engines: Vec<Arc<dyn ExecutionEngine>>,
    emitter: Arc<dyn ReportEmitter>,
    report: ReportPlan,
    settings: ExecutionSettings,
    runner: Vec<String>,
    state: PipelineState,
    transitions: Vec<PipelineState>,
}

/// Instantiate the configured engines in the profile's order.
pub fn build_engines(config: &Config, profile: &ProfileConfig) -> Vec<Arc<dyn ExecutionEngine>> {
    let exec = &config.execution;
    profile
        .engines
        .iter()
        .map(|id| -> Arc<dyn ExecutionEngine> {
            match id {
                EngineId::Example => Arc::new(ExampleEngine::new(exec.property_marker.clone())),
                EngineId::Property => Arc::new(
                    PropertyEngine::new(exec.property_marker.clone(), exec.property_cases, exec.seed)
                        .with_parameter_names(profile.retain_parameter_names),
                ),
            }
        })
        .collect()
}

impl Pipeline {
    pub fn new(
        ruleset: InclusionRuleset,
        engines: Vec<Arc<dyn ExecutionEngine>>,
        emitter: Arc<dyn ReportEmitter>,
        report: ReportPlan,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            ruleset,
            engines,
            emitter,
            report,
            settings,
            runner: Vec::new(),
            state: PipelineState::Idle,
            transitions: vec![PipelineState::Idle],
        }
    }

    /// Validate the configuration and wire up the named profile.
    /// Malformed globs surface here, before anything runs.
    pub fn from_config(config: &Config, profile_name: &str) -> Result<Self> {
        config.validate()?;
        let profile = config.profile(profile_name)?;
        let ruleset = InclusionRuleset::compile(&profile.include)
            .with_context(|| format!("Profile `{}` has an invalid include pattern", profile_name))?;
        let engines = build_engines(config, &profile);
        let emitter = Arc::new(HtmlReportEmitter::new(profile.report.options()));
        let report = ReportPlan {
            enabled: profile.report.enabled,
            destination: config.report_destination(&profile),
            on_failure: config.execution.continue_on_failure,
        };
        let mut pipeline = Self::new(ruleset, engines, emitter, report, config.execution.settings());
        pipeline.runner = config.execution.runner.clone();
        Ok(pipeline)
    }

    pub fn with_runner(mut self, runner: Vec<String>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_settings(mut self, settings: ExecutionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn disable_report(&mut self) {
        self.report.enabled = false;
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn transitions(&self) -> &[PipelineState] {
        &self.transitions
    }

    pub fn ruleset(&self) -> &InclusionRuleset {
        &self.ruleset
    }

    fn enter(&mut self, next: PipelineState) {
        tracing::debug!(from = %self.state, to = %next, "pipeline transition");
        self.state = next;
        self.transitions.push(next);
    }

    pub fn select(&self, catalog: &ArtifactCatalog) -> BTreeSet<ArtifactName> {
        select_targets(&catalog.names(), &self.ruleset)
    }

    /// Report writing is blocking file IO; keep it off the async workers.
    async fn emit(&self, results: &TestRunResult) -> Result<ReportManifest, ReportError> {
        let emitter = self.emitter.clone();
        let destination = self.report.destination.clone();
        let results = results.clone();
        tokio::task::spawn_blocking(move || emitter.emit(&results, &destination))
            .await
            .map_err(|e| ReportError::Aborted(e.to_string()))?
    }

    /// Run the whole pipeline once. Test failures never abort it; they are
    /// carried in the outcome next to the report result.
    ///
    /// Every call starts over from `Idle`, so `transitions()` describes the
    /// latest run only.
    pub async fn run(&mut self, catalog: &ArtifactCatalog) -> PipelineOutcome {
        self.state = PipelineState::Idle;
        self.transitions = vec![PipelineState::Idle];
        self.enter(PipelineState::Selecting);
        let selected = self.select(catalog);
        tracing::info!(available = catalog.len(), selected = selected.len(), "targets selected");

        self.enter(PipelineState::Executing);
        let scratch_dir = std::env::temp_dir().join(format!(
            "suite-runner-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        if let Err(e) = std::fs::create_dir_all(&scratch_dir) {
            tracing::warn!(dir = %scratch_dir.display(), error = %e, "could not create scratch dir; coverage files will be lost");
        }
        let ctx = Arc::new(ExecutionContext::new(self.runner.clone(), scratch_dir.clone()));
        let results = run_tests(&selected, catalog, &self.engines, ctx, &self.settings).await;
        if let Err(e) = std::fs::remove_dir_all(&scratch_dir) {
            tracing::debug!(dir = %scratch_dir.display(), error = %e, "could not remove scratch dir");
        }

        self.enter(PipelineState::ReportPending);
        let report = if !self.report.enabled {
            ReportOutcome::Skipped("reporting disabled".to_string())
        } else if !results.all_passed() && !self.report.on_failure {
            ReportOutcome::Skipped("tests failed".to_string())
        } else {
            match self.emit(&results).await {
                Ok(manifest) => ReportOutcome::Written(manifest),
                Err(e) => {
                    tracing::error!(dir = %self.report.destination.display(), error = %e, "report emission failed");
                    ReportOutcome::Failed(e)
                }
            }
        };

        // A failed emission leaves the pipeline in ReportPending.
        if !matches!(report, ReportOutcome::Failed(_)) {
            self.enter(PipelineState::Done);
        }

        PipelineOutcome {
            selected,
            results,
            report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{CaseResult, EngineError, EngineReport};
    use crate::selection::Artifact;
    use async_trait::async_trait;
    use std::path::Path;

    struct PassingEngine;

    #[async_trait]
    impl ExecutionEngine for PassingEngine {
        fn id(&self) -> EngineId {
            EngineId::Example
        }

        async fn discover(
            &self,
            _artifact: &Artifact,
            _ctx: &ExecutionContext,
        ) -> Result<Vec<String>, EngineError> {
            Ok(vec!["works".to_string()])
        }

        async fn execute(
            &self,
            _artifact: &Artifact,
            cases: &[String],
            _ctx: &ExecutionContext,
        ) -> Result<EngineReport, EngineError> {
            Ok(EngineReport {
                cases: cases.iter().map(|c| CaseResult::passed(c.clone())).collect(),
                exit_ok: true,
                detail: None,
            })
        }
    }

    struct FailingEmitter;

    impl ReportEmitter for FailingEmitter {
        fn emit(&self, _: &TestRunResult, destination: &Path) -> Result<ReportManifest, ReportError> {
            Err(ReportError::MissingParent(destination.to_path_buf()))
        }
    }

    fn catalog(names: &[&str]) -> ArtifactCatalog {
        let mut catalog = ArtifactCatalog::new();
        for n in names {
            catalog.insert(ArtifactName::new(*n).unwrap(), PathBuf::from(n));
        }
        catalog
    }

    fn pipeline(emitter: Arc<dyn ReportEmitter>, enabled: bool) -> Pipeline {
        Pipeline::new(
            InclusionRuleset::default(),
            vec![Arc::new(PassingEngine)],
            emitter,
            ReportPlan {
                enabled,
                destination: PathBuf::from("unused"),
                on_failure: true,
            },
            ExecutionSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_skipped_report_reaches_done() {
        let mut p = pipeline(Arc::new(FailingEmitter), false);
        let outcome = p.run(&catalog(&["FooTest", "BarHelper"])).await;

        assert_eq!(outcome.selected.len(), 1);
        assert!(matches!(outcome.report, ReportOutcome::Skipped(_)));
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(
            p.transitions(),
            &[
                PipelineState::Idle,
                PipelineState::Selecting,
                PipelineState::Executing,
                PipelineState::ReportPending,
                PipelineState::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_report_stays_pending() {
        let mut p = pipeline(Arc::new(FailingEmitter), true);
        let outcome = p.run(&catalog(&["FooTest"])).await;

        assert!(outcome.tests_passed());
        assert!(matches!(outcome.report, ReportOutcome::Failed(_)));
        assert_eq!(outcome.exit_code(), 2);
        assert_eq!(p.state(), PipelineState::ReportPending);
    }

    struct PanickingEmitter;

    impl ReportEmitter for PanickingEmitter {
        fn emit(&self, _: &TestRunResult, _: &Path) -> Result<ReportManifest, ReportError> {
            panic!("renderer bug");
        }
    }

    #[tokio::test]
    async fn test_emitter_panic_becomes_report_failure() {
        let mut p = pipeline(Arc::new(PanickingEmitter), true);
        let outcome = p.run(&catalog(&["FooTest"])).await;

        assert!(matches!(outcome.report, ReportOutcome::Failed(ReportError::Aborted(_))));
        assert!(outcome.tests_passed());
        assert_eq!(outcome.exit_code(), 2);
        assert_eq!(p.state(), PipelineState::ReportPending);
    }

    #[tokio::test]
    async fn test_rerun_starts_from_idle() {
        let mut p = pipeline(Arc::new(FailingEmitter), false);
        let names = catalog(&["FooTest"]);
        p.run(&names).await;
        let outcome = p.run(&names).await;

        assert_eq!(outcome.selected.len(), 1);
        assert_eq!(p.transitions().len(), 5);
        assert_eq!(p.transitions()[0], PipelineState::Idle);
        assert_eq!(p.state(), PipelineState::Done);
    }

    #[test]
    fn test_from_config_rejects_malformed_glob() {
        let config: Config = toml::from_str(
            r#"
            [profiles.coverage]
            include = ["Foo**Test"]
            "#,
        )
        .unwrap();
        assert!(Pipeline::from_config(&config, "coverage").is_err());
    }

    #[test]
    fn test_from_config_builds_engines_in_order() {
        let config = Config::default();
        let profile = config.profile("coverage").unwrap();
        let ids: Vec<EngineId> = build_engines(&config, &profile).iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec![EngineId::Property, EngineId::Example]);
    }
}
