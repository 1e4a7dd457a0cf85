use super::{
    CaseResult, CaseStatus, CoverageData, EngineId, EngineReport, ExecutionContext,
    ExecutionEngine,
};
use crate::selection::{Artifact, ArtifactCatalog, ArtifactName};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    /// Artifacts allowed to run at once.
    pub workers: usize,
    /// Overall budget for the whole run; `None` waits indefinitely.
    pub deadline: Option<Duration>,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            deadline: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Passed,
    Failed,
    /// The engine owns no cases in this artifact.
    NoTests,
    /// The artifact could not be launched or listed.
    Errored,
    TimedOut,
}

impl RunStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, RunStatus::Failed | RunStatus::Errored | RunStatus::TimedOut)
    }
}

/// One engine's pass over one artifact.
#[derive(Debug, Clone, Serialize)]
pub struct EngineRun {
    pub engine: EngineId,
    pub status: RunStatus,
    pub cases: Vec<CaseResult>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl EngineRun {
    fn without_cases(engine: EngineId, status: RunStatus, detail: Option<String>) -> Self {
        Self {
            engine,
            status,
            cases: Vec::new(),
            duration_ms: 0,
            detail,
        }
    }

    fn from_report(engine: EngineId, report: EngineReport, elapsed: Duration) -> Self {
        let any_failed = report.cases.iter().any(|c| c.status == CaseStatus::Failed);
        let status = if any_failed || !report.exit_ok {
            RunStatus::Failed
        } else if report.cases.is_empty() {
            RunStatus::NoTests
        } else {
            RunStatus::Passed
        };
        Self {
            engine,
            status,
            cases: report.cases,
            duration_ms: elapsed.as_millis() as u64,
            detail: report.detail,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactOutcome {
    pub artifact: ArtifactName,
    pub runs: Vec<EngineRun>,
}

impl ArtifactOutcome {
    pub fn passed(&self) -> bool {
        !self.runs.iter().any(|r| r.status.is_failure())
    }

    fn uniform(
        artifact: ArtifactName,
        engines: &[Arc<dyn ExecutionEngine>],
        status: RunStatus,
        detail: &str,
    ) -> Self {
        Self {
            artifact,
            runs: engines
                .iter()
                .map(|e| EngineRun::without_cases(e.id(), status, Some(detail.to_string())))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub artifacts: usize,
    pub artifacts_passed: usize,
    pub artifacts_failed: usize,
    pub cases_passed: usize,
    pub cases_failed: usize,
    pub cases_ignored: usize,
}

/// Aggregated outcome of a whole run: per-artifact results plus merged coverage.
#[derive(Debug, Clone, Serialize)]
pub struct TestRunResult {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub deadline_hit: bool,
    outcomes: Vec<ArtifactOutcome>,
    coverage: CoverageData,
}

impl TestRunResult {
    pub fn empty() -> Self {
        Self {
            started_at: Utc::now(),
            duration_ms: 0,
            deadline_hit: false,
            outcomes: Vec::new(),
            coverage: CoverageData::default(),
        }
    }

    pub fn outcomes(&self) -> &[ArtifactOutcome] {
        &self.outcomes
    }

    pub fn outcome(&self, name: &str) -> Option<&ArtifactOutcome> {
        self.outcomes.iter().find(|o| o.artifact.as_str() == name)
    }

    pub fn failed(&self) -> Vec<&ArtifactOutcome> {
        self.outcomes.iter().filter(|o| !o.passed()).collect()
    }

    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(ArtifactOutcome::passed)
    }

    pub fn coverage(&self) -> &CoverageData {
        &self.coverage
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            artifacts: self.outcomes.len(),
            ..RunSummary::default()
        };
        for outcome in &self.outcomes {
            if outcome.passed() {
                summary.artifacts_passed += 1;
            } else {
                summary.artifacts_failed += 1;
            }
            for case in outcome.runs.iter().flat_map(|r| &r.cases) {
                match case.status {
                    CaseStatus::Passed => summary.cases_passed += 1,
                    CaseStatus::Failed => summary.cases_failed += 1,
                    CaseStatus::Ignored => summary.cases_ignored += 1,
                }
            }
        }
        summary
    }
}

/// Run every target under every engine and wait for all of them.
///
/// Artifact failures are recorded and never stop the remaining artifacts.
/// Outcomes come back sorted by artifact name; runs within an outcome follow
/// engine order.
pub async fn run_tests(
    targets: &BTreeSet<ArtifactName>,
    catalog: &ArtifactCatalog,
    engines: &[Arc<dyn ExecutionEngine>],
    ctx: Arc<ExecutionContext>,
    settings: &ExecutionSettings,
) -> TestRunResult {
    let started_at = Utc::now();
    let started = Instant::now();
    let deadline = settings.deadline.map(|d| tokio::time::Instant::now() + d);
    let permits = Arc::new(Semaphore::new(settings.workers.max(1)));

    let mut outcomes = Vec::with_capacity(targets.len());
    let mut tasks = JoinSet::new();

    for name in targets {
        let Some(artifact) = catalog.get(name) else {
            tracing::error!(artifact = %name, "selected artifact missing from catalog");
            outcomes.push(ArtifactOutcome::uniform(
                name.clone(),
                engines,
                RunStatus::Errored,
                "artifact not found",
            ));
            continue;
        };
        let engines = engines.to_vec();
        let ctx = ctx.clone();
        let permits = permits.clone();
        tasks.spawn(async move { run_artifact(artifact, engines, ctx, permits, deadline).await });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => tracing::error!(error = %e, "artifact task aborted"),
        }
    }

    // A panicked task leaves its target without an outcome.
    let finished: BTreeSet<ArtifactName> = outcomes.iter().map(|o| o.artifact.clone()).collect();
    for name in targets.difference(&finished) {
        outcomes.push(ArtifactOutcome::uniform(
            name.clone(),
            engines,
            RunStatus::Errored,
            "execution task aborted",
        ));
    }

    outcomes.sort_by(|a, b| a.artifact.cmp(&b.artifact));
    let deadline_hit = outcomes
        .iter()
        .flat_map(|o| &o.runs)
        .any(|r| r.status == RunStatus::TimedOut);

    let result = TestRunResult {
        started_at,
        duration_ms: started.elapsed().as_millis() as u64,
        deadline_hit,
        outcomes,
        coverage: ctx.coverage.snapshot(),
    };

    let summary = result.summary();
    tracing::info!(
        artifacts = summary.artifacts,
        failed = summary.artifacts_failed,
        cases_passed = summary.cases_passed,
        cases_failed = summary.cases_failed,
        duration_ms = result.duration_ms,
        "test run finished"
    );
    result
}

async fn run_artifact(
    artifact: Artifact,
    engines: Vec<Arc<dyn ExecutionEngine>>,
    ctx: Arc<ExecutionContext>,
    permits: Arc<Semaphore>,
    deadline: Option<tokio::time::Instant>,
) -> ArtifactOutcome {
    let permit = match deadline {
        Some(at) => tokio::time::timeout_at(at, permits.acquire_owned()).await.ok(),
        None => Some(permits.acquire_owned().await),
    };
    let _permit = match permit {
        Some(Ok(permit)) => permit,
        Some(Err(_)) => {
            return ArtifactOutcome::uniform(
                artifact.name,
                &engines,
                RunStatus::Errored,
                "worker pool closed",
            )
        }
        None => {
            return ArtifactOutcome::uniform(
                artifact.name,
                &engines,
                RunStatus::TimedOut,
                "deadline expired before start",
            )
        }
    };

    let mut runs = Vec::with_capacity(engines.len());
    for engine in &engines {
        let run = match deadline {
            Some(at) => {
                match tokio::time::timeout_at(at, run_engine(engine.as_ref(), &artifact, &ctx)).await {
                    Ok(run) => run,
                    Err(_) => EngineRun::without_cases(
                        engine.id(),
                        RunStatus::TimedOut,
                        Some("deadline expired".to_string()),
                    ),
                }
            }
            None => run_engine(engine.as_ref(), &artifact, &ctx).await,
        };
        if run.status.is_failure() {
            tracing::warn!(artifact = %artifact.name, engine = %run.engine, status = ?run.status, "artifact failed");
        } else {
            tracing::debug!(artifact = %artifact.name, engine = %run.engine, status = ?run.status, "artifact finished");
        }
        runs.push(run);
    }

    ArtifactOutcome {
        artifact: artifact.name,
        runs,
    }
}

async fn run_engine(
    engine: &dyn ExecutionEngine,
    artifact: &Artifact,
    ctx: &ExecutionContext,
) -> EngineRun {
    let started = Instant::now();
    let cases = match engine.discover(artifact, ctx).await {
        Ok(cases) => cases,
        Err(e) => {
            return EngineRun::without_cases(engine.id(), RunStatus::Errored, Some(e.to_string()))
        }
    };
    if cases.is_empty() {
        return EngineRun::without_cases(engine.id(), RunStatus::NoTests, None);
    }
    match engine.execute(artifact, &cases, ctx).await {
        Ok(report) => EngineRun::from_report(engine.id(), report, started.elapsed()),
        Err(e) => EngineRun::without_cases(engine.id(), RunStatus::Errored, Some(e.to_string())),
    }
}
