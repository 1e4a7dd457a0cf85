use super::libtest;
use super::{EngineError, EngineId, EngineReport, ExecutionContext, ExecutionEngine};
use crate::selection::Artifact;
use async_trait::async_trait;

/// Runs the property-based cases of an artifact: every case whose name
/// carries the property marker. Tries and seed are handed to the artifact
/// through proptest's environment variables.
pub struct PropertyEngine {
    marker: String,
    cases: u32,
    seed: u64,
    retain_parameter_names: bool,
}

impl PropertyEngine {
    pub fn new(marker: impl Into<String>, cases: u32, seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(rand::random);
        tracing::info!(seed, cases, "property engine seeded");
        Self {
            marker: marker.into(),
            cases,
            seed,
            retain_parameter_names: true,
        }
    }

    /// When off, failing samples are reported without their named parameter values.
    pub fn with_parameter_names(mut self, retain: bool) -> Self {
        self.retain_parameter_names = retain;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn owns(&self, case: &str) -> bool {
        case.contains(&self.marker)
    }
}

#[async_trait]
impl ExecutionEngine for PropertyEngine {
    fn id(&self) -> EngineId {
        EngineId::Property
    }

    async fn discover(
        &self,
        artifact: &Artifact,
        ctx: &ExecutionContext,
    ) -> Result<Vec<String>, EngineError> {
        let all = libtest::list_cases(ctx, artifact).await?;
        Ok(all.into_iter().filter(|c| self.owns(c)).collect())
    }

    async fn execute(
        &self,
        artifact: &Artifact,
        cases: &[String],
        ctx: &ExecutionContext,
    ) -> Result<EngineReport, EngineError> {
        let args = libtest::exact_filter(cases);
        let envs = vec![
            ("PROPTEST_CASES".to_string(), self.cases.to_string()),
            ("PROPTEST_RNG_SEED".to_string(), self.seed.to_string()),
        ];
        let mut report = libtest::run_cases(ctx, artifact, self.id(), &args, &envs).await?;
        report.cases.retain(|c| cases.contains(&c.name));
        if !self.retain_parameter_names {
            for case in &mut report.cases {
                case.parameters = None;
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_seed_is_kept() {
        let engine = PropertyEngine::new("prop", 1000, Some(42));
        assert_eq!(engine.seed(), 42);
        assert!(engine.owns("props::reverse_roundtrip"));
        assert!(!engine.owns("reverse::twice"));
    }
}
