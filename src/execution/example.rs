use super::libtest;
use super::{EngineError, EngineId, EngineReport, ExecutionContext, ExecutionEngine};
use crate::selection::Artifact;
use async_trait::async_trait;

/// Runs the conventional, assertion-based cases of an artifact: every case
/// whose name does not carry the property marker. Only the discovered cases
/// are launched, each selected by exact name.
pub struct ExampleEngine {
    property_marker: String,
}

impl ExampleEngine {
    pub fn new(property_marker: impl Into<String>) -> Self {
        Self {
            property_marker: property_marker.into(),
        }
    }

    fn owns(&self, case: &str) -> bool {
        !case.contains(&self.property_marker)
    }
}

#[async_trait]
impl ExecutionEngine for ExampleEngine {
    fn id(&self) -> EngineId {
        EngineId::Example
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
        let mut report = libtest::run_cases(ctx, artifact, self.id(), &args, &[]).await?;
        report.cases.retain(|c| cases.contains(&c.name));
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ownership_excludes_marked_cases() {
        let engine = ExampleEngine::new("prop");
        assert!(engine.owns("reverse::twice"));
        assert!(!engine.owns("props::reverse_roundtrip"));
        assert_eq!(engine.id(), EngineId::Example);
    }
}
