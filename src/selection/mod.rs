pub mod catalog;
pub mod pattern;

pub use catalog::{discover_artifacts, Artifact, ArtifactCatalog};
pub use pattern::GlobPattern;

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Inclusion patterns used when a profile does not name its own.
pub const DEFAULT_INCLUDE: [&str; 5] = ["*Properties", "*Test", "*Tests", "*PBT", "*Fixed"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("empty glob pattern")]
    EmptyPattern,
    #[error("glob `{pattern}`: empty path segment")]
    EmptySegment { pattern: String },
    #[error("glob `{pattern}`: unclosed character class")]
    UnclosedClass { pattern: String },
    #[error("glob `{pattern}`: `/` cannot be escaped")]
    EscapedSeparator { pattern: String },
    #[error("glob `{pattern}`: reversed range {start}-{end}")]
    ReversedRange { pattern: String, start: char, end: char },
    #[error("glob `{pattern}`: `**` must be a whole path segment")]
    MisplacedDoubleStar { pattern: String },
    #[error("glob `{pattern}`: dangling escape")]
    DanglingEscape { pattern: String },
    #[error("artifact names must be non-empty")]
    EmptyArtifactName,
}

/// Name of a compiled test artifact, `/`-separated relative to the artifact root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ArtifactName(String);

impl ArtifactName {
    pub fn new(name: impl Into<String>) -> Result<Self, SelectionError> {
        let name = name.into();
        if name.is_empty() {
            return Err(SelectionError::EmptyArtifactName);
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered, static set of compiled inclusion globs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionRuleset {
    patterns: Vec<GlobPattern>,
}

impl InclusionRuleset {
    /// Compile every pattern up front; the first malformed one aborts.
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self, SelectionError> {
        let patterns = patterns
            .iter()
            .map(|p| GlobPattern::compile(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn patterns(&self) -> &[GlobPattern] {
        &self.patterns
    }

    /// The first pattern selecting `name`, if any.
    pub fn first_match(&self, name: &str) -> Option<&GlobPattern> {
        self.patterns.iter().find(|p| p.matches(name))
    }

    pub fn matches(&self, name: &str) -> bool {
        self.first_match(name).is_some()
    }
}

impl Default for InclusionRuleset {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_INCLUDE
                .iter()
                .filter_map(|p| GlobPattern::compile(p).ok())
                .collect(),
        }
    }
}

/// The subset of `artifacts` matched by at least one pattern in `ruleset`.
pub fn select_targets(
    artifacts: &BTreeSet<ArtifactName>,
    ruleset: &InclusionRuleset,
) -> BTreeSet<ArtifactName> {
    artifacts
        .iter()
        .filter(|name| ruleset.matches(name.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> BTreeSet<ArtifactName> {
        list.iter().map(|n| ArtifactName::new(*n).unwrap()).collect()
    }

    #[test]
    fn test_default_ruleset_has_five_patterns() {
        let ruleset = InclusionRuleset::default();
        let sources: Vec<&str> = ruleset.patterns().iter().map(|p| p.as_str()).collect();
        assert_eq!(sources, DEFAULT_INCLUDE.to_vec());
    }

    #[test]
    fn test_select_mixed_artifacts() {
        let selected = select_targets(
            &names(&["FooTest", "BarHelper", "BazPBT"]),
            &InclusionRuleset::default(),
        );
        assert_eq!(selected, names(&["FooTest", "BazPBT"]));
    }

    #[test]
    fn test_select_empty_set() {
        let selected = select_targets(&BTreeSet::new(), &InclusionRuleset::default());
        assert!(selected.is_empty());
    }

    #[test]
    fn test_every_suffix_is_recognized() {
        let all = names(&[
            "AuxProperties",
            "AuxTest",
            "AuxTests",
            "AuxiliaryMethodsPBT",
            "AuxiliaryMethodsFixed",
            "AuxTestHelper",
        ]);
        let selected = select_targets(&all, &InclusionRuleset::default());
        assert_eq!(selected.len(), 5);
        assert!(!selected.contains(&ArtifactName::new("AuxTestHelper").unwrap()));
    }

    #[test]
    fn test_first_malformed_pattern_fails_compile() {
        let err = InclusionRuleset::compile(&["*Test", "[oops"]).unwrap_err();
        assert!(matches!(err, SelectionError::UnclosedClass { .. }));
    }

    #[test]
    fn test_empty_artifact_name_rejected() {
        assert_eq!(ArtifactName::new(""), Err(SelectionError::EmptyArtifactName));
    }
}
