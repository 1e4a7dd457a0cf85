//! Target selection against the default inclusion ruleset.

use proptest::prelude::*;
use std::collections::BTreeSet;
use suite_runner::selection::{select_targets, ArtifactName, InclusionRuleset, DEFAULT_INCLUDE};

fn names(list: &[&str]) -> BTreeSet<ArtifactName> {
    list.iter().map(|n| ArtifactName::new(*n).unwrap()).collect()
}

#[test]
fn test_mixed_artifacts_select_test_and_pbt() {
    let selected = select_targets(
        &names(&["FooTest", "BarHelper", "BazPBT"]),
        &InclusionRuleset::default(),
    );
    assert_eq!(selected, names(&["FooTest", "BazPBT"]));
}

#[test]
fn test_no_artifacts_selects_nothing() {
    let selected = select_targets(&BTreeSet::new(), &InclusionRuleset::default());
    assert!(selected.is_empty());
}

#[test]
fn test_nested_artifacts_match_like_build_globs() {
    let selected = select_targets(
        &names(&[
            "org/example/AuxiliaryMethodsPBT",
            "org/example/AuxiliaryMethodsFixed",
            "org/example/AuxiliaryMethods",
        ]),
        &InclusionRuleset::default(),
    );
    assert_eq!(
        selected,
        names(&["org/example/AuxiliaryMethodsPBT", "org/example/AuxiliaryMethodsFixed"])
    );
}

#[test]
fn test_plain_profile_patterns_skip_fixed() {
    let ruleset = InclusionRuleset::compile(&["*Properties", "*Test", "*Tests", "*PBT"]).unwrap();
    let selected = select_targets(&names(&["AuxFixed", "AuxPBT"]), &ruleset);
    assert_eq!(selected, names(&["AuxPBT"]));
}

fn suffixed_name() -> impl Strategy<Value = String> {
    (
        "[A-Za-z]{0,8}",
        prop::sample::select(vec!["Test", "Tests", "PBT", "Fixed", "Properties", "Helper", "Util", ""]),
    )
        .prop_map(|(stem, suffix)| format!("{}{}", stem, suffix))
        .prop_filter("non-empty", |n| !n.is_empty())
}

proptest! {
    #[test]
    fn prop_selected_iff_some_suffix_matches(list in prop::collection::vec(suffixed_name(), 0..20)) {
        let all: BTreeSet<ArtifactName> =
            list.iter().map(|n| ArtifactName::new(n.clone()).unwrap()).collect();
        let selected = select_targets(&all, &InclusionRuleset::default());

        for name in &all {
            let expected = DEFAULT_INCLUDE
                .iter()
                .any(|p| name.as_str().ends_with(p.trim_start_matches('*')));
            prop_assert_eq!(selected.contains(name), expected, "name {}", name);
        }
        prop_assert!(selected.is_subset(&all));
    }

    #[test]
    fn prop_selection_is_idempotent(list in prop::collection::vec(suffixed_name(), 0..20)) {
        let all: BTreeSet<ArtifactName> =
            list.iter().map(|n| ArtifactName::new(n.clone()).unwrap()).collect();
        let ruleset = InclusionRuleset::default();
        let once = select_targets(&all, &ruleset);
        let twice = select_targets(&all, &ruleset);
        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(select_targets(&once, &ruleset), once);
    }
}
