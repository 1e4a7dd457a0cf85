use super::{ArtifactName, SelectionError};
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// A compiled test artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: ArtifactName,
    pub path: PathBuf,
}

/// Name -> location index of every artifact found under the artifact directory.
#[derive(Debug, Clone, Default)]
pub struct ArtifactCatalog {
    entries: BTreeMap<ArtifactName, PathBuf>,
}

impl ArtifactCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false (and keeps the existing entry) when the name is already taken.
    pub fn insert(&mut self, name: ArtifactName, path: PathBuf) -> bool {
        if self.entries.contains_key(&name) {
            return false;
        }
        self.entries.insert(name, path);
        true
    }

    pub fn get(&self, name: &ArtifactName) -> Option<Artifact> {
        self.entries.get(name).map(|path| Artifact {
            name: name.clone(),
            path: path.clone(),
        })
    }

    pub fn names(&self) -> BTreeSet<ArtifactName> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Derive an artifact name from a path relative to the artifact root:
/// `/`-joined components with the final extension removed.
pub fn artifact_name_for(relative: &Path) -> Result<ArtifactName, SelectionError> {
    let mut parts: Vec<String> = relative
        .parent()
        .into_iter()
        .flat_map(|p| p.components())
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let stem = relative
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    parts.push(stem);
    ArtifactName::new(parts.join("/"))
}

/// Walk `root` recursively and index every regular file as an artifact.
///
/// A missing root yields an empty catalog: a project with no compiled tests
/// still runs (and reports) an empty suite.
pub fn discover_artifacts(root: &Path) -> Result<ArtifactCatalog> {
    let mut catalog = ArtifactCatalog::new();
    if !root.exists() {
        tracing::warn!(dir = %root.display(), "artifact directory does not exist");
        return Ok(catalog);
    }

    let mut files = Vec::new();
    collect_files(root, &mut files)?;
    // Lexicographic order decides which path wins a name collision.
    files.sort();

    for path in files {
        let relative = path.strip_prefix(root).unwrap_or(&path);
        let name = match artifact_name_for(relative) {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unnamed artifact");
                continue;
            }
        };
        if !catalog.insert(name.clone(), path.clone()) {
            tracing::warn!(artifact = %name, path = %path.display(), "duplicate artifact name, keeping first");
        }
    }

    tracing::debug!(dir = %root.display(), count = catalog.len(), "artifacts discovered");
    Ok(catalog)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read artifact directory: {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden {
            continue;
        }
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&entry.path(), out)?;
        } else if file_type.is_file() {
            out.push(entry.path());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_strips_extension_and_joins_components() {
        let name = artifact_name_for(Path::new("org/example/FooTest.class")).unwrap();
        assert_eq!(name.as_str(), "org/example/FooTest");
        let bare = artifact_name_for(Path::new("BazPBT")).unwrap();
        assert_eq!(bare.as_str(), "BazPBT");
    }

    #[test]
    fn test_discover_walks_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("org/example")).unwrap();
        std::fs::write(dir.path().join("org/example/FooTest.bin"), "").unwrap();
        std::fs::write(dir.path().join("BarHelper"), "").unwrap();
        std::fs::write(dir.path().join(".hidden"), "").unwrap();

        let catalog = discover_artifacts(dir.path()).unwrap();
        let names: Vec<String> = catalog.names().iter().map(|n| n.to_string()).collect();
        assert_eq!(names, vec!["BarHelper", "org/example/FooTest"]);
    }

    #[test]
    fn test_duplicate_names_keep_first_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("FooTest.a"), "").unwrap();
        std::fs::write(dir.path().join("FooTest.b"), "").unwrap();

        let catalog = discover_artifacts(dir.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        let name = ArtifactName::new("FooTest").unwrap();
        assert!(catalog.get(&name).unwrap().path.ends_with("FooTest.a"));
    }

    #[test]
    fn test_missing_root_is_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = discover_artifacts(&dir.path().join("nope")).unwrap();
        assert!(catalog.is_empty());
    }
}
