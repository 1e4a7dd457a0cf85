pub mod csv;
pub mod html;

use crate::execution::{RunSummary, TestRunResult};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("report parent directory {0} does not exist")]
    MissingParent(PathBuf),
    #[error("report destination {0} exists and is not a directory")]
    NotADirectory(PathBuf),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize run summary: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("report task aborted: {0}")]
    Aborted(String),
}

/// Which files the report directory receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOptions {
    /// Create missing parent directories of the destination.
    pub create_dirs: bool,
    pub html: bool,
    pub csv: bool,
    pub json: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            create_dirs: true,
            html: true,
            csv: false,
            json: true,
        }
    }
}

/// Files written by one emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportManifest {
    pub root: PathBuf,
    pub files: Vec<PathBuf>,
}

/// Renders a finished run somewhere. Only called once execution is complete.
pub trait ReportEmitter: Send + Sync {
    fn emit(&self, results: &TestRunResult, destination: &Path)
        -> Result<ReportManifest, ReportError>;
}

/// The default emitter: HTML index plus optional CSV and JSON companions.
#[derive(Debug, Clone, Default)]
pub struct HtmlReportEmitter {
    options: ReportOptions,
}

impl HtmlReportEmitter {
    pub fn new(options: ReportOptions) -> Self {
        Self { options }
    }
}

impl ReportEmitter for HtmlReportEmitter {
    fn emit(
        &self,
        results: &TestRunResult,
        destination: &Path,
    ) -> Result<ReportManifest, ReportError> {
        emit_report(results, destination, &self.options)
    }
}

#[derive(Serialize)]
struct JsonSummary<'a> {
    generated_at: String,
    summary: RunSummary,
    lines_instrumented: usize,
    lines_hit: usize,
    run: &'a TestRunResult,
}

/// Write the coverage report for `results` (which carries the merged
/// coverage data) into the `destination` directory.
pub fn emit_report(
    results: &TestRunResult,
    destination: &Path,
    options: &ReportOptions,
) -> Result<ReportManifest, ReportError> {
    prepare_destination(destination, options.create_dirs)?;
    let generated_at = chrono::Utc::now();
    let mut files = Vec::new();

    if options.html {
        let page = html::render_index(results, generated_at);
        files.push(write_file(destination, "index.html", &page)?);
    }
    if options.csv {
        let table = csv::render_coverage(results.coverage());
        files.push(write_file(destination, "coverage.csv", &table)?);
    }
    if options.json {
        let coverage = results.coverage();
        let doc = JsonSummary {
            generated_at: generated_at.to_rfc3339(),
            summary: results.summary(),
            lines_instrumented: coverage.lines_instrumented(),
            lines_hit: coverage.lines_hit(),
            run: results,
        };
        let body = serde_json::to_string_pretty(&doc)?;
        files.push(write_file(destination, "summary.json", &body)?);
    }

    tracing::info!(dir = %destination.display(), files = files.len(), "report written");
    Ok(ReportManifest {
        root: destination.to_path_buf(),
        files,
    })
}

fn prepare_destination(destination: &Path, create_dirs: bool) -> Result<(), ReportError> {
    if destination.exists() {
        if destination.is_dir() {
            return Ok(());
        }
        return Err(ReportError::NotADirectory(destination.to_path_buf()));
    }

    let io_err = |source: std::io::Error| ReportError::Io {
        path: destination.to_path_buf(),
        source,
    };
    if create_dirs {
        return std::fs::create_dir_all(destination).map_err(io_err);
    }

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.is_dir() {
            return Err(ReportError::MissingParent(parent.to_path_buf()));
        }
    }
    std::fs::create_dir(destination).map_err(io_err)
}

fn write_file(dir: &Path, name: &str, contents: &str) -> Result<PathBuf, ReportError> {
    let path = dir.join(name);
    std::fs::write(&path, contents).map_err(|source| ReportError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

pub(crate) fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn test_emit_creates_nested_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("task4/jacocoreport");
        let manifest = emit_report(&TestRunResult::empty(), &dest, &ReportOptions::default()).unwrap();

        assert_eq!(manifest.files.len(), 2);
        assert!(dest.join("index.html").is_file());
        assert!(dest.join("summary.json").is_file());
        assert!(!dest.join("coverage.csv").exists());
    }

    #[test]
    fn test_missing_parent_without_create_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("absent/report");
        let options = ReportOptions {
            create_dirs: false,
            ..ReportOptions::default()
        };
        let err = emit_report(&TestRunResult::empty(), &dest, &options).unwrap_err();
        assert!(matches!(err, ReportError::MissingParent(p) if p == dir.path().join("absent")));
    }

    #[test]
    fn test_existing_parent_without_create_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("report");
        let options = ReportOptions {
            create_dirs: false,
            csv: true,
            ..ReportOptions::default()
        };
        let manifest = emit_report(&TestRunResult::empty(), &dest, &options).unwrap();
        assert_eq!(manifest.files.len(), 3);
    }

    #[test]
    fn test_destination_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("report");
        std::fs::write(&dest, "occupied").unwrap();
        let err = emit_report(&TestRunResult::empty(), &dest, &ReportOptions::default()).unwrap_err();
        assert!(matches!(err, ReportError::NotADirectory(_)));
    }
}
