use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Per-source-file hit counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileCoverage {
    /// line -> hit count; zero means instrumented but never executed
    pub lines: BTreeMap<u32, u64>,
    /// line -> (branches taken, branches total)
    pub branches: BTreeMap<u32, (u32, u32)>,
}

impl FileCoverage {
    pub fn lines_instrumented(&self) -> usize {
        self.lines.len()
    }

    pub fn lines_hit(&self) -> usize {
        self.lines.values().filter(|&&hits| hits > 0).count()
    }

    pub fn branches_taken(&self) -> u64 {
        self.branches.values().map(|&(taken, _)| u64::from(taken)).sum()
    }

    pub fn branches_total(&self) -> u64 {
        self.branches.values().map(|&(_, total)| u64::from(total)).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoverageData {
    pub files: BTreeMap<String, FileCoverage>,
}

impl CoverageData {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn record_line(&mut self, source: &str, line: u32, hits: u64) {
        let file = self.files.entry(source.to_string()).or_default();
        let count = file.lines.entry(line).or_insert(0);
        *count = count.saturating_add(hits);
    }

    /// Branch records from separate runs keep the widest observation.
    pub fn record_branches(&mut self, source: &str, line: u32, taken: u32, total: u32) {
        let file = self.files.entry(source.to_string()).or_default();
        let entry = file.branches.entry(line).or_insert((0, 0));
        entry.1 = entry.1.max(total);
        entry.0 = entry.0.max(taken).min(entry.1);
    }

    pub fn merge(&mut self, other: &CoverageData) {
        for (source, file) in &other.files {
            for (&line, &hits) in &file.lines {
                self.record_line(source, line, hits);
            }
            for (&line, &(taken, total)) in &file.branches {
                self.record_branches(source, line, taken, total);
            }
        }
    }

    pub fn lines_instrumented(&self) -> usize {
        self.files.values().map(FileCoverage::lines_instrumented).sum()
    }

    pub fn lines_hit(&self) -> usize {
        self.files.values().map(FileCoverage::lines_hit).sum()
    }

    /// Parse the line format artifacts write to `SUITE_COVERAGE_FILE`:
    /// `source:line:hits` or `source:line:hits:taken/total`.
    /// Returns the data and the number of lines that could not be parsed.
    pub fn parse(text: &str) -> (Self, usize) {
        let mut data = Self::default();
        let mut skipped = 0;
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_record(line) {
                Some(record) => {
                    data.record_line(record.source, record.line, record.hits);
                    if let Some((taken, total)) = record.branches {
                        data.record_branches(record.source, record.line, taken, total);
                    }
                }
                None => skipped += 1,
            }
        }
        (data, skipped)
    }
}

struct Record<'a> {
    source: &'a str,
    line: u32,
    hits: u64,
    branches: Option<(u32, u32)>,
}

fn parse_record(line: &str) -> Option<Record<'_>> {
    // Source paths may themselves contain ':' (Windows drives), so split from the right.
    let (head, last) = line.rsplit_once(':')?;
    let (head, hits, branches) = match last.split_once('/') {
        Some((taken, total)) => {
            let taken: u32 = taken.parse().ok()?;
            let total: u32 = total.parse().ok()?;
            if taken > total {
                return None;
            }
            let (head, hits) = head.rsplit_once(':')?;
            (head, hits, Some((taken, total)))
        }
        None => (head, last, None),
    };
    let (source, line_no) = head.rsplit_once(':')?;
    if source.is_empty() {
        return None;
    }
    Some(Record {
        source,
        line: line_no.parse().ok()?,
        hits: hits.parse().ok()?,
        branches,
    })
}

/// Shared sink that concurrent executions contribute coverage into.
#[derive(Debug, Clone, Default)]
pub struct CoverageAccumulator {
    inner: Arc<Mutex<CoverageData>>,
}

impl CoverageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contribute(&self, data: &CoverageData) {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.merge(data);
    }

    pub fn snapshot(&self) -> CoverageData {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Merge a coverage file left behind by an artifact, then delete it.
    /// Absent files are fine: not every artifact is instrumented.
    pub async fn ingest_file(&self, path: &Path) {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable coverage file");
                return;
            }
        };
        let (data, skipped) = CoverageData::parse(&text);
        if skipped > 0 {
            tracing::warn!(path = %path.display(), skipped, "malformed coverage records skipped");
        }
        self.contribute(&data);
        let _ = tokio::fs::remove_file(path).await;
    }
}
