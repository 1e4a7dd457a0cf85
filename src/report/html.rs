use super::escape_html;
use crate::execution::{CaseStatus, CoverageData, RunStatus, TestRunResult};
use chrono::{DateTime, Utc};
use std::fmt::Write;

const STYLE: &str = "body{font-family:sans-serif;margin:2em}\
table{border-collapse:collapse;margin-bottom:2em}\
th,td{border:1px solid #ccc;padding:4px 8px;text-align:left}\
.passed{color:#2a7a2a}.failed{color:#b00020}.muted{color:#777}\
pre{white-space:pre-wrap;margin:0}";

fn percent(part: u64, whole: u64) -> String {
    if whole == 0 {
        return "n/a".to_string();
    }
    format!("{:.1}%", part as f64 * 100.0 / whole as f64)
}

fn status_class(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Passed => "passed",
        RunStatus::NoTests => "muted",
        RunStatus::Failed | RunStatus::Errored | RunStatus::TimedOut => "failed",
    }
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Passed => "passed",
        RunStatus::Failed => "failed",
        RunStatus::NoTests => "no tests",
        RunStatus::Errored => "error",
        RunStatus::TimedOut => "timed out",
    }
}

pub fn render_index(results: &TestRunResult, generated_at: DateTime<Utc>) -> String {
    let summary = results.summary();
    let mut out = String::new();

    let _ = write!(
        out,
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Test report</title>\
         <style>{}</style></head><body>\n",
        STYLE
    );
    let _ = writeln!(out, "<h1>Test report</h1>");
    let _ = writeln!(
        out,
        "<p>Generated {} &middot; run took {} ms{}</p>",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        results.duration_ms,
        if results.deadline_hit { " &middot; <span class=\"failed\">deadline expired</span>" } else { "" }
    );
    let _ = writeln!(
        out,
        "<p>{} artifacts: <span class=\"passed\">{} passed</span>, <span class=\"failed\">{} failed</span>. \
         Cases: {} passed, {} failed, {} ignored.</p>",
        summary.artifacts,
        summary.artifacts_passed,
        summary.artifacts_failed,
        summary.cases_passed,
        summary.cases_failed,
        summary.cases_ignored
    );

    render_outcomes(&mut out, results);
    render_coverage(&mut out, results.coverage());

    out.push_str("</body></html>\n");
    out
}

fn render_outcomes(out: &mut String, results: &TestRunResult) {
    let _ = writeln!(out, "<h2>Artifacts</h2>");
    if results.outcomes().is_empty() {
        let _ = writeln!(out, "<p class=\"muted\">No artifacts were selected.</p>");
        return;
    }
    let _ = writeln!(
        out,
        "<table><tr><th>Artifact</th><th>Engine</th><th>Status</th><th>Passed</th><th>Failed</th><th>Time (ms)</th></tr>"
    );
    for outcome in results.outcomes() {
        for run in &outcome.runs {
            let passed = run.cases.iter().filter(|c| c.status == CaseStatus::Passed).count();
            let failed = run.cases.iter().filter(|c| c.status == CaseStatus::Failed).count();
            let _ = writeln!(
                out,
                "<tr><td>{}</td><td>{}</td><td class=\"{}\">{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(outcome.artifact.as_str()),
                run.engine,
                status_class(run.status),
                status_label(run.status),
                passed,
                failed,
                run.duration_ms
            );
        }
    }
    let _ = writeln!(out, "</table>");

    let failures: Vec<_> = results
        .outcomes()
        .iter()
        .flat_map(|o| o.runs.iter().map(move |r| (o, r)))
        .filter(|(_, r)| r.status.is_failure())
        .collect();
    if failures.is_empty() {
        return;
    }

    let _ = writeln!(out, "<h2>Failures</h2>");
    for (outcome, run) in failures {
        let _ = writeln!(
            out,
            "<h3>{} <span class=\"muted\">({})</span></h3>",
            escape_html(outcome.artifact.as_str()),
            run.engine
        );
        if let Some(detail) = &run.detail {
            let _ = writeln!(out, "<p class=\"failed\">{}</p>", escape_html(detail));
        }
        for case in run.cases.iter().filter(|c| c.status == CaseStatus::Failed) {
            let _ = writeln!(out, "<h4>{}</h4>", escape_html(&case.name));
            if let Some(params) = &case.parameters {
                let _ = writeln!(out, "<p>Failing input: <code>{}</code></p>", escape_html(params));
            }
            if let Some(message) = &case.message {
                let _ = writeln!(out, "<pre>{}</pre>", escape_html(message));
            }
        }
    }
}

fn render_coverage(out: &mut String, coverage: &CoverageData) {
    let _ = writeln!(out, "<h2>Coverage</h2>");
    if coverage.is_empty() {
        let _ = writeln!(out, "<p class=\"muted\">No coverage data was recorded.</p>");
        return;
    }
    let _ = writeln!(
        out,
        "<table><tr><th>Source</th><th>Lines</th><th>Line coverage</th><th>Branches</th><th>Branch coverage</th></tr>"
    );
    for (source, file) in &coverage.files {
        let (taken, total) = (file.branches_taken(), file.branches_total());
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td>{}/{}</td><td>{}</td><td>{}/{}</td><td>{}</td></tr>",
            escape_html(source),
            file.lines_hit(),
            file.lines_instrumented(),
            percent(file.lines_hit() as u64, file.lines_instrumented() as u64),
            taken,
            total,
            percent(taken, total)
        );
    }
    let _ = writeln!(
        out,
        "<tr><th>Total</th><th>{}/{}</th><th>{}</th><th></th><th></th></tr></table>",
        coverage.lines_hit(),
        coverage.lines_instrumented(),
        percent(coverage.lines_hit() as u64, coverage.lines_instrumented() as u64)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_run_renders_placeholders() {
        let page = render_index(&TestRunResult::empty(), Utc::now());
        assert!(page.contains("No artifacts were selected."));
        assert!(page.contains("No coverage data was recorded."));
        assert!(page.ends_with("</html>\n"));
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(1, 4), "25.0%");
        assert_eq!(percent(0, 0), "n/a");
    }

    #[test]
    fn test_branch_totals_beyond_u32_render() {
        let (data, _) = CoverageData::parse("a.rs:1:1:0/4294967295\na.rs:2:1:0/4294967295\n");
        let mut out = String::new();
        render_coverage(&mut out, &data);
        assert!(out.contains("0/8589934590"));
        assert!(out.contains("0.0%"));
    }
}
