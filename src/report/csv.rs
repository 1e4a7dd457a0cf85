use crate::execution::CoverageData;
use std::fmt::Write;

/// One row per source file: instrumented/hit lines and branch counts.
pub fn render_coverage(coverage: &CoverageData) -> String {
    let mut out = String::from("source,lines_instrumented,lines_hit,branches_taken,branches_total\n");
    for (source, file) in &coverage.files {
        let _ = writeln!(
            out,
            "{},{},{},{},{}",
            quote(source),
            file.lines_instrumented(),
            file.lines_hit(),
            file.branches_taken(),
            file.branches_total()
        );
    }
    out
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_per_file() {
        let mut data = CoverageData::default();
        data.record_line("src/a.rs", 1, 1);
        data.record_line("src/a.rs", 2, 0);
        data.record_branches("src/a.rs", 1, 1, 2);
        data.record_line("src/b,c.rs", 1, 0);

        let csv = render_coverage(&data);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "src/a.rs,2,1,1,2");
        assert_eq!(lines[2], "\"src/b,c.rs\",1,0,0,0");
    }
}
