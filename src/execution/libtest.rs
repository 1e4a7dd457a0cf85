// Driving compiled test binaries through the standard libtest command line.

use super::{CaseResult, CaseStatus, EngineError, EngineId, EngineReport, ExecutionContext};
use crate::selection::Artifact;
use std::process::Stdio;
use tokio::process::Command;

/// Environment variable naming the file an artifact may write coverage records to.
pub const COVERAGE_ENV: &str = "SUITE_COVERAGE_FILE";

const FAILING_INPUT_PREFIX: &str = "minimal failing input:";

fn command(ctx: &ExecutionContext, artifact: &Artifact) -> Command {
    let mut cmd = match ctx.runner.split_first() {
        Some((launcher, launcher_args)) => {
            let mut cmd = Command::new(launcher);
            cmd.args(launcher_args).arg(&artifact.path);
            cmd
        }
        None => Command::new(&artifact.path),
    };
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// `<artifact> --list`, returning every test name.
pub async fn list_cases(
    ctx: &ExecutionContext,
    artifact: &Artifact,
) -> Result<Vec<String>, EngineError> {
    let output = command(ctx, artifact)
        .arg("--list")
        .output()
        .await
        .map_err(|source| EngineError::Spawn {
            artifact: artifact.name.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(EngineError::Discovery {
            artifact: artifact.name.clone(),
            detail: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    Ok(parse_list(&String::from_utf8_lossy(&output.stdout)))
}

/// Run an artifact with extra libtest arguments and environment, collect the
/// per-case results and merge any coverage it wrote.
pub async fn run_cases(
    ctx: &ExecutionContext,
    artifact: &Artifact,
    engine: EngineId,
    args: &[String],
    envs: &[(String, String)],
) -> Result<EngineReport, EngineError> {
    let coverage_path = ctx.coverage_slot(&artifact.name, engine);
    let mut cmd = command(ctx, artifact);
    cmd.args(args).env(COVERAGE_ENV, &coverage_path);
    for (key, value) in envs {
        cmd.env(key, value);
    }

    tracing::debug!(artifact = %artifact.name, engine = %engine, ?args, "launching artifact");
    let output = cmd.output().await.map_err(|source| EngineError::Spawn {
        artifact: artifact.name.clone(),
        source,
    })?;

    ctx.coverage.ingest_file(&coverage_path).await;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let cases = parse_run(&stdout);
    let exit_ok = output.status.success();
    let detail = if exit_ok {
        None
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        Some(if stderr.is_empty() {
            format!("exited with {}", output.status)
        } else {
            format!("exited with {}: {}", output.status, stderr)
        })
    };

    Ok(EngineReport {
        cases,
        exit_ok,
        detail,
    })
}

/// `--exact <case>...`: run precisely the named cases and nothing else.
pub fn exact_filter(cases: &[String]) -> Vec<String> {
    std::iter::once("--exact".to_string())
        .chain(cases.iter().cloned())
        .collect()
}

/// Parse `--list` output (`name: test` lines; benches are ignored).
pub fn parse_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.trim_end().strip_suffix(": test"))
        .map(str::to_string)
        .collect()
}

/// Parse a libtest run: `test <name> ... <status>` lines plus the
/// `---- <name> stdout ----` failure sections.
pub fn parse_run(stdout: &str) -> Vec<CaseResult> {
    let mut cases: Vec<CaseResult> = Vec::new();
    let mut section: Option<(String, Vec<&str>)> = None;
    let mut failure_text: Vec<(String, String)> = Vec::new();

    for line in stdout.lines() {
        if let Some(name) = line
            .strip_prefix("---- ")
            .and_then(|rest| rest.strip_suffix(" stdout ----"))
        {
            if let Some((prev, body)) = section.take() {
                failure_text.push((prev, body.join("\n")));
            }
            section = Some((name.to_string(), Vec::new()));
            continue;
        }
        if let Some((_, body)) = section.as_mut() {
            if line == "failures:" || line.starts_with("test result:") {
                if let Some((prev, body)) = section.take() {
                    failure_text.push((prev, body.join("\n")));
                }
            } else {
                body.push(line);
                continue;
            }
        }

        if let Some((name, status)) = line
            .strip_prefix("test ")
            .and_then(|rest| rest.rsplit_once(" ... "))
        {
            let status = match status.trim() {
                "ok" => CaseStatus::Passed,
                "FAILED" => CaseStatus::Failed,
                s if s.starts_with("ignored") => CaseStatus::Ignored,
                _ => continue,
            };
            cases.push(CaseResult {
                name: name.to_string(),
                status,
                message: None,
                parameters: None,
            });
        }
    }
    if let Some((prev, body)) = section.take() {
        failure_text.push((prev, body.join("\n")));
    }

    for (name, text) in failure_text {
        let text = text.trim();
        if let Some(case) = cases.iter_mut().find(|c| c.name == name) {
            case.parameters = failing_input(text);
            if !text.is_empty() {
                case.message = Some(text.to_string());
            }
        }
    }

    cases
}

/// The `minimal failing input: x = 3, y = "a"` line a property failure prints.
pub fn failing_input(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        line.find(FAILING_INPUT_PREFIX).map(|at| {
            line[at + FAILING_INPUT_PREFIX.len()..]
                .trim()
                .to_string()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUN_OUTPUT: &str = "\
running 3 tests
test reverse::twice ... ok
test props::prop_reverse_roundtrip ... FAILED
test slow::case ... ignored, takes minutes

failures:

---- props::prop_reverse_roundtrip stdout ----
thread 'props::prop_reverse_roundtrip' panicked at src/lib.rs:10:5:
Test failed: reversing twice failed.
minimal failing input: x = 1000000003
	successes: 12

failures:
    props::prop_reverse_roundtrip

test result: FAILED. 1 passed; 1 failed; 1 ignored; 0 measured; 0 filtered out
";

    #[test]
    fn test_parse_list_keeps_tests_only() {
        let out = "a::one: test\nb::two: test\nbench_x: bench\n\n2 tests, 1 benchmark\n";
        assert_eq!(parse_list(out), vec!["a::one", "b::two"]);
    }

    #[test]
    fn test_parse_run_statuses() {
        let cases = parse_run(RUN_OUTPUT);
        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].status, CaseStatus::Passed);
        assert_eq!(cases[1].status, CaseStatus::Failed);
        assert_eq!(cases[2].status, CaseStatus::Ignored);
    }

    #[test]
    fn test_parse_run_attaches_failure_text_and_parameters() {
        let cases = parse_run(RUN_OUTPUT);
        let failed = &cases[1];
        assert!(failed
            .message
            .as_deref()
            .unwrap()
            .contains("reversing twice failed"));
        assert_eq!(failed.parameters.as_deref(), Some("x = 1000000003"));
        assert!(cases[0].message.is_none());
    }

    #[test]
    fn test_exact_filter_names_every_case() {
        let cases = vec!["a::one".to_string(), "b::prop_two".to_string()];
        assert_eq!(exact_filter(&cases), vec!["--exact", "a::one", "b::prop_two"]);
        assert_eq!(exact_filter(&[]), vec!["--exact"]);
    }

    #[test]
    fn test_failing_input_absent() {
        assert_eq!(failing_input("assertion failed: left == right"), None);
    }
}
