use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use suite_runner::config::{Config, CONFIG_FILE};
use suite_runner::execution::RunStatus;
use suite_runner::pipeline::{Pipeline, PipelineOutcome, ReportOutcome};
use suite_runner::selection::discover_artifacts;

/// Exit status for configuration and selection errors.
const EXIT_CONFIG: u8 = 3;

#[derive(Parser)]
#[command(name = "suite-runner")]
#[command(about = "Select compiled test artifacts, run them, and write a coverage report")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the selected tests, then generate the report
    Run {
        /// Profile to use (defaults to the config's default_profile)
        #[arg(short, long)]
        profile: Option<String>,
        /// Overall execution deadline in seconds
        #[arg(long)]
        deadline: Option<u64>,
        /// Artifacts to run concurrently
        #[arg(long)]
        workers: Option<usize>,
        /// Skip the report phase
        #[arg(long)]
        no_report: bool,
    },
    /// Print the artifacts a profile would select, without running them
    Select {
        #[arg(short, long)]
        profile: Option<String>,
    },
    /// List the available profiles
    Profiles,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("suite_runner=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

async fn dispatch(cli: Cli) -> Result<u8> {
    let config = Config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Run {
            profile,
            deadline,
            workers,
            no_report,
        } => {
            let profile = profile.unwrap_or_else(|| config.default_profile.clone());
            let mut settings = config.execution.settings();
            if let Some(secs) = deadline {
                settings.deadline = Some(Duration::from_secs(secs));
            }
            if let Some(n) = workers {
                anyhow::ensure!(n > 0, "--workers must be at least 1");
                settings.workers = n;
            }

            let mut pipeline = Pipeline::from_config(&config, &profile)?.with_settings(settings);
            if no_report {
                pipeline.disable_report();
            }
            let catalog = discover_artifacts(&config.artifact_dir())?;
            let outcome = pipeline.run(&catalog).await;
            print_outcome(&outcome);
            Ok(outcome.exit_code())
        }
        Commands::Select { profile } => {
            let profile = profile.unwrap_or_else(|| config.default_profile.clone());
            let pipeline = Pipeline::from_config(&config, &profile)?;
            let catalog = discover_artifacts(&config.artifact_dir())?;
            for name in pipeline.select(&catalog) {
                println!("{}", name);
            }
            Ok(0)
        }
        Commands::Profiles => {
            config.validate()?;
            for (name, profile) in config.profiles() {
                let marker = if name == config.default_profile { "*" } else { " " };
                let engines: Vec<&str> = profile.engines.iter().map(|e| e.as_str()).collect();
                println!(
                    "{} {:<12} include [{}]  engines [{}]  report {}",
                    marker,
                    name,
                    profile.include.join(", "),
                    engines.join(", "),
                    if profile.report.enabled {
                        config.report_destination(&profile).display().to_string()
                    } else {
                        "off".to_string()
                    }
                );
            }
            Ok(0)
        }
    }
}

fn print_outcome(outcome: &PipelineOutcome) {
    let summary = outcome.results.summary();
    println!();
    for artifact in outcome.results.outcomes() {
        for run in &artifact.runs {
            let label = match run.status {
                RunStatus::Passed => "PASS",
                RunStatus::Failed => "FAIL",
                RunStatus::NoTests => "----",
                RunStatus::Errored => "ERR ",
                RunStatus::TimedOut => "TIME",
            };
            println!("  {} {} [{}]", label, artifact.artifact, run.engine);
            if let Some(detail) = run.detail.as_deref().filter(|_| run.status.is_failure()) {
                println!("       {}", detail);
            }
        }
    }
    println!();
    println!(
        "  {} artifacts: {} passed, {} failed ({} cases passed, {} failed, {} ignored)",
        summary.artifacts,
        summary.artifacts_passed,
        summary.artifacts_failed,
        summary.cases_passed,
        summary.cases_failed,
        summary.cases_ignored
    );
    match &outcome.report {
        ReportOutcome::Written(manifest) => {
            println!("  Report: {}", manifest.root.display())
        }
        ReportOutcome::Skipped(reason) => println!("  Report skipped: {}", reason),
        ReportOutcome::Failed(e) => println!("  Report FAILED: {}", e),
    }
}
