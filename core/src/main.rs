//! `gorest-suite [OPTIONS] [SUITE...]`
//!
//! Runs the named suites (all of them by default) against the configured
//! endpoint. Exit status: 0 when every case passed, 1 when any case failed or
//! was skipped, 2 when the run could not be set up.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use gorest_suite::{
    suites, ConfigError, Executor, JsonSink, LogSink, PlanError, ReportError, ReportSink,
    Scheduler, Suite, SuiteConfig,
};
use thiserror::Error;

/// Dependency-ordered API tests for the GoRest service
#[derive(Debug, Parser)]
#[command(name = "gorest-suite")]
#[command(about = "Dependency-ordered API tests for the GoRest service")]
#[command(version)]
struct Args {
    /// Suites to run, or `all`; every suite when empty
    suites: Vec<String>,

    /// Print the known suite names and exit
    #[arg(long)]
    list: bool,

    /// Write the JSON report here (overrides GOREST_REPORT)
    #[arg(short, long)]
    report: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Report(#[from] ReportError),
}

fn run(args: &Args) -> Result<bool, RunError> {
    let mut config = SuiteConfig::load()?;
    if let Some(path) = &args.report {
        config.report_path = Some(path.clone());
    }
    if config.client.token.is_none() {
        log::warn!("GOREST_TOKEN is not set; write requests will be refused");
    }
    log::info!("target {}", config.client.base_url);

    let executor = Arc::new(Executor::new(&config.client));
    let suite = Suite::new(executor, config.failure_mode, config.fixtures.clone());
    let plan = suites::plan(&args.suites, &suite)?;

    let label = if args.suites.is_empty() {
        "all".to_string()
    } else {
        args.suites.join(",")
    };
    let report = Scheduler::with_workers(config.workers).run(&label, &plan);

    LogSink.emit(&report)?;
    if let Some(path) = &config.report_path {
        let file = File::create(path).map_err(ReportError::from)?;
        JsonSink::new(BufWriter::new(file)).emit(&report)?;
        log::info!("report written to {}", path.display());
    }
    Ok(report.is_success())
}

fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if args.list {
        for name in suites::names() {
            println!("{name}");
        }
        return ExitCode::SUCCESS;
    }

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(2)
        }
    }
}
