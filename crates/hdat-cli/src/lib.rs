//! Command-line front-end for hdat.
//!
//! The binary registers the built-in suites; projects with their own suites
//! build a [`SuiteRegistry`] and call [`run_with_registry`] from their own
//! `main`.

pub mod demo;

use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use hdat_error::HdatError;
use hdat_harness::{
    GitCli, HdatConfig, HdatContext, LogFormat, RunSummary, SuiteRegistry, SystemClock,
    init_logging, resolve_casespecs, write_csv,
};
use hdat_types::{ResultRecord, Status};
use tracing::{error, info, warn};

/// Failures surfaced by a command.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Hdat(#[from] HdatError),

    /// A batch where not every case passed.
    #[error("{summary}")]
    CasesNotPassed { summary: RunSummary },

    #[error("can not diff results from different suites \"{golden}\" and \"{result}\"")]
    SuiteMismatch { golden: String, result: String },

    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

/// Golden-result regression harness.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "hdat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Emit logs on stderr as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List available cases.
    List {
        #[arg(value_name = "CASE")]
        casespecs: Vec<String>,
    },
    /// Run cases, store results in the archive, compare against goldens.
    Run {
        #[arg(value_name = "CASE")]
        casespecs: Vec<String>,
    },
    /// Visualize results.
    Show {
        #[arg(value_name = "RESULT")]
        resultspecs: Vec<String>,
    },
    /// Run cases, then visualize their newest results.
    Runshow {
        #[arg(value_name = "CASE")]
        casespecs: Vec<String>,
    },
    /// Compare two results of the same suite.
    Diff {
        #[arg(value_name = "GOLDEN")]
        golden: String,
        #[arg(value_name = "RESULT")]
        result: String,
    },
    /// Move result metrics from the archive into the golden store.
    Verify {
        #[arg(value_name = "RESULT")]
        resultspecs: Vec<String>,
    },
    /// Print results as CSV.
    Csv {
        #[arg(value_name = "RESULT")]
        resultspecs: Vec<String>,
        /// Comma-separated dotted keys; a trailing `*` expands every key below.
        #[arg(long)]
        keys: Option<String>,
    },
}

/// Parse `args`, build the context from the environment, and run the command.
pub fn run_with_registry<I, T>(registry: SuiteRegistry, args: I) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    if let Err(err) = init_logging(format) {
        eprintln!("warning: {err}");
    }

    let outcome = open_context(registry)
        .map_err(CliError::from)
        .and_then(|ctx| execute(&cli.command, &ctx, &mut io::stdout().lock()));
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match &err {
                CliError::Hdat(inner) if inner.is_user_error() => {
                    warn!(error = %err, "command rejected");
                }
                _ => error!(error = %err, "command failed"),
            }
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Context for the current working directory: discovered locations, the
/// git revision of the repository, and the system clock.
pub fn open_context(registry: SuiteRegistry) -> Result<HdatContext, HdatError> {
    let cwd = std::env::current_dir()?;
    let config = HdatConfig::discover(&cwd)?;
    let git = GitCli::new(&config.repo_root);
    HdatContext::from_source(config, registry, &git, Box::new(SystemClock))
}

/// Run one command against `ctx`, writing its report to `out`.
pub fn execute(command: &Command, ctx: &HdatContext, out: &mut dyn Write) -> Result<(), CliError> {
    match command {
        Command::List { casespecs } => {
            for address in resolve_casespecs(ctx.registry(), &everything_if_empty(casespecs))? {
                writeln!(out, "{address}")?;
            }
        }
        Command::Run { casespecs } => {
            let summary = run_and_report(ctx, casespecs, out)?;
            if !summary.all_passed() {
                return Err(CliError::CasesNotPassed { summary });
            }
        }
        Command::Show { resultspecs } => {
            let results = ctx.resolver().resolve_all(&everything_if_empty(resultspecs))?;
            for result in &results {
                show_result(ctx, result, out)?;
            }
        }
        Command::Runshow { casespecs } => {
            let summary = run_and_report(ctx, casespecs, out)?;
            if summary.count(Status::Error) > 0 {
                return Err(CliError::CasesNotPassed { summary });
            }
            let results = ctx.resolver().resolve_all(&everything_if_empty(casespecs))?;
            for result in &results {
                show_result(ctx, result, out)?;
            }
        }
        Command::Diff { golden, result } => {
            let goldens = ctx.resolver().resolve(golden)?;
            let results = ctx.resolver().resolve(result)?;
            for (golden, result) in goldens.iter().zip(&results) {
                diff_results(ctx, golden, result, out)?;
            }
        }
        Command::Verify { resultspecs } => {
            let results = ctx.resolver().resolve_all(&everything_if_empty(resultspecs))?;
            for (result, path) in results.iter().zip(ctx.verify(&results)?) {
                info!(result = %result.resultspec(), "verified");
                writeln!(out, "verified {} -> {}", result.resultspec(), path.display())?;
            }
        }
        Command::Csv { resultspecs, keys } => {
            let results = ctx.resolver().resolve_all(&everything_if_empty(resultspecs))?;
            write_csv(&results, keys.as_deref(), out)?;
        }
    }
    Ok(())
}

/// No specifier means every case (or every newest result).
fn everything_if_empty(specs: &[String]) -> Vec<String> {
    if specs.is_empty() {
        vec![String::new()]
    } else {
        specs.to_vec()
    }
}

fn run_and_report(
    ctx: &HdatContext,
    casespecs: &[String],
    out: &mut dyn Write,
) -> Result<RunSummary, CliError> {
    let cases = resolve_casespecs(ctx.registry(), &everything_if_empty(casespecs))?;
    let summary = ctx.controller().run_cases(&cases);
    for outcome in &summary.outcomes {
        writeln!(
            out,
            "Case \"{}\" status: {}\n{}\n",
            outcome.address, outcome.status, outcome.comment
        )?;
    }
    writeln!(out, "{summary}")?;
    Ok(summary)
}

fn show_result(
    ctx: &HdatContext,
    result: &ResultRecord,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    ctx.registry().get(&result.suite_id)?.show(result, out)?;
    Ok(())
}

fn diff_results(
    ctx: &HdatContext,
    golden: &ResultRecord,
    result: &ResultRecord,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    if golden.suite_id != result.suite_id {
        return Err(CliError::SuiteMismatch {
            golden: golden.suite_id.clone(),
            result: result.suite_id.clone(),
        });
    }
    ctx.registry().get(&result.suite_id)?.diff(golden, result, out)?;
    Ok(())
}
