use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use simverdict_analysis::logging::init_logging;
use simverdict_analysis::{
    Analyzer, AnalyzerConfig, PolicyLoadMode, Report, load_policy_with_source,
};
use simverdict_error::{EXIT_FAIL, EXIT_FATAL, EXIT_PASS, Result, VerdictError};
use tracing::{error, info};

#[derive(Debug, Default, PartialEq, Eq)]
struct CliOptions {
    inputs: Vec<PathBuf>,
    thresholds: Option<PathBuf>,
    require_thresholds: bool,
    config: Option<PathBuf>,
    unknown_is_failure: bool,
    output: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    verbose: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Analyze(CliOptions),
    Help,
}

const HELP: &str = "\
simverdict: scenario verdicts from structured simulation logs

USAGE:
    simverdict --input <FILE-OR-DIR>... [OPTIONS]

OPTIONS:
    --input <PATH>...         JSONL log file or directory of *.jsonl files
                              (repeatable; directories expand in sorted order)
    --thresholds <FILE>       Threshold policy JSON (built-in default when omitted)
    --require-thresholds      Fail instead of falling back when the policy is unusable
    --config <FILE>           Analyzer configuration JSON
    --unknown-is-failure      Count runs without any verdict signal as failed
    --output <FILE>           Write the report to a file (stdout when omitted)
    --log-dir <DIR>           Also write diagnostic logs as JSON lines to DIR
    --verbose                 Lower the diagnostic log filter to DEBUG
    -h, --help                Show this help

EXIT CODES:
    0  every verdict passed
    1  at least one verdict failed or stayed unknown
    2  usage error or fatal analysis error
";

fn take_value(
    flag: &str,
    args: &mut std::iter::Peekable<impl Iterator<Item = OsString>>,
) -> std::result::Result<PathBuf, String> {
    match args.next() {
        Some(value) if !value.to_string_lossy().starts_with("--") => Ok(PathBuf::from(value)),
        _ => Err(format!("{flag} requires a value")),
    }
}

fn parse_args(args: impl IntoIterator<Item = OsString>) -> std::result::Result<Command, String> {
    let mut options = CliOptions::default();
    let mut args = args.into_iter().peekable();

    while let Some(arg) = args.next() {
        let Some(flag) = arg.to_str() else {
            return Err(format!("unexpected argument: {}", arg.to_string_lossy()));
        };
        match flag {
            "--input" => {
                options.inputs.push(take_value(flag, &mut args)?);
                while let Some(next) =
                    args.next_if(|next| !next.to_string_lossy().starts_with('-'))
                {
                    options.inputs.push(PathBuf::from(next));
                }
            }
            "--thresholds" => options.thresholds = Some(take_value(flag, &mut args)?),
            "--require-thresholds" => options.require_thresholds = true,
            "--config" => options.config = Some(take_value(flag, &mut args)?),
            "--unknown-is-failure" => options.unknown_is_failure = true,
            "--output" => options.output = Some(take_value(flag, &mut args)?),
            "--log-dir" => options.log_dir = Some(take_value(flag, &mut args)?),
            "--verbose" | "-v" => options.verbose = true,
            "-h" | "--help" => return Ok(Command::Help),
            unknown => return Err(format!("unknown option: {unknown}")),
        }
    }

    if options.inputs.is_empty() {
        return Err("at least one --input is required".to_owned());
    }
    if options.require_thresholds && options.thresholds.is_none() {
        return Err("--require-thresholds needs --thresholds <FILE>".to_owned());
    }
    Ok(Command::Analyze(options))
}

fn analyze(options: &CliOptions) -> Result<Report> {
    let mut config = match &options.config {
        Some(path) => AnalyzerConfig::from_json_file(path)?,
        None => AnalyzerConfig::default(),
    };
    config.unknown_is_failure |= options.unknown_is_failure;

    let mode = if options.require_thresholds {
        PolicyLoadMode::Required
    } else {
        PolicyLoadMode::FallbackToDefault
    };
    let (policy, policy_source) = load_policy_with_source(options.thresholds.as_deref(), mode)?;

    Analyzer::new(config, policy)?
        .with_policy_source(policy_source)
        .analyze_files(&options.inputs)
}

fn emit(report: &Report, options: &CliOptions) -> Result<()> {
    match &options.output {
        Some(path) => {
            report.write_json(path)?;
            info!(path = %path.display(), "report written");
        }
        None => {
            let json = report
                .to_pretty_json()
                .map_err(|err| VerdictError::serialization(err.to_string()))?;
            println!("{json}");
        }
    }
    eprintln!("{}", report.summary_line());
    Ok(())
}

fn report_fatal(err: &VerdictError) -> i32 {
    error!(code = err.error_code().as_str(), error = %err, "analysis aborted");
    eprintln!("error[{}]: {err}", err.error_code().as_str());
    if let Some(hint) = err.suggestion() {
        eprintln!("hint: {hint}");
    }
    err.exit_code()
}

/// Analyze, emit, and map the outcome to an exit code.
fn execute(options: &CliOptions) -> i32 {
    let outcome = analyze(options).and_then(|report| {
        emit(&report, options)?;
        Ok(report)
    });
    match outcome {
        Ok(report) if report.verdict.is_pass() => EXIT_PASS,
        Ok(_) => EXIT_FAIL,
        Err(err) => report_fatal(&err),
    }
}

fn run(args: impl IntoIterator<Item = OsString>) -> i32 {
    let options = match parse_args(args) {
        Ok(Command::Analyze(options)) => options,
        Ok(Command::Help) => {
            println!("{HELP}");
            return EXIT_PASS;
        }
        Err(message) => {
            eprintln!("error: {message}\n\n{HELP}");
            return EXIT_FATAL;
        }
    };

    let _guard = match init_logging(options.log_dir.as_deref(), options.verbose) {
        Ok(guard) => guard,
        Err(err) => return report_fatal(&err),
    };
    execute(&options)
}

fn main() -> ExitCode {
    let code = run(env::args_os().skip(1));
    ExitCode::from(u8::try_from(code).unwrap_or(2))
}
