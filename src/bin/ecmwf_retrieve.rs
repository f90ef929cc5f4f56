use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use ecmwf_retrieve::app::{ProgressSinkKind, RetrieveOptions, RetrieveResult, Retriever};
use ecmwf_retrieve::assemble::{ConcatTool, CommandConcatenator};
use ecmwf_retrieve::config::{ConfigLoader, ResolvedConfig};
use ecmwf_retrieve::domain::{DatasetTemplate, RequestSpec, Session};
use ecmwf_retrieve::ecmwf::{ArchiveClient, EcmwfHttpClient};
use ecmwf_retrieve::error::RetrieveError;
use ecmwf_retrieve::output::{ConsoleSink, JsonOutput, OutputMode};
use ecmwf_retrieve::splitter::target_stem;

#[derive(Parser)]
#[command(name = "ecmwf-retrieve")]
#[command(about = "Download long ECMWF reanalysis time series in yearly chunks and merge them")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Retrieve a dataset and assemble it into one NetCDF file")]
    Fetch(FetchArgs),
    #[command(about = "Show the sub-requests a fetch would submit")]
    Plan(RequestArgs),
    #[command(about = "Merge chunk files left in a working directory")]
    Assemble(AssembleArgs),
    #[command(about = "Print the default request of a dataset template")]
    Defaults(DefaultsArgs),
}

#[derive(Args, Clone)]
struct RequestArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    template: Option<DatasetTemplate>,

    #[arg(long)]
    date: Option<String>,

    #[arg(long)]
    param: Option<String>,

    #[arg(long)]
    target: Option<String>,

    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,

    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Args)]
struct FetchArgs {
    #[command(flatten)]
    request: RequestArgs,

    #[arg(long)]
    keep_parts: bool,

    #[arg(long)]
    dry_run: bool,

    #[arg(long)]
    concatenator: Option<ConcatTool>,

    #[arg(long, value_name = "SECONDS")]
    poll_interval: Option<u64>,
}

#[derive(Args)]
struct AssembleArgs {
    output: String,

    #[arg(long)]
    dir: Option<PathBuf>,

    #[arg(long)]
    session: Option<String>,

    #[arg(long)]
    keep_parts: bool,

    #[arg(long)]
    concatenator: Option<ConcatTool>,
}

#[derive(Args)]
struct DefaultsArgs {
    #[arg(long, default_value_t = DatasetTemplate::EraInterim)]
    template: DatasetTemplate,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<RetrieveError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &RetrieveError) -> u8 {
    match error {
        RetrieveError::Type(_)
        | RetrieveError::Format(_)
        | RetrieveError::Range(_)
        | RetrieveError::MissingField(_)
        | RetrieveError::InvalidTarget(_)
        | RetrieveError::InvalidSession(_)
        | RetrieveError::InvalidOverride(_)
        | RetrieveError::ConfigRead(_)
        | RetrieveError::ConfigParse(_) => 2,
        RetrieveError::MissingCredentials(_)
        | RetrieveError::ArchiveHttp(_)
        | RetrieveError::ArchiveStatus { .. }
        | RetrieveError::Archive(_) => 3,
        RetrieveError::MissingTool(_)
        | RetrieveError::Concatenation(_)
        | RetrieveError::NoChunks(_) => 4,
        RetrieveError::Filesystem(_) => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Fetch(args) => run_fetch(args, output_mode),
        Commands::Plan(args) => run_plan(args),
        Commands::Assemble(args) => run_assemble(args, output_mode),
        Commands::Defaults(args) => JsonOutput::print_request(&args.template.defaults())
            .into_diagnostic(),
    }
}

/// Stands in for the archive when nothing is submitted.
struct NopArchive;

impl ArchiveClient for NopArchive {
    fn submit(&self, _request: &RequestSpec, _destination: &Path) -> Result<(), RetrieveError> {
        Err(RetrieveError::ArchiveHttp(
            "ECMWF client not configured".to_string(),
        ))
    }
}

fn resolve_job(args: &RequestArgs) -> Result<ResolvedConfig, RetrieveError> {
    let mut resolved = ConfigLoader::resolve(args.config.as_deref())?;
    if let Some(template) = args.template {
        resolved.template = template;
    }
    let flags = [("date", &args.date), ("param", &args.param), ("target", &args.target)];
    for (key, value) in flags {
        if let Some(value) = value {
            resolved.overrides.insert(key, value.clone());
        }
    }
    for assignment in &args.set {
        let (key, value) = parse_assignment(assignment)?;
        resolved.overrides.insert(key, value);
    }
    if let Some(dir) = &args.output_dir {
        resolved.output_dir = dir.clone();
    }
    Ok(resolved)
}

fn parse_assignment(value: &str) -> Result<(String, String), RetrieveError> {
    let (key, rest) = value
        .split_once('=')
        .ok_or_else(|| RetrieveError::InvalidOverride(value.to_string()))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(RetrieveError::InvalidOverride(value.to_string()));
    }
    Ok((key.to_string(), rest.to_string()))
}

fn run_fetch(args: FetchArgs, output_mode: OutputMode) -> miette::Result<()> {
    let job = resolve_job(&args.request)?;
    let concatenator = CommandConcatenator::new(args.concatenator.unwrap_or(job.concatenator));
    let options = RetrieveOptions {
        template: job.template,
        delete_parts: job.delete_parts && !args.keep_parts,
        dry_run: args.dry_run,
    };

    if args.dry_run {
        let retriever = Retriever::new(NopArchive, concatenator, job.output_dir.clone());
        return finish_fetch(retriever, &job, options, output_mode);
    }

    if !concatenator.is_available() {
        warn!(
            tool = %args.concatenator.unwrap_or(job.concatenator).program(),
            "concatenation tool not found on PATH; chunks will be kept"
        );
    }
    let mut client = EcmwfHttpClient::from_environment()?;
    if let Some(seconds) = args.poll_interval {
        client = client.with_poll_interval(Duration::from_secs(seconds));
    }
    let retriever = Retriever::new(client, concatenator, job.output_dir.clone());
    finish_fetch(retriever, &job, options, output_mode)
}

fn finish_fetch<C: ArchiveClient>(
    retriever: Retriever<C, CommandConcatenator>,
    job: &ResolvedConfig,
    options: RetrieveOptions,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = retriever.retrieve_spec(Some(&job.overrides), options, &JsonOutput)?;
            JsonOutput::print_retrieve(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let sink = ConsoleSink::new(ProgressSinkKind::Fetch);
            let result = retriever.retrieve_spec(Some(&job.overrides), options, &sink)?;
            print_fetch_summary(&result);
            Ok(())
        }
    }
}

fn print_fetch_summary(result: &RetrieveResult) {
    let green = "\x1b[32m";
    let cyan = "\x1b[36m";
    let yellow = "\x1b[33m";
    let reset = "\x1b[0m";

    println!("{cyan}ecmwf-retrieve summary (session {}){reset}", result.session);
    if result.dry_run {
        println!("{yellow}dry run: {} requests planned{reset}", result.chunks.len());
        for chunk in &result.chunks {
            println!("{yellow}  {chunk}{reset}");
        }
    } else {
        println!("{green}requests retrieved: {}{reset}", result.chunks.len());
        println!("{green}chunk files removed: {}{reset}", result.deleted);
    }
    println!("{cyan}output: {}{reset}", result.output);
}

fn run_plan(args: RequestArgs) -> miette::Result<()> {
    let job = resolve_job(&args)?;
    let retriever = Retriever::new(
        NopArchive,
        CommandConcatenator::new(job.concatenator),
        job.output_dir.clone(),
    );
    let plan = retriever.plan(Some(&job.overrides), job.template)?;
    JsonOutput::print_plan(&plan).into_diagnostic()
}

fn run_assemble(args: AssembleArgs, output_mode: OutputMode) -> miette::Result<()> {
    let session = args
        .session
        .as_deref()
        .map(str::parse::<Session>)
        .transpose()?;
    let dir = args
        .dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(target_stem(&args.output)));
    let retriever = Retriever::new(
        NopArchive,
        CommandConcatenator::new(args.concatenator.unwrap_or_default()),
        dir.clone(),
    );

    let report = match output_mode {
        OutputMode::NonInteractive => retriever.assemble_existing(
            &dir,
            &args.output,
            session.as_ref(),
            !args.keep_parts,
            &JsonOutput,
        ),
        OutputMode::Interactive => retriever.assemble_existing(
            &dir,
            &args.output,
            session.as_ref(),
            !args.keep_parts,
            &ConsoleSink::new(ProgressSinkKind::Assemble),
        ),
    }?;
    JsonOutput::print_assemble(&report).into_diagnostic()
}
