use std::fs;
use std::io::{self, BufWriter};
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgMatches, CommandFactory, FromArgMatches};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use sherlog_logs::{
    ConfigFile, CountFormat, CountProcessor, CountTemplate, FileSource, MapperRegistry, Pipeline,
    PrintFormat, PrintProcessor,
};

mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches)
        .map_err(|e| e.format(&mut Cli::command()))
        .unwrap_or_else(|e| e.exit());

    // Diagnostics go to stderr so stdout carries only results
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(io::stderr)
        .init();

    match run(cli, &matches).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, matches: &ArgMatches) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ConfigFile::from_path(path)?,
        None => ConfigFile::default(),
    };

    let mut registry = MapperRegistry::with_builtins();
    registry
        .load(&config)
        .context("invalid mapper configuration")?;

    let layout = cli.layout(&config.defaults);
    let mapper = registry.resolve(layout)?.clone();

    let (_, command_matches) = matches.subcommand().context("no command given")?;
    let predicate = cli::build_filter(command_matches).context("invalid filter")?;

    let run_args = cli.command.run_args();
    let scan_continuations = run_args.scan_continuations(&config.defaults);
    tracing::debug!(
        layout,
        layouts = registry.len(),
        filter = %predicate,
        max = ?run_args.limit(),
        scan_continuations,
        "starting pipeline"
    );

    let source = FileSource::new(run_args.files.iter());
    let pipeline = Pipeline::new(mapper)
        .with_filter(predicate)
        .with_max(run_args.limit())
        .scan_continuations(scan_continuations);

    let stdout = BufWriter::new(io::stdout());
    match cli.command {
        Command::Print { format, .. } => {
            let processor = PrintProcessor::new(stdout, PrintFormat::parse(&format));
            pipeline.execute(source, processor).await?;
        }
        Command::Count {
            group,
            output,
            template,
            ..
        } => {
            let format = match template {
                Some(path) => CountFormat::Template(read_template(&path)?),
                None => output.parse()?,
            };
            let processor = CountProcessor::new(&group, format, stdout)?;
            pipeline.execute(source, processor).await?;
        }
    }

    Ok(())
}

fn read_template(path: &Path) -> Result<CountTemplate> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read template {}", path.display()))?;
    Ok(CountTemplate::parse(text.trim_end_matches(['\n', '\r'])))
}
