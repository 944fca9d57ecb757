use anyhow::{Context, Result};
use clap::Parser;
use std::{io, path::PathBuf, process::ExitCode};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};
use ukcovid::{config::DEFAULT_CONFIG_PATH, Config, Pipeline, PipelineError, RunSummary};

#[derive(Parser)]
#[command(
    name = "ukcovid",
    version,
    about = "Fetch UK COVID-19 dashboard statistics and save them as CSV"
)]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, env = "UKCOVID_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Write the CSV here instead of the configured `output_path`
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the CSV to stdout instead of writing the output file
    #[arg(long)]
    dry_run: bool,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn run(cli: &Cli) -> Result<RunSummary> {
    let mut cfg = Config::load(&cli.config)
        .map_err(PipelineError::from)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(out) = &cli.output {
        cfg = cfg.with_output_path(out);
    }
    info!(source = %cfg.source_url, output = %cfg.output_path.display(), "config loaded");

    let pipeline = Pipeline::new(cfg);
    let summary = if cli.dry_run {
        pipeline.dry_run(io::stdout().lock())?
    } else {
        pipeline.run()?
    };
    Ok(summary)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // ─── init logging ────────────────────────────────────────────────
    let env =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(io::stderr)
        .init();

    match run(&cli) {
        Ok(summary) => {
            info!(
                rows = summary.rows_written,
                dropped = summary.stats.dropped_invalid,
                duplicates = summary.stats.duplicates_removed,
                "done"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            let stage = err.downcast_ref::<PipelineError>().map(PipelineError::stage);
            error!(stage = stage.map(|s| s.as_str()).unwrap_or("unknown"), "{:#}", err);
            ExitCode::from(stage.map(|s| s.exit_code()).unwrap_or(1))
        }
    }
}
