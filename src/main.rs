//! Feature Factory - plan, generate, and reconcile LLM-driven project edits

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use colored::Colorize;
use feature_factory::config::{FactoryConfig, OracleBackend};
use feature_factory::pipeline::{load_plan, write_plan, Pipeline, PLAN_FILE_NAME, REPORT_FILE_NAME};
use feature_factory::{
    create_oracle, ContextBuilder, GenerationOracle, PathRemapper, Reconciler, Result,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "factory")]
#[command(version)]
#[command(about = "Plan, generate, and reconcile feature edits to an existing project", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Input project directory (overrides pipeline.input_dir)
    #[arg(short, long, global = true)]
    input: Option<PathBuf>,

    /// Output project directory (overrides pipeline.output_dir)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Directory for the run plan and report (overrides pipeline.report_dir)
    #[arg(long, global = true)]
    report_dir: Option<PathBuf>,

    /// Configuration file (defaults to ./factory.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Maximum generation requests in flight
    #[arg(long, global = true, value_name = "N")]
    concurrency: Option<usize>,

    /// Keep files that already exist in the output tree
    #[arg(long, global = true)]
    no_overwrite: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a feature request to the input project, writing the output project
    Run {
        /// Natural-language description of the feature
        feature_request: String,
    },

    /// Produce the validated edit plan without generating code
    Plan {
        /// Natural-language description of the feature
        feature_request: String,

        /// Write the plan here instead of printing it
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Print the planning context for the input project
    Context {
        /// Also print the context's sha256
        #[arg(long)]
        hash: bool,
    },

    /// Check an output tree against a saved plan
    Validate {
        /// Plan file written by `run` or `plan`
        #[arg(long)]
        plan: PathBuf,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose {
        "feature_factory=debug,factory=debug,info"
    } else {
        "feature_factory=info,factory=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> Result<FactoryConfig> {
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let mut config = FactoryConfig::load(&cwd, cli.config.as_deref())?;

    if let Some(input) = &cli.input {
        config.pipeline.input_dir = input.clone();
    }
    if let Some(output) = &cli.output {
        config.pipeline.output_dir = output.clone();
    }
    if let Some(report_dir) = &cli.report_dir {
        config.pipeline.report_dir = Some(report_dir.clone());
    }
    if let Some(concurrency) = cli.concurrency {
        config.oracle.concurrency = concurrency;
    }
    if cli.no_overwrite {
        config.pipeline.overwrite = false;
    }

    config.validate()?;
    Ok(config)
}

fn pipeline(config: FactoryConfig) -> Result<Pipeline> {
    let api_key = match config.oracle.backend {
        OracleBackend::Http => Some(config.resolve_api_key()?),
        OracleBackend::Command => None,
    };
    let oracle = create_oracle(&config, api_key)?;
    tracing::debug!("Using {} oracle ({})", config.oracle.backend, oracle.name());
    Ok(Pipeline::new(config, oracle))
}

async fn execute(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Run { feature_request } => {
            let output_dir = config.pipeline.output_dir.clone();
            let report_dir = config.pipeline.report_dir()?;
            let report = pipeline(config)?.run(&feature_request).await?;

            println!(
                "\n{} Feature applied to {}",
                "OK".green().bold(),
                output_dir.display()
            );
            println!("  Run:       {}", report.run_id);
            println!("  Modified:  {}", report.plan.existing_files.len());
            println!("  Created:   {}", report.plan.new_files.len());
            if !report.apply.skipped.is_empty() {
                println!(
                    "  Skipped:   {} {}",
                    report.apply.skipped.len(),
                    "(already present, --no-overwrite)".dimmed()
                );
            }
            println!("  Duration:  {}ms", report.duration().num_milliseconds());
            println!("  Plan:      {}", report_dir.join(PLAN_FILE_NAME).display());
            println!("  Report:    {}", report_dir.join(REPORT_FILE_NAME).display());
        }

        Commands::Plan {
            feature_request,
            out,
        } => {
            let outcome = pipeline(config)?.plan(&feature_request).await?;
            match out {
                Some(path) => {
                    write_plan(&outcome.plan, &path)?;
                    println!(
                        "{} Plan with {} tasks written to {}",
                        "OK".green().bold(),
                        outcome.plan.task_count(),
                        path.display()
                    );
                }
                None => println!("{}", serde_json::to_string_pretty(&outcome.plan)?),
            }
        }

        Commands::Context { hash } => {
            let (context, stats) = ContextBuilder::new(&config.pipeline.input_dir)
                .preview_lines(config.pipeline.manifest_preview_lines)
                .build_with_stats()?;
            print!("{}", context);
            if hash {
                println!("sha256: {}", stats.context_hash);
            }
        }

        Commands::Validate { plan } => {
            let plan = load_plan(&plan)?;
            let reconciler = Reconciler::new(PathRemapper::new(
                &config.pipeline.input_dir,
                &config.pipeline.output_dir,
            ));
            let report = reconciler.validate(&plan)?;

            if report.is_pass() {
                println!(
                    "{} All {} planned files present in {}",
                    "OK".green().bold(),
                    report.expected.len(),
                    config.pipeline.output_dir.display()
                );
            } else {
                for path in &report.missing {
                    println!("  {} {}", "missing".red(), path.display());
                }
                report.ensure_pass()?;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    if let Err(e) = execute(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(e.exit_code());
    }
}
