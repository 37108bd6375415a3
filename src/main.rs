use anyhow::{bail, Context};
use bioclust::orchestrator::{PredictionOrchestrator, RawAnalysisRequest};
use bioclust::results::{ResultStore, Validity};
use bioclust::server::{ApiServer, ApiState};
use bioclust::subprocess::SubprocessManager;
use bioclust::PipelineConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Cluster prediction orchestrator
#[derive(Parser)]
#[command(name = "bioclust")]
#[command(about = "Run the clustering worker and derive relation tables from its output", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a TOML configuration file
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the prediction and validity endpoints
    Serve {
        /// Address to bind (overrides configuration)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run a single prediction and print the response
    Predict {
        /// Predefined dataset name
        #[arg(long, conflicts_with = "file")]
        dataset: Option<String>,

        /// Input table to upload
        #[arg(long)]
        file: Option<PathBuf>,

        #[arg(long)]
        alpha: String,

        #[arg(long)]
        clusters: String,
    },
    /// Check whether a result identifier is still resolvable
    Validate {
        /// Result identifier
        id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2)
        .init();

    debug!("bioclust started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = PipelineConfig::resolve(cli.config.as_deref())?;
    debug!("Resolved configuration: {:?}", config);

    match cli.command {
        Commands::Serve { bind } => {
            let orchestrator = Arc::new(PredictionOrchestrator::from_config(
                &config,
                SubprocessManager::production().runner(),
            ));
            let bind_addr = bind.unwrap_or_else(|| config.bind_addr.clone());
            ApiServer::new(ApiState::new(orchestrator), bind_addr)
                .start()
                .await?;
            Ok(0)
        }
        Commands::Predict {
            dataset,
            file,
            alpha,
            clusters,
        } => {
            let upload = match file {
                Some(path) => {
                    let bytes = tokio::fs::read(&path)
                        .await
                        .with_context(|| format!("cannot read {}", path.display()))?;
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "input.txt".to_string());
                    Some((name, bytes))
                }
                None => None,
            };
            let orchestrator = PredictionOrchestrator::from_config(
                &config,
                SubprocessManager::production().runner(),
            );
            let raw = RawAnalysisRequest {
                upload,
                dataset,
                alpha: Some(alpha),
                clusters: Some(clusters),
            };
            match orchestrator.run(raw).await {
                Ok(outcome) => {
                    println!("{}", serde_json::to_string_pretty(&outcome.record)?);
                    Ok(0)
                }
                Err(e) => bail!("{}", e),
            }
        }
        Commands::Validate { id } => {
            let validity = ResultStore::from_config(&config).lookup(&id).await;
            let is_valid = validity.is_valid();
            println!("{}", serde_json::json!({ "isValid": is_valid }));
            if validity == Validity::Malformed {
                eprintln!("Invalid ID format.");
            }
            Ok(if is_valid { 0 } else { 1 })
        }
    }
}
