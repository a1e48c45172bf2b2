use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use icn_verifier::render::{render_anchors, render_lineage, render_validation};
use icn_verifier::{load_credential, load_credentials, load_manifest, OutputFormat, Verifier, VerifierConfig};

/// ICN federation verification CLI
#[derive(Parser)]
#[clap(name = "icn-verifier", version = "0.1.0", about = "Federation quorum, lineage and epoch anchor checks")]
struct Cli {
    /// Path to a TOML configuration file
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Set the log level (info, debug, trace); overrides the config file
    #[clap(short, long)]
    log_level: Option<String>,

    /// Output format (text, json); overrides the config file
    #[clap(short, long)]
    format: Option<OutputFormat>,

    /// Commands
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a report credential against its federation's quorum policy
    Validate {
        /// Report credential JSON
        #[clap(long)]
        credential: PathBuf,

        /// Manifest JSON to validate against
        #[clap(long, conflicts_with = "manifests")]
        manifest: Option<PathBuf>,

        /// Directory of manifests, resolved by the credential's federation id
        #[clap(long)]
        manifests: Option<PathBuf>,
    },

    /// Reconstruct the lineage graph of a credential set
    Lineage {
        /// JSON array of credentials
        #[clap(long)]
        credentials: PathBuf,
    },

    /// Group a credential set under its epoch anchors
    Anchors {
        /// JSON array of credentials
        #[clap(long)]
        credentials: PathBuf,

        /// Flag members whose parents sit in a later epoch
        #[clap(long)]
        check_lineage: bool,
    },
}

fn setup_logging(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to set global default subscriber")
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => VerifierConfig::load_or_default(path)?,
        None => VerifierConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.format {
        config.output.format = format;
    }
    setup_logging(&config.logging.level)?;
    debug!("Using configuration: {:?}", config);

    let format = config.output.format;
    let pretty = config.output.pretty;

    let output = match cli.command {
        Commands::Validate {
            credential,
            manifest,
            manifests,
        } => {
            if manifests.is_some() {
                config.manifests.directory = manifests;
            }
            let credential = load_credential(&credential)?;
            let manifest = manifest.map(load_manifest).transpose()?;
            let verifier = match manifest {
                Some(_) => Verifier::with_registry(&config, Default::default()),
                None => Verifier::new(&config)?,
            };
            let report = verifier.validate(&credential, manifest.as_ref())?;
            render_validation(&report, format, pretty)?
        }
        Commands::Lineage { credentials } => {
            let credentials = load_credentials(&credentials)?;
            let verifier = Verifier::with_registry(&config, Default::default());
            render_lineage(&*verifier.lineage(&credentials)?, format, pretty)?
        }
        Commands::Anchors {
            credentials,
            check_lineage,
        } => {
            let credentials = load_credentials(&credentials)?;
            let verifier = Verifier::with_registry(&config, Default::default());
            render_anchors(&verifier.anchors(&credentials, check_lineage)?, format, pretty)?
        }
    };

    print!("{}", output);
    if format == OutputFormat::Json {
        println!();
    }
    Ok(())
}
