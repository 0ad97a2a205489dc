//! Warden - per-node supervisor for distributed training jobs
//!
//! Warden tracks the liveness of the worker processes belonging to a job,
//! computes each worker's position in the global rank topology, records
//! process-group-to-communicator mappings once training is underway, and
//! exposes lifecycle callbacks to an external orchestration runtime. This
//! binary is the operator's inspection surface.
//!
//! ## Commands
//!
//! - `ranks` - Show the global ranks owned by this node
//! - `check-cert` - Validate a peer certificate against the trust policy
//! - `group-info` - Show the recorded process-group topology for a rank
//! - `config` - Show the active supervisor configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use warden_agent::{
    init_simple_logging, resolve_global_ranks, CertTrustValidator, SupervisorConfig,
    GROUP_INFO_FILE,
};

/// Warden - per-node supervisor for distributed training jobs
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(about = "Per-node supervisor for distributed training jobs", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the global ranks owned by this node
    ///
    /// Resolution uses NODE_RANK and LOCAL_WORLD_SIZE; when either is
    /// missing or invalid the node owns no ranks.
    Ranks,

    /// Validate a peer certificate against the trust policy
    CheckCert {
        /// Path to a PEM or DER encoded certificate
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show the recorded process-group topology for a job and rank
    GroupInfo {
        /// Job identifier
        #[arg(short, long)]
        job_id: String,

        /// Global rank
        #[arg(short, long)]
        rank: u64,
    },

    /// Show the active supervisor configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_simple_logging(&cli.log_level)?;

    let config = SupervisorConfig::load_or_default();

    match cli.command {
        Commands::Ranks => {
            let ranks = resolve_global_ranks();
            if ranks.is_empty() {
                println!("no ranks owned by this node");
            } else {
                let ranks: Vec<String> = ranks.iter().map(u64::to_string).collect();
                println!("{}", ranks.join(" "));
            }
        }

        Commands::CheckCert { file } => {
            let cert_bytes = fs::read(&file)
                .with_context(|| format!("failed to read certificate {}", file.display()))?;
            let validator = CertTrustValidator::new(config.trust.clone());
            let peer = validator
                .check_cert_info(&cert_bytes)
                .context("certificate rejected")?;
            println!("trusted peer: {}", peer);
        }

        Commands::GroupInfo { job_id, rank } => {
            let path = config
                .profiling_base_dir
                .join(&job_id)
                .join(rank.to_string())
                .join(GROUP_INFO_FILE);
            let content = fs::read_to_string(&path).with_context(|| {
                format!("no group info recorded at {}", path.display())
            })?;
            println!("{}", content);
        }

        Commands::Config => {
            let toml_string =
                toml::to_string_pretty(&config).context("failed to render configuration")?;
            print!("{}", toml_string);
        }
    }

    Ok(())
}
