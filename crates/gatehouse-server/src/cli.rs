use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use gatehouse_config::{SiteConfig, ValidatorRegistry};

#[derive(Parser)]
#[command(name = "gatehouse")]
#[command(about = "Hot-reloadable OAuth provider gateway")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML)
    #[arg(
        short,
        long,
        global = true,
        env = "GATEHOUSE_CONFIG",
        default_value = "gatehouse.toml"
    )]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the server and reconcile providers on every configuration change
    Run(RunArgs),
    /// Check a configuration file without applying it
    Validate(ValidateArgs),
}

#[derive(clap::Args)]
pub struct RunArgs {
    /// Address to listen on
    #[arg(short, long, env = "GATEHOUSE_LISTEN", default_value = "127.0.0.1:8090")]
    pub listen: SocketAddr,
}

#[derive(clap::Args)]
pub struct ValidateArgs {
    /// File to check (defaults to --config)
    pub path: Option<PathBuf>,
}

/// The pre-acceptance gate with every subsystem's validator contributed.
pub fn default_validators() -> ValidatorRegistry {
    let validators = ValidatorRegistry::new();
    gatehouse_auth::contribute_validator(&validators);
    validators
}

/// Parse a configuration file and return the gate's problems.
///
/// Unlike a running server, a missing file is an error here.
pub fn validate_file(path: &Path) -> anyhow::Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let document = SiteConfig::from_toml(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(default_validators().validate(&document))
}
