//! `akm-cli`: operator entry point for the key appliance client.
//!
//! Startup sequence:
//! 1. Parse arguments.
//! 2. Initialise structured JSON logging on stderr.
//! 3. Load and validate [`AkmConfig`] from the optional file plus `AKM_*`
//!    environment variables.
//! 4. Run the requested operation and write its result to stdout.

mod telemetry;

use std::io::Write;
use std::path::PathBuf;

use akm_client::codec::encode_output;
use akm_client::{AkmClient, AkmConfig};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::KeyEncoding;
use tracing::error;
use zeroize::Zeroizing;

#[derive(Debug, Parser)]
#[command(name = "akm-cli", version, about = "Talk to a remote key-management appliance")]
struct Cli {
    /// Configuration file (JSON, YAML or TOML). `AKM_*` variables override it.
    #[arg(long, short, env = "AKM_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Retrieve the configured key and print it in the configured encoding.
    ///
    /// With `encode = BIN` the raw key bytes are written without a newline.
    RetrieveKey,

    /// Encrypt PLAINTEXT and print the resulting blob.
    Encrypt { plaintext: String },

    /// Decrypt a BLOB printed by `encrypt` and print the plaintext.
    Decrypt { blob: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    telemetry::init(&cli.log_level).map_err(|e| {
        eprintln!("ERROR: akm-cli logging setup failed: {e}");
        e
    })?;

    run(cli).await.map_err(|e| {
        error!(error = format!("{e:#}"), "akm-cli failed");
        e
    })
}

async fn run(cli: Cli) -> Result<()> {
    let config = AkmConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let client = AkmClient::new();

    match cli.command {
        Command::RetrieveKey => {
            let key = client
                .retrieve_key(&config)
                .await
                .context("key retrieval failed")?;
            let encoded = Zeroizing::new(encode_output(key.as_bytes(), config.encode));
            write_output(&encoded, config.encode != KeyEncoding::Binary)
        }
        Command::Encrypt { plaintext } => {
            let blob = client
                .encrypt(plaintext.as_bytes(), &config)
                .await
                .context("encryption failed")?;
            write_output(&blob.to_bytes(), true)
        }
        Command::Decrypt { blob } => {
            let plaintext = client
                .decrypt(blob.trim_end().as_bytes(), &config)
                .await
                .context("decryption failed")?;
            write_output(&plaintext, true)
        }
    }
}

fn write_output(bytes: &[u8], newline: bool) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(bytes).context("failed to write output")?;
    if newline {
        stdout.write_all(b"\n").context("failed to write output")?;
    }
    stdout.flush().context("failed to flush output")
}
