use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use jwnet_client::{CancellationToken, Config, ConfigOptions, JwnetClient, ManifestApi};
use log::warn;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// jwnet - JWNET electronic manifest client
///
/// Sends manifest registrations, reservations and inquiries to the JWNET API,
/// retrying transient failures. Every option can also be set through the
/// matching JWNET_* environment variable.
///
/// Examples:
///   jwnet ping                       # Check that the API is reachable
///   jwnet register manifest.json     # Register the manifest in manifest.json
#[derive(Parser, Debug)]
#[command(author, version = env!("JWNET_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base URL of the JWNET API
    #[arg(long, env = "JWNET_API_URL", value_name = "URL", global = true)]
    api_url: Option<String>,

    /// API key sent as X-JWNET-API-Key
    #[arg(long, env = "JWNET_API_KEY", value_name = "KEY", global = true, hide_env_values = true)]
    api_key: Option<String>,

    /// Subscriber number sent as X-JWNET-Subscriber-No
    #[arg(long, env = "JWNET_SUBSCRIBER_NO", value_name = "NO", global = true)]
    subscriber_no: Option<String>,

    /// Public confirmation number sent as X-JWNET-Public-Confirm-No
    #[arg(long, env = "JWNET_PUBLIC_CONFIRM_NO", value_name = "NO", global = true)]
    public_confirm_no: Option<String>,

    /// Per-attempt timeout in milliseconds (default 30000)
    #[arg(long, env = "JWNET_TIMEOUT_MS", value_name = "MS", global = true)]
    timeout_ms: Option<u64>,

    /// Retries after the first attempt for transient failures (default 3)
    #[arg(long, env = "JWNET_MAX_RETRIES", value_name = "N", global = true)]
    max_retries: Option<u32>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Check connectivity to the API health endpoint
    Ping,

    /// Register a manifest
    Register(PayloadArgs),

    /// Reserve manifest numbers
    Reserve(PayloadArgs),

    /// Look up registered manifests
    Inquire(PayloadArgs),
}

#[derive(clap::Args, Debug)]
struct PayloadArgs {
    /// JSON object to send ("-" reads from stdin)
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

impl Cli {
    fn config_options(&self) -> ConfigOptions {
        ConfigOptions {
            api_url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            subscriber_no: self.subscriber_no.clone(),
            public_confirm_no: self.public_confirm_no.clone(),
            timeout: self.timeout_ms.map(Duration::from_millis),
            max_retries: self.max_retries,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config = Config::from_options(cli.config_options())?;
    let client = JwnetClient::new(config)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling request...");
                cancel.cancel();
            }
        }
    });

    let outcome = match &cli.command {
        Commands::Ping => {
            return Ok(if client.test_connection().await {
                println!("ok");
                ExitCode::SUCCESS
            } else {
                println!("unreachable");
                ExitCode::FAILURE
            });
        }
        Commands::Register(args) => client
            .register_manifest(&read_payload(&args.file)?, &cancel)
            .await
            .map(|response| Value::Object(response.into_fields())),
        Commands::Reserve(args) => client
            .reserve_numbers(&read_payload(&args.file)?, &cancel)
            .await
            .map(|response| Value::Object(response.into_fields())),
        Commands::Inquire(args) => client
            .inquire_manifest(&read_payload(&args.file)?, &cancel)
            .await
            .map(|response| Value::Object(response.into_fields())),
    };

    match outcome {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            eprintln!("Error: {}", error);
            eprintln!("{}", serde_json::to_string_pretty(&error.to_record())?);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Reads a JSON payload from `path`, or from stdin when `path` is "-".
fn read_payload<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = if path == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read payload from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read payload from {}", path.display()))?
    };

    serde_json::from_str(&content)
        .with_context(|| format!("Payload in {} is not a JSON object", path.display()))
}
