//! forgehook CLI entry point.
//!
//! A thin composition root over the `listener` crate, used to replay recorded
//! deliveries and to inspect the effective configuration:
//!
//! - `forgehook parse` runs one stored delivery through the pipeline and
//!   prints the canonical event as JSON on stdout.
//! - `forgehook providers` lists the registered platforms with their credential
//!   and effective verification policy.
//! - `forgehook sign` prints the `sha256=<hex>` signature of a body, for
//!   crafting test deliveries.
//!
//! Logs go to stderr so stdout stays machine-readable.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::{debug, error};

use listener::signature::hmac_sha256_hex;
use listener::{Dispatcher, ListenerConfig, WebhookRequest, WebhookSecret};

/// forgehook: normalize source-control webhooks into one event shape.
#[derive(Parser, Debug)]
#[command(name = "forgehook", version, about, long_about = None)]
struct Cli {
    /// Path to a JSON listener config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse one stored webhook delivery
    Parse {
        /// Platform identifier (github, gitlab, bitbucket-server, bitbucket-cloud, azure-repos)
        #[arg(short, long)]
        provider: String,

        /// File holding the raw request body
        #[arg(short, long)]
        body: PathBuf,

        /// Request header as 'Name: value' (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// URL query parameter as 'key=value', taken verbatim (repeatable)
        #[arg(short, long = "query")]
        query: Vec<String>,

        /// Environment variable holding the webhook secret or token
        #[arg(long, default_value = "FORGEHOOK_SECRET")]
        secret_env: String,
    },

    /// List registered platforms and their verification policy
    Providers,

    /// Print the HMAC-SHA256 signature of a body
    Sign {
        /// File holding the raw request body
        #[arg(short, long)]
        body: PathBuf,

        /// Environment variable holding the webhook secret
        #[arg(long, default_value = "FORGEHOOK_SECRET")]
        secret_env: String,
    },
}

fn init_tracing(verbose: bool, format: LogFormat) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("forgehook=debug,listener=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Parse {
            provider,
            body,
            headers,
            query,
            secret_env,
        } => cmd_parse(&config, &provider, &body, &headers, &query, &secret_env).await,
        Commands::Providers => cmd_providers(&config),
        Commands::Sign { body, secret_env } => cmd_sign(&body, &secret_env).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<ListenerConfig> {
    match path {
        Some(path) => ListenerConfig::load(path).context("loading listener config"),
        None => Ok(ListenerConfig::default()),
    }
}

fn read_secret(var: &str) -> WebhookSecret {
    match std::env::var(var) {
        Ok(value) => WebhookSecret::new(value),
        Err(_) => {
            debug!(var, "No secret in environment; verification may be skipped");
            WebhookSecret::none()
        }
    }
}

async fn cmd_parse(
    config: &ListenerConfig,
    provider: &str,
    body: &Path,
    headers: &[String],
    query: &[String],
    secret_env: &str,
) -> Result<()> {
    let header_map = parse_headers(headers)?;
    let query = parse_query(query)?;
    let file = tokio::fs::File::open(body)
        .await
        .with_context(|| format!("opening body file {}", body.display()))?;

    let request = WebhookRequest::read_from(header_map, None, file)
        .await
        .with_context(|| format!("reading body file {}", body.display()))?;
    let request = query
        .into_iter()
        .fold(request, |request, (name, value)| request.with_query_param(name, value));

    let dispatcher = Dispatcher::from_config(config);
    let event = dispatcher.dispatch_named(provider, &read_secret(secret_env), &request)?;

    println!("{}", serde_json::to_string_pretty(&event)?);
    Ok(())
}

fn cmd_providers(config: &ListenerConfig) -> Result<()> {
    let dispatcher = Dispatcher::from_config(config);

    let rows: Vec<_> = events::Provider::ALL
        .iter()
        .map(|&provider| match dispatcher.parser(provider) {
            Some(parser) => {
                let auth = parser.authentication();
                json!({
                    "provider": provider,
                    "enabled": true,
                    "credential": auth.credential.describe(),
                    "verification": auth.effective_policy(),
                })
            }
            None => json!({ "provider": provider, "enabled": false }),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

async fn cmd_sign(body: &Path, secret_env: &str) -> Result<()> {
    let secret = std::env::var(secret_env).with_context(|| format!("{secret_env} is not set"))?;
    let bytes = tokio::fs::read(body)
        .await
        .with_context(|| format!("reading body file {}", body.display()))?;

    let signature =
        hmac_sha256_hex(secret.as_bytes(), &bytes).map_err(|_| anyhow!("{secret_env} is not a usable HMAC key"))?;
    println!("sha256={signature}");
    Ok(())
}

/// Parses repeated `Name: value` arguments into a header map.
fn parse_headers(raw: &[String]) -> Result<http::HeaderMap> {
    let mut map = http::HeaderMap::new();
    for entry in raw {
        let Some((name, value)) = entry.split_once(':') else {
            bail!("header '{entry}' is not of the form 'Name: value'");
        };
        let name = http::HeaderName::from_bytes(name.trim().as_bytes())
            .with_context(|| format!("invalid header name in '{entry}'"))?;
        let value = http::HeaderValue::from_str(value.trim())
            .with_context(|| format!("invalid header value in '{entry}'"))?;
        map.append(name, value);
    }
    Ok(map)
}

/// Splits repeated `key=value` arguments without any URL decoding.
fn parse_query(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|entry| match entry.split_once('=') {
            Some((name, value)) => Ok((name.to_string(), value.to_string())),
            None => bail!("query parameter '{entry}' is not of the form 'key=value'"),
        })
        .collect()
}
