//! `tailwind` — the command-line front-end for `tailwind-gateway`: validate
//! and convert config documents, publish/inspect/retire them against a
//! running gateway's admin surface, and start a gateway from a config file
//! (spec §6 "CLI").

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tailwind_gateway::{Config, Gateway, Result};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "tailwind", version, about = "Configuration-driven GraphQL gateway")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate one or more config files by compiling them into a blueprint.
    Check {
        files: Vec<PathBuf>,
    },
    /// Compile config files and publish the resulting blueprint to a running
    /// gateway's schema registry.
    Publish {
        remote: String,
        files: Vec<PathBuf>,
    },
    /// Remove a published blueprint from a running gateway's registry.
    Drop {
        remote: String,
        digest: String,
    },
    /// List digests currently published to a running gateway's registry.
    List {
        remote: String,
        #[arg(long)]
        offset: Option<usize>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show a summary of a published blueprint.
    Show {
        remote: String,
        digest: String,
    },
    /// Convert config files between JSON, YAML, and GraphQL SDL.
    Generate {
        files: Vec<PathBuf>,
        #[arg(long = "sourceFormat")]
        source_format: Option<Format>,
        #[arg(long = "targetFormat")]
        target_format: Format,
        /// Write the converted document back to disk instead of stdout
        /// (only valid with a single input file).
        #[arg(long)]
        write: bool,
    },
    /// Compile a config file and start serving it.
    Start {
        file: PathBuf,
        #[arg(long, default_value = "0.0.0.0:8000")]
        addr: String,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Format {
    Json,
    Yaml,
    Graphql,
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn format_of(path: &Path) -> Format {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yml") | Some("yaml") => Format::Yaml,
        Some("graphql") | Some("gql") => Format::Graphql,
        _ => Format::Json,
    }
}

fn decode(bytes: &[u8], format: Format) -> Result<Config> {
    match format {
        Format::Json => Config::decode_json(bytes),
        Format::Yaml => Config::decode_yaml(bytes),
        Format::Graphql => {
            let source = std::str::from_utf8(bytes)
                .map_err(|e| tailwind_gateway::Error::Config(format!("invalid UTF-8 SDL: {e}")))?;
            tailwind_gateway::config::decode_sdl(source)
        }
    }
}

fn encode(config: &Config, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Json => config.encode_json(),
        Format::Yaml => config.encode_yaml(),
        Format::Graphql => tailwind_gateway::config::encode_sdl(config).map(String::into_bytes),
    }
}

fn load_config(path: &Path) -> Result<Config> {
    let bytes = std::fs::read(path)?;
    decode(&bytes, format_of(path))
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Check { files } => {
            for file in &files {
                let config = load_config(file)?;
                config.compile()?;
                println!("{}: OK", file.display());
            }
        }
        Command::Publish { remote, files } => {
            let client = reqwest::Client::new();
            for file in &files {
                let config = load_config(file)?;
                let response = client
                    .put(format!("{remote}/schemas"))
                    .json(&config)
                    .send()
                    .await
                    .map_err(|e| tailwind_gateway::Error::Upstream(e.to_string()))?;
                let body: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|e| tailwind_gateway::Error::Upstream(e.to_string()))?;
                println!("{}: published {}", file.display(), body["hex"]);
            }
        }
        Command::Drop { remote, digest } => {
            let client = reqwest::Client::new();
            let response = client
                .delete(format!("{remote}/schemas/{digest}"))
                .send()
                .await
                .map_err(|e| tailwind_gateway::Error::Upstream(e.to_string()))?;
            if response.status().is_success() {
                println!("dropped {digest}");
            } else {
                println!("no such digest: {digest}");
            }
        }
        Command::List { remote, offset, limit } => {
            let client = reqwest::Client::new();
            let mut request = client.get(format!("{remote}/schemas"));
            if let Some(offset) = offset {
                request = request.query(&[("index", offset)]);
            }
            if let Some(limit) = limit {
                request = request.query(&[("max", limit)]);
            }
            let digests: Vec<String> = request
                .send()
                .await
                .map_err(|e| tailwind_gateway::Error::Upstream(e.to_string()))?
                .json()
                .await
                .map_err(|e| tailwind_gateway::Error::Upstream(e.to_string()))?;
            for digest in digests {
                println!("{digest}");
            }
        }
        Command::Show { remote, digest } => {
            let client = reqwest::Client::new();
            let summary: serde_json::Value = client
                .get(format!("{remote}/schemas/{digest}"))
                .send()
                .await
                .map_err(|e| tailwind_gateway::Error::Upstream(e.to_string()))?
                .json()
                .await
                .map_err(|e| tailwind_gateway::Error::Upstream(e.to_string()))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Generate { files, source_format, target_format, write } => {
            if write && files.len() > 1 {
                return Err(tailwind_gateway::Error::Config(
                    "--write only supports a single input file".to_string(),
                ));
            }
            for file in &files {
                let source_format = source_format.unwrap_or_else(|| format_of(file));
                let bytes = std::fs::read(file)?;
                let config = decode(&bytes, source_format)?;
                let converted = encode(&config, target_format)?;
                if write {
                    let out = file.with_extension(extension_for(target_format));
                    std::fs::write(&out, &converted)?;
                    println!("wrote {}", out.display());
                } else {
                    std::io::Write::write_all(&mut std::io::stdout(), &converted)?;
                }
            }
        }
        Command::Start { file, addr } => {
            let config = load_config(&file)?;
            tracing::info!(file = %file.display(), "starting gateway");
            Gateway::builder().with_config(&config)?.serve(addr).await?;
        }
    }

    Ok(())
}

fn extension_for(format: Format) -> &'static str {
    match format {
        Format::Json => "json",
        Format::Yaml => "yaml",
        Format::Graphql => "graphql",
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    if let Err(err) = run().await {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
