use anyhow::Result;
use bookshelf_covers::app::App;
use bookshelf_covers::config::Config;
use bookshelf_covers::cover::{NamingPolicy, SearchStrategy};
use bookshelf_covers::upload::UploadedAsset;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "bookshelf-covers")]
#[command(about = "Compress and store book cover images")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compress an image file and store it as a cover.
    Ingest {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output byte budget; overrides COVER_MAX_BYTES.
        #[arg(long, value_parser = parse_byte_budget)]
        max_bytes: Option<usize>,

        /// timestamp, random or content-hash.
        #[arg(long, value_parser = parse_naming_arg)]
        naming: Option<NamingPolicy>,

        /// linear or bisect.
        #[arg(long, value_parser = parse_search_arg)]
        search: Option<SearchStrategy>,

        /// Compress only; do not write to the store.
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete a stored cover by filename.
    Remove {
        #[arg(value_name = "FILENAME")]
        filename: String,
    },
}

fn parse_byte_budget(input: &str) -> std::result::Result<usize, String> {
    match input.parse::<usize>() {
        Ok(0) => Err("Byte budget must be positive".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("Invalid byte budget '{}'", input)),
    }
}

fn parse_naming_arg(input: &str) -> std::result::Result<NamingPolicy, String> {
    input.parse().map_err(|e: bookshelf_covers::Error| e.to_string())
}

fn parse_search_arg(input: &str) -> std::result::Result<SearchStrategy, String> {
    input.parse().map_err(|e: bookshelf_covers::Error| e.to_string())
}

async fn run(args: CliArgs) -> Result<()> {
    let mut config = Config::from_env()?;

    match args.command {
        Command::Ingest {
            file,
            max_bytes,
            naming,
            search,
            dry_run,
        } => {
            if let Some(max_bytes) = max_bytes {
                config.ingest.max_bytes = max_bytes;
            }
            if let Some(naming) = naming {
                config.ingest.naming = naming;
            }
            if let Some(search) = search {
                config.ingest.search = search;
            }

            let bytes = tokio::fs::read(&file).await?;
            let original = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let upload = UploadedAsset::sniffed(bytes, original);

            let app = App::new(&config).await?;
            if dry_run {
                let cover = app.process_upload(&upload).await?;
                info!(
                    "Dry run: {} would be {} bytes at {}x{} (quality {})",
                    cover.filename,
                    cover.len(),
                    cover.width,
                    cover.height,
                    cover.quality
                );
                println!("{}", cover.filename);
            } else {
                let filename = app.upload_cover(&upload).await?;
                println!("{}", filename);
                if let Some(url) = app.cover_url(Some(&filename)) {
                    println!("{}", url);
                }
            }
        }
        Command::Remove { filename } => {
            let app = App::new(&config).await?;
            app.remove_cover(Some(&filename)).await?;
            info!("Removed cover {}", filename);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookshelf_covers=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    match run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Command failed: {}", e);
            std::process::exit(1);
        }
    }
}
