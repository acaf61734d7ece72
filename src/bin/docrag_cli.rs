use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docrag::{
    config, logging,
    naming::IndexNameGenerator,
    processing::{Document, RagApi, RagService},
};

#[derive(Parser)]
#[command(
    name = "docrag-cli",
    version,
    about = "Index documents and ask questions against them without the HTTP server"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index a file and print its identifier.
    Ingest {
        /// Document to index.
        file: PathBuf,
    },
    /// Answer a question against a previously indexed document.
    Ask {
        /// Identifier printed by `ingest`.
        #[arg(long)]
        index: String,
        /// Question text.
        question: String,
    },
    /// Print a freshly generated index identifier.
    NewName,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_cli_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::NewName => {
            println!("{}", IndexNameGenerator::new().generate());
        }
        Command::Ingest { file } => {
            let service = build_service()?;
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());
            let index = service
                .ingest(Document::new(filename, bytes))
                .await
                .with_context(|| format!("Failed to index {}", file.display()))?;
            println!("{index}");
        }
        Command::Ask { index, question } => {
            let service = build_service()?;
            let answer = service
                .answer(&index, &question)
                .await
                .with_context(|| format!("Failed to answer against index '{index}'"))?;
            println!("{answer}");
        }
    }

    Ok(())
}

fn build_service() -> Result<RagService> {
    let config = config::load().context("Failed to load configuration")?;
    RagService::from_config(&config).context("Failed to initialize services")
}
