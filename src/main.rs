//! quizfetch - Fetch, enhance and cache quiz category data
//!
//! A small front end over the category loader: loads one or all categories
//! and prints them as JSON, clears the cache, or previews markup expansion.

use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use quizfetch::cli::{parse_category_arg, Cli, Command};
use quizfetch::content::enhance;
use quizfetch::{CategoryLoader, LoadObserver};

/// Reports loader progress on stderr
struct ConsoleObserver;

impl LoadObserver for ConsoleObserver {
    fn show_loading(&self, message: &str) {
        eprintln!("{}", message);
    }

    fn show_error(&self, message: &str) {
        eprintln!("error: {}", message);
    }
}

/// Installs the tracing subscriber; `RUST_LOG` overrides the verbosity flag
fn setup_logging(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_loader(cli: &Cli) -> Result<CategoryLoader, Box<dyn std::error::Error>> {
    let config = cli.loader_config()?;
    Ok(CategoryLoader::new(config, cli.store())?)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    match &cli.command {
        Command::Enhance { text } => {
            println!("{}", enhance(text));
        }
        Command::Fetch { category } => {
            let category = parse_category_arg(category)?;
            let loader = build_loader(cli)?;
            let payload = loader.load_category(&category).await?;
            print_json(&*payload)?;
        }
        Command::All => {
            let loader = build_loader(cli)?;
            let collection = loader.load_app_data(&ConsoleObserver).await?;
            for (category, error) in &collection.failed {
                eprintln!("warning: {} not loaded: {}", category, error);
            }
            print_json(&collection.merged())?;
        }
        Command::ClearCache => {
            let loader = build_loader(cli)?;
            loader.clear_cache();
            eprintln!("Cache cleared");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(&cli);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
