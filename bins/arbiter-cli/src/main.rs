mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "arbiter-cli")]
#[command(about = "Arbiter CLI - Judge submissions locally and manage sandbox images", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Judge a local source file against a tests JSON file
    Judge {
        /// Path to the source file
        #[arg(short, long)]
        file: PathBuf,

        /// Language (python, java, javascript)
        #[arg(short, long)]
        language: String,

        /// Path to a JSON array of test specs
        #[arg(short, long)]
        tests: PathBuf,

        /// Wall-clock limit in seconds
        #[arg(long, default_value = "5.0")]
        time_limit: f64,

        /// Memory cap in MB
        #[arg(long, default_value = "256")]
        memory_limit: u64,
    },

    /// Enqueue a submission on its language queue for a worker to judge
    Submit {
        /// Path to the source file
        #[arg(short, long)]
        file: PathBuf,

        /// Language (python, java, javascript)
        #[arg(short, long)]
        language: String,

        /// Path to a JSON array of test specs
        #[arg(short, long)]
        tests: PathBuf,

        /// Challenge identifier recorded on the submission
        #[arg(short, long, default_value = "local")]
        challenge: String,

        /// Wall-clock limit in seconds
        #[arg(long, default_value = "5.0")]
        time_limit: f64,

        /// Memory cap in MB
        #[arg(long, default_value = "256")]
        memory_limit: u64,
    },

    /// Pull sandbox images into the local cache
    PullImages {
        /// Only the image for this language (defaults to all)
        #[arg(short, long)]
        language: Option<String>,
    },

    /// List supported languages and their runtime recipes
    ListLangs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Judge {
            file,
            language,
            tests,
            time_limit,
            memory_limit,
        } => {
            commands::judge_file(&file, &language, &tests, time_limit, memory_limit).await?;
        }
        Commands::Submit {
            file,
            language,
            tests,
            challenge,
            time_limit,
            memory_limit,
        } => {
            commands::submit_job(&file, &language, &tests, &challenge, time_limit, memory_limit)
                .await?;
        }
        Commands::PullImages { language } => {
            commands::pull_images(language.as_deref()).await?;
        }
        Commands::ListLangs => {
            commands::list_languages()?;
        }
    }

    Ok(())
}
