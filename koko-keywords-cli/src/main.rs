//! koko-keywords - match text against the Koko keyword catalog from a shell
//!
//! Configuration comes from the same `KOKO_KEYWORDS_*` environment
//! variables the language bindings use.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use koko_keywords_core::{error_description, KeywordMatcher, KeywordsConfig};

mod cache_cli;

/// Exit status for a match that failed with an engine error
const ENGINE_ERROR_EXIT: i32 = 2;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "koko-keywords",
    about = "Match text against the Koko keyword catalog",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level
    #[clap(long, default_value = "warn", global = true)]
    log_level: LogLevel,
}

#[derive(Parser, Debug)]
enum Command {
    /// Check whether text contains a catalog keyword
    Match {
        /// Text to check
        text: String,

        /// Restrict matching to entries with key=value (e.g. category=wellness)
        #[clap(long)]
        filter: Option<String>,

        /// Use this catalog version instead of the latest
        #[clap(long)]
        version: Option<String>,

        /// List the catalog entries that matched
        #[clap(long)]
        explain: bool,

        /// Output the result as JSON
        #[clap(long)]
        json: bool,
    },

    /// Print the description of an error code
    DescribeError {
        /// Code returned by a match (e.g. -2)
        #[clap(allow_negative_numbers = true)]
        code: i64,
    },

    /// Inspect and manage the local catalog cache
    Cache(cache_cli::CacheCommand),
}

fn initialize_tracing(log_level: &LogLevel) {
    // RUST_LOG directives refine the chosen level
    let mut filter = EnvFilter::new(log_level.to_filter_directive());
    if let Ok(extra) = std::env::var("RUST_LOG") {
        for directive in extra.split(',') {
            if let Ok(parsed) = directive.parse() {
                filter = filter.add_directive(parsed);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // stdout carries results only
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level);

    match cli.command {
        Command::Match {
            text,
            filter,
            version,
            explain,
            json,
        } => {
            let code = match_command(&text, filter.as_deref(), version.as_deref(), explain, json)
                .await?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Command::DescribeError { code } => {
            println!("{}", error_description(code));
            Ok(())
        }
        Command::Cache(command) => cache_cli::execute(command).await,
    }
}

/// Run one match and print the outcome; returns the process exit status
async fn match_command(
    text: &str,
    filter: Option<&str>,
    version: Option<&str>,
    explain: bool,
    json: bool,
) -> Result<i32> {
    let config = KeywordsConfig::from_env();
    let matcher = KeywordMatcher::new(&config)?;

    let outcome = if explain {
        matcher
            .explain(text, filter, version)
            .await
            .map(|entries| (!entries.is_empty(), entries))
    } else {
        matcher
            .matches(text, filter, version)
            .await
            .map(|matched| (matched, Vec::new()))
    };

    let (matched, entries) = match outcome {
        Ok(result) => result,
        Err(e) => {
            let code = e.code();
            debug!("Match failed: {}", e);
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "error": code.as_i32(),
                        "description": code.description(),
                    })
                );
            }
            eprintln!("Error {}: {}", code.as_i32(), code.description());
            return Ok(ENGINE_ERROR_EXIT);
        }
    };

    let catalog_version = matcher
        .cache()
        .snapshot()
        .map(|snapshot| snapshot.version().to_string());

    if json {
        let mut output = serde_json::json!({
            "matched": matched,
            "version": catalog_version,
        });
        if explain {
            output["entries"] = serde_json::to_value(&entries)?;
        }
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{matched}");
        for entry in &entries {
            match &entry.locale {
                Some(locale) => println!("  {} [{}, {}]", entry.keyword, entry.category, locale),
                None => println!("  {} [{}]", entry.keyword, entry.category),
            }
        }
    }

    Ok(0)
}
