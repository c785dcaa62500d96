//! Catalog cache commands
//!
//! Inspect, refresh and clear the locally cached keyword catalog.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use koko_keywords_core::{KeywordMatcher, KeywordsConfig};

/// Cache subcommand
#[derive(Parser, Debug)]
pub struct CacheCommand {
    #[clap(subcommand)]
    pub command: CacheSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum CacheSubcommand {
    /// Show the cached catalog
    Show {
        /// Output as JSON
        #[clap(long)]
        json: bool,
    },

    /// Fetch the catalog now, replacing the cached copy
    Refresh {
        /// Catalog version to fetch instead of the latest
        #[clap(long)]
        version: Option<String>,
    },

    /// Delete the cached catalog
    Clear,
}

/// Table row for the category breakdown
#[derive(Tabled)]
struct CategoryRow {
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Entries")]
    entries: usize,
}

pub async fn execute(command: CacheCommand) -> Result<()> {
    let config = KeywordsConfig::from_env();
    let matcher = KeywordMatcher::new(&config)?;

    match command.command {
        CacheSubcommand::Show { json } => show(&matcher, json),
        CacheSubcommand::Refresh { version } => refresh(&matcher, version.as_deref()).await,
        CacheSubcommand::Clear => {
            matcher.cache().clear()?;
            println!("Catalog cache cleared.");
            Ok(())
        }
    }
}

fn show(matcher: &KeywordMatcher, json: bool) -> Result<()> {
    let cache = matcher.cache();
    let location = cache
        .store()
        .map(|store| store.path().display().to_string());

    let Some(snapshot) = cache.snapshot() else {
        if json {
            println!(
                "{}",
                serde_json::json!({"cached": false, "location": location})
            );
        } else {
            println!("No cached catalog.");
            if let Some(location) = location {
                println!("Cache file: {location}");
            }
        }
        return Ok(());
    };

    let index = snapshot.index();
    let categories = index.categories();

    if json {
        let output = serde_json::json!({
            "cached": true,
            "location": location,
            "version": snapshot.version(),
            "requested_version": snapshot.requested_version(),
            "fetched_at": snapshot.fetched_at().to_rfc3339(),
            "entries": index.entry_count(),
            "patterns": index.pattern_count(),
            "categories": categories,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Catalog version: {}", snapshot.version());
    if let Some(requested) = snapshot.requested_version() {
        println!("Pinned:          {requested}");
    }
    println!("Fetched at:      {}", snapshot.fetched_at().to_rfc3339());
    println!(
        "Entries:         {} ({} distinct phrases)",
        index.entry_count(),
        index.pattern_count()
    );
    if let Some(location) = location {
        println!("Cache file:      {location}");
    }

    if !categories.is_empty() {
        let rows: Vec<CategoryRow> = categories
            .into_iter()
            .map(|(category, entries)| CategoryRow {
                category: category.to_string(),
                entries,
            })
            .collect();

        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()))
            .to_string();

        println!("\n{table}");
    }

    Ok(())
}

async fn refresh(matcher: &KeywordMatcher, version: Option<&str>) -> Result<()> {
    match version {
        Some(v) => println!("Fetching catalog version {v}..."),
        None => println!("Fetching latest catalog..."),
    }

    let snapshot = matcher.cache().refresh(version).await.map_err(|e| {
        let code = e.code();
        anyhow::anyhow!("{} (error {}: {})", e, code.as_i32(), code.description())
    })?;

    println!(
        "Cached catalog version {} ({} entries).",
        snapshot.version(),
        snapshot.index().entry_count()
    );
    Ok(())
}
