//! CLI argument parsing and command handlers

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Instant;

use crate::config::{self, Config};
use crate::error::{ErrorKind, IconError};
use crate::indexer::BuildOptions;
use crate::library::{CheckStatus, IconLibrary};
use crate::models::StyleOptions;
use crate::output;
use crate::query::QueryFilter;

/// icx: offline search and safe SVG output for Iconify icon sets
#[derive(Parser, Debug)]
#[command(
    name = "icx",
    version,
    about = "Search Iconify icon sets offline and print sanitized SVG",
    long_about = "icx resolves icon identifiers of the form 'prefix:name' into standalone SVG \
                  markup with license attribution, and searches a local icon corpus by keyword \
                  without network access.\n\n\
                  Collections missing from the local corpus are fetched from the Iconify \
                  sources once and served from the cache afterwards."
)]
pub struct Cli {
    /// Enable verbose logging (can be repeated for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Cache directory (default: $ICONIFY_CACHE_DIR or the platform cache dir)
    #[arg(long, value_name = "DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Corpus directory holding collections.json and json/<prefix>.json
    #[arg(long, value_name = "DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Never touch the network; serve only cached collections
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List available icon collections
    ListCollections {
        /// Include collections only available remotely
        #[arg(short, long)]
        remote: bool,

        /// Output format as JSON
        #[arg(long)]
        json: bool,

        /// Pretty-print JSON output (only with --json)
        #[arg(long)]
        pretty: bool,
    },

    /// Search icons by keyword
    ///
    /// Query words are matched against icon names, aliases, tags and
    /// collection prefixes. Icons whose name equals the query rank first.
    ///
    /// Examples:
    ///   icx search "arrow right"
    ///   icx search home --prefixes lucide,heroicons --limit 5
    Search {
        /// Search query
        query: String,

        /// Maximum number of results (0 = unlimited)
        #[arg(short, long)]
        limit: Option<i64>,

        /// Comma-separated prefixes to search
        #[arg(short, long, value_delimiter = ',')]
        prefixes: Vec<String>,

        /// Output format as JSON
        #[arg(long)]
        json: bool,

        /// Pretty-print JSON output (only with --json)
        #[arg(long)]
        pretty: bool,
    },

    /// Print the SVG for an icon
    Get {
        /// Icon in format prefix:name
        icon: String,

        /// Width and height of the rendered icon
        #[arg(short, long)]
        size: Option<u32>,

        /// Icon color (hex, CSS color name, or 'currentColor')
        #[arg(short, long)]
        color: Option<String>,

        /// Omit the attribution comment
        #[arg(long)]
        no_attribution: bool,

        /// Output format as JSON
        #[arg(long)]
        json: bool,

        /// Pretty-print JSON output (only with --json)
        #[arg(long)]
        pretty: bool,
    },

    /// Show license attribution for icons or collections
    Attribution {
        /// Icons in format prefix:name
        icons: Vec<String>,

        /// Comma-separated prefixes (all local collections when no icons are given)
        #[arg(short, long, value_delimiter = ',')]
        prefixes: Vec<String>,

        /// Output format as JSON
        #[arg(long)]
        json: bool,

        /// Pretty-print JSON output (only with --json)
        #[arg(long)]
        pretty: bool,
    },

    /// Check corpus, cache, index and network health
    Doctor {
        /// Skip the remote connectivity check
        #[arg(long)]
        no_network: bool,

        /// Output format as JSON
        #[arg(long)]
        json: bool,

        /// Pretty-print JSON output (only with --json)
        #[arg(long)]
        pretty: bool,
    },

    /// Build the search index from the local corpus
    BuildIndex {
        /// Rebuild even if an index for this corpus already exists
        #[arg(short, long)]
        force: bool,

        /// Comma-separated list of icon sets to index
        #[arg(short, long, value_delimiter = ',')]
        prefixes: Vec<String>,

        /// Suppress all output (no progress bar, no summary)
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show cache and index statistics
    Stats {
        /// Output format as JSON
        #[arg(long)]
        json: bool,

        /// Pretty-print JSON output (only with --json)
        #[arg(long)]
        pretty: bool,
    },

    /// Download icon sets into the local corpus directory
    Sync {
        /// Prefixes to download
        #[arg(required = true, value_delimiter = ',')]
        prefixes: Vec<String>,

        /// Refetch even when a cached copy exists
        #[arg(short, long)]
        force: bool,
    },

    /// Delete cached collections and index artifacts
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", json);
    Ok(())
}

fn prefix_set(prefixes: Vec<String>) -> Option<BTreeSet<String>> {
    let set: BTreeSet<String> = prefixes
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    (!set.is_empty()).then_some(set)
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        // Setup logging based on verbosity
        let log_level = match self.verbose {
            0 => "warn",  // Default: only warnings and errors
            1 => "info",  // -v: show info messages
            2 => "debug", // -vv: show debug messages
            _ => "trace", // -vvv: show trace messages
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

        let config = self.load_config()?;

        if let Command::Clear { yes } = self.command {
            return handle_clear(&config, yes);
        }

        let library = IconLibrary::open(config).context("Failed to open icon library")?;

        match self.command {
            Command::ListCollections { remote, json, pretty } => handle_list_collections(&library, remote, json, pretty),
            Command::Search {
                query,
                limit,
                prefixes,
                json,
                pretty,
            } => handle_search(&library, &query, limit, prefixes, json, pretty),
            Command::Get {
                icon,
                size,
                color,
                no_attribution,
                json,
                pretty,
            } => handle_get(&library, &icon, size, color.as_deref(), no_attribution, json, pretty),
            Command::Attribution {
                icons,
                prefixes,
                json,
                pretty,
            } => handle_attribution(&library, icons, prefixes, json, pretty),
            Command::Doctor { no_network, json, pretty } => handle_doctor(&library, !no_network, json, pretty),
            Command::BuildIndex { force, prefixes, quiet } => handle_build_index(&library, force, prefixes, quiet),
            Command::Stats { json, pretty } => handle_stats(&library, json, pretty),
            Command::Sync { prefixes, force } => handle_sync(&library, prefixes, force),
            Command::Clear { .. } => Ok(()),
        }
    }

    /// Config file, then environment, then flags
    fn load_config(&self) -> Result<Config> {
        let cache_dir = self.cache_dir.clone().unwrap_or_else(config::default_cache_dir);
        let mut config = Config::load(&cache_dir)?;

        if let Some(dir) = &self.data_dir {
            config.corpus.dir = Some(dir.clone());
        }
        if self.offline {
            config.network.enabled = false;
        }

        log::debug!("Configuration: {:?}", config);
        Ok(config)
    }
}

/// Handle the `list-collections` subcommand
fn handle_list_collections(library: &IconLibrary, remote: bool, json: bool, pretty: bool) -> Result<()> {
    let collections = library.collections(remote)?;

    if json {
        return print_json(&collections, pretty);
    }

    if collections.is_empty() {
        output::warn("No collections available. Configure a corpus with --data-dir or run 'icx sync'.");
        return Ok(());
    }

    let width = collections.iter().map(|c| c.prefix.len()).max().unwrap_or(6).max(6);
    println!("{:<width$}  {:>6}  {:<32}  License", "Prefix", "Icons", "Name", width = width);
    println!("{}  ------  {}  -------", "-".repeat(width), "-".repeat(32));
    for collection in &collections {
        println!(
            "{:<width$}  {:>6}  {:<32}  {}",
            collection.prefix.cyan(),
            collection.total_icons,
            collection.display_name,
            collection.license.title,
            width = width
        );
    }
    println!("\n{} collections", collections.len());
    Ok(())
}

/// Handle the `search` subcommand
fn handle_search(
    library: &IconLibrary,
    query: &str,
    limit: Option<i64>,
    prefixes: Vec<String>,
    json: bool,
    pretty: bool,
) -> Result<()> {
    let filter = QueryFilter {
        prefixes: prefix_set(prefixes),
        limit: limit.unwrap_or(library.config().search.default_limit),
    };

    let start = Instant::now();
    let hits = library.search(query, &filter)?;
    log::info!("Search completed in {:?}", start.elapsed());

    if json {
        return print_json(&hits, pretty);
    }

    if hits.is_empty() {
        output::info(&format!("No icons match '{}'.", query));
        return Ok(());
    }

    for hit in &hits {
        println!(
            "{}  {}  {}",
            hit.id.to_string().green(),
            format!("({})", hit.score).dimmed(),
            hit.license.dimmed()
        );
    }
    Ok(())
}

/// Handle the `get` subcommand
fn handle_get(
    library: &IconLibrary,
    icon: &str,
    size: Option<u32>,
    color: Option<&str>,
    no_attribution: bool,
    json: bool,
    pretty: bool,
) -> Result<()> {
    let style = StyleOptions::new(size.unwrap_or(library.config().style.default_size), color)?;
    let resolved = library.resolve(icon)?;
    if resolved.via_alias() {
        log::info!("{} is an alias of {}", resolved.requested, resolved.record.id());
    }
    let assembled = library.assemble(&resolved, &style)?;

    if json {
        return print_json(&assembled, pretty);
    }

    if no_attribution {
        println!("{}", assembled.markup);
    } else {
        println!("{}", assembled.document());
    }
    Ok(())
}

/// Handle the `attribution` subcommand
fn handle_attribution(
    library: &IconLibrary,
    icons: Vec<String>,
    prefixes: Vec<String>,
    json: bool,
    pretty: bool,
) -> Result<()> {
    if !icons.is_empty() {
        let attributions = icons
            .iter()
            .map(|icon| library.attribution(icon))
            .collect::<crate::error::Result<Vec<_>>>()?;

        if json {
            return print_json(&attributions, pretty);
        }
        for attribution in &attributions {
            println!("{}", attribution.comment);
        }
        return Ok(());
    }

    let wanted = prefix_set(prefixes);
    let collections: Vec<_> = library
        .collections(false)?
        .into_iter()
        .filter(|c| wanted.as_ref().is_none_or(|w| w.contains(&c.prefix)))
        .collect();

    if let Some(wanted) = &wanted {
        for missing in wanted.iter().filter(|p| !collections.iter().any(|c| &c.prefix == *p)) {
            output::warn(&format!("Collection '{}' is not in the local corpus", missing));
        }
    }

    if json {
        return print_json(&collections, pretty);
    }

    for collection in &collections {
        let license = &collection.license;
        println!("{} ({})", collection.display_name.bold(), collection.prefix);
        println!("  License:     {}", license.title);
        if let Some(spdx) = &license.spdx {
            println!("  SPDX:        {}", spdx);
        }
        println!("  URL:         {}", license.url.as_deref().unwrap_or("unknown"));
        if let Some(requirement) = &license.requirement {
            println!("  Requirement: {}", requirement);
        }
        if let Some(author) = &collection.author {
            println!("  Author:      {}", author.name);
        }
    }
    Ok(())
}

/// Handle the `doctor` subcommand
fn handle_doctor(library: &IconLibrary, check_network: bool, json: bool, pretty: bool) -> Result<()> {
    let report = library.doctor(check_network);

    if json {
        print_json(&report, pretty)?;
    } else {
        for check in &report.checks {
            let status = match check.status {
                CheckStatus::Ok => check.status.to_string().green().to_string(),
                CheckStatus::Warn => check.status.to_string().yellow().to_string(),
                CheckStatus::Fail => check.status.to_string().red().to_string(),
            };
            println!("[{:>4}] {:<8} {}", status, check.name, check.detail);
        }
    }

    if !report.healthy() {
        anyhow::bail!("Health check failed");
    }
    Ok(())
}

/// Follow-up command for errors the user can fix directly
pub fn hint(err: &anyhow::Error) -> Option<&'static str> {
    match err.downcast_ref::<IconError>()?.kind() {
        ErrorKind::IndexNotBuilt => Some("Run 'icx build-index' to build the search index."),
        ErrorKind::CorpusUnavailable => Some("Point --data-dir (or ICONIFY_DATA_DIR) at a directory of icon sets."),
        ErrorKind::UnknownPrefix => Some("Run 'icx list-collections --remote' to see available prefixes."),
        ErrorKind::NetworkError => Some("Use --offline to work from the local corpus and cache only."),
        _ => None,
    }
}

/// Handle the `build-index` subcommand
fn handle_build_index(library: &IconLibrary, force: bool, prefixes: Vec<String>, quiet: bool) -> Result<()> {
    log::info!("Starting index build");

    let options = BuildOptions {
        force,
        prefixes: prefix_set(prefixes),
        show_progress: !quiet,
    };
    let outcome = library.build_index(&options)?;

    if quiet {
        return Ok(());
    }

    if let Some(corpus) = library.corpus() {
        output::skipped_collections(corpus.skipped());
    }

    let index = outcome.index();
    if outcome.was_built() {
        output::success("Indexing complete!");
    } else {
        println!("Index is up to date (use --force to rebuild).");
    }
    println!("  Index:        {}", index.key());
    println!("  Collections:  {}", index.collections().len());
    println!("  Icons:        {}", index.icon_count());
    println!("  Tokens:       {}", index.token_count());
    Ok(())
}

/// Handle the `stats` subcommand
fn handle_stats(library: &IconLibrary, json: bool, pretty: bool) -> Result<()> {
    let stats = library.stats()?;

    if json {
        return print_json(&stats, pretty);
    }

    println!("Icon Index Statistics");
    println!("=====================");
    println!("Cache:          {}", library.cache().path().display());
    println!("Index:          {}", stats.index_key.as_deref().unwrap_or("(none)"));
    println!("Collections:    {}", stats.total_collections);
    println!("Icons:          {}", stats.total_icons);
    println!("Tokens:         {}", stats.total_tokens);
    println!("Cached remote:  {}", stats.cached_resources);
    println!("Cache size:     {}", format_bytes(stats.cache_size_bytes));
    println!("Last built:     {}", stats.last_built.as_deref().unwrap_or("never"));

    let resources = library.cache().list_resources()?;
    if !resources.is_empty() {
        println!("\nRemote resources:");
        for resource in &resources {
            println!(
                "  {:<32} {:>10}  {:<7} {}",
                resource.key,
                format_bytes(resource.size_bytes as u64),
                resource.state,
                resource.fetched_at.as_deref().unwrap_or("-")
            );
            if let Some(error) = &resource.last_error {
                println!("  {:<32} {}", "", error.red());
            }
        }
    }
    Ok(())
}

/// Handle the `sync` subcommand
fn handle_sync(library: &IconLibrary, prefixes: Vec<String>, force: bool) -> Result<()> {
    let prefixes = prefix_set(prefixes).context("No prefixes given")?;
    let synced = library.sync(&prefixes, force)?;

    for set in &synced {
        output::success(&format!("Synced {} ({} icons)", set.prefix, set.icons));
    }
    output::info("Run 'icx build-index' to make the new collections searchable.");
    Ok(())
}

/// Handle the `clear` subcommand
fn handle_clear(config: &Config, skip_confirm: bool) -> Result<()> {
    let cache = crate::cache::CacheManager::new(&config.cache_dir);

    if !cache.exists() {
        println!("No cache to clear.");
        return Ok(());
    }

    if !skip_confirm {
        println!("This will delete cached collections and indexes at: {:?}", cache.path());
        print!("Are you sure? [y/N] ");
        use std::io::{self, Write};
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    cache.clear()?;
    output::success("Cache cleared successfully.");
    Ok(())
}

/// Format bytes into human-readable size (KB, MB, GB)
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search() {
        let cli = Cli::try_parse_from(["icx", "search", "arrow right", "-p", "lucide,mdi", "--limit", "5"]).unwrap();
        match cli.command {
            Command::Search { query, limit, prefixes, .. } => {
                assert_eq!(query, "arrow right");
                assert_eq!(limit, Some(5));
                assert_eq!(prefix_set(prefixes).unwrap().len(), 2);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["icx", "get", "mdi:home", "--offline", "--cache-dir", "/tmp/x", "-vv"]).unwrap();
        assert!(cli.offline);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/x")));
    }

    #[test]
    fn test_hint_for_actionable_errors() {
        let err = anyhow::Error::new(IconError::IndexNotBuilt).context("search failed");
        assert!(hint(&err).unwrap().contains("build-index"));
        assert!(hint(&anyhow::Error::new(IconError::MalformedIdentifier("x".into()))).is_none());
        assert!(hint(&anyhow::anyhow!("plain failure")).is_none());
    }

    #[test]
    fn test_sync_requires_prefix() {
        assert!(Cli::try_parse_from(["icx", "sync"]).is_err());
    }

    #[test]
    fn test_prefix_set_ignores_blanks() {
        assert!(prefix_set(vec![" ".into(), String::new()]).is_none());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(2048), "2.00 KB");
    }
}
