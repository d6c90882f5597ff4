mod app;
mod catalog;
mod export;
mod fetch;
mod filter;
mod gallery;
mod menu;
mod ui;
mod utils;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "frostgallery")]
#[command(author = "MrMattias")]
#[command(version = "0.1.0")]
#[command(about = "Browse, filter and download wallpapers from a JSON catalog")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Catalog path or http(s) URL (overrides config)
    #[arg(short, long, global = true)]
    catalog: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List wallpapers matching the filters
    List {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// List categories, optionally narrowed by a search string
    Categories {
        /// Case-insensitive substring to match
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Export wallpapers matching the filters as one .zip archive
    Export {
        #[command(flatten)]
        filters: FilterArgs,
        /// Output directory (overrides config)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Re-encode images: none, png or jpeg
        #[arg(short, long)]
        transcode: Option<export::Transcode>,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// Category to keep, or "all"
    #[arg(long, default_value = filter::ALL)]
    category: String,
    /// Resolution to keep (case-insensitive), or "all"
    #[arg(short, long, default_value = filter::ALL)]
    resolution: String,
    /// Title search text
    #[arg(short, long, default_value = "")]
    query: String,
}

impl FilterArgs {
    fn to_filter(&self) -> filter::FilterState {
        filter::FilterState::default()
            .with_category(self.category.as_str())
            .with_resolution(self.resolution.as_str())
            .with_query(self.query.as_str())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = init_logging(cli.command.is_none());

    let config = app::Config::load()?;
    let catalog_location = cli
        .catalog
        .unwrap_or_else(|| config.catalog.location.clone());

    match cli.command {
        Some(Commands::List { filters }) => {
            cmd_list(&catalog_location, &filters).await?;
        }
        Some(Commands::Categories { search }) => {
            cmd_categories(&catalog_location, search.as_deref()).await?;
        }
        Some(Commands::Export { filters, out, transcode }) => {
            cmd_export(&config, &catalog_location, &filters, out, transcode).await?;
        }
        None => {
            // TUI mode
            app::run_tui(config, catalog_location).await?;
        }
    }

    Ok(())
}

const LOG_FILE_PREFIX: &str = "frostgallery";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Non-blocking writer for `frostgallery.log` in `dir`
fn file_log_writer(dir: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(dir)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))?;

    Ok(tracing_appender::non_blocking(appender))
}

/// Log to stderr for subcommands. The TUI owns the terminal, so it logs to a file,
/// falling back to stderr when the file cannot be set up.
///
/// The returned guard flushes the file writer on drop and must outlive the TUI.
fn init_logging(tui: bool) -> Option<WorkerGuard> {
    if tui {
        match file_log_writer(&app::Config::log_dir()) {
            Ok((writer, guard)) => {
                tracing_subscriber::fmt()
                    .with_env_filter(env_filter())
                    .with_writer(writer)
                    .with_ansi(false)
                    .compact()
                    .init();
                return Some(guard);
            }
            Err(e) => eprintln!("{:#}, logging to stderr", e),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
    None
}

async fn load_catalog(location: &str) -> Result<catalog::Catalog> {
    let fetcher = fetch::HttpFetcher::new()?;
    let location = fetch::ResourceLocation::parse(location)?;
    Ok(catalog::Catalog::load(&location, &fetcher).await?)
}

async fn cmd_list(catalog_location: &str, filters: &FilterArgs) -> Result<()> {
    let catalog = load_catalog(catalog_location).await?;
    let filter = filters.to_filter();

    match gallery::render(&catalog, &filter) {
        gallery::GalleryView::Cards(cards) => {
            for card in &cards {
                let categories = catalog
                    .get(card.index)
                    .map(|wp| wp.categories.join(", "))
                    .unwrap_or_default();
                println!("{}  ({})  {}", card.label(), categories, card.download);
            }
            println!();
            println!("{} of {} wallpapers ({})", cards.len(), catalog.len(), filter.describe());
        }
        view => {
            println!("{}", view.placeholder().unwrap_or_default());
        }
    }

    Ok(())
}

async fn cmd_categories(catalog_location: &str, search: Option<&str>) -> Result<()> {
    let catalog = load_catalog(catalog_location).await?;
    let mut menu = menu::CategoryMenu::from_catalog(&catalog);

    for c in search.unwrap_or_default().chars() {
        menu.push_char(c);
    }

    let items = menu.visible_items();
    if items.is_empty() {
        println!("No categories found.");
        return Ok(());
    }

    for item in items {
        let count = catalog
            .wallpapers
            .iter()
            .filter(|wp| wp.has_category(item))
            .count();
        println!("{:<20} {}", menu::CategoryMenu::display_label(item), count);
    }

    Ok(())
}

async fn cmd_export(
    config: &app::Config,
    catalog_location: &str,
    filters: &FilterArgs,
    out: Option<PathBuf>,
    transcode: Option<export::Transcode>,
) -> Result<()> {
    let catalog = load_catalog(catalog_location).await?;
    let filter = filters.to_filter();

    let mut settings = config.export_settings();
    if let Some(transcode) = transcode {
        settings.transcode = transcode;
    }

    let out_dir = out.unwrap_or_else(|| config.output_dir());
    let fetcher = fetch::HttpFetcher::new()?;
    let saver = export::DirectorySaver::new(&out_dir);
    let trigger = export::ExportTrigger::default();

    println!("{}", trigger.label());
    let outcome = export::export(&catalog, &filter, &settings, &fetcher, &saver, &trigger).await?;

    match outcome {
        export::ExportOutcome::NothingToExport => {
            println!("{}", export::NOTHING_TO_EXPORT);
        }
        export::ExportOutcome::Saved(summary) => {
            println!(
                "Saved {} wallpapers ({}) to {}",
                summary.entries,
                settings.transcode.display_name(),
                summary.path.display()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_export_args() {
        let cli = Cli::try_parse_from([
            "frostgallery",
            "--catalog",
            "https://example.com/wallpapers.json",
            "export",
            "--category",
            "nature",
            "-r",
            "4K",
            "--transcode",
            "jpeg",
        ])
        .unwrap();

        assert_eq!(cli.catalog.as_deref(), Some("https://example.com/wallpapers.json"));
        match cli.command {
            Some(Commands::Export { filters, out, transcode }) => {
                let filter = filters.to_filter();
                assert_eq!(filter.category, "nature");
                assert_eq!(filter.resolution, "4K");
                assert_eq!(filter.query, "");
                assert!(out.is_none());
                assert_eq!(transcode, Some(export::Transcode::Jpeg));
            }
            _ => panic!("expected export"),
        }
    }

    #[test]
    fn test_file_log_writer_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("cache");

        let (_writer, guard) = file_log_writer(&logs).unwrap();
        drop(guard);

        assert!(logs.join("frostgallery.log").exists());
    }

    #[test]
    fn test_file_log_writer_reports_unusable_dir() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();

        assert!(file_log_writer(&blocker.join("logs")).is_err());
    }

    #[test]
    fn test_no_subcommand_starts_tui() {
        let cli = Cli::try_parse_from(["frostgallery"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.catalog.is_none());
    }
}
