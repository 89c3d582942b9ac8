//! pdfdb-rs CLI application
//!
//! Command-line interface for the pdfdb-rs library.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use pdfdb_rs::utils::{format_duration, format_file_size, format_number};
use pdfdb_rs::pipeline::{InterruptAction, signal_interrupt};
use pdfdb_rs::{Config, Database, PdfDatabaseBuilder};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pdfdb-rs")]
#[command(about = "Parallel, batched ingestion of large PDF manuals into searchable SQLite databases")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a page database from a PDF
    Build {
        /// Input PDF file
        input: PathBuf,

        /// Output database file (replaced if it exists)
        #[arg(short, long, default_value = "pages.db")]
        output: PathBuf,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Pages per committed batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Number of extraction workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Check the integrity of a finished database
    Verify {
        /// Database file
        database: PathBuf,

        /// Expected number of pages
        #[arg(long)]
        expected_pages: Option<usize>,
    },

    /// Full-text search over page text
    Search {
        /// Database file
        database: PathBuf,

        /// Search query (FTS5 syntax)
        query: String,

        /// Number of results to return
        #[arg(short = 'k', long, default_value = "10")]
        limit: usize,
    },

    /// Print one page and its tables
    Page {
        /// Database file
        database: PathBuf,

        /// 1-based page number
        page: u32,
    },

    /// Show database statistics
    Stats {
        /// Database file
        database: PathBuf,
    },

    /// Show stored metadata
    Meta {
        /// Database file
        database: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            config,
            batch_size,
            workers,
            no_progress,
        } => {
            let mut config = match config {
                Some(path) => Config::from_file(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => Config::default(),
            };
            if let Some(batch_size) = batch_size {
                config.build.batch_size = batch_size;
            }
            if let Some(workers) = workers {
                config.build.workers = workers;
            }
            if no_progress {
                config.build.show_progress = false;
            }
            build_command(input, output, config)?;
        }
        Commands::Verify {
            database,
            expected_pages,
        } => verify_command(database, expected_pages)?,
        Commands::Search {
            database,
            query,
            limit,
        } => search_command(database, query, limit)?,
        Commands::Page { database, page } => page_command(database, page)?,
        Commands::Stats { database } => stats_command(database)?,
        Commands::Meta { database } => meta_command(database)?,
    }

    Ok(())
}

fn build_command(input: PathBuf, output: PathBuf, config: Config) -> anyhow::Result<()> {
    println!("📚 Building {} from {}", output.display(), input.display());

    let mut builder = PdfDatabaseBuilder::new(&output, config)?;

    let shutdown = builder.shutdown_flag();
    ctrlc::set_handler(move || match signal_interrupt(&shutdown) {
        InterruptAction::Drain => {
            eprintln!("\n⚠️  Interrupt received, saving completed pages (Ctrl-C again to force exit)...");
        }
        InterruptAction::ForceExit => {
            eprintln!("\n❌ Second interrupt, exiting without saving the current batch");
            std::process::exit(130);
        }
    })
    .context("Failed to install interrupt handler")?;

    let report = builder
        .build_from_file(&input)
        .with_context(|| format!("Build of {} failed", input.display()))?;

    if report.is_interrupted() {
        println!("⚠️  Build interrupted, partial save");
        println!(
            "   📄 Pages saved: {} of {}",
            format_number(report.pages_committed),
            format_number(report.extraction.total_pages)
        );
        println!("   📋 Database: {}", report.db_path.display());
        return Ok(());
    }

    println!("✅ Build complete!");
    println!("   📄 Pages: {}", format_number(report.stats.page_count));
    println!("   📊 Tables: {}", format_number(report.stats.table_count));
    println!("   🔤 Characters: {}", format_number(report.stats.total_chars));
    if !report.extraction.failed_pages.is_empty() {
        println!("   ⚠️  Failed pages: {:?}", report.extraction.failed_pages);
    }
    println!(
        "   ⏱️  Time: {} ({:.1} pages/s)",
        format_duration(report.elapsed.as_secs_f64()),
        report.pages_per_second()
    );
    println!(
        "   📋 Database: {} ({})",
        report.db_path.display(),
        format_file_size(report.stats.file_size_bytes)
    );

    Ok(())
}

fn verify_command(database: PathBuf, expected_pages: Option<usize>) -> anyhow::Result<()> {
    let db = Database::open(&database)?;
    let report = db.verify(expected_pages)?;

    let mark = |ok: bool| if ok { "✅" } else { "❌" };
    println!("🔍 Verifying {}", database.display());
    println!(
        "   {} Pages in full-text index: {}/{}",
        mark(report.fts_complete()),
        report.stats.fts_count,
        report.stats.page_count
    );
    println!(
        "   {} Table counts: {} recorded, {} stored",
        mark(report.table_counts_consistent()),
        report.table_count_sum,
        report.stats.table_count
    );
    println!(
        "   {} Orphaned tables: {}",
        mark(report.orphan_tables == 0),
        report.orphan_tables
    );
    if let Some(expected) = report.expected_pages {
        println!(
            "   {} Page count: {} (expected {})",
            mark(report.page_count_matches()),
            report.stats.page_count,
            expected
        );
    }

    if !report.passed() {
        bail!("Integrity check failed for {}", database.display());
    }
    println!("✅ Database is consistent");
    Ok(())
}

fn search_command(database: PathBuf, query: String, limit: usize) -> anyhow::Result<()> {
    println!("🔍 Searching for: \"{}\"", query);

    let db = Database::open(&database)?;
    let total = db.count_matches(&query)?;
    let hits = db.search(&query, limit)?;

    if hits.is_empty() {
        println!("❌ No results found");
        return Ok(());
    }

    println!("📋 Showing {} of {} matching pages:", hits.len(), total);
    println!();

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. Page {} ({} chars)", i + 1, hit.page_num, hit.char_count);
        println!("   {}", hit.snippet);
        println!();
    }

    Ok(())
}

fn page_command(database: PathBuf, page: u32) -> anyhow::Result<()> {
    let db = Database::open(&database)?;
    let Some(stored) = db.get_page(page)? else {
        bail!("Page {} not found in {}", page, database.display());
    };

    println!(
        "📄 Page {} ({} chars, {} tables)",
        stored.record.page_num, stored.record.char_count, stored.record.table_count
    );
    println!();
    println!("{}", stored.record.text);

    for (index, table) in stored.tables.iter().enumerate() {
        println!();
        println!("📊 Table {}", index + 1);
        for row in table {
            let cells: Vec<&str> = row.iter().map(|cell| cell.as_deref().unwrap_or("")).collect();
            println!("   | {} |", cells.join(" | "));
        }
    }

    Ok(())
}

fn stats_command(database: PathBuf) -> anyhow::Result<()> {
    let db = Database::open(&database)?;
    let stats = db.stats()?;

    println!("📊 Statistics for {}", database.display());
    println!("   📄 Pages: {}", format_number(stats.page_count));
    println!("   📊 Tables: {}", format_number(stats.table_count));
    println!("   🔎 FTS entries: {}", format_number(stats.fts_count));
    println!("   🏷️  Metadata entries: {}", stats.metadata_count);
    println!(
        "   🔤 Characters: {} ({} per page)",
        format_number(stats.total_chars),
        format_number(stats.avg_chars_per_page())
    );
    println!("   💾 Size: {}", format_file_size(stats.file_size_bytes));

    let busiest = db.pages_with_most_tables(5)?;
    if !busiest.is_empty() {
        println!("   Pages with the most tables:");
        for (page_num, tables) in busiest {
            println!("      page {}: {} tables", page_num, tables);
        }
    }

    Ok(())
}

fn meta_command(database: PathBuf) -> anyhow::Result<()> {
    let db = Database::open(&database)?;
    for (key, value) in db.metadata()? {
        println!("{}: {}", key, value);
    }
    Ok(())
}
