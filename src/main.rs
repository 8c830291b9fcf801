use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use hashdex::index::build::build_index;
use hashdex::index::reader::IndexReader;
use hashdex::index::stats::show_stats;
use hashdex::output::{LookupFormat, print_lookups};
use hashdex::utils;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hashdex")]
#[command(about = "Segmented on-disk hashed inverted index")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a fresh index from the files under a directory
    Index {
        /// Directory to crawl
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Where to store the index (defaults to the app data directory)
        #[arg(long)]
        index_dir: Option<PathBuf>,

        /// Replace an existing index
        #[arg(short, long)]
        force: bool,

        /// Dictionary slots per table
        #[arg(long)]
        table_size: Option<u64>,

        /// Unique buffered terms that trigger a segment flush
        #[arg(long)]
        flush_threshold: Option<usize>,

        /// No progress output
        #[arg(short, long)]
        quiet: bool,
    },
    /// Print the postings of one or more terms
    Lookup {
        /// Terms to look up
        #[arg(required = true)]
        terms: Vec<String>,

        /// Indexed directory
        #[arg(short, long, default_value = ".")]
        path: PathBuf,

        #[arg(long)]
        index_dir: Option<PathBuf>,

        /// Print the stored `term d:p,p.d:p` text
        #[arg(long)]
        raw: bool,

        #[arg(long)]
        no_color: bool,
    },
    /// Show index statistics
    Stats {
        #[arg(default_value = ".")]
        path: PathBuf,

        #[arg(long)]
        index_dir: Option<PathBuf>,
    },
    /// Remove an index
    Remove {
        #[arg(default_value = ".")]
        path: PathBuf,

        #[arg(long)]
        index_dir: Option<PathBuf>,
    },
    /// Show or update the saved index configuration
    Config {
        #[arg(long)]
        table_size: Option<u64>,

        #[arg(long)]
        flush_threshold: Option<usize>,

        #[arg(long)]
        postings_cache: Option<usize>,

        /// Write the resulting configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hashdex=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Index {
            path,
            index_dir,
            force,
            table_size,
            flush_threshold,
            quiet,
        } => {
            let mut config = utils::load_config()?;
            config.table_size = table_size.unwrap_or(config.table_size);
            config.flush_threshold = flush_threshold.unwrap_or(config.flush_threshold);
            config.validate()?;

            let index_dir = utils::resolve_index_dir(index_dir.as_deref(), &path)?;
            prepare_index_dir(&index_dir, force)?;

            let summary = build_index(&path, &index_dir, config, quiet)?;
            println!(
                "Indexed {} documents ({} terms, {} tokens) in {} segments",
                summary.docs_indexed, summary.terms, summary.tokens, summary.generations
            );
        }
        Commands::Lookup {
            terms,
            path,
            index_dir,
            raw,
            no_color,
        } => {
            let index_dir = utils::resolve_index_dir(index_dir.as_deref(), &path)?;
            let config = utils::load_config()?;
            let reader = open_reader(&index_dir, config.postings_cache)?;

            let mut results = Vec::with_capacity(terms.len());
            for term in terms {
                let term = utils::normalize_term(&term);
                if term.is_empty() {
                    continue;
                }
                let list = reader.get_postings(&term)?;
                results.push((term, list));
            }

            let format = if raw {
                LookupFormat::Raw
            } else {
                LookupFormat::Documents
            };
            print_lookups(&reader, &results, format, !no_color)?;
        }
        Commands::Stats { path, index_dir } => {
            let index_dir = utils::resolve_index_dir(index_dir.as_deref(), &path)?;
            show_stats(&index_dir)?;
        }
        Commands::Remove { path, index_dir } => {
            let index_dir = utils::resolve_index_dir(index_dir.as_deref(), &path)?;
            if utils::remove_index(&index_dir)? {
                println!("Removed index: {}", index_dir.display());
            } else {
                println!("No index at: {}", index_dir.display());
            }
        }
        Commands::Config {
            table_size,
            flush_threshold,
            postings_cache,
            save,
        } => {
            let mut config = utils::load_config()?;
            config.table_size = table_size.unwrap_or(config.table_size);
            config.flush_threshold = flush_threshold.unwrap_or(config.flush_threshold);
            config.postings_cache = postings_cache.unwrap_or(config.postings_cache);
            config.validate()?;

            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                utils::save_config(&config)?;
                println!("Saved to {}", utils::get_config_path()?.display());
            }
        }
    }

    Ok(())
}

fn prepare_index_dir(index_dir: &Path, force: bool) -> Result<()> {
    if !utils::is_committed(index_dir) {
        return Ok(());
    }
    if !force {
        bail!(
            "An index already exists at {} (use --force to rebuild)",
            index_dir.display()
        );
    }
    utils::remove_index(index_dir)?;
    Ok(())
}

fn open_reader(index_dir: &Path, cache: usize) -> Result<IndexReader> {
    if !utils::is_committed(index_dir) {
        bail!("No index found at {} (run `hashdex index` first)", index_dir.display());
    }
    IndexReader::open_with_cache(index_dir, cache)
        .with_context(|| format!("Failed to open index at {}", index_dir.display()))
}
