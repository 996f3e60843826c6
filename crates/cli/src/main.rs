use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use mediashelf_core::archive::{epub::EpubBook, open_archive, pdf::PdfReader};
use mediashelf_core::cache::ExtractionCache;
use mediashelf_core::catalog::CatalogEntry;
use mediashelf_core::config::{cache_dir, config_path, load_config, AppConfig};
use mediashelf_core::detect::{classify_path, is_image_entry, verify_file, ArchiveKind, MediaKind};
use mediashelf_core::natsort;
use mediashelf_core::progress::{ProgressEvent, ProgressHandler};
use mediashelf_core::scanner::Scanner;

type CliError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(name = "mediashelf")]
#[command(about = "Scan local comic, novel, and album collections into a catalog")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a library root and update the catalog
    Scan {
        /// Library root directory
        #[arg(required = true)]
        root: String,

        /// Media kind (comic, novel, audio)
        #[arg(short, long, default_value = "comic")]
        kind: String,

        /// Catalog file to read and update
        #[arg(short, long, default_value = "catalog.json")]
        catalog: String,
    },

    /// Show structure of a single item
    Info {
        /// Input file or directory
        #[arg(required = true)]
        input: String,
    },

    /// Extract an item's cover image
    Cover {
        /// Input file or directory
        #[arg(required = true)]
        input: String,

        /// Output file
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Extract one chapter's pages into the cache
    Extract {
        /// Input archive
        #[arg(required = true)]
        input: String,

        /// Internal chapter path prefix (empty for whole archive)
        #[arg(long, default_value = "")]
        chapter: String,
    },

    /// Inspect or clear the extraction cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show per-namespace disk usage
    Stats,
    /// Drop extracted pages and archive copies, keep covers
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print the config file path
    Path,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let result = match &cli.command {
        Commands::Scan { root, kind, catalog } => run_scan(root, kind, catalog, cli.json),
        Commands::Info { input } => run_info(input, cli.json),
        Commands::Cover { input, output } => run_cover(input, output.as_deref(), cli.json),
        Commands::Extract { input, chapter } => run_extract(input, chapter, cli.json),
        Commands::Cache { action } => run_cache(action, cli.json),
        Commands::Config { action } => run_config(action, cli.json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Progress printer for interactive scans.
struct StderrProgress;

impl ProgressHandler for StderrProgress {
    fn on_progress(&self, event: ProgressEvent) {
        if event.current_item.is_empty() {
            return;
        }
        match event.total {
            Some(total) => eprintln!("[{}/{}] {}", event.processed, total, event.current_item),
            None => eprintln!("[{}] {}", event.processed, event.current_item),
        }
    }
}

fn open_cache(cfg: &AppConfig) -> Result<ExtractionCache, CliError> {
    Ok(ExtractionCache::open(cache_dir(cfg))?)
}

fn load_catalog(path: &Path) -> Result<HashMap<String, CatalogEntry>, CliError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn run_scan(root: &str, kind: &str, catalog: &str, json: bool) -> Result<(), CliError> {
    let root = Path::new(root);
    if !root.is_dir() {
        return Err(format!("library root not found: {}", root.display()).into());
    }
    let kind: MediaKind = kind.parse()?;
    let cfg = load_config();
    let cache = open_cache(&cfg)?;

    let catalog_path = Path::new(catalog);
    let mut entries = load_catalog(catalog_path)?;

    let scanner = Scanner::new(&cache, cfg.scan.clone());
    let progress = StderrProgress;
    let handler: Option<&dyn ProgressHandler> = if json { None } else { Some(&progress) };
    let existing = entries.clone();
    let summary = scanner.scan(root, kind, &existing, handler, &mut |entry| {
        entries.insert(entry.id.clone(), entry);
        // Persist after every emission so an interrupted scan keeps what
        // it already produced.
        if let Ok(serialized) = serde_json::to_string_pretty(&entries) {
            let _ = std::fs::write(catalog_path, serialized);
        }
    })?;

    std::fs::write(catalog_path, serde_json::to_string_pretty(&entries)?)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "emitted": summary.emitted,
                "skipped": summary.skipped,
                "dropped": summary.dropped,
                "cancelled": summary.cancelled,
                "catalog": catalog_path,
            })
        );
    } else {
        println!(
            "Scanned {}: {} updated, {} unchanged, {} dropped",
            root.display(),
            summary.emitted,
            summary.skipped,
            summary.dropped
        );
    }
    Ok(())
}

fn run_info(input: &str, json: bool) -> Result<(), CliError> {
    let path = Path::new(input);
    if !path.exists() {
        return Err(format!("input not found: {}", path.display()).into());
    }
    let Some(kind) = classify_path(path) else {
        return Err(format!("unsupported format: {}", path.display()).into());
    };
    let verified = verify_file(path, kind)?;

    let (entries, images) = match kind {
        ArchiveKind::Epub => {
            let book = EpubBook::open(path)?;
            (book.chapters().len(), 0)
        }
        ArchiveKind::Pdf => {
            let reader = PdfReader::open(path)?;
            (reader.page_count(), reader.page_count())
        }
        ArchiveKind::Text => (0, 0),
        _ => {
            let cfg = load_config();
            let cache = open_cache(&cfg)?;
            let mut reader = open_archive(path, kind, &cache)?;
            let listed = reader.list_entries()?;
            let images = listed
                .iter()
                .filter(|e| !e.is_dir && is_image_entry(&e.path))
                .count();
            (listed.len(), images)
        }
    };

    if json {
        println!(
            "{}",
            serde_json::json!({
                "path": path,
                "kind": kind.to_string(),
                "verified": verified,
                "entries": entries,
                "images": images,
            })
        );
    } else {
        println!("Path:     {}", path.display());
        println!("Kind:     {}", kind);
        println!("Verified: {}", verified);
        println!("Entries:  {}", entries);
        println!("Images:   {}", images);
    }
    Ok(())
}

fn run_cover(input: &str, output: Option<&str>, json: bool) -> Result<(), CliError> {
    let path = Path::new(input);
    let Some(kind) = classify_path(path) else {
        return Err(format!("unsupported format: {}", path.display()).into());
    };
    let cfg = load_config();
    let cache = open_cache(&cfg)?;

    let (bytes, ext) = match kind {
        ArchiveKind::Pdf => {
            let reader = PdfReader::open(path)?;
            (reader.render_page(0)?, "png".to_string())
        }
        ArchiveKind::Epub => {
            let mut book = EpubBook::open(path)?;
            let href = book
                .cover_href()
                .map(str::to_string)
                .ok_or("EPUB declares no cover image")?;
            let ext = href.rsplit('.').next().unwrap_or("jpg").to_string();
            (book.read_resource(&href)?, ext)
        }
        ArchiveKind::Text => return Err("plain text has no cover".into()),
        _ => {
            let mut reader = open_archive(path, kind, &cache)?;
            let listed = reader.list_entries()?;
            let mut images: Vec<&str> = listed
                .iter()
                .filter(|e| !e.is_dir && is_image_entry(&e.path))
                .map(|e| e.path.as_str())
                .collect();
            images.sort_by(|a, b| natsort::compare(a, b));
            let first = *images.first().ok_or("no images in archive")?;
            let ext = first.rsplit('.').next().unwrap_or("jpg").to_string();
            (reader.read_entry(first)?, ext)
        }
    };

    let out = match output {
        Some(o) => PathBuf::from(o),
        None => {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "cover".to_string());
            PathBuf::from(format!("{stem}_cover.{ext}"))
        }
    };
    std::fs::write(&out, &bytes)?;

    if json {
        println!("{}", serde_json::json!({ "cover": out, "bytes": bytes.len() }));
    } else {
        println!("Wrote {} ({} bytes)", out.display(), bytes.len());
    }
    Ok(())
}

fn run_extract(input: &str, chapter: &str, json: bool) -> Result<(), CliError> {
    let path = Path::new(input);
    let Some(kind) = classify_path(path) else {
        return Err(format!("unsupported format: {}", path.display()).into());
    };
    let cfg = load_config();
    let cache = open_cache(&cfg)?;
    let source_id = std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned();

    let mut reader = open_archive(path, kind, &cache)?;
    let listed = reader.list_entries()?;
    let pages: Vec<_> = listed
        .iter()
        .filter(|e| !e.is_dir && is_image_entry(&e.path) && e.path.starts_with(chapter))
        .cloned()
        .collect();
    if pages.is_empty() {
        return Err(format!("no pages under {chapter:?}").into());
    }

    let paths = cache.populate_pages(&source_id, chapter, reader.as_mut(), &pages)?;

    if json {
        println!("{}", serde_json::json!({ "pages": paths }));
    } else {
        for p in &paths {
            println!("{}", p.display());
        }
    }
    Ok(())
}

fn run_cache(action: &CacheAction, json: bool) -> Result<(), CliError> {
    let cfg = load_config();
    let cache = open_cache(&cfg)?;
    match action {
        CacheAction::Stats => {
            let (pages, covers, archives) = cache.usage();
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "root": cache.root(),
                        "pages_bytes": pages,
                        "covers_bytes": covers,
                        "archives_bytes": archives,
                    })
                );
            } else {
                println!("Cache root: {}", cache.root().display());
                println!("Pages:      {} bytes", pages);
                println!("Covers:     {} bytes", covers);
                println!("Archives:   {} bytes", archives);
            }
        }
        CacheAction::Clear => {
            cache.clear_transient()?;
            if json {
                println!("{}", serde_json::json!({ "cleared": true }));
            } else {
                println!("Cleared pages and archive copies (covers kept)");
            }
        }
    }
    Ok(())
}

fn run_config(action: &ConfigAction, json: bool) -> Result<(), CliError> {
    match action {
        ConfigAction::Show => {
            let cfg = load_config();
            if json {
                println!("{}", serde_json::to_string_pretty(&cfg)?);
            } else {
                println!("{}", toml::to_string_pretty(&cfg)?);
            }
        }
        ConfigAction::Path => match config_path() {
            Some(p) => println!("{}", p.display()),
            None => return Err("no config directory on this platform".into()),
        },
    }
    Ok(())
}
