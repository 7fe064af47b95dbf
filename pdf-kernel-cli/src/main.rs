use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdf_kernel::objects::Object;
use pdf_kernel::{Document, ParseOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pdfkernel",
    about = "Inspect and merge PDF files at the object level",
    version,
    author
)]
struct Cli {
    /// Log library activity (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Refuse to recover from malformed files
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Get information about a PDF file
    Info {
        /// Input PDF file
        input: PathBuf,
    },

    /// List every live indirect object
    Objects {
        /// Input PDF file
        input: PathBuf,
    },

    /// List the resource names of a page
    Resources {
        /// Input PDF file
        input: PathBuf,

        /// Page number (1-based)
        #[arg(short, long, default_value = "1")]
        page: usize,
    },

    /// Merge multiple PDFs into one
    Merge {
        /// Input PDF files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let options = if cli.strict {
        ParseOptions::strict()
    } else {
        ParseOptions::default()
    };

    match cli.command {
        Commands::Info { input } => print_info(&input, options),
        Commands::Objects { input } => print_objects(&input, options),
        Commands::Resources { input, page } => print_resources(&input, page, options),
        Commands::Merge { files, output } => merge(&files, &output, options),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open(path: &Path, options: ParseOptions) -> Result<Document> {
    debug!("opening {}", path.display());
    Document::open_with_options(path, options)
        .with_context(|| format!("Failed to open PDF: {}", path.display()))
}

fn print_info(input: &Path, options: ParseOptions) -> Result<()> {
    let document = open(input, options)?;
    let page_count = document.page_count().context("Failed to read the page tree")?;

    println!("PDF Information for: {}", input.display());
    println!("==========================================");
    println!("PDF Version: {}", document.version());
    println!("Objects: {}", document.registry().len());
    println!("Pages: {page_count}");

    let metadata = document.info();
    let fields = [
        ("Title", &metadata.title),
        ("Author", &metadata.author),
        ("Subject", &metadata.subject),
        ("Keywords", &metadata.keywords),
        ("Creator", &metadata.creator),
        ("Producer", &metadata.producer),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            println!("{label}: {value}");
        }
    }
    if let Some(date) = metadata.creation_date {
        println!("Created: {}", date.to_rfc3339());
    }
    if let Some(date) = metadata.modification_date {
        println!("Modified: {}", date.to_rfc3339());
    }
    Ok(())
}

fn print_objects(input: &Path, options: ParseOptions) -> Result<()> {
    let document = open(input, options)?;
    let registry = document.registry();
    for id in registry.iter_live() {
        match registry.resolve(id) {
            Ok(object) => println!("{} {} {}", id.number(), id.generation(), describe(object)),
            Err(error) => println!("{} {} unreadable: {}", id.number(), id.generation(), error),
        }
    }
    Ok(())
}

/// Kind of an object, with its `/Type` when it has one.
fn describe(object: &Object) -> String {
    let dict = match object {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(stream.dictionary()),
        _ => None,
    };
    match dict.and_then(|dict| dict.get_name("Type")) {
        Some(kind) => format!("{} /{}", object.type_name(), kind),
        None => object.type_name().to_string(),
    }
}

fn print_resources(input: &Path, page: usize, options: ParseOptions) -> Result<()> {
    let document = open(input, options)?;
    let index = page
        .checked_sub(1)
        .context("Page numbers start at 1")?;
    let page_ref = document
        .page(index)
        .with_context(|| format!("Page {page} not found"))?;
    let resources = document
        .page_resources(&page_ref)
        .with_context(|| format!("Failed to read resources of page {page}"))?;

    for name in resources.resource_names() {
        println!("{name}");
    }
    Ok(())
}

fn merge(files: &[PathBuf], output: &Path, options: ParseOptions) -> Result<()> {
    let mut merged = Document::new();
    let mut total = 0;
    for file in files {
        let source = open(file, options)?;
        let copied = merged
            .append_document(&source)
            .with_context(|| format!("Failed to copy pages from {}", file.display()))?;
        info!("copied {} pages from {}", copied.len(), file.display());
        total += copied.len();
    }

    merged
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "✓ Merged {} pages from {} files into {}",
        total,
        files.len(),
        output.display()
    );
    Ok(())
}
