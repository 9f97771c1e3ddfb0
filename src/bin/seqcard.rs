use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use seqcard::export::cancel::CancelToken;
use seqcard::{BatchExporter, ExportOptions, ExportService, SequenceData};

#[derive(Parser, Debug)]
#[command(name = "seqcard", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one sequence document to an image file.
    Render(RenderArgs),
    /// Render many sequence documents into a directory of page images.
    Batch(BatchArgs),
    /// Print the export capabilities as JSON.
    Capabilities,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input sequence JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Export options JSON (partial, merged with defaults).
    #[arg(long)]
    options: Option<PathBuf>,

    /// Output image path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct BatchArgs {
    /// Input sequence JSON files.
    #[arg(long = "in", required = true)]
    in_paths: Vec<PathBuf>,

    /// Export options JSON (partial, merged with defaults).
    #[arg(long)]
    options: Option<PathBuf>,

    /// Output directory.
    #[arg(long)]
    out_dir: PathBuf,

    /// Filename prefix for the page files.
    #[arg(long, default_value = "sequence")]
    prefix: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Batch(args) => cmd_batch(args),
        Command::Capabilities => cmd_capabilities(),
    }
}

fn load_sequence(path: &PathBuf) -> anyhow::Result<SequenceData> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read sequence '{}'", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse sequence '{}'", path.display()))
}

fn load_options(path: Option<&PathBuf>) -> anyhow::Result<ExportOptions> {
    match path {
        None => Ok(ExportOptions::default()),
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read options '{}'", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parse options '{}'", path.display()))
        }
    }
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let sequence = load_sequence(&args.in_path)?;
    let options = load_options(args.options.as_ref())?;

    let mut service = ExportService::with_system_default();
    let result = service.export_sequence_image(&sequence, &options, &CancelToken::new());
    let Some(blob) = result.blob else {
        anyhow::bail!(
            "export failed: {}",
            result.error.unwrap_or_else(|| "unknown error".to_string())
        );
    };

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(&args.out, &blob.bytes)
        .with_context(|| format!("write image '{}'", args.out.display()))?;

    if let Some(metrics) = result.metrics {
        eprintln!(
            "wrote {} ({}x{}, {} bytes)",
            args.out.display(),
            metrics.width,
            metrics.height,
            metrics.encoded_bytes
        );
    }
    Ok(())
}

fn cmd_batch(args: BatchArgs) -> anyhow::Result<()> {
    let sequences: Vec<SequenceData> = args
        .in_paths
        .iter()
        .map(load_sequence)
        .collect::<anyhow::Result<_>>()?;
    let options = load_options(args.options.as_ref())?;

    let mut exporter = BatchExporter::default();
    let mut on_progress = |current: usize, total: usize, message: &str| {
        eprintln!("[{current}/{total}] {message}");
    };
    let result = exporter.export_sequences_to_dir(
        "cli-batch",
        &sequences,
        &options,
        &args.out_dir,
        &args.prefix,
        &CancelToken::new(),
        Some(&mut on_progress),
    )?;

    eprintln!(
        "batch done: {} ok, {} failed in {:.1}s",
        result.success_count,
        result.failure_count,
        result.total_processing_time.as_secs_f64()
    );
    for error in &result.errors {
        eprintln!("  failed: {error}");
    }
    if result.success_count == 0 && result.failure_count > 0 {
        anyhow::bail!("every batch item failed");
    }
    Ok(())
}

fn cmd_capabilities() -> anyhow::Result<()> {
    let service = ExportService::with_system_default();
    println!("{}", serde_json::to_string_pretty(&service.capabilities())?);
    Ok(())
}
