use clap::{Args, Parser, Subcommand};
use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ziso::batch::{self, Direction, IMAGE_EXTENSION};
use ziso::convert::{self, EncodeOptions, Progress, ProgressFn, Stats};
use ziso::{ContainerKind, SectorTable};

#[derive(Parser)]
#[command(name = "ziso", version, about = "Compress disc images to ZSO/CSO and back")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress an ISO image
    Compress {
        input: PathBuf,
        /// Output path (default: input with the container extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        opts: CompressArgs,
    },
    /// Restore the ISO image from a ZSO or CSO container
    Decompress {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Convert every image (or container, with --decompress) in a directory
    Batch {
        dir: PathBuf,
        #[arg(short, long)]
        decompress: bool,
        #[command(flatten)]
        opts: CompressArgs,
    },
    /// Show container header fields
    Info {
        input: PathBuf,
    },
}

#[derive(Args)]
struct CompressArgs {
    /// Compression level 1-9 (ignored by lz4)
    #[arg(short, long, default_value = "9", value_parser = clap::value_parser!(u32).range(1..=9))]
    level: u32,
    /// Index alignment shift: 0 = small/slow, 6 = fast/large
    #[arg(short, long, default_value = "6", value_parser = clap::value_parser!(u8).range(0..=31))]
    align: u8,
    /// Percent compression threshold; blocks not below it are stored plain
    #[arg(short, long, default_value = "100", value_parser = clap::value_parser!(u8).range(0..=100))]
    threshold: u8,
    /// Padding byte written between aligned payloads
    #[arg(short, long, default_value = "88")]
    padding: u8,
    /// Container format: zso (lz4) or cso (deflate)
    #[arg(short, long, default_value = "zso")]
    format: String,
    /// Compress on the calling thread only
    #[arg(long)]
    single_thread: bool,
    /// Per-block compression levels (`<block>:<level>` or `<start>-<end>:<level>` lines)
    #[arg(long)]
    sector_table: Option<PathBuf>,
}

impl CompressArgs {
    fn to_options(&self) -> Result<EncodeOptions, Box<dyn Error>> {
        let format = ContainerKind::from_name(&self.format)
            .ok_or_else(|| format!("unknown format '{}', expected zso or cso", self.format))?;
        let sector_table = match &self.sector_table {
            Some(path) => Some(SectorTable::load(path)?),
            None       => None,
        };
        Ok(EncodeOptions {
            format,
            level:     self.level,
            align:     self.align,
            threshold: self.threshold,
            padding:   self.padding,
            parallel:  !self.single_thread,
            sector_table,
        })
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .init();

    match run(Cli::parse()) {
        Ok(())   => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            let mut source = err.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {

        // ── Compress ─────────────────────────────────────────────────────────
        Commands::Compress { input, output, opts } => {
            let opts = opts.to_options()?;
            let output = output.unwrap_or_else(|| batch::output_path(&input, opts.format.extension()));
            let mut meter = meter("compress", true);
            let stats = convert::encode(&input, &output, &opts, Some(&mut *meter))?;
            finish_line();
            print_stats(&output, &stats);
        }

        // ── Decompress ───────────────────────────────────────────────────────
        Commands::Decompress { input, output } => {
            let output = output.unwrap_or_else(|| batch::output_path(&input, IMAGE_EXTENSION));
            let mut meter = meter("decompress", false);
            let stats = convert::decode(&input, &output, Some(&mut *meter))?;
            finish_line();
            println!("Restored {} ({} bytes)", output.display(), stats.image_bytes);
        }

        // ── Batch ────────────────────────────────────────────────────────────
        Commands::Batch { dir, decompress, opts } => {
            let opts = opts.to_options()?;
            let direction = if decompress { Direction::Decompress } else { Direction::Compress };
            let done = batch::convert_dir(&dir, direction, &opts, |path| {
                println!("  {}", path.display());
                Some(if decompress { meter("decompress", false) } else { meter("compress", true) })
            })?;
            finish_line();
            for (path, stats) in &done {
                print_stats(path, stats);
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let info = convert::inspect(&input)?;
            let h = &info.header;
            println!("── {} container ─────────────────────────────────", info.kind.extension().to_uppercase());
            println!("  Path             {}", input.display());
            println!("  Total file size  {} bytes", h.total_bytes);
            println!("  Block size       {} bytes", h.block_size);
            println!("  Total blocks     {}", info.blocks);
            println!("  Index align      {} ({} bytes)", h.align, 1u64 << h.align.min(63));
            println!("  Version          {}", h.version);
            println!("  Plain blocks     {}", info.plain_blocks);
            println!("  Container size   {} bytes", info.container_bytes);
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

/// Progress callback that redraws a percentage line on stderr.
fn meter(verb: &'static str, show_rate: bool) -> Box<ProgressFn<'static>> {
    let mut last = u64::MAX;
    Box::new(move |p: Progress| {
        let percent = p.blocks_done * 100 / p.total_blocks.max(1);
        if percent != last {
            last = percent;
            if show_rate {
                let rate = p.bytes_written * 100 / (p.blocks_done.max(1) * 2048);
                eprint!("\r{verb} {percent:3}% average rate {rate:3}%");
            } else {
                eprint!("\r{verb} {percent:3}%");
            }
            let _ = std::io::stderr().flush();
        }
    })
}

fn finish_line() {
    eprintln!();
}

fn print_stats(path: &Path, stats: &Stats) {
    println!(
        "{}: {} -> {} bytes, rate {}%, {} of {} blocks plain",
        path.display(),
        stats.image_bytes,
        stats.container_bytes,
        stats.rate(),
        stats.plain_blocks,
        stats.blocks
    );
}
