use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use tzp::reader::{decompress_file, read_info};
use tzp::writer::{compress_file, CompressOptions, CompressionSummary};
use tzp::{CancelToken, Profile, TzpError};

const EXIT_USAGE: u8 = 1;

#[derive(Parser)]
#[command(name = "tzp")]
#[command(about = "Adaptive block compression for the .tzp container format", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Enable debug-level diagnostics.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file into a .tzp container.
    Compress {
        input: PathBuf,
        /// Defaults to "<input>.tzp".
        output: Option<PathBuf>,
        /// Compression profile: lightning, fast, balanced, high, or max.
        #[arg(short, long, default_value = "balanced")]
        profile: String,
        /// Worker threads (0 = one per block, capped at logical CPUs).
        #[arg(short, long, default_value_t = 0)]
        threads: usize,
        /// Overwrite the output file if it exists.
        #[arg(long)]
        force: bool,
    },
    /// Restore the original file from a .tzp container.
    Decompress {
        input: PathBuf,
        /// Defaults to the input minus its ".tzp" suffix.
        output: Option<PathBuf>,
        /// Worker threads (0 = one per block, capped at logical CPUs).
        #[arg(short, long, default_value_t = 0)]
        threads: usize,
        /// Overwrite the output file if it exists.
        #[arg(long)]
        force: bool,
    },
    /// Show header, metadata, and block table without decompressing.
    Info { input: PathBuf },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // clap's own help/version output is not an error.
            if e.use_stderr() {
                let _ = e.print();
                return ExitCode::from(EXIT_USAGE);
            }
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(RunError::Usage(message)) => {
            eprintln!("error: {message}");
            ExitCode::from(EXIT_USAGE)
        }
        Err(RunError::Engine(e)) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

enum RunError {
    Usage(String),
    Engine(TzpError),
}

impl From<TzpError> for RunError {
    fn from(e: TzpError) -> Self {
        RunError::Engine(e)
    }
}

fn run(command: Commands) -> Result<(), RunError> {
    match command {
        Commands::Compress {
            input,
            output,
            profile,
            threads,
            force,
        } => {
            let profile: Profile = profile.parse().map_err(RunError::Usage)?;
            let output = output.unwrap_or_else(|| default_compress_output(&input));
            check_overwrite(&output, force)?;

            let options = CompressOptions {
                profile,
                threads,
                filename_hint: None,
            };
            let summary = compress_file(&input, &output, &options, &CancelToken::new())?;
            print_compress_summary(&input, &output, &summary);
            Ok(())
        }
        Commands::Decompress {
            input,
            output,
            threads,
            force,
        } => {
            let output = output.unwrap_or_else(|| default_decompress_output(&input));
            check_overwrite(&output, force)?;

            let summary = decompress_file(&input, &output, threads, &CancelToken::new())?;
            println!(
                "{} -> {} ({} bytes from {} compressed, {} blocks, {:.2}s)",
                input.display(),
                output.display(),
                summary.original_len,
                summary.compressed_len,
                summary.block_count,
                summary.elapsed_secs,
            );
            Ok(())
        }
        Commands::Info { input } => {
            print_info(&input)?;
            Ok(())
        }
    }
}

fn default_compress_output(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(".tzp");
    PathBuf::from(name)
}

fn default_decompress_output(input: &Path) -> PathBuf {
    match input.extension() {
        Some(ext) if ext == "tzp" => input.with_extension(""),
        _ => {
            let mut name = input.as_os_str().to_owned();
            name.push(".out");
            PathBuf::from(name)
        }
    }
}

fn check_overwrite(output: &Path, force: bool) -> Result<(), RunError> {
    if output.exists() && !force {
        return Err(RunError::Engine(TzpError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} exists; pass --force to overwrite", output.display()),
        ))));
    }
    Ok(())
}

fn print_compress_summary(input: &Path, output: &Path, summary: &CompressionSummary) {
    let reduction = (1.0 - summary.ratio()) * 100.0;
    let speed = if summary.elapsed_secs > 0.0 {
        summary.original_len as f64 / (1024.0 * 1024.0) / summary.elapsed_secs
    } else {
        0.0
    };
    println!("{} -> {}", input.display(), output.display());
    println!(
        "  {} -> {} bytes ({:.2}% reduction, {:.1} MB/s)",
        summary.original_len, summary.compressed_len, reduction, speed
    );
    println!(
        "  content: {}, {} blocks of {} bytes base size",
        summary.analysis.content_class.name(),
        summary.block_count,
        summary.base_block_size
    );
    for (algorithm, count) in &summary.algorithms {
        println!("  {algorithm}: {count} blocks");
    }
}

fn print_info(input: &Path) -> Result<(), TzpError> {
    let info = read_info(input)?;

    println!("--- {} ---", input.display());
    println!("version:          3.1");
    println!("original length:  {} bytes", info.header.original_len);
    println!("block count:      {}", info.header.block_count);
    println!("base block size:  {} bytes", info.header.base_block_size);
    println!("global hash:      {}", hex::encode(info.header.global_hash));
    println!("global flags:     0x{:04X}", info.header.flags);
    println!("profile:          {}", info.metadata.profile);
    println!(
        "content class:    {}",
        info.metadata.analysis.content_class.name()
    );
    println!("entropy:          {:.2}/8.0", info.metadata.analysis.entropy);
    println!(
        "compressibility:  {:.0}%",
        info.metadata.analysis.compressibility_estimate * 100.0
    );

    println!("blocks:");
    println!(
        "  {:>5} {:>12} {:>12} {:>12} {:<14} {:>6} {:>10}",
        "#", "offset", "compressed", "original", "algorithm", "flags", "crc32"
    );
    for (index, entry) in info.entries.iter().enumerate() {
        let algorithm = entry
            .algorithm()
            .map(|a| a.name())
            .unwrap_or("invalid");
        println!(
            "  {:>5} {:>12} {:>12} {:>12} {:<14} 0x{:04X} {:>10}",
            index,
            entry.payload_offset,
            entry.compressed_size,
            entry.original_size,
            algorithm,
            entry.flags,
            format!("{:08x}", entry.crc32),
        );
    }
    Ok(())
}
