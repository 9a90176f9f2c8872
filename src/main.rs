use binappend::codec::MAX_COMPRESSION_LEVEL;
use binappend::{Appender, Extractor, WriterOptions};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser)]
#[command(name = "binappend", about = "Append files to the end of another file and read them back")]
struct Cli {
    /// Log verbosity on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append files to the end of <archive> and write the index
    Write {
        /// Gzip each appended file
        #[arg(short, long)]
        compress: bool,
        /// Gzip level, 0-9
        #[arg(short, long, default_value_t = binappend::codec::DEFAULT_COMPRESSION_LEVEL,
              value_parser = clap::value_parser!(u32).range(0..=MAX_COMPRESSION_LEVEL as i64))]
        level: u32,
        archive: PathBuf,
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },
    /// Write one entry of <archive> to stdout
    Read {
        /// Print every entry name instead, one per line
        #[arg(short, long)]
        dump_table: bool,
        archive: PathBuf,
        #[arg(required_unless_present = "dump_table")]
        name: Option<String>,
    },
    /// Check every entry's checksum
    Verify {
        archive: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {

        // ── Write ────────────────────────────────────────────────────────────
        Commands::Write { compress, level, archive, files } => {
            let appender = Appender::open_with_options(&archive, WriterOptions { level })?;
            for path in &files {
                appender.append_file(path, compress)?;
                eprintln!("  appended  {}", path.display());
            }
            appender.close()?;
        }

        // ── Read ─────────────────────────────────────────────────────────────
        Commands::Read { dump_table, archive, name } => {
            let extractor = Extractor::open(&archive)?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            match (dump_table, name) {
                (true, _) => {
                    for name in extractor.available_names() {
                        writeln!(out, "{name}")?;
                    }
                }
                (false, Some(name)) => {
                    let mut entry = extractor.get_reader(&name)?;
                    io::copy(&mut entry, &mut out)?;
                }
                (false, None) => return Err("read needs an entry name or --dump-table".into()),
            }
            out.flush()?;
        }

        // ── Verify ───────────────────────────────────────────────────────────
        Commands::Verify { archive } => {
            let extractor = Extractor::open(&archive)?;
            let checked = extractor.verify()?;
            eprintln!("{}: {} entries OK", archive.display(), checked);
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

/// Logs go to stderr; stdout carries entry data.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}
