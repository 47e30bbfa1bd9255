use clap::{Parser, Subcommand};
use mhpf::archive::{export_ids, pack_directory, scan_archive, unpack_archive, PackOptions};
use mhpf::header::{DEFAULT_PACK_INDEX, DEFAULT_VERSION};
use mhpf::index::{IdMap, UnmappedPolicy};
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser)]
#[command(name = "mhpf", version, about = "Melbourne House pack file (MHPF) tool")]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a directory into a .pck file
    Pack {
        /// Source directory
        #[arg(short, long)]
        input: PathBuf,
        /// Output pack file
        #[arg(short, long)]
        output: PathBuf,
        /// Identifier map (fileids.json)
        #[arg(long, default_value = "fileids.json")]
        ids: PathBuf,
        /// Opaque pack index stored in the header
        #[arg(long, default_value_t = DEFAULT_PACK_INDEX)]
        pack_index: u32,
        /// Header version field
        #[arg(long = "format-version", default_value_t = DEFAULT_VERSION)]
        format_version: u32,
        /// Leave out files missing from the identifier map instead of failing
        #[arg(long)]
        allow_unmapped: bool,
    },
    /// Unpack a .pck file into a directory
    Unpack {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print the header and tables of a .pck file
    Scan {
        #[arg(short, long)]
        input: PathBuf,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Write the identifier map of a .pck file (stdout when no output given)
    Ids {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match (cli.quiet, cli.verbose) {
        (true, _) => Level::WARN,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli.command) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(command: Commands) -> mhpf::Result<()> {
    match command {
        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { input, output, ids, pack_index, format_version, allow_unmapped } => {
            let ids = IdMap::load(&ids)?;
            let opts = PackOptions {
                version:  format_version,
                pack_index,
                unmapped: if allow_unmapped { UnmappedPolicy::Drop } else { UnmappedPolicy::Reject },
            };
            let summary = pack_directory(&input, &output, &ids, &opts)?;
            println!("Created: {} ({} resources, {} bytes)",
                     output.display(), summary.resources, summary.total_size);
        }

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { input, output } => {
            let count = unpack_archive(&input, &output)?;
            println!("Unpacked {count} resources to: {}", output.display());
        }

        // ── Scan ─────────────────────────────────────────────────────────────
        Commands::Scan { input, json } => {
            let report = scan_archive(&input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{report}");
            }
        }

        // ── Ids ──────────────────────────────────────────────────────────────
        Commands::Ids { input, output } => {
            let json = export_ids(&input)?.to_json_pretty()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json + "\n")?;
                    println!("Wrote: {}", path.display());
                }
                None => println!("{json}"),
            }
        }
    }

    Ok(())
}
