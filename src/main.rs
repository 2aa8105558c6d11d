use clap::{Parser, Subcommand, ValueEnum};
use dbpf::{kind, Compression, CompressionPolicy, Container, IndexVersion, ResourceKey, SaveOptions};
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dbpf", about = "Inspect, extract and build DBPF archives")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show header fields
    Info {
        input: PathBuf,
    },
    /// List index entries
    List {
        input: PathBuf,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Extract every payload, decompressed, into a directory
    Extract {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Build an archive from files named TYPE-GROUP-INSTANCE[-INSTANCE2].ext
    Pack {
        #[arg(short, long)]
        output: PathBuf,
        /// Index version: 7.0 or 7.1
        #[arg(long, default_value = "7.0")]
        index_version: IndexVersion,
        /// QFS-compress payloads that shrink
        #[arg(short, long)]
        compress: bool,
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,
    },
    /// Rewrite an archive, optionally changing how payloads are stored
    Repack {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, value_enum, default_value = "preserve")]
        compression: Policy,
    },
    /// Decompress every payload and report its CRC32
    Verify {
        input: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    Preserve,
    Compress,
    Decompress,
}

impl From<Policy> for CompressionPolicy {
    fn from(p: Policy) -> Self {
        match p {
            Policy::Preserve   => CompressionPolicy::Preserve,
            Policy::Compress   => CompressionPolicy::CompressAll,
            Policy::Decompress => CompressionPolicy::DecompressAll,
        }
    }
}

#[derive(Serialize)]
struct Listing {
    key:         String,
    kind:        &'static str,
    description: &'static str,
    location:    u32,
    size:        u32,
    compressed:  bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let dbpf = Container::open_path(&input)?;
            let h = dbpf.header();
            let date = |d: Option<chrono::DateTime<chrono::Utc>>| {
                d.map(|d| d.to_rfc3339()).unwrap_or_else(|| "-".into())
            };

            println!("── DBPF Archive ─────────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Version        {}", h.version());
            println!("  User version   {}", h.user_version());
            println!("  Index version  {}", dbpf.index_version());
            println!("  Flags          0x{:08X}", h.flags);
            println!("  Created        {}", date(h.created()));
            println!("  Modified       {}", date(h.modified()));
            println!("  Index          {} entries @ {} ({} B)", h.index_count, h.index_offset, h.index_size);
            println!("  Holes          {} @ {} ({} B)", h.hole_count, h.hole_offset, h.hole_size);
            println!("  Entries        {}", dbpf.entries().len());
            println!("  Compressed     {}", dbpf.entries().iter().filter(|e| e.compressed).count());
            if let Some(dir) = dbpf.directory_entry() {
                println!("  Directory      @ {} ({} B)", dir.location, dir.size);
            }
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, json } => {
            let dbpf = Container::open_path(&input)?;
            let rows: Vec<Listing> = dbpf.entries().iter().map(|e| {
                let info = kind::lookup(e.key.type_id);
                Listing {
                    key:         e.key.to_string(),
                    kind:        info.kind.name(),
                    description: info.description,
                    location:    e.location,
                    size:        e.size,
                    compressed:  e.compressed,
                }
            }).collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("Archive: {}", input.display());
                println!("{:<36} {:<5} {:>10} {:>10} {:>4}", "Key", "Kind", "Offset", "Size", "QFS");
                for r in &rows {
                    println!("{:<36} {:<5} {:>10} {:>10} {:>4}",
                        r.key, r.kind, r.location, r.size, if r.compressed { "yes" } else { "" });
                }
            }
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { input, output_dir } => {
            let mut dbpf = Container::open_path(&input)?;
            std::fs::create_dir_all(&output_dir)?;
            let mut written = Vec::new();
            dbpf.visit(|entry, data| {
                let ext = kind::lookup(entry.key.type_id).kind.extension();
                written.push((output_dir.join(format!("{}.{ext}", entry.key)), data));
            })?;
            for (path, data) in &written {
                std::fs::write(path, data)?;
                println!("  extracted  {}", path.display());
            }
            println!("Extracted {} entries to {}", written.len(), output_dir.display());
        }

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { output, index_version, compress, input } => {
            let mut dbpf: Container<File> = Container::new(index_version);
            for path in &input {
                let entry = dbpf.insert(key_from_path(path)?, std::fs::read(path)?, Compression::Stored)?;
                println!("  packed  {}  {}", path.display(), entry.key);
            }
            let compression = if compress { CompressionPolicy::CompressAll } else { CompressionPolicy::Preserve };
            let summary = dbpf.save(&output, &SaveOptions { compression })?;
            println!("Created: {} ({} entries, {} compressed, {} B)",
                output.display(), summary.entries, summary.compressed, summary.bytes);
        }

        // ── Repack ───────────────────────────────────────────────────────────
        Commands::Repack { input, output, compression } => {
            let mut dbpf = Container::open_path(&input)?;
            let opts = SaveOptions { compression: compression.into() };
            let summary = dbpf.save(&output, &opts)?;
            println!("Repacked → {} ({} entries, {} compressed, {} B)",
                output.display(), summary.entries, summary.compressed, summary.bytes);
        }

        // ── Verify ───────────────────────────────────────────────────────────
        Commands::Verify { input } => {
            let mut dbpf = Container::open_path(&input)?;
            let mut failures = 0usize;
            for entry in dbpf.entries().to_vec() {
                match dbpf.payload(&entry) {
                    Ok(data) => println!("  ok    {}  crc32={:08x}  {} B", entry.key, crc32fast::hash(&data), data.len()),
                    Err(e) => {
                        failures += 1;
                        println!("  FAIL  {}  {e}", entry.key);
                    }
                }
            }
            if failures > 0 {
                return Err(format!("{failures} entries failed to decode").into());
            }
            println!("All {} entries decoded", dbpf.entries().len());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dbpf={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn key_from_path(path: &Path) -> Result<ResourceKey, Box<dyn std::error::Error>> {
    let name = path
        .file_name()
        .ok_or_else(|| format!("not a file: {}", path.display()))?
        .to_string_lossy();
    Ok(name.parse::<ResourceKey>()?)
}
