use arrayfile::detect::{self, FtpState};
use arrayfile::file_record::RECORD_BYTES;
use arrayfile::{transcode_path, AccessMethod, Architecture, BinaryEncoding, FileManager, PoolConfig};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "afile", about = "Inspect and transcode kernel array files")]
struct Cli {
    /// JSON pool configuration (defaults to $ARRAYFILE_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the file record
    Info {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// List the arrays in the summary chain
    List {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Report architecture and binary encoding without opening the file
    Identify {
        input: PathBuf,
        /// Architecture to try first: DAF or DAS
        #[arg(long, default_value = "DAF")]
        architecture: Architecture,
    },
    /// Print the comment area
    Comments {
        input: PathBuf,
    },
    /// BLAKE3 digest of the logical content
    Digest {
        input: PathBuf,
    },
    /// Write a copy in another binary encoding
    Transcode {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// BIG-IEEE, LTL-IEEE, VAX-GFLT or VAX-DFLT
        #[arg(short, long)]
        encoding: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PoolConfig::load(path)?,
        None => PoolConfig::from_env()?,
    };
    let mut fm = FileManager::new(config)?;

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, json } => {
            let h = fm.open(&input, AccessMethod::Read, Architecture::Daf)?;
            let fr = fm.read_file_record(h)?;
            if json {
                println!("{}", serde_json::to_string_pretty(fm.info(h)?)?);
            } else {
                println!("── Array file ───────────────────────────────────────────");
                println!("  Path           {}", input.display());
                println!("  ID word        {}", fr.id_word);
                println!("  Internal name  {}", fr.internal_name);
                println!("  Encoding       {}{}", fr.encoding, if fr.labelled { "" } else { " (probe word)" });
                println!("  ND / NI        {} / {}", fr.nd, fr.ni);
                println!("  FWARD          {}", fr.fward);
                println!("  BWARD          {}", fr.bward);
                println!("  FREE           {}", fr.free);
                println!("  FTP string     {:?}", fr.ftp);
            }
            fm.close(h)?;
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, json } => {
            let h = fm.open(&input, AccessMethod::Read, Architecture::Daf)?;
            let arrays = fm.list_arrays(h)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&arrays)?);
            } else {
                println!("{:<40} {:>10} {:>10} {:>8}  Integers", "Name", "Begin", "End", "Record");
                for a in &arrays {
                    println!("{:<40} {:>10} {:>10} {:>8}  {:?}", a.name, a.begin, a.end, a.record, a.ints);
                }
            }
            fm.close(h)?;
        }

        // ── Identify ─────────────────────────────────────────────────────────
        Commands::Identify { input, architecture } => {
            let mut record = vec![0u8; RECORD_BYTES];
            let n = std::fs::File::open(&input)?.read(&mut record)?;
            record.truncate(n);
            match detect::sniff(&record, architecture) {
                Some((arch, enc)) => println!("{}  {}  {}", input.display(), arch, enc),
                None => println!("{}  unrecognised", input.display()),
            }
            if detect::ftp_state(&record) == FtpState::Damaged {
                println!("  warning: FTP validation string is damaged");
            }
        }

        // ── Comments ─────────────────────────────────────────────────────────
        Commands::Comments { input } => {
            let h = fm.open(&input, AccessMethod::Read, Architecture::Daf)?;
            for line in fm.read_comments(h)? {
                println!("{line}");
            }
            fm.close(h)?;
        }

        // ── Digest ───────────────────────────────────────────────────────────
        Commands::Digest { input } => {
            let h = fm.open(&input, AccessMethod::Read, Architecture::Daf)?;
            println!("{}  {}", hex::encode(fm.content_digest(h)?), input.display());
            fm.close(h)?;
        }

        // ── Transcode ────────────────────────────────────────────────────────
        Commands::Transcode { input, output, encoding } => {
            let target = BinaryEncoding::from_label(&encoding)
                .ok_or_else(|| format!("unknown encoding '{encoding}'"))?;
            let report = transcode_path(&mut fm, &input, &output, target)?;
            println!(
                "Transcoded → {} ({} summary, {} data records, {} words)",
                output.display(),
                report.summary_records,
                report.data_records,
                report.data_words
            );
        }
    }

    Ok(())
}
