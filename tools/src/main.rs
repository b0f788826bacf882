use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use glob::Pattern;
use server::ServerConfig;
use svproto_tools::{audit_ban_list, format_report_pretty, inspect_datagram, InspectReport};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "svproto-tools",
    version,
    about = "svproto datagram inspection and server maintenance tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect captured datagrams.
    Inspect {
        /// A datagram file, or a directory of them.
        packet_path: PathBuf,
        /// Optional glob filter when inspecting a directory.
        #[arg(long)]
        glob: Option<String>,
        /// Sort inspected datagrams.
        #[arg(long, value_enum)]
        sort: Option<InspectSort>,
        /// Limit the number of inspected datagrams (after sorting).
        #[arg(long)]
        limit: Option<usize>,
        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },
    /// Check a ban list file (`addip` / `banid` lines).
    Bans {
        /// Path to the ban list.
        file: PathBuf,
        /// Capacity of each list.
        #[arg(long, default_value_t = 32768)]
        max_filters: usize,
        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },
    /// Validate a server config and print it with defaults filled in.
    Config {
        /// JSON config; the defaults are printed when omitted.
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum InspectSort {
    Size,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Inspect {
            packet_path,
            glob,
            sort,
            limit,
            format,
        } => {
            if packet_path.is_dir() {
                let entries = collect_packet_entries(&packet_path, glob.as_deref())?;
                let mut entries = maybe_sort_entries(entries, sort);
                let limit = limit.or(sort.map(|InspectSort::Size| 10));
                if let Some(limit) = limit {
                    entries.truncate(limit);
                }
                for entry in entries {
                    let report = inspect_file(&entry.path)?;
                    println!("== {} ({} bytes) ==", entry.path.display(), entry.size);
                    print_report(&report, format)?;
                }
            } else {
                let report = inspect_file(&packet_path)?;
                print_report(&report, format)?;
            }
        }
        Command::Bans {
            file,
            max_filters,
            format,
        } => {
            let text = fs::read_to_string(&file)
                .with_context(|| format!("read ban list {}", file.display()))?;
            let audit = audit_ban_list(&text, max_filters);
            match format {
                OutputFormat::Json => {
                    let json = serde_json::to_string_pretty(&audit).context("serialize json")?;
                    println!("{json}");
                }
                OutputFormat::Pretty => {
                    println!("applied: {} skipped: {}", audit.applied, audit.skipped);
                    println!("address filters:");
                    for line in &audit.addresses {
                        println!("  {line}");
                    }
                    println!("user id bans:");
                    for line in &audit.user_ids {
                        println!("  {line}");
                    }
                }
            }
        }
        Command::Config { path } => {
            let config = match path {
                Some(path) => ServerConfig::load(&path)
                    .with_context(|| format!("load config {}", path.display()))?,
                None => ServerConfig::default(),
            };
            let json = serde_json::to_string_pretty(&config).context("serialize json")?;
            println!("{json}");
        }
    }
    Ok(())
}

fn inspect_file(path: &Path) -> Result<InspectReport> {
    let bytes = fs::read(path).with_context(|| format!("read datagram {}", path.display()))?;
    debug!(path = %path.display(), len = bytes.len(), "inspecting datagram");
    Ok(inspect_datagram(
        &bytes,
        &wire::Limits::default(),
        &codec::CodecLimits::default(),
    ))
}

fn print_report(report: &InspectReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(report).context("serialize json")?;
            println!("{json}");
        }
        OutputFormat::Pretty => print!("{}", format_report_pretty(report)),
    }
    Ok(())
}

struct PacketEntry {
    path: PathBuf,
    size: u64,
}

fn collect_packet_entries(dir: &Path, glob: Option<&str>) -> Result<Vec<PacketEntry>> {
    let mut entries = Vec::new();
    let pattern = match glob {
        Some(value) => Some(Pattern::new(value).context("invalid glob pattern")?),
        None => None,
    };

    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(pattern) = &pattern {
            let matches_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| pattern.matches(name));
            if !pattern.matches_path(&path) && !matches_name {
                continue;
            }
        }
        let size = entry.metadata()?.len();
        entries.push(PacketEntry { path, size });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

fn maybe_sort_entries(
    mut entries: Vec<PacketEntry>,
    sort: Option<InspectSort>,
) -> Vec<PacketEntry> {
    if let Some(InspectSort::Size) = sort {
        entries.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)));
    }
    entries
}
