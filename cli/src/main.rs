use anyhow::Context;
use clap::{Parser, Subcommand};
use salvage_core::FileDevice;
use salvage_filesystems::{DirectoryEntry, FatVolume, Listing, ScrubPattern, VolumeInfo, VolumeOptions};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "salvage")]
#[command(about = "Inspect and recover data from FAT12/16/32 volumes", long_about = None)]
struct Cli {
    /// Disk image or raw device
    image: PathBuf,

    /// Byte offset of the volume inside the image
    #[arg(short = 'O', long, default_value_t = 0)]
    offset: u64,

    /// Device sector size (defaults to 512)
    #[arg(long)]
    sector_size: Option<u32>,

    /// Load the whole FAT in memory before doing anything
    #[arg(short, long)]
    cache: bool,

    /// Allow writes to the volume
    #[arg(short, long)]
    write: bool,

    /// JSON file with session options; flags given here override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the volume layout and free space
    Info {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// List a directory
    List {
        /// Directory path
        #[arg(default_value = "/")]
        path: String,
        /// List the directory starting at this cluster instead of a path
        #[arg(short = 'C', long)]
        cluster: Option<u32>,
        /// Include deleted entries
        #[arg(short, long)]
        deleted: bool,
    },
    /// Extract a file
    Read {
        /// File path inside the volume
        path: String,
        /// Destination (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Overwrite every unallocated cluster
    Scrub {
        /// Random data instead of zeros
        #[arg(long)]
        random: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut options = load_options(cli.config.as_deref())?;
    options.cache_enabled |= cli.cache;
    options.write_enabled |= cli.write;
    if let Commands::List { deleted: true, .. } = cli.command {
        options.list_deleted = true;
    }

    let mut device = FileDevice::open(&cli.image, options.write_enabled)?.with_offset(cli.offset);
    if let Some(size) = cli.sector_size {
        device = device.with_sector_size(size)?;
    }
    let mut volume = FatVolume::open(device, options)
        .with_context(|| format!("Unable to open a FAT volume in {}", cli.image.display()))?;

    match cli.command {
        Commands::Info { json } => {
            let info = volume.info();
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                print_info(&info);
            }
        }
        Commands::List { path, cluster, .. } => {
            let listing = match cluster {
                Some(cluster) => volume.list_cluster(cluster)?,
                None => volume.list_directory(&path)?,
            };
            print_listing(&listing);
        }
        Commands::Read { path, output } => {
            let mut out: Box<dyn Write> = match &output {
                Some(file) => Box::new(BufWriter::new(
                    File::create(file).with_context(|| format!("Unable to create {}", file.display()))?,
                )),
                None => Box::new(io::stdout().lock()),
            };
            let written = volume.read_file(&path, out.as_mut())?;
            if let Some(file) = output {
                eprintln!("Wrote {} bytes to {}", written, file.display());
            }
        }
        Commands::Scrub { random } => {
            let pattern = if random { ScrubPattern::Random } else { ScrubPattern::Zero };
            let scrubbed = volume.scrub_unallocated(pattern)?;
            println!("Scrambled {} clusters", scrubbed);
        }
    }

    Ok(())
}

fn load_options(path: Option<&Path>) -> anyhow::Result<VolumeOptions> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Unable to read config {}", path.display()))?;
            Ok(VolumeOptions::from_json(&text)?)
        }
        None => Ok(VolumeOptions::default()),
    }
}

fn print_info(info: &VolumeInfo) {
    println!("FAT Filesystem information\n");
    println!("Filesystem type: {}", info.fs_type);
    println!("OEM name: {}", info.oem_name);
    println!("Volume label: {}", info.volume_label);
    println!("Total sectors: {}", info.total_sectors);
    println!("Total data clusters: {}", info.total_clusters);
    println!("Data size: {} ({})", info.data_size, human_size(info.data_size));
    println!("Disk size: {} ({})", info.disk_size, human_size(info.disk_size));
    println!("Bytes per sector: {}", info.bytes_per_sector);
    println!("Sectors per cluster: {}", info.sectors_per_cluster);
    println!("Bytes per cluster: {}", info.bytes_per_cluster);
    println!("Reserved sectors: {}", info.reserved_sectors);
    if let (Some(entries), Some(sectors)) = (info.root_entries, info.root_sectors) {
        println!("Root entries: {}", entries);
        println!("Root sectors: {}", sectors);
    }
    println!("Sectors per FAT: {}", info.sectors_per_fat);
    println!("FAT size: {} ({})", info.fat_size, human_size(info.fat_size));
    println!("FAT1 start sector: {}", info.fat1_start);
    println!("FAT2 start sector: {}", info.fat2_start);
    println!("Data start sector: {}", info.data_start);
    println!("Root directory cluster: {}", info.root_cluster);
    println!();

    let free = &info.free_space;
    println!("Free clusters: {}/{}", free.free_clusters, free.total_clusters);
    println!("Free space: {} ({})", free.free_bytes(), human_size(free.free_bytes()));
    println!("Used space: {} ({})", free.used_bytes(), human_size(free.used_bytes()));

    if info.strangeness > 0 {
        println!();
        println!("Filesystem strangeness: {}", info.strangeness);
    }
}

fn print_listing(listing: &Listing) {
    println!("Directory cluster: {}", listing.cluster);
    if listing.has_free_gap {
        println!("Warning: this directory crosses free clusters, the listing may be inaccurate");
    }
    for entry in &listing.entries {
        println!("{}", format_entry(entry));
    }
}

fn format_entry(entry: &DirectoryEntry) -> String {
    let kind = if entry.is_directory() { 'd' } else { 'f' };
    let mut name = entry.name();
    if entry.is_directory() {
        name.push('/');
    }

    let modified = entry
        .modified
        .to_datetime()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| entry.modified.to_string());

    let mut line = format!("{} {} {:<30} c={}", kind, modified, name, entry.cluster);
    if !entry.is_directory() {
        line.push_str(&format!(" s={}", entry.size));
    }
    if entry.is_hidden() {
        line.push_str(" h");
    }
    if entry.is_erased() {
        line.push_str(" d");
    }
    line
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "K", "M", "G", "T"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{}B", bytes)
    } else {
        format!("{:.2}{}", value, UNITS[unit])
    }
}
