use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "cartondev CLI", long_about = None)]
pub struct Cli {
    /// JSON file with archiver options and extraction limits
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an archive from files and directories
    Create {
        /// output path; the type's extension is appended when missing
        out: PathBuf,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// tar, zip, jar, cpio, ar or 7z (default: from the output name)
        #[arg(long)]
        format: Option<String>,

        /// gz, bz2, xz or zst
        #[arg(long)]
        compression: Option<String>,

        /// zero timestamps for reproducible output
        #[arg(long)]
        deterministic: bool,
    },

    /// Extract an archive into a directory
    Extract { archive: PathBuf, dest: PathBuf },

    /// List archive contents
    List {
        archive: PathBuf,

        /// show kind, mode, size and mtime
        #[arg(long)]
        long: bool,

        /// print rows as JSON
        #[arg(long, conflicts_with = "long")]
        json: bool,
    },

    /// Stream one entry's content to stdout
    Cat { archive: PathBuf, entry: String },

    /// Compress a single file
    Compress {
        source: PathBuf,
        dest: PathBuf,

        #[arg(long, short = 'c', default_value = "gz")]
        compression: String,

        #[arg(long)]
        level: Option<i32>,
    },

    /// Decompress a single file; the codec comes from its name or content
    Decompress { source: PathBuf, dest: PathBuf },

    /// Show registered codecs
    Codecs,
}
