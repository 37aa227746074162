use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "ibread")]
#[command(about = "Offline row reader for InnoDB tablespace files")]
#[command(version)]
pub struct Cli {
    /// Control colored output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Write output to a file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<String>,

    /// Use memory-mapped I/O for file access
    #[arg(long, global = true)]
    pub mmap: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

/// Row output format for `scan`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RowOutput {
    Text,
    Json,
    Csv,
}

/// Checksum algorithm selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ChecksumArg {
    Auto,
    Crc32c,
    Innodb,
    None,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan rows from the clustered index
    Scan {
        /// Path to InnoDB data file (.ibd)
        #[arg(short, long)]
        file: String,

        /// Path to the table schema (JSON)
        #[arg(short, long)]
        schema: String,

        /// Root page of the clustered index (default: 3, or 4 for MySQL 8.0)
        #[arg(short, long)]
        root: Option<u32>,

        /// Start key, comma-separated primary key values (a prefix is allowed)
        #[arg(short, long)]
        key: Option<String>,

        /// Stop after this many rows
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Only output these columns (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        columns: Vec<String>,

        /// Output format
        #[arg(long, default_value = "text")]
        format: RowOutput,

        /// Override page size (default: auto-detect)
        #[arg(long = "page-size")]
        page_size: Option<u32>,

        /// Checksum algorithm to enforce
        #[arg(long, default_value = "auto")]
        checksum: ChecksumArg,

        /// Skip checksum verification
        #[arg(long = "no-verify")]
        no_verify: bool,

        /// Skip records whose fields cannot be decoded instead of failing
        #[arg(long = "best-effort")]
        best_effort: bool,

        /// Include delete-marked records
        #[arg(long = "include-deleted")]
        include_deleted: bool,

        /// Show record metadata (page, heap number, transaction id)
        #[arg(short, long)]
        verbose: bool,
    },

    /// List pages with their FIL header and INDEX header fields
    Pages {
        /// Path to InnoDB data file (.ibd)
        #[arg(short, long)]
        file: String,

        /// Display a specific page number
        #[arg(short, long)]
        page: Option<u32>,

        /// Filter by page type (e.g., INDEX, BLOB)
        #[arg(short = 't', long = "type")]
        filter_type: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,

        /// Override page size (default: auto-detect)
        #[arg(long = "page-size")]
        page_size: Option<u32>,
    },

    /// Verify every page checksum
    Verify {
        /// Path to InnoDB data file (.ibd)
        #[arg(short, long)]
        file: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,

        /// Override page size (default: auto-detect)
        #[arg(long = "page-size")]
        page_size: Option<u32>,

        /// Checksum algorithm to enforce
        #[arg(long, default_value = "auto")]
        checksum: ChecksumArg,

        /// List every invalid page
        #[arg(short, long)]
        verbose: bool,
    },

    /// Read an externally stored column value
    Blob {
        /// Path to InnoDB data file (.ibd)
        #[arg(short, long)]
        file: String,

        /// First overflow page of the value
        #[arg(short, long)]
        page: u32,

        /// Byte offset of the first part header on that page
        #[arg(long, default_value = "38")]
        offset: u32,

        /// Total external length in bytes
        #[arg(short, long)]
        length: u64,

        /// Space id of the reference (default: the tablespace's own)
        #[arg(long)]
        space: Option<u32>,

        /// Write raw bytes instead of a hex dump
        #[arg(long)]
        raw: bool,

        /// Override page size (default: auto-detect)
        #[arg(long = "page-size")]
        page_size: Option<u32>,
    },

    /// Print a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}
