use clap::{Args, Parser, Subcommand, ValueEnum};
use cohida_core::common::Granularity;
use cohida_store::file::ExportFormat;
use std::path::PathBuf;

/// Coinbase historical candle retriever
#[derive(Parser, Debug)]
#[command(name = "cohida", version, about)]
pub struct Cli {
    /// Configuration file (defaults to ./cohida.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for exported files, overrides output.dir
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Retrieve candles for a date range
    Retrieve {
        /// Trading pair, e.g. BTC-USD
        symbol: String,
        /// Start date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        start: Option<String>,
        /// End date (YYYY-MM-DD or RFC 3339), defaults to now
        #[arg(long)]
        end: Option<String>,
        /// Days back from end when --start is omitted
        #[arg(long, default_value_t = 7)]
        days: u32,
        #[command(flatten)]
        granularity: GranularityArg,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Retrieve the complete available history
    RetrieveAll {
        symbol: String,
        /// Years to go back; auto-detects the earliest data when omitted
        #[arg(long)]
        max_years: Option<u32>,
        #[command(flatten)]
        granularity: GranularityArg,
        #[command(flatten)]
        output: OutputArgs,
    },

    /// Fetch candles newer than the latest stored one
    TopUp {
        symbol: String,
        /// Years to backfill when nothing is stored yet
        #[arg(long, default_value_t = 1)]
        fallback_years: u32,
        #[command(flatten)]
        granularity: GranularityArg,
    },

    /// Read stored candles
    Read {
        symbol: String,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        /// Days back from end when --start is omitted
        #[arg(long, default_value_t = 30)]
        days: u32,
        #[command(flatten)]
        granularity: GranularityArg,
        /// Export format for the rows read
        #[arg(long, value_enum, default_value_t = OutputFormat::None)]
        format: OutputFormat,
    },

    /// Count stored candles
    Count {
        symbol: String,
        #[command(flatten)]
        granularity: GranularityArg,
    },

    /// Check database and exchange connectivity
    Test,

    /// List tradeable pairs
    Symbols {
        /// Quote currency filter
        #[arg(long, default_value = "USD")]
        quote: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show pair details
    Info { symbol: String },
}

#[derive(Args, Debug, Clone, Copy)]
pub struct GranularityArg {
    /// Candle width: seconds (60, 300, 900, 3600, 21600, 86400) or 1m/5m/15m/1h/6h/1d
    #[arg(short, long, default_value = "1h")]
    pub granularity: Granularity,
}

#[derive(Args, Debug, Clone, Copy)]
pub struct OutputArgs {
    /// Export format
    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    pub format: OutputFormat,

    /// Skip writing to the database
    #[arg(long)]
    pub no_db: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
    None,
}

impl OutputFormat {
    pub fn export(self) -> Option<ExportFormat> {
        match self {
            OutputFormat::Csv => Some(ExportFormat::Csv),
            OutputFormat::Json => Some(ExportFormat::Json),
            OutputFormat::None => None,
        }
    }
}
