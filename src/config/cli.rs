use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Path to the JSON configuration file
    #[arg(long, default_value = "courtside.json")]
    pub config_file: PathBuf,

    /// Directory for published datasets
    #[arg(long, default_value = "docs/data")]
    pub data_dir: PathBuf,

    /// Directory for caching intermediate results
    #[arg(long, default_value = "cache")]
    pub cache_dir: PathBuf,

    /// VBL API key for standings and match lists
    #[clap(long, env = "VBL_API_KEY")]
    pub vbl_api_key: Option<String>,

    /// Skip using cached data
    #[arg(long)]
    pub skip_cache: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the matchday report for the next USC home match
    Report {
        #[arg(long, value_enum, default_value = "html")]
        format: OutputFormat,
        /// Number of recent matches per team
        #[arg(long, default_value_t = 2)]
        limit: usize,
        /// File to write the rendered report to (stdout otherwise)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Build the line-up dataset from recent scoresheet PDFs
    Lineups {
        /// Number of finished matches per team to evaluate
        #[arg(long, default_value_t = 2)]
        limit: usize,
        /// Override for the schedule CSV export URL
        #[arg(long)]
        schedule_url: Option<String>,
        /// Override for the schedule page carrying the PDF links
        #[arg(long)]
        schedule_page_url: Option<String>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Build the MVP ranking dataset for USC and the next opponent
    Mvp {
        /// Players per team and indicator
        #[arg(long, default_value_t = 3)]
        limit: usize,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print standings and match lists from the VBL REST API
    Standings {
        #[arg(long, value_enum, default_value = "markdown")]
        format: OutputFormat,
        /// Maximum number of league matches to display
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Number of upcoming USC matches to display
        #[arg(long, default_value_t = 5)]
        next_games: usize,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Markdown,
    Json,
    Html,
}
