use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::core::fallback::OpeningMode;
use crate::core::model::BeatStatus;
use crate::core::planner::PersistPolicy;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub dry_run: bool,  // global --dry-run
}

#[derive(Parser)]
#[command(name = "bgd")]
#[command(
    about = "Cross-chapter beat planning with spoiler guardrails for AI-assisted novel writing"
)]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress spinners and non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Show what would be written without writing it
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Debug-level logging on stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (defaults to ./beatguard.toml and friends)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Plan beats for a chapter against the backend, optionally persisting them
    Plan(PlanArgs),

    /// Remove next-chapter clauses from a synopsis
    Sanitize(SanitizeArgs),

    /// Extract beat lines from raw model output
    Parse(ParseArgs),

    /// Flag beat lines that leak next-chapter content (local detector)
    Check(CheckArgs),

    /// Deterministic template beats
    Fallback(FallbackArgs),

    /// Character-bigram similarity of two strings
    Similarity(SimilarityArgs),

    /// Inspect beats and move them through their status lifecycle
    Beats(BeatsArgs),

    /// Initialize a beatguard.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Parser)]
pub struct PlanArgs {
    /// Project id
    #[arg(long)]
    pub project: String,

    /// Chapter id
    #[arg(long)]
    pub chapter: String,

    /// Write the planned beats with this policy (config `persist.policy` otherwise)
    #[arg(long, value_enum)]
    pub persist: Option<PersistPolicy>,

    /// Skip the model judge; local detection only
    #[arg(long)]
    pub local_only: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct SanitizeArgs {
    /// Current chapter synopsis
    #[arg(long)]
    pub current: String,

    /// Next chapter synopsis
    #[arg(long)]
    pub next: String,

    /// Known character names (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub names: Vec<String>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct ParseArgs {
    /// File with raw model output (stdin when omitted)
    pub input: Option<PathBuf>,

    /// Show every line with its rejection reason
    #[arg(long)]
    pub explain: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct CheckArgs {
    /// File with one beat line per line (stdin when omitted)
    pub input: Option<PathBuf>,

    /// Next chapter synopsis
    #[arg(long)]
    pub next: String,

    /// Known character names (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub names: Vec<String>,

    /// Print per-line signals as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct FallbackArgs {
    /// Chapter title
    #[arg(long, default_value = "")]
    pub title: String,

    /// Chapter synopsis
    #[arg(long)]
    pub synopsis: String,

    /// Story phase
    #[arg(long, default_value = "")]
    pub phase: String,

    /// Use first-chapter opening templates
    #[arg(long)]
    pub first: bool,

    /// Opening mode for --first (detected from the synopsis when omitted)
    #[arg(long, value_enum, requires = "first")]
    pub mode: Option<OpeningMode>,

    /// Print the lines as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct SimilarityArgs {
    pub a: String,
    pub b: String,
}

#[derive(Debug, Parser)]
pub struct BeatsArgs {
    #[command(subcommand)]
    pub command: BeatsCommand,
}

#[derive(Debug, Subcommand)]
pub enum BeatsCommand {
    /// List a chapter's beats in writing order
    List {
        /// Chapter id
        #[arg(long)]
        chapter: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Set a beat's status
    Status {
        /// Beat id
        #[arg(long)]
        beat: String,

        /// New status
        #[arg(long, value_enum)]
        status: BeatStatus,
    },
}

#[derive(Args)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; if omitted and --stdout not set, prints error
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}
