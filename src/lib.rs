//! **beatguard** - Cross-chapter beat planning with spoiler guardrails for AI-assisted novel writing
//!
//! Plans a short ordered list of beats for a chapter, then checks every beat against the next
//! chapter's synopsis (local heuristics plus a model judge) and rewrites offenders in a bounded loop.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Core pipeline - text heuristics, guardrails and planning orchestration
pub mod core {
    /// Fixed token families (stopwords, action families, hooks)
    pub mod lexicon;

    /// CJK-aware segmentation, clause splitting, keywords and name tokens
    pub mod text;

    /// Character-bigram Dice similarity
    pub mod similarity;
    pub use similarity::bigram_similarity;

    /// Tokenized view of the next chapter's synopsis
    pub mod probe;
    pub use probe::NextChapterProbe;

    /// Drop current-synopsis clauses that narrate the next chapter
    pub mod sanitize;
    pub use sanitize::{SanitizedSynopsis, sanitize};

    /// Beat-line extraction from raw model output
    pub mod parse;
    pub use parse::{BeatLineParser, parse_beat_lines};

    /// Deterministic template beats
    pub mod fallback;

    /// Local and model-judged leak detection
    pub mod violation;
    pub use violation::{detect_local, detect_with_model, parse_judge_response};

    /// Bounded detect/rewrite state machine
    pub mod rewrite;
    pub use rewrite::{LoopOutcome, LoopState, RewriteOracle, run_rewrite_loop, step};

    /// Planner, judge and rewriter prompts
    pub mod prompt;

    /// Store records and per-run context
    pub mod model;
    pub use model::{Beat, BeatStatus, ViolationSet};

    /// Collaborator traits (agent endpoint, content store)
    pub mod collab;
    pub use collab::{AgentInvoker, CollaboratorError, ContentStore};

    /// Planning session orchestration and persistence
    pub mod planner;
    pub use planner::{PlanReport, PlanningSession};
}

/// CLI command handlers
pub mod cli_ext {
    /// Offline stages: sanitize, parse, check, fallback, similarity
    pub mod offline_cmd;

    /// Backend-facing commands: plan, beats
    pub mod plan_cmd;
}

/// Infrastructure - configuration, logging and the HTTP backend
pub mod infra {
    /// Configuration management with layered files and env overrides
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Tracing subscriber setup
    pub mod logging;

    /// Blocking HTTP client for the content store and agent endpoint
    pub mod http;
    pub use http::HttpBackend;
}

// Strategic re-exports for clean CLI interface
pub use cli::{AppContext, Cli, Commands};
pub use infra::{Config, HttpBackend, load_config};
