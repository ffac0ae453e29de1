use anyhow::Result;
use beatguard::cli::{AppContext, Cli, Commands};
use beatguard::cli_ext::{offline_cmd, plan_cmd};
use clap::Parser;

fn main() -> Result<()> {
    let cli = Cli::parse();

    beatguard::infra::logging::init(cli.verbose, cli.quiet, cli.no_color);

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
        dry_run: cli.dry_run,
    };

    // Init and completions must work without a readable config
    match cli.command {
        Commands::Init(args) => return beatguard::infra::config::init(args, &ctx),
        Commands::Completions(args) => return beatguard::completion::run(args, &ctx),
        _ => {}
    }

    let cfg = beatguard::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Plan(args) => plan_cmd::run_plan(args, &ctx, &cfg),
        Commands::Beats(args) => plan_cmd::run_beats(args, &ctx, &cfg),
        Commands::Sanitize(args) => offline_cmd::run_sanitize(args, &ctx, &cfg),
        Commands::Parse(args) => offline_cmd::run_parse(args, &ctx, &cfg),
        Commands::Check(args) => offline_cmd::run_check(args, &ctx, &cfg),
        Commands::Fallback(args) => offline_cmd::run_fallback(args, &ctx, &cfg),
        Commands::Similarity(args) => offline_cmd::run_similarity(args, &ctx),
        Commands::Init(_) | Commands::Completions(_) => Ok(()),
    }
}
