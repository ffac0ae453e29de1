//! CLI handlers that talk to the backend: `plan` and `beats`.

use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use serde_json::json;
use tabled::{Table, Tabled};
use tracing::{info, instrument};

use crate::cli::{AppContext, BeatsArgs, BeatsCommand, PlanArgs};
use crate::cli_ext::offline_cmd::{print_json, warn_text};
use crate::core::collab::ContentStore;
use crate::core::planner::{PersistSummary, PlanReport, PlanSource, PlanningSession};
use crate::core::text::clip_chars;
use crate::infra::config::Config;
use crate::infra::http::HttpBackend;

const TABLE_CONTENT_CLIP: usize = 40;

fn backend(cfg: &Config) -> Result<HttpBackend>
{
    HttpBackend::new(&cfg.backend.base_url, cfg.timeout()).context("Failed to build HTTP client")
}

fn spinner(
    ctx: &AppContext,
    hidden: bool,
    msg: &'static str,
) -> ProgressBar
{
    if ctx.quiet || hidden
    {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[instrument(level = "debug", skip_all, fields(project = %args.project, chapter = %args.chapter))]
pub fn run_plan(
    args: PlanArgs,
    ctx: &AppContext,
    cfg: &Config,
) -> Result<()>
{
    let backend = backend(cfg)?;
    let mut planner = cfg.planner();
    planner.local_only |= args.local_only;

    let session = PlanningSession::new(planner, &backend, &backend, &args.project, &args.chapter);

    let pb = spinner(ctx, args.json, "planning beats");
    let report = session
        .plan()
        .with_context(|| format!("Failed to plan chapter {}", args.chapter));
    pb.finish_and_clear();
    let report = report?;

    let policy = args
        .persist
        .or(cfg.persist.policy);

    let summary = match policy
    {
        Some(policy) if ctx.dry_run =>
        {
            if !args.json && !ctx.quiet
            {
                println!(
                    "{} would persist {} beat(s) with policy {policy:?}",
                    dry_run_label(ctx),
                    report
                        .lines()
                        .len()
                );
            }
            None
        }
        Some(policy) =>
        {
            let pb = spinner(ctx, args.json, "saving beats");
            let summary = session.persist(report.lines(), policy);
            pb.finish_and_clear();
            let summary = summary.context("Failed to persist beats")?;
            info!(created = summary.created, deleted = summary.deleted, "beats persisted");
            Some(summary)
        }
        None => None,
    };

    if args.json
    {
        return print_json(&json!({ "report": report, "persist": summary }));
    }

    print_report(&report, ctx);
    if let Some(summary) = &summary
    {
        print_summary(summary, ctx);
    }
    Ok(())
}

fn print_report(
    report: &PlanReport,
    ctx: &AppContext,
)
{
    let ch = &report.chapter;
    let source = match report.source
    {
        PlanSource::Model => "model",
        PlanSource::ModelRetry => "model (retry)",
        PlanSource::Fallback => "fallback templates",
    };

    let header = format!("第{}章 {}", ch.chapter_num, ch.title);
    if ctx.no_color
    {
        println!("{header}");
    }
    else
    {
        println!("{}", header.bold());
    }
    println!("source: {source}, rounds: {}", report.outcome.rounds);

    for (i, line) in report
        .lines()
        .iter()
        .enumerate()
    {
        let flagged = report
            .outcome
            .violations
            .contains(&(i + 1));
        if flagged && !ctx.no_color
        {
            println!("{:>2}. {}", i + 1, line.yellow());
        }
        else if flagged
        {
            println!("{:>2}. {line}  [!]", i + 1);
        }
        else
        {
            println!("{:>2}. {line}", i + 1);
        }
    }

    for w in &report.warnings
    {
        eprintln!("{}", warn_text(ctx, w));
    }
}

fn print_summary(
    summary: &PersistSummary,
    ctx: &AppContext,
)
{
    let observed = summary
        .observed_total
        .map_or_else(|| "unknown".to_string(), |n| n.to_string());
    println!(
        "saved: {} created, {} deleted, {} expected, {observed} on server",
        summary.created, summary.deleted, summary.expected_total
    );
    if !summary.reconciled()
    {
        eprintln!("{}", warn_text(ctx, "beat set only partially written; re-check the chapter"));
        for f in &summary.failures
        {
            eprintln!("  {f}");
        }
    }
}

#[derive(Tabled)]
struct BeatRow
{
    order: i64,
    status: String,
    id: String,
    content: String,
}

#[instrument(level = "debug", skip_all)]
pub fn run_beats(
    args: BeatsArgs,
    ctx: &AppContext,
    cfg: &Config,
) -> Result<()>
{
    let backend = backend(cfg)?;

    match args.command
    {
        BeatsCommand::List { chapter, json } =>
        {
            let beats = backend
                .list_beats(&chapter)
                .with_context(|| format!("Failed to list beats of chapter {chapter}"))?;
            if json
            {
                return print_json(&beats);
            }
            let rows: Vec<BeatRow> = beats
                .iter()
                .map(|b| BeatRow {
                    order: b.order_index,
                    status: b
                        .status
                        .to_string(),
                    id: b
                        .id
                        .clone(),
                    content: clip_chars(&b.content, TABLE_CONTENT_CLIP),
                })
                .collect();
            println!("{}", Table::new(rows));
        }
        BeatsCommand::Status { beat, status } =>
        {
            if ctx.dry_run
            {
                println!("{} would set beat {beat} to {status}", dry_run_label(ctx));
                return Ok(());
            }
            let updated = backend
                .update_beat_status(&beat, status)
                .with_context(|| format!("Failed to update beat {beat}"))?;
            if !ctx.quiet
            {
                println!("beat {} is now {}", updated.id, updated.status);
            }
        }
    }
    Ok(())
}

fn dry_run_label(ctx: &AppContext) -> String
{
    if ctx.no_color
    {
        "DRY RUN:".to_string()
    }
    else
    {
        "DRY RUN:"
            .yellow()
            .to_string()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn dry_run_label_respects_no_color()
    {
        let plain = AppContext { quiet: false, no_color: true, dry_run: true };
        assert_eq!(dry_run_label(&plain), "DRY RUN:");

        let coloured = AppContext { no_color: false, ..plain };
        assert!(dry_run_label(&coloured).contains("\u{1b}["));
    }
}
