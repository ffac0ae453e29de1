//! CLI handlers for the offline pipeline stages: sanitize, parse, check,
//! fallback and similarity. None of these touch the network.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use serde_json::json;
use tabled::{Table, Tabled};
use tracing::instrument;

use crate::cli::{AppContext, CheckArgs, FallbackArgs, ParseArgs, SanitizeArgs, SimilarityArgs};
use crate::core::fallback::{self, FallbackRequest, OpeningMode};
use crate::core::model::ViolationSet;
use crate::core::parse::BeatLineParser;
use crate::core::probe::NextChapterProbe;
use crate::core::sanitize::sanitize_with;
use crate::core::similarity::bigram_similarity;
use crate::core::text::clip_chars;
use crate::core::violation::{LineSignals, assess_lines};
use crate::infra::config::{Config, expand_path};

/// Beat text shown in tables is clipped to this many chars
const TABLE_LINE_CLIP: usize = 28;

/// Read a whole file, or stdin when no path is given
pub fn read_input(path: Option<&Path>) -> Result<String>
{
    match path
    {
        Some(p) =>
        {
            let p = expand_path(p)?;
            std::fs::read_to_string(&p).with_context(|| format!("Failed to read {}", p.display()))
        }
        None =>
        {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

/// Non-empty trimmed lines
fn input_lines(raw: &str) -> Vec<String>
{
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()>
{
    println!("{}", serde_json::to_string_pretty(value).context("Failed to serialize output")?);
    Ok(())
}

pub(crate) fn warn_text(
    ctx: &AppContext,
    msg: &str,
) -> String
{
    if ctx.no_color
    {
        format!("warning: {msg}")
    }
    else
    {
        format!("{} {}", "warning:".yellow().bold(), msg.yellow())
    }
}

fn mark(
    ctx: &AppContext,
    flagged: bool,
) -> String
{
    match (flagged, ctx.no_color)
    {
        (true, true) => "LEAK".to_string(),
        (true, false) => "LEAK"
            .red()
            .bold()
            .to_string(),
        (false, true) => "ok".to_string(),
        (false, false) => "ok"
            .green()
            .to_string(),
    }
}

#[instrument(level = "debug", skip_all)]
pub fn run_sanitize(
    args: SanitizeArgs,
    ctx: &AppContext,
    cfg: &Config,
) -> Result<()>
{
    let out = sanitize_with(&args.current, &args.next, &args.names, &cfg.thresholds.sanitize);

    if args.json
    {
        return print_json(&out);
    }

    println!("{}", out.sanitized);
    if out.removed_count > 0 && !ctx.quiet
    {
        eprintln!("{}", warn_text(ctx, &format!("removed {} clause(s) overlapping the next chapter", out.removed_count)));
    }
    Ok(())
}

#[instrument(level = "debug", skip_all)]
pub fn run_parse(
    args: ParseArgs,
    ctx: &AppContext,
    cfg: &Config,
) -> Result<()>
{
    let raw = read_input(args.input.as_deref())?;
    let parser: BeatLineParser = cfg.parser;

    if args.explain
    {
        let verdicts = parser.explain(&raw);
        if args.json
        {
            return print_json(&verdicts);
        }
        for v in verdicts
        {
            match v.rejection
            {
                None => println!("{}  {}", mark(ctx, false), v.line),
                Some(r) if ctx.no_color => println!("{r:?}  {}", v.line),
                Some(r) => println!("{}  {}", format!("{r:?}").dimmed(), v.line),
            }
        }
        return Ok(());
    }

    let lines = parser.parse(&raw);
    if args.json
    {
        return print_json(&lines);
    }
    for line in &lines
    {
        println!("{line}");
    }
    if lines.is_empty() && !ctx.quiet
    {
        eprintln!("{}", warn_text(ctx, "no usable beat lines"));
    }
    Ok(())
}

#[derive(Tabled)]
struct SignalRow
{
    #[tabled(rename = "#")]
    index: usize,
    line: String,
    hits: usize,
    clause: String,
    whole: String,
    role: bool,
    action: bool,
    hard: bool,
    hook: bool,
    verdict: String,
}

#[instrument(level = "debug", skip_all)]
pub fn run_check(
    args: CheckArgs,
    ctx: &AppContext,
    cfg: &Config,
) -> Result<()>
{
    let lines = input_lines(&read_input(args.input.as_deref())?);
    let probe = NextChapterProbe::new(&args.next, &args.names);
    let signals: Vec<LineSignals> = if args
        .next
        .trim()
        .is_empty()
    {
        Vec::new()
    }
    else
    {
        assess_lines(&lines, &probe, &cfg.thresholds.detect)
    };
    let violations: ViolationSet = signals
        .iter()
        .filter(|s| s.flagged)
        .map(|s| s.index)
        .collect();

    if args.json
    {
        return print_json(&json!({ "violations": violations, "lines": signals }));
    }

    let rows: Vec<SignalRow> = signals
        .iter()
        .zip(&lines)
        .map(|(s, line)| SignalRow {
            index: s.index,
            line: clip_chars(line, TABLE_LINE_CLIP),
            hits: s.keyword_hits,
            clause: format!("{:.2}", s.clause_similarity),
            whole: format!("{:.2}", s.whole_similarity),
            role: s.role,
            action: s.action,
            hard: s.hard_execution,
            hook: s.soft_hook,
            verdict: mark(ctx, s.flagged),
        })
        .collect();

    println!("{}", Table::new(rows));
    if !ctx.quiet
    {
        if violations.is_empty()
        {
            println!("no cross-chapter leaks detected");
        }
        else
        {
            let list = violations
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            println!("{}", warn_text(ctx, &format!("lines {list} may leak next-chapter content")));
        }
    }
    Ok(())
}

#[instrument(level = "debug", skip_all)]
pub fn run_fallback(
    args: FallbackArgs,
    _ctx: &AppContext,
    cfg: &Config,
) -> Result<()>
{
    let opening = args
        .first
        .then(|| {
            args.mode
                .or(cfg.fallback.opening)
                .unwrap_or_else(|| OpeningMode::detect(&args.synopsis))
        });

    let lines = fallback::generate(&FallbackRequest {
        title: &args.title,
        synopsis: &args.synopsis,
        phase: &args.phase,
        opening,
    });

    if args.json
    {
        return print_json(&lines);
    }
    for line in &lines
    {
        println!("{line}");
    }
    Ok(())
}

pub fn run_similarity(
    args: SimilarityArgs,
    _ctx: &AppContext,
) -> Result<()>
{
    println!("{:.4}", bigram_similarity(&args.a, &args.b));
    Ok(())
}
