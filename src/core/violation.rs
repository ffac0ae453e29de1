//! Cross-chapter violation detection.
//!
//! Two independent detectors flag beat lines (1-based) that already
//! narrate next-chapter events: a local heuristic over the
//! [`NextChapterProbe`] and a model judge. The round's violation set is
//! their plain union.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::collab::{AgentInvoker, AgentRoute};
use crate::core::lexicon::{self, HARD_EXECUTION, SOFT_HOOKS};
use crate::core::model::ViolationSet;
use crate::core::probe::NextChapterProbe;
use crate::core::prompt::{judge_prompt, strip_code_fence};

static BARE_INT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("static integer pattern"));

/// Keys accepted in a judge reply, in priority order
const JUDGE_KEYS: &[&str] = &["violating_indices", "indices", "violations"];

/// Judge calls run cold
const JUDGE_TEMPERATURE: f32 = 0.1;

/// Local detector thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectThresholds
{
    /// Best next-clause similarity that flags a line
    pub clause_similarity: f64,
    /// Whole-synopsis similarity that flags a line
    pub whole_similarity: f64,
    /// Keyword hits that flag a line
    pub keyword_hits: usize,
    /// Keyword hits that flag a hard-executed tail line
    pub tail_hits: usize,
}

impl Default for DetectThresholds
{
    fn default() -> Self
    {
        Self { clause_similarity: 0.52, whole_similarity: 0.38, keyword_hits: 3, tail_hits: 2 }
    }
}

/// Per-line measurements behind a local verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSignals
{
    /// 1-based
    pub index: usize,
    pub keyword_hits: usize,
    pub clause_similarity: f64,
    pub whole_similarity: f64,
    pub role: bool,
    pub action: bool,
    pub hard_execution: bool,
    pub soft_hook: bool,
    pub flagged: bool,
}

/// Measure one line. `is_last` enables the tail-hook exemption and the
/// tail hard-execution rule.
pub fn assess_line(
    probe: &NextChapterProbe,
    index: usize,
    line: &str,
    is_last: bool,
    th: &DetectThresholds,
) -> LineSignals
{
    let keyword_hits = probe.keyword_hits(line);
    let clause_similarity = probe.clause_similarity(line);
    let whole_similarity = probe.whole_similarity(line);
    let role = probe.has_role_token(line);
    let action = probe.has_action_token(line);
    let hard_execution = lexicon::contains_any(line, HARD_EXECUTION);
    let soft_hook = lexicon::contains_any(line, SOFT_HOOKS);

    // The closing line may gesture at the next chapter, not execute it
    let tail_hook = is_last && soft_hook && !hard_execution;

    let flagged = (role && action && !tail_hook)
        || clause_similarity >= th.clause_similarity
        || whole_similarity >= th.whole_similarity
        || keyword_hits >= th.keyword_hits
        || (is_last && hard_execution && keyword_hits >= th.tail_hits);

    LineSignals {
        index,
        keyword_hits,
        clause_similarity,
        whole_similarity,
        role,
        action,
        hard_execution,
        soft_hook,
        flagged,
    }
}

/// Signals for every line, in order
pub fn assess_lines(
    lines: &[String],
    probe: &NextChapterProbe,
    th: &DetectThresholds,
) -> Vec<LineSignals>
{
    let last = lines.len();
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| assess_line(probe, i + 1, line, i + 1 == last, th))
        .collect()
}

/// Local heuristic detector
pub fn detect_local(
    lines: &[String],
    probe: &NextChapterProbe,
    th: &DetectThresholds,
) -> ViolationSet
{
    if probe
        .synopsis()
        .trim()
        .is_empty()
    {
        return ViolationSet::new();
    }

    assess_lines(lines, probe, th)
        .into_iter()
        .filter(|s| s.flagged)
        .map(|s| s.index)
        .collect()
}

/// Model-judged detector. Fails open: any collaborator error yields an
/// empty set.
#[instrument(level = "debug", skip_all, fields(lines = lines.len()))]
pub fn detect_with_model(
    invoker: &dyn AgentInvoker,
    route: &AgentRoute,
    agent_type: &str,
    lines: &[String],
    next_synopsis: &str,
) -> ViolationSet
{
    if lines.is_empty() || next_synopsis.trim().is_empty()
    {
        return ViolationSet::new();
    }

    let req = route.request(agent_type, judge_prompt(next_synopsis, lines), Some(JUDGE_TEMPERATURE));
    match invoker.invoke(&req)
    {
        Ok(reply) =>
        {
            let found = parse_judge_response(&reply.content, lines.len());
            debug!(?found, "model judge verdict");
            found
        }
        Err(e) =>
        {
            warn!(error = %e, "model judge failed; treating as no violations");
            ViolationSet::new()
        }
    }
}

/// Permissive judge-reply parsing: fenced or bare JSON with one of the
/// accepted keys (or a bare array), else every integer in the text.
/// Only indices in `1..=line_count` survive.
pub fn parse_judge_response(
    raw: &str,
    line_count: usize,
) -> ViolationSet
{
    let body = strip_code_fence(raw);

    let candidates: Vec<u64> = match serde_json::from_str::<Value>(body)
    {
        Ok(Value::Object(map)) => JUDGE_KEYS
            .iter()
            .find_map(|k| map.get(*k))
            .map(json_indices)
            .unwrap_or_default(),
        Ok(v @ Value::Array(_)) => json_indices(&v),
        _ => BARE_INT_RE
            .find_iter(body)
            .filter_map(|m| {
                m.as_str()
                    .parse()
                    .ok()
            })
            .collect(),
    };

    candidates
        .into_iter()
        .filter_map(|n| usize::try_from(n).ok())
        .filter(|n| (1..=line_count).contains(n))
        .collect()
}

fn json_indices(v: &Value) -> Vec<u64>
{
    match v
    {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item
            {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s
                    .trim()
                    .parse()
                    .ok(),
                _ => None,
            })
            .collect(),
        Value::Number(n) => n
            .as_u64()
            .into_iter()
            .collect(),
        _ => Vec::new(),
    }
}
