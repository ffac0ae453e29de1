//! Deterministic template beats for when the model yields nothing usable.
//!
//! Seeds come from the synopsis itself; templates fill the rest. The
//! output is always non-empty, so the planning pipeline always ends with
//! a usable beat set.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::core::text::{char_len, clip_chars, split_clauses};

/// Seeds taken from the synopsis
const MAX_SEEDS: usize = 4;
/// Seed clauses shorter than this are skipped
const SEED_MIN_CHARS: usize = 8;
/// Seed clip length
const SEED_CLIP: usize = 40;
/// Final per-line clip length
const LINE_CLIP: usize = 42;
/// Output cap
const MAX_LINES: usize = 5;

/// How a first chapter opens. Chosen by the caller from the synopsis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OpeningMode
{
    /// The protagonist is on stage from the first line
    ProtagonistDirect,
    /// The story enters through a side character
    SideStory,
    /// In medias res, then rewind
    ColdOpen,
    /// A decoy protagonist sets up a reversal
    Decoy,
}

impl OpeningMode
{
    /// Pick an opening mode from synopsis wording
    pub fn detect(synopsis: &str) -> Self
    {
        const COLD: &[&str] = &["倒叙", "开场即", "一开场", "冷开场", "闪回", "开篇即"];
        const DECOY: &[&str] = &["误导", "假主角", "伪装成主角", "障眼", "替身"];
        const SIDE: &[&str] = &["旁观", "配角视角", "侧面", "番外", "他人视角"];

        if COLD
            .iter()
            .any(|w| synopsis.contains(w))
        {
            OpeningMode::ColdOpen
        }
        else if DECOY
            .iter()
            .any(|w| synopsis.contains(w))
        {
            OpeningMode::Decoy
        }
        else if SIDE
            .iter()
            .any(|w| synopsis.contains(w))
        {
            OpeningMode::SideStory
        }
        else
        {
            OpeningMode::ProtagonistDirect
        }
    }

    fn templates(self) -> [&'static str; 4]
    {
        match self
        {
            OpeningMode::ProtagonistDirect => [
                "主角在日常场景中登场，展现性格与当下处境",
                "一个意外打破日常，主角被卷入事件中心",
                "主角初次试探局势，暴露出能力与短板",
                "主角做出第一个主动选择，故事正式启动",
            ],
            OpeningMode::SideStory => [
                "从旁观者视角切入，描绘故事发生的环境",
                "旁观者的经历从侧面勾勒出主角的存在",
                "两条线索在此交汇，主角正式进入视野",
                "旁观者心中留下疑问，引出主线悬念",
            ],
            OpeningMode::ColdOpen => [
                "以一个紧张的瞬间开场，直接抛出冲突",
                "时间回拨，交代冲突发生前的人物状态",
                "冲突与日常交织，人物动机逐渐清晰",
                "叙事回到开场时刻，留下强烈悬念",
            ],
            OpeningMode::Decoy => [
                "以看似主角的人物开场，建立读者预期",
                "事件急转，表象之下的真相露出破绽",
                "真正的主角从暗处走到台前",
                "读者预期被颠覆，主线方向就此确立",
            ],
        }
    }
}

const GENERIC_TEMPLATES: [&str; 4] = [
    "承接上一章的余波，交代人物当下的处境与情绪",
    "本章核心矛盾浮出水面，人物被迫做出选择",
    "冲突升级，关键人物的立场出现松动或反转",
    "局势暂时落定，埋下指向后续走向的悬念",
];

/// Inputs for [`generate`]
#[derive(Debug, Clone)]
pub struct FallbackRequest<'a>
{
    pub title: &'a str,
    pub synopsis: &'a str,
    pub phase: &'a str,
    /// `Some` for the first chapter; `None` selects the generic template
    pub opening: Option<OpeningMode>,
}

/// Template beats: synopsis seeds then templates, deduplicated, each
/// clipped to 42 chars, at most five.
pub fn generate(req: &FallbackRequest<'_>) -> Vec<String>
{
    let seeds = split_clauses(req.synopsis, usize::MAX)
        .into_iter()
        .filter(|c| char_len(c) >= SEED_MIN_CHARS)
        .take(MAX_SEEDS)
        .map(|c| clip_chars(&c, SEED_CLIP));

    let templates: Vec<String> = match req.opening
    {
        Some(mode) => mode
            .templates()
            .iter()
            .map(|t| (*t).to_string())
            .collect(),
        None => generic_templates(req.title.trim(), req.phase.trim()),
    };

    let mut merged: IndexSet<String> = IndexSet::new();
    for line in seeds.chain(templates)
    {
        merged.insert(clip_chars(&line, LINE_CLIP));
    }

    merged
        .into_iter()
        .take(MAX_LINES)
        .collect()
}

/// Generic sequence; phase and title colour the middle and closing beats
fn generic_templates(
    title: &str,
    phase: &str,
) -> Vec<String>
{
    let mut out: Vec<String> = GENERIC_TEMPLATES
        .iter()
        .map(|t| (*t).to_string())
        .collect();

    if !phase.is_empty()
    {
        out[1] = format!("{phase}阶段的核心矛盾浮出水面，人物被迫做出选择");
    }
    if !title.is_empty()
    {
        out[3] = format!("「{title}」的局势暂时落定，埋下指向后续走向的悬念");
    }

    out
}
