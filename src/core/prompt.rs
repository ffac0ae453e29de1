//! Prompt assembly for the planner, judge and rewriter agents, plus the
//! small amount of response cleanup shared by their callers.
//!
//! Prompts are newline-delimited plain-text blocks. Context lists are
//! clipped so a large project cannot crowd out the instructions.

use itertools::Itertools;

use crate::core::model::{ChapterSynopsisContext, NamedRecord, ViolationSet};
use crate::core::parse::strip_markup;
use crate::core::text::clip_chars;

/// Placeholder for a context block that is empty or failed to load
pub const NONE_PLACEHOLDER: &str = "无";

pub const CHARACTER_CLIP: usize = 600;
pub const OUTLINE_CLIP: usize = 800;
pub const WORLDBUILDING_CLIP: usize = 600;
pub const BIBLE_CLIP: usize = 1200;

/// Everything the generation prompt renders
#[derive(Debug, Clone, Copy)]
pub struct GenerationInput<'a>
{
    pub chapter: &'a ChapterSynopsisContext,
    /// Current synopsis after sanitization
    pub synopsis: &'a str,
    pub characters: Option<&'a [NamedRecord]>,
    pub outlines: Option<&'a [NamedRecord]>,
    pub worldbuilding: Option<&'a [NamedRecord]>,
    pub bible: Option<&'a str>,
}

/// Beat-planning prompt. `strict` adds the retry instruction that forbids
/// questions and requests for more information.
pub fn generation_prompt(
    input: &GenerationInput<'_>,
    strict: bool,
) -> String
{
    let ch = input.chapter;
    let mut out = Vec::new();

    out.push("你是小说章节节拍策划。请为下面这一章规划 3-5 条剧情节拍。".to_string());
    out.push(String::new());

    let mut header = format!("【本章】第{}章", ch.chapter_num);
    if !ch.title.is_empty()
    {
        header.push_str(&format!(" {}", ch.title));
    }
    if !ch.phase.is_empty()
    {
        header.push_str(&format!("（阶段：{}）", ch.phase));
    }
    out.push(header);
    out.push(format!("【本章梗概】{}", or_none(input.synopsis)));

    if ch.has_next()
    {
        let num = ch
            .next_chapter_num
            .map(|n| format!("第{n}章"))
            .unwrap_or_else(|| "下一章".to_string());
        out.push(format!("【下一章梗概（禁止提前写出）】{num}：{}", ch.next_chapter_synopsis.trim()));
    }

    out.push(String::new());
    out.push(format!("【人物】\n{}", render_records(input.characters, CHARACTER_CLIP)));
    out.push(format!("【大纲】\n{}", render_records(input.outlines, OUTLINE_CLIP)));
    out.push(format!("【世界观】\n{}", render_records(input.worldbuilding, WORLDBUILDING_CLIP)));
    out.push(format!("【故事圣经】\n{}", render_text(input.bible, BIBLE_CLIP)));
    out.push(String::new());

    let mut rules = vec!["输出 3-5 行，每行一条节拍，只写节拍本身，不要编号和解释"];
    if ch.has_next()
    {
        rules.push("只写本章发生的事件，不得提前写出下一章梗概中的事件或答案");
        rules.push("最后一行只能埋下悬念或做出决定，不能让下一章的行动已经发生");
    }
    rules.push("不要提问，不要反问，不要使用问号");

    out.push("输出规则：".to_string());
    out.extend(
        rules
            .iter()
            .enumerate()
            .map(|(i, rule)| format!("{}. {rule}", i + 1)),
    );

    if strict
    {
        out.push(String::new());
        out.push(
            "注意：上一次输出无法使用。信息不足时请根据已有梗概自行合理补全，直接给出节拍，禁止向用户索取信息或确认。"
                .to_string(),
        );
    }

    out.join("\n")
}

/// Judge prompt: which numbered lines leak next-chapter content
pub fn judge_prompt(
    next_synopsis: &str,
    lines: &[String],
) -> String
{
    [
        "你是剧情审校。判断以下本章节拍中，哪些行提前写出了下一章的事件或答案。".to_string(),
        format!("【下一章梗概】{}", next_synopsis.trim()),
        "【本章节拍】".to_string(),
        numbered(lines),
        "只输出 JSON：{\"violating_indices\": [行号]}，没有越章则输出 {\"violating_indices\": []}".to_string(),
    ]
    .join("\n")
}

/// Rewrite prompt: reframe only the flagged lines, keep the count
pub fn rewrite_prompt(
    next_synopsis: &str,
    lines: &[String],
    violations: &ViolationSet,
) -> String
{
    let flagged = violations
        .iter()
        .join("、");

    [
        "你是剧情编辑。以下节拍中有行提前写出了下一章的内容，需要改写。".to_string(),
        format!("【下一章梗概】{}", next_synopsis.trim()),
        "【当前节拍】".to_string(),
        numbered(lines),
        format!("【需要改写的行号】{flagged}"),
        "要求：".to_string(),
        "1. 只改写上述行号，其余行原样保留".to_string(),
        "2. 改写为准备、决定或悬念触发，不能写成事件已经发生".to_string(),
        format!("3. 严格输出 {} 行，每行一条节拍，不要编号和解释", lines.len()),
    ]
    .join("\n")
}

/// Lines of a rewrite response, markup stripped, blanks dropped
pub fn parse_rewrite_response(raw: &str) -> Vec<String>
{
    strip_code_fence(raw)
        .lines()
        .map(strip_markup)
        .filter(|l| !l.is_empty())
        .collect()
}

/// Remove a surrounding Markdown code fence (```` ```json ```` or bare ```` ``` ````)
pub fn strip_code_fence(raw: &str) -> &str
{
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```")
    else
    {
        return trimmed;
    };

    // Drop the info string on the opening fence line
    let body = match rest.find('\n')
    {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

fn numbered(lines: &[String]) -> String
{
    lines
        .iter()
        .enumerate()
        .map(|(i, l)| format!("{}. {}", i + 1, l.trim()))
        .join("\n")
}

fn or_none(text: &str) -> &str
{
    let t = text.trim();
    if t.is_empty() { NONE_PLACEHOLDER } else { t }
}

fn render_records(
    records: Option<&[NamedRecord]>,
    clip: usize,
) -> String
{
    let body = records
        .unwrap_or_default()
        .iter()
        .filter(|r| !r.name.is_empty() || !r.text.is_empty())
        .map(|r| match (r.name.is_empty(), r.text.is_empty())
        {
            (false, false) => format!("- {}：{}", r.name, r.text),
            (false, true) => format!("- {}", r.name),
            _ => format!("- {}", r.text),
        })
        .join("\n");

    render_text(Some(&body), clip)
}

fn render_text(
    text: Option<&str>,
    clip: usize,
) -> String
{
    clip_chars(or_none(text.unwrap_or_default()), clip)
}
