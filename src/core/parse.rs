//! Beat-line extraction from raw model output.
//!
//! Strips list markup, then rejects anything that is not a usable beat:
//! out-of-range length, questions, requests for more information,
//! refusals, meta-commentary and formatting preambles. Never fails; an
//! empty result is the caller's cue to retry or fall back.

use std::sync::LazyLock;

use indexmap::IndexSet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::core::text::char_len;

/// Leading bullets, numbering, headings and bracketed ordinals
static MARKUP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:[-*•·●○◦▪>+#]+\s*|第\s*[0-9一二三四五六七八九十]+\s*(?:[步点条个拍幕]\s*[：:、.．]?|[：:、.．])\s*|[(（\[【]?\s*[0-9一二三四五六七八九十]+\s*[)）\]】.．、:：]\s*)+",
    )
    .expect("static markup pattern")
});

/// Requests for more information
static INFO_REQUEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"请(?:提供|补充|告知|告诉|说明|确认|给出)|需要(?:更多|补充|进一步)|更多(?:的)?(?:背景|信息|细节|上下文)|缺少.{0,8}(?:信息|背景|设定)|信息不足|无法(?:判断|确定)",
    )
    .expect("static info-request pattern")
});

/// Refusals
static REFUSAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)抱歉|对不起|无法(?:完成|生成|提供|满足)|不能(?:生成|提供|完成)|作为(?:一个)?(?:ai|人工智能|语言模型)|i'?m sorry|i cannot|i can't|as an ai",
    )
    .expect("static refusal pattern")
});

/// Interrogative phrasing aimed at the user
static INTERROGATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"吗[。！!]?$|[您你](?:是否|能否|希望|想要|需要)|是否需要|能否提供|要不要我|哪一种|哪个方向",
    )
    .expect("static interrogative pattern")
});

/// First/second-person framing that signals commentary, not story
static META_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:我|你|您|咱|以下|下面|好的|当然|根据您|根据你|这里是|如下|here|sure|okay|ok[,，]|i |i'|let me)")
        .expect("static meta pattern")
});

/// Formatting preambles ("输出:", "要求：")
static PREAMBLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:输出|要求|格式|说明|注意|示例|备注|节拍|提示|回答|答案|output|format|note)\s*[:：]")
        .expect("static preamble pattern")
});

/// Why a candidate line was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection
{
    TooShort,
    TooLong,
    Question,
    InfoRequest,
    Refusal,
    Interrogative,
    MetaCommentary,
    Preamble,
    CodeFence,
    Duplicate,
}

/// Per-line verdict, for `bgd parse --explain`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineVerdict
{
    pub line: String,
    pub rejection: Option<Rejection>,
}

/// Beat-line parser with configurable bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatLineParser
{
    pub min_chars: usize,
    pub max_chars: usize,
    pub max_lines: usize,
}

impl Default for BeatLineParser
{
    fn default() -> Self
    {
        Self { min_chars: 6, max_chars: 120, max_lines: 5 }
    }
}

impl BeatLineParser
{
    /// Parse raw output into at most `max_lines` distinct beat lines
    pub fn parse(
        &self,
        raw: &str,
    ) -> Vec<String>
    {
        self.explain(raw)
            .into_iter()
            .filter(|v| v.rejection.is_none())
            .map(|v| v.line)
            .take(self.max_lines)
            .collect()
    }

    /// Verdict for every non-empty line, in input order
    pub fn explain(
        &self,
        raw: &str,
    ) -> Vec<LineVerdict>
    {
        let normalized = raw
            .replace("\r\n", "\n")
            .replace('\r', "\n");
        let mut seen = IndexSet::new();
        let mut out = Vec::new();

        for line in normalized.lines()
        {
            if line
                .trim_start()
                .starts_with("```")
            {
                out.push(LineVerdict { line: line.trim().to_string(), rejection: Some(Rejection::CodeFence) });
                continue;
            }

            let cleaned = strip_markup(line);
            if cleaned.is_empty()
            {
                continue;
            }

            let mut rejection = self.reject(&cleaned);
            if rejection.is_none() && !seen.insert(cleaned.clone())
            {
                rejection = Some(Rejection::Duplicate);
            }
            if let Some(r) = rejection
            {
                trace!(line = %cleaned, reason = ?r, "rejected beat line");
            }

            out.push(LineVerdict { line: cleaned, rejection });
        }

        out
    }

    /// Why a single cleaned line is not a usable beat, if it is not
    pub fn reject(
        &self,
        line: &str,
    ) -> Option<Rejection>
    {
        let n = char_len(line);
        if n < self.min_chars
        {
            return Some(Rejection::TooShort);
        }
        if n > self.max_chars
        {
            return Some(Rejection::TooLong);
        }
        if line.contains('?') || line.contains('？')
        {
            return Some(Rejection::Question);
        }
        if INFO_REQUEST_RE.is_match(line)
        {
            return Some(Rejection::InfoRequest);
        }
        if REFUSAL_RE.is_match(line)
        {
            return Some(Rejection::Refusal);
        }
        if INTERROGATIVE_RE.is_match(line)
        {
            return Some(Rejection::Interrogative);
        }
        if META_RE.is_match(line)
        {
            return Some(Rejection::MetaCommentary);
        }
        if PREAMBLE_RE.is_match(line)
        {
            return Some(Rejection::Preamble);
        }
        None
    }
}

/// Parse with default bounds (6–120 chars, at most 5 lines)
pub fn parse_beat_lines(raw: &str) -> Vec<String>
{
    BeatLineParser::default().parse(raw)
}

/// Remove leading list markup and surrounding emphasis/quotes
pub fn strip_markup(line: &str) -> String
{
    let stripped = MARKUP_RE.replace(line, "");
    stripped
        .trim()
        .trim_matches(|c: char| matches!(c, '*' | '"' | '“' | '”' | '「' | '」'))
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn strips_common_markup()
    {
        assert_eq!(strip_markup("1. 主角回到老宅"), "主角回到老宅");
        assert_eq!(strip_markup("  - **主角回到老宅**"), "主角回到老宅");
        assert_eq!(strip_markup("（3）主角回到老宅"), "主角回到老宅");
        assert_eq!(strip_markup("第二步：主角回到老宅"), "主角回到老宅");
        assert_eq!(strip_markup("【1】主角回到老宅"), "主角回到老宅");
        // Ordinal prose is not markup
        assert_eq!(strip_markup("第一次见到那扇门"), "第一次见到那扇门");
    }

    #[test]
    fn parses_numbered_output()
    {
        let raw = "1. 主角在雨夜回到老宅\r\n2. 他发现门锁被人撬开\n\n3. 邻居说昨晚听见争吵声";
        assert_eq!(
            parse_beat_lines(raw),
            vec!["主角在雨夜回到老宅", "他发现门锁被人撬开", "邻居说昨晚听见争吵声"]
        );
    }

    #[test]
    fn rejects_questions_requests_and_meta()
    {
        let raw = "\
请提供更多背景信息以便生成节拍
主角要去哪里？
抱歉，我无法完成这个请求
好的，以下是本章节拍
输出：五条节拍
您希望故事走向哪个方向
主角推开尘封的木门";
        assert_eq!(parse_beat_lines(raw), vec!["主角推开尘封的木门"]);
    }

    #[test]
    fn dedupes_and_caps_at_five()
    {
        let raw = (1..=8)
            .map(|i| format!("- 主角完成第{i}项准备工作"))
            .chain(std::iter::once("- 主角完成第1项准备工作".to_string()))
            .collect::<Vec<_>>()
            .join("\n");
        let lines = parse_beat_lines(&raw);
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "主角完成第1项准备工作");
    }

    #[test]
    fn explain_reports_reasons()
    {
        let verdicts = BeatLineParser::default().explain("```\n短句\n主角推开尘封的木门\n主角推开尘封的木门");
        let reasons: Vec<_> = verdicts
            .iter()
            .map(|v| v.rejection)
            .collect();
        assert_eq!(
            reasons,
            vec![Some(Rejection::CodeFence), Some(Rejection::TooShort), None, Some(Rejection::Duplicate)]
        );
    }

    #[test]
    fn length_bounds_are_inclusive()
    {
        let parser = BeatLineParser::default();
        assert_eq!(parser.parse("主角回到老宅").len(), 1); // 6 chars
        assert!(parser.parse("主角回到宅").is_empty()); // 5 chars
        let long = "长".repeat(121);
        assert!(parser.parse(&long).is_empty());
        assert_eq!(parser.parse(&"长".repeat(120)).len(), 1);
    }

    #[test]
    fn reject_checks_a_single_line()
    {
        let parser = BeatLineParser::default();
        assert_eq!(parser.reject("主角要不要进入密室呢？"), Some(Rejection::Question));
        assert_eq!(parser.reject("抱歉，我无法完成这个请求"), Some(Rejection::Refusal));
        assert_eq!(parser.reject(&"长".repeat(200)), Some(Rejection::TooLong));
        assert_eq!(parser.reject("主角推开尘封的木门"), None);
    }
}
