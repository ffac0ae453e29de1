//! Records exchanged with the content store, plus the transient
//! per-planning context built from them.

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};

/// 1-based indices into a beat-line sequence judged to leak next-chapter content
pub type ViolationSet = BTreeSet<usize>;

/// Beat lifecycle during chapter drafting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BeatStatus {
    #[default]
    Pending,
    Writing,
    Done,
}

impl std::fmt::Display for BeatStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BeatStatus::Pending => write!(f, "pending"),
            BeatStatus::Writing => write!(f, "writing"),
            BeatStatus::Done => write!(f, "done"),
        }
    }
}

/// One ordered narrative unit of a chapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beat {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    #[serde(deserialize_with = "id_from_any")]
    pub chapter_id: String,
    pub order_index: i64,
    pub content: String,
    #[serde(default)]
    pub status: BeatStatus,
}

/// Canonical writing order: ascending `order_index`, ties keep insertion order
pub fn order_beats(beats: &mut [Beat]) {
    beats.sort_by_key(|b| b.order_index);
}

/// Chapter row as served by the content store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterRecord {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    #[serde(default, deserialize_with = "opt_id_from_any")]
    pub project_id: Option<String>,
    pub chapter_num: i64,
    #[serde(default, deserialize_with = "string_or_null")]
    pub title: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub phase: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub synopsis: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub summary: String,
}

impl ChapterRecord {
    /// Synopsis, or the summary when no synopsis was written
    pub fn synopsis_text(&self) -> &str {
        if self.synopsis.trim().is_empty() {
            self.summary.trim()
        } else {
            self.synopsis.trim()
        }
    }
}

/// Lightweight name/title + text record (characters, outlines, world entries).
/// Rows differ per table, so the first present key wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value")]
pub struct NamedRecord {
    pub name: String,
    pub text: String,
}

impl From<serde_json::Value> for NamedRecord {
    fn from(v: serde_json::Value) -> Self {
        let pick = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| v.get(*k).and_then(serde_json::Value::as_str))
                .map(|s| s.trim().to_string())
                .unwrap_or_default()
        };
        Self {
            name: pick(&["name", "title"]),
            text: pick(&["text", "content", "description", "profile", "personality", "synopsis"]),
        }
    }
}

/// Everything gathered from the store before prompt assembly. Optional
/// lists are `None` when their fetch failed.
#[derive(Debug, Clone, Default)]
pub struct ProjectContext {
    pub chapter: Option<ChapterRecord>,
    pub siblings: Option<Vec<ChapterRecord>>,
    pub characters: Option<Vec<NamedRecord>>,
    pub outlines: Option<Vec<NamedRecord>>,
    pub worldbuilding: Option<Vec<NamedRecord>>,
    pub bible: Option<String>,
}

impl ProjectContext {
    /// Known character names, empty when the cast failed to load
    pub fn character_names(&self) -> Vec<String> {
        self.characters
            .iter()
            .flatten()
            .map(|c| c.name.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect()
    }
}

/// Transient synopsis view of the chapter being planned and its successor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterSynopsisContext {
    pub chapter_num: i64,
    pub title: String,
    pub phase: String,
    pub synopsis: String,
    pub next_chapter_synopsis: String,
    pub next_chapter_num: Option<i64>,
}

impl ChapterSynopsisContext {
    /// Build from a chapter and its siblings. The next chapter is the
    /// sibling with the smallest `chapter_num` above the current one.
    pub fn from_chapter(chapter: &ChapterRecord, siblings: &[ChapterRecord]) -> Self {
        let next = siblings
            .iter()
            .filter(|c| c.chapter_num > chapter.chapter_num && c.id != chapter.id)
            .min_by_key(|c| c.chapter_num);

        Self {
            chapter_num: chapter.chapter_num,
            title: chapter.title.trim().to_string(),
            phase: chapter.phase.trim().to_string(),
            synopsis: chapter.synopsis_text().to_string(),
            next_chapter_synopsis: next
                .map(|c| c.synopsis_text().to_string())
                .unwrap_or_default(),
            next_chapter_num: next.map(|c| c.chapter_num),
        }
    }

    pub fn is_first_chapter(&self) -> bool {
        self.chapter_num <= 1
    }

    pub fn has_next(&self) -> bool {
        !self.next_chapter_synopsis.trim().is_empty()
    }
}

fn id_from_any<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("expected string or number id, got {other}"))),
    }
}

fn opt_id_from_any<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s)),
        serde_json::Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!("expected string or number id, got {other}"))),
    }
}

fn string_or_null<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chapter(id: &str, num: i64, synopsis: &str) -> ChapterRecord {
        ChapterRecord {
            id: id.into(),
            project_id: Some("p1".into()),
            chapter_num: num,
            title: format!("第{num}章"),
            phase: String::new(),
            synopsis: synopsis.into(),
            summary: String::new(),
        }
    }

    #[test]
    fn beat_accepts_numeric_ids_and_default_status() {
        let beat: Beat = serde_json::from_value(json!({
            "id": 7, "chapter_id": "c1", "order_index": 2, "content": "主角回到老宅"
        }))
        .unwrap();
        assert_eq!(beat.id, "7");
        assert_eq!(beat.status, BeatStatus::Pending);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let res: Result<Beat, _> = serde_json::from_value(json!({
            "id": "b", "chapter_id": "c1", "order_index": 1, "content": "x", "status": "archived"
        }));
        assert!(res.is_err());
    }

    #[test]
    fn order_is_stable_on_ties() {
        let mk = |id: &str, idx| Beat {
            id: id.into(),
            chapter_id: "c".into(),
            order_index: idx,
            content: String::new(),
            status: BeatStatus::Pending,
        };
        let mut beats = vec![mk("a", 2), mk("b", 1), mk("c", 2), mk("d", 0)];
        order_beats(&mut beats);
        let ids: Vec<_> = beats.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "b", "a", "c"]);
    }

    #[test]
    fn next_chapter_is_smallest_greater_num() {
        let cur = chapter("c3", 3, "主角发现密室");
        let siblings = vec![
            chapter("c5", 5, "尾声"),
            cur.clone(),
            chapter("c4", 4, "主角进入密室并找到钥匙"),
            chapter("c2", 2, "前情"),
        ];
        let ctx = ChapterSynopsisContext::from_chapter(&cur, &siblings);
        assert_eq!(ctx.next_chapter_num, Some(4));
        assert_eq!(ctx.next_chapter_synopsis, "主角进入密室并找到钥匙");
        assert!(!ctx.is_first_chapter());
    }

    #[test]
    fn last_chapter_has_no_next() {
        let cur = chapter("c1", 1, "开端");
        let ctx = ChapterSynopsisContext::from_chapter(&cur, std::slice::from_ref(&cur));
        assert!(!ctx.has_next());
        assert!(ctx.is_first_chapter());
    }

    #[test]
    fn summary_backs_up_missing_synopsis() {
        let rec: ChapterRecord = serde_json::from_value(json!({
            "id": 1, "chapter_num": 1, "title": "开端", "synopsis": null, "summary": "少年离家"
        }))
        .unwrap();
        assert_eq!(rec.synopsis_text(), "少年离家");
    }

    #[test]
    fn named_record_aliases() {
        let rec: NamedRecord =
            serde_json::from_value(json!({"title": "王都", "content": "北方的旧都"})).unwrap();
        assert_eq!(rec.name, "王都");
        assert_eq!(rec.text, "北方的旧都");
    }
}
