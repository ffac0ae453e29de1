//! Shared test utilities for integration tests
//!
//! In-memory collaborators: a content store backed by vectors and a
//! scripted agent that answers per agent type.

#![allow(dead_code)]

use std::sync::Mutex;

use beatguard::core::collab::{
    AgentInvoker, AgentReply, AgentRequest, CollaboratorError, ContentStore,
};
use beatguard::core::model::{Beat, BeatStatus, ChapterRecord, NamedRecord};

/// Build a chapter row
pub fn chapter(id: &str, num: i64, title: &str, synopsis: &str) -> ChapterRecord {
    ChapterRecord {
        id: id.to_string(),
        project_id: Some("p1".to_string()),
        chapter_num: num,
        title: title.to_string(),
        phase: String::new(),
        synopsis: synopsis.to_string(),
        summary: String::new(),
    }
}

pub fn named(name: &str, text: &str) -> NamedRecord {
    NamedRecord { name: name.to_string(), text: text.to_string() }
}

pub fn lines(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

/// Vector-backed content store. Optional lists can be set to fail.
pub struct FakeStore {
    pub chapters: Vec<ChapterRecord>,
    pub characters: Result<Vec<NamedRecord>, CollaboratorError>,
    pub outlines: Result<Vec<NamedRecord>, CollaboratorError>,
    pub worldbuilding: Result<Vec<NamedRecord>, CollaboratorError>,
    pub bible: Result<String, CollaboratorError>,
    pub beats: Mutex<Vec<Beat>>,
    next_id: Mutex<u64>,
    /// `create_beat` fails for this order_index
    pub fail_create_at: Option<i64>,
}

impl FakeStore {
    pub fn new(chapters: Vec<ChapterRecord>) -> Self {
        Self {
            chapters,
            characters: Ok(Vec::new()),
            outlines: Ok(Vec::new()),
            worldbuilding: Ok(Vec::new()),
            bible: Ok(String::new()),
            beats: Mutex::new(Vec::new()),
            next_id: Mutex::new(100),
            fail_create_at: None,
        }
    }

    /// Seed an existing beat
    pub fn with_beat(self, chapter_id: &str, order_index: i64, content: &str) -> Self {
        let id = self.fresh_id();
        self.beats.lock().unwrap().push(Beat {
            id,
            chapter_id: chapter_id.to_string(),
            order_index,
            content: content.to_string(),
            status: BeatStatus::Pending,
        });
        self
    }

    fn fresh_id(&self) -> String {
        let mut n = self.next_id.lock().unwrap();
        *n += 1;
        format!("b{n}")
    }

    /// Beats of a chapter, in order
    pub fn beats_of(&self, chapter_id: &str) -> Vec<Beat> {
        let mut out: Vec<Beat> = self
            .beats
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.chapter_id == chapter_id)
            .cloned()
            .collect();
        out.sort_by_key(|b| b.order_index);
        out
    }
}

impl ContentStore for FakeStore {
    fn fetch_chapter(&self, chapter_id: &str) -> Result<ChapterRecord, CollaboratorError> {
        self.chapters
            .iter()
            .find(|c| c.id == chapter_id)
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound(chapter_id.to_string()))
    }

    fn list_chapters(&self, _project_id: &str) -> Result<Vec<ChapterRecord>, CollaboratorError> {
        Ok(self.chapters.clone())
    }

    fn list_characters(&self, _project_id: &str) -> Result<Vec<NamedRecord>, CollaboratorError> {
        self.characters.clone()
    }

    fn list_outlines(&self, _project_id: &str) -> Result<Vec<NamedRecord>, CollaboratorError> {
        self.outlines.clone()
    }

    fn list_worldbuilding(&self, _project_id: &str) -> Result<Vec<NamedRecord>, CollaboratorError> {
        self.worldbuilding.clone()
    }

    fn fetch_bible(&self, _project_id: &str) -> Result<String, CollaboratorError> {
        self.bible.clone()
    }

    fn list_beats(&self, chapter_id: &str) -> Result<Vec<Beat>, CollaboratorError> {
        Ok(self.beats_of(chapter_id))
    }

    fn create_beat(
        &self,
        chapter_id: &str,
        order_index: i64,
        content: &str,
    ) -> Result<Beat, CollaboratorError> {
        if self.fail_create_at == Some(order_index) {
            return Err(CollaboratorError::Http { status: 500, body: "insert failed".into() });
        }
        let beat = Beat {
            id: self.fresh_id(),
            chapter_id: chapter_id.to_string(),
            order_index,
            content: content.to_string(),
            status: BeatStatus::Pending,
        };
        self.beats.lock().unwrap().push(beat.clone());
        Ok(beat)
    }

    fn delete_beat(&self, beat_id: &str) -> Result<(), CollaboratorError> {
        self.beats.lock().unwrap().retain(|b| b.id != beat_id);
        Ok(())
    }

    fn update_beat_status(&self, beat_id: &str, status: BeatStatus) -> Result<Beat, CollaboratorError> {
        let mut beats = self.beats.lock().unwrap();
        let beat = beats
            .iter_mut()
            .find(|b| b.id == beat_id)
            .ok_or_else(|| CollaboratorError::NotFound(beat_id.to_string()))?;
        beat.status = status;
        Ok(beat.clone())
    }
}

type Handler = Box<dyn Fn(&AgentRequest) -> Result<String, CollaboratorError> + Send + Sync>;

/// Agent whose replies come from a closure; every request is recorded
pub struct ScriptedAgent {
    handler: Handler,
    pub calls: Mutex<Vec<AgentRequest>>,
}

impl ScriptedAgent {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&AgentRequest) -> Result<String, CollaboratorError> + Send + Sync + 'static,
    {
        Self { handler: Box::new(handler), calls: Mutex::new(Vec::new()) }
    }

    /// Requests made to `agent_type`, in order
    pub fn calls_to(&self, agent_type: &str) -> Vec<AgentRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.agent_type == agent_type)
            .cloned()
            .collect()
    }
}

impl AgentInvoker for ScriptedAgent {
    fn invoke(&self, req: &AgentRequest) -> Result<AgentReply, CollaboratorError> {
        self.calls.lock().unwrap().push(req.clone());
        (self.handler)(req).map(|content| AgentReply { content })
    }
}
