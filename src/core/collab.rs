//! Collaborator contracts: the agent-invoke endpoint and the content store.
//!
//! The pipeline only ever talks to these traits; `infra::http` provides
//! the network implementation and tests provide in-memory fakes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::core::model::{Beat, BeatStatus, ChapterRecord, NamedRecord};

/// Failures raised by a collaborator call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    /// Transport failure or timeout
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    /// Non-success HTTP status
    #[error("request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    /// Record does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Response body did not match the expected record shape
    #[error("malformed response: {0}")]
    Decode(String),

    /// The agent is switched off for this project
    #[error("agent disabled: {0}")]
    AgentDisabled(String),
}

/// One text-completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub agent_type: String,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Routing metadata shared by every agent call of one planning run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AgentRoute {
    pub project_id: String,
    pub chapter_id: Option<String>,
}

impl AgentRoute {
    pub fn new(project_id: impl Into<String>, chapter_id: Option<String>) -> Self {
        Self { project_id: project_id.into(), chapter_id }
    }

    /// Build a request for `agent_type` on this route
    pub fn request(&self, agent_type: &str, message: String, temperature: Option<f32>) -> AgentRequest {
        AgentRequest {
            agent_type: agent_type.to_string(),
            project_id: self.project_id.clone(),
            chapter_id: self.chapter_id.clone(),
            message,
            temperature,
        }
    }
}

/// Text returned by the agent endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReply {
    pub content: String,
}

/// Text-completion oracle. May be slow, may refuse, may return off-format
/// text; failures must come back as errors.
pub trait AgentInvoker: Sync {
    fn invoke(&self, req: &AgentRequest) -> Result<AgentReply, CollaboratorError>;
}

/// Generic record store for chapters, context lists and beats
pub trait ContentStore: Sync {
    fn fetch_chapter(&self, chapter_id: &str) -> Result<ChapterRecord, CollaboratorError>;
    fn list_chapters(&self, project_id: &str) -> Result<Vec<ChapterRecord>, CollaboratorError>;
    fn list_characters(&self, project_id: &str) -> Result<Vec<NamedRecord>, CollaboratorError>;
    fn list_outlines(&self, project_id: &str) -> Result<Vec<NamedRecord>, CollaboratorError>;
    fn list_worldbuilding(&self, project_id: &str) -> Result<Vec<NamedRecord>, CollaboratorError>;
    fn fetch_bible(&self, project_id: &str) -> Result<String, CollaboratorError>;

    fn list_beats(&self, chapter_id: &str) -> Result<Vec<Beat>, CollaboratorError>;
    fn create_beat(
        &self,
        chapter_id: &str,
        order_index: i64,
        content: &str,
    ) -> Result<Beat, CollaboratorError>;
    fn delete_beat(&self, beat_id: &str) -> Result<(), CollaboratorError>;
    fn update_beat_status(&self, beat_id: &str, status: BeatStatus) -> Result<Beat, CollaboratorError>;
}

impl<T: AgentInvoker + ?Sized> AgentInvoker for &T {
    fn invoke(&self, req: &AgentRequest) -> Result<AgentReply, CollaboratorError> {
        (**self).invoke(req)
    }
}

/// Cooperative cancellation flag, checked between pipeline rounds
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
