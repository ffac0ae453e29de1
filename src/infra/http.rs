//! Blocking HTTP implementation of the agent endpoint and content store.
//!
//! Status mapping: 404 is `NotFound`, any other non-2xx is `Http`,
//! transport failures and timeouts are `Unavailable`, and bodies that do
//! not match the record shape are `Decode`.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::core::collab::{AgentInvoker, AgentReply, AgentRequest, CollaboratorError, ContentStore};
use crate::core::model::{Beat, BeatStatus, ChapterRecord, NamedRecord, order_beats};

/// Error bodies are truncated to this many chars in error values
const ERROR_BODY_CLIP: usize = 300;

pub struct HttpBackend
{
    client: Client,
    base_url: String,
}

impl HttpBackend
{
    pub fn new(
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, CollaboratorError>
    {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollaboratorError::Unavailable(format!("http client: {e}")))?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    pub fn base_url(&self) -> &str
    {
        &self.base_url
    }

    fn url(
        &self,
        path: &str,
    ) -> String
    {
        format!("{}{}", self.base_url, path)
    }

    fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, CollaboratorError>
    {
        let req = self
            .client
            .get(self.url(path))
            .query(query);
        self.fetch(req, path)
    }

    /// Send, classify the status, decode the body as `T`
    fn fetch<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        what: &str,
    ) -> Result<T, CollaboratorError>
    {
        let body = self.send(req, what)?;
        serde_json::from_str(&body).map_err(|e| CollaboratorError::Decode(format!("{what}: {e}")))
    }

    /// Send and return the raw body of a 2xx response
    fn send(
        &self,
        req: RequestBuilder,
        what: &str,
    ) -> Result<String, CollaboratorError>
    {
        trace!(what, "http request");
        let resp = req
            .send()
            .map_err(|e| CollaboratorError::Unavailable(format!("{what}: {e}")))?;
        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| CollaboratorError::Unavailable(format!("{what}: {e}")))?;
        debug!(what, status = status.as_u16(), bytes = body.len(), "http response");
        classify(status, body, what)
    }
}

fn classify(
    status: StatusCode,
    body: String,
    what: &str,
) -> Result<String, CollaboratorError>
{
    if status.is_success()
    {
        Ok(body)
    }
    else if status == StatusCode::NOT_FOUND
    {
        Err(CollaboratorError::NotFound(what.to_string()))
    }
    else
    {
        Err(CollaboratorError::Http { status: status.as_u16(), body: body.chars().take(ERROR_BODY_CLIP).collect() })
    }
}

#[derive(Debug, Deserialize)]
struct InvokeResponse
{
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
}

/// Decode an agent-invoke body; an `agent_disabled` marker is an error
fn decode_invoke(
    body: &str,
    agent_type: &str,
) -> Result<AgentReply, CollaboratorError>
{
    let resp: InvokeResponse =
        serde_json::from_str(body).map_err(|e| CollaboratorError::Decode(format!("agent reply: {e}")))?;

    let disabled = resp
        .metadata
        .as_ref()
        .and_then(|m| m.get("error"))
        .and_then(Value::as_str)
        == Some("agent_disabled");
    if disabled
    {
        return Err(CollaboratorError::AgentDisabled(agent_type.to_string()));
    }

    Ok(AgentReply { content: resp.content.unwrap_or_default() })
}

/// Story bible text from a project row; empty when the project has none
fn bible_from_project(project: &Value) -> String
{
    project
        .get("bible")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}

impl AgentInvoker for HttpBackend
{
    fn invoke(
        &self,
        req: &AgentRequest,
    ) -> Result<AgentReply, CollaboratorError>
    {
        let builder = self
            .client
            .post(self.url("/agent/invoke"))
            .json(req);
        let body = self.send(builder, "agent invoke")?;
        decode_invoke(&body, &req.agent_type)
    }
}

impl ContentStore for HttpBackend
{
    fn fetch_chapter(
        &self,
        chapter_id: &str,
    ) -> Result<ChapterRecord, CollaboratorError>
    {
        self.get(&format!("/api/chapters/{chapter_id}"), &[])
    }

    fn list_chapters(
        &self,
        project_id: &str,
    ) -> Result<Vec<ChapterRecord>, CollaboratorError>
    {
        self.get("/api/chapters/", &[("project_id", project_id)])
    }

    fn list_characters(
        &self,
        project_id: &str,
    ) -> Result<Vec<NamedRecord>, CollaboratorError>
    {
        self.get("/api/characters/", &[("project_id", project_id)])
    }

    fn list_outlines(
        &self,
        project_id: &str,
    ) -> Result<Vec<NamedRecord>, CollaboratorError>
    {
        self.get("/api/content/outlines", &[("project_id", project_id)])
    }

    fn list_worldbuilding(
        &self,
        project_id: &str,
    ) -> Result<Vec<NamedRecord>, CollaboratorError>
    {
        self.get("/api/content/worldbuilding", &[("project_id", project_id)])
    }

    fn fetch_bible(
        &self,
        project_id: &str,
    ) -> Result<String, CollaboratorError>
    {
        let project: Value = self.get(&format!("/api/projects/{project_id}"), &[])?;
        Ok(bible_from_project(&project))
    }

    fn list_beats(
        &self,
        chapter_id: &str,
    ) -> Result<Vec<Beat>, CollaboratorError>
    {
        let mut beats: Vec<Beat> = self.get("/api/beats/", &[("chapter_id", chapter_id)])?;
        order_beats(&mut beats);
        Ok(beats)
    }

    fn create_beat(
        &self,
        chapter_id: &str,
        order_index: i64,
        content: &str,
    ) -> Result<Beat, CollaboratorError>
    {
        let req = self
            .client
            .post(self.url("/api/beats/"))
            .json(&json!({
                "chapter_id": chapter_id,
                "order_index": order_index,
                "content": content,
                "status": BeatStatus::Pending,
            }));
        self.fetch(req, "create beat")
    }

    fn delete_beat(
        &self,
        beat_id: &str,
    ) -> Result<(), CollaboratorError>
    {
        let req = self
            .client
            .delete(self.url(&format!("/api/beats/{beat_id}")));
        self.send(req, "delete beat")
            .map(|_| ())
    }

    fn update_beat_status(
        &self,
        beat_id: &str,
        status: BeatStatus,
    ) -> Result<Beat, CollaboratorError>
    {
        let req = self
            .client
            .put(self.url(&format!("/api/beats/{beat_id}")))
            .json(&json!({ "status": status }));
        self.fetch(req, "update beat")
    }
}
