//! Planning session: context gathering, sanitization, generation with
//! retry and fallback, the guardrail loop, and beat persistence.
//!
//! Every collaborator failure below the chapter fetch is converted into a
//! warning on the report; only a missing chapter (or cancellation) fails
//! the run.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::collab::{AgentInvoker, AgentRoute, CancelToken, CollaboratorError, ContentStore};
use crate::core::fallback::{self, FallbackRequest, OpeningMode};
use crate::core::model::{ChapterSynopsisContext, ProjectContext, order_beats};
use crate::core::parse::BeatLineParser;
use crate::core::probe::NextChapterProbe;
use crate::core::prompt::{GenerationInput, generation_prompt};
use crate::core::rewrite::{GuardrailOracle, LoopOutcome, RewriteConfig, run_rewrite_loop};
use crate::core::sanitize::{SanitizeThresholds, SanitizedSynopsis, sanitize_with};
use crate::core::violation::DetectThresholds;

/// User-facing warning when the generation call itself fails
pub const GENERATION_FAILED: &str = "AI 生成节拍失败，请检查网络或配置";

/// Agent types used for each stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentNames
{
    pub planner: String,
    pub judge: String,
    pub rewriter: String,
}

impl Default for AgentNames
{
    fn default() -> Self
    {
        Self { planner: "outline_writer".into(), judge: "reviewer".into(), rewriter: "editor".into() }
    }
}

/// Everything tunable about one planning run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig
{
    pub agents: AgentNames,
    pub sanitize: SanitizeThresholds,
    pub detect: DetectThresholds,
    pub rewrite: RewriteConfig,
    pub parser: BeatLineParser,
    /// Generation temperature; `None` leaves it to the agent
    pub temperature: Option<f32>,
    /// Fixed first-chapter opening; detected from the synopsis when unset
    pub opening: Option<OpeningMode>,
    /// Skip the model judge
    pub local_only: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError
{
    #[error("chapter {chapter_id} could not be loaded")]
    ChapterUnavailable
    {
        chapter_id: String,
        #[source]
        source: CollaboratorError,
    },

    #[error("beats of chapter {chapter_id} could not be listed")]
    BeatsUnavailable
    {
        chapter_id: String,
        #[source]
        source: CollaboratorError,
    },

    #[error("planning cancelled")]
    Cancelled,
}

/// Where the final beat lines came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource
{
    Model,
    ModelRetry,
    Fallback,
}

/// Result of [`PlanningSession::plan`]
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport
{
    pub chapter: ChapterSynopsisContext,
    pub source: PlanSource,
    pub sanitized: SanitizedSynopsis,
    pub outcome: LoopOutcome,
    pub warnings: Vec<String>,
    pub generated_at: DateTime<Local>,
}

impl PlanReport
{
    /// Final beat lines, in writing order
    pub fn lines(&self) -> &[String]
    {
        &self.outcome.lines
    }
}

/// How new beats relate to the chapter's existing ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PersistPolicy
{
    /// Delete existing beats, then create `1..=n`
    Replace,
    /// Create after the highest existing `order_index`
    Append,
}

/// Reconciliation of a best-effort persist
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PersistSummary
{
    pub created: usize,
    pub deleted: usize,
    pub failures: Vec<String>,
    pub expected_total: usize,
    /// Beat count after re-listing; `None` when the re-list failed
    pub observed_total: Option<usize>,
}

impl PersistSummary
{
    /// True when every call succeeded and the store agrees on the count
    pub fn reconciled(&self) -> bool
    {
        self.failures
            .is_empty()
            && self.observed_total == Some(self.expected_total)
    }
}

/// One planning run for one chapter
pub struct PlanningSession<'a>
{
    cfg: PlannerConfig,
    agent: &'a dyn AgentInvoker,
    store: &'a dyn ContentStore,
    route: AgentRoute,
    chapter_id: String,
    cancel: CancelToken,
}

impl<'a> PlanningSession<'a>
{
    pub fn new(
        cfg: PlannerConfig,
        agent: &'a dyn AgentInvoker,
        store: &'a dyn ContentStore,
        project_id: &str,
        chapter_id: &str,
    ) -> Self
    {
        Self {
            cfg,
            agent,
            store,
            route: AgentRoute::new(project_id, Some(chapter_id.to_string())),
            chapter_id: chapter_id.to_string(),
            cancel: CancelToken::new(),
        }
    }

    /// Share an external cancellation token
    pub fn with_cancel(
        mut self,
        cancel: CancelToken,
    ) -> Self
    {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &PlannerConfig
    {
        &self.cfg
    }

    /// Run the pipeline up to, not including, persistence
    #[instrument(level = "info", skip(self), fields(chapter = %self.chapter_id))]
    pub fn plan(&self) -> Result<PlanReport, PlanError>
    {
        let mut warnings = Vec::new();
        let ctx = self.gather_context(&mut warnings)?;
        let Some(chapter) = ctx.chapter.as_ref()
        else
        {
            return Err(PlanError::ChapterUnavailable {
                chapter_id: self.chapter_id.clone(),
                source: CollaboratorError::NotFound(self.chapter_id.clone()),
            });
        };

        let synopsis_ctx =
            ChapterSynopsisContext::from_chapter(chapter, ctx.siblings.as_deref().unwrap_or_default());
        let names = ctx.character_names();

        let sanitized = sanitize_with(
            &synopsis_ctx.synopsis,
            &synopsis_ctx.next_chapter_synopsis,
            &names,
            &self.cfg.sanitize,
        );
        if sanitized.removed_count > 0
        {
            info!(removed = sanitized.removed_count, "synopsis sanitized");
            warnings.push(format!("已从本章梗概中移除 {} 处与下一章重叠的内容", sanitized.removed_count));
        }

        self.ensure_live()?;

        let input = GenerationInput {
            chapter: &synopsis_ctx,
            synopsis: &sanitized.sanitized,
            characters: ctx.characters.as_deref(),
            outlines: ctx.outlines.as_deref(),
            worldbuilding: ctx.worldbuilding.as_deref(),
            bible: ctx.bible.as_deref(),
        };
        let (lines, source) = self.generate(&input, &mut warnings);

        self.ensure_live()?;

        let outcome = if synopsis_ctx.has_next()
        {
            let probe = NextChapterProbe::new(&synopsis_ctx.next_chapter_synopsis, &names);
            let oracle = GuardrailOracle {
                invoker: self.agent,
                route: &self.route,
                probe: &probe,
                thresholds: self.cfg.detect,
                judge_agent: &self.cfg.agents.judge,
                rewrite_agent: &self.cfg.agents.rewriter,
                local_only: self.cfg.local_only,
            };
            let loop_cfg = RewriteConfig { line_rules: self.cfg.parser, ..self.cfg.rewrite };
            run_rewrite_loop(lines, &oracle, &loop_cfg, &self.cancel)
        }
        else
        {
            debug!("no next chapter; guardrail loop skipped");
            LoopOutcome::skipped(lines)
        };

        if !outcome.converged
        {
            let indices = outcome
                .violations
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join("、");
            warnings.push(format!("第 {indices} 条节拍可能提前写出了下一章内容，请人工检查"));
        }

        Ok(PlanReport {
            chapter: synopsis_ctx,
            source,
            sanitized,
            outcome,
            warnings,
            generated_at: Local::now(),
        })
    }

    /// Concurrent context reads; only the chapter itself is required
    #[instrument(level = "debug", skip_all)]
    fn gather_context(
        &self,
        warnings: &mut Vec<String>,
    ) -> Result<ProjectContext, PlanError>
    {
        let store = self.store;
        let pid = self
            .route
            .project_id
            .as_str();
        let cid = self
            .chapter_id
            .as_str();

        let ((chapter, siblings), ((characters, outlines), (worldbuilding, bible))) = rayon::join(
            || rayon::join(|| store.fetch_chapter(cid), || store.list_chapters(pid)),
            || {
                rayon::join(
                    || rayon::join(|| store.list_characters(pid), || store.list_outlines(pid)),
                    || rayon::join(|| store.list_worldbuilding(pid), || store.fetch_bible(pid)),
                )
            },
        );

        let chapter = chapter.map_err(|source| PlanError::ChapterUnavailable { chapter_id: cid.to_string(), source })?;

        Ok(ProjectContext {
            chapter: Some(chapter),
            siblings: optional("章节列表", siblings, warnings),
            characters: optional("人物", characters, warnings),
            outlines: optional("大纲", outlines, warnings),
            worldbuilding: optional("世界观", worldbuilding, warnings),
            bible: optional("故事圣经", bible, warnings),
        })
    }

    /// Model, strict retry, then template fallback
    #[instrument(level = "debug", skip_all)]
    fn generate(
        &self,
        input: &GenerationInput<'_>,
        warnings: &mut Vec<String>,
    ) -> (Vec<String>, PlanSource)
    {
        for (strict, source) in [(false, PlanSource::Model), (true, PlanSource::ModelRetry)]
        {
            let req = self.route.request(
                &self.cfg.agents.planner,
                generation_prompt(input, strict),
                self.cfg.temperature,
            );
            match self
                .agent
                .invoke(&req)
            {
                Ok(reply) =>
                {
                    let lines = self
                        .cfg
                        .parser
                        .parse(&reply.content);
                    if !lines.is_empty()
                    {
                        info!(?source, count = lines.len(), "beats generated");
                        return (lines, source);
                    }
                    debug!(strict, "generation produced no usable lines");
                }
                Err(e) =>
                {
                    warn!(error = %e, "generation call failed");
                    warnings.push(GENERATION_FAILED.to_string());
                    break;
                }
            }
        }

        let ch = input.chapter;
        let opening = ch
            .is_first_chapter()
            .then(|| {
                self.cfg
                    .opening
                    .unwrap_or_else(|| OpeningMode::detect(&ch.synopsis))
            });
        let lines = fallback::generate(&FallbackRequest {
            title: &ch.title,
            synopsis: input.synopsis,
            phase: &ch.phase,
            opening,
        });
        info!(count = lines.len(), ?opening, "using fallback beats");
        (lines, PlanSource::Fallback)
    }

    /// Write `lines` as the chapter's beats. Calls are independent and
    /// best-effort; the summary reconciles against a fresh listing.
    #[instrument(level = "info", skip(self, lines), fields(chapter = %self.chapter_id, count = lines.len()))]
    pub fn persist(
        &self,
        lines: &[String],
        policy: PersistPolicy,
    ) -> Result<PersistSummary, PlanError>
    {
        let cid = self
            .chapter_id
            .as_str();
        let mut existing = self
            .store
            .list_beats(cid)
            .map_err(|source| PlanError::BeatsUnavailable { chapter_id: cid.to_string(), source })?;
        order_beats(&mut existing);

        let mut summary = PersistSummary::default();

        let start = match policy
        {
            PersistPolicy::Replace =>
            {
                for beat in &existing
                {
                    match self
                        .store
                        .delete_beat(&beat.id)
                    {
                        Ok(()) => summary.deleted += 1,
                        Err(e) =>
                        {
                            warn!(beat = %beat.id, error = %e, "delete failed");
                            summary
                                .failures
                                .push(format!("delete {}: {e}", beat.id));
                        }
                    }
                }
                summary.expected_total = lines.len();
                1
            }
            PersistPolicy::Append =>
            {
                summary.expected_total = existing.len() + lines.len();
                existing
                    .iter()
                    .map(|b| b.order_index)
                    .max()
                    .map_or(1, |m| m + 1)
            }
        };

        for (offset, line) in (0i64..).zip(lines)
        {
            let order_index = start + offset;
            match self
                .store
                .create_beat(cid, order_index, line)
            {
                Ok(_) => summary.created += 1,
                Err(e) =>
                {
                    warn!(order_index, error = %e, "create failed");
                    summary
                        .failures
                        .push(format!("create #{order_index}: {e}"));
                }
            }
        }

        summary.observed_total = match self
            .store
            .list_beats(cid)
        {
            Ok(beats) => Some(beats.len()),
            Err(e) =>
            {
                warn!(error = %e, "re-list after persist failed");
                None
            }
        };

        if !summary.reconciled()
        {
            warn!(?summary, "beat set only partially written");
        }
        Ok(summary)
    }

    fn ensure_live(&self) -> Result<(), PlanError>
    {
        if self
            .cancel
            .is_cancelled()
        {
            return Err(PlanError::Cancelled);
        }
        Ok(())
    }
}

fn optional<T>(
    label: &str,
    res: Result<T, CollaboratorError>,
    warnings: &mut Vec<String>,
) -> Option<T>
{
    match res
    {
        Ok(v) => Some(v),
        Err(e) =>
        {
            warn!(what = label, error = %e, "context read failed");
            warnings.push(format!("{label}加载失败，按“无”处理"));
            None
        }
    }
}
