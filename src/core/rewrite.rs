//! Bounded detect → rewrite → re-detect loop.
//!
//! The loop is an explicit state machine: [`step`] advances one state and
//! [`run_rewrite_loop`] iterates it to a terminal state. Detection and
//! rewriting sit behind [`RewriteOracle`], so the machine runs against
//! fakes in tests and against the agent endpoint in production.
//!
//! A round is one rewrite attempt. After the last allowed round the lines
//! are checked once more and the loop ends `Converged` or `Unresolved`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::collab::{AgentInvoker, AgentRoute, CancelToken, CollaboratorError};
use crate::core::model::ViolationSet;
use crate::core::parse::{BeatLineParser, Rejection};
use crate::core::probe::NextChapterProbe;
use crate::core::prompt::{parse_rewrite_response, rewrite_prompt};
use crate::core::violation::{DetectThresholds, detect_local, detect_with_model};

/// Rewrites run a little warmer than judging
const REWRITE_TEMPERATURE: f32 = 0.4;

/// Detection and rewriting for one planning pass
pub trait RewriteOracle
{
    /// 1-based indices of offending lines
    fn detect(
        &self,
        lines: &[String],
    ) -> ViolationSet;

    /// Rewrite the flagged lines; any line count is accepted here and
    /// checked by the loop
    fn rewrite(
        &self,
        lines: &[String],
        violations: &ViolationSet,
    ) -> Result<Vec<String>, CollaboratorError>;
}

/// Loop settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig
{
    /// Rewrite attempts before giving up
    pub max_rounds: usize,
    /// Rules every rewritten line must pass; set from the parser config
    #[serde(skip)]
    pub line_rules: BeatLineParser,
}

impl Default for RewriteConfig
{
    fn default() -> Self
    {
        Self { max_rounds: 2, line_rules: BeatLineParser::default() }
    }
}

/// Why the loop stopped with violations left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason
{
    /// Every allowed round was spent
    BudgetExhausted,
    /// The rewrite returned identical lines, a different line count or
    /// lines that are not usable beats
    RewriteUnchanged,
    /// The rewrite call failed
    RewriteFailed,
    /// The run was cancelled between rounds
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoopState
{
    Draft
    {
        lines: Vec<String>,
    },
    Checking
    {
        lines: Vec<String>,
        rounds: usize,
    },
    Rewriting
    {
        lines: Vec<String>,
        violations: ViolationSet,
        rounds: usize,
    },
    Converged
    {
        lines: Vec<String>,
        rounds: usize,
    },
    Unresolved
    {
        lines: Vec<String>,
        violations: ViolationSet,
        rounds: usize,
        reason: UnresolvedReason,
    },
}

impl LoopState
{
    pub fn is_terminal(&self) -> bool
    {
        matches!(self, LoopState::Converged { .. } | LoopState::Unresolved { .. })
    }
}

/// Advance the machine by one state. Terminal states map to themselves.
pub fn step(
    state: LoopState,
    oracle: &dyn RewriteOracle,
    cfg: &RewriteConfig,
    cancel: &CancelToken,
) -> LoopState
{
    match state
    {
        LoopState::Draft { lines } => LoopState::Checking { lines, rounds: 0 },

        LoopState::Checking { lines, rounds } =>
        {
            let violations = oracle.detect(&lines);
            if violations.is_empty()
            {
                LoopState::Converged { lines, rounds }
            }
            else if rounds >= cfg.max_rounds
            {
                LoopState::Unresolved { lines, violations, rounds, reason: UnresolvedReason::BudgetExhausted }
            }
            else
            {
                LoopState::Rewriting { lines, violations, rounds }
            }
        }

        LoopState::Rewriting { lines, violations, rounds } =>
        {
            if cancel.is_cancelled()
            {
                return LoopState::Unresolved { lines, violations, rounds, reason: UnresolvedReason::Cancelled };
            }

            let rounds = rounds + 1;
            match oracle.rewrite(&lines, &violations)
            {
                Err(e) =>
                {
                    warn!(error = %e, round = rounds, "rewrite failed; keeping previous lines");
                    LoopState::Unresolved { lines, violations, rounds, reason: UnresolvedReason::RewriteFailed }
                }
                Ok(next) if next.len() != lines.len() =>
                {
                    debug!(expected = lines.len(), got = next.len(), "rewrite changed line count; discarded");
                    LoopState::Unresolved { lines, violations, rounds, reason: UnresolvedReason::RewriteUnchanged }
                }
                Ok(next) if next == lines => LoopState::Unresolved {
                    lines,
                    violations,
                    rounds,
                    reason: UnresolvedReason::RewriteUnchanged,
                },
                Ok(next) => match first_rejected(&next, &cfg.line_rules)
                {
                    Some((line, why)) =>
                    {
                        debug!(line = %line, reason = ?why, "rewrite produced an unusable beat; discarded");
                        LoopState::Unresolved { lines, violations, rounds, reason: UnresolvedReason::RewriteUnchanged }
                    }
                    None => LoopState::Checking { lines: next, rounds },
                },
            }
        }

        terminal => terminal,
    }
}

/// First rewritten line that fails the beat-line rules
fn first_rejected<'l>(
    lines: &'l [String],
    rules: &BeatLineParser,
) -> Option<(&'l str, Rejection)>
{
    lines
        .iter()
        .find_map(|l| rules.reject(l).map(|why| (l.as_str(), why)))
}

/// Final report of a loop run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopOutcome
{
    pub lines: Vec<String>,
    pub converged: bool,
    /// Violations left when unresolved; empty when converged
    pub violations: ViolationSet,
    pub rounds: usize,
    pub reason: Option<UnresolvedReason>,
}

impl LoopOutcome
{
    /// Outcome when no check was needed (no next chapter)
    pub fn skipped(lines: Vec<String>) -> Self
    {
        Self { lines, converged: true, violations: ViolationSet::new(), rounds: 0, reason: None }
    }
}

impl From<LoopState> for LoopOutcome
{
    /// Non-terminal states report their current lines, unconverged and
    /// without a reason
    fn from(state: LoopState) -> Self
    {
        match state
        {
            LoopState::Converged { lines, rounds } =>
            {
                Self { lines, converged: true, violations: ViolationSet::new(), rounds, reason: None }
            }
            LoopState::Unresolved { lines, violations, rounds, reason } =>
            {
                Self { lines, converged: false, violations, rounds, reason: Some(reason) }
            }
            LoopState::Rewriting { lines, violations, rounds } =>
            {
                Self { lines, converged: false, violations, rounds, reason: None }
            }
            LoopState::Checking { lines, rounds } =>
            {
                Self { lines, converged: false, violations: ViolationSet::new(), rounds, reason: None }
            }
            LoopState::Draft { lines } =>
            {
                Self { lines, converged: false, violations: ViolationSet::new(), rounds: 0, reason: None }
            }
        }
    }
}

/// Iterate [`step`] from `Draft` to a terminal state
#[instrument(level = "debug", skip_all, fields(lines = lines.len(), max_rounds = cfg.max_rounds))]
pub fn run_rewrite_loop(
    lines: Vec<String>,
    oracle: &dyn RewriteOracle,
    cfg: &RewriteConfig,
    cancel: &CancelToken,
) -> LoopOutcome
{
    let mut state = LoopState::Draft { lines };
    while !state.is_terminal()
    {
        state = step(state, oracle, cfg, cancel);
    }

    let outcome = LoopOutcome::from(state);
    info!(converged = outcome.converged, rounds = outcome.rounds, reason = ?outcome.reason, "rewrite loop finished");
    outcome
}

/// Production oracle: local ∪ model detection, agent rewrite
pub struct GuardrailOracle<'a>
{
    pub invoker: &'a dyn AgentInvoker,
    pub route: &'a AgentRoute,
    pub probe: &'a NextChapterProbe,
    pub thresholds: DetectThresholds,
    pub judge_agent: &'a str,
    pub rewrite_agent: &'a str,
    /// Skip the model judge and rely on the local detector alone
    pub local_only: bool,
}

impl RewriteOracle for GuardrailOracle<'_>
{
    fn detect(
        &self,
        lines: &[String],
    ) -> ViolationSet
    {
        let mut found = detect_local(lines, self.probe, &self.thresholds);
        if !self.local_only
        {
            found.extend(detect_with_model(
                self.invoker,
                self.route,
                self.judge_agent,
                lines,
                self.probe.synopsis(),
            ));
        }
        debug!(?found, "violations this check");
        found
    }

    fn rewrite(
        &self,
        lines: &[String],
        violations: &ViolationSet,
    ) -> Result<Vec<String>, CollaboratorError>
    {
        let message = rewrite_prompt(self.probe.synopsis(), lines, violations);
        let req = self
            .route
            .request(self.rewrite_agent, message, Some(REWRITE_TEMPERATURE));
        let reply = self
            .invoker
            .invoke(&req)?;
        Ok(parse_rewrite_response(&reply.content))
    }
}

#[cfg(test)]
mod tests
{
    use std::cell::{Cell, RefCell};

    use super::*;

    fn lines(v: &[&str]) -> Vec<String>
    {
        v.iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Flags any line containing "钥匙"; rewrites via a closure
    struct Fake<F>
    {
        rewrite: F,
        rewrites: Cell<usize>,
        checks: RefCell<Vec<ViolationSet>>,
    }

    impl<F> Fake<F>
    where
        F: Fn(&[String]) -> Result<Vec<String>, CollaboratorError>,
    {
        fn new(rewrite: F) -> Self
        {
            Self { rewrite, rewrites: Cell::new(0), checks: RefCell::new(Vec::new()) }
        }
    }

    impl<F> RewriteOracle for Fake<F>
    where
        F: Fn(&[String]) -> Result<Vec<String>, CollaboratorError>,
    {
        fn detect(
            &self,
            lines: &[String],
        ) -> ViolationSet
        {
            let found: ViolationSet = lines
                .iter()
                .enumerate()
                .filter(|(_, l)| l.contains("钥匙"))
                .map(|(i, _)| i + 1)
                .collect();
            self.checks
                .borrow_mut()
                .push(found.clone());
            found
        }

        fn rewrite(
            &self,
            lines: &[String],
            _violations: &ViolationSet,
        ) -> Result<Vec<String>, CollaboratorError>
        {
            self.rewrites
                .set(self.rewrites.get() + 1);
            (self.rewrite)(lines)
        }
    }

    fn run(oracle: &dyn RewriteOracle) -> LoopOutcome
    {
        run_rewrite_loop(
            lines(&["主角发现暗门", "主角找到钥匙"]),
            oracle,
            &RewriteConfig::default(),
            &CancelToken::new(),
        )
    }

    #[test]
    fn unchanged_rewrite_stops_after_one_round()
    {
        let oracle = Fake::new(|ls: &[String]| Ok(ls.to_vec()));
        let out = run(&oracle);
        assert!(!out.converged);
        assert_eq!(out.rounds, 1);
        assert_eq!(out.reason, Some(UnresolvedReason::RewriteUnchanged));
        assert_eq!(out.violations, ViolationSet::from([2]));
        assert_eq!(oracle.rewrites.get(), 1);
    }

    #[test]
    fn fix_all_converges_in_one_round()
    {
        let oracle = Fake::new(|ls: &[String]| {
            Ok(ls
                .iter()
                .map(|l| l.replace("找到钥匙", "决定去寻找线索"))
                .collect())
        });
        let out = run(&oracle);
        assert!(out.converged);
        assert_eq!(out.rounds, 1);
        assert_eq!(out.lines, lines(&["主角发现暗门", "主角决定去寻找线索"]));
        assert_eq!(oracle.checks.borrow().len(), 2);
    }

    #[test]
    fn clean_draft_converges_without_rewriting()
    {
        let oracle = Fake::new(|_: &[String]| Ok(Vec::new()));
        let out = run_rewrite_loop(lines(&["主角发现暗门"]), &oracle, &RewriteConfig::default(), &CancelToken::new());
        assert!(out.converged);
        assert_eq!(out.rounds, 0);
        assert_eq!(oracle.rewrites.get(), 0);
    }

    #[test]
    fn stubborn_violation_exhausts_budget_with_final_check()
    {
        let oracle = Fake::new(|ls: &[String]| {
            Ok(ls
                .iter()
                .map(|l| format!("{l}。"))
                .collect())
        });
        let out = run(&oracle);
        assert!(!out.converged);
        assert_eq!(out.rounds, 2);
        assert_eq!(out.reason, Some(UnresolvedReason::BudgetExhausted));
        // Initial check, one per round
        assert_eq!(oracle.checks.borrow().len(), 3);
        assert_eq!(out.lines[1], "主角找到钥匙。。");
    }

    #[test]
    fn wrong_line_count_is_discarded()
    {
        let oracle = Fake::new(|_: &[String]| Ok(lines(&["只剩一行"])));
        let out = run(&oracle);
        assert_eq!(out.reason, Some(UnresolvedReason::RewriteUnchanged));
        assert_eq!(out.lines, lines(&["主角发现暗门", "主角找到钥匙"]));
    }

    #[test]
    fn unusable_rewrite_is_discarded()
    {
        let oracle = Fake::new(|_: &[String]| Ok(lines(&["主角发现暗门", "主角要不要去找钥匙？"])));
        let out = run(&oracle);
        assert_eq!(out.reason, Some(UnresolvedReason::RewriteUnchanged));
        assert_eq!(out.rounds, 1);
        assert_eq!(out.lines, lines(&["主角发现暗门", "主角找到钥匙"]));
    }

    #[test]
    fn rewrite_error_keeps_last_good_lines()
    {
        let oracle = Fake::new(|_: &[String]| Err(CollaboratorError::Unavailable("down".into())));
        let out = run(&oracle);
        assert_eq!(out.reason, Some(UnresolvedReason::RewriteFailed));
        assert_eq!(out.rounds, 1);
        assert_eq!(out.lines[1], "主角找到钥匙");
    }

    #[test]
    fn cancellation_stops_before_rewriting()
    {
        let oracle = Fake::new(|ls: &[String]| Ok(ls.to_vec()));
        let cancel = CancelToken::new();
        cancel.cancel();
        let out = run_rewrite_loop(lines(&["主角找到钥匙"]), &oracle, &RewriteConfig::default(), &cancel);
        assert_eq!(out.reason, Some(UnresolvedReason::Cancelled));
        assert_eq!(oracle.rewrites.get(), 0);
    }

    #[test]
    fn step_is_identity_on_terminal_states()
    {
        let oracle = Fake::new(|ls: &[String]| Ok(ls.to_vec()));
        let done = LoopState::Converged { lines: lines(&["x"]), rounds: 1 };
        let next = step(done.clone(), &oracle, &RewriteConfig::default(), &CancelToken::new());
        assert_eq!(next, done);
        assert!(next.is_terminal());
    }
}
