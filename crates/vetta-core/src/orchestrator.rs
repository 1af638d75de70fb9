//! Interview orchestrator: the single-entry state-transition cycle.
//!
//! One `advance` call per inbound message: load the session snapshot from
//! the checkpoint store, run interpret -> extract -> assess -> route ->
//! generate (or finalize), persist the updated snapshot atomically, and
//! return the response payload. `start` seeds a new session from the resume
//! and asks the first question.
//!
//! Both calls have streaming variants that emit intermediate events over
//! the exact same code path (see `TurnEmitter`): streaming observes the
//! computation, it never changes it. All turns for one thread id are
//! serialized behind a per-thread async mutex; different threads run fully
//! in parallel. A consumer that drops a stream mid-turn abandons the turn
//! before its checkpoint commit -- the prior snapshot stays visible.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use futures_util::Stream;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use vetta_types::assessment::EngagementAssessment;
use vetta_types::config::{InterviewConfig, LlmSettings};
use vetta_types::error::InterviewError;
use vetta_types::event::{TurnEvent, TurnOutcome, TurnStage};
use vetta_types::gap::{Gap, GapKind, PredefinedQuestion};
use vetta_types::message::{AnswerType, MessageRole, QuestionMeta, QuestionType, TurnMessage};
use vetta_types::session::{
    InterviewMode, SessionRecord, SessionState, TerminationReason,
};
use vetta_types::skill::SkillAttribute;

use crate::checkpoint::CheckpointStore;
use crate::emitter::TurnEmitter;
use crate::engagement::EngagementAssessor;
use crate::extract::SkillExtractor;
use crate::interpret::AnswerInterpreter;
use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::retry::RetryPolicy;
use crate::question::QuestionGenerator;
use crate::repository::InterviewRepository;
use crate::routing::{self, RouteOutcome};
use crate::turn::{self, TurnSignals};

/// Parameters for starting a new interview session.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub candidate_id: String,
    pub resume_text: String,
    pub mode: InterviewMode,
    /// Required in predefined mode; ignored otherwise.
    pub question_set: Option<Vec<PredefinedQuestion>>,
    pub language: Option<String>,
}

/// What kind of question the turn is asking.
enum AskKind {
    Fresh {
        first: bool,
        resolved_last_turn: usize,
    },
    FollowUp {
        clarification: bool,
        facts: Vec<String>,
    },
}

/// Wires the interview components into a single-entry transition cycle.
///
/// Generic over the checkpoint store and repository so the core never
/// depends on vetta-infra. The store and repository handles are injected at
/// construction; nothing is looked up globally.
pub struct InterviewOrchestrator<C: CheckpointStore, R: InterviewRepository> {
    provider: BoxLlmProvider,
    checkpoints: C,
    repository: R,
    config: InterviewConfig,
    settings: LlmSettings,
    retry: RetryPolicy,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl<C: CheckpointStore, R: InterviewRepository> InterviewOrchestrator<C, R> {
    pub fn new(
        provider: BoxLlmProvider,
        checkpoints: C,
        repository: R,
        config: InterviewConfig,
        settings: LlmSettings,
    ) -> Self {
        let retry = RetryPolicy::new(
            settings.max_attempts,
            Duration::from_millis(settings.backoff_ms),
        );
        Self {
            provider,
            checkpoints,
            repository,
            config,
            settings,
            retry,
            locks: DashMap::new(),
        }
    }

    /// Access the checkpoint store (for state inspection endpoints).
    pub fn checkpoints(&self) -> &C {
        &self.checkpoints
    }

    /// Access the repository (audit log reads).
    pub fn repository(&self) -> &R {
        &self.repository
    }

    // -----------------------------------------------------------------------
    // Blocking entry points
    // -----------------------------------------------------------------------

    /// Start a new interview: seed state from the resume, ask the first
    /// question, checkpoint.
    pub async fn start(&self, request: StartRequest) -> Result<TurnOutcome, InterviewError> {
        self.run_start(request, TurnEmitter::silent()).await
    }

    /// Advance an interview thread with one inbound answer.
    pub async fn advance(
        &self,
        thread_id: Uuid,
        answer: String,
    ) -> Result<TurnOutcome, InterviewError> {
        self.run_advance(thread_id, answer, TurnEmitter::silent())
            .await
    }

    /// Abandon an active interview (candidate walked away). Terminal and
    /// idempotent; no further `advance` will run the pipeline.
    pub async fn abandon(&self, thread_id: Uuid) -> Result<TurnOutcome, InterviewError> {
        let lock = self.thread_lock(thread_id);
        let _guard = lock.lock().await;

        let mut state = self
            .checkpoints
            .get(&thread_id)
            .await?
            .ok_or(InterviewError::SessionNotFound(thread_id))?;
        if state.is_active() {
            state.abandon();
            let history_mark = state.history.len();
            self.commit(&mut state, history_mark).await?;
            tracing::info!(session_id = %state.session_id, "interview abandoned");
        }
        Ok(Self::outcome(&state, None))
    }

    // -----------------------------------------------------------------------
    // Streaming entry points
    // -----------------------------------------------------------------------

    /// Streaming variant of [`start`](Self::start): yields token,
    /// node-update, and custom events, terminated by a `Complete` event
    /// carrying the same payload the blocking call returns.
    pub fn start_stream(
        &self,
        request: StartRequest,
    ) -> impl Stream<Item = TurnEvent> + Send + '_ {
        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = TurnEmitter::channel(tx);
        Self::wrap_stream(self.run_start(request, emitter), rx)
    }

    /// Streaming variant of [`advance`](Self::advance).
    pub fn advance_stream(
        &self,
        thread_id: Uuid,
        answer: String,
    ) -> impl Stream<Item = TurnEvent> + Send + '_ {
        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = TurnEmitter::channel(tx);
        Self::wrap_stream(self.run_advance(thread_id, answer, emitter), rx)
    }

    /// Interleave a running turn with its emitted events.
    ///
    /// The turn future owns the only sender, so the channel closes exactly
    /// when the turn returns; the terminal event is appended afterwards.
    fn wrap_stream(
        run: impl std::future::Future<Output = Result<TurnOutcome, InterviewError>> + Send,
        mut rx: mpsc::UnboundedReceiver<TurnEvent>,
    ) -> impl Stream<Item = TurnEvent> + Send {
        enum Step {
            Finished(Result<TurnOutcome, InterviewError>),
            Event(TurnEvent),
            Closed,
        }

        async_stream::stream! {
            tokio::pin!(run);
            let mut result = None;
            loop {
                let step = tokio::select! {
                    r = &mut run, if result.is_none() => Step::Finished(r),
                    event = rx.recv() => match event {
                        Some(event) => Step::Event(event),
                        None => Step::Closed,
                    },
                };
                match step {
                    Step::Finished(r) => result = Some(r),
                    Step::Event(event) => yield event,
                    Step::Closed => break,
                }
            }
            match result {
                Some(Ok(outcome)) => yield TurnEvent::Complete { outcome },
                Some(Err(err)) => yield TurnEvent::Error { message: err.to_string() },
                // The channel closes only after the run future returns.
                None => {}
            }
        }
    }

    // -----------------------------------------------------------------------
    // Turn pipeline
    // -----------------------------------------------------------------------

    async fn run_start(
        &self,
        request: StartRequest,
        emitter: TurnEmitter,
    ) -> Result<TurnOutcome, InterviewError> {
        let minimum = self.config.minimum_completeness(request.mode);
        let mut state = SessionState::new(
            request.candidate_id,
            request.mode,
            minimum,
            request.language,
        );
        let lock = self.thread_lock(state.thread_id);
        let _guard = lock.lock().await;

        tracing::info!(
            session_id = %state.session_id,
            thread_id = %state.thread_id,
            mode = %state.mode,
            "starting interview"
        );

        match request.mode {
            InterviewMode::DynamicGap => {
                let seed = SkillExtractor::seed_from_resume(
                    &self.provider,
                    &self.retry,
                    &self.settings,
                    &request.resume_text,
                )
                .await?;
                state.resume_summary = seed.summary;
                for skill in seed.skills {
                    let missing: BTreeSet<SkillAttribute> =
                        skill.missing_attributes().into_iter().collect();
                    let confidence = skill.confidence_score;
                    let name = skill.name.clone();
                    state.skills.seed(skill);
                    if !missing.is_empty() {
                        state.gaps.push(Gap::for_skill(
                            &name,
                            missing,
                            confidence,
                            self.config.base_max_probes,
                        ));
                    }
                }
                emitter.node(
                    TurnStage::Extract,
                    format!("{} skill(s), {} gap(s)", state.skills.len(), state.gaps.len()),
                );
            }
            InterviewMode::PredefinedQuestions => {
                let mut questions = request
                    .question_set
                    .ok_or(InterviewError::MissingQuestionSet)?;
                if questions.is_empty() {
                    return Err(InterviewError::MissingQuestionSet);
                }
                questions.sort_by_key(|q| q.order);
                for question in &questions {
                    state
                        .gaps
                        .push(Gap::from_predefined(question, self.config.base_max_probes));
                }

                let (summary, hits) = SkillExtractor::resume_coverage(
                    &self.provider,
                    &self.retry,
                    &self.settings,
                    &request.resume_text,
                    &state.gaps,
                )
                .await;
                state.resume_summary = summary;
                let mut filled = 0;
                for hit in hits {
                    if !hit.covered || hit.confidence < self.config.coverage_mark_confidence {
                        continue;
                    }
                    if let Some(gap) = state.gap_mut(hit.gap_id) {
                        if let GapKind::Predefined {
                            resume_filled,
                            resume_evidence,
                            coverage_confidence,
                            ..
                        } = &mut gap.kind
                        {
                            *resume_filled = true;
                            *resume_evidence = Some(hit.evidence);
                            *coverage_confidence = hit.confidence;
                            filled += 1;
                        }
                    }
                }
                emitter.node(
                    TurnStage::Extract,
                    format!("{} question(s), {filled} resume-filled", state.gaps.len()),
                );
            }
        }

        let score = routing::completeness(&state);
        state.raise_completeness(score);

        let question = match routing::continue_or_terminate(&state, &self.config) {
            Some(reason) => {
                self.finalize(&mut state, reason, &emitter);
                None
            }
            None => match routing::select_gap(&state, &self.config) {
                Some(gap_id) => Some(
                    self.ask(
                        &mut state,
                        gap_id,
                        AskKind::Fresh {
                            first: true,
                            resolved_last_turn: 0,
                        },
                        &emitter,
                    )
                    .await,
                ),
                None => {
                    self.finalize(&mut state, TerminationReason::NoGaps, &emitter);
                    None
                }
            },
        };

        let record = SessionRecord::from_state(&state);
        self.repository.create_session(&record).await?;
        self.commit(&mut state, 0).await?;
        Ok(Self::outcome(&state, question))
    }

    async fn run_advance(
        &self,
        thread_id: Uuid,
        answer: String,
        emitter: TurnEmitter,
    ) -> Result<TurnOutcome, InterviewError> {
        let lock = self.thread_lock(thread_id);
        let _guard = lock.lock().await;

        let mut state = self
            .checkpoints
            .get(&thread_id)
            .await?
            .ok_or(InterviewError::SessionNotFound(thread_id))?;

        if !state.is_active() {
            // Terminal sessions answer idempotently without re-running the
            // pipeline or mutating anything.
            return Ok(Self::outcome(&state, None));
        }

        let history_mark = state.history.len();
        let question_text = state
            .current_question
            .as_ref()
            .map(|q| q.question_text.clone())
            .unwrap_or_default();
        let window = state.recent_window(self.config.conversation_window).to_vec();

        // 1. Interpret.
        let interpretation = AnswerInterpreter::interpret(
            &self.provider,
            &self.retry,
            &self.settings,
            &question_text,
            &answer,
            &window,
        )
        .await;
        emitter.node(TurnStage::Interpret, interpretation.answer_type.to_string());

        // Skip detection runs before the off-topic branch: "I've never done
        // that" is a skip, not an off-topic answer.
        let mut skip_reason = None;
        if state.mode == InterviewMode::PredefinedQuestions {
            let previous: Vec<String> = state
                .history
                .iter()
                .filter(|m| m.role == MessageRole::User)
                .rev()
                .take(2)
                .map(|m| m.content.clone())
                .collect();
            let (detected, reason) = SkillExtractor::detect_skip(
                &self.provider,
                &self.retry,
                &self.settings,
                &question_text,
                &answer,
                &previous,
            )
            .await;
            if detected {
                let reason = reason.unwrap_or_else(|| "user_requested_skip".to_string());
                emitter.custom("skip_detected", serde_json::json!({ "reason": reason.as_str() }));
                skip_reason = Some(reason);
            }
        }

        // 2. Extract (skills or criteria). Off-topic answers and skips carry
        // nothing worth extracting.
        let mut observations = Vec::new();
        let mut criteria = None;
        if skip_reason.is_none() && interpretation.answer_type != AnswerType::OffTopic {
            match state.mode {
                InterviewMode::DynamicGap => {
                    let focus_skill = state
                        .current_question
                        .as_ref()
                        .and_then(|q| q.skill_name.clone());
                    let focus_attribute =
                        state.current_question.as_ref().and_then(|q| q.attribute);
                    observations = SkillExtractor::extract_from_answer(
                        &self.provider,
                        &self.retry,
                        &self.settings,
                        &question_text,
                        &answer,
                        &state.skills.names(),
                        focus_skill.as_deref(),
                        focus_attribute,
                        &interpretation.literal_facts,
                        &window,
                    )
                    .await;
                    emitter.node(
                        TurnStage::Extract,
                        format!("{} observation(s)", observations.len()),
                    );
                }
                InterviewMode::PredefinedQuestions => {
                    let (criteria_list, category) = state
                        .current_question
                        .as_ref()
                        .map(|q| {
                            (
                                q.criteria.clone(),
                                q.category.clone().unwrap_or_else(|| "General".to_string()),
                            )
                        })
                        .unwrap_or_else(|| (Vec::new(), "General".to_string()));
                    let assessed = SkillExtractor::assess_criteria(
                        &self.provider,
                        &self.retry,
                        &self.settings,
                        &question_text,
                        &answer,
                        &criteria_list,
                        &category,
                    )
                    .await;
                    emitter.node(
                        TurnStage::Extract,
                        format!("answer quality {}", assessed.answer_quality),
                    );
                    criteria = Some(assessed);
                }
            }
        } else {
            let reason = if skip_reason.is_some() { "skip" } else { "off_topic" };
            emitter.custom("extraction_skipped", serde_json::json!({ "reason": reason }));
        }

        // 3. Assess engagement. A skip is a user choice, not a signal.
        let engagement = if skip_reason.is_some() {
            EngagementAssessment::fallback(interpretation.answer_type)
        } else {
            let gap_description = state
                .current_question
                .as_ref()
                .map(|q| q.gap_description.clone())
                .unwrap_or_default();
            EngagementAssessor::assess(
                &self.provider,
                &self.retry,
                &self.settings,
                &question_text,
                &answer,
                &gap_description,
                interpretation.answer_type,
            )
            .await
        };
        emitter.node(TurnStage::Assess, engagement.engagement_level.to_string());

        // Cross-gap coverage for substantial predefined answers: a single
        // detailed answer can fill questions we have not asked yet.
        let mut coverage = Vec::new();
        if state.mode == InterviewMode::PredefinedQuestions
            && skip_reason.is_none()
            && interpretation.answer_type != AnswerType::OffTopic
            && routing::quality_signal(&engagement, criteria.as_ref())
                >= self.config.quality_threshold
        {
            let current = state.current_gap_id;
            let pending: Vec<&Gap> = state
                .gaps
                .iter()
                .filter(|g| {
                    Some(g.id) != current
                        && !g.status.is_terminal()
                        && matches!(
                            &g.kind,
                            GapKind::Predefined {
                                resume_filled: false,
                                interview_filled: false,
                                ..
                            }
                        )
                })
                .collect();
            if !pending.is_empty() {
                coverage = SkillExtractor::cross_gap_coverage(
                    &self.provider,
                    &self.retry,
                    &self.settings,
                    &answer,
                    &pending,
                )
                .await;
                emitter.custom(
                    "cross_gap_analyzed",
                    serde_json::json!({ "covered": coverage.iter().filter(|h| h.covered).count() }),
                );
            }
        }

        // 4. Fold the signals into the state (pure).
        let signals = TurnSignals {
            answer_text: answer.clone(),
            interpretation: interpretation.clone(),
            engagement,
            criteria,
            observations,
            coverage,
            skip_reason,
        };
        let report = turn::apply(&mut state, &signals, &self.config);

        // A gap that exhausted its probe budget without resolving is marked
        // skipped rather than lingering.
        if let Some(gap) = state.current_gap_id.and_then(|id| state.gap_mut(id)) {
            if !gap.status.is_terminal() && !gap.is_askable() {
                let gap_id = gap.id;
                let _ = gap.skip(Some("probe_budget_exhausted".to_string()));
                tracing::info!(gap_id = %gap_id, "gap skipped: probe budget exhausted");
            }
        }

        // 5. Route.
        let route = routing::route(
            &state,
            interpretation.answer_type,
            report.quality_signal,
            signals.skip_requested(),
            &self.config,
        );
        let route_detail = match &route {
            RouteOutcome::FollowUp { .. } => "follow_up".to_string(),
            RouteOutcome::NextGap { .. } => "next_gap".to_string(),
            RouteOutcome::Terminate { reason } => format!("terminate: {reason}"),
        };
        emitter.node(TurnStage::Route, route_detail);

        // 6. Generate the next question or finalize.
        let question = match route {
            RouteOutcome::FollowUp { gap_id } => Some(
                self.ask(
                    &mut state,
                    gap_id,
                    AskKind::FollowUp {
                        clarification: interpretation.answer_type
                            == AnswerType::ClarificationRequest,
                        facts: interpretation.literal_facts.clone(),
                    },
                    &emitter,
                )
                .await,
            ),
            RouteOutcome::NextGap { gap_id } => Some(
                self.ask(
                    &mut state,
                    gap_id,
                    AskKind::Fresh {
                        first: false,
                        resolved_last_turn: report.gaps_resolved.len(),
                    },
                    &emitter,
                )
                .await,
            ),
            RouteOutcome::Terminate { reason } => {
                self.finalize(&mut state, reason, &emitter);
                None
            }
        };

        // 7. Commit: the full snapshot, atomically, then the audit log.
        self.commit(&mut state, history_mark).await?;
        Ok(Self::outcome(&state, question))
    }

    /// Ask about a gap: bump its probe count, generate the question text,
    /// record the context the next turn will need, and append the message.
    async fn ask(
        &self,
        state: &mut SessionState,
        gap_id: Uuid,
        kind: AskKind,
        emitter: &TurnEmitter,
    ) -> String {
        if let Some(gap) = state.gap_mut(gap_id) {
            if let Err(err) = gap.begin_probe() {
                tracing::warn!(error = %err, "routing selected a terminal gap");
            }
        }
        let Some(gap) = state.gap(gap_id).cloned() else {
            tracing::warn!(gap_id = %gap_id, "routing selected an unknown gap");
            return String::new();
        };

        let first = matches!(&kind, AskKind::Fresh { first: true, .. });
        if first {
            emitter.token(format!(
                "{}\n\n",
                QuestionGenerator::greeting(state.language.as_deref())
            ));
        }

        let (text, context, question_type) = match &kind {
            AskKind::Fresh {
                resolved_last_turn, ..
            } => {
                let (text, context) = QuestionGenerator::generate(
                    &self.provider,
                    &self.settings,
                    state,
                    &gap,
                    *resolved_last_turn,
                    emitter,
                )
                .await;
                let question_type = if first {
                    QuestionType::FirstQuestion
                } else {
                    QuestionType::GapQuestion
                };
                (text, context, question_type)
            }
            AskKind::FollowUp {
                clarification,
                facts,
            } => {
                let (text, context) = QuestionGenerator::follow_up(
                    &self.provider,
                    &self.settings,
                    state,
                    &gap,
                    *clarification,
                    facts,
                    emitter,
                )
                .await;
                (text, context, QuestionType::FollowUp)
            }
        };

        let display_text = if first {
            format!(
                "{}\n\n{}",
                QuestionGenerator::greeting(state.language.as_deref()),
                text
            )
        } else {
            text.clone()
        };

        if let Some(phrase) = QuestionGenerator::transition_phrase(&text) {
            state.push_transition(phrase);
        }
        state.engagement.questions_asked += 1;
        state.current_gap_id = Some(gap_id);
        state.current_question = Some(context);
        state.push_message(TurnMessage::assistant(
            display_text.clone(),
            QuestionMeta {
                question_type,
                gap_id: Some(gap_id),
                targets_attributes: gap.targets_attributes.iter().copied().collect(),
                sequence: state.engagement.questions_asked,
            },
        ));
        emitter.node(TurnStage::Generate, format!("question {}", state.engagement.questions_asked));
        display_text
    }

    /// Terminate the session and append the completion message.
    fn finalize(
        &self,
        state: &mut SessionState,
        reason: TerminationReason,
        emitter: &TurnEmitter,
    ) {
        state.terminate(reason);
        let message = QuestionGenerator::completion_message(reason, state);
        emitter.token(&message);
        state.push_message(TurnMessage::assistant(
            message,
            QuestionMeta {
                question_type: QuestionType::Completion,
                gap_id: None,
                targets_attributes: Vec::new(),
                sequence: state.engagement.questions_asked,
            },
        ));
        emitter.node(TurnStage::Finalize, reason.to_string());
        tracing::info!(
            session_id = %state.session_id,
            reason = %reason,
            completeness = state.completeness_score,
            "interview terminated"
        );
    }

    /// Persist the turn: the checkpoint write is the commit point and its
    /// failure fails the turn with no partial state; the audit log is
    /// best-effort and never blocks the interview.
    async fn commit(
        &self,
        state: &mut SessionState,
        history_mark: usize,
    ) -> Result<(), InterviewError> {
        state.updated_at = Utc::now();
        state.revision += 1;
        self.checkpoints.put(&state.thread_id, state).await?;

        let record = SessionRecord::from_state(state);
        if let Err(err) = self.repository.update_session(&record).await {
            tracing::warn!(error = %err, "failed to update session record; continuing");
        }
        for message in &state.history[history_mark..] {
            if let Err(err) = self
                .repository
                .append_message(&state.session_id, message)
                .await
            {
                tracing::warn!(error = %err, "failed to append message to audit log; continuing");
            }
        }
        Ok(())
    }

    fn outcome(state: &SessionState, question: Option<String>) -> TurnOutcome {
        TurnOutcome {
            session_id: state.session_id,
            thread_id: state.thread_id,
            question,
            completed: !state.is_active(),
            termination_reason: state.termination_reason,
            completeness_score: state.completeness_score,
        }
    }

    fn thread_lock(&self, thread_id: Uuid) -> Arc<Mutex<()>> {
        self.locks.entry(thread_id).or_default().clone()
    }
}
