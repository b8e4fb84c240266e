//! The session orchestrator — public operations over a learner session.
//!
//! One submission flows: constraint pre-check → admission (cancelling any
//! in-flight prior) → prompt assembly → driven generation → tiered
//! validation → commit or fallback. All session-state mutations run under
//! the session's keyed lock, and nothing commits for a stale epoch.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coordinator::InteractionCoordinator;
use crate::generation::{GeneratedDraft, GenerationDriver};
use crate::insights;
use crate::memory_update;
use crate::session_lock::SessionLocks;

use mentora_config::AppConfig;
use mentora_constraints::{ConstraintEngine, Decision, ProposedAction};
use mentora_core::clock::{Clock, SystemClock};
use mentora_core::error::{Error, GenerationError, Result, SessionError};
use mentora_core::event::{DomainEvent, EventBus, FallbackReason, InteractionEvent};
use mentora_core::generation::GenerationPort;
use mentora_core::interaction::{Interaction, InteractionId, InteractionState};
use mentora_core::screen::{
    ConstraintKind, ConstraintViolation, ScreenId, ScreenPhase, ScreenState,
};
use mentora_core::session::{Session, SessionId};
use mentora_core::storage::StoragePort;
use mentora_core::validation::ValidationAction;
use mentora_prompt::{PromptAssembler, StructuredRequest};
use mentora_validation::{retry_ceiling, CheckContext, ResponseValidator};

/// Tunables for the orchestrator. Usually derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Deadline for each generation call
    pub generation_deadline: Duration,

    /// Transient-failure retries per generation
    pub transient_retries: u32,

    /// Base backoff between transient retries (doubles each retry)
    pub backoff_base: Duration,

    /// Per-submission event channel capacity
    pub stream_buffer: usize,

    /// Domain event bus capacity
    pub bus_capacity: usize,

    /// The canned safe response (never empty, never a raw error)
    pub fallback_text: String,

    /// Canned hints by level, served when hint generation fails
    pub hint_fallbacks: Vec<String>,

    /// Committed exchanges carried in the prompt history segment
    pub max_history: usize,
}

impl From<&AppConfig> for OrchestratorConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            generation_deadline: Duration::from_secs(config.generation.deadline_secs),
            transient_retries: config.generation.transient_retries,
            backoff_base: Duration::from_millis(config.generation.backoff_base_ms),
            stream_buffer: config.events.stream_buffer,
            bus_capacity: config.events.bus_capacity,
            fallback_text: config.fallback.safe_response.clone(),
            hint_fallbacks: config.hints.fallback_texts.clone(),
            max_history: config.validation.max_history,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        (&AppConfig::default()).into()
    }
}

/// A served hint.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Hint {
    pub level: u8,
    pub text: String,
}

/// The outcome of completing a screen.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CompletionOutcome {
    /// Whether the mastery threshold was reached
    pub mastery_achieved: bool,

    /// The first screen the completion newly unlocked, if any
    pub next_screen_id: Option<ScreenId>,
}

enum PipelineOutcome {
    Accepted {
        draft: GeneratedDraft,
        regenerations: u32,
    },
    Rejected {
        reason: FallbackReason,
        consume_attempt: bool,
    },
    Cancelled,
}

/// The root component: composes the constraint engine, coordinator,
/// assembler, validator, and ports into the public session operations.
#[derive(Clone)]
pub struct SessionOrchestrator {
    storage: Arc<dyn StoragePort>,
    generator: Arc<dyn GenerationPort>,
    assembler: PromptAssembler,
    validator: Arc<ResponseValidator>,
    constraints: ConstraintEngine,
    coordinator: Arc<InteractionCoordinator>,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    locks: SessionLocks,
    config: OrchestratorConfig,
}

impl SessionOrchestrator {
    /// Create an orchestrator with default config, validator, and clock.
    pub fn new(storage: Arc<dyn StoragePort>, generator: Arc<dyn GenerationPort>) -> Self {
        let config = OrchestratorConfig::default();
        Self {
            storage,
            generator,
            assembler: PromptAssembler::new().with_max_history(config.max_history),
            validator: Arc::new(ResponseValidator::with_default_checks()),
            constraints: ConstraintEngine::new(),
            coordinator: Arc::new(InteractionCoordinator::new()),
            clock: Arc::new(SystemClock),
            events: Arc::new(EventBus::new(config.bus_capacity)),
            locks: SessionLocks::new(),
            config,
        }
    }

    /// Apply a config, resizing the prompt history and the event bus to
    /// match. Call [`with_event_bus`](Self::with_event_bus) afterwards when
    /// sharing an externally owned bus.
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.assembler = PromptAssembler::new().with_max_history(config.max_history);
        self.events = Arc::new(EventBus::new(config.bus_capacity));
        self.config = config;
        self
    }

    pub fn with_validator(mut self, validator: ResponseValidator) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Subscribe to domain events.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // ── Public operations ───────────────────────────────────────────────

    /// Activate an unlocked screen.
    pub async fn start_screen(
        &self,
        session_id: &SessionId,
        screen_id: &ScreenId,
    ) -> Result<ScreenState> {
        let _guard = self.locks.acquire(session_id).await;
        let now = self.clock.now();

        let session = self.load_active_session(session_id).await?;
        let mut screen = self.load_owned_screen(screen_id, session_id).await?;

        match screen.phase {
            ScreenPhase::Unlocked => {}
            ScreenPhase::Active => {
                return Err(SessionError::AlreadyActive(screen_id.0.clone()).into());
            }
            ScreenPhase::Blocked => {
                // A blocked screen reports the constraint that blocked it.
                return Err(ConstraintViolation {
                    kind: ConstraintKind::MaxAttemptsReached,
                    retry_after: None,
                }
                .into());
            }
            ScreenPhase::Locked | ScreenPhase::Completed => {
                return Err(SessionError::ScreenLocked(screen_id.0.clone()).into());
            }
        }

        let siblings = self.storage.screens_for_session(session_id).await?;
        if let Some(active) = siblings.iter().find(|s| s.phase == ScreenPhase::Active) {
            return Err(SessionError::AlreadyActive(active.id.0.clone()).into());
        }
        let prereqs_met = screen.prerequisite_screen_ids.iter().all(|p| {
            siblings
                .iter()
                .find(|s| s.id == *p)
                .is_some_and(|s| s.phase == ScreenPhase::Completed)
        });
        if !prereqs_met {
            return Err(SessionError::ScreenLocked(screen_id.0.clone()).into());
        }

        screen.phase = ScreenPhase::Active;
        if screen.progress.started_at.is_none() {
            screen.progress.started_at = Some(now);
        }
        self.storage.save_screen(&screen).await?;
        info!(
            session_id = %session.id,
            screen_id = %screen.id,
            topic = %screen.topic,
            "Screen started"
        );
        Ok(screen)
    }

    /// Submit learner text; returns the submission's ordered event stream.
    ///
    /// Any in-flight prior submission for the session is superseded: its
    /// generation is cancelled cooperatively and its result is discarded.
    pub async fn submit_interaction(
        &self,
        session_id: &SessionId,
        screen_id: &ScreenId,
        interaction_id: &InteractionId,
        text: &str,
    ) -> Result<mpsc::Receiver<InteractionEvent>> {
        let _guard = self.locks.acquire(session_id).await;
        let now = self.clock.now();

        let session = self.load_active_session(session_id).await?;
        let mut screen = self.load_owned_screen(screen_id, session_id).await?;

        match self.constraints.evaluate(&screen, ProposedAction::Submit, now) {
            Decision::Allowed => {}
            Decision::Denied(violation) if violation.kind == ConstraintKind::PhaseGate => {
                return Err(SessionError::ScreenNotActive(screen_id.0.clone()).into());
            }
            Decision::Denied(violation) => return Err(violation.into()),
        }

        let admission = self.coordinator.admit(session_id, interaction_id).await;
        if let Some(superseded) = &admission.superseded {
            self.mark_cancelled(superseded, Some(interaction_id.0.clone()))
                .await;
        }

        let interaction = Interaction::new(
            interaction_id.clone(),
            session_id.clone(),
            screen_id.clone(),
            admission.epoch,
            text,
            now,
        );
        self.storage.append_interaction(&interaction).await?;

        screen.progress.note_submission(now);
        self.storage.save_screen(&screen).await?;

        debug!(
            session_id = %session_id,
            interaction_id = %interaction_id,
            epoch = admission.epoch,
            "Interaction admitted"
        );

        let (tx, rx) = mpsc::channel(self.config.stream_buffer);
        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator
                .run_pipeline(session, screen, interaction, admission.epoch, admission.cancel, tx)
                .await;
        });
        Ok(rx)
    }

    /// Serve a hint at the given escalation level (1..=3).
    pub async fn request_hint(
        &self,
        session_id: &SessionId,
        screen_id: &ScreenId,
        level: u8,
    ) -> Result<Hint> {
        let _guard = self.locks.acquire(session_id).await;
        let now = self.clock.now();

        let session = self.load_active_session(session_id).await?;
        let mut screen = self.load_owned_screen(screen_id, session_id).await?;

        match self.constraints.evaluate(&screen, ProposedAction::Hint, now) {
            Decision::Allowed => {}
            Decision::Denied(violation) if violation.kind == ConstraintKind::PhaseGate => {
                return Err(SessionError::ScreenNotActive(screen_id.0.clone()).into());
            }
            Decision::Denied(violation) => return Err(violation.into()),
        }
        if screen.progress.hints_used >= screen.constraints.max_hints {
            return Err(SessionError::NoHintsRemaining(screen_id.0.clone()).into());
        }

        let level = level.clamp(1, 3);
        let memory = self.storage.load_memory(&session.learner_id).await?;
        let request = self
            .assembler
            .assemble_hint(&session.profile, &memory, &screen, level);

        let text = match self
            .driver()
            .run(request.to_generation_request(), &CancellationToken::new())
            .await
        {
            Ok(draft) if !draft.text.trim().is_empty() => draft.text,
            Ok(_) | Err(_) => self.canned_hint(level),
        };

        screen.progress.hints_used += 1;
        screen.progress.note_submission(now);
        self.storage.save_screen(&screen).await?;

        self.events.publish(DomainEvent::HintServed {
            session_id: session_id.0.clone(),
            screen_id: screen_id.0.clone(),
            level,
            timestamp: now,
        });
        Ok(Hint { level, text })
    }

    /// Complete an active screen, unlocking successors.
    pub async fn complete_screen(
        &self,
        session_id: &SessionId,
        screen_id: &ScreenId,
    ) -> Result<CompletionOutcome> {
        let _guard = self.locks.acquire(session_id).await;
        let now = self.clock.now();

        let mut session = self.load_active_session(session_id).await?;
        let mut screen = self.load_owned_screen(screen_id, session_id).await?;

        match self
            .constraints
            .evaluate(&screen, ProposedAction::Complete, now)
        {
            Decision::Allowed => {}
            Decision::Denied(violation) if violation.kind == ConstraintKind::PhaseGate => {
                return Err(SessionError::ScreenNotActive(screen_id.0.clone()).into());
            }
            Decision::Denied(violation)
                if violation.kind == ConstraintKind::MinTimeNotElapsed =>
            {
                let wait = violation
                    .retry_after
                    .map(|d| format!(" ({}s remaining)", d.as_secs()))
                    .unwrap_or_default();
                return Err(SessionError::RequirementsNotMet(format!(
                    "minimum time on screen not reached{wait}"
                ))
                .into());
            }
            Decision::Denied(violation) => return Err(violation.into()),
        }

        if screen.progress.attempts < screen.constraints.required_attempts {
            return Err(SessionError::RequirementsNotMet(format!(
                "{} of {} required attempts",
                screen.progress.attempts, screen.constraints.required_attempts
            ))
            .into());
        }
        let mastery_achieved = screen.mastery_reached();
        if !mastery_achieved {
            if screen.attempts_exhausted() {
                screen.phase = ScreenPhase::Blocked;
                self.storage.save_screen(&screen).await?;
            }
            return Err(SessionError::RequirementsNotMet(format!(
                "best score {:.2} below mastery threshold {:.2}",
                screen.progress.best_score, screen.constraints.mastery_threshold
            ))
            .into());
        }

        screen.progress.time_spent_seconds += screen.elapsed_seconds(now);
        screen.phase = ScreenPhase::Completed;
        self.storage.save_screen(&screen).await?;

        // Unlock cascade: siblings whose prerequisites just became satisfied.
        let siblings = self.storage.screens_for_session(session_id).await?;
        let completed: Vec<&ScreenId> = siblings
            .iter()
            .filter(|s| s.phase == ScreenPhase::Completed)
            .map(|s| &s.id)
            .collect();
        let mut next_screen_id = None;
        let mut all_completed = true;
        for sibling in &siblings {
            let mut sibling = sibling.clone();
            if sibling.phase == ScreenPhase::Locked
                && sibling
                    .prerequisite_screen_ids
                    .iter()
                    .all(|p| completed.contains(&p))
            {
                sibling.phase = ScreenPhase::Unlocked;
                self.storage.save_screen(&sibling).await?;
                if next_screen_id.is_none() {
                    next_screen_id = Some(sibling.id.clone());
                }
            }
            if sibling.phase != ScreenPhase::Completed {
                all_completed = false;
            }
        }

        if all_completed {
            session.state = mentora_core::session::SessionState::Completed;
            session.updated_at = now;
            self.storage.save_session(&session).await?;
        }

        self.events.publish(DomainEvent::ScreenCompleted {
            session_id: session_id.0.clone(),
            screen_id: screen_id.0.clone(),
            mastery_achieved,
            timestamp: now,
        });
        info!(
            session_id = %session_id,
            screen_id = %screen_id,
            mastery_achieved,
            next = ?next_screen_id,
            "Screen completed"
        );
        Ok(CompletionOutcome {
            mastery_achieved,
            next_screen_id,
        })
    }

    // ── Pipeline ────────────────────────────────────────────────────────

    async fn run_pipeline(
        self,
        session: Session,
        screen: ScreenState,
        interaction: Interaction,
        epoch: u64,
        cancel: CancellationToken,
        tx: mpsc::Sender<InteractionEvent>,
    ) {
        let interaction_id = interaction.id.clone();
        if let Err(e) = self
            .pipeline_inner(session, screen, interaction, epoch, &cancel, &tx)
            .await
        {
            // Storage failures mid-pipeline close the stream without a
            // terminal event; the caller retries the submission.
            warn!(
                interaction_id = %interaction_id,
                error = %e,
                "Pipeline aborted"
            );
        }
    }

    async fn pipeline_inner(
        &self,
        session: Session,
        screen: ScreenState,
        mut interaction: Interaction,
        epoch: u64,
        cancel: &CancellationToken,
        tx: &mpsc::Sender<InteractionEvent>,
    ) -> Result<()> {
        self.send(
            tx,
            cancel,
            InteractionEvent::Started {
                interaction_id: interaction.id.0.clone(),
                epoch,
            },
        )
        .await;

        self.transition_tracked(&mut interaction, InteractionState::Generating, cancel)
            .await?;

        let memory = self.storage.load_memory(&session.learner_id).await?;
        let history = self
            .storage
            .history(&screen.id, self.config.max_history)
            .await?;
        let mut request: StructuredRequest =
            self.assembler
                .assemble(&session.profile, &memory, &screen, &history, &interaction.input);

        let driver = self.driver();
        let mut regenerations: u32 = 0;

        let outcome = loop {
            let draft = match driver.run(request.to_generation_request(), cancel).await {
                Ok(draft) => draft,
                Err(GenerationError::Cancelled) => break PipelineOutcome::Cancelled,
                Err(e) => {
                    warn!(
                        interaction_id = %interaction.id,
                        error = %e,
                        "Generation failed; serving fallback"
                    );
                    break PipelineOutcome::Rejected {
                        reason: FallbackReason::GenerationFailed,
                        consume_attempt: false,
                    };
                }
            };
            if cancel.is_cancelled() {
                break PipelineOutcome::Cancelled;
            }

            self.transition_tracked(&mut interaction, InteractionState::Validating, cancel)
                .await?;
            let ctx = CheckContext {
                profile: &session.profile,
                screen: &screen,
                input: &interaction.input,
            };
            let result = self.validator.validate(&draft.text, &ctx);
            interaction.violations.extend(result.violations.clone());

            match result.action {
                ValidationAction::Accept => {
                    break PipelineOutcome::Accepted {
                        draft,
                        regenerations,
                    };
                }
                ValidationAction::Reject => {
                    break PipelineOutcome::Rejected {
                        reason: FallbackReason::ValidationRejected,
                        consume_attempt: true,
                    };
                }
                ValidationAction::Regenerate => {
                    let ceiling = retry_ceiling(&result);
                    if regenerations >= ceiling {
                        debug!(
                            interaction_id = %interaction.id,
                            regenerations,
                            "Regeneration ceiling exhausted"
                        );
                        break PipelineOutcome::Rejected {
                            reason: FallbackReason::ValidationRejected,
                            consume_attempt: true,
                        };
                    }
                    regenerations += 1;
                    self.transition_tracked(
                        &mut interaction,
                        InteractionState::Regenerating,
                        cancel,
                    )
                    .await?;
                    request = self.assembler.assemble_fallback(&request, &result.violations);
                }
            }
        };

        match outcome {
            PipelineOutcome::Cancelled => {
                self.mark_cancelled(&interaction.id, None).await;
                Ok(())
            }
            PipelineOutcome::Accepted {
                draft,
                regenerations,
            } => {
                self.finalize_accepted(&session, &screen.id, interaction, draft, regenerations, epoch, cancel, tx)
                    .await
            }
            PipelineOutcome::Rejected {
                reason,
                consume_attempt,
            } => {
                self.finalize_rejected(&session, &screen.id, interaction, reason, consume_attempt, epoch, cancel, tx)
                    .await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn finalize_accepted(
        &self,
        session: &Session,
        screen_id: &ScreenId,
        mut interaction: Interaction,
        draft: GeneratedDraft,
        regenerations: u32,
        epoch: u64,
        cancel: &CancellationToken,
        tx: &mpsc::Sender<InteractionEvent>,
    ) -> Result<()> {
        let guard = self.locks.acquire(&session.id).await;
        if !self.coordinator.is_current(&session.id, epoch).await {
            drop(guard);
            self.mark_cancelled(&interaction.id, None).await;
            return Ok(());
        }
        let now = self.clock.now();
        let GeneratedDraft { text, chunks } = draft;

        let mut screen = self.storage.load_screen(screen_id).await?;
        let memory = self.storage.load_memory(&session.learner_id).await?;
        let insights = insights::derive(&interaction.input, &text, &screen, &memory, regenerations);

        interaction.result_text = Some(text.clone());
        interaction.transition(InteractionState::Committed, now)?;

        screen.progress.consume_attempt(Some(insights.score), now);
        if screen.attempts_exhausted() && !screen.mastery_reached() {
            screen.phase = ScreenPhase::Blocked;
        }
        let updated_memory = memory_update::update(&memory, &interaction, &insights, now);

        self.storage
            .commit_interaction(&interaction, &screen, Some(&updated_memory))
            .await?;
        self.coordinator.settle(&session.id, epoch).await;

        self.events.publish(DomainEvent::InteractionCommitted {
            session_id: session.id.0.clone(),
            screen_id: screen_id.0.clone(),
            interaction_id: interaction.id.0.clone(),
            epoch,
            timestamp: now,
        });
        self.events.publish(DomainEvent::MemoryApplied {
            learner_id: session.learner_id.0.clone(),
            interaction_id: interaction.id.0.clone(),
            concepts: insights.concepts_practiced.len(),
            timestamp: now,
        });

        for chunk in chunks {
            self.send(tx, cancel, InteractionEvent::Chunk { content: chunk })
                .await;
        }
        self.send(
            tx,
            cancel,
            InteractionEvent::Validated {
                action: ValidationAction::Accept,
                violations: 0,
            },
        )
        .await;
        self.send(
            tx,
            cancel,
            InteractionEvent::Committed {
                interaction_id: interaction.id.0.clone(),
                result_text: text,
                score: insights.score,
            },
        )
        .await;

        info!(
            session_id = %session.id,
            interaction_id = %interaction.id,
            epoch,
            score = insights.score,
            regenerations,
            "Interaction committed"
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn finalize_rejected(
        &self,
        session: &Session,
        screen_id: &ScreenId,
        mut interaction: Interaction,
        reason: FallbackReason,
        consume_attempt: bool,
        epoch: u64,
        cancel: &CancellationToken,
        tx: &mpsc::Sender<InteractionEvent>,
    ) -> Result<()> {
        let guard = self.locks.acquire(&session.id).await;
        if !self.coordinator.is_current(&session.id, epoch).await {
            drop(guard);
            self.mark_cancelled(&interaction.id, None).await;
            return Ok(());
        }
        let now = self.clock.now();

        let mut screen = self.storage.load_screen(screen_id).await?;
        // A rejected response still consumes an attempt; a generation
        // failure does not punish the learner.
        if consume_attempt {
            screen.progress.consume_attempt(None, now);
            if screen.attempts_exhausted() && !screen.mastery_reached() {
                screen.phase = ScreenPhase::Blocked;
            }
        }

        let violations = interaction.violations.len();
        interaction.transition(InteractionState::Failed, now)?;
        self.storage
            .commit_interaction(&interaction, &screen, None)
            .await?;
        self.coordinator.settle(&session.id, epoch).await;

        self.events.publish(DomainEvent::InteractionFailed {
            session_id: session.id.0.clone(),
            interaction_id: interaction.id.0.clone(),
            violations,
            timestamp: now,
        });

        if reason == FallbackReason::ValidationRejected {
            self.send(
                tx,
                cancel,
                InteractionEvent::Validated {
                    action: ValidationAction::Reject,
                    violations,
                },
            )
            .await;
        }
        self.send(
            tx,
            cancel,
            InteractionEvent::Fallback {
                interaction_id: interaction.id.0.clone(),
                text: self.config.fallback_text.clone(),
                reason,
            },
        )
        .await;

        info!(
            session_id = %session.id,
            interaction_id = %interaction.id,
            ?reason,
            violations,
            "Interaction fell back"
        );
        Ok(())
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    fn driver(&self) -> GenerationDriver {
        GenerationDriver::new(
            self.generator.clone(),
            self.config.generation_deadline,
            self.config.transient_retries,
            self.config.backoff_base,
        )
    }

    fn canned_hint(&self, level: u8) -> String {
        let idx = level.saturating_sub(1) as usize;
        self.config
            .hint_fallbacks
            .get(idx)
            .or_else(|| self.config.hint_fallbacks.first())
            .cloned()
            .unwrap_or_else(|| self.config.fallback_text.clone())
    }

    async fn load_active_session(&self, session_id: &SessionId) -> Result<Session> {
        let session = self.storage.load_session(session_id).await?;
        if !session.is_active() {
            return Err(SessionError::SessionNotActive(session_id.0.clone()).into());
        }
        Ok(session)
    }

    async fn load_owned_screen(
        &self,
        screen_id: &ScreenId,
        session_id: &SessionId,
    ) -> Result<ScreenState> {
        let screen = self.storage.load_screen(screen_id).await?;
        if screen.session_id != *session_id {
            return Err(SessionError::ScreenSessionMismatch {
                screen: screen_id.0.clone(),
                session: session_id.0.clone(),
            }
            .into());
        }
        Ok(screen)
    }

    /// Persist a non-terminal transition unless the pipeline was superseded
    /// (a superseded pipeline must not overwrite the cancelled record).
    async fn transition_tracked(
        &self,
        interaction: &mut Interaction,
        next: InteractionState,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let now = self.clock.now();
        interaction.transition(next, now)?;
        if !cancel.is_cancelled() {
            self.storage.update_interaction(interaction).await?;
        }
        Ok(())
    }

    /// Mark an interaction cancelled if it has not already reached a
    /// terminal state. Safe to call from both the admission path and a
    /// superseded pipeline; whichever runs second is a no-op.
    async fn mark_cancelled(&self, interaction_id: &InteractionId, superseded_by: Option<String>) {
        let now = self.clock.now();
        match self.storage.load_interaction(interaction_id).await {
            Ok(mut current) if !current.is_terminal() => {
                if current.transition(InteractionState::Cancelled, now).is_ok() {
                    if let Err(e) = self.storage.update_interaction(&current).await {
                        warn!(
                            interaction_id = %interaction_id,
                            error = %e,
                            "Failed to persist cancellation"
                        );
                        return;
                    }
                    self.events.publish(DomainEvent::InteractionCancelled {
                        session_id: current.session_id.0.clone(),
                        interaction_id: interaction_id.0.clone(),
                        superseded_by,
                        timestamp: now,
                    });
                    debug!(interaction_id = %interaction_id, "Interaction cancelled");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(
                interaction_id = %interaction_id,
                error = %e,
                "Failed to load interaction for cancellation"
            ),
        }
    }

    async fn send(
        &self,
        tx: &mpsc::Sender<InteractionEvent>,
        cancel: &CancellationToken,
        event: InteractionEvent,
    ) {
        // No events for a superseded interaction after supersession.
        if cancel.is_cancelled() {
            return;
        }
        let _ = tx.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedGenerator;
    use chrono::Utc;
    use mentora_core::clock::ManualClock;
    use mentora_core::profile::InstructorProfile;
    use mentora_core::screen::ScreenType;
    use mentora_core::session::LearnerId;
    use mentora_storage::MemoryStore;

    /// Passes the default validator for a Socratic profile on a practice
    /// screen and mentions the screen's concept for full coverage.
    const GOOD_RESPONSE: &str =
        "Think about iteration here — what happens to the counter on each pass?";

    const BAD_RESPONSE: &str = "The answer is 42. Want to try the next one?";

    struct Harness {
        orchestrator: SessionOrchestrator,
        storage: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        session: Session,
        screen: ScreenState,
        screen2: ScreenState,
    }

    async fn harness(generator: Arc<ScriptedGenerator>) -> Harness {
        let storage = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let now = clock.now();

        let profile = InstructorProfile::default_profile().snapshot(now);
        let session = Session::new(LearnerId::from("learner-1"), profile, now);

        let mut screen = ScreenState::new(session.id.clone(), ScreenType::Practice, "loops");
        screen.phase = ScreenPhase::Unlocked;
        screen.concepts = vec!["iteration".into()];

        let mut screen2 =
            ScreenState::new(session.id.clone(), ScreenType::Assessment, "recursion");
        screen2.prerequisite_screen_ids = vec![screen.id.clone()];

        storage.save_session(&session).await.unwrap();
        storage.save_screen(&screen).await.unwrap();
        storage.save_screen(&screen2).await.unwrap();

        let orchestrator = SessionOrchestrator::new(storage.clone(), generator)
            .with_clock(clock.clone());

        Harness {
            orchestrator,
            storage,
            clock,
            session,
            screen,
            screen2,
        }
    }

    async fn drain(mut rx: mpsc::Receiver<InteractionEvent>) -> Vec<InteractionEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn event_types(events: &[InteractionEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.event_type()).collect()
    }

    fn has_terminal(events: &[InteractionEvent]) -> bool {
        events
            .iter()
            .any(|e| matches!(e, InteractionEvent::Committed { .. } | InteractionEvent::Fallback { .. }))
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_submission_commits_and_updates_memory() {
        let generator = Arc::new(ScriptedGenerator::new().push_response(
            vec!["Think about iteration here — ", "what happens to the counter on each pass?"],
            Duration::ZERO,
        ));
        let h = harness(generator).await;

        h.orchestrator
            .start_screen(&h.session.id, &h.screen.id)
            .await
            .unwrap();
        let rx = h
            .orchestrator
            .submit_interaction(
                &h.session.id,
                &h.screen.id,
                &InteractionId::from("i1"),
                "why does my loop never stop?",
            )
            .await
            .unwrap();
        let events = drain(rx).await;

        let types = event_types(&events);
        assert_eq!(types.first(), Some(&"started"));
        assert_eq!(
            types.last(),
            Some(&"committed"),
            "event stream: {types:?}"
        );
        assert!(types.contains(&"chunk"));
        assert!(types.contains(&"validated"));
        // started precedes chunks, chunks precede validated, validated
        // precedes the single terminal event
        let validated_pos = types.iter().position(|t| *t == "validated").unwrap();
        assert!(types[1..validated_pos].iter().all(|t| *t == "chunk"));

        let interaction = h
            .storage
            .load_interaction(&InteractionId::from("i1"))
            .await
            .unwrap();
        assert_eq!(interaction.state, InteractionState::Committed);
        assert_eq!(interaction.result_text.as_deref(), Some(GOOD_RESPONSE));

        let screen = h.storage.load_screen(&h.screen.id).await.unwrap();
        assert_eq!(screen.progress.attempts, 1);
        assert!(screen.progress.best_score > 0.0);

        let memory = h.storage.load_memory(&h.session.learner_id).await.unwrap();
        assert_eq!(memory.mastery_of("iteration"), 1);
        assert!(memory.has_applied("i1"));
    }

    #[tokio::test(start_paused = true)]
    async fn supersession_last_submitted_wins() {
        // The first generation ignores its cancellation token and finishes
        // late; the epoch/cancel checks must still discard it.
        let generator = Arc::new(
            ScriptedGenerator::new()
                .ignoring_cancel()
                .push_response(vec!["Late iteration thought — keep going?"], Duration::from_secs(5))
                .push_response(
                    vec!["Think about iteration here — what happens to the counter on each pass?"],
                    Duration::from_millis(10),
                ),
        );
        let h = harness(generator).await;

        h.orchestrator
            .start_screen(&h.session.id, &h.screen.id)
            .await
            .unwrap();

        let rx1 = h
            .orchestrator
            .submit_interaction(
                &h.session.id,
                &h.screen.id,
                &InteractionId::from("i1"),
                "first question",
            )
            .await
            .unwrap();
        // Let the first pipeline reach its (slow) generation before the
        // second submission supersedes it.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let rx2 = h
            .orchestrator
            .submit_interaction(
                &h.session.id,
                &h.screen.id,
                &InteractionId::from("i2"),
                "second question",
            )
            .await
            .unwrap();

        let events2 = drain(rx2).await;
        assert!(has_terminal(&events2), "events: {:?}", event_types(&events2));
        assert_eq!(event_types(&events2).last(), Some(&"committed"));

        let events1 = drain(rx1).await;
        assert!(
            !has_terminal(&events1),
            "superseded stream got a terminal event: {:?}",
            event_types(&events1)
        );

        let i1 = h
            .storage
            .load_interaction(&InteractionId::from("i1"))
            .await
            .unwrap();
        assert_eq!(i1.state, InteractionState::Cancelled);
        let i2 = h
            .storage
            .load_interaction(&InteractionId::from("i2"))
            .await
            .unwrap();
        assert_eq!(i2.state, InteractionState::Committed);

        // Exactly one attempt and one concept-practice increment
        let screen = h.storage.load_screen(&h.screen.id).await.unwrap();
        assert_eq!(screen.progress.attempts, 1, "cancelled never counts");
        let memory = h.storage.load_memory(&h.session.learner_id).await.unwrap();
        assert_eq!(memory.mastery_of("iteration"), 1);
        assert_eq!(memory.applied_interactions, vec!["i2".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_after_retries_consumes_attempt_only() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .push_response(vec![BAD_RESPONSE], Duration::ZERO)
                .push_response(vec![BAD_RESPONSE], Duration::ZERO)
                .push_response(vec![BAD_RESPONSE], Duration::ZERO),
        );
        let h = harness(generator.clone()).await;

        h.orchestrator
            .start_screen(&h.session.id, &h.screen.id)
            .await
            .unwrap();
        let rx = h
            .orchestrator
            .submit_interaction(
                &h.session.id,
                &h.screen.id,
                &InteractionId::from("i1"),
                "what is the output?",
            )
            .await
            .unwrap();
        let events = drain(rx).await;

        let types = event_types(&events);
        assert!(!types.contains(&"chunk"), "rejected drafts never stream");
        assert!(types.contains(&"validated"));
        assert_eq!(types.last(), Some(&"fallback"));
        assert!(events.iter().any(|e| matches!(
            e,
            InteractionEvent::Fallback { reason: FallbackReason::ValidationRejected, text, .. }
            if !text.is_empty()
        )));

        // Initial generation + two regenerations (High-tier ceiling)
        assert_eq!(generator.calls(), 3);

        let interaction = h
            .storage
            .load_interaction(&InteractionId::from("i1"))
            .await
            .unwrap();
        assert_eq!(interaction.state, InteractionState::Failed);
        assert!(interaction.result_text.is_none(), "violating text never persists");

        let screen = h.storage.load_screen(&h.screen.id).await.unwrap();
        assert_eq!(screen.progress.attempts, 1, "a rejected attempt is still consumed");

        let memory = h.storage.load_memory(&h.session.learner_id).await.unwrap();
        assert_eq!(memory.mastery_of("iteration"), 0, "no memory mutation on reject");
        assert!(memory.applied_interactions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn tier_b_violation_then_clean_regeneration_accepts() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .push_response(vec![BAD_RESPONSE], Duration::ZERO)
                .push_response(
                    vec!["Think about iteration here — what happens to the counter on each pass?"],
                    Duration::ZERO,
                ),
        );
        let h = harness(generator.clone()).await;

        h.orchestrator
            .start_screen(&h.session.id, &h.screen.id)
            .await
            .unwrap();
        let rx = h
            .orchestrator
            .submit_interaction(
                &h.session.id,
                &h.screen.id,
                &InteractionId::from("i1"),
                "what is the output?",
            )
            .await
            .unwrap();
        let events = drain(rx).await;

        assert_eq!(event_types(&events).last(), Some(&"committed"));
        assert_eq!(generator.calls(), 2, "one retry consumed");

        let interaction = h
            .storage
            .load_interaction(&InteractionId::from("i1"))
            .await
            .unwrap();
        assert_eq!(interaction.state, InteractionState::Committed);
        assert_eq!(interaction.result_text.as_deref(), Some(GOOD_RESPONSE));
        // The rejected draft survives only as an audit violation
        assert!(interaction
            .violations
            .iter()
            .any(|v| v.check_id == "direct-answer"));
    }

    #[tokio::test(start_paused = true)]
    async fn third_submission_hits_max_attempts() {
        let generator = Arc::new(
            ScriptedGenerator::new().with_default_text(GOOD_RESPONSE, Duration::ZERO),
        );
        let h = harness(generator).await;

        // Tighten the cap before starting
        let mut screen = h.storage.load_screen(&h.screen.id).await.unwrap();
        screen.constraints.max_attempts = Some(2);
        h.storage.save_screen(&screen).await.unwrap();

        h.orchestrator
            .start_screen(&h.session.id, &h.screen.id)
            .await
            .unwrap();

        for i in 0..2 {
            let rx = h
                .orchestrator
                .submit_interaction(
                    &h.session.id,
                    &h.screen.id,
                    &InteractionId::from(&format!("i{i}")),
                    "question",
                )
                .await
                .unwrap();
            let events = drain(rx).await;
            assert_eq!(event_types(&events).last(), Some(&"committed"));
        }

        let err = h
            .orchestrator
            .submit_interaction(
                &h.session.id,
                &h.screen.id,
                &InteractionId::from("i3"),
                "one more",
            )
            .await
            .unwrap_err();
        match err {
            Error::Constraint(violation) => {
                assert_eq!(violation.kind, ConstraintKind::MaxAttemptsReached);
                assert_eq!(violation.kind.to_string(), "MAX_ATTEMPTS_REACHED");
            }
            other => panic!("expected constraint violation, got: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn generation_failure_serves_fallback_without_attempt() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .push_failure(GenerationError::AuthenticationFailed("bad key".into())),
        );
        let h = harness(generator).await;

        h.orchestrator
            .start_screen(&h.session.id, &h.screen.id)
            .await
            .unwrap();
        let rx = h
            .orchestrator
            .submit_interaction(
                &h.session.id,
                &h.screen.id,
                &InteractionId::from("i1"),
                "question",
            )
            .await
            .unwrap();
        let events = drain(rx).await;

        let types = event_types(&events);
        assert_eq!(types.last(), Some(&"fallback"));
        assert!(!types.contains(&"validated"), "nothing was validated");
        assert!(events.iter().any(|e| matches!(
            e,
            InteractionEvent::Fallback { reason: FallbackReason::GenerationFailed, .. }
        )));

        let screen = h.storage.load_screen(&h.screen.id).await.unwrap();
        assert_eq!(
            screen.progress.attempts, 0,
            "infrastructure failure is not the learner's attempt"
        );
        let interaction = h
            .storage
            .load_interaction(&InteractionId::from("i1"))
            .await
            .unwrap();
        assert_eq!(interaction.state, InteractionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_then_commit() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .push_failure(GenerationError::Overloaded("503".into()))
                .push_response(
                    vec!["Think about iteration here — what happens to the counter on each pass?"],
                    Duration::ZERO,
                ),
        );
        let h = harness(generator.clone()).await;

        h.orchestrator
            .start_screen(&h.session.id, &h.screen.id)
            .await
            .unwrap();
        let rx = h
            .orchestrator
            .submit_interaction(
                &h.session.id,
                &h.screen.id,
                &InteractionId::from("i1"),
                "question",
            )
            .await
            .unwrap();
        let events = drain(rx).await;

        assert_eq!(event_types(&events).last(), Some(&"committed"));
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_blocks_until_elapsed() {
        let generator = Arc::new(
            ScriptedGenerator::new().with_default_text(GOOD_RESPONSE, Duration::ZERO),
        );
        let h = harness(generator).await;

        let mut screen = h.storage.load_screen(&h.screen.id).await.unwrap();
        screen.constraints.cooldown_seconds = 60;
        h.storage.save_screen(&screen).await.unwrap();

        h.orchestrator
            .start_screen(&h.session.id, &h.screen.id)
            .await
            .unwrap();

        let rx = h
            .orchestrator
            .submit_interaction(
                &h.session.id,
                &h.screen.id,
                &InteractionId::from("i1"),
                "question",
            )
            .await
            .unwrap();
        drain(rx).await;

        let err = h
            .orchestrator
            .submit_interaction(
                &h.session.id,
                &h.screen.id,
                &InteractionId::from("i2"),
                "again",
            )
            .await
            .unwrap_err();
        match err {
            Error::Constraint(violation) => {
                assert_eq!(violation.kind, ConstraintKind::CooldownActive);
                assert!(violation.retry_after.is_some());
            }
            other => panic!("expected cooldown violation, got: {other}"),
        }

        h.clock.advance_secs(61);
        let rx = h
            .orchestrator
            .submit_interaction(
                &h.session.id,
                &h.screen.id,
                &InteractionId::from("i3"),
                "after cooldown",
            )
            .await
            .unwrap();
        let events = drain(rx).await;
        assert_eq!(event_types(&events).last(), Some(&"committed"));
    }

    #[tokio::test(start_paused = true)]
    async fn hints_are_budgeted_and_fall_back() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .push_failure(GenerationError::NotConfigured("no backend".into())),
        );
        let h = harness(generator).await;

        let mut screen = h.storage.load_screen(&h.screen.id).await.unwrap();
        screen.constraints.max_hints = 1;
        h.storage.save_screen(&screen).await.unwrap();

        h.orchestrator
            .start_screen(&h.session.id, &h.screen.id)
            .await
            .unwrap();

        // Generation fails; the canned level hint is served instead
        let hint = h
            .orchestrator
            .request_hint(&h.session.id, &h.screen.id, 2)
            .await
            .unwrap();
        assert_eq!(hint.level, 2);
        assert!(!hint.text.is_empty());

        let screen = h.storage.load_screen(&h.screen.id).await.unwrap();
        assert_eq!(screen.progress.hints_used, 1);

        let err = h
            .orchestrator
            .request_hint(&h.session.id, &h.screen.id, 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Session(SessionError::NoHintsRemaining(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn start_screen_gates() {
        let generator = Arc::new(ScriptedGenerator::new());
        let h = harness(generator).await;

        // Locked prerequisite screen cannot start
        let err = h
            .orchestrator
            .start_screen(&h.session.id, &h.screen2.id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::ScreenLocked(_))));

        h.orchestrator
            .start_screen(&h.session.id, &h.screen.id)
            .await
            .unwrap();

        // Starting the same screen again
        let err = h
            .orchestrator
            .start_screen(&h.session.id, &h.screen.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Session(SessionError::AlreadyActive(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn submit_requires_active_screen() {
        let generator = Arc::new(ScriptedGenerator::new());
        let h = harness(generator).await;

        let err = h
            .orchestrator
            .submit_interaction(
                &h.session.id,
                &h.screen.id,
                &InteractionId::from("i1"),
                "too early",
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Session(SessionError::ScreenNotActive(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn paused_session_rejects_operations() {
        let generator = Arc::new(ScriptedGenerator::new());
        let h = harness(generator).await;

        let mut session = h.storage.load_session(&h.session.id).await.unwrap();
        session.state = mentora_core::session::SessionState::Paused;
        h.storage.save_session(&session).await.unwrap();

        let err = h
            .orchestrator
            .start_screen(&h.session.id, &h.screen.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Session(SessionError::SessionNotActive(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn completion_flow_unlocks_next_screen_and_finishes_session() {
        let generator = Arc::new(
            ScriptedGenerator::new().with_default_text(GOOD_RESPONSE, Duration::ZERO),
        );
        let h = harness(generator).await;

        let mut screen = h.storage.load_screen(&h.screen.id).await.unwrap();
        screen.constraints.min_time_seconds = 30;
        screen.constraints.mastery_threshold = 0.5;
        h.storage.save_screen(&screen).await.unwrap();

        h.orchestrator
            .start_screen(&h.session.id, &h.screen.id)
            .await
            .unwrap();
        let rx = h
            .orchestrator
            .submit_interaction(
                &h.session.id,
                &h.screen.id,
                &InteractionId::from("i1"),
                "thinking about iteration",
            )
            .await
            .unwrap();
        drain(rx).await;

        // Too early: minimum time not reached
        let err = h
            .orchestrator
            .complete_screen(&h.session.id, &h.screen.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Session(SessionError::RequirementsNotMet(_))
        ));

        h.clock.advance_secs(31);
        let outcome = h
            .orchestrator
            .complete_screen(&h.session.id, &h.screen.id)
            .await
            .unwrap();
        assert!(outcome.mastery_achieved);
        assert_eq!(outcome.next_screen_id, Some(h.screen2.id.clone()));

        let screen2 = h.storage.load_screen(&h.screen2.id).await.unwrap();
        assert_eq!(screen2.phase, ScreenPhase::Unlocked);
        let session = h.storage.load_session(&h.session.id).await.unwrap();
        assert!(session.is_active(), "one screen still open");

        // Finish the second screen; the session completes with it
        h.orchestrator
            .start_screen(&h.session.id, &h.screen2.id)
            .await
            .unwrap();
        let rx = h
            .orchestrator
            .submit_interaction(
                &h.session.id,
                &h.screen2.id,
                &InteractionId::from("i2"),
                "recursion question",
            )
            .await
            .unwrap();
        drain(rx).await;
        let outcome = h
            .orchestrator
            .complete_screen(&h.session.id, &h.screen2.id)
            .await
            .unwrap();
        assert!(outcome.next_screen_id.is_none());

        let session = h.storage.load_session(&h.session.id).await.unwrap();
        assert_eq!(
            session.state,
            mentora_core::session::SessionState::Completed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn domain_events_flow_through_configured_bus() {
        let generator = Arc::new(
            ScriptedGenerator::new().with_default_text(GOOD_RESPONSE, Duration::ZERO),
        );
        let h = harness(generator).await;
        let orchestrator = h.orchestrator.clone().with_config(OrchestratorConfig {
            bus_capacity: 8,
            ..OrchestratorConfig::default()
        });

        let mut events = orchestrator.events().subscribe();
        assert_eq!(orchestrator.events().subscriber_count(), 1);

        orchestrator
            .start_screen(&h.session.id, &h.screen.id)
            .await
            .unwrap();
        let rx = orchestrator
            .submit_interaction(
                &h.session.id,
                &h.screen.id,
                &InteractionId::from("i1"),
                "question about iteration",
            )
            .await
            .unwrap();
        drain(rx).await;

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen
            .iter()
            .any(|e| matches!(e, DomainEvent::InteractionCommitted { interaction_id, .. } if interaction_id == "i1")));
        assert!(seen
            .iter()
            .any(|e| matches!(e, DomainEvent::MemoryApplied { concepts, .. } if *concepts == 1)));
    }
}
