use std::time::Duration;

use thiserror::Error;

use crate::core::config::ExamSettings;
use crate::core::time::format_short_clock;
use crate::schemas::session::{ExamPhase, SessionMeta, SubmitAnswerRequest, TimeRemainingResponse};
use crate::services::countdown::{CountdownClock, ThresholdWarning};
use crate::services::exam_api::ExamApiError;
use crate::services::integrity::{ContextSwitch, IntegrityMonitor, KeyPress, BLOCKED_ACTION_MESSAGE};
use crate::services::notifications::{
    Notice, NoticeId, NoticeLevel, StatusReport, SubmitSummary, UiEvent,
};
use crate::services::reconciliation::{ReconciliationLoop, SyncDecision, SyncTrigger};
use crate::services::session_state::{AnswerError, SessionState};
use crate::services::timers::{Scheduler, TimerId};


pub(crate) const TIME_UP_MESSAGE: &str = "Time is up! Your exam is being submitted automatically.";
pub(crate) const SAVE_FAILED_MESSAGE: &str = "Failed to save answer. Please try again.";
pub(crate) const REVIEW_MESSAGE: &str = "Unanswered questions are highlighted in yellow.";
pub(crate) const LEAVE_MESSAGE: &str =
    "Are you sure you want to leave? Your exam progress may be lost.";

const REVIEW_HIGHLIGHT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TimerTask {
    Tick,
    AutoSubmit,
    DismissNotice(NoticeId),
    ClearHighlight,
}

/// Side effects the runtime performs on behalf of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Effect {
    PersistAnswer(SubmitAnswerRequest),
    SyncTime,
    /// Native form post of every `question_<id>` field.
    SubmitForm(Vec<(String, String)>),
    /// The server already holds a submission; reload instead of submitting.
    Reload,
    Abandon,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum ControllerError {
    #[error("answer at least one question first")]
    ActionsDisabled,
    #[error("the exam session is closed")]
    SessionClosed,
    #[error("no submission is awaiting confirmation")]
    NotConfirming,
    #[error("unknown question '{0}'")]
    UnknownQuestion(String),
    #[error("question number {0} is out of range")]
    InvalidQuestionNumber(usize),
}

impl From<AnswerError> for ControllerError {
    fn from(err: AnswerError) -> Self {
        match err {
            AnswerError::UnknownQuestion(question_id) => Self::UnknownQuestion(question_id),
            AnswerError::InvalidQuestionNumber(number) => Self::InvalidQuestionNumber(number),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum UserInput {
    Answer { question_id: String, value: String },
    Navigate(usize),
    Step(isize),
    RequestSubmit,
    ConfirmSubmit,
    CancelSubmit,
    Review,
    VisibilityHidden,
    VisibilityRestored,
    WindowBlur,
    Key(KeyPress),
    ContextMenu,
    Pause,
    Resume,
    AddTime(i64),
    Status,
    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyDisposition {
    /// Default action suppressed with a notice.
    Blocked,
    Handled,
    PassThrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LeaveDecision {
    Allow,
    ConfirmationRequired,
    Abandon,
}

/// One exam attempt: clock, reconciliation, answers and integrity signals
/// behind the submit/lock state machine.
///
/// Every handler runs to completion synchronously. Network work is requested
/// through [`Effect`]s and its results come back through
/// [`ExamController::sync_finished`] and [`ExamController::persist_failed`].
#[derive(Debug)]
pub(crate) struct ExamController {
    session_id: String,
    settings: ExamSettings,
    phase: ExamPhase,
    /// First writer wins: set on entering Submitting or LockedExternally.
    closed: bool,
    clock: CountdownClock,
    sync: ReconciliationLoop,
    state: SessionState,
    integrity: IntegrityMonitor,
    scheduler: Scheduler<TimerTask>,
    auto_submit: Option<TimerId>,
    highlight: Option<TimerId>,
    leave_requested: bool,
    events: Vec<UiEvent>,
    effects: Vec<Effect>,
}

impl ExamController {
    pub(crate) fn new(meta: SessionMeta, settings: ExamSettings) -> Self {
        let mut state = SessionState::new(meta.question_ids.clone());
        state.seed(meta.existing_answers.iter());

        Self {
            clock: CountdownClock::new(meta.duration_seconds(), meta.time_remaining, &settings),
            sync: ReconciliationLoop::new(&settings),
            integrity: IntegrityMonitor::new(settings.tab_switch_warning_cap),
            session_id: meta.session_id,
            settings,
            phase: ExamPhase::InProgress,
            closed: false,
            state,
            scheduler: Scheduler::new(),
            auto_submit: None,
            highlight: None,
            leave_requested: false,
            events: Vec::new(),
            effects: Vec::new(),
        }
    }

    /// Starts the countdown and publishes the initial clock and progress.
    pub(crate) fn start(&mut self) {
        if self.closed {
            return;
        }
        if self.clock.start(&mut self.scheduler, TimerTask::Tick) {
            tracing::info!(
                session_id = %self.session_id,
                remaining = self.clock.remaining(),
                answered = self.state.answered_count(),
                total = self.state.total(),
                "Exam session started"
            );
        }
        self.events.push(UiEvent::Clock(self.clock.display()));
        self.events.push(UiEvent::Progress(self.state.progress()));
    }

    pub(crate) fn session_id(&self) -> &str {
        &self.session_id
    }

    pub(crate) fn phase(&self) -> ExamPhase {
        self.phase
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn remaining(&self) -> i64 {
        self.clock.remaining()
    }

    #[cfg(test)]
    pub(crate) fn clock(&self) -> &CountdownClock {
        &self.clock
    }

    pub(crate) fn session_state(&self) -> &SessionState {
        &self.state
    }

    pub(crate) fn tab_switches(&self) -> u32 {
        self.integrity.tab_switches()
    }

    #[cfg(test)]
    pub(crate) fn sync_in_flight(&self) -> bool {
        self.sync.in_flight()
    }

    pub(crate) fn drain_events(&mut self) -> Vec<UiEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Moves virtual time forward, running every timer that falls due.
    pub(crate) fn advance(&mut self, elapsed: Duration) {
        let deadline = self.scheduler.now() + elapsed;
        while let Some(task) = self.scheduler.poll(deadline) {
            self.on_timer(task);
        }
    }

    pub(crate) fn handle_input(&mut self, input: UserInput) -> Result<(), ControllerError> {
        // Any other activity dismisses a pending leave prompt.
        if input != UserInput::Leave {
            self.leave_requested = false;
        }
        match input {
            UserInput::Answer { question_id, value } => {
                self.answer_changed(&question_id, &value)?;
            }
            UserInput::Navigate(number) => {
                self.navigate(number)?;
            }
            UserInput::Step(delta) => {
                self.step(delta)?;
            }
            UserInput::RequestSubmit => {
                self.request_submit()?;
            }
            UserInput::ConfirmSubmit => self.confirm_submit()?,
            UserInput::CancelSubmit => self.cancel_submit()?,
            UserInput::Review => {
                self.review()?;
            }
            UserInput::VisibilityHidden => {
                self.visibility_hidden();
            }
            UserInput::VisibilityRestored => self.visibility_restored(),
            UserInput::WindowBlur => {
                self.window_blurred();
            }
            UserInput::Key(press) => {
                self.key_pressed(&press);
            }
            UserInput::ContextMenu => self.context_menu(),
            UserInput::Pause => {
                self.pause()?;
            }
            UserInput::Resume => {
                self.resume()?;
            }
            UserInput::AddTime(delta) => self.add_time(delta)?,
            UserInput::Status => self.report_status(),
            UserInput::Leave => {
                self.request_leave();
            }
        }
        Ok(())
    }

    /// Records the latest value of a question and asks for it to be persisted.
    pub(crate) fn answer_changed(
        &mut self,
        question_id: &str,
        value: &str,
    ) -> Result<bool, ControllerError> {
        self.ensure_open()?;
        let answered = self.state.record(question_id, value)?;
        self.events.push(UiEvent::Progress(self.state.progress()));
        self.effects.push(Effect::PersistAnswer(SubmitAnswerRequest {
            question_id: question_id.to_string(),
            answer: value.to_string(),
        }));
        Ok(answered)
    }

    pub(crate) fn navigate(&mut self, number: usize) -> Result<usize, ControllerError> {
        self.ensure_open()?;
        let number = self.state.navigate(number)?;
        self.events.push(UiEvent::QuestionFocused { number });
        Ok(number)
    }

    pub(crate) fn step(&mut self, delta: isize) -> Result<usize, ControllerError> {
        self.ensure_open()?;
        let number = self.state.step(delta);
        self.events.push(UiEvent::QuestionFocused { number });
        Ok(number)
    }

    pub(crate) fn request_submit(&mut self) -> Result<SubmitSummary, ControllerError> {
        self.ensure_open()?;
        if !self.state.actions_enabled() {
            return Err(ControllerError::ActionsDisabled);
        }

        let summary = self.submit_summary();
        if self.phase == ExamPhase::InProgress {
            self.transition(ExamPhase::ConfirmPending);
        }
        self.events.push(UiEvent::ConfirmSubmit(summary.clone()));
        Ok(summary)
    }

    pub(crate) fn cancel_submit(&mut self) -> Result<(), ControllerError> {
        self.ensure_open()?;
        if self.phase != ExamPhase::ConfirmPending {
            return Err(ControllerError::NotConfirming);
        }
        self.transition(ExamPhase::InProgress);
        self.events.push(UiEvent::ConfirmDismissed);
        Ok(())
    }

    pub(crate) fn confirm_submit(&mut self) -> Result<(), ControllerError> {
        self.ensure_open()?;
        if self.phase != ExamPhase::ConfirmPending {
            return Err(ControllerError::NotConfirming);
        }

        self.close();
        self.events.push(UiEvent::ConfirmDismissed);
        self.transition(ExamPhase::Submitting);
        tracing::info!(
            session_id = %self.session_id,
            remaining = self.clock.remaining(),
            "Submission confirmed"
        );
        self.finalize();
        Ok(())
    }

    /// Highlights unanswered questions for a few seconds and returns them in exam order.
    pub(crate) fn review(&mut self) -> Result<Vec<String>, ControllerError> {
        self.ensure_open()?;
        if !self.state.actions_enabled() {
            return Err(ControllerError::ActionsDisabled);
        }
        if self.phase == ExamPhase::ConfirmPending {
            self.transition(ExamPhase::InProgress);
            self.events.push(UiEvent::ConfirmDismissed);
        }

        let question_ids = self.state.unanswered();
        self.events.push(UiEvent::ReviewHighlight { question_ids: question_ids.clone() });
        self.notify(NoticeLevel::Info, REVIEW_MESSAGE);

        if let Some(previous) = self.highlight.take() {
            self.scheduler.cancel(previous);
        }
        self.highlight = Some(self.scheduler.once(REVIEW_HIGHLIGHT, TimerTask::ClearHighlight));
        Ok(question_ids)
    }

    pub(crate) fn visibility_hidden(&mut self) -> Option<ContextSwitch> {
        if self.closed {
            return None;
        }
        let switch = self.integrity.visibility_hidden(&self.session_id)?;
        if switch.show_warning {
            self.events.push(UiEvent::TabSwitchWarning { count: switch.count });
        }
        Some(switch)
    }

    /// Coming back to a hidden page triggers one out-of-band sync.
    pub(crate) fn visibility_restored(&mut self) {
        let regained = self.integrity.visibility_restored();
        if self.closed || !regained {
            return;
        }
        if self.sync.try_begin(SyncTrigger::Foreground) {
            self.effects.push(Effect::SyncTime);
        }
    }

    pub(crate) fn window_blurred(&mut self) -> Option<ContextSwitch> {
        if self.closed {
            return None;
        }
        self.integrity.window_blurred(&self.session_id)
    }

    pub(crate) fn key_pressed(&mut self, press: &KeyPress) -> KeyDisposition {
        if self.integrity.is_blocked_shortcut(press) {
            self.notify(NoticeLevel::Warning, BLOCKED_ACTION_MESSAGE);
            return KeyDisposition::Blocked;
        }
        if self.closed {
            return KeyDisposition::PassThrough;
        }

        // Arrow keys belong to the field while one is focused; Ctrl+Enter does not.
        let handled = if press.ctrl && press.key.eq_ignore_ascii_case("Enter") {
            self.request_submit().is_ok()
        } else if press.in_text_input {
            false
        } else if press.key == "ArrowDown" {
            self.step(1).is_ok()
        } else if press.key == "ArrowUp" {
            self.step(-1).is_ok()
        } else {
            false
        };

        if handled {
            KeyDisposition::Handled
        } else {
            KeyDisposition::PassThrough
        }
    }

    pub(crate) fn context_menu(&mut self) {
        self.notify(NoticeLevel::Warning, BLOCKED_ACTION_MESSAGE);
    }

    pub(crate) fn pause(&mut self) -> Result<bool, ControllerError> {
        self.ensure_open()?;
        Ok(self.clock.pause(&mut self.scheduler))
    }

    pub(crate) fn resume(&mut self) -> Result<bool, ControllerError> {
        self.ensure_open()?;
        Ok(self.clock.resume(&mut self.scheduler, TimerTask::Tick))
    }

    pub(crate) fn add_time(&mut self, delta: i64) -> Result<(), ControllerError> {
        self.ensure_open()?;
        let warnings = self.clock.add_time(delta);
        self.events.push(UiEvent::Clock(self.clock.display()));
        self.publish_warnings(warnings);
        Ok(())
    }

    /// The first request before a terminal state is refused with a prompt.
    pub(crate) fn request_leave(&mut self) -> LeaveDecision {
        if self.phase.is_terminal() {
            return LeaveDecision::Allow;
        }
        if self.leave_requested {
            tracing::warn!(
                session_id = %self.session_id,
                phase = self.phase.as_str(),
                "Leaving exam before submission"
            );
            self.effects.push(Effect::Abandon);
            return LeaveDecision::Abandon;
        }

        self.leave_requested = true;
        self.events.push(UiEvent::LeavePrompt { message: LEAVE_MESSAGE.to_string() });
        LeaveDecision::ConfirmationRequired
    }

    pub(crate) fn sync_finished(&mut self, result: Result<TimeRemainingResponse, ExamApiError>) {
        if self.closed {
            tracing::debug!(session_id = %self.session_id, "Ignoring time sync after close");
            return;
        }

        match self.sync.complete(self.clock.remaining(), result) {
            SyncDecision::RemoteSubmitted => self.lock_externally(),
            SyncDecision::Correct { local, server } => {
                tracing::info!(session_id = %self.session_id, local, server, "Syncing timer");
                let warnings = self.clock.overwrite(server);
                self.events.push(UiEvent::Clock(self.clock.display()));
                self.publish_warnings(warnings);
            }
            SyncDecision::WithinTolerance { drift } => {
                tracing::debug!(session_id = %self.session_id, drift, "Timer in sync");
            }
            SyncDecision::Failed => {}
        }
    }

    pub(crate) fn persist_failed(&mut self, question_id: &str, error: &ExamApiError) {
        tracing::error!(
            session_id = %self.session_id,
            question_id,
            error = %error,
            "Failed to save answer"
        );
        if !self.closed {
            self.notify(NoticeLevel::Danger, SAVE_FAILED_MESSAGE);
        }
    }

    fn on_timer(&mut self, task: TimerTask) {
        match task {
            TimerTask::Tick => self.on_tick(),
            TimerTask::AutoSubmit => {
                self.auto_submit = None;
                if self.phase == ExamPhase::Submitting {
                    self.finalize();
                }
            }
            TimerTask::DismissNotice(id) => self.events.push(UiEvent::NoticeDismissed { id }),
            TimerTask::ClearHighlight => {
                self.highlight = None;
                self.events.push(UiEvent::HighlightCleared);
            }
        }
    }

    fn on_tick(&mut self) {
        if self.closed {
            return;
        }

        let outcome = self.clock.tick();
        self.events.push(UiEvent::Clock(self.clock.display()));
        self.publish_warnings(outcome.warnings);

        if outcome.expired {
            self.expire();
            return;
        }

        if self.sync.is_due(outcome.remaining) && self.sync.try_begin(SyncTrigger::Scheduled) {
            self.effects.push(Effect::SyncTime);
        }
    }

    fn expire(&mut self) {
        if self.closed {
            return;
        }

        let was_confirming = self.phase == ExamPhase::ConfirmPending;
        self.close();
        if was_confirming {
            self.events.push(UiEvent::ConfirmDismissed);
        }
        self.transition(ExamPhase::Submitting);
        tracing::warn!(session_id = %self.session_id, "Time expired; auto-submitting exam");
        self.notify(NoticeLevel::Danger, TIME_UP_MESSAGE);

        if self.settings.auto_submit_delay_seconds == 0 {
            self.finalize();
        } else {
            let delay = Duration::from_secs(self.settings.auto_submit_delay_seconds);
            self.auto_submit = Some(self.scheduler.once(delay, TimerTask::AutoSubmit));
        }
    }

    fn lock_externally(&mut self) {
        if self.closed {
            return;
        }

        let was_confirming = self.phase == ExamPhase::ConfirmPending;
        self.close();
        if was_confirming {
            self.events.push(UiEvent::ConfirmDismissed);
        }
        self.transition(ExamPhase::LockedExternally);
        tracing::info!(
            session_id = %self.session_id,
            remaining = self.clock.remaining(),
            "Exam already submitted on the server; reloading"
        );
        self.events.push(UiEvent::InputsDisabled);
        self.effects.push(Effect::Reload);
    }

    /// Submitting -> Submitted: hands the form off to the server.
    fn finalize(&mut self) {
        if self.phase != ExamPhase::Submitting {
            return;
        }
        if let Some(timer) = self.auto_submit.take() {
            self.scheduler.cancel(timer);
        }

        self.transition(ExamPhase::Submitted);
        self.events.push(UiEvent::InputsDisabled);
        self.effects.push(Effect::SubmitForm(self.state.form_fields()));
        tracing::info!(
            session_id = %self.session_id,
            answered = self.state.answered_count(),
            total = self.state.total(),
            "Submitting exam"
        );
    }

    /// Sets the terminal guard and stops everything periodic.
    fn close(&mut self) {
        self.closed = true;
        self.clock.stop(&mut self.scheduler);
        if let Some(timer) = self.highlight.take() {
            self.scheduler.cancel(timer);
        }
    }

    fn ensure_open(&self) -> Result<(), ControllerError> {
        if self.closed {
            Err(ControllerError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn transition(&mut self, to: ExamPhase) {
        let from = self.phase;
        if from == to {
            return;
        }
        self.phase = to;
        tracing::debug!(
            session_id = %self.session_id,
            from = from.as_str(),
            to = to.as_str(),
            "Exam phase changed"
        );
        self.events.push(UiEvent::PhaseChanged { from, to });
    }

    fn publish_warnings(&mut self, warnings: Vec<ThresholdWarning>) {
        for warning in warnings {
            self.events.push(UiEvent::ThresholdWarning {
                threshold: warning.threshold,
                message: warning.message,
            });
        }
    }

    fn notify(&mut self, level: NoticeLevel, message: &str) {
        let notice = Notice::new(level, message);
        let ttl = Duration::from_secs(self.settings.notice_ttl_seconds);
        self.scheduler.once(ttl, TimerTask::DismissNotice(notice.id));
        self.events.push(UiEvent::NoticeShown(notice));
    }

    fn submit_summary(&self) -> SubmitSummary {
        let answered = self.state.answered_count();
        let unanswered = self.state.total() - answered;
        let warning = (unanswered > 0).then(|| {
            format!(
                "You have {unanswered} unanswered question(s). These will be marked as incorrect."
            )
        });
        SubmitSummary {
            answered,
            unanswered,
            time_remaining_text: format_short_clock(self.clock.remaining()),
            warning,
        }
    }

    fn report_status(&mut self) {
        self.events.push(UiEvent::Status(StatusReport {
            phase: self.phase,
            remaining: self.clock.remaining(),
            answered: self.state.answered_count(),
            total: self.state.total(),
            tab_switches: self.integrity.tab_switches(),
            clock_running: self.clock.is_running(),
        }));
    }
}
