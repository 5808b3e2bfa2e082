use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Duration, Instant, MissedTickBehavior};

use crate::schemas::session::{ExamOutcome, TimeRemainingResponse};
use crate::services::exam_api::{
    fire_and_forget, AnswerStore, ExamApiError, HttpExamApi, ServerTimeSource, SubmissionGateway,
};
use crate::services::exam_controller::{Effect, ExamController, UserInput};
use crate::services::notifications::UiEvent;

const TICK: Duration = Duration::from_secs(1);
const MAX_SUBMIT_RETRIES: u32 = 3;

/// Network collaborators of a running session.
#[derive(Clone)]
pub(crate) struct ExamServices {
    pub(crate) answers: Arc<dyn AnswerStore>,
    pub(crate) time: Arc<dyn ServerTimeSource>,
    pub(crate) submissions: Arc<dyn SubmissionGateway>,
}

impl ExamServices {
    pub(crate) fn from_api(api: HttpExamApi) -> Self {
        let api = Arc::new(api);
        Self { answers: api.clone(), time: api.clone(), submissions: api }
    }
}

enum Completion {
    Synced(Result<TimeRemainingResponse, ExamApiError>),
    PersistFailed { question_id: String, error: ExamApiError },
}

/// Drives one exam session until it is submitted, locked by the server or abandoned.
///
/// The controller is only touched from this loop. Network calls are spawned and
/// report back through an internal channel.
pub(crate) async fn run<R>(
    mut controller: ExamController,
    services: ExamServices,
    mut inputs: mpsc::Receiver<UserInput>,
    mut leaves: mpsc::Receiver<()>,
    mut render: R,
) -> Result<ExamOutcome>
where
    R: FnMut(&UiEvent),
{
    let session_id = controller.session_id().to_string();
    let (completion_tx, mut completions) = mpsc::unbounded_channel();

    let mut ticker = interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    let mut last_tick = Instant::now();
    let mut inputs_open = true;
    let mut leaves_open = true;

    controller.start();

    loop {
        for event in controller.drain_events() {
            render(&event);
        }
        for effect in controller.drain_effects() {
            if let Some(outcome) = perform(effect, &session_id, &services, &completion_tx).await? {
                tracing::info!(
                    session_id = %session_id,
                    outcome = outcome.as_str(),
                    phase = controller.phase().as_str(),
                    remaining = controller.remaining(),
                    answered = controller.session_state().answered_count(),
                    tab_switches = controller.tab_switches(),
                    "Exam session ended"
                );
                return Ok(outcome);
            }
        }

        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                controller.advance(now.saturating_duration_since(last_tick));
                last_tick = now;
            }
            input = inputs.recv(), if inputs_open => match input {
                Some(input) => {
                    if let Err(err) = controller.handle_input(input) {
                        if controller.is_closed() {
                            tracing::debug!(session_id = %session_id, error = %err, "Input after close ignored");
                        } else {
                            tracing::warn!(session_id = %session_id, error = %err, "Action rejected");
                        }
                    }
                }
                None => {
                    tracing::info!(session_id = %session_id, "Input closed; clock keeps running");
                    inputs_open = false;
                }
            },
            Some(completion) = completions.recv() => match completion {
                Completion::Synced(result) => controller.sync_finished(result),
                Completion::PersistFailed { question_id, error } => {
                    controller.persist_failed(&question_id, &error);
                }
            },
            leave = leaves.recv(), if leaves_open => match leave {
                Some(()) => {
                    controller.request_leave();
                }
                None => leaves_open = false,
            },
        }
    }
}

async fn perform(
    effect: Effect,
    session_id: &str,
    services: &ExamServices,
    completions: &mpsc::UnboundedSender<Completion>,
) -> Result<Option<ExamOutcome>> {
    match effect {
        Effect::PersistAnswer(request) => {
            let store = Arc::clone(&services.answers);
            let session_id = session_id.to_string();
            let question_id = request.question_id.clone();
            let completions = completions.clone();
            fire_and_forget(
                async move {
                    let result = store.save_answer(&session_id, &request).await;
                    let status = if result.is_ok() { "ok" } else { "failed" };
                    metrics::counter!("exam_answer_saves_total", "status" => status).increment(1);
                    result
                },
                move |error| {
                    let _ = completions.send(Completion::PersistFailed { question_id, error });
                },
            );
            Ok(None)
        }
        Effect::SyncTime => {
            let time = Arc::clone(&services.time);
            let session_id = session_id.to_string();
            let completions = completions.clone();
            tokio::spawn(async move {
                let result = time.time_remaining(&session_id).await;
                let _ = completions.send(Completion::Synced(result));
            });
            Ok(None)
        }
        Effect::SubmitForm(fields) => {
            submit_with_retry(services.submissions.as_ref(), session_id, &fields).await?;
            Ok(Some(ExamOutcome::Submitted))
        }
        Effect::Reload => Ok(Some(ExamOutcome::Reload)),
        Effect::Abandon => Ok(Some(ExamOutcome::Abandoned)),
    }
}

async fn submit_with_retry(
    gateway: &dyn SubmissionGateway,
    session_id: &str,
    fields: &[(String, String)],
) -> Result<()> {
    let mut last_error = None;

    for attempt in 0..=MAX_SUBMIT_RETRIES {
        match gateway.submit_exam(session_id, fields).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                tracing::warn!(session_id, attempt, error = %err, "Exam submission failed");
                last_error = Some(err);
            }
        }

        if attempt < MAX_SUBMIT_RETRIES {
            let backoff = Duration::from_secs(2_u64.pow(attempt));
            sleep(backoff).await;
        }
    }

    Err(match last_error {
        Some(err) => anyhow::Error::new(err).context("Failed to submit exam"),
        None => anyhow::anyhow!("Unknown exam submission error"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ExamSettings;
    use crate::services::exam_controller::SAVE_FAILED_MESSAGE;
    use crate::test_support::{self, FakeExamServer};

    struct Harness {
        server: Arc<FakeExamServer>,
        inputs: mpsc::Sender<UserInput>,
        leaves: mpsc::Sender<()>,
        input_rx: mpsc::Receiver<UserInput>,
        leave_rx: mpsc::Receiver<()>,
    }

    fn harness() -> Harness {
        let (inputs, input_rx) = mpsc::channel(16);
        let (leaves, leave_rx) = mpsc::channel(4);
        Harness { server: Arc::new(FakeExamServer::default()), inputs, leaves, input_rx, leave_rx }
    }

    fn services(server: &Arc<FakeExamServer>) -> ExamServices {
        ExamServices { answers: server.clone(), time: server.clone(), submissions: server.clone() }
    }

    fn controller(remaining: i64, settings: ExamSettings) -> ExamController {
        ExamController::new(test_support::session_meta(remaining, &["q1", "q2"]), settings)
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_submits_the_form_after_the_grace_delay() {
        let Harness { server, inputs, leaves: _leaves, input_rx, leave_rx } = harness();
        inputs
            .send(UserInput::Answer { question_id: "q1".to_string(), value: "A".to_string() })
            .await
            .expect("send answer");

        let started = Instant::now();
        let outcome = run(
            controller(3, ExamSettings::default()),
            services(&server),
            input_rx,
            leave_rx,
            |_| {},
        )
        .await
        .expect("run");

        assert_eq!(outcome, ExamOutcome::Submitted);
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(server.submissions(), vec![vec![
            ("question_q1".to_string(), "A".to_string()),
            ("question_q2".to_string(), String::new()),
        ]]);
        assert_eq!(server.saved_answers().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_submission_reloads_without_posting() {
        let Harness { server, inputs: _inputs, leaves: _leaves, input_rx, leave_rx } = harness();
        server.push_time(0, true);

        let outcome = run(
            controller(31, ExamSettings::default()),
            services(&server),
            input_rx,
            leave_rx,
            |_| {},
        )
        .await
        .expect("run");

        assert_eq!(outcome, ExamOutcome::Reload);
        assert_eq!(server.time_requests(), 1);
        assert!(server.submissions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn second_leave_request_abandons_the_session() {
        let Harness { server, inputs: _inputs, leaves, input_rx, leave_rx } = harness();
        leaves.send(()).await.expect("first leave");
        leaves.send(()).await.expect("second leave");

        let mut prompts = 0;
        let outcome = run(
            controller(600, ExamSettings::default()),
            services(&server),
            input_rx,
            leave_rx,
            |event| {
                if matches!(event, UiEvent::LeavePrompt { .. }) {
                    prompts += 1;
                }
            },
        )
        .await
        .expect("run");

        assert_eq!(outcome, ExamOutcome::Abandoned);
        assert_eq!(prompts, 1);
        assert!(server.submissions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_saves_surface_a_notice() {
        let Harness { server, inputs, leaves: _leaves, input_rx, leave_rx } = harness();
        server.fail_answers_for("q2");
        inputs
            .send(UserInput::Answer { question_id: "q2".to_string(), value: "B".to_string() })
            .await
            .expect("send answer");

        let settings = ExamSettings { auto_submit_delay_seconds: 0, ..ExamSettings::default() };
        let mut seen = Vec::new();
        let outcome =
            run(controller(3, settings), services(&server), input_rx, leave_rx, |event| {
                seen.push(event.clone());
            })
            .await
            .expect("run");

        assert_eq!(outcome, ExamOutcome::Submitted);
        assert!(server.saved_answers().is_empty());
        assert!(seen.iter().any(|event| matches!(
            event,
            UiEvent::NoticeShown(notice) if notice.message == SAVE_FAILED_MESSAGE
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn submission_is_retried_with_backoff() {
        let Harness { server, inputs, leaves: _leaves, input_rx, leave_rx } = harness();
        server.fail_next_submits(2);
        for input in [
            UserInput::Answer { question_id: "q1".to_string(), value: "A".to_string() },
            UserInput::RequestSubmit,
            UserInput::ConfirmSubmit,
        ] {
            inputs.send(input).await.expect("send input");
        }

        let outcome = run(
            controller(600, ExamSettings::default()),
            services(&server),
            input_rx,
            leave_rx,
            |_| {},
        )
        .await
        .expect("run");

        assert_eq!(outcome, ExamOutcome::Submitted);
        assert_eq!(server.submissions().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn submission_gives_up_after_retries() {
        let server = FakeExamServer::default();
        server.fail_next_submits(10);

        let fields = vec![("question_q1".to_string(), "A".to_string())];
        let err = submit_with_retry(&server, "42", &fields).await.expect_err("gives up");
        assert!(err.to_string().contains("Failed to submit exam"));
        assert!(server.submissions().is_empty());
    }
}
