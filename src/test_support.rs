use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::schemas::session::{SessionMeta, SubmitAnswerRequest, TimeRemainingResponse};
use crate::services::exam_api::{
    AnswerStore, ExamApiError, ServerTimeSource, SubmissionGateway,
};

const EXAM_VARS: &[&str] = &[
    "EXAM_STRICT_CONFIG",
    "EXAM_SERVER_URL",
    "EXAM_SYNC_INTERVAL_SECONDS",
    "EXAM_DRIFT_TOLERANCE_SECONDS",
    "EXAM_WARNING_BOUND_SECONDS",
    "EXAM_DANGER_BOUND_SECONDS",
    "EXAM_AUTO_SUBMIT_DELAY_SECONDS",
    "EXAM_NOTICE_TTL_SECONDS",
    "EXAM_TAB_SWITCH_WARNING_CAP",
    "EXAM_HTTP_TIMEOUT_SECONDS",
    "EXAM_LOG_LEVEL",
    "EXAM_LOG_JSON",
];

const SESSION_VARS: &[&str] = &[
    "EXAM_SESSION_ID",
    "EXAM_DURATION_MINUTES",
    "EXAM_TIME_REMAINING",
    "EXAM_QUESTION_IDS",
    "EXAM_EXISTING_ANSWERS",
];

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

/// Resets the process environment to defaults. `.env` is not loaded here.
pub(crate) fn set_test_env() {
    std::env::set_var("EXAM_ENV", "test");
    std::env::remove_var("ENVIRONMENT");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    for name in EXAM_VARS {
        std::env::remove_var(name);
    }
}

pub(crate) fn set_session_env(
    session_id: &str,
    duration_minutes: &str,
    time_remaining: Option<&str>,
    question_ids: &str,
) {
    std::env::set_var("EXAM_SESSION_ID", session_id);
    std::env::set_var("EXAM_DURATION_MINUTES", duration_minutes);
    match time_remaining {
        Some(value) => std::env::set_var("EXAM_TIME_REMAINING", value),
        None => std::env::remove_var("EXAM_TIME_REMAINING"),
    }
    std::env::set_var("EXAM_QUESTION_IDS", question_ids);
}

pub(crate) fn clear_session_env() {
    for name in SESSION_VARS {
        std::env::remove_var(name);
    }
}

/// A one-hour session with id `42`.
pub(crate) fn session_meta(time_remaining: i64, question_ids: &[&str]) -> SessionMeta {
    SessionMeta {
        session_id: "42".to_string(),
        duration_minutes: 60,
        time_remaining,
        question_ids: question_ids.iter().map(|id| id.to_string()).collect(),
        existing_answers: BTreeMap::new(),
    }
}

/// In-memory stand-in for the exam server.
#[derive(Default)]
pub(crate) struct FakeExamServer {
    answers: std::sync::Mutex<Vec<SubmitAnswerRequest>>,
    failing_questions: std::sync::Mutex<HashSet<String>>,
    time_responses: std::sync::Mutex<VecDeque<Result<TimeRemainingResponse, u16>>>,
    time_requests: AtomicUsize,
    submissions: std::sync::Mutex<Vec<Vec<(String, String)>>>,
    submit_failures: AtomicUsize,
}

impl FakeExamServer {
    pub(crate) fn fail_answers_for(&self, question_id: &str) {
        self.failing_questions.lock().expect("failing lock").insert(question_id.to_string());
    }

    pub(crate) fn push_time(&self, time_remaining: i64, is_submitted: bool) {
        self.time_responses
            .lock()
            .expect("time lock")
            .push_back(Ok(TimeRemainingResponse { time_remaining, is_submitted }));
    }

    /// The next `count` form posts fail with a 502.
    pub(crate) fn fail_next_submits(&self, count: usize) {
        self.submit_failures.store(count, Ordering::SeqCst);
    }

    pub(crate) fn saved_answers(&self) -> Vec<SubmitAnswerRequest> {
        self.answers.lock().expect("answers lock").clone()
    }

    pub(crate) fn submissions(&self) -> Vec<Vec<(String, String)>> {
        self.submissions.lock().expect("submissions lock").clone()
    }

    pub(crate) fn time_requests(&self) -> usize {
        self.time_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnswerStore for FakeExamServer {
    async fn save_answer(
        &self,
        session_id: &str,
        request: &SubmitAnswerRequest,
    ) -> Result<(), ExamApiError> {
        if self.failing_questions.lock().expect("failing lock").contains(&request.question_id) {
            return Err(ExamApiError::Status {
                endpoint: format!("/student/exam/session/{session_id}/submit-answer"),
                status: 500,
            });
        }
        self.answers.lock().expect("answers lock").push(request.clone());
        Ok(())
    }
}

#[async_trait]
impl ServerTimeSource for FakeExamServer {
    async fn time_remaining(&self, session_id: &str) -> Result<TimeRemainingResponse, ExamApiError> {
        self.time_requests.fetch_add(1, Ordering::SeqCst);
        let next = self.time_responses.lock().expect("time lock").pop_front();
        next.unwrap_or(Err(503)).map_err(|status| ExamApiError::Status {
            endpoint: format!("/api/exam/session/{session_id}/time-remaining"),
            status,
        })
    }
}

#[async_trait]
impl SubmissionGateway for FakeExamServer {
    async fn submit_exam(
        &self,
        session_id: &str,
        fields: &[(String, String)],
    ) -> Result<(), ExamApiError> {
        let pending_failures = self.submit_failures.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.submit_failures.store(pending_failures - 1, Ordering::SeqCst);
            return Err(ExamApiError::Status {
                endpoint: format!("/student/exam/session/{session_id}/submit"),
                status: 502,
            });
        }
        self.submissions.lock().expect("submissions lock").push(fields.to_vec());
        Ok(())
    }
}
