use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// One week.
const MAX_DURATION_MINUTES: i64 = 7 * 24 * 60;

/// Initial state handed to the runtime when an exam page is opened.
#[derive(Debug, Clone, Validate)]
pub(crate) struct SessionMeta {
    #[validate(length(min = 1, message = "session_id must not be empty"))]
    pub(crate) session_id: String,
    #[validate(range(
        min = 1,
        max = MAX_DURATION_MINUTES,
        message = "duration_minutes must be between 1 and 10080"
    ))]
    pub(crate) duration_minutes: i64,
    pub(crate) time_remaining: i64,
    #[validate(
        length(min = 1, message = "at least one question is required"),
        custom(function = "validate_unique_ids")
    )]
    pub(crate) question_ids: Vec<String>,
    pub(crate) existing_answers: BTreeMap<String, String>,
}

impl SessionMeta {
    pub(crate) fn duration_seconds(&self) -> i64 {
        self.duration_minutes.saturating_mul(60)
    }
}

#[allow(clippy::ptr_arg)]
fn validate_unique_ids(ids: &Vec<String>) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            let mut error = ValidationError::new("duplicate_question_id");
            error.message = Some(format!("question id '{id}' is listed twice").into());
            return Err(error);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TimeRemainingResponse {
    pub(crate) time_remaining: i64,
    pub(crate) is_submitted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SubmitAnswerRequest {
    pub(crate) question_id: String,
    pub(crate) answer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ExamPhase {
    InProgress,
    ConfirmPending,
    Submitting,
    Submitted,
    LockedExternally,
}

impl ExamPhase {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::ConfirmPending => "confirm_pending",
            Self::Submitting => "submitting",
            Self::Submitted => "submitted",
            Self::LockedExternally => "locked_externally",
        }
    }

    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, Self::Submitted | Self::LockedExternally)
    }
}

/// How a runtime session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ExamOutcome {
    /// The local form post went through.
    Submitted,
    /// The server already holds a submission; the page must be reloaded.
    Reload,
    /// The student confirmed leaving before submitting.
    Abandoned,
}

impl ExamOutcome {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Reload => "reload",
            Self::Abandoned => "abandoned",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(question_ids: &[&str]) -> SessionMeta {
        SessionMeta {
            session_id: "42".to_string(),
            duration_minutes: 60,
            time_remaining: 3600,
            question_ids: question_ids.iter().map(|id| id.to_string()).collect(),
            existing_answers: BTreeMap::new(),
        }
    }

    #[test]
    fn session_meta_accepts_valid_payload() {
        assert!(meta(&["q1", "q2"]).validate().is_ok());
    }

    #[test]
    fn session_meta_rejects_duplicate_questions() {
        let errors = meta(&["q1", "q1"]).validate().expect_err("duplicates");
        assert!(errors.field_errors().contains_key("question_ids"));
    }

    #[test]
    fn session_meta_rejects_empty_fields() {
        let mut payload = meta(&[]);
        payload.session_id = String::new();
        payload.duration_minutes = 0;
        let errors = payload.validate().expect_err("invalid");
        let fields = errors.field_errors();
        assert!(fields.contains_key("session_id"));
        assert!(fields.contains_key("duration_minutes"));
        assert!(fields.contains_key("question_ids"));
    }

    #[test]
    fn session_meta_caps_duration() {
        let mut payload = meta(&["q1"]);
        payload.duration_minutes = MAX_DURATION_MINUTES;
        assert!(payload.validate().is_ok());

        payload.duration_minutes = i64::MAX / 2;
        let errors = payload.validate().expect_err("too long");
        assert!(errors.field_errors().contains_key("duration_minutes"));
        assert_eq!(payload.duration_seconds(), i64::MAX);
    }

    #[test]
    fn time_remaining_response_decodes() {
        let parsed: TimeRemainingResponse =
            serde_json::from_str("{\"time_remaining\": 120, \"is_submitted\": false}")
                .expect("decode");
        assert_eq!(parsed, TimeRemainingResponse { time_remaining: 120, is_submitted: false });
    }

    #[test]
    fn terminal_phases() {
        assert!(ExamPhase::Submitted.is_terminal());
        assert!(ExamPhase::LockedExternally.is_terminal());
        assert!(!ExamPhase::Submitting.is_terminal());
        assert!(!ExamPhase::ConfirmPending.is_terminal());
    }
}
