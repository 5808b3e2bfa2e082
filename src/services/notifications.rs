use serde::Serialize;
use uuid::Uuid;

use crate::schemas::session::ExamPhase;
use crate::services::countdown::ClockDisplay;
use crate::services::session_state::ProgressSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum NoticeLevel {
    Info,
    Warning,
    Danger,
}

impl NoticeLevel {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub(crate) struct NoticeId(Uuid);

impl NoticeId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Transient toast. Dismissed automatically after the configured TTL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct Notice {
    pub(crate) id: NoticeId,
    pub(crate) level: NoticeLevel,
    pub(crate) message: String,
}

impl Notice {
    pub(crate) fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self { id: NoticeId::new(), level, message: message.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct SubmitSummary {
    pub(crate) answered: usize,
    pub(crate) unanswered: usize,
    pub(crate) time_remaining_text: String,
    pub(crate) warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct StatusReport {
    pub(crate) phase: ExamPhase,
    pub(crate) remaining: i64,
    pub(crate) answered: usize,
    pub(crate) total: usize,
    pub(crate) tab_switches: u32,
    pub(crate) clock_running: bool,
}

/// Everything the presentation layer needs to render, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub(crate) enum UiEvent {
    Clock(ClockDisplay),
    ThresholdWarning { threshold: i64, message: String },
    NoticeShown(Notice),
    NoticeDismissed { id: NoticeId },
    TabSwitchWarning { count: u32 },
    Progress(ProgressSnapshot),
    ConfirmSubmit(SubmitSummary),
    ConfirmDismissed,
    ReviewHighlight { question_ids: Vec<String> },
    HighlightCleared,
    QuestionFocused { number: usize },
    InputsDisabled,
    LeavePrompt { message: String },
    PhaseChanged { from: ExamPhase, to: ExamPhase },
    Status(StatusReport),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_get_distinct_ids() {
        let first = Notice::new(NoticeLevel::Info, "saved");
        let second = Notice::new(NoticeLevel::Info, "saved");
        assert_ne!(first.id, second.id);
        assert_eq!(first.message, second.message);
    }

    #[test]
    fn events_serialize_with_a_tag() {
        let value = serde_json::to_value(UiEvent::TabSwitchWarning { count: 2 }).expect("json");
        assert_eq!(value, serde_json::json!({ "event": "tab_switch_warning", "count": 2 }));
    }
}
