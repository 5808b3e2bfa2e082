use std::io::BufRead;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::schemas::session::ExamOutcome;
use crate::services::countdown::Severity;
use crate::services::exam_controller::UserInput;
use crate::services::integrity::KeyPress;
use crate::services::notifications::UiEvent;

pub(crate) const HELP: &str = "commands: answer <qid> <text> | nav <n> | up | down | submit | confirm | \
cancel | review | hide | show | blur | key <combo> | menu | pause | resume | extend <secs> | status | quit";

#[derive(Debug, PartialEq, Eq, Error)]
pub(crate) enum CommandError {
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),
    #[error("'{0}' is not a valid number")]
    InvalidNumber(String),
    #[error("'{0}' is not a key combination")]
    InvalidKey(String),
}

/// Parses one console line. Blank lines yield `None`.
pub(crate) fn parse_command(line: &str) -> Result<Option<UserInput>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim_start()),
        None => (line, ""),
    };

    let input = match command.to_ascii_lowercase().as_str() {
        "answer" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument("answer"));
            }
            let (question_id, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            UserInput::Answer { question_id: question_id.to_string(), value: value.to_string() }
        }
        "nav" => UserInput::Navigate(parse_number("nav", rest)?),
        "up" => UserInput::Step(-1),
        "down" => UserInput::Step(1),
        "submit" => UserInput::RequestSubmit,
        "confirm" => UserInput::ConfirmSubmit,
        "cancel" => UserInput::CancelSubmit,
        "review" => UserInput::Review,
        "hide" => UserInput::VisibilityHidden,
        "show" => UserInput::VisibilityRestored,
        "blur" => UserInput::WindowBlur,
        "key" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument("key"));
            }
            let press =
                KeyPress::parse(rest).ok_or_else(|| CommandError::InvalidKey(rest.to_string()))?;
            UserInput::Key(press)
        }
        "menu" => UserInput::ContextMenu,
        "pause" => UserInput::Pause,
        "resume" => UserInput::Resume,
        "extend" => UserInput::AddTime(parse_number("extend", rest)?),
        "status" => UserInput::Status,
        "quit" | "exit" => UserInput::Leave,
        other => return Err(CommandError::Unknown(other.to_string())),
    };

    Ok(Some(input))
}

fn parse_number<T: std::str::FromStr>(command: &'static str, value: &str) -> Result<T, CommandError> {
    if value.is_empty() {
        return Err(CommandError::MissingArgument(command));
    }
    value.parse().map_err(|_| CommandError::InvalidNumber(value.to_string()))
}

/// Reads commands from stdin on a plain thread so a pending read never holds up shutdown.
pub(crate) fn spawn_stdin_reader(inputs: mpsc::Sender<UserInput>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    tracing::error!(error = %err, "Failed to read console input");
                    break;
                }
            };
            match parse_command(&line) {
                Ok(Some(input)) => {
                    if inputs.blocking_send(input).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => println!("! {err}\n  {HELP}"),
            }
        }
    });
}

pub(crate) fn print_event(event: &UiEvent) {
    if let Some(line) = describe(event) {
        println!("{line}");
    }
}

/// One console line per event worth showing. The clock prints once a minute,
/// then every second for the last ten seconds.
pub(crate) fn describe(event: &UiEvent) -> Option<String> {
    let line = match event {
        UiEvent::Clock(display) => {
            if display.remaining % 60 != 0 && display.remaining > 10 {
                return None;
            }
            let marker = match display.severity {
                Severity::Normal => "",
                Severity::Warning => " (!)",
                Severity::Danger => " (!!)",
            };
            format!("[clock] {}{marker}", display.text)
        }
        UiEvent::ThresholdWarning { message, .. } => format!("[warning] {message}"),
        UiEvent::NoticeShown(notice) => format!("[{}] {}", notice.level.as_str(), notice.message),
        UiEvent::NoticeDismissed { .. } => return None,
        UiEvent::TabSwitchWarning { count } => {
            format!("[integrity] Leaving the exam window was detected ({count} so far).")
        }
        UiEvent::Progress(progress) => {
            format!("[progress] {}/{} answered", progress.answered, progress.total)
        }
        UiEvent::ConfirmSubmit(summary) => {
            let mut line = format!(
                "[submit] {} answered, {} unanswered, {} left. Type 'confirm' or 'cancel'.",
                summary.answered, summary.unanswered, summary.time_remaining_text
            );
            if let Some(warning) = &summary.warning {
                line.push_str("\n         ");
                line.push_str(warning);
            }
            line
        }
        UiEvent::ConfirmDismissed => "[submit] confirmation closed".to_string(),
        UiEvent::ReviewHighlight { question_ids } => {
            format!("[review] unanswered: {}", question_ids.join(", "))
        }
        UiEvent::HighlightCleared => return None,
        UiEvent::QuestionFocused { number } => format!("[nav] question {number}"),
        UiEvent::InputsDisabled => "[exam] inputs disabled".to_string(),
        UiEvent::LeavePrompt { message } => format!("[leave] {message} Repeat to leave."),
        UiEvent::PhaseChanged { to, .. } => format!("[exam] {}", to.as_str()),
        UiEvent::Status(report) => format!(
            "[status] {} | {}s left | {}/{} answered | {} tab switches | clock {}",
            report.phase.as_str(),
            report.remaining,
            report.answered,
            report.total,
            report.tab_switches,
            if report.clock_running { "running" } else { "stopped" }
        ),
    };
    Some(line)
}

pub(crate) fn describe_outcome(outcome: ExamOutcome) -> &'static str {
    match outcome {
        ExamOutcome::Submitted => "Exam submitted.",
        ExamOutcome::Reload => "This exam was already submitted. Reload to see the result.",
        ExamOutcome::Abandoned => "Left the exam before submitting.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::countdown::ClockDisplay;
    use crate::services::notifications::SubmitSummary;

    #[test]
    fn parses_answers_with_spaces_and_blank_values() {
        assert_eq!(
            parse_command("answer q7 two words ").expect("parse"),
            Some(UserInput::Answer { question_id: "q7".to_string(), value: "two words".to_string() })
        );
        assert_eq!(
            parse_command("answer q7").expect("parse"),
            Some(UserInput::Answer { question_id: "q7".to_string(), value: String::new() })
        );
        assert_eq!(parse_command("answer"), Err(CommandError::MissingArgument("answer")));
    }

    #[test]
    fn parses_simple_commands() {
        let cases = [
            ("nav 3", UserInput::Navigate(3)),
            ("UP", UserInput::Step(-1)),
            ("down", UserInput::Step(1)),
            ("submit", UserInput::RequestSubmit),
            ("hide", UserInput::VisibilityHidden),
            ("show", UserInput::VisibilityRestored),
            ("extend -60", UserInput::AddTime(-60)),
            ("quit", UserInput::Leave),
        ];
        for (line, expected) in cases {
            assert_eq!(parse_command(line).expect("parse"), Some(expected), "{line}");
        }
        assert_eq!(parse_command("   ").expect("blank"), None);
    }

    #[test]
    fn parses_key_combos() {
        let Some(UserInput::Key(press)) = parse_command("key ctrl+shift+i").expect("parse") else {
            panic!("expected a key input");
        };
        assert!(press.ctrl && press.shift);
        assert_eq!(press.key, "i");
        assert_eq!(parse_command("key ctrl+"), Err(CommandError::InvalidKey("ctrl+".to_string())));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse_command("teleport"), Err(CommandError::Unknown("teleport".to_string())));
        assert_eq!(parse_command("nav x"), Err(CommandError::InvalidNumber("x".to_string())));
        assert_eq!(parse_command("nav"), Err(CommandError::MissingArgument("nav")));
    }

    #[test]
    fn clock_is_printed_sparingly() {
        let display = |remaining: i64, text: &str| {
            UiEvent::Clock(ClockDisplay {
                text: text.to_string(),
                remaining,
                severity: Severity::Normal,
                progress: 0.5,
                progress_severity: Severity::Normal,
            })
        };
        assert_eq!(describe(&display(120, "02:00")), Some("[clock] 02:00".to_string()));
        assert_eq!(describe(&display(119, "01:59")), None);
        assert_eq!(describe(&display(9, "00:09")), Some("[clock] 00:09".to_string()));
    }

    #[test]
    fn submit_summary_includes_the_warning() {
        let event = UiEvent::ConfirmSubmit(SubmitSummary {
            answered: 1,
            unanswered: 1,
            time_remaining_text: "4:05".to_string(),
            warning: Some("You have 1 unanswered question(s).".to_string()),
        });
        let line = describe(&event).expect("line");
        assert!(line.starts_with("[submit] 1 answered, 1 unanswered, 4:05 left."));
        assert!(line.contains("You have 1 unanswered question(s)."));
    }
}
