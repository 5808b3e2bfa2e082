use serde::Serialize;
use time::OffsetDateTime;

use crate::core::time::format_offset;

pub(crate) const BLOCKED_ACTION_MESSAGE: &str = "This action is not allowed during the exam.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ContextSignal {
    VisibilityHidden,
    WindowBlur,
}

impl ContextSignal {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::VisibilityHidden => "visibility_hidden",
            Self::WindowBlur => "window_blur",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ContextSwitch {
    pub(crate) signal: ContextSignal,
    pub(crate) count: u32,
    /// Only the first few switches raise the modal.
    pub(crate) show_warning: bool,
}

/// A key press as seen by the exam page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct KeyPress {
    pub(crate) key: String,
    pub(crate) ctrl: bool,
    pub(crate) shift: bool,
    /// Focus is inside a text field, where navigation keys belong to the field.
    pub(crate) in_text_input: bool,
}

impl KeyPress {
    /// Parses combos such as `F12`, `ctrl+shift+i` or `ArrowDown`.
    pub(crate) fn parse(combo: &str) -> Option<Self> {
        let mut press = Self::default();
        let mut key = None;
        for part in combo.split('+').map(str::trim).filter(|part| !part.is_empty()) {
            match part.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => press.ctrl = true,
                "shift" => press.shift = true,
                _ => key = Some(part.to_string()),
            }
        }
        press.key = key?;
        Some(press)
    }

    fn is(&self, name: &str) -> bool {
        self.key.eq_ignore_ascii_case(name)
    }
}

/// Best-effort capture of signals that the student left the exam window.
///
/// Visibility and window focus are tracked as two independent coarse signals:
/// leaving the tab usually produces both, and both are counted.
#[derive(Debug)]
pub(crate) struct IntegrityMonitor {
    foregrounded: bool,
    tab_switches: u32,
    warning_cap: u32,
}

impl IntegrityMonitor {
    pub(crate) fn new(warning_cap: u32) -> Self {
        Self { foregrounded: true, tab_switches: 0, warning_cap }
    }

    pub(crate) fn tab_switches(&self) -> u32 {
        self.tab_switches
    }

    #[cfg(test)]
    pub(crate) fn is_foregrounded(&self) -> bool {
        self.foregrounded
    }

    pub(crate) fn visibility_hidden(&mut self, session_id: &str) -> Option<ContextSwitch> {
        if !self.foregrounded {
            return None;
        }
        let switch = self.record(session_id, ContextSignal::VisibilityHidden);
        self.foregrounded = false;
        Some(switch)
    }

    /// Returns true only when the page was actually hidden before.
    pub(crate) fn visibility_restored(&mut self) -> bool {
        !std::mem::replace(&mut self.foregrounded, true)
    }

    pub(crate) fn window_blurred(&mut self, session_id: &str) -> Option<ContextSwitch> {
        if !self.foregrounded {
            return None;
        }
        let mut switch = self.record(session_id, ContextSignal::WindowBlur);
        switch.show_warning = false;
        Some(switch)
    }

    /// Devtools and view-source shortcuts. Deterrence only, not a security boundary.
    pub(crate) fn is_blocked_shortcut(&self, press: &KeyPress) -> bool {
        press.is("F12")
            || (press.ctrl && press.shift && (press.is("I") || press.is("C")))
            || (press.ctrl && press.is("U"))
    }

    fn record(&mut self, session_id: &str, signal: ContextSignal) -> ContextSwitch {
        self.tab_switches += 1;
        let detected_at = OffsetDateTime::now_utc();
        tracing::warn!(
            session_id,
            signal = signal.as_str(),
            count = self.tab_switches,
            detected_at = %format_offset(detected_at),
            "Tab switch detected"
        );
        metrics::counter!("exam_tab_switches_total", "signal" => signal.as_str()).increment(1);

        ContextSwitch {
            signal,
            count: self.tab_switches,
            show_warning: self.tab_switches <= self.warning_cap,
        }
    }
}
