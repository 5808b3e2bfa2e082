use std::collections::BTreeSet;
use std::time::Duration;

use serde::Serialize;

use crate::core::config::ExamSettings;
use crate::core::time::format_clock;
use crate::services::timers::{Scheduler, TimerId};

/// Remaining-time marks (seconds) that raise a one-shot warning.
pub(crate) const WARNING_THRESHOLDS: [i64; 4] = [300, 120, 60, 30];

const TICK_PERIOD: Duration = Duration::from_secs(1);
const PROGRESS_DANGER_PERCENT: f64 = 8.33;
const PROGRESS_WARNING_PERCENT: f64 = 16.67;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Severity {
    Normal,
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ClockDisplay {
    pub(crate) text: String,
    pub(crate) remaining: i64,
    pub(crate) severity: Severity,
    /// `remaining / duration`, never below zero. May exceed 1.0 after an extension;
    /// presenters clamp the bar width.
    pub(crate) progress: f64,
    pub(crate) progress_severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ThresholdWarning {
    pub(crate) threshold: i64,
    pub(crate) message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TickOutcome {
    pub(crate) remaining: i64,
    pub(crate) warnings: Vec<ThresholdWarning>,
    /// Set on the single tick that first reaches zero.
    pub(crate) expired: bool,
}

#[derive(Debug)]
pub(crate) struct CountdownClock {
    duration: i64,
    remaining: i64,
    warning_bound: i64,
    danger_bound: i64,
    fired: BTreeSet<i64>,
    expiry_fired: bool,
    timer: Option<TimerId>,
}

impl CountdownClock {
    pub(crate) fn new(duration: i64, remaining: i64, settings: &ExamSettings) -> Self {
        Self {
            duration,
            remaining,
            warning_bound: settings.warning_bound_seconds,
            danger_bound: settings.danger_bound_seconds,
            fired: BTreeSet::new(),
            expiry_fired: false,
            timer: None,
        }
    }

    pub(crate) fn remaining(&self) -> i64 {
        self.remaining
    }

    pub(crate) fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    #[cfg(test)]
    pub(crate) fn fired_thresholds(&self) -> &BTreeSet<i64> {
        &self.fired
    }

    /// Schedules the one-second tick. Returns false when already running.
    pub(crate) fn start<T: Clone>(&mut self, scheduler: &mut Scheduler<T>, tick: T) -> bool {
        if self.timer.is_some() {
            return false;
        }
        self.timer = Some(scheduler.every(TICK_PERIOD, tick));
        tracing::debug!(remaining = self.remaining, "Countdown started");
        true
    }

    pub(crate) fn stop<T: Clone>(&mut self, scheduler: &mut Scheduler<T>) -> bool {
        let Some(timer) = self.timer.take() else {
            return false;
        };
        scheduler.cancel(timer);
        tracing::debug!(remaining = self.remaining, "Countdown stopped");
        true
    }

    pub(crate) fn pause<T: Clone>(&mut self, scheduler: &mut Scheduler<T>) -> bool {
        self.stop(scheduler)
    }

    pub(crate) fn resume<T: Clone>(&mut self, scheduler: &mut Scheduler<T>, tick: T) -> bool {
        if self.remaining <= 0 {
            return false;
        }
        self.start(scheduler, tick)
    }

    pub(crate) fn tick(&mut self) -> TickOutcome {
        self.remaining = self.remaining.saturating_sub(1);
        let warnings = self.check_warnings();

        let expired = self.remaining <= 0 && !self.expiry_fired;
        if expired {
            self.expiry_fired = true;
        }

        TickOutcome { remaining: self.remaining, warnings, expired }
    }

    /// Administrative extension (or reduction) of the remaining time.
    pub(crate) fn add_time(&mut self, delta: i64) -> Vec<ThresholdWarning> {
        self.remaining = self.remaining.saturating_add(delta);
        tracing::info!(delta, remaining = self.remaining, "Countdown adjusted");
        self.check_warnings()
    }

    /// Replaces local time with the server's value. Already fired thresholds stay fired.
    pub(crate) fn overwrite(&mut self, remaining: i64) -> Vec<ThresholdWarning> {
        self.remaining = remaining;
        self.check_warnings()
    }

    pub(crate) fn display(&self) -> ClockDisplay {
        let (text, severity) = if self.remaining <= 0 {
            (format_clock(0), Severity::Danger)
        } else if self.remaining <= self.danger_bound {
            (format_clock(self.remaining), Severity::Danger)
        } else if self.remaining <= self.warning_bound {
            (format_clock(self.remaining), Severity::Warning)
        } else {
            (format_clock(self.remaining), Severity::Normal)
        };

        let progress = self.progress();
        let percent = progress * 100.0;
        let progress_severity = if percent <= PROGRESS_DANGER_PERCENT {
            Severity::Danger
        } else if percent <= PROGRESS_WARNING_PERCENT {
            Severity::Warning
        } else {
            Severity::Normal
        };

        ClockDisplay { text, remaining: self.remaining, severity, progress, progress_severity }
    }

    pub(crate) fn progress(&self) -> f64 {
        if self.duration <= 0 {
            return 0.0;
        }
        (self.remaining as f64 / self.duration as f64).max(0.0)
    }

    fn check_warnings(&mut self) -> Vec<ThresholdWarning> {
        let mut warnings = Vec::new();
        for threshold in WARNING_THRESHOLDS {
            if self.remaining <= threshold && self.fired.insert(threshold) {
                metrics::counter!("exam_threshold_warnings_total").increment(1);
                warnings.push(ThresholdWarning { threshold, message: threshold_message(threshold) });
            }
        }
        warnings
    }
}

pub(crate) fn threshold_message(threshold: i64) -> String {
    let minutes = threshold / 60;
    let seconds = threshold % 60;
    if minutes > 0 {
        format!("{minutes} minute{} remaining!", if minutes > 1 { "s" } else { "" })
    } else {
        format!("{seconds} second{} remaining!", if seconds > 1 { "s" } else { "" })
    }
}
