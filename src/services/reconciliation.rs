use crate::core::config::ExamSettings;
use crate::schemas::session::TimeRemainingResponse;
use crate::services::exam_api::ExamApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SyncTrigger {
    Scheduled,
    Foreground,
}

impl SyncTrigger {
    fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Foreground => "foreground",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SyncDecision {
    /// The server already holds a submission for this session.
    RemoteSubmitted,
    Correct { local: i64, server: i64 },
    WithinTolerance { drift: u64 },
    /// Transport or decode failure; the local clock stays authoritative.
    Failed,
}

/// Drift detection against the server's notion of remaining time.
#[derive(Debug)]
pub(crate) struct ReconciliationLoop {
    interval: i64,
    tolerance: u64,
    in_flight: bool,
}

impl ReconciliationLoop {
    pub(crate) fn new(settings: &ExamSettings) -> Self {
        Self {
            interval: settings.sync_interval_seconds.max(1),
            tolerance: settings.drift_tolerance_seconds.unsigned_abs(),
            in_flight: false,
        }
    }

    /// Syncs are aligned to local remaining time, not to wall clock.
    pub(crate) fn is_due(&self, remaining: i64) -> bool {
        remaining.rem_euclid(self.interval) == 0
    }

    pub(crate) fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Claims the single request slot. Returns false while a request is outstanding.
    pub(crate) fn try_begin(&mut self, trigger: SyncTrigger) -> bool {
        if self.in_flight {
            tracing::debug!(trigger = trigger.as_str(), "Time sync already in flight; skipping");
            return false;
        }
        self.in_flight = true;
        true
    }

    pub(crate) fn complete(
        &mut self,
        local: i64,
        result: Result<TimeRemainingResponse, ExamApiError>,
    ) -> SyncDecision {
        self.in_flight = false;

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, local, "Failed to sync with server");
                metrics::counter!("exam_time_sync_total", "outcome" => "failed").increment(1);
                return SyncDecision::Failed;
            }
        };

        if response.is_submitted {
            metrics::counter!("exam_time_sync_total", "outcome" => "remote_submitted").increment(1);
            return SyncDecision::RemoteSubmitted;
        }

        let server = response.time_remaining;
        let drift = local.abs_diff(server);
        if drift > self.tolerance {
            metrics::counter!("exam_time_sync_total", "outcome" => "corrected").increment(1);
            SyncDecision::Correct { local, server }
        } else {
            metrics::counter!("exam_time_sync_total", "outcome" => "in_sync").increment(1);
            SyncDecision::WithinTolerance { drift }
        }
    }
}
