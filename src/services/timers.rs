use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct TimerId(u64);

#[derive(Debug)]
struct Entry<T> {
    id: TimerId,
    due: Duration,
    period: Option<Duration>,
    task: T,
}

/// Virtual-time timer queue offering "run every N" and "run once after N".
///
/// Time only moves when the owner polls with a deadline, so tests drive it
/// directly while the runtime loop feeds it real elapsed time. Tasks are
/// handed out one at a time in due order so that a handler may cancel or
/// schedule timers before the next one is considered.
#[derive(Debug)]
pub(crate) struct Scheduler<T> {
    now: Duration,
    next_id: u64,
    entries: Vec<Entry<T>>,
}

impl<T: Clone> Scheduler<T> {
    pub(crate) fn new() -> Self {
        Self { now: Duration::ZERO, next_id: 0, entries: Vec::new() }
    }

    pub(crate) fn now(&self) -> Duration {
        self.now
    }

    pub(crate) fn every(&mut self, period: Duration, task: T) -> TimerId {
        let period = period.max(Duration::from_millis(1));
        self.push(period, Some(period), task)
    }

    pub(crate) fn once(&mut self, delay: Duration, task: T) -> TimerId {
        self.push(delay, None, task)
    }

    pub(crate) fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        before != self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn is_scheduled(&self, id: TimerId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.entries.len()
    }

    /// Pops the earliest task due at or before `deadline`, moving virtual time
    /// to its due instant. Returns `None` once nothing else is due, leaving the
    /// clock at `deadline`.
    pub(crate) fn poll(&mut self, deadline: Duration) -> Option<T> {
        let index = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.due <= deadline)
            .min_by_key(|(_, entry)| (entry.due, entry.id))
            .map(|(index, _)| index);

        let Some(index) = index else {
            self.now = self.now.max(deadline);
            return None;
        };

        self.now = self.now.max(self.entries[index].due);
        match self.entries[index].period {
            Some(period) => {
                let entry = &mut self.entries[index];
                entry.due += period;
                Some(entry.task.clone())
            }
            None => Some(self.entries.swap_remove(index).task),
        }
    }

    fn push(&mut self, delay: Duration, period: Option<Duration>, task: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry { id, due: self.now + delay, period, task });
        id
    }
}

impl<T: Clone> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}
