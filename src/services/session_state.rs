use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ProgressSnapshot {
    pub(crate) answered: usize,
    pub(crate) total: usize,
    pub(crate) fraction: f64,
    pub(crate) actions_enabled: bool,
    pub(crate) current_question: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AnswerError {
    UnknownQuestion(String),
    InvalidQuestionNumber(usize),
}

/// Latest answer values and the answered set derived from them.
#[derive(Debug)]
pub(crate) struct SessionState {
    questions: Vec<String>,
    values: HashMap<String, String>,
    answered: BTreeSet<String>,
    current: usize,
}

impl SessionState {
    pub(crate) fn new(questions: Vec<String>) -> Self {
        Self { questions, values: HashMap::new(), answered: BTreeSet::new(), current: 1 }
    }

    /// Applies already-saved answers through the same non-blank rule as live edits.
    pub(crate) fn seed<'a>(&mut self, existing: impl IntoIterator<Item = (&'a String, &'a String)>) {
        for (question_id, value) in existing {
            if let Err(err) = self.record(question_id, value) {
                tracing::warn!(?err, question_id = %question_id, "Ignoring saved answer for unknown question");
            }
        }
    }

    /// Stores the latest value of a question. Returns whether it now counts as answered.
    pub(crate) fn record(&mut self, question_id: &str, value: &str) -> Result<bool, AnswerError> {
        if !self.questions.iter().any(|id| id == question_id) {
            return Err(AnswerError::UnknownQuestion(question_id.to_string()));
        }

        self.values.insert(question_id.to_string(), value.to_string());
        let answered = !value.trim().is_empty();
        if answered {
            self.answered.insert(question_id.to_string());
        } else {
            self.answered.remove(question_id);
        }
        Ok(answered)
    }

    pub(crate) fn is_answered(&self, question_id: &str) -> bool {
        self.answered.contains(question_id)
    }

    #[cfg(test)]
    pub(crate) fn answered(&self) -> &BTreeSet<String> {
        &self.answered
    }

    pub(crate) fn answered_count(&self) -> usize {
        self.answered.len()
    }

    pub(crate) fn total(&self) -> usize {
        self.questions.len()
    }

    pub(crate) fn actions_enabled(&self) -> bool {
        !self.answered.is_empty()
    }

    pub(crate) fn current(&self) -> usize {
        self.current
    }

    /// Unanswered question ids in exam order.
    pub(crate) fn unanswered(&self) -> Vec<String> {
        self.questions.iter().filter(|id| !self.answered.contains(*id)).cloned().collect()
    }

    /// Focuses the 1-based question number.
    pub(crate) fn navigate(&mut self, number: usize) -> Result<usize, AnswerError> {
        if number == 0 || number > self.questions.len() {
            return Err(AnswerError::InvalidQuestionNumber(number));
        }
        self.current = number;
        Ok(number)
    }

    /// Moves focus by `delta`, clamped to the first and last question.
    pub(crate) fn step(&mut self, delta: isize) -> usize {
        let last = self.questions.len().max(1);
        self.current = self.current.saturating_add_signed(delta).clamp(1, last);
        self.current
    }

    pub(crate) fn progress(&self) -> ProgressSnapshot {
        let total = self.total();
        let answered = self.answered_count();
        let fraction = if total == 0 { 0.0 } else { answered as f64 / total as f64 };
        ProgressSnapshot {
            answered,
            total,
            fraction,
            actions_enabled: self.actions_enabled(),
            current_question: self.current,
        }
    }

    /// `question_<id>` fields of the final form post, in exam order.
    pub(crate) fn form_fields(&self) -> Vec<(String, String)> {
        self.questions
            .iter()
            .map(|id| {
                let value = self.values.get(id).cloned().unwrap_or_default();
                (format!("question_{id}"), value)
            })
            .collect()
    }
}
