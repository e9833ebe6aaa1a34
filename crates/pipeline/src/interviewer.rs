//! Human-in-the-loop interviews.
//!
//! The wait-human handler routes every human interaction through the
//! [`Interviewer`] trait: CLI frontends, web UIs, and scripted test
//! queues all implement the same surface.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// A selectable option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionOption {
    /// Accelerator key (e.g. `"Y"`).
    pub key: String,
    /// Display label.
    pub label: String,
    /// The node this option routes to.
    pub target: String,
}

/// A question presented to a human.
#[derive(Debug, Clone)]
pub struct Question {
    pub text: String,
    pub options: Vec<QuestionOption>,
    /// The node that asked.
    pub stage: String,
    /// Seconds to wait before the answer times out.
    pub timeout_seconds: Option<f64>,
}

/// A human's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// A selected option key, label, or target id; the handler matches
    /// in that precedence.
    Value(String),
    /// No response within the timeout.
    Timeout,
    /// The human declined to answer.
    Skipped,
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "VALUE({v})"),
            Self::Timeout => f.write_str("TIMEOUT"),
            Self::Skipped => f.write_str("SKIPPED"),
        }
    }
}

/// A frontend that can answer questions.
pub trait Interviewer: Send + Sync {
    /// Ask one question and wait for the answer.
    fn ask(&self, question: &Question) -> Answer;

    /// One-way informational message; no response expected.
    fn inform(&self, _message: &str, _stage: &str) {}
}

/// Always picks the first option. The default for unattended runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApproveInterviewer;

impl Interviewer for AutoApproveInterviewer {
    fn ask(&self, question: &Question) -> Answer {
        match question.options.first() {
            Some(option) => Answer::Value(option.key.clone()),
            None => Answer::Skipped,
        }
    }
}

/// Answers from a pre-seeded queue; an exhausted queue times out.
/// Deterministic scripting for tests.
#[derive(Debug, Default)]
pub struct QueueInterviewer {
    answers: Mutex<VecDeque<Answer>>,
}

impl QueueInterviewer {
    #[must_use]
    pub fn new(answers: Vec<Answer>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
        }
    }
}

impl Interviewer for QueueInterviewer {
    fn ask(&self, _question: &Question) -> Answer {
        self.answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(Answer::Timeout)
    }
}
