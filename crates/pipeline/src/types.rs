//! Stage outcomes and related value types.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The status of one stage execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    PartialSuccess,
    Fail,
    /// The handler wants the engine to try again.
    Retry,
    /// Nothing happened; the node leaves no trace in completions or
    /// checkpoints.
    Skipped,
}

impl StageStatus {
    /// SUCCESS and PARTIAL_SUCCESS both count as success.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::PartialSuccess)
    }

    /// The snake_case string serde uses.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Fail => "fail",
            Self::Retry => "retry",
            Self::Skipped => "skipped",
        }
    }
}

/// What a node handler returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub status: StageStatus,

    /// The outgoing edge label the handler wants followed next.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub preferred_label: String,

    /// Node ids the handler suggests transitioning to, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_next_ids: Vec<String>,

    /// Key-value updates the engine applies to the pipeline context.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub context_updates: IndexMap<String, serde_json::Value>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,

    /// Populated when `status` is `Fail`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub failure_reason: String,

    /// A node the engine should advance to directly, bypassing edge
    /// selection. Set by the parallel handler to route to the fan-in
    /// node; selecting an edge there would re-enter an already-executed
    /// branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jump_to: Option<String>,
}

impl Outcome {
    #[must_use]
    pub fn success() -> Self {
        Self {
            status: StageStatus::Success,
            preferred_label: String::new(),
            suggested_next_ids: Vec::new(),
            context_updates: IndexMap::new(),
            notes: String::new(),
            failure_reason: String::new(),
            jump_to: None,
        }
    }

    #[must_use]
    pub fn partial_success() -> Self {
        Self {
            status: StageStatus::PartialSuccess,
            ..Self::success()
        }
    }

    #[must_use]
    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Fail,
            failure_reason: reason.into(),
            ..Self::success()
        }
    }

    #[must_use]
    pub fn retry(reason: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Retry,
            failure_reason: reason.into(),
            ..Self::success()
        }
    }

    #[must_use]
    pub fn skipped() -> Self {
        Self {
            status: StageStatus::Skipped,
            ..Self::success()
        }
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes = note.into();
        self
    }

    #[must_use]
    pub fn with_update(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context_updates.insert(key.into(), value);
        self
    }
}

/// A duration in pipeline attribute format: `250ms`, `30s`, `15m`, `2h`,
/// `1d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttrDuration(std::time::Duration);

impl AttrDuration {
    /// Parse from the attribute string form.
    pub fn parse(s: &str) -> Result<Self, crate::error::PipelineError> {
        let invalid = || crate::error::PipelineError::InvalidPipeline {
            reason: format!("invalid duration: {s}"),
        };

        let (digits, unit) = if let Some(rest) = s.strip_suffix("ms") {
            (rest, 1u64)
        } else if let Some(rest) = s.strip_suffix('s') {
            (rest, 1_000)
        } else if let Some(rest) = s.strip_suffix('m') {
            (rest, 60_000)
        } else if let Some(rest) = s.strip_suffix('h') {
            (rest, 3_600_000)
        } else if let Some(rest) = s.strip_suffix('d') {
            (rest, 86_400_000)
        } else {
            return Err(invalid());
        };

        let n: u64 = digits.parse().map_err(|_| invalid())?;
        let millis = n.checked_mul(unit).ok_or_else(invalid)?;
        Ok(Self(std::time::Duration::from_millis(millis)))
    }

    #[must_use]
    pub fn as_duration(self) -> std::time::Duration {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_constructors_set_status() {
        assert_eq!(Outcome::success().status, StageStatus::Success);
        assert_eq!(Outcome::fail("x").status, StageStatus::Fail);
        assert_eq!(Outcome::fail("x").failure_reason, "x");
        assert_eq!(Outcome::retry("r").status, StageStatus::Retry);
        assert_eq!(Outcome::skipped().status, StageStatus::Skipped);
    }

    #[test]
    fn duration_units() {
        assert_eq!(
            AttrDuration::parse("250ms").expect("ms").as_duration(),
            std::time::Duration::from_millis(250)
        );
        assert_eq!(
            AttrDuration::parse("15m").expect("m").as_duration(),
            std::time::Duration::from_secs(900)
        );
        assert!(AttrDuration::parse("nope").is_err());
    }
}
