use serde::{Deserialize, Serialize};

/// Outcome of one remote danger analysis.
///
/// At most one of `raw_answer` and `error` is populated, and `is_danger`
/// is always false on the error branch: a malformed or failed response
/// must never claim danger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisVerdict {
    pub is_danger: bool,
    pub raw_answer: Option<String>,
    pub error: Option<String>,
}

impl AnalysisVerdict {
    /// Build a verdict from the model's free-text answer.
    ///
    /// The answer is uppercased and judged dangerous when it contains
    /// `YES` anywhere, matching the strict YES/NO prompt contract.
    pub fn from_answer(answer: &str) -> Self {
        let normalized = answer.to_uppercase();
        Self {
            is_danger: normalized.contains("YES"),
            raw_answer: Some(normalized),
            error: None,
        }
    }

    /// Build a fail-safe non-danger verdict carrying an error message.
    pub fn from_error(message: impl Into<String>) -> Self {
        Self {
            is_danger: false,
            raw_answer: None,
            error: Some(message.into()),
        }
    }
}
