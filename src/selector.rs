use crate::domain::classification::{IssueClassification, QuestionCategory, Severity};
use crate::domain::expert::ExpertName;

/// Chooses 1-3 experts from {A, B, C} based on classification + category
/// (spec §4.4, C4). Never selects the moderator expert D.
pub struct Selector;

impl Selector {
    /// `turn_count` is the session's `conversation_count` before this turn,
    /// used by the `GENERAL` rule ("turn count <= 1" means this is the
    /// first or second question in the session).
    pub fn select(classification: &IssueClassification, turn_count: u64) -> (Vec<ExpertName>, &'static str) {
        if classification.category == QuestionCategory::SafetyCritical
            || classification.severity == Severity::Critical
        {
            return (
                vec![ExpertName::A, ExpertName::B, ExpertName::C],
                "safety-critical or critical severity: all three experts consulted",
            );
        }
        match classification.category {
            QuestionCategory::Cost | QuestionCategory::Practical => (
                vec![ExpertName::A, ExpertName::C],
                "cost/practical question: cost and practical experts consulted",
            ),
            QuestionCategory::Technical | QuestionCategory::Numeric => (
                vec![ExpertName::A, ExpertName::B],
                "technical/numeric question: technical and diagnostic experts consulted",
            ),
            QuestionCategory::General if turn_count <= 1 => (
                vec![ExpertName::A],
                "general first question: single expert consulted",
            ),
            _ => (
                vec![ExpertName::A, ExpertName::B],
                "default: two experts consulted",
            ),
        }
    }
}
