use crate::dictionary::IssueDictionary;
use crate::domain::classification::{IssueClassification, QuestionCategory, Severity};
use crate::equipment::{EquipmentThresholds, NumericReading};

/// Classifies a raw question into an `IssueClassification` (spec §4.3, C3).
///
/// Deterministic given the same inputs: static dictionary lookup by issue
/// code (if the caller already knows it), else a keyword heuristic over the
/// question text, then an optional numeric-trigger severity escalation.
pub struct Classifier {
    dictionary: IssueDictionary,
    thresholds: EquipmentThresholds,
}

impl Classifier {
    pub fn new() -> Self {
        Self {
            dictionary: IssueDictionary::default_entries(),
            thresholds: EquipmentThresholds::default_table(),
        }
    }

    pub fn with_dictionary(dictionary: IssueDictionary) -> Self {
        Self {
            dictionary,
            thresholds: EquipmentThresholds::default_table(),
        }
    }

    pub fn classify(
        &self,
        question: &str,
        issue_code_hint: Option<&str>,
        numeric_reading: Option<&NumericReading>,
    ) -> IssueClassification {
        let matched = issue_code_hint
            .and_then(|code| self.dictionary.by_code(code))
            .or_else(|| self.dictionary.best_keyword_match(question));

        let mut classification = match matched {
            Some(entry) => IssueClassification {
                category: category_for(entry.category, question),
                severity: entry.severity,
                issue_code: Some(entry.code.to_string()),
                causes: entry.common_causes.iter().map(|s| s.to_string()).collect(),
                solutions: entry.standard_solutions.iter().map(|s| s.to_string()).collect(),
                affected_components: entry
                    .affected_components
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
            None => IssueClassification {
                category: category_for("", question),
                ..IssueClassification::general()
            },
        };

        if let Some(reading) = numeric_reading {
            classification.severity = self.thresholds.escalate(classification.severity, reading);
            if classification.severity == Severity::Critical {
                classification.category = QuestionCategory::Numeric;
            }
        }

        classification
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Heuristic category assignment: safety-related dictionary entries and cost
/// or safety language in the question both route to their own categories,
/// ahead of falling back to `technical` for a matched entry or `general`
/// otherwise (spec §4.3, §4.4 — category drives expert selection).
fn category_for(dictionary_category: &str, question: &str) -> QuestionCategory {
    let lower = question.to_lowercase();
    if dictionary_category.eq_ignore_ascii_case("Safety-related")
        || lower.contains("safety")
        || lower.contains("danger")
        || lower.contains("injury")
    {
        return QuestionCategory::SafetyCritical;
    }
    if lower.contains("cost")
        || lower.contains("price")
        || lower.contains("budget")
        || lower.contains("expensive")
    {
        return QuestionCategory::Cost;
    }
    if lower.contains("how do i")
        || lower.contains("how to")
        || lower.contains("steps")
        || lower.contains("procedure")
    {
        return QuestionCategory::Practical;
    }
    if !dictionary_category.is_empty() {
        return QuestionCategory::Technical;
    }
    QuestionCategory::General
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dictionary_match_carries_severity_and_solutions() {
        let classifier = Classifier::new();
        let result = classifier.classify("the rear bumper has a crack", None, None);
        assert_eq!(result.issue_code.as_deref(), Some("ASBP-BUMPER-CRACK"));
        assert!(!result.solutions.is_empty());
    }

    #[test]
    fn safety_language_wins_category_regardless_of_dictionary() {
        let classifier = Classifier::new();
        let result = classifier.classify("is this paint defect a safety hazard?", None, None);
        assert_eq!(result.category, QuestionCategory::SafetyCritical);
    }

    #[test]
    fn numeric_trigger_escalates_to_critical() {
        let classifier = Classifier::new();
        let reading = NumericReading {
            equipment_type: "PRESS".to_string(),
            metric: "PRESSURE".to_string(),
            value: 130.0,
        };
        let result = classifier.classify("press seems fine today", None, Some(&reading));
        assert_eq!(result.severity, Severity::Critical);
        assert_eq!(result.category, QuestionCategory::Numeric);
    }

    #[test]
    fn no_match_falls_back_to_general() {
        let classifier = Classifier::new();
        let result = classifier.classify("what's the weather like", None, None);
        assert_eq!(result.category, QuestionCategory::General);
        assert!(result.issue_code.is_none());
    }
}
