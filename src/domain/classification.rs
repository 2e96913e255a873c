use serde::{Deserialize, Serialize};

/// Question category assigned by the Classifier (spec §3, §4.3). Drives
/// Expert Selector routing (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionCategory {
    SafetyCritical,
    Cost,
    Practical,
    Technical,
    Numeric,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Normal,
    High,
    Critical,
}

/// The Classifier's output (spec §3): category, severity, matched issue
/// code (if any), and the causes/solutions the static dictionary carries
/// for that code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueClassification {
    pub category: QuestionCategory,
    pub severity: Severity,
    pub issue_code: Option<String>,
    pub causes: Vec<String>,
    pub solutions: Vec<String>,
    pub affected_components: Vec<String>,
}

impl IssueClassification {
    pub fn general() -> Self {
        Self {
            category: QuestionCategory::General,
            severity: Severity::Normal,
            issue_code: None,
            causes: Vec::new(),
            solutions: Vec::new(),
            affected_components: Vec::new(),
        }
    }
}
