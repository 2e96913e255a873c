use crate::domain::classification::Severity;

/// One static issue dictionary entry, translated from `config/issue_database.py`
/// (SPEC_FULL §2.1).
#[derive(Debug, Clone)]
pub struct IssueEntry {
    pub code: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub severity: Severity,
    pub common_causes: &'static [&'static str],
    pub standard_solutions: &'static [&'static str],
    pub affected_components: &'static [&'static str],
    pub search_keywords: &'static [&'static str],
}

/// Read-only static issue dictionary, keyed by issue code (spec §4.3, §6).
/// A caller may substitute a custom set via `Classifier::with_dictionary`.
#[derive(Debug, Clone)]
pub struct IssueDictionary {
    entries: Vec<IssueEntry>,
}

impl IssueDictionary {
    pub fn by_code(&self, code: &str) -> Option<&IssueEntry> {
        self.entries.iter().find(|e| e.code.eq_ignore_ascii_case(code))
    }

    /// Keyword heuristic: scores every entry by how many of its
    /// `search_keywords` appear (case-insensitively) in `text`, returns the
    /// best match if any keyword hit at all (spec §4.3).
    pub fn best_keyword_match(&self, text: &str) -> Option<&IssueEntry> {
        let lower = text.to_lowercase();
        self.entries
            .iter()
            .map(|e| {
                let hits = e
                    .search_keywords
                    .iter()
                    .filter(|kw| lower.contains(&kw.to_lowercase()))
                    .count();
                (hits, e)
            })
            .filter(|(hits, _)| *hits > 0)
            .max_by_key(|(hits, _)| *hits)
            .map(|(_, e)| e)
    }

    pub fn entries(&self) -> &[IssueEntry] {
        &self.entries
    }

    pub fn default_entries() -> Self {
        Self {
            entries: vec![
                IssueEntry {
                    code: "ASBP-DOOR-SCRATCH",
                    description: "Door panel scratch",
                    category: "Surface damage",
                    severity: Severity::Normal,
                    common_causes: &[
                        "Collision during assembly",
                        "Operator inattention",
                        "Equipment interference",
                        "Damage during transport",
                    ],
                    standard_solutions: &[
                        "Strengthen operator training",
                        "Redesign clearances between assembly stations",
                        "Install protective padding",
                        "Improve transport jigs",
                    ],
                    affected_components: &["door outer panel", "door handle", "door molding"],
                    search_keywords: &["door", "scratch", "surface damage", "assembly", "cosmetic defect"],
                },
                IssueEntry {
                    code: "ASBP-GRILL-GAP",
                    description: "Radiator grille panel gap",
                    category: "Dimensional defect",
                    severity: Severity::High,
                    common_causes: &[
                        "Mounting bracket spec mismatch",
                        "Assembly alignment error",
                        "Bracket deformation or insufficient stiffness",
                        "Insufficient bolt torque",
                    ],
                    standard_solutions: &[
                        "Unify and inspect bracket specifications",
                        "Introduce an alignment jig",
                        "Calibrate alignment sensors",
                        "Strengthen torque control",
                    ],
                    affected_components: &["radiator grille", "mounting bracket", "bumper"],
                    search_keywords: &["grille", "gap", "alignment", "bracket", "dimensional defect"],
                },
                IssueEntry {
                    code: "ASBP-BUMPER-CRACK",
                    description: "Bumper crack",
                    category: "Structural damage",
                    severity: Severity::High,
                    common_causes: &[
                        "Thermal expansion and contraction",
                        "Impact absorption limit exceeded",
                        "Accumulated material fatigue",
                        "Design stress concentration",
                    ],
                    standard_solutions: &[
                        "Improve material strength",
                        "Reinforce stress concentration points",
                        "Strengthen temperature control",
                        "Improve impact absorption structure",
                    ],
                    affected_components: &["front bumper", "rear bumper", "impact absorber"],
                    search_keywords: &["bumper", "crack", "fracture", "structural damage", "impact"],
                },
                IssueEntry {
                    code: "ASBP-PAINT-DEFECT",
                    description: "Paint defect",
                    category: "Surface quality",
                    severity: Severity::Normal,
                    common_causes: &[
                        "Poor paint booth temperature/humidity control",
                        "Spray gun nozzle problem",
                        "Poor paint viscosity control",
                        "Incomplete pretreatment process",
                    ],
                    standard_solutions: &[
                        "Optimize booth environmental conditions",
                        "Service spray equipment",
                        "Strengthen paint quality control",
                        "Improve pretreatment process",
                    ],
                    affected_components: &["body outer panel", "plastic parts", "metal parts"],
                    search_keywords: &["paint", "finish", "surface", "color", "gloss"],
                },
                IssueEntry {
                    code: "ASBP-ENGINE-NOISE",
                    description: "Abnormal engine noise",
                    category: "Performance anomaly",
                    severity: Severity::High,
                    common_causes: &[
                        "Bearing wear",
                        "Valve clearance misadjustment",
                        "Fuel system problem",
                        "Ignition system fault",
                    ],
                    standard_solutions: &[
                        "Replace bearing",
                        "Readjust valve clearance",
                        "Inspect fuel system",
                        "Service ignition system",
                    ],
                    affected_components: &["engine block", "valve", "bearing", "fuel pump"],
                    search_keywords: &["engine", "noise", "vibration", "performance", "abnormal sound"],
                },
                IssueEntry {
                    code: "ASBP-BRAKE-FADE",
                    description: "Brake fade",
                    category: "Safety-related",
                    severity: Severity::Critical,
                    common_causes: &[
                        "Brake pad overheating",
                        "Insufficient brake hydraulic pressure",
                        "Disc deformation",
                        "Poor cooling system performance",
                    ],
                    standard_solutions: &[
                        "Replace brake pads",
                        "Inspect hydraulic system",
                        "Replace disc",
                        "Improve cooling performance",
                    ],
                    affected_components: &["brake pads", "brake disc", "caliper"],
                    search_keywords: &["brake", "fade", "braking force", "safety", "degradation"],
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_code_lookup() {
        let dict = IssueDictionary::default_entries();
        let entry = dict.by_code("ASBP-BRAKE-FADE").unwrap();
        assert_eq!(entry.severity, Severity::Critical);
    }

    #[test]
    fn keyword_heuristic_finds_best_match() {
        let dict = IssueDictionary::default_entries();
        let entry = dict
            .best_keyword_match("there's a crack forming near the rear bumper")
            .unwrap();
        assert_eq!(entry.code, "ASBP-BUMPER-CRACK");
    }

    #[test]
    fn no_keyword_hits_returns_none() {
        let dict = IssueDictionary::default_entries();
        assert!(dict.best_keyword_match("completely unrelated text").is_none());
    }
}
