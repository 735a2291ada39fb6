//! Medication interaction screening
//!
//! Small static pairwise table. A real deployment would call a drug
//! interaction service; the shape of the check stays the same.

use super::RecordSet;

/// Known pairwise interactions: (drug a, drug b, warning)
const INTERACTIONS: &[(&str, &str, &str)] = &[
    (
        "Diazepam",
        "Meclizine",
        "INTERACTION: Both cause drowsiness. Risk of excessive sedation.",
    ),
    (
        "Diazepam",
        "Promethazine",
        "INTERACTION: Both cause drowsiness. Risk of excessive sedation.",
    ),
    (
        "Diazepam",
        "Ondansetron",
        "INTERACTION: May increase risk of QT prolongation.",
    ),
    (
        "Meclizine",
        "Promethazine",
        "INTERACTION: Both cause drowsiness. Risk of excessive sedation.",
    ),
    (
        "Omeprazole",
        "Diazepam",
        "INTERACTION: May increase Diazepam levels. Monitor for increased sedation.",
    ),
];

/// Medications the text extractor recognizes by name
const KNOWN_MEDICATIONS: &[&str] =
    &["Mucinex", "Ondansetron", "Meclizine", "Diazepam", "Omeprazole", "Promethazine"];

/// Check a set of proposed medications against the patient's history.
///
/// Returns one warning per interacting pair, deduplicated.
#[must_use]
pub fn check_interactions(new_medications: &[String], existing: &[String]) -> Vec<String> {
    let mut warnings = Vec::new();
    for new_med in new_medications {
        for existing_med in existing {
            if new_med.eq_ignore_ascii_case(existing_med) {
                continue;
            }
            for (a, b, warning) in INTERACTIONS {
                let hit = (new_med.eq_ignore_ascii_case(a) && existing_med.eq_ignore_ascii_case(b))
                    || (new_med.eq_ignore_ascii_case(b) && existing_med.eq_ignore_ascii_case(a));
                if hit && !warnings.contains(&(*warning).to_string()) {
                    warnings.push((*warning).to_string());
                }
            }
        }
    }
    warnings
}

/// Pull medication names out of free text (utterances, notes)
#[must_use]
pub fn extract_medications(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    KNOWN_MEDICATIONS
        .iter()
        .filter(|med| lower.contains(&med.to_lowercase()))
        .map(ToString::to_string)
        .collect()
}

/// Warnings for medications mentioned in an utterance against the history
/// in the loaded record set
#[must_use]
pub fn screen_utterance(utterance: &str, records: &RecordSet) -> Vec<String> {
    let mentioned = extract_medications(utterance);
    if mentioned.is_empty() {
        return Vec::new();
    }
    check_interactions(&mentioned, &records.medication_history())
}
