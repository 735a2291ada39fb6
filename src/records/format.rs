//! Conversational formatting of visit records
//!
//! These strings are spoken aloud, so they are phrased as short natural
//! sentences rather than structured dumps.

use chrono::{Datelike, NaiveDate};

use super::{RecordSet, VisitRecord};

/// Render a record date for speech.
///
/// Accepts `YYYY-MM-DD` or a relative marker like `3-DAYS-AGO` used by
/// demo data sets; anything else passes through unchanged.
#[must_use]
pub fn friendly_date(raw: &str) -> String {
    if let Some(days) = raw.strip_suffix("-DAYS-AGO").and_then(|d| d.parse::<u32>().ok()) {
        return if days == 1 { "1 day ago".to_string() } else { format!("{days} days ago") };
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_or_else(
        |_| if raw.is_empty() { "recently".to_string() } else { raw.to_string() },
        |date| format!("{} {}, {}", date.format("%B"), date.day(), date.year()),
    )
}

/// Join items the way they are spoken: "A", "A and B", "A, B and C"
#[must_use]
pub fn join_natural(items: &[&str]) -> String {
    match items {
        [] => String::new(),
        [only] => (*only).to_string(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

fn clean_condition(diagnosis: &str) -> String {
    diagnosis
        .trim_end_matches('.')
        .replace("Recurrence of ", "recurring ")
        .replace("BPPV", "vertigo")
}

/// Natural one-paragraph summary of the most recent visit
#[must_use]
pub fn patient_summary(set: &RecordSet) -> String {
    let sorted = set.sorted_recent_first();
    let Some(recent) = sorted.first() else {
        return format!("I couldn't find any medical records for {}.", set.patient_name);
    };

    let first_name =
        set.patient_name.split_whitespace().next().unwrap_or(set.patient_name.as_str());
    let mut parts = vec![format!(
        "{first_name}'s most recent visit was {} for {}",
        friendly_date(&recent.date_of_visit),
        clean_condition(&recent.diagnosis).to_lowercase(),
    )];

    if !recent.patient_complaint.is_empty() && recent.patient_complaint.len() < 100 {
        parts.push(format!(
            "They came in with {}",
            recent.patient_complaint.to_lowercase().trim_end_matches('.')
        ));
    }

    let meds = recent.prescribed();
    if !meds.is_empty() {
        parts.push(format!("They're currently taking {}", join_natural(&meds)));
    }

    if recent.diagnosis.contains("BPPV") || recent.diagnosis.to_lowercase().contains("vertigo") {
        parts.push("This is a recurring condition for them".to_string());
    }

    parts.join(". ") + "."
}

/// Answer a medication question against the record history.
///
/// `query_type` is one of `last_visit`, `current`, `all_history`, or
/// `specific_visit` (which requires `visit_date`).
#[must_use]
pub fn medication_info(set: &RecordSet, query_type: &str, visit_date: Option<&str>) -> String {
    let name = &set.patient_name;
    let sorted = set.sorted_recent_first();
    if sorted.is_empty() {
        return format!("I couldn't find any medical records for {name}.");
    }

    match query_type {
        "current" => {
            // Recent visits approximate the current regimen
            let mut current: Vec<&str> = Vec::new();
            for record in sorted.iter().take(3) {
                for drug in record.prescribed() {
                    if !current.iter().any(|c| c.eq_ignore_ascii_case(drug)) {
                        current.push(drug);
                    }
                }
            }
            if current.is_empty() {
                format!("{name} is not currently taking any medications.")
            } else {
                format!("{name} is currently taking {}.", join_natural(&current))
            }
        }
        "all_history" => {
            let history = set.medication_history();
            if history.is_empty() {
                format!("No medications have been prescribed to {name}.")
            } else {
                let refs: Vec<&str> = history.iter().map(String::as_str).collect();
                format!(
                    "Throughout their medical history, {name} has been prescribed {}.",
                    join_natural(&refs)
                )
            }
        }
        "specific_visit" => {
            let Some(date) = visit_date else {
                return "I need the visit date to look that up.".to_string();
            };
            sorted.iter().find(|r| r.date_of_visit == date).map_or_else(
                || format!("I couldn't find a visit on {date} for {name}."),
                |record| prescribed_at(record, name, &format!("the visit on {date}")),
            )
        }
        // last_visit is also the fallback
        _ => {
            let recent = sorted[0];
            let when = format!("their last visit {}", friendly_date(&recent.date_of_visit));
            prescribed_at(recent, name, &when)
        }
    }
}

fn prescribed_at(record: &VisitRecord, name: &str, when: &str) -> String {
    let meds = record.prescribed();
    if meds.is_empty() {
        format!("No medications were prescribed during {when}.")
    } else {
        format!("Yes, during {when}, {name} was prescribed {}.", join_natural(&meds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::test_data::jane;

    #[test]
    fn relative_dates_render_as_speech() {
        assert_eq!(friendly_date("3-DAYS-AGO"), "3 days ago");
        assert_eq!(friendly_date("1-DAYS-AGO"), "1 day ago");
    }

    #[test]
    fn iso_dates_render_long_form() {
        assert_eq!(friendly_date("2026-03-14"), "March 14, 2026");
        assert_eq!(friendly_date(""), "recently");
        assert_eq!(friendly_date("last week"), "last week");
    }

    #[test]
    fn natural_join() {
        assert_eq!(join_natural(&["A"]), "A");
        assert_eq!(join_natural(&["A", "B"]), "A and B");
        assert_eq!(join_natural(&["A", "B", "C"]), "A, B and C");
    }

    #[test]
    fn summary_leads_with_recent_visit() {
        let summary = patient_summary(&jane());
        assert!(summary.starts_with("Jane's most recent visit was March 14, 2026"));
        assert!(summary.contains("vertigo"));
        assert!(summary.contains("recurring condition"));
    }

    #[test]
    fn last_visit_medications() {
        let info = medication_info(&jane(), "last_visit", None);
        assert!(info.contains("Meclizine and Ondansetron"));
    }

    #[test]
    fn history_query_dedups() {
        let info = medication_info(&jane(), "all_history", None);
        assert!(info.contains("Meclizine and Ondansetron"));
    }

    #[test]
    fn unknown_visit_date() {
        let info = medication_info(&jane(), "specific_visit", Some("1999-01-01"));
        assert!(info.contains("couldn't find a visit"));
    }
}
