//! Patient visit record domain types and read-only helpers
//!
//! Everything here is pure data shaping over records fetched by the
//! [`crate::engines::RecordStore`]; no I/O.

pub mod format;
pub mod interactions;

use serde::{Deserialize, Deserializer};

/// One clinical visit record
#[derive(Debug, Clone, Deserialize)]
pub struct VisitRecord {
    #[serde(default)]
    pub patient_name: String,
    /// Visit date, `YYYY-MM-DD` or a relative marker like `3-DAYS-AGO`
    #[serde(default)]
    pub date_of_visit: String,
    #[serde(default)]
    pub patient_complaint: String,
    #[serde(default)]
    pub diagnosis: String,
    #[serde(default)]
    pub doctor_notes: String,
    /// Prescribed drugs; `["None"]` means none were prescribed
    #[serde(default, deserialize_with = "string_or_list")]
    pub drugs_prescribed: Vec<String>,
    #[serde(default)]
    pub patient_age_at_visit: Option<u32>,
}

impl VisitRecord {
    /// Drugs actually prescribed at this visit (filters the `None` marker)
    #[must_use]
    pub fn prescribed(&self) -> Vec<&str> {
        self.drugs_prescribed
            .iter()
            .map(String::as_str)
            .filter(|d| !d.eq_ignore_ascii_case("none") && !d.is_empty())
            .collect()
    }
}

/// All visit records found for one patient
#[derive(Debug, Clone)]
pub struct RecordSet {
    pub patient_name: String,
    pub records: Vec<VisitRecord>,
}

impl RecordSet {
    /// Records ordered most recent visit first
    #[must_use]
    pub fn sorted_recent_first(&self) -> Vec<&VisitRecord> {
        let mut sorted: Vec<&VisitRecord> = self.records.iter().collect();
        sorted.sort_by(|a, b| b.date_of_visit.cmp(&a.date_of_visit));
        sorted
    }

    /// Every distinct drug across the history, first occurrence order,
    /// scanning most recent visits first
    #[must_use]
    pub fn medication_history(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for record in self.sorted_recent_first() {
            for drug in record.prescribed() {
                if !seen.iter().any(|s: &String| s.eq_ignore_ascii_case(drug)) {
                    seen.push(drug.to_string());
                }
            }
        }
        seen
    }
}

fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::One(s) => vec![s],
        Raw::Many(v) => v,
    })
}


#[cfg(test)]
mod tests {
    use super::test_data::jane;

    #[test]
    fn sorted_recent_first_orders_by_date() {
        let set = jane();
        let sorted = set.sorted_recent_first();
        assert_eq!(sorted[0].date_of_visit, "2026-03-14");
        assert_eq!(sorted[2].date_of_visit, "2024-06-20");
    }

    #[test]
    fn medication_history_dedups_and_skips_none() {
        let meds = jane().medication_history();
        assert_eq!(meds, vec!["Meclizine".to_string(), "Ondansetron".to_string()]);
    }

    #[test]
    fn drugs_parse_from_string_or_list() {
        let one: super::VisitRecord =
            serde_json::from_str(r#"{"drugs_prescribed":"Meclizine 25mg"}"#).unwrap();
        assert_eq!(one.drugs_prescribed, vec!["Meclizine 25mg"]);
        let many: super::VisitRecord =
            serde_json::from_str(r#"{"drugs_prescribed":["A","B"]}"#).unwrap();
        assert_eq!(many.drugs_prescribed.len(), 2);
    }
}
