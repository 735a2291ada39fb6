//! Lookup tools advertised to the completion service
//!
//! Tool execution is read-only. Malformed arguments fail that one call
//! with a spoken error; sibling calls still run.

use serde::Deserialize;

use crate::engines::{RecordStore, ToolCall, ToolSpec};
use crate::records::{RecordSet, format, interactions};

pub const GET_PATIENT_DATA: &str = "get_patient_data";
pub const GET_PATIENT_SUMMARY: &str = "get_patient_summary";
pub const GET_MEDICATION_INFO: &str = "get_medication_info";
pub const CHECK_INTERACTIONS: &str = "check_medication_interactions";

/// Tool specifications sent with every completion request when a record
/// store is configured
#[must_use]
pub fn specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: GET_PATIENT_DATA.to_string(),
            description: "Use this tool immediately when any patient name is mentioned for \
                          the first time. Retrieves the patient's medical records and history."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "patient_name": { "type": "string", "description": "Full patient name" }
                },
                "required": ["patient_name"]
            }),
        },
        ToolSpec {
            name: GET_PATIENT_SUMMARY.to_string(),
            description: "Summarize a patient's recent visits and condition.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "patient_name": { "type": "string" },
                    "summary_type": { "type": "string", "enum": ["comprehensive", "recent"] }
                },
                "required": ["patient_name"]
            }),
        },
        ToolSpec {
            name: GET_MEDICATION_INFO.to_string(),
            description: "Answer questions about a patient's prescribed medications."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "patient_name": { "type": "string" },
                    "medication_query_type": {
                        "type": "string",
                        "enum": ["last_visit", "current", "all_history", "specific_visit"]
                    },
                    "visit_date": { "type": "string", "description": "YYYY-MM-DD" }
                },
                "required": ["patient_name"]
            }),
        },
        ToolSpec {
            name: CHECK_INTERACTIONS.to_string(),
            description: "Check proposed medications against the patient's history for known \
                          drug interactions."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "new_medications": { "type": "array", "items": { "type": "string" } },
                    "existing_medications": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["new_medications"]
            }),
        },
    ]
}

/// Result of executing one tool call
pub struct ToolOutcome {
    /// Text to speak and display
    pub spoken: String,
    /// Record context loaded by this call, to store on the session
    pub loaded: Option<RecordSet>,
}

/// Execute one tool call against the record store.
///
/// `current` is the record context already loaded on the session; tools
/// reuse it instead of querying again when the name matches.
pub async fn execute(
    call: &ToolCall,
    store: &dyn RecordStore,
    current: Option<&RecordSet>,
) -> ToolOutcome {
    match call.name.as_str() {
        GET_PATIENT_DATA => patient_data(call, store).await,
        GET_PATIENT_SUMMARY => {
            with_records(call, store, current, format::patient_summary).await
        }
        GET_MEDICATION_INFO => {
            let args: MedicationArgs = match parse_args(call) {
                Ok(args) => args,
                Err(outcome) => return outcome,
            };
            with_named_records(&args.patient_name, store, current, |set| {
                format::medication_info(
                    set,
                    args.medication_query_type.as_deref().unwrap_or("last_visit"),
                    args.visit_date.as_deref(),
                )
            })
            .await
        }
        CHECK_INTERACTIONS => check_interactions(call, current),
        other => {
            tracing::warn!(tool = %other, "completion requested an unknown tool");
            ToolOutcome {
                spoken: "I can't help with that request.".to_string(),
                loaded: None,
            }
        }
    }
}

#[derive(Deserialize)]
struct NameArgs {
    patient_name: String,
}

#[derive(Deserialize)]
struct MedicationArgs {
    patient_name: String,
    medication_query_type: Option<String>,
    visit_date: Option<String>,
}

#[derive(Deserialize)]
struct InteractionArgs {
    new_medications: Vec<String>,
    #[serde(default)]
    existing_medications: Vec<String>,
}

fn parse_args<T: serde::de::DeserializeOwned>(
    call: &ToolCall,
) -> std::result::Result<T, ToolOutcome> {
    serde_json::from_str(&call.arguments).map_err(|e| {
        tracing::warn!(tool = %call.name, error = %e, "malformed tool arguments");
        ToolOutcome {
            spoken: "I couldn't process that request.".to_string(),
            loaded: None,
        }
    })
}

async fn patient_data(call: &ToolCall, store: &dyn RecordStore) -> ToolOutcome {
    let args: NameArgs = match parse_args(call) {
        Ok(args) => args,
        Err(outcome) => return outcome,
    };
    match store.lookup(&args.patient_name).await {
        Ok(Some(set)) => {
            let spoken = lookup_acknowledgement(&set);
            ToolOutcome { spoken, loaded: Some(set) }
        }
        Ok(None) => ToolOutcome {
            spoken: format!(
                "No records found for {}. Please verify the patient name.",
                args.patient_name
            ),
            loaded: None,
        },
        Err(e) => {
            tracing::error!(error = %e, "record lookup failed");
            ToolOutcome {
                spoken: format!("I couldn't retrieve records for {}.", args.patient_name),
                loaded: None,
            }
        }
    }
}

/// Spoken acknowledgement after a successful record fetch
#[must_use]
pub fn lookup_acknowledgement(set: &RecordSet) -> String {
    let sorted = set.sorted_recent_first();
    sorted.first().map_or_else(
        || {
            format!(
                "I found no visit records for {}. What would you like to know?",
                set.patient_name
            )
        },
        |recent| {
            let condition = recent
                .diagnosis
                .trim_end_matches('.')
                .replace("Recurrence of ", "recurring ")
                .replace("BPPV", "vertigo")
                .to_lowercase();
            format!(
                "I found {} medical records for {}. The most recent visit was for {}. \
                 What would you like to know about their care?",
                set.records.len(),
                set.patient_name,
                condition
            )
        },
    )
}

async fn with_records<F>(
    call: &ToolCall,
    store: &dyn RecordStore,
    current: Option<&RecordSet>,
    render: F,
) -> ToolOutcome
where
    F: FnOnce(&RecordSet) -> String,
{
    let args: NameArgs = match parse_args(call) {
        Ok(args) => args,
        Err(outcome) => return outcome,
    };
    with_named_records(&args.patient_name, store, current, render).await
}

async fn with_named_records<F>(
    patient_name: &str,
    store: &dyn RecordStore,
    current: Option<&RecordSet>,
    render: F,
) -> ToolOutcome
where
    F: FnOnce(&RecordSet) -> String,
{
    if let Some(set) = current.filter(|s| s.patient_name.eq_ignore_ascii_case(patient_name)) {
        return ToolOutcome { spoken: render(set), loaded: None };
    }
    match store.lookup(patient_name).await {
        Ok(Some(set)) => {
            let spoken = render(&set);
            ToolOutcome { spoken, loaded: Some(set) }
        }
        Ok(None) => ToolOutcome {
            spoken: format!(
                "No patient data found for {patient_name}. Please verify the patient name."
            ),
            loaded: None,
        },
        Err(e) => {
            tracing::error!(error = %e, "record lookup failed");
            ToolOutcome {
                spoken: format!("I couldn't retrieve records for {patient_name}."),
                loaded: None,
            }
        }
    }
}

fn check_interactions(call: &ToolCall, current: Option<&RecordSet>) -> ToolOutcome {
    let args: InteractionArgs = match parse_args(call) {
        Ok(args) => args,
        Err(outcome) => return outcome,
    };
    let existing = if args.existing_medications.is_empty() {
        current.map(RecordSet::medication_history).unwrap_or_default()
    } else {
        args.existing_medications
    };
    let warnings = interactions::check_interactions(&args.new_medications, &existing);
    let spoken = if warnings.is_empty() {
        "No known interactions found.".to_string()
    } else {
        warnings.join(" ")
    };
    ToolOutcome { spoken, loaded: None }
}
