//! Record store client
//!
//! Full-text search over patient visit records. The store is optional; when
//! it is not configured the lookup tools are simply not advertised.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::records::{RecordSet, VisitRecord};
use crate::{Error, Result};

/// Read-only lookup into the visit record index
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Look up all visit records for a patient name.
    ///
    /// Returns `Ok(None)` when the name matches nothing; that is a normal
    /// outcome, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecordStore`] when the store is unreachable or
    /// rejects the query.
    async fn lookup(&self, patient_name: &str) -> Result<Option<RecordSet>>;
}

/// Search-backed record store
///
/// Issues a match query on `patient_name` and projects only the visit
/// fields the dialogue layer formats.
pub struct SearchRecordStore {
    client: reqwest::Client,
    url: String,
    api_key: String,
    index: String,
}

impl SearchRecordStore {
    #[must_use]
    pub fn new(url: String, api_key: String, index: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.trim_end_matches('/').to_string(),
            api_key,
            index,
        }
    }

    #[must_use]
    pub fn into_dyn(self) -> Arc<dyn RecordStore> {
        Arc::new(self)
    }
}

#[async_trait]
impl RecordStore for SearchRecordStore {
    async fn lookup(&self, patient_name: &str) -> Result<Option<RecordSet>> {
        let query = serde_json::json!({
            "query": {
                "match": { "patient_name": patient_name }
            },
            "_source": [
                "date_of_visit",
                "patient_complaint",
                "diagnosis",
                "doctor_notes",
                "drugs_prescribed",
                "patient_age_at_visit",
                "patient_name",
            ],
            "size": 50,
        });

        let response = self
            .client
            .post(format!("{}/{}/_search", self.url, self.index))
            .header("Authorization", format!("ApiKey {}", self.api_key))
            .json(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "record store query failed");
            return Err(Error::RecordStore(format!("search error {status}: {body}")));
        }

        let parsed: SearchResponse = response.json().await?;
        let records: Vec<VisitRecord> = parsed.hits.hits.into_iter().map(|h| h.source).collect();
        tracing::info!(patient = %patient_name, hits = records.len(), "record lookup complete");

        if records.is_empty() {
            return Ok(None);
        }
        Ok(Some(RecordSet { patient_name: patient_name.to_string(), records }))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_source")]
    source: VisitRecord,
}
