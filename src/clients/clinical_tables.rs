//! NLM Clinical Tables ICD-10-CM search client.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::rxnav::number_field;
use crate::traits::{RawCandidate, TerminologyClient};

const ICD10_API_BASE: &str = "https://clinicaltables.nlm.nih.gov/api/icd10cm/v3/search";

/// Fields returned per row; parsing relies on this order.
const DISPLAY_FIELDS: &str = "code,name";
/// Match the condition text against names only, never against codes.
const SEARCH_FIELDS: &str = "name";

/// Client for the ICD-10-CM search endpoint.
pub struct ClinicalTablesClient {
    client: Client,
    base_url: String,
}

impl Default for ClinicalTablesClient {
    fn default() -> Self {
        Self::new(ICD10_API_BASE.to_string())
    }
}

impl ClinicalTablesClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

/// Extract rows from a `[total, codes, extra, [[code, name], ...], scores?]`
/// payload. Rank is the 1-based row position.
pub fn parse_search_response(data: &Value) -> Result<Vec<RawCandidate>> {
    let parts = data
        .as_array()
        .filter(|parts| parts.len() >= 4)
        .ok_or_else(|| anyhow!("Unexpected ICD-10 response shape"))?;

    let rows = match &parts[3] {
        Value::Array(rows) => rows,
        Value::Null => return Ok(Vec::new()),
        _ => return Err(anyhow!("ICD-10 rows are not an array")),
    };
    let scores = parts.get(4).and_then(Value::as_array);

    Ok(rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let cell = |n: usize| row.get(n).and_then(Value::as_str).map(str::to_string);
            RawCandidate {
                identifier: cell(0),
                name: cell(1),
                score: scores.and_then(|s| number_field(s.get(i))),
                rank: Some(i as u32 + 1),
                source: Some("ICD10CM".to_string()),
            }
        })
        .collect())
}

#[async_trait]
impl TerminologyClient for ClinicalTablesClient {
    async fn search(&self, term: &str, max_entries: usize) -> Result<Vec<RawCandidate>> {
        let terms = term.to_lowercase();
        debug!("Making ICD-10 API request for {:?}", terms);
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("terms", terms),
                ("df", DISPLAY_FIELDS.to_string()),
                ("sf", SEARCH_FIELDS.to_string()),
                ("maxList", max_entries.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("ICD-10 API error: {} - {}", status, error_text));
        }

        let data: Value = response.json().await?;
        parse_search_response(&data)
    }

    fn provider_name(&self) -> &str {
        "clinical_tables"
    }
}
