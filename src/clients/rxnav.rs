//! RxNav approximate-match client for RxNorm candidates.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::traits::{RawCandidate, TerminologyClient};

const RXNAV_API_BASE: &str = "https://rxnav.nlm.nih.gov/REST";

/// Restrict matches to atoms in active concepts.
const ACTIVE_CONCEPTS_OPTION: u8 = 1;

/// Client for `approximateTerm.json`.
pub struct RxNavClient {
    client: Client,
    base_url: String,
}

impl Default for RxNavClient {
    fn default() -> Self {
        Self::new(RXNAV_API_BASE.to_string())
    }
}

impl RxNavClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

/// Accept finite numbers encoded either as JSON numbers or strings.
pub(crate) fn number_field(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn string_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Extract candidate rows from an `approximateTerm` payload.
///
/// A payload without an `approximateGroup` is an error; a group without
/// candidates is zero rows.
pub fn parse_approximate_term(data: &Value) -> Result<Vec<RawCandidate>> {
    let group = data
        .get("approximateGroup")
        .ok_or_else(|| anyhow!("No approximateGroup in RxNav response"))?;

    let Some(candidates) = group.get("candidate").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    Ok(candidates
        .iter()
        .map(|c| RawCandidate {
            identifier: string_field(c.get("rxcui")),
            name: string_field(c.get("name")),
            score: number_field(c.get("score")),
            rank: number_field(c.get("rank"))
                .filter(|r| r.fract() == 0.0 && *r >= 0.0)
                .map(|r| r as u32),
            source: string_field(c.get("source")),
        })
        .collect())
}

#[async_trait]
impl TerminologyClient for RxNavClient {
    async fn search(&self, term: &str, max_entries: usize) -> Result<Vec<RawCandidate>> {
        debug!("Attempting approximate match for: {}", term);
        let response = self
            .client
            .get(format!("{}/approximateTerm.json", self.base_url))
            .query(&[
                ("term", term.to_string()),
                ("maxEntries", max_entries.to_string()),
                ("option", ACTIVE_CONCEPTS_OPTION.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Approximate match API returned status: {}",
                response.status()
            ));
        }

        let data: Value = response.json().await?;
        let rows = parse_approximate_term(&data)?;
        debug!("RxNav returned {} candidates for {:?}", rows.len(), term);
        Ok(rows)
    }

    fn provider_name(&self) -> &str {
        "rxnav"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_string_encoded_numbers() {
        let data = json!({
            "approximateGroup": {
                "inputTerm": null,
                "candidate": [
                    {
                        "rxcui": "861004", "rxaui": "2", "score": "95.5", "rank": "1",
                        "name": "metformin hydrochloride 500 MG", "source": "RXNORM"
                    },
                    {"rxcui": "6809", "score": 40, "rank": 2, "source": "MMSL"}
                ]
            }
        });
        let rows = parse_approximate_term(&data).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].identifier.as_deref(), Some("861004"));
        assert_eq!(rows[0].score, Some(95.5));
        assert_eq!(rows[0].rank, Some(1));
        assert_eq!(rows[1].name, None);
        assert_eq!(rows[1].rank, Some(2));
    }

    #[test]
    fn test_parse_unparsable_rank_is_missing() {
        let data = json!({"approximateGroup": {"candidate": [
            {"rxcui": "1", "name": "x", "score": "n/a", "rank": "first"}
        ]}});
        let rows = parse_approximate_term(&data).unwrap();
        assert_eq!(rows[0].score, None);
        assert_eq!(rows[0].rank, None);
    }

    #[test]
    fn test_parse_non_finite_score_is_missing() {
        let data = json!({"approximateGroup": {"candidate": [
            {"rxcui": "1", "name": "x", "score": "NaN", "rank": "1"},
            {"rxcui": "2", "name": "y", "score": "inf", "rank": "2"}
        ]}});
        let rows = parse_approximate_term(&data).unwrap();
        assert_eq!(rows[0].score, None);
        assert_eq!(rows[1].score, None);
    }

    #[test]
    fn test_parse_empty_and_invalid() {
        assert!(parse_approximate_term(&json!({"approximateGroup": {"inputTerm": "zzz"}}))
            .unwrap()
            .is_empty());
        assert!(parse_approximate_term(&json!({})).is_err());
    }
}
