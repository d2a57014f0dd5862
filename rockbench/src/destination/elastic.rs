//! Elasticsearch indexes.
//!
//! Documents are written with the bulk API, one `index` action per document.
//! Elasticsearch assigns ids through the action line, so documents must not
//! carry `_id` themselves. Patches are not supported.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use rockbench_payload::{Document, Patch};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{Destination, Error, check, client};
use crate::telemetry;

pub(crate) const NAME: &str = "elastic";

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
/// Configuration for [`Elastic`]
pub struct Config {
    /// Base URL of the cluster
    pub url: String,
    /// Value of the `Authorization` header, sent verbatim
    pub auth: String,
    /// Index written to and queried
    pub index: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    aggregations: Aggregations,
}

#[derive(Deserialize)]
struct Aggregations {
    max_event_time_for_identifier: FilteredMax,
}

#[derive(Deserialize)]
struct FilteredMax {
    max_event_time: MaxValue,
}

#[derive(Deserialize)]
struct MaxValue {
    value: Option<f64>,
}

/// Writes to an Elasticsearch index.
#[derive(Debug)]
pub struct Elastic {
    client: reqwest::Client,
    config: Config,
    bulk_url: String,
    search_url: String,
    // Text fields are indexed lowercased and the term query is exact.
    identifier_term: String,
}

impl Elastic {
    /// Create a new [`Elastic`]
    ///
    /// # Errors
    ///
    /// Function will error if the HTTP client cannot be built.
    pub fn new(config: Config, generator_identifier: &str) -> Result<Self, Error> {
        let url = config.url.trim_end_matches('/');
        Ok(Self {
            client: client()?,
            bulk_url: format!("{url}/_bulk"),
            search_url: format!("{url}/{index}/_search?size=0", index = config.index),
            identifier_term: generator_identifier.to_lowercase(),
            config,
        })
    }

    /// Render `docs` as a bulk request body. Returns the body and the number
    /// of document bytes in it.
    fn bulk_body(&self, docs: &[Document]) -> Result<(Vec<u8>, u64), Error> {
        let mut body = Vec::new();
        let mut doc_bytes = 0;
        for doc in docs {
            let action = json!({
                "index": {
                    "_index": self.config.index,
                    "_id": uuid::Uuid::new_v4().to_string(),
                }
            });
            serde_json::to_writer(&mut body, &action)?;
            body.push(b'\n');
            let start = body.len();
            serde_json::to_writer(&mut body, doc)?;
            doc_bytes += (body.len() - start) as u64;
            body.push(b'\n');
        }
        Ok((body, doc_bytes))
    }
}

#[async_trait]
impl Destination for Elastic {
    fn name(&self) -> &'static str {
        NAME
    }

    fn supports_explicit_ids(&self) -> bool {
        false
    }

    fn supports_patches(&self) -> bool {
        false
    }

    async fn send_documents(&self, docs: &[Document]) -> Result<(), Error> {
        telemetry::record_events_ingested(docs.len() as u64);
        let (body, doc_bytes) = self.bulk_body(docs)?;
        let response = self
            .client
            .post(&self.bulk_url)
            .header(AUTHORIZATION, &self.config.auth)
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        check(response).await?;
        telemetry::record_bytes_sent(doc_bytes);
        Ok(())
    }

    async fn send_patches(&self, _patches: &[Patch]) -> Result<(), Error> {
        Err(Error::Unsupported {
            destination: NAME,
            operation: "patch",
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn latest_timestamp(&self) -> Result<i64, Error> {
        let query = json!({
            "aggs": {
                "max_event_time_for_identifier": {
                    "filter": { "term": { "generator_identifier": self.identifier_term } },
                    "aggs": { "max_event_time": { "max": { "field": "_event_time" } } }
                }
            }
        });
        let response = self
            .client
            .post(&self.search_url)
            .header(AUTHORIZATION, &self.config.auth)
            .json(&query)
            .send()
            .await?;
        let body = check(response).await?.bytes().await?;
        let parsed: SearchResponse = serde_json::from_slice(&body)?;
        let value = parsed
            .aggregations
            .max_event_time_for_identifier
            .max_event_time
            .value
            .ok_or(Error::NoTimestamp)?;
        debug!(value, "latest Elastic event time");
        Ok(value as i64)
    }
}
