//! Rockset collections.
//!
//! Documents are written with the collection's document API. Patches go to
//! the same URL with the `PATCH` method. The latest timestamp is read back
//! with a SQL query over `_ts`, the field every patch touches.

use std::str::FromStr;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use rockbench_payload::{Document, Patch};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{Destination, Error, check, client};
use crate::telemetry;

pub(crate) const NAME: &str = "rockset";

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
/// Configuration for [`Rockset`]
pub struct Config {
    /// Base URL of the API server, for example `https://api.usw2a1.rockset.com`
    pub api_server: String,
    /// API key sent as `Authorization: ApiKey <key>`
    pub api_key: String,
    /// Target collection as `<workspace>.<collection>`
    pub collection_path: String,
}

/// A collection path split into its workspace and collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionPath {
    /// Workspace name
    pub workspace: String,
    /// Collection name
    pub collection: String,
}

impl FromStr for CollectionPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split('.').collect::<Vec<_>>().as_slice() {
            [workspace, collection] if !workspace.is_empty() && !collection.is_empty() => {
                Ok(Self {
                    workspace: (*workspace).to_string(),
                    collection: (*collection).to_string(),
                })
            }
            _ => Err(Error::CollectionPath(s.to_string())),
        }
    }
}

#[derive(Serialize)]
struct Data<'a, T> {
    data: &'a [T],
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<TimestampRow>,
}

#[derive(Deserialize)]
struct TimestampRow {
    ts: Option<f64>,
}

/// Writes to a Rockset collection.
#[derive(Debug)]
pub struct Rockset {
    client: reqwest::Client,
    authorization: String,
    docs_url: String,
    query_url: String,
    latest_query: String,
}

impl Rockset {
    /// Create a new [`Rockset`]
    ///
    /// # Errors
    ///
    /// Function will error if the collection path is malformed or the HTTP
    /// client cannot be built.
    pub fn new(config: Config, generator_identifier: &str) -> Result<Self, Error> {
        let path: CollectionPath = config.collection_path.parse()?;
        let server = config.api_server.trim_end_matches('/');
        Ok(Self {
            client: client()?,
            authorization: format!("ApiKey {}", config.api_key),
            docs_url: format!(
                "{server}/v1/orgs/self/ws/{ws}/collections/{coll}/docs",
                ws = path.workspace,
                coll = path.collection
            ),
            query_url: format!("{server}/v1/orgs/self/queries"),
            latest_query: format!(
                "select _ts as ts from \"{ws}\".\"{coll}\" where generator_identifier = '{generator_identifier}' ORDER BY _ts DESC limit 1",
                ws = path.workspace,
                coll = path.collection
            ),
        })
    }

    async fn send<T>(&self, method: reqwest::Method, data: &[T]) -> Result<(), Error>
    where
        T: Serialize + Sync,
    {
        let body = serde_json::to_vec(&Data { data })?;
        let len = body.len() as u64;
        let response = self
            .client
            .request(method, &self.docs_url)
            .header(AUTHORIZATION, &self.authorization)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        check(response).await?;
        telemetry::record_bytes_sent(len);
        Ok(())
    }
}

#[async_trait]
impl Destination for Rockset {
    fn name(&self) -> &'static str {
        NAME
    }

    fn supports_explicit_ids(&self) -> bool {
        true
    }

    fn supports_patches(&self) -> bool {
        true
    }

    async fn send_documents(&self, docs: &[Document]) -> Result<(), Error> {
        telemetry::record_events_ingested(docs.len() as u64);
        self.send(reqwest::Method::POST, docs).await
    }

    async fn send_patches(&self, patches: &[Patch]) -> Result<(), Error> {
        self.send(reqwest::Method::PATCH, patches).await
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn latest_timestamp(&self) -> Result<i64, Error> {
        let response = self
            .client
            .post(&self.query_url)
            .header(AUTHORIZATION, &self.authorization)
            .json(&json!({ "sql": { "query": self.latest_query } }))
            .send()
            .await?;
        let body = check(response).await?.bytes().await?;
        let parsed: QueryResponse = serde_json::from_slice(&body)?;
        let ts = parsed
            .results
            .first()
            .and_then(|row| row.ts)
            .ok_or(Error::NoTimestamp)?;
        debug!(ts, "latest Rockset timestamp");
        Ok(ts as i64)
    }
}
