//! The document stores rockbench writes to.
//!
//! A [`Destination`] accepts batches of documents and, where supported,
//! batches of patches. It also answers the latency probe's question: what is
//! the newest timestamp this generator's documents have reached in the
//! store? Destinations record the bytes they put on the wire; completion and
//! error counts are recorded by whoever awaited the call.

use std::sync::Arc;

use async_trait::async_trait;
use rockbench_payload::{Document, Patch};
use serde::Deserialize;

pub mod elastic;
pub mod null;
pub mod rockset;

pub use elastic::Elastic;
pub use null::Null;
pub use rockset::Rockset;

/// Errors produced by a [`Destination`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The HTTP exchange failed before a response arrived
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// A request or response body could not be (de)serialized
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    /// The destination answered with a non-success status
    #[error("Destination responded with {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, as text
        body: String,
    },
    /// The destination has no implementation of the operation
    #[error("{destination} does not support {operation}")]
    Unsupported {
        /// Destination name
        destination: &'static str,
        /// Operation name
        operation: &'static str,
    },
    /// The store holds no timestamp for this generator yet
    #[error("No timestamp found for this generator")]
    NoTimestamp,
    /// A Rockset collection path was malformed
    #[error("Collection path '{0}' is not of the form <workspace>.<collection>")]
    CollectionPath(String),
}

#[async_trait]
/// A store that documents and patches are sent to.
pub trait Destination: std::fmt::Debug + Send + Sync {
    /// Short name, used in logs.
    fn name(&self) -> &'static str;

    /// Whether documents may carry a caller supplied `_id`.
    fn supports_explicit_ids(&self) -> bool;

    /// Whether [`Destination::send_patches`] is implemented.
    fn supports_patches(&self) -> bool;

    /// One-time setup, called before any dispatch.
    async fn configure(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Write a batch of documents.
    async fn send_documents(&self, docs: &[Document]) -> Result<(), Error>;

    /// Apply a batch of patches.
    async fn send_patches(&self, patches: &[Patch]) -> Result<(), Error>;

    /// The newest timestamp, in microseconds since the Unix epoch, visible
    /// for this generator's documents.
    async fn latest_timestamp(&self) -> Result<i64, Error>;
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
/// Configuration for the destination of a run
pub enum Config {
    /// Discard everything, for local testing
    Null,
    /// Rockset collection
    Rockset(rockset::Config),
    /// Elasticsearch index
    Elastic(elastic::Config),
}

impl Config {
    /// Short name of the configured destination.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Null => null::NAME,
            Self::Rockset(_) => rockset::NAME,
            Self::Elastic(_) => elastic::NAME,
        }
    }

    /// Whether the configured destination accepts caller supplied ids.
    #[must_use]
    pub fn supports_explicit_ids(&self) -> bool {
        !matches!(self, Self::Elastic(_))
    }

    /// Whether the configured destination accepts patches.
    #[must_use]
    pub fn supports_patches(&self) -> bool {
        !matches!(self, Self::Elastic(_))
    }

    /// Build the configured destination.
    ///
    /// # Errors
    ///
    /// Function will error if the HTTP client cannot be built or the
    /// destination configuration is malformed.
    pub fn build(&self, generator_identifier: &str) -> Result<Arc<dyn Destination>, Error> {
        Ok(match self {
            Self::Null => Arc::new(Null),
            Self::Rockset(config) => Arc::new(Rockset::new(config.clone(), generator_identifier)?),
            Self::Elastic(config) => Arc::new(Elastic::new(config.clone(), generator_identifier)?),
        })
    }
}

/// Build the HTTP client shared by every request of one destination.
pub(crate) fn client() -> Result<reqwest::Client, Error> {
    Ok(reqwest::Client::builder().pool_max_idle_per_host(100).build()?)
}

/// Turn a non-success response into [`Error::Status`].
pub(crate) async fn check(response: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Status {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configs() -> Vec<Config> {
        vec![
            Config::Null,
            Config::Rockset(rockset::Config {
                api_server: "http://127.0.0.1:1".to_string(),
                api_key: "key".to_string(),
                collection_path: "commons.bench".to_string(),
            }),
            Config::Elastic(elastic::Config {
                url: "http://127.0.0.1:1".to_string(),
                auth: "Basic abc".to_string(),
                index: "bench".to_string(),
            }),
        ]
    }

    #[test]
    fn config_capabilities_match_built_destination() {
        for config in configs() {
            let destination = config.build("abcdefghij").expect("destination builds");
            assert_eq!(config.name(), destination.name());
            assert_eq!(
                config.supports_explicit_ids(),
                destination.supports_explicit_ids()
            );
            assert_eq!(config.supports_patches(), destination.supports_patches());
        }
    }

    #[test]
    fn malformed_collection_path_fails_to_build() {
        let config = Config::Rockset(rockset::Config {
            api_server: "http://127.0.0.1:1".to_string(),
            api_key: "key".to_string(),
            collection_path: "no_workspace".to_string(),
        });
        assert!(matches!(
            config.build("abcdefghij"),
            Err(Error::CollectionPath(_))
        ));
    }
}
